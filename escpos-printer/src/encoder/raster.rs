//! Raster images
//!
//! Bitmaps in markup are already 1 bit per pixel. Pictures handed to the append
//! API or to direct print arrive base64 encoded and go through [`rasterize`]
//! first.

use crate::config::PrinterConfig;
use crate::error::EncodingError;
use crate::escpos::{EscPosBuilder, RASTER_BAND_ROWS};
use crate::markup::{ImageRaster, MonoBitmap};

/// Emit the image band by band; `band_done` runs after each band
pub(crate) fn encode_raster(
    b: &mut EscPosBuilder,
    image: &ImageRaster,
    config: &PrinterConfig,
    mut band_done: impl FnMut(&mut EscPosBuilder),
) -> Result<(), EncodingError> {
    let max_width = config.printable_width_dots();
    if image.bitmap.width() > max_width as u32 {
        return Err(EncodingError::ImageTooWide {
            width: image.bitmap.width(),
            max_width,
        });
    }
    b.align(image.align);
    let height = image.bitmap.height();
    let mut row = 0;
    while row < height {
        let rows = (height - row).min(RASTER_BAND_ROWS);
        b.raster_band(&image.bitmap, row, rows);
        band_done(b);
        row += rows;
    }
    Ok(())
}

/// Downsample to `max_width` dots and threshold to black and white
///
/// Transparent pixels (alpha < 128) and light pixels (luma >= 128) are white.
#[cfg(feature = "image")]
pub fn rasterize(img: &image::DynamicImage, max_width: u32) -> Result<MonoBitmap, EncodingError> {
    use image::GenericImageView;

    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(EncodingError::InvalidImage("image has no pixels".to_string()));
    }

    let resized = if w > max_width {
        let ratio = max_width as f64 / w as f64;
        let new_h = ((h as f64 * ratio) as u32).max(1);
        img.resize_exact(max_width, new_h, image::imageops::FilterType::Nearest)
    } else {
        img.clone()
    };

    let (new_w, new_h) = resized.dimensions();
    let x_bytes = new_w.div_ceil(8);
    let rgba = resized.to_rgba8();
    let mut data = Vec::with_capacity((x_bytes * new_h) as usize);

    for y in 0..new_h {
        for x_byte in 0..x_bytes {
            let mut byte = 0u8;
            for bit in 0..8 {
                let x = x_byte * 8 + bit;
                if x < new_w {
                    let pixel = rgba.get_pixel(x, y);

                    // Transparent = white
                    if pixel[3] >= 128 {
                        let luma = (0.299 * pixel[0] as f32
                            + 0.587 * pixel[1] as f32
                            + 0.114 * pixel[2] as f32) as u8;

                        // Dark enough = print black (1)
                        if luma < 128 {
                            byte |= 1 << (7 - bit);
                        }
                    }
                }
            }
            data.push(byte);
        }
    }

    MonoBitmap::new(new_w, new_h, data)
}

/// Decode a base64 picture (PNG, JPEG, BMP...) into a printable bitmap
#[cfg(feature = "image")]
pub fn decode_base64_image(encoded: &str, max_width: u32) -> Result<MonoBitmap, EncodingError> {
    use base64::Engine;

    let payload = strip_data_url(encoded);
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| EncodingError::InvalidImage(format!("bad base64: {}", e)))?;
    let img = image::load_from_memory(&bytes)
        .map_err(|e| EncodingError::InvalidImage(format!("cannot decode picture: {}", e)))?;
    rasterize(&img, max_width)
}

#[cfg(not(feature = "image"))]
pub fn decode_base64_image(_encoded: &str, _max_width: u32) -> Result<MonoBitmap, EncodingError> {
    Err(EncodingError::InvalidImage(
        "built without the `image` feature".to_string(),
    ))
}

/// Accept `data:image/png;base64,...` as well as the bare payload
#[cfg_attr(not(feature = "image"), allow(dead_code))]
fn strip_data_url(encoded: &str) -> &str {
    match encoded.split_once(";base64,") {
        Some((prefix, payload)) if prefix.starts_with("data:") => payload,
        _ => encoded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PrinterOptions;
    use crate::markup::Align;

    fn config() -> PrinterConfig {
        PrinterConfig::build(&PrinterOptions::network("10.0.0.1")).unwrap()
    }

    #[test]
    fn test_image_too_wide() {
        let config = config();
        let bitmap = MonoBitmap::new(392, 1, vec![0; 49]).unwrap();
        let image = ImageRaster {
            bitmap,
            align: Align::Center,
        };
        let mut b = EscPosBuilder::new(config.charset());
        assert_eq!(
            encode_raster(&mut b, &image, &config, |_| {}),
            Err(EncodingError::ImageTooWide {
                width: 392,
                max_width: 384
            })
        );
        assert!(b.is_empty());
    }

    #[test]
    fn test_raster_header() {
        let config = config();
        let bitmap = MonoBitmap::new(16, 2, vec![0xFF, 0x00, 0x0F, 0xF0]).unwrap();
        let image = ImageRaster {
            bitmap,
            align: Align::Right,
        };
        let mut b = EscPosBuilder::new(config.charset());
        encode_raster(&mut b, &image, &config, |_| {}).unwrap();
        assert_eq!(
            b.build(),
            vec![
                0x1B, 0x61, 0x02, 0x1D, 0x76, 0x30, 0x00, 2, 0, 2, 0, 0xFF, 0x00, 0x0F, 0xF0
            ]
        );
    }

    #[test]
    fn test_strip_data_url() {
        assert_eq!(strip_data_url("data:image/png;base64,AAAA"), "AAAA");
        assert_eq!(strip_data_url("AAAA"), "AAAA");
    }

    #[cfg(feature = "image")]
    #[test]
    fn test_rasterize_threshold_and_resize() {
        use image::{DynamicImage, Rgba, RgbaImage};

        let mut img = RgbaImage::from_pixel(800, 10, Rgba([255, 255, 255, 255]));
        // left half black, one transparent black pixel
        for x in 0..400 {
            for y in 0..10 {
                img.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        img.put_pixel(0, 0, Rgba([0, 0, 0, 0]));

        let bitmap = rasterize(&DynamicImage::ImageRgba8(img), 384).unwrap();
        assert_eq!(bitmap.width(), 384);
        assert_eq!(bitmap.height(), 4);
        // second row, first byte fully black; last byte white
        let row = bitmap.row_bytes() as usize;
        assert_eq!(bitmap.data()[row], 0xFF);
        assert_eq!(bitmap.data()[2 * row - 1], 0x00);
    }

    #[cfg(feature = "image")]
    #[test]
    fn test_decode_base64_rejects_garbage() {
        assert!(matches!(
            decode_base64_image("!!!", 384),
            Err(EncodingError::InvalidImage(_))
        ));
        assert!(matches!(
            decode_base64_image("AAAA", 384),
            Err(EncodingError::InvalidImage(_))
        ));
    }
}
