//! QR codes
//!
//! The symbol is computed locally only to learn its module count; the printer
//! renders it from the native `GS ( k` sequence.

use qrcode::EcLevel;
use tracing::debug;

use crate::config::PrinterConfig;
use crate::error::EncodingError;
use crate::escpos::EscPosBuilder;
use crate::markup::QrCode;

/// Largest module size the firmware accepts
const MAX_MODULE_SIZE: u8 = 16;

/// Module size that fits `modules` into the printable width
pub(crate) fn effective_module_size(
    requested: u8,
    modules: usize,
    config: &PrinterConfig,
) -> Result<u8, EncodingError> {
    let fit = config.printable_width_dots() as usize / modules.max(1);
    let size = (requested.min(MAX_MODULE_SIZE) as usize).min(fit);
    if size < 1 {
        return Err(EncodingError::QrCodeTooLarge {
            modules,
            max_dots: config.printable_width_dots(),
        });
    }
    Ok(size as u8)
}

pub(crate) fn encode_qr(
    b: &mut EscPosBuilder,
    qr: &QrCode,
    config: &PrinterConfig,
) -> Result<(), EncodingError> {
    if qr.content.is_empty() {
        return Err(EncodingError::InvalidQrContent("content is empty".to_string()));
    }

    let code = qrcode::QrCode::with_error_correction_level(qr.content.as_bytes(), EcLevel::M)
        .map_err(|e| EncodingError::InvalidQrContent(format!("QR code generation failed: {}", e)))?;

    let modules = code.width();
    let size = effective_module_size(qr.module_size, modules, config)?;
    debug!(
        modules,
        requested = qr.module_size,
        size,
        "QR module size"
    );

    b.align(qr.align).qr_code(qr.content.as_bytes(), size);
    Ok(())
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
    fn test_module_size_clamped() {
        let config = config();
        // 21 modules: 384 / 21 = 18, capped at 16
        assert_eq!(effective_module_size(25, 21, &config).unwrap(), 16);
        assert_eq!(effective_module_size(4, 21, &config).unwrap(), 4);
        // 57 modules: 384 / 57 = 6
        assert_eq!(effective_module_size(25, 57, &config).unwrap(), 6);
        assert!(matches!(
            effective_module_size(3, 400, &config),
            Err(EncodingError::QrCodeTooLarge { .. })
        ));
    }

    #[test]
    fn test_encode_qr_sequence() {
        let config = config();
        let qr = QrCode {
            content: "ABC".to_string(),
            module_size: 25,
            align: Align::Center,
        };
        let mut b = EscPosBuilder::new(config.charset());
        encode_qr(&mut b, &qr, &config).unwrap();
        let out = b.build();
        assert_eq!(&out[..3], &[0x1B, 0x61, 0x01]);
        // size byte of function 167
        assert_eq!(out[3 + 9 + 7], 16);
        assert!(out.ends_with(&[0x1D, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x51, 0x30]));
    }

    #[test]
    fn test_empty_or_oversized_content() {
        let config = config();
        let mut b = EscPosBuilder::new(config.charset());
        let empty = QrCode {
            content: String::new(),
            module_size: 4,
            align: Align::Left,
        };
        assert!(matches!(
            encode_qr(&mut b, &empty, &config),
            Err(EncodingError::InvalidQrContent(_))
        ));

        let huge = QrCode {
            content: "9".repeat(8000),
            module_size: 4,
            align: Align::Left,
        };
        assert!(matches!(
            encode_qr(&mut b, &huge, &config),
            Err(EncodingError::InvalidQrContent(_))
        ));
    }
}
