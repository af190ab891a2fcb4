//! Linear barcodes (`GS k`, function B)
//!
//! Check digits use the common modulo-10 rule shared by EAN-13, EAN-8 and
//! UPC-A: starting from the rightmost payload digit, weights alternate 3, 1,
//! 3, ... and `check = (10 - sum % 10) % 10`.

use crate::config::PrinterConfig;
use crate::error::EncodingError;
use crate::escpos::{BarcodeSystem, EscPosBuilder};
use crate::markup::{Barcode, Symbology};

/// Longest Code128 payload (255 minus the code set prefix)
const CODE128_MAX_LEN: usize = 253;

/// Compute the check digit for a digit-only payload
pub fn check_digit(payload: &str) -> Option<u8> {
    let mut sum = 0u32;
    for (i, c) in payload.chars().rev().enumerate() {
        let digit = c.to_digit(10)?;
        sum += if i % 2 == 0 { digit * 3 } else { digit };
    }
    Some(((10 - sum % 10) % 10) as u8)
}

fn invalid(barcode: &Barcode, reason: impl Into<String>) -> EncodingError {
    EncodingError::InvalidBarcodeContent {
        symbology: barcode.symbology.to_string(),
        content: barcode.content.clone(),
        reason: reason.into(),
    }
}

fn numeric_payload(barcode: &Barcode, payload_len: usize) -> Result<Vec<u8>, EncodingError> {
    let content = barcode.content.as_str();
    if !content.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid(barcode, "only digits are allowed"));
    }
    if content.len() != payload_len && content.len() != payload_len + 1 {
        return Err(invalid(
            barcode,
            format!(
                "expected {} digits, or {} with check digit, got {}",
                payload_len,
                payload_len + 1,
                content.len()
            ),
        ));
    }

    let payload = &content[..payload_len];
    let check = check_digit(payload).ok_or_else(|| invalid(barcode, "only digits are allowed"))?;

    if let Some(supplied) = content[payload_len..].chars().next() {
        let supplied = supplied.to_digit(10).unwrap_or(u32::MAX);
        if supplied != check as u32 {
            return Err(invalid(
                barcode,
                format!("check digit should be {}, got {}", check, supplied),
            ));
        }
    }

    let mut data = payload.as_bytes().to_vec();
    data.push(b'0' + check);
    Ok(data)
}

/// Validate barcode content and return the bytes sent after `GS k m n`
pub fn validate_barcode(barcode: &Barcode) -> Result<Vec<u8>, EncodingError> {
    match barcode.symbology {
        Symbology::Ean13 => numeric_payload(barcode, 12),
        Symbology::Ean8 => numeric_payload(barcode, 7),
        Symbology::UpcA => numeric_payload(barcode, 11),
        Symbology::Code128 => {
            let content = barcode.content.as_str();
            if content.is_empty() {
                return Err(invalid(barcode, "content is empty"));
            }
            if let Some(c) = content.chars().find(|c| !(' '..='~').contains(c)) {
                return Err(invalid(
                    barcode,
                    format!("character {:?} is not printable ASCII", c),
                ));
            }
            // '{' is the code set escape, so a literal one is doubled
            let escaped = content.replace('{', "{{");
            if escaped.len() > CODE128_MAX_LEN {
                return Err(invalid(
                    barcode,
                    format!("longer than {} characters", CODE128_MAX_LEN),
                ));
            }
            let mut data = b"{B".to_vec();
            data.extend_from_slice(escaped.as_bytes());
            Ok(data)
        }
    }
}

/// Symbol width in modules, quiet zones excluded
fn module_count(symbology: Symbology, content_len: usize) -> u32 {
    match symbology {
        Symbology::Ean13 | Symbology::UpcA => 95,
        Symbology::Ean8 => 67,
        // start + data + check at 11 modules each, stop at 13
        Symbology::Code128 => 11 * (content_len as u32 + 2) + 13,
    }
}

pub(crate) fn encode_barcode(
    b: &mut EscPosBuilder,
    barcode: &Barcode,
    config: &PrinterConfig,
) -> Result<(), EncodingError> {
    let data = validate_barcode(barcode)?;

    let system = match barcode.symbology {
        Symbology::Ean13 => BarcodeSystem::Ean13,
        Symbology::Ean8 => BarcodeSystem::Ean8,
        Symbology::UpcA => BarcodeSystem::UpcA,
        Symbology::Code128 => BarcodeSystem::Code128,
    };

    let content_len = match barcode.symbology {
        Symbology::Code128 => data.len() - 2,
        _ => data.len(),
    };
    let modules = module_count(barcode.symbology, content_len);
    let printable = config.printable_width_dots() as u32;

    let max_fit = printable / modules;
    if max_fit < 2 {
        return Err(EncodingError::BarcodeTooWide {
            content: barcode.content.clone(),
            max_dots: config.printable_width_dots(),
        });
    }
    let wanted = barcode
        .width_mm
        .map(|mm| config.mm_to_dots(mm) / modules)
        .unwrap_or(max_fit);
    let module_width = wanted.clamp(2, 6).min(max_fit);

    let height = config.mm_to_dots(barcode.height_mm).clamp(1, 255);

    b.align(barcode.align)
        .barcode_height(height as u8)
        .barcode_module_width(module_width as u8)
        .barcode_hri(barcode.text_position)
        .barcode(system, &data);
    Ok(())
}
