//! Canonical markup output
//!
//! Every text run carries an explicit alignment tag and every block element
//! gets a line of its own, so the output parses back to the same elements.

use std::fmt::Write;

use super::element::{Element, TextRun, TextSize};

/// Render elements as markup
pub fn serialize(elements: &[Element]) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut current: Option<String> = None;

    for element in elements {
        match element {
            Element::Text(run) => {
                write_run(current.get_or_insert_with(String::new), run);
                if run.line_end
                    && let Some(line) = current.take()
                {
                    lines.push(line);
                }
            }
            block => {
                if let Some(line) = current.take() {
                    lines.push(line);
                }
                match block {
                    Element::Feed { line_count } => {
                        lines.extend((0..*line_count).map(|_| String::new()));
                    }
                    other => lines.push(block_line(other)),
                }
            }
        }
    }

    if let Some(line) = current.take() {
        lines.push(line);
    }
    lines.join("\n")
}

fn write_run(line: &mut String, run: &TextRun) {
    line.push_str(run.align.tag());

    let style = run.style;
    if style.size != TextSize::Normal {
        let _ = write!(line, "<font size='{}'>", style.size.as_str());
    }
    if style.bold {
        line.push_str("<b>");
    }
    if style.underline {
        line.push_str("<u>");
    }

    line.push_str(&run.content);

    if style.underline {
        line.push_str("</u>");
    }
    if style.bold {
        line.push_str("</b>");
    }
    if style.size != TextSize::Normal {
        line.push_str("</font>");
    }
}

/// One line for an image, barcode or QR element
pub(crate) fn block_line(element: &Element) -> String {
    let mut line = String::new();
    match element {
        Element::Image(image) => {
            let _ = write!(
                line,
                "{}<img>{}</img>",
                image.align.tag(),
                image.bitmap.to_hex()
            );
        }
        Element::Barcode(barcode) => {
            let _ = write!(
                line,
                "{}<barcode type='{}' height='{}'",
                barcode.align.tag(),
                barcode.symbology.as_str(),
                barcode.height_mm
            );
            if let Some(width) = barcode.width_mm {
                let _ = write!(line, " width='{}'", width);
            }
            let _ = write!(
                line,
                " text='{}'>{}</barcode>",
                barcode.text_position.as_str(),
                barcode.content
            );
        }
        Element::QrCode(qr) => {
            let _ = write!(
                line,
                "{}<qrcode size='{}'>{}</qrcode>",
                qr.align.tag(),
                qr.module_size,
                qr.content
            );
        }
        Element::Text(run) => write_run(&mut line, run),
        Element::Feed { .. } => {}
    }
    line
}
