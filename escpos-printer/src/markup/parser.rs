//! Single pass markup parser
//!
//! The input is processed line by line. `[L]`, `[C]` and `[R]` move an
//! alignment cursor that survives line breaks; style tags must be closed on
//! the line that opened them.

use super::element::{
    Align, Barcode, DEFAULT_QR_SIZE, Element, HriPosition, ImageRaster,
    MonoBitmap, QrCode, Symbology, TextRun, TextSize, TextStyle,
};
use crate::error::ParserError;

/// Parse markup into elements
pub fn parse(markup: &str) -> Result<Vec<Element>, ParserError> {
    let mut parser = Parser::default();
    for line in markup.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        parser.line(line)?;
    }
    Ok(parser.elements)
}

#[derive(Debug, Clone, Copy)]
enum StyleTag {
    Bold,
    Underline,
    Font(TextSize),
}

impl StyleTag {
    fn name(self) -> &'static str {
        match self {
            Self::Bold => "b",
            Self::Underline => "u",
            Self::Font(_) => "font",
        }
    }
}

fn style_of(stack: &[StyleTag]) -> TextStyle {
    let mut style = TextStyle::default();
    for tag in stack {
        match tag {
            StyleTag::Bold => style.bold = true,
            StyleTag::Underline => style.underline = true,
            StyleTag::Font(size) => style.size = *size,
        }
    }
    style
}

enum LineItem {
    Text {
        content: String,
        align: Align,
        style: TextStyle,
    },
    Block(Element),
}

#[derive(Default)]
struct Parser {
    align: Align,
    elements: Vec<Element>,
}

impl Parser {
    fn line(&mut self, line: &str) -> Result<(), ParserError> {
        let mut items = Vec::new();
        let mut styles: Vec<StyleTag> = Vec::new();
        let mut text = String::new();
        let mut rest = line;

        while let Some(c) = rest.chars().next() {
            if c == '[' {
                if let Some(align) = alignment_tag(rest) {
                    flush_text(&mut text, &mut items, self.align, &styles);
                    self.align = align;
                    rest = &rest[3..];
                    continue;
                }
            } else if c == '<' && starts_tag(rest) {
                flush_text(&mut text, &mut items, self.align, &styles);
                let end = rest
                    .find('>')
                    .ok_or_else(|| ParserError::invalid(rest, "unterminated tag"))?;
                let raw = &rest[..=end];
                let inner = &rest[1..end];
                rest = &rest[end + 1..];

                if let Some(name) = inner.strip_prefix('/') {
                    close_style(&mut styles, name.trim(), raw)?;
                    continue;
                }

                let name_end = inner.find(char::is_whitespace).unwrap_or(inner.len());
                let name = inner[..name_end].to_ascii_lowercase();
                let attributes = parse_attributes(&inner[name_end..], raw)?;

                match name.as_str() {
                    "b" => {
                        reject_attributes(&attributes, raw)?;
                        styles.push(StyleTag::Bold);
                    }
                    "u" => {
                        reject_attributes(&attributes, raw)?;
                        styles.push(StyleTag::Underline);
                    }
                    "font" => styles.push(StyleTag::Font(font_size(&attributes, raw)?)),
                    "img" | "barcode" | "qrcode" => {
                        if let Some(open) = styles.last() {
                            return Err(ParserError::invalid(
                                raw,
                                format!("<{}> cannot be nested inside <{}>", name, open.name()),
                            ));
                        }
                        let close = format!("</{}>", name);
                        let close_at = rest
                            .to_ascii_lowercase()
                            .find(&close)
                            .ok_or_else(|| ParserError::invalid(raw, format!("missing {}", close)))?;
                        let content = &rest[..close_at];
                        let fragment = format!("{}{}{}", raw, content, close);
                        rest = &rest[close_at + close.len()..];

                        let element = match name.as_str() {
                            "img" => self.image(&attributes, content, &fragment)?,
                            "barcode" => self.barcode(&attributes, content, &fragment)?,
                            _ => self.qr_code(&attributes, content, &fragment)?,
                        };
                        items.push(LineItem::Block(element));
                    }
                    _ => {
                        return Err(ParserError::invalid(
                            raw,
                            format!("unknown tag <{}>", name),
                        ));
                    }
                }
                continue;
            }

            text.push(c);
            rest = &rest[c.len_utf8()..];
        }

        flush_text(&mut text, &mut items, self.align, &styles);
        if let Some(open) = styles.last() {
            return Err(ParserError::invalid(
                line,
                format!("<{}> is not closed on this line", open.name()),
            ));
        }

        self.finish_line(items);
        Ok(())
    }

    fn finish_line(&mut self, mut items: Vec<LineItem>) {
        let has_block = items.iter().any(|i| matches!(i, LineItem::Block(_)));
        if has_block {
            items.retain(|i| match i {
                LineItem::Text { content, .. } => !content.trim().is_empty(),
                LineItem::Block(_) => true,
            });
        }

        if items.is_empty() {
            match self.elements.last_mut() {
                Some(Element::Feed { line_count }) => *line_count += 1,
                _ => self.elements.push(Element::Feed { line_count: 1 }),
            }
            return;
        }

        for item in items {
            match item {
                LineItem::Text {
                    content,
                    align,
                    style,
                } => self.elements.push(Element::Text(TextRun {
                    content,
                    align,
                    style,
                    line_end: false,
                })),
                LineItem::Block(element) => {
                    self.end_text_line();
                    self.elements.push(element);
                }
            }
        }
        self.end_text_line();
    }

    fn end_text_line(&mut self) {
        if let Some(Element::Text(run)) = self.elements.last_mut() {
            run.line_end = true;
        }
    }

    fn image(
        &self,
        attributes: &[(String, String)],
        content: &str,
        fragment: &str,
    ) -> Result<Element, ParserError> {
        reject_attributes(attributes, fragment)?;
        let bitmap = MonoBitmap::from_hex(content)
            .map_err(|e| ParserError::invalid(fragment, e.to_string()))?;
        Ok(Element::Image(ImageRaster {
            bitmap,
            align: self.align,
        }))
    }

    fn barcode(
        &self,
        attributes: &[(String, String)],
        content: &str,
        fragment: &str,
    ) -> Result<Element, ParserError> {
        let mut barcode = Barcode::new(Symbology::Ean13, content.trim());
        barcode.align = self.align;

        for (key, value) in attributes {
            match key.as_str() {
                "type" => {
                    barcode.symbology = value.parse().map_err(|_| {
                        ParserError::invalid(fragment, format!("unknown barcode type '{}'", value))
                    })?;
                }
                "height" => barcode.height_mm = positive_mm(key, value, fragment)?,
                "width" => barcode.width_mm = Some(positive_mm(key, value, fragment)?),
                "text" => {
                    barcode.text_position = HriPosition::parse(value).ok_or_else(|| {
                        ParserError::invalid(fragment, format!("unknown text position '{}'", value))
                    })?;
                }
                _ => {
                    return Err(ParserError::invalid(
                        fragment,
                        format!("unknown attribute '{}' on <barcode>", key),
                    ));
                }
            }
        }

        Ok(Element::Barcode(barcode))
    }

    fn qr_code(
        &self,
        attributes: &[(String, String)],
        content: &str,
        fragment: &str,
    ) -> Result<Element, ParserError> {
        let mut module_size = DEFAULT_QR_SIZE;
        for (key, value) in attributes {
            match key.as_str() {
                "size" => {
                    module_size = value
                        .trim()
                        .parse::<u8>()
                        .ok()
                        .filter(|s| *s > 0)
                        .ok_or_else(|| {
                            ParserError::invalid(fragment, format!("invalid qrcode size '{}'", value))
                        })?;
                }
                _ => {
                    return Err(ParserError::invalid(
                        fragment,
                        format!("unknown attribute '{}' on <qrcode>", key),
                    ));
                }
            }
        }

        Ok(Element::QrCode(QrCode {
            content: content.to_string(),
            module_size,
            align: self.align,
        }))
    }
}

fn flush_text(text: &mut String, items: &mut Vec<LineItem>, align: Align, styles: &[StyleTag]) {
    if text.is_empty() {
        return;
    }
    items.push(LineItem::Text {
        content: std::mem::take(text),
        align,
        style: style_of(styles),
    });
}

fn alignment_tag(s: &str) -> Option<Align> {
    match s.get(..3)? {
        "[L]" => Some(Align::Left),
        "[C]" => Some(Align::Center),
        "[R]" => Some(Align::Right),
        _ => None,
    }
}

/// `<` opens a tag only when followed by a letter or `/`
fn starts_tag(s: &str) -> bool {
    s.chars()
        .nth(1)
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '/')
}

fn close_style(styles: &mut Vec<StyleTag>, name: &str, raw: &str) -> Result<(), ParserError> {
    let name = name.to_ascii_lowercase();
    match styles.last() {
        Some(open) if open.name() == name => {
            styles.pop();
            Ok(())
        }
        Some(open) => Err(ParserError::invalid(
            raw,
            format!("expected </{}>", open.name()),
        )),
        None => Err(ParserError::invalid(raw, "closing tag without an open tag")),
    }
}

fn parse_attributes(s: &str, raw: &str) -> Result<Vec<(String, String)>, ParserError> {
    let mut attributes: Vec<(String, String)> = Vec::new();
    let mut rest = s.trim_start();

    while !rest.is_empty() {
        let key_end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
            .unwrap_or(rest.len());
        if key_end == 0 {
            return Err(ParserError::invalid(raw, "malformed attribute"));
        }
        let key = rest[..key_end].to_ascii_lowercase();
        rest = rest[key_end..].trim_start();

        rest = rest
            .strip_prefix('=')
            .ok_or_else(|| ParserError::invalid(raw, format!("attribute '{}' has no value", key)))?
            .trim_start();

        let quote = rest
            .chars()
            .next()
            .filter(|c| *c == '\'' || *c == '"')
            .ok_or_else(|| ParserError::invalid(raw, format!("value of '{}' must be quoted", key)))?;
        let body = &rest[1..];
        let close = body
            .find(quote)
            .ok_or_else(|| ParserError::invalid(raw, format!("unterminated value of '{}'", key)))?;

        if attributes.iter().any(|(k, _)| *k == key) {
            return Err(ParserError::invalid(
                raw,
                format!("duplicate attribute '{}'", key),
            ));
        }
        attributes.push((key, body[..close].to_string()));
        rest = body[close + 1..].trim_start();
    }

    Ok(attributes)
}

fn reject_attributes(attributes: &[(String, String)], fragment: &str) -> Result<(), ParserError> {
    match attributes.first() {
        Some((key, _)) => Err(ParserError::invalid(
            fragment,
            format!("unexpected attribute '{}'", key),
        )),
        None => Ok(()),
    }
}

fn font_size(attributes: &[(String, String)], raw: &str) -> Result<TextSize, ParserError> {
    let mut size = TextSize::Normal;
    for (key, value) in attributes {
        if key != "size" {
            return Err(ParserError::invalid(
                raw,
                format!("unknown attribute '{}' on <font>", key),
            ));
        }
        size = TextSize::parse(value)
            .ok_or_else(|| ParserError::invalid(raw, format!("unknown font size '{}'", value)))?;
    }
    Ok(size)
}

fn positive_mm(key: &str, value: &str, fragment: &str) -> Result<f32, ParserError> {
    value
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
        .ok_or_else(|| ParserError::invalid(fragment, format!("invalid {} '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runs(elements: &[Element]) -> Vec<&TextRun> {
        elements
            .iter()
            .filter_map(|e| match e {
                Element::Text(run) => Some(run),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_alignment_persists_across_lines() {
        let elements = parse("[C]a\nb").unwrap();
        assert_eq!(
            elements,
            vec![
                Element::Text(TextRun::line("a", Align::Center)),
                Element::Text(TextRun::line("b", Align::Center)),
            ]
        );
    }

    #[test]
    fn test_mixed_alignment_on_one_line() {
        let elements = parse("[L]Total[R]9.99").unwrap();
        let runs = runs(&elements);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].align, Align::Left);
        assert!(!runs[0].line_end);
        assert_eq!(runs[1].content, "9.99");
        assert_eq!(runs[1].align, Align::Right);
        assert!(runs[1].line_end);
    }

    #[test]
    fn test_nested_styles() {
        let elements = parse("[L]x<font size='big'><b>y</b></font><u>z</u>").unwrap();
        let runs = runs(&elements);
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].style, TextStyle::default());
        assert_eq!(
            runs[1].style,
            TextStyle {
                bold: true,
                underline: false,
                size: TextSize::Big
            }
        );
        assert!(runs[2].style.underline);
        assert!(runs[2].line_end);
    }

    #[test]
    fn test_empty_lines_become_feeds() {
        let elements = parse("[L]a\n\n\n[L]b").unwrap();
        assert_eq!(elements.len(), 3);
        assert_eq!(elements[1], Element::Feed { line_count: 2 });
    }

    #[test]
    fn test_block_tags() {
        let elements =
            parse("[L]Hello\n[C]<qrcode size='25'>ABC</qrcode>\n<barcode type='ean8' height='12' text='none'>1234567</barcode>")
                .unwrap();
        assert_eq!(elements.len(), 3);
        assert_eq!(
            elements[1],
            Element::QrCode(QrCode {
                content: "ABC".to_string(),
                module_size: 25,
                align: Align::Center,
            })
        );
        match &elements[2] {
            Element::Barcode(b) => {
                assert_eq!(b.symbology, Symbology::Ean8);
                assert_eq!(b.height_mm, 12.0);
                assert_eq!(b.text_position, HriPosition::None);
                assert_eq!(b.align, Align::Center);
                assert_eq!(b.content, "1234567");
            }
            other => panic!("expected barcode, got {:?}", other),
        }
    }

    #[test]
    fn test_block_splits_text_line() {
        let elements = parse("[L]Scan <qrcode>X</qrcode> now").unwrap();
        assert_eq!(elements.len(), 3);
        assert!(matches!(&elements[0], Element::Text(r) if r.line_end && r.content == "Scan "));
        assert!(matches!(&elements[2], Element::Text(r) if r.line_end && r.content == " now"));
    }

    #[test]
    fn test_whitespace_around_block_dropped() {
        let elements = parse("[C]  <qrcode size='4'>X</qrcode>  ").unwrap();
        assert_eq!(elements.len(), 1);
        assert!(matches!(elements[0], Element::QrCode(_)));
    }

    #[test]
    fn test_image_tag() {
        let elements = parse("[C]<img>08000100ff</img>").unwrap();
        match &elements[0] {
            Element::Image(img) => {
                assert_eq!(img.bitmap.width(), 8);
                assert_eq!(img.bitmap.height(), 1);
                assert_eq!(img.align, Align::Center);
            }
            other => panic!("expected image, got {:?}", other),
        }
    }

    #[test]
    fn test_literal_brackets_and_angles() {
        let elements = parse("[L]a < b [x] <3").unwrap();
        assert_eq!(runs(&elements)[0].content, "a < b [x] <3");
    }

    #[test]
    fn test_double_quoted_attributes() {
        let elements = parse("<barcode type=\"128\" height=\"8\">AB-12</barcode>").unwrap();
        assert!(matches!(&elements[0], Element::Barcode(b) if b.symbology == Symbology::Code128));
    }

    #[test]
    fn test_invalid_markup() {
        let cases = [
            "<blink>x</blink>",
            "<b>unclosed",
            "<b><u>x</b></u>",
            "</b>",
            "<font size='huge'>x</font>",
            "<qrcode size='0'>x</qrcode>",
            "<qrcode>x",
            "<barcode type='itf'>1</barcode>",
            "<barcode height=10>1</barcode>",
            "<barcode colour='red'>1</barcode>",
            "<b>in <qrcode>x</qrcode></b>",
            "<img>nothex</img>",
            "<b",
        ];
        for case in cases {
            assert!(
                matches!(parse(case), Err(ParserError::InvalidMarkup { .. })),
                "expected failure for {}",
                case
            );
        }
    }

    #[test]
    fn test_error_identifies_fragment() {
        let err = parse("[L]ok <blink>").unwrap_err();
        let ParserError::InvalidMarkup { fragment, .. } = err;
        assert_eq!(fragment, "<blink>");
    }

    #[test]
    fn test_crlf_input() {
        let elements = parse("[R]a\r\nb\r\n").unwrap();
        let runs = runs(&elements);
        assert_eq!(runs[0].content, "a");
        assert_eq!(runs[1].align, Align::Right);
        assert_eq!(elements.last(), Some(&Element::Feed { line_count: 1 }));
    }
}
