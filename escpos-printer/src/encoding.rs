//! Text encoding for thermal printer code pages
//!
//! Most of the printers in the field are Chinese models running in GBK mode,
//! where a CJK character takes two columns and ASCII takes one. Western
//! printers are driven with code table 16 (Windows-1252).
//!
//! Characters the active code page cannot represent are printed as `?`.

use crate::config::Charset;

/// FS & + FS C 1: enter Chinese mode, GBK code page
const GBK_MODE: [u8; 5] = [0x1C, 0x26, 0x1C, 0x43, 0x01];

/// FS . + ESC t 16: leave Chinese mode, select WPC1252
const WPC1252_MODE: [u8; 5] = [0x1C, 0x2E, 0x1B, 0x74, 0x10];

/// Leave Chinese mode, print the euro sign from PC858, re-enter Chinese mode
const GBK_EURO: [u8; 8] = [0x1C, 0x2E, 0x1B, 0x74, 0x13, 0xD5, 0x1C, 0x26];

/// Bytes that select the code page; sent right after `ESC @`
pub fn charset_preamble(charset: Charset) -> &'static [u8] {
    match charset {
        Charset::Gbk => &GBK_MODE,
        Charset::Windows1252 => &WPC1252_MODE,
    }
}

/// Get the GBK byte width of a string
///
/// Chinese characters are 2 bytes in GBK, ASCII is 1 byte.
pub fn gbk_width(s: &str) -> usize {
    s.chars().map(|c| char_width(c, Charset::Gbk)).sum()
}

/// Printed columns taken by one character at normal size
pub fn char_width(c: char, charset: Charset) -> usize {
    if c.is_ascii() {
        return 1;
    }
    match charset {
        Charset::Gbk => match encode_char(c, charset) {
            Some(bytes) => bytes.len(),
            None => 1,
        },
        Charset::Windows1252 => 1,
    }
}

/// Printed columns taken by a string at normal size
pub fn text_width(s: &str, charset: Charset) -> usize {
    s.chars().map(|c| char_width(c, charset)).sum()
}

/// Truncate a string to fit within a column width
pub fn truncate_to_width(s: &str, max_width: usize, charset: Charset) -> String {
    let mut width = 0;
    let mut result = String::new();
    for c in s.chars() {
        let w = char_width(c, charset);
        if width + w > max_width {
            break;
        }
        result.push(c);
        width += w;
    }
    result
}

fn encode_char(c: char, charset: Charset) -> Option<Vec<u8>> {
    let mut tmp = [0u8; 4];
    let s = c.encode_utf8(&mut tmp);
    let encoding = match charset {
        Charset::Gbk => encoding_rs::GBK,
        Charset::Windows1252 => encoding_rs::WINDOWS_1252,
    };
    let (bytes, _, had_errors) = encoding.encode(s);
    if had_errors {
        None
    } else {
        Some(bytes.into_owned())
    }
}

/// Encode printable text for the given code page
///
/// Control characters are replaced with spaces so text can never smuggle
/// commands into the stream. In GBK mode the euro sign is printed through
/// the PC858 table.
pub fn encode_text(s: &str, charset: Charset) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len() * 2);
    for c in s.chars() {
        if c.is_control() {
            out.push(b' ');
        } else if c.is_ascii() {
            out.push(c as u8);
        } else if c == '€' && charset == Charset::Gbk {
            out.extend_from_slice(&GBK_EURO);
        } else {
            match encode_char(c, charset) {
                Some(bytes) => out.extend_from_slice(&bytes),
                None => out.push(b'?'),
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gbk_width() {
        assert_eq!(gbk_width("hello"), 5);
        assert_eq!(gbk_width("你好"), 4); // 2 Chinese chars = 4 bytes
        assert_eq!(gbk_width("AB中文CD"), 8); // 4 ASCII + 2 Chinese
    }

    #[test]
    fn test_text_width_western() {
        assert_eq!(text_width("Café", Charset::Windows1252), 4);
        assert_eq!(text_width("Café", Charset::Gbk), 5);
    }

    #[test]
    fn test_truncate_to_width() {
        assert_eq!(truncate_to_width("hello world", 5, Charset::Gbk), "hello");
        assert_eq!(truncate_to_width("你好世界", 4, Charset::Gbk), "你好");
        assert_eq!(truncate_to_width("AB中文", 4, Charset::Gbk), "AB中");
        assert_eq!(truncate_to_width("AB中文", 3, Charset::Gbk), "AB");
    }

    #[test]
    fn test_encode_gbk() {
        assert_eq!(encode_text("AB", Charset::Gbk), b"AB");
        assert_eq!(encode_text("中", Charset::Gbk), vec![0xD6, 0xD0]);
    }

    #[test]
    fn test_encode_euro() {
        let bytes = encode_text("5€", Charset::Gbk);
        assert_eq!(bytes[0], b'5');
        assert_eq!(&bytes[1..], &GBK_EURO);

        assert_eq!(encode_text("€", Charset::Windows1252), vec![0x80]);
    }

    #[test]
    fn test_unmappable_becomes_question_mark() {
        assert_eq!(encode_text("a中b", Charset::Windows1252), b"a?b");
    }

    #[test]
    fn test_control_chars_replaced() {
        assert_eq!(encode_text("a\x1Bb\tc", Charset::Gbk), b"a b c");
    }
}
