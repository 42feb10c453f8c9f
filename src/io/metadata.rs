//! Textual metadata block carried from the first tile to every output page.
//!
//! Only the plane dimensions are rewritten; everything else passes through.
//! TIFF ASCII tags cannot hold non-ASCII text, so such characters are
//! escaped as `\xNN`, `\uNNNN` or `\UNNNNNNNN`.

use regex::Regex;
use std::sync::OnceLock;

fn size_x_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"SizeX="\d+""#).expect("valid SizeX pattern"))
}

fn size_y_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"SizeY="\d+""#).expect("valid SizeY pattern"))
}

/// Replace every `SizeX`/`SizeY` attribute with the assembled plane size.
pub fn adjust_dimensions(description: &str, width: u32, height: u32) -> String {
    let size_x = format!(r#"SizeX="{}""#, width);
    let size_y = format!(r#"SizeY="{}""#, height);
    let adjusted = size_x_pattern().replace_all(description, size_x.as_str());
    size_y_pattern()
        .replace_all(&adjusted, size_y.as_str())
        .into_owned()
}

/// Escape every non-ASCII character.
pub fn to_ascii(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        let code = c as u32;
        match code {
            0..=0x7f => escaped.push(c),
            0x80..=0xff => escaped.push_str(&format!("\\x{:02x}", code)),
            0x100..=0xffff => escaped.push_str(&format!("\\u{:04x}", code)),
            _ => escaped.push_str(&format!("\\U{:08x}", code)),
        }
    }
    escaped
}

/// Metadata block for the output pages, ready for an ASCII tag.
pub fn output_description(description: Option<&str>, width: u32, height: u32) -> Option<String> {
    description.map(|text| to_ascii(&adjust_dimensions(text, width, height)))
}
