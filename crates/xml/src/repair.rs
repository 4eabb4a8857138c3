//! Text-level repairs for markup that fails strict parsing.

use std::borrow::Cow;

const BOM: char = '\u{feff}';

/// Removes a leading byte order mark.
pub fn strip_bom(source: &str) -> &str {
    source.strip_prefix(BOM).unwrap_or(source)
}

/// Best-effort repair of malformed markup.
///
/// Drops the BOM, the XML declaration and characters XML 1.0 forbids, and
/// escapes `&` that does not start a reference and `<` that does not start
/// markup. Tag balance is left to the lenient parser.
pub fn repair_markup(source: &str) -> String {
    let source = strip_bom(source);
    let source = strip_declaration(source);

    let mut out = String::with_capacity(source.len() + 16);
    let mut rest = source;
    while let Some(c) = rest.chars().next() {
        let after = &rest[c.len_utf8()..];
        match c {
            '&' if !starts_with_reference(after) => out.push_str("&amp;"),
            '<' if !starts_markup(after) => out.push_str("&lt;"),
            c if is_forbidden_control(c) => {}
            c => out.push(c),
        }
        rest = after;
    }
    out
}

/// Decodes text that was escaped twice (`&amp;lt;` read as `&lt;`).
///
/// Returns the input unchanged if it holds no reference or does not decode.
pub fn collapse_double_escapes(text: &str) -> Cow<'_, str> {
    let Some(index) = text.find('&') else {
        return Cow::Borrowed(text);
    };
    if !starts_with_reference(&text[index + 1..]) {
        return Cow::Borrowed(text);
    }
    match quick_xml::escape::unescape(text) {
        Ok(Cow::Owned(decoded)) => Cow::Owned(decoded),
        _ => Cow::Borrowed(text),
    }
}

fn strip_declaration(source: &str) -> &str {
    let trimmed = source.trim_start();
    if trimmed.starts_with("<?xml")
        && let Some(end) = trimmed.find("?>")
    {
        return &trimmed[end + 2..];
    }
    source
}

fn starts_with_reference(after_amp: &str) -> bool {
    let Some(end) = after_amp.find(';') else {
        return false;
    };
    let name = &after_amp[..end];
    if let Some(number) = name.strip_prefix('#') {
        return match number.strip_prefix(['x', 'X']) {
            Some(hex) => !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()),
            None => !number.is_empty() && number.chars().all(|c| c.is_ascii_digit()),
        };
    }
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric())
}

fn starts_markup(after_lt: &str) -> bool {
    after_lt
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || matches!(c, '/' | '!' | '?' | '_'))
}

fn is_forbidden_control(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' | '\u{fffe}' | '\u{ffff}')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ParseOptions, parse_fragment};

    #[test]
    fn escapes_bare_ampersands_and_angles() {
        let repaired = repair_markup("<CHAR>A & B < C &amp; D &#65;</CHAR>");
        assert_eq!(repaired, "<CHAR>A &amp; B &lt; C &amp; D &#65;</CHAR>");
        let nodes = parse_fragment(&repaired, ParseOptions::strict()).unwrap();
        assert_eq!(nodes[0].as_element().unwrap().text_content(), "A & B < C & D A");
    }

    #[test]
    fn drops_bom_declaration_and_control_characters() {
        let repaired = repair_markup("\u{feff}<?xml version=\"1.0\"?><P>a\u{1}b\u{b}</P>");
        assert_eq!(repaired, "<P>ab</P>");
    }

    #[test]
    fn keeps_tabs_and_newlines() {
        assert_eq!(repair_markup("<P>\ta\r\n</P>"), "<P>\ta\r\n</P>");
    }

    #[test]
    fn collapses_one_level_of_escaping() {
        assert_eq!(collapse_double_escapes("x &lt; y"), "x < y");
        assert_eq!(collapse_double_escapes("AT&T"), "AT&T");
        assert!(matches!(collapse_double_escapes("plain"), Cow::Borrowed(_)));
    }
}
