//! Escaping of attribute and text values.
//!
//! The writer applies the same escaping the parser accepts: `"` and `\` are
//! backslash-escaped, control characters use their short forms or `\uXXXX`,
//! and `<`/`>` are written as `\u003c`/`\u003e` so a value can never open a
//! tag.

use std::borrow::Cow;

fn needs_escape(c: char) -> bool {
    matches!(c, '"' | '\\' | '<' | '>' | '\u{2028}' | '\u{2029}') || (c as u32) < 0x20
}

/// Escape a value for emission inside an attribute or as element text.
///
/// Returns the input unchanged when no escaping is needed.
pub fn escape(s: &str) -> Cow<'_, str> {
    if !s.chars().any(needs_escape) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{8}' => out.push_str("\\b"),
            '\u{C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}
