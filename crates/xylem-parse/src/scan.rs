//! UTF-8 scanning utilities for chunked input.
//!
//! The parser only ever walks bytes that are known to be structurally valid
//! UTF-8. These helpers split incoming chunks into a valid prefix and a raw
//! tail, coerce invalid bytes when the caller asked for that, and provide the
//! char-boundary arithmetic used for cursor advancement and error snippets.

/// Split a byte chunk at the end of its longest structurally valid UTF-8
/// prefix. The tail is either empty or starts at the first byte that cannot
/// yet be proven valid (it may simply be a code point cut off by the chunk
/// boundary).
pub fn utf8_prefix(bytes: &[u8]) -> (&str, &[u8]) {
    match std::str::from_utf8(bytes) {
        Ok(s) => (s, &[]),
        Err(err) => {
            let (valid, rest) = bytes.split_at(err.valid_up_to());
            let valid = std::str::from_utf8(valid).expect("prefix reported valid by from_utf8");
            (valid, rest)
        }
    }
}

/// Whether the whole byte slice is structurally valid UTF-8.
pub fn is_valid_utf8(bytes: &[u8]) -> bool {
    std::str::from_utf8(bytes).is_ok()
}

/// Rewrite `bytes` replacing every invalid byte with `replacement`.
///
/// Valid runs are copied through untouched; each single offending byte is
/// substituted, mirroring how the parser coerces non-UTF-8 leftovers.
pub fn replace_invalid(bytes: &[u8], replacement: &str) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut rest = bytes;
    loop {
        let (valid, tail) = utf8_prefix(rest);
        out.push_str(valid);
        if tail.is_empty() {
            break;
        }
        out.push_str(replacement);
        rest = &tail[1..];
    }
    out
}

/// Number of bytes occupied by the code point starting at `pos`.
///
/// `pos` must sit on a char boundary of `s`; returns 0 at the end of input.
pub fn char_width(s: &str, pos: usize) -> usize {
    match s[pos..].chars().next() {
        Some(c) => c.len_utf8(),
        None => 0,
    }
}

/// Largest char-boundary index `<= pos`.
pub fn floor_char_boundary(s: &str, pos: usize) -> usize {
    let mut pos = pos.min(s.len());
    while !s.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Smallest char-boundary index `>= pos`.
pub fn ceil_char_boundary(s: &str, pos: usize) -> usize {
    let mut pos = pos.min(s.len());
    while !s.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}

/// First UTF-16 code unit of the high (leading) surrogate range.
pub const MIN_HIGH_SURROGATE: u32 = 0xD800;
/// Last UTF-16 code unit of the high (leading) surrogate range.
pub const MAX_HIGH_SURROGATE: u32 = 0xDBFF;
/// First UTF-16 code unit of the low (trailing) surrogate range.
pub const MIN_LOW_SURROGATE: u32 = 0xDC00;
/// Last UTF-16 code unit of the low (trailing) surrogate range.
pub const MAX_LOW_SURROGATE: u32 = 0xDFFF;
/// First code point needing a surrogate pair in UTF-16.
pub const MIN_SUPPLEMENTARY_CODE_POINT: u32 = 0x10000;

/// Whether `code` is a UTF-16 high surrogate code unit.
pub fn is_high_surrogate(code: u32) -> bool {
    (MIN_HIGH_SURROGATE..=MAX_HIGH_SURROGATE).contains(&code)
}

/// Whether `code` is a UTF-16 low surrogate code unit.
pub fn is_low_surrogate(code: u32) -> bool {
    (MIN_LOW_SURROGATE..=MAX_LOW_SURROGATE).contains(&code)
}

/// Combine a surrogate pair into the supplementary code point it encodes.
pub fn combine_surrogates(high: u32, low: u32) -> u32 {
    (((high & 0x3FF) << 10) | (low & 0x3FF)) + MIN_SUPPLEMENTARY_CODE_POINT
}

/// Whether `code` is a Unicode scalar value (excludes surrogates and
/// out-of-range values).
pub fn is_valid_code_point(code: u32) -> bool {
    char::from_u32(code).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_of_valid_input() {
        let (valid, rest) = utf8_prefix("hello".as_bytes());
        assert_eq!(valid, "hello");
        assert!(rest.is_empty());
    }

    #[test]
    fn test_prefix_stops_at_invalid_byte() {
        let (valid, rest) = utf8_prefix(b"ab\xFFcd");
        assert_eq!(valid, "ab");
        assert_eq!(rest, b"\xFFcd");
    }

    #[test]
    fn test_prefix_of_truncated_code_point() {
        // U+05D0 is 0xD7 0x90; cut after the lead byte.
        let (valid, rest) = utf8_prefix(b"ab\xD7");
        assert_eq!(valid, "ab");
        assert_eq!(rest, b"\xD7");
    }

    #[test]
    fn test_replace_invalid() {
        assert_eq!(replace_invalid(b"a\xFFb\xFE", " "), "a b ");
        assert_eq!(replace_invalid(b"ok", "?"), "ok");
        assert_eq!(replace_invalid(b"\xFF\xFF", "_"), "__");
    }

    #[test]
    fn test_char_width() {
        let s = "a\u{05D0}\u{1F41D}";
        assert_eq!(char_width(s, 0), 1);
        assert_eq!(char_width(s, 1), 2);
        assert_eq!(char_width(s, 3), 4);
        assert_eq!(char_width(s, s.len()), 0);
    }

    #[test]
    fn test_boundary_clamping() {
        let s = "a\u{1F41D}b";
        assert_eq!(floor_char_boundary(s, 3), 1);
        assert_eq!(ceil_char_boundary(s, 3), 5);
        assert_eq!(floor_char_boundary(s, 99), s.len());
    }

    #[test]
    fn test_surrogate_combination() {
        // U+1F41D as the pair D83D DC1D.
        assert!(is_high_surrogate(0xD83D));
        assert!(is_low_surrogate(0xDC1D));
        assert_eq!(combine_surrogates(0xD83D, 0xDC1D), 0x1F41D);
    }

    #[test]
    fn test_code_point_validity() {
        assert!(is_valid_code_point('z' as u32));
        assert!(is_valid_code_point(0x10FFFF));
        assert!(!is_valid_code_point(0xD800));
        assert!(!is_valid_code_point(0x110000));
    }
}
