//! Parsing options.

/// Default cap on nested non-list, non-`anonymous` objects.
pub(crate) const DEFAULT_MAX_RECURSION_DEPTH: usize = 100;

/// Options controlling a [`StreamParser`](crate::StreamParser).
///
/// `ignore_unknown_fields` and `case_insensitive_enum_parsing` are carried
/// for the schema-aware layer consuming the event stream; the parser itself
/// does not interpret them.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Whether the downstream consumer should continue on unrecognized
    /// field names.
    pub ignore_unknown_fields: bool,

    /// Whether the downstream consumer should match enum values
    /// case-insensitively.
    pub case_insensitive_enum_parsing: bool,

    /// Hard cap on nested non-list, non-`anonymous` open objects
    /// (default: 100).
    pub max_recursion_depth: usize,

    /// Replace invalid UTF-8 bytes with [`utf8_replacement`] instead of
    /// failing (default: false).
    ///
    /// [`utf8_replacement`]: ParseOptions::utf8_replacement
    pub coerce_to_utf8: bool,

    /// Replacement sequence used when coercing (default: a single space).
    pub utf8_replacement: String,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            ignore_unknown_fields: false,
            case_insensitive_enum_parsing: false,
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            coerce_to_utf8: false,
            utf8_replacement: " ".to_string(),
        }
    }
}

impl ParseOptions {
    /// Create new default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue on unrecognized field names (enforced downstream).
    pub fn ignore_unknown_fields(mut self) -> Self {
        self.ignore_unknown_fields = true;
        self
    }

    /// Match enum values case-insensitively (enforced downstream).
    pub fn case_insensitive_enum_parsing(mut self) -> Self {
        self.case_insensitive_enum_parsing = true;
        self
    }

    /// Set the maximum recursion depth.
    pub fn max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    /// Replace invalid UTF-8 with `replacement` instead of failing.
    pub fn coerce_to_utf8(mut self, replacement: impl Into<String>) -> Self {
        self.coerce_to_utf8 = true;
        self.utf8_replacement = replacement.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ParseOptions::default();
        assert!(!options.ignore_unknown_fields);
        assert!(!options.case_insensitive_enum_parsing);
        assert_eq!(options.max_recursion_depth, 100);
        assert!(!options.coerce_to_utf8);
        assert_eq!(options.utf8_replacement, " ");
    }

    #[test]
    fn test_builders() {
        let options = ParseOptions::new()
            .ignore_unknown_fields()
            .max_recursion_depth(3)
            .coerce_to_utf8("?");
        assert!(options.ignore_unknown_fields);
        assert_eq!(options.max_recursion_depth, 3);
        assert!(options.coerce_to_utf8);
        assert_eq!(options.utf8_replacement, "?");
    }
}
