//! Printing options.

/// Options controlling an [`ObjectWriter`](crate::ObjectWriter).
///
/// `always_print_primitive_fields`, `always_print_enums_as_ints` and
/// `preserve_proto_field_names` configure the schema-aware layer that
/// produces the event stream; the writer carries them through unchanged.
#[derive(Debug, Clone, Default)]
pub struct PrintOptions {
    /// Add newlines and one space of indentation per depth level.
    pub add_whitespace: bool,

    /// Ask the event producer to emit default-valued scalars.
    pub always_print_primitive_fields: bool,

    /// Ask the event producer to render enum values as integers.
    pub always_print_enums_as_ints: bool,

    /// Ask the event producer to keep schema field names verbatim.
    pub preserve_proto_field_names: bool,

    /// Use the web-safe base64 alphabet (`-` and `_`, `=` padding kept) for
    /// bytes fields.
    pub use_websafe_base64_for_bytes: bool,
}

impl PrintOptions {
    /// Create new default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable newline + space-per-depth indentation.
    pub fn add_whitespace(mut self) -> Self {
        self.add_whitespace = true;
        self
    }

    /// Emit default-valued scalars (enforced by the event producer).
    pub fn always_print_primitive_fields(mut self) -> Self {
        self.always_print_primitive_fields = true;
        self
    }

    /// Render enums as integers (enforced by the event producer).
    pub fn always_print_enums_as_ints(mut self) -> Self {
        self.always_print_enums_as_ints = true;
        self
    }

    /// Keep schema field names verbatim (enforced by the event producer).
    pub fn preserve_proto_field_names(mut self) -> Self {
        self.preserve_proto_field_names = true;
        self
    }

    /// Encode bytes fields with the web-safe base64 alphabet.
    pub fn use_websafe_base64_for_bytes(mut self) -> Self {
        self.use_websafe_base64_for_bytes = true;
        self
    }

    /// The indent unit selected by [`add_whitespace`](Self::add_whitespace).
    pub(crate) fn indent(&self) -> &'static str {
        if self.add_whitespace { " " } else { "" }
    }
}
