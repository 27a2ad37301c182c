//! The XML object writer.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};

use xylem_parse::EventSink;

use crate::element::Element;
use crate::escape;
use crate::options::PrintOptions;
use crate::sink::{ByteSink, ZeroCopyOutput};
#[allow(unused_imports)]
use crate::warn_log;

/// An event sink that serializes into the xylem XML dialect.
///
/// Supports a compact form and a pretty-printed form. Invalid call
/// sequences (an attribute rendered after the start tag was closed, an
/// unbalanced end call) are not validated; they produce invalid output, not
/// errors.
///
/// ```
/// use xylem_format::{ObjectWriter, VecOutput};
///
/// let mut out = VecOutput::new();
/// let mut ow = ObjectWriter::new(&mut out);
/// ow.start_object("")
///     .render_string("name", "value")
///     .start_object("nested")
///     .render_i32("light", 299_792_458)
///     .end_object()
///     .start_object("text")
///     .render_string("", "abc")
///     .end_object()
///     .end_object();
/// drop(ow);
/// assert_eq!(
///     out.into_string(),
///     "<root name=\"value\"><nested light=\"299792458\"></nested><text>abc</text></root>",
/// );
/// ```
pub struct ObjectWriter<'a, S: ZeroCopyOutput + ?Sized> {
    sink: ByteSink<'a, S>,
    /// Open elements; index 0 is the root sentinel, so depth is `len - 1`.
    elements: Vec<Element>,
    indent: String,
    use_websafe_base64_for_bytes: bool,
    /// An emitted start tag still needs its `>`.
    tag_needs_closed: bool,
    /// A start tag was just emitted and nothing has followed it yet.
    start_element: bool,
}

impl<'a, S: ZeroCopyOutput + ?Sized> ObjectWriter<'a, S> {
    /// Compact writer (no indentation).
    pub fn new(out: &'a mut S) -> Self {
        Self::with_indent(out, "")
    }

    /// Writer configured from [`PrintOptions`].
    pub fn with_options(out: &'a mut S, options: PrintOptions) -> Self {
        let mut writer = Self::with_indent(out, options.indent());
        writer.use_websafe_base64_for_bytes = options.use_websafe_base64_for_bytes;
        writer
    }

    /// Writer with an explicit indent unit. An empty unit disables
    /// pretty-printing.
    pub fn with_indent(out: &'a mut S, indent: &str) -> Self {
        ObjectWriter {
            sink: ByteSink::new(out),
            elements: vec![Element::root()],
            indent: indent.to_string(),
            use_websafe_base64_for_bytes: false,
            tag_needs_closed: false,
            start_element: false,
        }
    }

    /// Switch bytes fields to the web-safe base64 alphabet.
    pub fn set_use_websafe_base64_for_bytes(&mut self, value: bool) {
        self.use_websafe_base64_for_bytes = value;
    }

    /// Number of open elements.
    pub fn depth(&self) -> usize {
        self.elements.len() - 1
    }

    /// Open an object. An empty `name` resolves to `root` at the top level
    /// and to the enclosing list's element name inside a list.
    pub fn start_object(&mut self, name: &str) -> &mut Self {
        {
            let current = self.current_mut();
            current.has_child = false;
            current.has_text = false;
            current.has_attribute = false;
        }
        self.start_element = true;

        let mut tag_name = name.to_string();
        if name.is_empty() {
            if self.depth() == 0 {
                tag_name = "root".to_string();
            } else if self.current().is_list {
                tag_name = self.current().name.clone();
            }
        }
        self.write_open_prefix();
        self.write_char(b'<');
        self.write_str(&tag_name);
        self.tag_needs_closed = true;

        self.current_mut().has_child = true;
        self.elements.push(Element::object(tag_name));
        self
    }

    /// Close the innermost object.
    pub fn end_object(&mut self) -> &mut Self {
        debug_assert!(self.depth() == 0 || self.current().is_object);
        self.start_element = false;
        let tag_name = self.current().name.clone();
        self.write_close_tag();
        if !tag_name.is_empty() {
            self.write_str("</");
            self.write_str(&tag_name);
            self.write_char(b'>');
        }
        self.pop();
        self.write_suffix();
        if self.depth() == 0 {
            self.new_line(false);
        }
        self
    }

    /// Open a repeated field as `<_list_NAME>`.
    pub fn start_list(&mut self, name: &str) -> &mut Self {
        self.start_element = true;
        self.write_open_prefix();
        self.write_str("<_list_");
        self.write_str(name);
        self.write_char(b'>');
        self.current_mut().has_child = true;
        self.elements.push(Element::list(name.to_string()));
        self
    }

    /// Close the innermost list.
    pub fn end_list(&mut self) -> &mut Self {
        debug_assert!(self.depth() == 0 || self.current().is_list);
        self.start_element = false;
        self.write_close_tag();
        let tag_name = self.current().name.clone();
        self.write_str("</_list_");
        self.write_str(&tag_name);
        self.write_char(b'>');
        self.pop();
        self.write_suffix();
        if self.depth() == 0 {
            self.new_line(false);
        }
        self
    }

    /// Render a boolean scalar.
    pub fn render_bool(&mut self, name: &str, value: bool) -> &mut Self {
        self.render_simple(name, if value { "true" } else { "false" })
    }

    /// Render a 32-bit signed integer.
    pub fn render_i32(&mut self, name: &str, value: i32) -> &mut Self {
        self.render_simple(name, &value.to_string())
    }

    /// Render a 32-bit unsigned integer.
    pub fn render_u32(&mut self, name: &str, value: u32) -> &mut Self {
        self.render_simple(name, &value.to_string())
    }

    /// Render a 64-bit signed integer. Quoted in attribute position so
    /// consumers that parse attributes as double-precision numbers keep
    /// full precision.
    pub fn render_i64(&mut self, name: &str, value: i64) -> &mut Self {
        self.write_render_prefix(name);
        if !name.is_empty() {
            self.write_char(b'"');
        }
        self.write_str(&value.to_string());
        if !name.is_empty() {
            self.write_char(b'"');
        }
        self.set_has_text_or_attribute(name);
        self.write_suffix();
        self
    }

    /// Render a 64-bit unsigned integer. Always quoted.
    pub fn render_u64(&mut self, name: &str, value: u64) -> &mut Self {
        self.write_render_prefix(name);
        self.write_char(b'"');
        self.write_str(&value.to_string());
        self.write_char(b'"');
        self.set_has_text_or_attribute(name);
        self.write_suffix();
        self
    }

    /// Render a double. Non-finite values render as the quoted strings
    /// `NaN`, `Infinity` and `-Infinity`.
    pub fn render_f64(&mut self, name: &str, value: f64) -> &mut Self {
        if value.is_finite() {
            return self.render_simple(name, &value.to_string());
        }
        self.render_string(name, non_finite_as_str(value))
    }

    /// Render a float, with the same non-finite handling as
    /// [`render_f64`](Self::render_f64).
    pub fn render_f32(&mut self, name: &str, value: f32) -> &mut Self {
        if value.is_finite() {
            return self.render_simple(name, &value.to_string());
        }
        self.render_string(name, non_finite_as_str(f64::from(value)))
    }

    /// Render a string scalar, escaped.
    pub fn render_string(&mut self, name: &str, value: &str) -> &mut Self {
        self.write_render_prefix(name);
        if !name.is_empty() {
            self.write_char(b'"');
        }
        self.write_escaped(value);
        if !name.is_empty() {
            self.write_char(b'"');
        }
        self.set_has_text_or_attribute(name);
        self.write_suffix();
        self
    }

    /// Render a bytes scalar as base64.
    pub fn render_bytes(&mut self, name: &str, value: &[u8]) -> &mut Self {
        self.write_render_prefix(name);
        let encoded = if self.use_websafe_base64_for_bytes {
            URL_SAFE.encode(value)
        } else {
            STANDARD.encode(value)
        };
        if !name.is_empty() {
            self.write_char(b'"');
        }
        self.write_str(&encoded);
        if !name.is_empty() {
            self.write_char(b'"');
        }
        self.set_has_text_or_attribute(name);
        self.write_suffix();
        self
    }

    /// Render an explicit `null` scalar.
    pub fn render_null(&mut self, name: &str) -> &mut Self {
        self.render_simple(name, "null")
    }

    /// Render a null as an empty scalar.
    pub fn render_null_as_empty(&mut self, name: &str) -> &mut Self {
        self.render_simple(name, "")
    }

    /// Emit a `<!--...-->` comment. The parser accepts and discards these.
    pub fn render_comments(&mut self, comments: &str) -> &mut Self {
        self.write_str("<!--");
        self.write_str(comments);
        self.write_str("-->");
        self
    }

    fn current(&self) -> &Element {
        self.elements.last().expect("element stack keeps its sentinel")
    }

    fn current_mut(&mut self) -> &mut Element {
        self.elements.last_mut().expect("element stack keeps its sentinel")
    }

    fn pop(&mut self) {
        if self.elements.len() > 1 {
            self.elements.pop();
        } else {
            warn_log!("end call with no open element");
        }
    }

    fn write_char(&mut self, c: u8) {
        self.sink.append(&[c]);
    }

    fn write_str(&mut self, s: &str) {
        self.sink.append(s.as_bytes());
    }

    fn write_escaped(&mut self, s: &str) {
        let escaped = escape::escape(s);
        self.sink.append(escaped.as_bytes());
    }

    /// In pretty mode, write a newline plus one indent unit per depth
    /// level; `pop` indents at the parent's level. No-op otherwise.
    fn new_line(&mut self, pop: bool) {
        if self.indent.is_empty() {
            return;
        }
        let level = self.depth().saturating_sub(usize::from(pop));
        let mut s = String::with_capacity(1 + level * self.indent.len());
        s.push('\n');
        for _ in 0..level {
            s.push_str(&self.indent);
        }
        self.sink.append(s.as_bytes());
    }

    /// Flush a pending `>` and break the line before a child element.
    fn write_open_prefix(&mut self) {
        if self.tag_needs_closed {
            self.write_char(b'>');
            self.tag_needs_closed = false;
        }
        if self.depth() > 0 {
            if self.start_element {
                self.new_line(false);
                self.start_element = false;
            } else if self.current().has_child {
                self.new_line(true);
            }
        }
    }

    /// Position the cursor for a scalar render: open an `<anonymous>`
    /// wrapper inside a list, then either emit ` NAME=` inside the open
    /// start tag or close the tag for a text value.
    fn write_render_prefix(&mut self, name: &str) {
        if self.current().is_list {
            self.new_line(false);
            self.write_str("<anonymous");
            let current = self.current_mut();
            current.anonymous = true;
            current.has_child = true;
            current.list_child_needs_end_tag = true;
            self.tag_needs_closed = true;
        }
        if !name.is_empty() {
            self.write_char(b' ');
            self.write_escaped(name);
            self.write_char(b'=');
        } else {
            self.write_char(b'>');
            self.tag_needs_closed = false;
        }
    }

    /// Flush a pending `>` and, before a closing tag, break the line when
    /// the element had child elements.
    fn write_close_tag(&mut self) {
        if self.tag_needs_closed {
            self.write_char(b'>');
            self.tag_needs_closed = false;
        }
        if self.depth() > 0 {
            if self.start_element {
                self.new_line(false);
                self.start_element = false;
            } else if self.current().has_child && !self.current().anonymous {
                self.new_line(true);
            }
        }
    }

    /// Close a pending `<anonymous>` wrapper after a primitive rendered
    /// into a list.
    fn write_suffix(&mut self) {
        if self.current().is_list && self.current().list_child_needs_end_tag {
            self.write_close_tag();
            self.write_str("</");
            if self.current().anonymous {
                self.write_str("anonymous");
                self.current_mut().anonymous = false;
            } else {
                let name = self.current().name.clone();
                self.write_str(&name);
            }
            self.write_char(b'>');
            self.current_mut().list_child_needs_end_tag = false;
        }
    }

    fn set_has_text_or_attribute(&mut self, name: &str) {
        if name.is_empty() {
            self.current_mut().has_text = true;
        } else {
            self.current_mut().has_attribute = true;
        }
    }

    fn render_simple(&mut self, name: &str, value: &str) -> &mut Self {
        self.write_render_prefix(name);
        if !name.is_empty() {
            self.write_char(b'"');
        }
        self.write_str(value);
        if !name.is_empty() {
            self.write_char(b'"');
        }
        self.set_has_text_or_attribute(name);
        self.write_suffix();
        self
    }
}

fn non_finite_as_str(value: f64) -> &'static str {
    if value.is_nan() {
        "NaN"
    } else if value > 0.0 {
        "Infinity"
    } else {
        "-Infinity"
    }
}

impl<S: ZeroCopyOutput + ?Sized> EventSink for ObjectWriter<'_, S> {
    fn start_object(&mut self, name: &str) {
        ObjectWriter::start_object(self, name);
    }

    fn end_object(&mut self) {
        ObjectWriter::end_object(self);
    }

    fn start_list(&mut self, name: &str) {
        ObjectWriter::start_list(self, name);
    }

    fn end_list(&mut self) {
        ObjectWriter::end_list(self);
    }

    fn render_scalar(&mut self, name: &str, value: &str) {
        self.render_string(name, value);
    }
}

impl<S: ZeroCopyOutput + ?Sized> Drop for ObjectWriter<'_, S> {
    fn drop(&mut self) {
        if self.depth() > 0 {
            warn_log!("object writer dropped before all elements were closed");
        }
    }
}
