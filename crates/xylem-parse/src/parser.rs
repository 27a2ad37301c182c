//! The chunked stream parser.
//!
//! A deterministic pushdown automaton over the xylem XML dialect. Parsing is
//! driven by an explicit state stack rather than recursion so that it can be
//! suspended at any chunk boundary: when a step would need bytes that have
//! not arrived yet, the step is cancelled, the state is pushed back, and the
//! unconsumed suffix is stashed in `leftover` until the next [`parse`] call.
//!
//! [`parse`]: StreamParser::parse

use std::ops::Range;

use crate::error::{ParseError, ParseErrorKind};
use crate::event::EventSink;
use crate::options::ParseOptions;
use crate::scan;
use crate::token::{self, Token};
#[allow(unused_imports)]
use crate::trace;

/// Tag-name prefix marking a repeated field element.
const LIST_PREFIX: &str = "_list_";
/// Wrapper element name for primitive values inside a list.
const ANONYMOUS: &str = "anonymous";
/// Outer envelope element name.
const ROOT: &str = "root";

/// Byte length of one escaped UTF-16 code unit (`\uXXXX`).
const UNICODE_ESCAPE_LEN: usize = 6;

/// Pending parse work, pushed youngest-last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Expects a `<`
    BeginElement,
    /// Expects a tag name, `/`, `!` or `?`
    StartTag,
    /// Expects a space or `>`
    BeginElementMid,
    /// Expects a key or `/`
    AttrKey,
    /// Expects a `=`
    AttrMid,
    /// Expects a quote
    AttrValue,
    /// Expects a `>`
    BeginElementClose,
    /// Expects text or `<`
    Text,
    /// Expects a `<`
    EndElement,
    /// Expects a `/`
    EndElementMid,
    /// Expects a tag name
    EndTag,
    /// Expects a `>`
    EndElementClose,
}

/// What kind of element each open tag introduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementKind {
    Object,
    List,
}

/// Non-success outcome of a single parse step. `Cancelled` is the internal
/// suspension token and never escapes to callers.
enum Interrupt {
    Cancelled,
    Failure(ParseError),
}

type Step<T = ()> = Result<T, Interrupt>;

/// A pending key or value: borrowed out of the current chunk when possible,
/// spilled to the parser-owned storage when a suspension or escape forces a
/// copy.
#[derive(Debug, Default)]
enum Slot {
    #[default]
    Empty,
    Borrowed(Range<usize>),
    Owned,
}

/// Where a parsed string value ended up.
enum Parsed {
    Range(Range<usize>),
    Stored,
}

/// Byte cursor over the chunk currently being parsed.
struct Cursor<'a> {
    xml: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(xml: &'a str) -> Self {
        Cursor { xml, pos: 0 }
    }

    #[inline]
    fn rest(&self) -> &'a str {
        &self.xml[self.pos..]
    }

    #[inline]
    fn rest_bytes(&self) -> &'a [u8] {
        self.rest().as_bytes()
    }

    #[inline]
    fn first(&self) -> Option<u8> {
        self.rest_bytes().first().copied()
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.pos == self.xml.len()
    }

    /// Advance one code point.
    #[inline]
    fn advance(&mut self) {
        self.pos += scan::char_width(self.xml, self.pos);
    }

    /// Advance `n` bytes. The caller guarantees the target is a char
    /// boundary.
    #[inline]
    fn advance_bytes(&mut self, n: usize) {
        self.pos += n;
    }
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\x0B' | b'\x0C' | b'\r')
}

fn hex_digit(b: u8) -> Option<u32> {
    (b as char).to_digit(16)
}

/// Consume a key or tag name: ASCII letter or `_`, then alphanumerics,
/// `_` or `-`.
fn consume_name(cur: &mut Cursor<'_>) -> Option<Range<usize>> {
    let bytes = cur.rest_bytes();
    if bytes.is_empty() || !token::is_key_start(bytes[0]) {
        return None;
    }
    let mut len = 1;
    while len < bytes.len() && token::is_key_char(bytes[len]) {
        len += 1;
    }
    let range = cur.pos..cur.pos + len;
    cur.advance_bytes(len);
    Some(range)
}

enum TextScan {
    Valid(Range<usize>),
    Incomplete,
    Invalid,
}

enum EntityMatch {
    Full,
    Partial,
    None,
}

/// Match one of the five predefined entities at the front of `bytes`.
fn entity_at(bytes: &[u8]) -> EntityMatch {
    const ENTITIES: [&[u8]; 5] = [b"&lt;", b"&gt;", b"&amp;", b"&apos;", b"&quot;"];
    let mut partial = false;
    for entity in ENTITIES {
        if bytes.len() >= entity.len() {
            if &bytes[..entity.len()] == entity {
                return EntityMatch::Full;
            }
        } else if entity.starts_with(bytes) {
            partial = true;
        }
    }
    if partial {
        EntityMatch::Partial
    } else {
        EntityMatch::None
    }
}

/// Consume a text node up to the next `<`. The first byte is taken
/// unconditionally; from then on an `&` must begin a predefined entity.
/// Entities are validated, not decoded. An `&`-run cut off by the end of
/// input is `Incomplete` unless `finishing`.
fn consume_text(cur: &mut Cursor<'_>, finishing: bool) -> TextScan {
    let bytes = cur.rest_bytes();
    if bytes.is_empty() {
        return TextScan::Invalid;
    }
    let mut len = 1;
    while len < bytes.len() {
        match bytes[len] {
            b'<' => break,
            b'&' => match entity_at(&bytes[len..]) {
                EntityMatch::Full => {}
                EntityMatch::Partial if !finishing => return TextScan::Incomplete,
                _ => return TextScan::Invalid,
            },
            _ => {}
        }
        len += 1;
    }
    let range = cur.pos..cur.pos + len;
    cur.advance_bytes(len);
    TextScan::Valid(range)
}

/// A parser that accepts the dialect XML as a stream of byte chunks rather
/// than needing the whole document up front.
///
/// Events are delivered to the [`EventSink`] passed to each call, in strict
/// source order. After a hard error the parser is poisoned and should be
/// discarded.
///
/// ```
/// use xylem_parse::{Event, StreamParser};
///
/// let mut events: Vec<Event> = Vec::new();
/// let mut parser = StreamParser::new();
/// parser.parse(b"<root test=", &mut events).unwrap();
/// parser.parse(b"\"Some String\"></root>", &mut events).unwrap();
/// parser.finish_parse(&mut events).unwrap();
/// assert_eq!(
///     events,
///     vec![
///         Event::StartObject(String::new()),
///         Event::scalar("test", "Some String"),
///         Event::EndObject,
///     ],
/// );
/// ```
pub struct StreamParser {
    options: ParseOptions,

    /// Parsing still to be done. Empty means a complete document was
    /// consumed.
    stack: Vec<ParseState>,

    /// Bytes from previous chunks that could not yet be fully classified.
    leftover: Vec<u8>,

    /// The last attribute key read, pending its value.
    key: Slot,
    key_storage: String,

    /// Accumulates a string value when escapes or chunk boundaries force a
    /// copy; stays empty on the zero-copy path.
    parsed_storage: String,

    /// Quote character of the string being parsed, 0 when no string is in
    /// progress.
    string_open: u8,

    /// True during `finish_parse`, when running out of input is a hard
    /// error instead of a suspension.
    finishing: bool,

    /// Open non-list, non-`anonymous` objects.
    recursion_depth: usize,

    /// Open elements as (name, is_list), for close-tag matching. List names
    /// are stored stripped of the `_list_` prefix.
    tag_stack: Vec<(String, bool)>,

    /// Parallel to `tag_stack`, labeling each element OBJECT or LIST.
    kind_stack: Vec<ElementKind>,
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamParser {
    /// Create a parser with default options.
    pub fn new() -> Self {
        Self::with_options(ParseOptions::default())
    }

    /// Create a parser with the given options.
    pub fn with_options(options: ParseOptions) -> Self {
        StreamParser {
            options,
            stack: vec![ParseState::BeginElement],
            leftover: Vec::new(),
            key: Slot::Empty,
            key_storage: String::new(),
            parsed_storage: String::new(),
            string_open: 0,
            finishing: false,
            recursion_depth: 0,
            tag_stack: Vec::new(),
            kind_stack: Vec::new(),
        }
    }

    /// The options this parser was built with.
    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Number of currently open non-list, non-`anonymous` objects.
    pub fn recursion_depth(&self) -> usize {
        self.recursion_depth
    }

    /// Parse one chunk of input, delivering any completed events to `sink`.
    ///
    /// Work that cannot complete within this chunk is suspended and resumed
    /// by the next `parse` or [`finish_parse`](StreamParser::finish_parse)
    /// call. Only the longest structurally valid UTF-8 prefix of the
    /// buffered input is parsed; trailing bytes wait for more data.
    pub fn parse<S: EventSink + ?Sized>(
        &mut self,
        chunk: &[u8],
        sink: &mut S,
    ) -> Result<(), ParseError> {
        let storage;
        let combined: &[u8] = if self.leftover.is_empty() {
            chunk
        } else {
            let mut buf = std::mem::take(&mut self.leftover);
            buf.extend_from_slice(chunk);
            storage = buf;
            &storage
        };

        let (valid, rest) = scan::utf8_prefix(combined);
        if valid.is_empty() {
            self.leftover = combined.to_vec();
            return Ok(());
        }
        let result = self.parse_chunk(valid, sink);
        self.leftover.extend_from_slice(rest);
        result
    }

    /// Finish parsing, flushing all suspended state.
    ///
    /// Errors that a mid-stream chunk would have suspended on (an
    /// unterminated string, a half comment) are reported from here.
    pub fn finish_parse<S: EventSink + ?Sized>(
        &mut self,
        sink: &mut S,
    ) -> Result<(), ParseError> {
        if self.stack.is_empty() && self.leftover.is_empty() && self.tag_stack.is_empty() {
            return Ok(());
        }

        let leftover = std::mem::take(&mut self.leftover);
        let coerced;
        let (valid, rest) = scan::utf8_prefix(&leftover);
        let xml: &str = if rest.is_empty() {
            valid
        } else if self.options.coerce_to_utf8 {
            coerced = scan::replace_invalid(&leftover, &self.options.utf8_replacement);
            &coerced
        } else {
            let lossy = String::from_utf8_lossy(&leftover);
            return Err(ParseError::with_context(
                ParseErrorKind::NonUtf8,
                "Encountered non UTF-8 code points.",
                &lossy,
                0,
            ));
        };

        self.finishing = true;
        let mut cur = Cursor::new(xml);
        self.run_parser(&mut cur, sink)?;
        self.skip_whitespace(&mut cur);
        if !cur.is_empty() {
            return Err(self.failure(
                "Parsing terminated before end of input.",
                ParseErrorKind::ParsingTerminatedBeforeEndOfInput,
                &cur,
            ));
        }
        Ok(())
    }

    fn parse_chunk<S: EventSink + ?Sized>(
        &mut self,
        xml: &str,
        sink: &mut S,
    ) -> Result<(), ParseError> {
        if xml.is_empty() {
            return Ok(());
        }
        self.finishing = false;
        let mut cur = Cursor::new(xml);
        self.run_parser(&mut cur, sink)?;

        self.skip_whitespace(&mut cur);
        if cur.is_empty() {
            self.leftover.clear();
        } else if self.stack.is_empty() {
            return Err(self.failure(
                "Parsing terminated before end of input.",
                ParseErrorKind::ParsingTerminatedBeforeEndOfInput,
                &cur,
            ));
        } else {
            self.leftover = cur.rest_bytes().to_vec();
        }
        Ok(())
    }

    /// Pop and run states until the stack is drained, the input runs out,
    /// or a step fails. On suspension the interrupted state is pushed back
    /// and any pending key is spilled to owned storage.
    fn run_parser<S: EventSink + ?Sized>(
        &mut self,
        cur: &mut Cursor<'_>,
        sink: &mut S,
    ) -> Result<(), ParseError> {
        while let Some(state) = self.stack.pop() {
            let tok = if self.string_open == 0 {
                self.next_token(state, cur)
            } else {
                Token::BeginString
            };
            trace!(?state, ?tok, pos = cur.pos, "step");
            let result = match state {
                ParseState::BeginElement => self.parse_begin_element(tok, cur),
                ParseState::StartTag => self.parse_start_tag(tok, cur, sink),
                ParseState::BeginElementMid => self.parse_begin_element_mid(tok, cur),
                ParseState::AttrKey => self.parse_attr_key(tok, cur),
                ParseState::AttrMid => self.parse_attr_mid(tok, cur),
                ParseState::AttrValue => self.parse_attr_value(tok, cur, sink),
                ParseState::BeginElementClose => self.parse_begin_element_close(tok, cur),
                ParseState::Text => self.parse_text(tok, cur, sink),
                ParseState::EndElement => self.parse_end_element(tok, cur),
                ParseState::EndElementMid => self.parse_end_element_mid(tok, cur),
                ParseState::EndTag => self.parse_end_tag(tok, cur, sink),
                ParseState::EndElementClose => self.parse_end_element_close(tok, cur),
            };
            match result {
                Ok(()) => {}
                Err(Interrupt::Cancelled) => {
                    trace!(?state, "suspend");
                    self.stack.push(state);
                    if let Slot::Borrowed(range) = &self.key {
                        self.key_storage = cur.xml[range.clone()].to_string();
                        self.key = Slot::Owned;
                    }
                    return Ok(());
                }
                Err(Interrupt::Failure(err)) => return Err(err),
            }
        }
        Ok(())
    }

    fn next_token(&self, state: ParseState, cur: &mut Cursor<'_>) -> Token {
        self.skip_whitespace_for(state, cur);
        Token::classify(cur.rest_bytes())
    }

    fn skip_whitespace(&self, cur: &mut Cursor<'_>) {
        while let Some(b) = cur.first() {
            if !is_space(b) {
                break;
            }
            cur.advance();
        }
    }

    /// Whitespace skipping with the attribute-separator carve-out: inside
    /// an opening tag a whitespace byte is consumed only when the byte
    /// after it is also whitespace, so the final one survives as the
    /// `ATTR_SEPARATOR` token (or as `leftover` at a chunk boundary).
    fn skip_whitespace_for(&self, state: ParseState, cur: &mut Cursor<'_>) {
        while let Some(b) = cur.first() {
            if !is_space(b) {
                break;
            }
            if state == ParseState::BeginElementMid {
                let rest = cur.rest_bytes();
                if rest.len() == 1 || !is_space(rest[1]) {
                    break;
                }
            }
            cur.advance();
        }
    }

    fn failure(&self, message: impl Into<String>, kind: ParseErrorKind, cur: &Cursor<'_>) -> ParseError {
        ParseError::with_context(kind, message, cur.xml, cur.pos)
    }

    fn fail<T>(&self, message: &str, kind: ParseErrorKind, cur: &Cursor<'_>) -> Step<T> {
        Err(Interrupt::Failure(self.failure(message, kind, cur)))
    }

    /// Report an UNKNOWN token: suspend mid-stream, fail when finishing.
    fn unknown<T>(&self, message: &str, kind: ParseErrorKind, cur: &Cursor<'_>) -> Step<T> {
        if !self.finishing {
            return Err(Interrupt::Cancelled);
        }
        if cur.is_empty() {
            Err(Interrupt::Failure(self.failure(
                format!("Unexpected end of string. {message}"),
                kind,
                cur,
            )))
        } else {
            self.fail(message, kind, cur)
        }
    }

    fn parse_begin_element(&mut self, tok: Token, cur: &mut Cursor<'_>) -> Step {
        match tok {
            Token::OpenTag => {
                cur.advance();
                self.stack.push(ParseState::StartTag);
                Ok(())
            }
            Token::Unknown => {
                self.unknown("Expected an open tag.", ParseErrorKind::ExpectedOpenTag, cur)
            }
            _ => self.fail("Expected an open tag.", ParseErrorKind::ExpectedOpenTag, cur),
        }
    }

    fn parse_start_tag<S: EventSink + ?Sized>(
        &mut self,
        tok: Token,
        cur: &mut Cursor<'_>,
        sink: &mut S,
    ) -> Step {
        match tok {
            Token::Declaration => {
                self.parse_declaration(cur)?;
                self.requeue_after_prologue();
                Ok(())
            }
            Token::Comment => {
                self.parse_comment(cur)?;
                self.requeue_after_prologue();
                Ok(())
            }
            Token::BeginKey => self.parse_start_tag_name(cur, sink),
            Token::EndTagSlash => {
                // `</` where a child element could have begun: the pending
                // TEXT never materialized, so drop it before matching the
                // close tag.
                cur.advance();
                if self.stack.last() == Some(&ParseState::Text) {
                    self.stack.pop();
                }
                self.stack.push(ParseState::EndTag);
                Ok(())
            }
            Token::Unknown => {
                self.unknown("Expected a tag name.", ParseErrorKind::ExpectedTagName, cur)
            }
            _ => self.fail("Expected a tag name.", ParseErrorKind::ExpectedTagName, cur),
        }
    }

    /// A comment or declaration in document-prologue position leaves the
    /// stack empty; requeue the root-element expectation. Inside element
    /// content the enclosing TEXT state is already stacked.
    fn requeue_after_prologue(&mut self) {
        if self.stack.is_empty() {
            self.stack.push(ParseState::BeginElement);
        }
    }

    fn parse_begin_element_mid(&mut self, tok: Token, cur: &mut Cursor<'_>) -> Step {
        match tok {
            Token::AttrSeparator => {
                cur.advance();
                self.stack.push(ParseState::AttrKey);
                Ok(())
            }
            Token::CloseTag => {
                cur.advance();
                self.stack.push(ParseState::Text);
                Ok(())
            }
            Token::Unknown => self.unknown(
                "Expected a space or a close tag.",
                ParseErrorKind::ExpectedSpaceOrCloseTag,
                cur,
            ),
            _ => self.fail(
                "Expected a space or a close tag.",
                ParseErrorKind::ExpectedSpaceOrCloseTag,
                cur,
            ),
        }
    }

    fn parse_attr_key(&mut self, tok: Token, cur: &mut Cursor<'_>) -> Step {
        match tok {
            Token::EndTagSlash => {
                cur.advance();
                self.stack.push(ParseState::BeginElementClose);
                Ok(())
            }
            Token::BeginKey => {
                self.parse_key(cur)?;
                self.stack.push(ParseState::AttrMid);
                Ok(())
            }
            Token::Unknown => self.unknown(
                "Expected a begin key or a slash.",
                ParseErrorKind::ExpectedBeginKeyOrSlash,
                cur,
            ),
            _ => self.fail(
                "Expected a begin key or a slash.",
                ParseErrorKind::ExpectedBeginKeyOrSlash,
                cur,
            ),
        }
    }

    fn parse_key(&mut self, cur: &mut Cursor<'_>) -> Step {
        let start = cur.pos;
        let Some(range) = consume_name(cur) else {
            return self.fail("Invalid key.", ParseErrorKind::InvalidKey, cur);
        };
        // If we consumed everything but expect more data, rewind and
        // suspend: the key may be incomplete.
        if !self.finishing && cur.is_empty() {
            cur.pos = start;
            return Err(Interrupt::Cancelled);
        }
        self.key = Slot::Borrowed(range);
        self.key_storage.clear();
        Ok(())
    }

    fn parse_attr_mid(&mut self, tok: Token, cur: &mut Cursor<'_>) -> Step {
        match tok {
            Token::AttrValueSeparator => {
                cur.advance();
                self.stack.push(ParseState::AttrValue);
                Ok(())
            }
            Token::Unknown => self.unknown(
                "Expected a equal mark.",
                ParseErrorKind::ExpectedEqualMark,
                cur,
            ),
            _ => self.fail(
                "Expected a equal mark.",
                ParseErrorKind::ExpectedEqualMark,
                cur,
            ),
        }
    }

    fn parse_attr_value<S: EventSink + ?Sized>(
        &mut self,
        tok: Token,
        cur: &mut Cursor<'_>,
        sink: &mut S,
    ) -> Step {
        match tok {
            Token::BeginString => {
                let parsed = self.parse_string_helper(cur)?;
                {
                    let key = match &self.key {
                        Slot::Borrowed(range) => &cur.xml[range.clone()],
                        Slot::Owned => self.key_storage.as_str(),
                        Slot::Empty => "",
                    };
                    let value = match &parsed {
                        Parsed::Range(range) => &cur.xml[range.clone()],
                        Parsed::Stored => self.parsed_storage.as_str(),
                    };
                    sink.render_scalar(key, value);
                }
                self.key = Slot::Empty;
                self.key_storage.clear();
                self.parsed_storage.clear();
                self.stack.push(ParseState::BeginElementMid);
                Ok(())
            }
            Token::Unknown => self.unknown(
                "Expected a quote before attribute value.",
                ParseErrorKind::ExpectedQuoteBeforeAttrValue,
                cur,
            ),
            _ => self.fail(
                "Expected a quote before attribute value.",
                ParseErrorKind::ExpectedQuoteBeforeAttrValue,
                cur,
            ),
        }
    }

    fn parse_begin_element_close(&mut self, tok: Token, cur: &mut Cursor<'_>) -> Step {
        match tok {
            Token::CloseTag => {
                cur.advance();
                self.stack.push(ParseState::Text);
                Ok(())
            }
            Token::Unknown => self.unknown(
                "Expected a close tag.",
                ParseErrorKind::ExpectedCloseTag,
                cur,
            ),
            _ => self.fail(
                "Expected a close tag in begin element.",
                ParseErrorKind::ExpectedCloseTagInBeginElement,
                cur,
            ),
        }
    }

    fn parse_text<S: EventSink + ?Sized>(
        &mut self,
        tok: Token,
        cur: &mut Cursor<'_>,
        sink: &mut S,
    ) -> Step {
        match tok {
            Token::OpenTag => {
                // Lookahead: this may open a child or close this element,
                // resolved when START_TAG dispatches.
                cur.advance();
                self.stack.push(ParseState::Text);
                self.stack.push(ParseState::StartTag);
                Ok(())
            }
            Token::Unknown => {
                self.unknown("Expected an open tag.", ParseErrorKind::ExpectedOpenTag, cur)
            }
            _ => self.parse_text_node(cur, sink),
        }
    }

    fn parse_text_node<S: EventSink + ?Sized>(
        &mut self,
        cur: &mut Cursor<'_>,
        sink: &mut S,
    ) -> Step {
        let start = cur.pos;
        let range = match consume_text(cur, self.finishing) {
            TextScan::Valid(range) => range,
            TextScan::Incomplete => {
                cur.pos = start;
                return Err(Interrupt::Cancelled);
            }
            TextScan::Invalid => {
                return self.fail("Invalid text.", ParseErrorKind::InvalidText, cur);
            }
        };
        // Consumed everything without seeing `<`: the node may continue in
        // the next chunk.
        if !self.finishing && cur.is_empty() {
            cur.pos = start;
            return Err(Interrupt::Cancelled);
        }
        sink.render_scalar("", &cur.xml[range]);
        self.stack.push(ParseState::EndElement);
        Ok(())
    }

    fn parse_end_element(&mut self, tok: Token, cur: &mut Cursor<'_>) -> Step {
        match tok {
            Token::OpenTag => {
                cur.advance();
                self.stack.push(ParseState::EndElementMid);
                Ok(())
            }
            Token::Unknown => {
                self.unknown("Expected an open tag.", ParseErrorKind::ExpectedOpenTag, cur)
            }
            _ => self.fail(
                "Expected a open tag in end element.",
                ParseErrorKind::ExpectedOpenTagInEndElement,
                cur,
            ),
        }
    }

    fn parse_end_element_mid(&mut self, tok: Token, cur: &mut Cursor<'_>) -> Step {
        match tok {
            Token::EndTagSlash => {
                cur.advance();
                self.stack.push(ParseState::EndTag);
                Ok(())
            }
            Token::Unknown => self.unknown("Expected a slash.", ParseErrorKind::ExpectedSlash, cur),
            _ => self.fail(
                "Expected an end tag slash.",
                ParseErrorKind::ExpectedEndTagSlash,
                cur,
            ),
        }
    }

    fn parse_end_tag<S: EventSink + ?Sized>(
        &mut self,
        tok: Token,
        cur: &mut Cursor<'_>,
        sink: &mut S,
    ) -> Step {
        match tok {
            Token::BeginKey => {
                let start = cur.pos;
                let Some(range) = consume_name(cur) else {
                    return self.fail(
                        "Invalid end tag name.",
                        ParseErrorKind::InvalidEndTagName,
                        cur,
                    );
                };
                if !self.finishing && cur.is_empty() {
                    cur.pos = start;
                    return Err(Interrupt::Cancelled);
                }
                let tag_name = &cur.xml[range];
                let (stripped, end_list) = match tag_name.strip_prefix(LIST_PREFIX) {
                    Some(rest) => (rest, true),
                    None => (tag_name, false),
                };
                let matches = self
                    .tag_stack
                    .last()
                    .is_some_and(|(open, open_is_list)| open == stripped && *open_is_list == end_list);
                if !matches {
                    return self.fail("Tag name not match.", ParseErrorKind::TagNameNotMatch, cur);
                }
                if end_list {
                    sink.end_list();
                } else if stripped != ANONYMOUS {
                    sink.end_object();
                    self.recursion_depth -= 1;
                }
                self.kind_stack.pop();
                self.tag_stack.pop();
                self.stack.push(ParseState::EndElementClose);
                Ok(())
            }
            Token::Unknown => {
                self.unknown("Expected a tag name.", ParseErrorKind::ExpectedTagName, cur)
            }
            _ => self.fail(
                "Expected a tag name in end tag.",
                ParseErrorKind::ExpectedTagNameInEndTag,
                cur,
            ),
        }
    }

    fn parse_end_element_close(&mut self, tok: Token, cur: &mut Cursor<'_>) -> Step {
        match tok {
            Token::CloseTag => {
                cur.advance();
                Ok(())
            }
            Token::Unknown => self.unknown(
                "Expected a close tag.",
                ParseErrorKind::ExpectedCloseTag,
                cur,
            ),
            _ => self.fail(
                "Expected an close tag in end element.",
                ParseErrorKind::ExpectedCloseInEndElement,
                cur,
            ),
        }
    }

    fn parse_start_tag_name<S: EventSink + ?Sized>(
        &mut self,
        cur: &mut Cursor<'_>,
        sink: &mut S,
    ) -> Step {
        let start = cur.pos;
        let Some(range) = consume_name(cur) else {
            return self.fail("Invalid tag name.", ParseErrorKind::InvalidTagName, cur);
        };
        if !self.finishing && cur.is_empty() {
            cur.pos = start;
            return Err(Interrupt::Cancelled);
        }
        let tag_name = &cur.xml[range];

        if let Some(stripped) = tag_name.strip_prefix(LIST_PREFIX) {
            sink.start_list(stripped);
            self.kind_stack.push(ElementKind::List);
            self.tag_stack.push((stripped.to_string(), true));
        } else {
            let parent_is_list = self.kind_stack.last() == Some(&ElementKind::List);
            self.kind_stack.push(ElementKind::Object);
            if tag_name != ANONYMOUS {
                if tag_name == ROOT || parent_is_list {
                    sink.start_object("");
                } else {
                    sink.start_object(tag_name);
                }
                self.increment_recursion_depth(tag_name)?;
            }
            self.tag_stack.push((tag_name.to_string(), false));
        }
        self.stack.push(ParseState::BeginElementMid);
        Ok(())
    }

    fn increment_recursion_depth(&mut self, tag_name: &str) -> Step {
        self.recursion_depth += 1;
        if self.recursion_depth > self.options.max_recursion_depth {
            return Err(Interrupt::Failure(ParseError::bare(
                ParseErrorKind::MessageTooDeep,
                format!("Message too deep. Max recursion depth reached for tag '{tag_name}'"),
            )));
        }
        Ok(())
    }

    /// Scan a quoted string. The value aliases the input when no escape and
    /// no chunk boundary intervened, otherwise it accumulates in
    /// `parsed_storage` (including across suspensions: `string_open`
    /// remembers the quote so the scan resumes mid-string).
    fn parse_string_helper(&mut self, cur: &mut Cursor<'_>) -> Step<Parsed> {
        if self.string_open == 0 {
            if let Some(quote) = cur.first() {
                self.string_open = quote;
                cur.advance();
            }
        }
        let mut last = cur.pos;
        while let Some(b) = cur.first() {
            if b == b'\\' {
                if last < cur.pos {
                    self.parsed_storage.push_str(&cur.xml[last..cur.pos]);
                }
                let rest = cur.rest_bytes();
                if rest.len() == 1 {
                    if !self.finishing {
                        return Err(Interrupt::Cancelled);
                    }
                    return self.fail(
                        "Closing quote expected in string.",
                        ParseErrorKind::ExpectedClosingQuote,
                        cur,
                    );
                }
                if rest[1] == b'u' {
                    self.parse_unicode_escape(cur)?;
                    last = cur.pos;
                    continue;
                }
                let (decoded, consumed) = match rest[1] {
                    b'b' => ('\u{8}', 2),
                    b'f' => ('\u{C}', 2),
                    b'n' => ('\n', 2),
                    b'r' => ('\r', 2),
                    b't' => ('\t', 2),
                    b'v' => ('\u{B}', 2),
                    _ => {
                        let c = cur.xml[cur.pos + 1..].chars().next().unwrap_or('\u{FFFD}');
                        (c, 1 + c.len_utf8())
                    }
                };
                self.parsed_storage.push(decoded);
                cur.advance_bytes(consumed);
                last = cur.pos;
                continue;
            }
            if b == self.string_open {
                let parsed = if self.parsed_storage.is_empty() {
                    Parsed::Range(last..cur.pos)
                } else {
                    self.parsed_storage.push_str(&cur.xml[last..cur.pos]);
                    Parsed::Stored
                };
                self.string_open = 0;
                cur.advance();
                return Ok(parsed);
            }
            cur.advance();
        }
        // Ran out of input: keep what we have and either suspend or report
        // the unterminated string.
        self.parsed_storage.push_str(&cur.xml[last..cur.pos]);
        if !self.finishing {
            return Err(Interrupt::Cancelled);
        }
        self.string_open = 0;
        self.fail(
            "Closing quote expected in string.",
            ParseErrorKind::ExpectedClosingQuote,
            cur,
        )
    }

    /// Decode `\uXXXX` at the cursor, combining surrogate pairs into the
    /// supplementary code point they encode.
    fn parse_unicode_escape(&mut self, cur: &mut Cursor<'_>) -> Step {
        let rest = cur.rest_bytes();
        if rest.len() < UNICODE_ESCAPE_LEN {
            if !self.finishing {
                return Err(Interrupt::Cancelled);
            }
            return self.fail("Illegal hex string.", ParseErrorKind::IllegalHexString, cur);
        }
        let mut code: u32 = 0;
        for &b in &rest[2..UNICODE_ESCAPE_LEN] {
            let Some(digit) = hex_digit(b) else {
                return self.fail(
                    "Invalid escape sequence.",
                    ParseErrorKind::InvalidEscapeSequence,
                    cur,
                );
            };
            code = (code << 4) + digit;
        }
        if scan::is_high_surrogate(code) {
            if rest.len() < 2 * UNICODE_ESCAPE_LEN {
                if !self.finishing {
                    return Err(Interrupt::Cancelled);
                }
                if !self.options.coerce_to_utf8 {
                    return self.fail(
                        "Missing low surrogate.",
                        ParseErrorKind::MissingLowSurrogate,
                        cur,
                    );
                }
            } else if rest[UNICODE_ESCAPE_LEN] == b'\\' && rest[UNICODE_ESCAPE_LEN + 1] == b'u' {
                let mut low: u32 = 0;
                for &b in &rest[UNICODE_ESCAPE_LEN + 2..2 * UNICODE_ESCAPE_LEN] {
                    let Some(digit) = hex_digit(b) else {
                        return self.fail(
                            "Invalid escape sequence.",
                            ParseErrorKind::InvalidEscapeSequence,
                            cur,
                        );
                    };
                    low = (low << 4) + digit;
                }
                if scan::is_low_surrogate(low) {
                    code = scan::combine_surrogates(code, low);
                    // Step past the high code unit escape; the shared
                    // advance below consumes the low one.
                    cur.advance_bytes(UNICODE_ESCAPE_LEN);
                } else if !self.options.coerce_to_utf8 {
                    return self.fail(
                        "Invalid low surrogate.",
                        ParseErrorKind::InvalidLowSurrogate,
                        cur,
                    );
                }
            } else if !self.options.coerce_to_utf8 {
                return self.fail(
                    "Missing low surrogate.",
                    ParseErrorKind::MissingLowSurrogate,
                    cur,
                );
            }
        }
        if !self.options.coerce_to_utf8 && !scan::is_valid_code_point(code) {
            return self.fail(
                "Invalid unicode code point.",
                ParseErrorKind::InvalidUnicode,
                cur,
            );
        }
        cur.advance_bytes(UNICODE_ESCAPE_LEN);
        match char::from_u32(code) {
            Some(c) => self.parsed_storage.push(c),
            // Unpaired surrogate under coercion.
            None => self.parsed_storage.push_str(&self.options.utf8_replacement),
        }
        Ok(())
    }

    /// Scan `<!--...-->` after the `!` token. The comment is discarded. A
    /// comment cut off by the chunk boundary rewinds to the `!` so it
    /// re-parses whole from `leftover`.
    fn parse_comment(&mut self, cur: &mut Cursor<'_>) -> Step {
        let start = cur.pos;
        cur.advance();
        let rest = cur.rest_bytes();
        if rest.len() < 2 {
            if !self.finishing {
                cur.pos = start;
                return Err(Interrupt::Cancelled);
            }
            return self.fail("Illegal comment.", ParseErrorKind::IllegalComment, cur);
        }
        if &rest[..2] != b"--" {
            return self.fail(
                "Dash expected in comment.",
                ParseErrorKind::ExpectedDashInComment,
                cur,
            );
        }
        cur.advance_bytes(2);
        loop {
            let rest = cur.rest_bytes();
            if rest.starts_with(b"-->") {
                cur.advance_bytes(3);
                return Ok(());
            }
            if rest.is_empty() || rest == b"-" || rest == b"--" {
                if !self.finishing {
                    cur.pos = start;
                    return Err(Interrupt::Cancelled);
                }
                return self.fail(
                    "Close dash expected in comment.",
                    ParseErrorKind::ExpectedCloseDashInComment,
                    cur,
                );
            }
            if rest.starts_with(b"--") {
                return self.fail(
                    "Illegal close comment.",
                    ParseErrorKind::IllegalCloseComment,
                    cur,
                );
            }
            cur.advance();
        }
    }

    /// Scan `<?...?>` after the `?` token. The declaration is discarded.
    /// Suspension rewinds to the `?` like [`parse_comment`].
    ///
    /// [`parse_comment`]: StreamParser::parse_comment
    fn parse_declaration(&mut self, cur: &mut Cursor<'_>) -> Step {
        let start = cur.pos;
        cur.advance();
        if cur.is_empty() && self.finishing {
            return self.fail(
                "Illegal comment.",
                ParseErrorKind::IllegalDeclaration,
                cur,
            );
        }
        loop {
            let rest = cur.rest_bytes();
            if rest.is_empty() || rest == b"?" {
                if !self.finishing {
                    cur.pos = start;
                    return Err(Interrupt::Cancelled);
                }
                return self.fail(
                    "Close question mark expected in comment.",
                    ParseErrorKind::ExpectedCloseQuestionMarkInDeclaration,
                    cur,
                );
            }
            if rest[0] == b'?' {
                if rest[1] == b'>' {
                    cur.advance_bytes(2);
                    return Ok(());
                }
                return self.fail(
                    "Illegal close declaration.",
                    ParseErrorKind::IllegalCloseDeclaration,
                    cur,
                );
            }
            cur.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;

    fn parse_all(xml: &str) -> Result<Vec<Event>, ParseError> {
        let mut events = Vec::new();
        let mut parser = StreamParser::new();
        parser.parse(xml.as_bytes(), &mut events)?;
        parser.finish_parse(&mut events)?;
        assert_eq!(parser.recursion_depth(), 0);
        Ok(events)
    }

    fn obj(name: &str) -> Event {
        Event::StartObject(name.to_string())
    }

    fn list(name: &str) -> Event {
        Event::StartList(name.to_string())
    }

    #[test]
    fn test_empty_root_object() {
        assert_eq!(
            parse_all("<root></root>").unwrap(),
            vec![obj(""), Event::EndObject]
        );
    }

    #[test]
    fn test_empty_list() {
        assert_eq!(
            parse_all("<_list_empty></_list_empty>").unwrap(),
            vec![list("empty"), Event::EndList]
        );
    }

    #[test]
    fn test_attribute() {
        assert_eq!(
            parse_all("<root test=\"Some String\"></root>").unwrap(),
            vec![obj(""), Event::scalar("test", "Some String"), Event::EndObject]
        );
    }

    #[test]
    fn test_single_quoted_attribute() {
        assert_eq!(
            parse_all("<root test='Another String'></root>").unwrap(),
            vec![
                obj(""),
                Event::scalar("test", "Another String"),
                Event::EndObject
            ]
        );
    }

    #[test]
    fn test_text_node() {
        assert_eq!(
            parse_all("<root>true</root>").unwrap(),
            vec![obj(""), Event::scalar("", "true"), Event::EndObject]
        );
    }

    #[test]
    fn test_named_child_object() {
        assert_eq!(
            parse_all("<root><nested field=\"value\"></nested></root>").unwrap(),
            vec![
                obj(""),
                obj("nested"),
                Event::scalar("field", "value"),
                Event::EndObject,
                Event::EndObject
            ]
        );
    }

    #[test]
    fn test_list_members_are_anonymous_objects() {
        assert_eq!(
            parse_all("<root><_list_test><test>one</test></_list_test></root>").unwrap(),
            vec![
                obj(""),
                list("test"),
                obj(""),
                Event::scalar("", "one"),
                Event::EndObject,
                Event::EndList,
                Event::EndObject
            ]
        );
    }

    #[test]
    fn test_anonymous_wrapper_emits_no_object_events() {
        assert_eq!(
            parse_all("<_list_test><anonymous>a</anonymous></_list_test>").unwrap(),
            vec![list("test"), Event::scalar("", "a"), Event::EndList]
        );
    }

    #[test]
    fn test_chunked_resume_across_attribute() {
        let mut events = Vec::new();
        let mut parser = StreamParser::new();
        parser.parse(b"<root te", &mut events).unwrap();
        parser.parse(b"st=\"Some ", &mut events).unwrap();
        parser.parse(b"String\"></root>", &mut events).unwrap();
        parser.finish_parse(&mut events).unwrap();
        assert_eq!(
            events,
            vec![obj(""), Event::scalar("test", "Some String"), Event::EndObject]
        );
    }

    #[test]
    fn test_declaration_and_comment_prologue() {
        assert_eq!(
            parse_all("<?xml version=\"1.0\"?><!-- hi --><root></root>").unwrap(),
            vec![obj(""), Event::EndObject]
        );
    }

    #[test]
    fn test_comment_inside_element() {
        assert_eq!(
            parse_all("<root><!-- note --><a></a></root>").unwrap(),
            vec![obj(""), obj("a"), Event::EndObject, Event::EndObject]
        );
    }

    #[test]
    fn test_escapes_in_attribute_value() {
        assert_eq!(
            parse_all(r#"<root a="x\ty\n\"z\""></root>"#).unwrap(),
            vec![obj(""), Event::scalar("a", "x\ty\n\"z\""), Event::EndObject]
        );
    }

    #[test]
    fn test_unicode_escape_surrogate_pair() {
        assert_eq!(
            parse_all("<root a=\"\\uD83D\\uDC1D\"></root>").unwrap(),
            vec![obj(""), Event::scalar("a", "\u{1F41D}"), Event::EndObject]
        );
    }

    #[test]
    fn test_unicode_escape_basic() {
        assert_eq!(
            parse_all("<root a=\"A\\u00e9\"></root>").unwrap(),
            vec![obj(""), Event::scalar("a", "A\u{E9}"), Event::EndObject]
        );
    }

    #[test]
    fn test_unpaired_high_surrogate_fails() {
        let err = parse_all(r#"<root a="\uD800x"></root>"#).unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::MissingLowSurrogate);
    }

    #[test]
    fn test_lone_low_surrogate_fails() {
        let err = parse_all(r#"<root a="\uDC00"></root>"#).unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::InvalidUnicode);
    }

    #[test]
    fn test_coerced_unpaired_surrogate_renders_replacement() {
        let mut events = Vec::new();
        let mut parser = StreamParser::with_options(ParseOptions::new().coerce_to_utf8("?"));
        parser
            .parse(br#"<root a="\uD800x"></root>"#, &mut events)
            .unwrap();
        parser.finish_parse(&mut events).unwrap();
        assert_eq!(
            events,
            vec![obj(""), Event::scalar("a", "?x"), Event::EndObject]
        );
    }

    #[test]
    fn test_invalid_attr_key() {
        let err = parse_all("<root 01234=\"x\"></root>").unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::ExpectedBeginKeyOrSlash);
        assert!(err.message().starts_with("Expected a begin key or a slash."));
    }

    #[test]
    fn test_mismatched_close_tag() {
        let err = parse_all("<root></true>").unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::TagNameNotMatch);
    }

    #[test]
    fn test_close_without_open() {
        let err = parse_all("</root>").unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::TagNameNotMatch);
    }

    #[test]
    fn test_list_close_must_match_list_open() {
        let err = parse_all("<_list_f></f>").unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::TagNameNotMatch);
    }

    #[test]
    fn test_unterminated_root() {
        let err = parse_all("<root>").unwrap_err();
        assert!(err.message().starts_with("Unexpected end of string."));
    }

    #[test]
    fn test_trailing_garbage() {
        let err = parse_all("<root></root>oops").unwrap_err();
        assert_eq!(
            err.kind(),
            ParseErrorKind::ParsingTerminatedBeforeEndOfInput
        );
    }

    #[test]
    fn test_recursion_bound() {
        let mut events = Vec::new();
        let mut parser = StreamParser::with_options(ParseOptions::new().max_recursion_depth(2));
        let err = parser
            .parse(b"<root><a><b></b></a></root>", &mut events)
            .unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::MessageTooDeep);
        assert_eq!(
            err.message(),
            "Message too deep. Max recursion depth reached for tag 'b'"
        );
    }

    #[test]
    fn test_anonymous_does_not_count_toward_recursion() {
        let mut events = Vec::new();
        let mut parser = StreamParser::with_options(ParseOptions::new().max_recursion_depth(2));
        parser
            .parse(
                b"<root><_list_x><anonymous>v</anonymous></_list_x></root>",
                &mut events,
            )
            .unwrap();
        parser.finish_parse(&mut events).unwrap();
    }

    #[test]
    fn test_non_utf8_rejected() {
        let mut events = Vec::new();
        let mut parser = StreamParser::new();
        parser.parse(b"<root a=\"\xFF\"></root>", &mut events).unwrap();
        let err = parser.finish_parse(&mut events).unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::NonUtf8);
    }

    #[test]
    fn test_non_utf8_coerced() {
        let mut events = Vec::new();
        let mut parser = StreamParser::with_options(ParseOptions::new().coerce_to_utf8(" "));
        parser.parse(b"<root a=\"\xFFb\"></root>", &mut events).unwrap();
        parser.finish_parse(&mut events).unwrap();
        assert_eq!(
            events,
            vec![obj(""), Event::scalar("a", " b"), Event::EndObject]
        );
    }

    #[test]
    fn test_text_with_predefined_entity() {
        assert_eq!(
            parse_all("<root>a&amp;b</root>").unwrap(),
            vec![obj(""), Event::scalar("", "a&amp;b"), Event::EndObject]
        );
    }

    #[test]
    fn test_text_with_unknown_entity() {
        let err = parse_all("<root>*&#25</root>").unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::InvalidText);
    }

    #[test]
    fn test_empty_input_fails_on_finish() {
        let mut events: Vec<Event> = Vec::new();
        let mut parser = StreamParser::new();
        let err = parser.finish_parse(&mut events).unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::ExpectedOpenTag);
    }

    #[test]
    fn test_self_closing_still_requires_end_tag() {
        assert_eq!(
            parse_all("<root><a /></a></root>").unwrap(),
            vec![obj(""), obj("a"), Event::EndObject, Event::EndObject]
        );
    }

    #[test]
    fn test_tab_between_attributes_rejected() {
        let err = parse_all("<root\ta=\"1\"></root>").unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::ExpectedSpaceOrCloseTag);
    }

    #[test]
    fn test_comma_between_attributes_rejected() {
        let err = parse_all("<root k1=\"a\",k2=\"b\"></root>").unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::ExpectedSpaceOrCloseTag);
    }
}
