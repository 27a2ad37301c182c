//! Parse errors with location context.

use crate::scan;

/// Denotes the cause of a parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseErrorKind {
    // Structural
    ExpectedOpenTag,
    ExpectedCloseTag,
    ExpectedCloseTagInBeginElement,
    ExpectedOpenTagInEndElement,
    ExpectedCloseInEndElement,
    ExpectedSlash,
    ExpectedEndTagSlash,
    ExpectedSpaceOrCloseTag,
    ExpectedEqualMark,
    ExpectedQuoteBeforeAttrValue,
    ExpectedBeginKeyOrSlash,
    ExpectedTagName,
    ExpectedTagNameInEndTag,
    TagNameNotMatch,

    // Lexical
    InvalidKey,
    InvalidTagName,
    InvalidEndTagName,
    InvalidText,
    ExpectedClosingQuote,
    IllegalHexString,
    InvalidEscapeSequence,
    MissingLowSurrogate,
    InvalidLowSurrogate,
    InvalidUnicode,

    // Stream
    NonUtf8,
    ParsingTerminatedBeforeEndOfInput,
    MessageTooDeep,

    // Comments and declarations
    IllegalComment,
    ExpectedDashInComment,
    IllegalCloseComment,
    ExpectedCloseDashInComment,
    IllegalDeclaration,
    ExpectedQuestionMarkInComment,
    IllegalCloseDeclaration,
    ExpectedCloseQuestionMarkInDeclaration,
}

/// Number of context bytes captured on each side of the failure position.
const CONTEXT_LENGTH: usize = 20;

/// A hard parse failure.
///
/// Rendered as the failure message, then up to [`CONTEXT_LENGTH`] bytes of
/// input on either side of the cursor, then a caret line pointing at the
/// cursor position:
///
/// ```text
/// Expected a begin key or a slash.
/// <root 01234="x"></ro
///       ^
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    kind: ParseErrorKind,
    message: String,
    context: Option<Context>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Context {
    snippet: String,
    caret: usize,
}

impl ParseError {
    /// An error with no location context (used when the input around the
    /// failure is unavailable or not meaningful).
    pub(crate) fn bare(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context: None,
        }
    }

    /// An error annotated with a context window around byte `pos` of `xml`.
    pub(crate) fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        xml: &str,
        pos: usize,
    ) -> Self {
        let begin = scan::floor_char_boundary(xml, pos.saturating_sub(CONTEXT_LENGTH));
        let end = scan::ceil_char_boundary(xml, (pos + CONTEXT_LENGTH).min(xml.len()));
        ParseError {
            kind,
            message: message.into(),
            context: Some(Context {
                snippet: xml[begin..end].to_string(),
                caret: pos - begin,
            }),
        }
    }

    /// The kind of failure.
    pub fn kind(&self) -> ParseErrorKind {
        self.kind
    }

    /// The failure message (the first line of the rendered error).
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The captured input window around the failure, if any.
    pub fn snippet(&self) -> Option<&str> {
        self.context.as_ref().map(|c| c.snippet.as_str())
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(context) = &self.context {
            write!(f, "\n{}\n", context.snippet)?;
            for _ in 0..context.caret {
                write!(f, " ")?;
            }
            write!(f, "^")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}
