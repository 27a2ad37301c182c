//! Serialization of structured events into the xylem XML dialect.
//!
//! [`ObjectWriter`] receives start/end object, start/end list and scalar
//! render calls and emits the dialect XML onto a chunked output stream, with
//! optional pretty-printing. It implements
//! [`xylem_parse::EventSink`], so parser and writer compose into a
//! transcoding pipeline in either direction.

// Conditional tracing macros
#[cfg(feature = "tracing")]
macro_rules! warn_log {
    ($($arg:tt)*) => { ::tracing::warn!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! warn_log {
    ($($arg:tt)*) => {};
}

#[allow(unused_imports)]
pub(crate) use warn_log;

mod element;
pub mod escape;
mod options;
mod sink;
mod writer;

pub use options::PrintOptions;
pub use sink::{ByteSink, VecOutput, ZeroCopyOutput};
pub use writer::ObjectWriter;
