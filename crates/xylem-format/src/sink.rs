//! Chunked output plumbing.
//!
//! Output goes to a [`ZeroCopyOutput`]: a stream that hands out reusable
//! byte buffers and takes back the unused tail of the last one. The
//! [`ByteSink`] adapter turns that into a plain `append` interface for the
//! writer, copying across buffer boundaries as needed.

/// A destination that hands out output buffers in chunks.
///
/// `next` borrows the next buffer to fill; returning `None` means the
/// stream can accept no more data. `back_up` returns the trailing `count`
/// bytes of the most recently obtained buffer as unwritten.
pub trait ZeroCopyOutput {
    /// Borrow the next output buffer.
    fn next(&mut self) -> Option<&mut [u8]>;

    /// Give back the unused tail of the last buffer from [`next`].
    ///
    /// [`next`]: ZeroCopyOutput::next
    fn back_up(&mut self, count: usize);
}

/// Growable in-memory output stream.
#[derive(Debug, Default)]
pub struct VecOutput {
    buf: Vec<u8>,
    block_size: usize,
}

const DEFAULT_BLOCK_SIZE: usize = 256;

impl VecOutput {
    /// Create an empty stream with the default buffer granularity.
    pub fn new() -> Self {
        Self::with_block_size(DEFAULT_BLOCK_SIZE)
    }

    /// Create an empty stream handing out buffers of `block_size` bytes.
    pub fn with_block_size(block_size: usize) -> Self {
        VecOutput {
            buf: Vec::new(),
            block_size: block_size.max(1),
        }
    }

    /// The bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the stream and return the written bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Consume the stream and return the written bytes as a `String`.
    ///
    /// # Panics
    /// Panics if the output is not valid UTF-8 (never the case for writer
    /// output).
    pub fn into_string(self) -> String {
        String::from_utf8(self.buf).expect("writer output should always be valid UTF-8")
    }
}

impl ZeroCopyOutput for VecOutput {
    fn next(&mut self) -> Option<&mut [u8]> {
        let start = self.buf.len();
        self.buf.resize(start + self.block_size, 0);
        Some(&mut self.buf[start..])
    }

    fn back_up(&mut self, count: usize) {
        let len = self.buf.len().saturating_sub(count);
        self.buf.truncate(len);
    }
}

/// Copying adapter from `append`-style writes onto a [`ZeroCopyOutput`].
///
/// Once the stream refuses a buffer, all further output is dropped
/// silently; the event producer carries the error signal for the transcode.
#[derive(Debug)]
pub struct ByteSink<'a, S: ZeroCopyOutput + ?Sized> {
    stream: &'a mut S,
    failed: bool,
}

impl<'a, S: ZeroCopyOutput + ?Sized> ByteSink<'a, S> {
    /// Wrap a stream.
    pub fn new(stream: &'a mut S) -> Self {
        ByteSink {
            stream,
            failed: false,
        }
    }

    /// Whether the stream has refused output.
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Append all of `bytes`, requesting new buffers as needed and giving
    /// back each unused tail.
    pub fn append(&mut self, mut bytes: &[u8]) {
        if self.failed {
            return;
        }
        while !bytes.is_empty() {
            let Some(buf) = self.stream.next() else {
                self.failed = true;
                return;
            };
            if buf.is_empty() {
                self.failed = true;
                return;
            }
            let n = buf.len().min(bytes.len());
            buf[..n].copy_from_slice(&bytes[..n]);
            let unused = buf.len() - n;
            bytes = &bytes[n..];
            if unused > 0 {
                self.stream.back_up(unused);
            }
        }
    }
}
