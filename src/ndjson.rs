//! Lazy decoding of newline-delimited JSON streams.
//!
//! The runtime answers both the stats and the events endpoints with one JSON document per
//! line. [`JsonLines`] wraps any [`AsyncBufRead`] and decodes those documents one at a time,
//! so a record is only read from the wire when the caller asks for it.
//!
//! # Example
//!
//! ```rust
//! # use creo_poller::ndjson::JsonLines;
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let data: &[u8] = b"{\"n\":1}\n{\"n\":2}\n";
//! let mut lines = JsonLines::new(data);
//! while let Some(value) = lines.next_record::<serde_json::Value>().await.unwrap() {
//!     assert!(value["n"].is_u64());
//! }
//! # });
//! ```

use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read record stream: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed record at line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// A finite sequence of JSON records read from a byte stream.
///
/// The sequence ends at end-of-stream and cannot be restarted; reissue the request instead.
#[derive(Debug)]
pub struct JsonLines<R> {
    reader: R,
    buf: Vec<u8>,
    line: usize,
}

impl<R> JsonLines<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(4096),
            line: 0,
        }
    }

    /// Reads and decodes the next record.
    ///
    /// Blank lines are skipped. A trailing record without a final newline is still decoded.
    /// Returns `Ok(None)` at end-of-stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if reading fails and [`Error::Decode`] if a line is not a valid
    /// record. The offending line is consumed, so reading may continue after a decode error.
    pub async fn next_record<T>(&mut self) -> Result<Option<T>, Error>
    where
        T: DeserializeOwned,
    {
        loop {
            self.buf.clear();
            if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
                return Ok(None);
            }
            self.line += 1;

            if self.buf.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            return serde_json::from_slice(&self.buf)
                .map(Some)
                .map_err(|source| Error::Decode {
                    line: self.line,
                    source,
                });
        }
    }

    /// Number of lines consumed so far.
    pub fn lines_read(&self) -> usize {
        self.line
    }
}
