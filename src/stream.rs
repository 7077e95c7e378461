//! Incremental decoder for the generate endpoint's streamed response.
//!
//! The body is newline-delimited JSON, one record per line:
//! `{"response": "<fragment>", "done": false}`. Fragments are accumulated
//! until a record with `done: true` arrives or the stream closes.

use crate::error::{BoxError, ChatError};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};

/// One decoded line of the response stream.
#[derive(Debug, Default, Deserialize)]
pub struct StreamRecord {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
}

/// Splits arbitrarily chunked bytes into complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Take the next complete line, without its terminator.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(line)
    }

    /// Whatever is left once the stream has closed.
    pub fn finish(self) -> Option<Vec<u8>> {
        let mut rest = self.buf;
        if rest.last() == Some(&b'\r') {
            rest.pop();
        }
        (!rest.is_empty()).then_some(rest)
    }
}

/// Accumulates fragments from decoded lines.
#[derive(Debug, Default)]
pub struct Accumulator {
    text: String,
    fragments: usize,
    done: bool,
}

impl Accumulator {
    /// Feed one raw line. Returns true once a final record has been seen.
    ///
    /// Blank lines are ignored; lines that are not a JSON record are logged
    /// and skipped.
    pub fn feed(&mut self, line: &[u8]) -> bool {
        if self.done {
            return true;
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            return false;
        }

        match serde_json::from_slice::<StreamRecord>(line) {
            Ok(record) => {
                self.text.push_str(&record.response);
                self.fragments += 1;
                self.done = record.done;
            }
            Err(e) => {
                warn!(
                    error = %e,
                    line = %String::from_utf8_lossy(line),
                    "Skipping malformed stream record"
                );
            }
        }
        self.done
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn fragments(&self) -> usize {
        self.fragments
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Drain a response body stream and return the accumulated text.
///
/// Stops reading at the first final record. If the stream fails first, the
/// partial text is discarded and the failure is returned.
pub async fn accumulate<S, B, E>(stream: S) -> Result<String, ChatError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<BoxError>,
{
    let mut stream = std::pin::pin!(stream);
    let mut lines = LineBuffer::default();
    let mut acc = Accumulator::default();
    let mut bytes = 0usize;

    'read: while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ChatError::Stream(e.into()))?;
        bytes += chunk.as_ref().len();
        lines.push(chunk.as_ref());
        while let Some(line) = lines.next_line() {
            if acc.feed(&line) {
                break 'read;
            }
        }
    }

    if !acc.is_done() {
        if let Some(rest) = lines.finish() {
            acc.feed(&rest);
        }
    }

    debug!(
        bytes,
        fragments = acc.fragments(),
        done = acc.is_done(),
        "Response stream finished"
    );
    Ok(acc.into_text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::io;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>, io::Error>> {
        let owned: Vec<_> = parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        stream::iter(owned)
    }

    #[tokio::test]
    async fn test_concatenates_until_done() {
        let body = chunks(&[
            "{\"response\":\"Hel\",\"done\":false}\n",
            "{\"response\":\"lo\",\"done\":false}\n",
            "{\"response\":\"!\",\"done\":true}\n",
            "{\"response\":\" ignored\",\"done\":false}\n",
        ]);
        assert_eq!(accumulate(body).await.unwrap(), "Hello!");
    }

    #[tokio::test]
    async fn test_skips_malformed_line() {
        let body = chunks(&[
            "{\"response\":\"a\",\"done\":false}\n",
            "not json at all\n",
            "{\"response\":\"b\",\"done\":true}\n",
        ]);
        assert_eq!(accumulate(body).await.unwrap(), "ab");
    }

    #[tokio::test]
    async fn test_no_final_record_returns_everything() {
        let body = chunks(&[
            "{\"response\":\"x\"}\n",
            "{\"response\":\"y\",\"done\":false}\n",
        ]);
        assert_eq!(accumulate(body).await.unwrap(), "xy");
    }

    #[tokio::test]
    async fn test_records_split_across_chunks() {
        let body = chunks(&[
            "{\"respo",
            "nse\":\"one \",\"done\":false}\r\n{\"response\":",
            "\"two\",\"done\":tr",
            "ue}",
        ]);
        assert_eq!(accumulate(body).await.unwrap(), "one two");
    }

    #[tokio::test]
    async fn test_missing_fields_default() {
        let body = chunks(&["{\"done\":false}\n", "\n", "{\"response\":\"z\",\"done\":true}\n"]);
        assert_eq!(accumulate(body).await.unwrap(), "z");
    }

    #[tokio::test]
    async fn test_stream_error_discards_partial_text() {
        let body = stream::iter(vec![
            Ok(b"{\"response\":\"partial\",\"done\":false}\n".to_vec()),
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated")),
        ]);
        let err = accumulate(body).await.unwrap_err();
        assert!(matches!(err, ChatError::Stream(_)));
        assert!(err.to_string().contains("truncated"));
    }

    #[tokio::test]
    async fn test_error_after_done_is_not_read() {
        let body = stream::iter(vec![
            Ok(b"{\"response\":\"fine\",\"done\":true}\n".to_vec()),
            Err(io::Error::new(io::ErrorKind::Other, "never polled")),
        ]);
        assert_eq!(accumulate(body).await.unwrap(), "fine");
    }

    #[tokio::test]
    async fn test_empty_stream() {
        assert_eq!(accumulate(chunks(&[])).await.unwrap(), "");
    }

    #[test]
    fn test_line_buffer() {
        let mut lines = LineBuffer::default();
        lines.push(b"ab\r\ncd\nef");
        assert_eq!(lines.next_line(), Some(b"ab".to_vec()));
        assert_eq!(lines.next_line(), Some(b"cd".to_vec()));
        assert_eq!(lines.next_line(), None);
        assert_eq!(lines.finish(), Some(b"ef".to_vec()));
    }

    #[test]
    fn test_accumulator_ignores_input_after_done() {
        let mut acc = Accumulator::default();
        assert!(!acc.feed(br#"{"response":"a"}"#));
        assert!(acc.feed(br#"{"response":"b","done":true}"#));
        assert!(acc.feed(br#"{"response":"c"}"#));
        assert_eq!(acc.fragments(), 2);
        assert_eq!(acc.into_text(), "ab");
    }
}
