//! Server-sent event decoding for streamed replies
//!
//! The service answers `chat/{id}/stream` with `data: <chunk>` events and a
//! final `data: [DONE]`. Network chunks do not line up with events, so the
//! decoder buffers raw bytes and only interprets complete lines.

use crate::{Result, VoxError};
use futures::{Stream, StreamExt};
use tracing::{debug, trace};

/// Marker payload that ends the stream
pub const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseItem {
    Data(String),
    Done,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data_lines: Vec<String>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed raw bytes, returning every event completed by them
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseItem> {
        let mut items = Vec::new();
        if self.done {
            return items;
        }

        self.buffer.extend_from_slice(bytes);
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            self.process_line(&line, &mut items);
            if self.done {
                self.buffer.clear();
                break;
            }
        }
        items
    }

    /// Flush whatever is left once the byte stream has ended
    pub fn finish(&mut self) -> Vec<SseItem> {
        let mut items = Vec::new();
        if self.done {
            return items;
        }
        if !self.buffer.is_empty() {
            let mut line = std::mem::take(&mut self.buffer);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            self.process_line(&line, &mut items);
        }
        if !self.done {
            self.dispatch(&mut items);
        }
        items
    }

    fn process_line(&mut self, line: &[u8], items: &mut Vec<SseItem>) {
        if line.is_empty() {
            self.dispatch(items);
            return;
        }
        let line = String::from_utf8_lossy(line);
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_ref(), ""),
        };
        if field == "data" {
            self.data_lines.push(value.to_string());
        } else {
            trace!("Ignoring SSE field {}", field);
        }
    }

    fn dispatch(&mut self, items: &mut Vec<SseItem>) {
        if self.data_lines.is_empty() {
            return;
        }
        let data = self.data_lines.join("\n");
        self.data_lines.clear();

        if data == DONE_MARKER {
            self.done = true;
            items.push(SseItem::Done);
        } else {
            items.push(SseItem::Data(data));
        }
    }
}

/// Turn a raw byte stream into the text chunks it carries.
///
/// Ends after `[DONE]`. A stream that closes without the marker still counts
/// as complete if any bytes arrived; a transport error yields one `Err` and ends.
pub fn sse_text_stream<S, B, E>(bytes: S) -> impl Stream<Item = Result<String>>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    async_stream::stream! {
        futures::pin_mut!(bytes);
        let mut decoder = SseDecoder::new();
        let mut received_any = false;

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(VoxError::TransportError(format!("Stream interrupted: {}", e)));
                    return;
                }
            };
            received_any |= !chunk.as_ref().is_empty();

            for item in decoder.feed(chunk.as_ref()) {
                match item {
                    SseItem::Data(text) if text.is_empty() => {}
                    SseItem::Data(text) => yield Ok(text),
                    SseItem::Done => {
                        debug!("Stream finished with done marker");
                        return;
                    }
                }
            }
        }

        for item in decoder.finish() {
            if let SseItem::Data(text) = item {
                if !text.is_empty() {
                    yield Ok(text);
                }
            }
        }

        if !received_any {
            yield Err(VoxError::TransportError("Stream closed before any data arrived".into()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(s: &str) -> SseItem {
        SseItem::Data(s.to_string())
    }

    #[test]
    fn test_events_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"da").is_empty());
        assert!(decoder.feed(b"ta: Hel").is_empty());
        assert_eq!(decoder.feed(b"\n\ndata: lo\n"), vec![data("Hel")]);
        assert_eq!(decoder.feed(b"\ndata: [DONE]\n\n"), vec![data("lo"), SseItem::Done]);
        assert!(decoder.is_done());
        assert!(decoder.feed(b"data: late\n\n").is_empty());
    }

    #[test]
    fn test_crlf_comments_and_multiline() {
        let mut decoder = SseDecoder::new();
        let items = decoder.feed(b": keep-alive\r\n\r\ndata: one\r\ndata: two\r\nid: 7\r\n\r\n");
        assert_eq!(items, vec![data("one\ntwo")]);
    }

    #[test]
    fn test_only_one_leading_space_is_stripped() {
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.feed(b"data:  world\n\n"), vec![data(" world")]);
        assert_eq!(decoder.feed(b"data:x\n\n"), vec![data("x")]);
    }

    #[test]
    fn test_multibyte_utf8_split() {
        let bytes = "data: héllo\n\n".as_bytes();
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(&bytes[..split]).is_empty());
        assert_eq!(decoder.feed(&bytes[split..]), vec![data("héllo")]);
    }

    #[test]
    fn test_finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: tail").is_empty());
        assert_eq!(decoder.finish(), vec![data("tail")]);
    }

    #[tokio::test]
    async fn test_text_stream_collects_chunks() {
        let parts: Vec<std::result::Result<Vec<u8>, String>> = vec![
            Ok(b"data: Hel".to_vec()),
            Ok(b"\n\ndata: lo\n\n".to_vec()),
            Ok(b"data: [DONE]\n\n".to_vec()),
            Ok(b"data: ignored\n\n".to_vec()),
        ];
        let chunks: Vec<_> = sse_text_stream(futures::stream::iter(parts)).collect().await;
        let chunks: Vec<String> = chunks.into_iter().map(|c| c.unwrap()).collect();
        assert_eq!(chunks, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_text_stream_error_mid_way() {
        let parts: Vec<std::result::Result<Vec<u8>, String>> = vec![
            Ok(b"data: Hel\n\n".to_vec()),
            Err("connection reset".to_string()),
        ];
        let items: Vec<_> = sse_text_stream(futures::stream::iter(parts)).collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(VoxError::TransportError(_))));
    }

    #[tokio::test]
    async fn test_text_stream_empty_body_is_error() {
        let parts: Vec<std::result::Result<Vec<u8>, String>> = Vec::new();
        let items: Vec<_> = sse_text_stream(futures::stream::iter(parts)).collect().await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }
}
