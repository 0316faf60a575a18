//! Shared SSE plumbing for streaming chat responses.
//!
//! OpenAI-compatible endpoints stream as server-sent events: chunks are
//! buffered, split on `\n\n`, and each `data:` payload is handed to a
//! backend-specific parser returning zero or more text chunks.

use kg_domain::Result;

use crate::backend::from_reqwest;
use crate::types::BoxStream;

/// Extract complete `data:` payloads from an SSE buffer. The buffer is
/// drained in place; a trailing partial event stays for the next call.
pub(crate) fn drain_data_lines(buffer: &mut String) -> Vec<String> {
    let mut data_lines = Vec::new();

    while let Some(pos) = buffer.find("\n\n") {
        let block: String = buffer.drain(..pos).collect();
        buffer.drain(..2);

        for line in block.lines() {
            if let Some(data) = line.trim().strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    data_lines.push(data.to_string());
                }
            }
        }
    }

    data_lines
}

/// Build a text-chunk stream from an SSE `reqwest::Response` and a parser
/// closure. The parser sees each `data:` payload; `None` chunks (keepalives,
/// role deltas, `[DONE]`) are skipped.
pub(crate) fn sse_text_stream<F>(
    response: reqwest::Response,
    parse_data: F,
) -> BoxStream<'static, Result<String>>
where
    F: Fn(&str) -> Option<String> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = String::new();

        loop {
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    for data in drain_data_lines(&mut buffer) {
                        if data.trim() == "[DONE]" {
                            return;
                        }
                        if let Some(text) = parse_data(&data) {
                            yield Ok(text);
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    yield Err(from_reqwest(e));
                    break;
                }
            }
        }
    };

    Box::pin(stream)
}
