//! Line framing shared by the SSE and NDJSON stream decoders

use futures::{Stream, StreamExt, stream};

use super::http_client::ByteStream;
use crate::domain::{DomainError, LlmStream, StreamChunk};

/// Split a byte stream into lines, buffering partial lines across chunks.
/// Line terminators (`\n` or `\r\n`) are removed.
pub fn lines(bytes: ByteStream) -> impl Stream<Item = Result<String, DomainError>> + Send {
    stream::unfold(
        (bytes, Vec::<u8>::new(), false),
        |(mut bytes, mut buffer, mut done)| async move {
            loop {
                if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let text = String::from_utf8_lossy(&line)
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    return Some((Ok(text), (bytes, buffer, done)));
                }

                if done {
                    if buffer.is_empty() {
                        return None;
                    }
                    let text = String::from_utf8_lossy(&buffer).trim_end().to_string();
                    buffer.clear();
                    return Some((Ok(text), (bytes, buffer, done)));
                }

                match bytes.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        buffer.clear();
                        return Some((Err(e), (bytes, buffer, true)));
                    }
                    None => done = true,
                }
            }
        },
    )
}

/// Turn framed lines into completion chunks.
///
/// `parse` returns `Ok(None)` for lines that carry nothing (comments, event
/// names, keep-alives). The stream ends after the first chunk with a finish
/// reason; running out of input before that is a `ProviderUnavailable` error.
pub fn decode<F>(provider: &str, bytes: ByteStream, parse: F) -> LlmStream
where
    F: FnMut(&str) -> Result<Option<StreamChunk>, DomainError> + Send + 'static,
{
    let provider = provider.to_string();
    let lines = Box::pin(lines(bytes));

    let chunks = stream::unfold(Some((lines, parse)), move |state| {
        let provider = provider.clone();
        async move {
            let (mut lines, mut parse) = state?;

            loop {
                match lines.next().await {
                    Some(Ok(line)) => match parse(&line) {
                        Ok(Some(chunk)) if chunk.is_final() => return Some((Ok(chunk), None)),
                        Ok(Some(chunk)) => return Some((Ok(chunk), Some((lines, parse)))),
                        Ok(None) => continue,
                        Err(e) => return Some((Err(e), None)),
                    },
                    Some(Err(e)) => return Some((Err(e), None)),
                    None => {
                        return Some((
                            Err(DomainError::unavailable(
                                &provider,
                                "stream ended before completion",
                            )),
                            None,
                        ));
                    }
                }
            }
        }
    });

    Box::pin(chunks)
}

/// Payload of an SSE `data:` line
pub fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FinishReason;
    use bytes::Bytes;

    fn byte_stream(parts: &[&str]) -> ByteStream {
        let parts: Vec<Result<Bytes, DomainError>> = parts
            .iter()
            .map(|p| Ok(Bytes::from(p.to_string())))
            .collect();
        Box::pin(stream::iter(parts))
    }

    fn parse_test_line(line: &str) -> Result<Option<StreamChunk>, DomainError> {
        let Some(data) = sse_data(line) else {
            return Ok(None);
        };

        let chunk = StreamChunk::new("t".to_string(), "m".to_string());
        if data == "END" {
            Ok(Some(chunk.with_finish_reason(FinishReason::Stop)))
        } else {
            Ok(Some(chunk.with_delta(data)))
        }
    }

    #[tokio::test]
    async fn test_lines_across_chunk_boundaries() {
        let collected: Vec<String> = lines(byte_stream(&["da", "ta: a\r\nda", "ta: b\n", "tail"]))
            .map(|l| l.unwrap())
            .collect()
            .await;

        assert_eq!(collected, vec!["data: a", "data: b", "tail"]);
    }

    #[tokio::test]
    async fn test_decode_emits_every_event_in_a_chunk() {
        let stream = decode(
            "test",
            byte_stream(&["data: one\n\ndata: two\n\n", ": keep-alive\n", "data: END\n\ndata: late\n"]),
            parse_test_line,
        );

        let chunks: Vec<StreamChunk> = stream.map(|c| c.unwrap()).collect().await;
        let deltas: Vec<Option<String>> = chunks.iter().map(|c| c.delta.clone()).collect();

        assert_eq!(deltas, vec![Some("one".into()), Some("two".into()), None]);
        assert!(chunks.last().unwrap().is_final());
    }

    #[tokio::test]
    async fn test_decode_without_end_marker_is_an_error() {
        let results: Vec<Result<StreamChunk, DomainError>> =
            decode("test", byte_stream(&["data: one\n"]), parse_test_line)
                .collect()
                .await;

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(DomainError::ProviderUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_decode_stops_at_transport_error() {
        let parts: Vec<Result<Bytes, DomainError>> = vec![
            Ok(Bytes::from("data: one\n")),
            Err(DomainError::unavailable("test", "reset")),
            Ok(Bytes::from("data: two\n")),
        ];
        let results: Vec<_> = decode("test", Box::pin(stream::iter(parts)), parse_test_line)
            .collect()
            .await;

        assert_eq!(results.len(), 2);
        assert!(results[1].is_err());
    }
}
