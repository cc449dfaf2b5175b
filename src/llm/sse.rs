//! Server-sent-event plumbing shared by the streaming clients.

use futures::{Stream, StreamExt, TryStreamExt, stream::BoxStream};

use crate::error::LlmError;

/// Turn an SSE response body into a stream of `data:` payload strings.
///
/// Events are delimited by blank lines; `[DONE]` sentinels and empty
/// payloads are dropped. Providers map each payload JSON to a content delta.
pub fn data_events(
    response: reqwest::Response,
    provider: &'static str,
) -> BoxStream<'static, Result<String, LlmError>> {
    let bytes = response
        .bytes_stream()
        .map_ok(|b| b.to_vec())
        .map_err(move |e| LlmError::RequestFailed {
            provider: provider.to_string(),
            reason: format!("stream read failed: {e}"),
        });
    split_events(bytes)
}

/// Split a byte stream on SSE event boundaries and yield `data:` payloads.
fn split_events<S>(bytes: S) -> BoxStream<'static, Result<String, LlmError>>
where
    S: Stream<Item = Result<Vec<u8>, LlmError>> + Send + 'static,
{
    let events = bytes
        .scan(String::new(), |buf, chunk| {
            let out: Vec<Result<String, LlmError>> = match chunk {
                Ok(bytes) => {
                    buf.push_str(&String::from_utf8_lossy(&bytes));
                    let mut payloads = Vec::new();
                    while let Some(pos) = buf.find("\n\n") {
                        let event: String = buf.drain(..pos + 2).collect();
                        for line in event.lines() {
                            if let Some(data) = line.strip_prefix("data:") {
                                let data = data.trim();
                                if !data.is_empty() && data != "[DONE]" {
                                    payloads.push(Ok(data.to_string()));
                                }
                            }
                        }
                    }
                    payloads
                }
                Err(e) => vec![Err(e)],
            };
            futures::future::ready(Some(futures::stream::iter(out)))
        })
        .flatten();

    Box::pin(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(chunks: Vec<&str>) -> Vec<String> {
        let owned: Vec<Vec<u8>> = chunks.into_iter().map(|c| c.as_bytes().to_vec()).collect();
        let input = futures::stream::iter(owned.into_iter().map(Ok::<_, LlmError>));
        split_events(input)
            .map(|r| r.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn splits_events_and_drops_done() {
        let payloads = collect(vec![
            "data: {\"a\":1}\n\ndata: {\"b\":2}\n\ndata: [DONE]\n\n",
        ])
        .await;
        assert_eq!(payloads, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[tokio::test]
    async fn events_split_across_chunks() {
        let payloads = collect(vec!["data: {\"a\"", ":1}\n", "\ndata: {\"b\":2}\n\n"]).await;
        assert_eq!(payloads, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[tokio::test]
    async fn ignores_comment_and_event_lines() {
        let payloads = collect(vec![": keepalive\nevent: delta\ndata: {\"x\":1}\n\n"]).await;
        assert_eq!(payloads, vec!["{\"x\":1}"]);
    }
}
