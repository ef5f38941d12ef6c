//! Line framing for the camera alert stream.
//!
//! The camera pushes a `multipart/mixed` body that never ends. Event
//! fragments are XML spread over many lines, so the stream is split into
//! trimmed, non-empty text lines and each line is handed to the caller as
//! one chunk. Binary parts (attached pictures) are decoded lossily and
//! are simply never matched by the detector.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::error::Error;

/// Split a byte stream into text lines.
pub fn lines<S, E>(body: S) -> impl Stream<Item = Result<String, Error>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Send + 'static,
    Error: From<E>,
{
    async_stream::try_stream! {
        let mut body = Box::pin(body);
        let mut buf: Vec<u8> = Vec::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            buf.extend_from_slice(&chunk);

            while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = buf.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw).trim().to_owned();
                if !line.is_empty() {
                    yield line;
                }
            }
        }

        let tail = String::from_utf8_lossy(&buf).trim().to_owned();
        if !tail.is_empty() {
            yield tail;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    async fn collect(parts: Vec<&'static str>) -> Vec<String> {
        let body = stream::iter(
            parts
                .into_iter()
                .map(|p| Ok::<_, Error>(Bytes::from_static(p.as_bytes()))),
        );
        lines(body)
            .map(|r| r.expect("line"))
            .collect::<Vec<_>>()
            .await
    }

    #[tokio::test]
    async fn splits_lines_across_chunk_boundaries() {
        let out = collect(vec![
            "--boundary\r\nContent-Type: application/xml\r\n\r\n<Event",
            "NotificationAlert>\r\n<eventType>VMD</eventType>\r\n",
            "</EventNotificationAlert>",
        ])
        .await;

        assert_eq!(
            out,
            vec![
                "--boundary",
                "Content-Type: application/xml",
                "<EventNotificationAlert>",
                "<eventType>VMD</eventType>",
                "</EventNotificationAlert>",
            ]
        );
    }

    #[tokio::test]
    async fn empty_body_yields_nothing() {
        assert!(collect(vec![]).await.is_empty());
    }

    #[tokio::test]
    async fn transport_error_ends_stream_with_error() {
        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"first\n")),
            Err(Error::Timeout { timeout_secs: 1 }),
        ]);
        let items: Vec<_> = lines(body).collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().ok(), Some("first"));
        assert!(matches!(items[1], Err(Error::Timeout { .. })));
    }
}
