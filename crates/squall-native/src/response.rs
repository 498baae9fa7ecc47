//! Native response produced by the fetch callback

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use std::fmt;

/// Streaming body chunks
pub type BodyStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Body type handed to hyper
pub type ResponseBody = UnsyncBoxBody<Bytes, std::io::Error>;

/// Response body
pub enum NativeBody {
    Empty,
    Full(Bytes),
    Stream(BodyStream),
}

impl fmt::Debug for NativeBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeBody::Empty => f.write_str("Empty"),
            NativeBody::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            NativeBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// A response ready for the wire
#[derive(Debug)]
pub struct NativeResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: NativeBody,
}

impl NativeResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: NativeBody::Empty,
        }
    }

    /// Plain-text response with the given status
    pub fn text(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self::new(status)
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))
            .with_body(NativeBody::Full(body.into()))
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: NativeBody) -> Self {
        self.body = body;
        self
    }

    /// `101 Switching Protocols` for an accepted WebSocket handshake
    pub(crate) fn switching_protocols(accept_key: &str) -> Self {
        let mut response = Self::new(StatusCode::SWITCHING_PROTOCOLS)
            .with_header(header::UPGRADE, HeaderValue::from_static("websocket"))
            .with_header(header::CONNECTION, HeaderValue::from_static("Upgrade"));
        if let Ok(value) = HeaderValue::from_str(accept_key) {
            response.headers.insert(header::SEC_WEBSOCKET_ACCEPT, value);
        }
        response
    }

    /// Header value as a string
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Collect the body, draining streams
    pub async fn into_bytes(self) -> std::io::Result<Bytes> {
        match self.body {
            NativeBody::Empty => Ok(Bytes::new()),
            NativeBody::Full(bytes) => Ok(bytes),
            NativeBody::Stream(stream) => {
                let chunks: Vec<Bytes> = stream.try_collect().await?;
                Ok(Bytes::from(chunks.concat()))
            }
        }
    }

    /// Convert to a hyper response
    ///
    /// `head` drops the body but keeps the headers, including a
    /// `Content-Length` computed from a full buffer.
    pub fn into_hyper(self, head: bool) -> hyper::Response<ResponseBody> {
        let NativeResponse {
            status,
            mut headers,
            body,
        } = self;

        if let NativeBody::Full(ref bytes) = body {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
        }

        let body = match body {
            _ if head => empty(),
            NativeBody::Empty => empty(),
            NativeBody::Full(bytes) => Full::new(bytes).map_err(|never| match never {}).boxed_unsync(),
            NativeBody::Stream(stream) => {
                StreamBody::new(stream.map_ok(hyper::body::Frame::data)).boxed_unsync()
            }
        };

        let mut response = hyper::Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

fn empty() -> ResponseBody {
    Empty::new().map_err(|never| match never {}).boxed_unsync()
}

/// Build a stream body from in-memory chunks
pub fn stream_from_chunks(chunks: Vec<Bytes>) -> BodyStream {
    futures_util::stream::iter(chunks.into_iter().map(Ok)).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_body_sets_content_length() {
        let response = NativeResponse::text(StatusCode::OK, "hello").into_hyper(false);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "5");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, "hello");
    }

    #[tokio::test]
    async fn test_head_is_bodiless() {
        let response = NativeResponse::text(StatusCode::OK, "hello").into_hyper(true);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "5");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_stream_body() {
        let chunks = vec![Bytes::from_static(b"a"), Bytes::from_static(b"bc")];
        let response = NativeResponse::new(StatusCode::OK)
            .with_body(NativeBody::Stream(stream_from_chunks(chunks)));
        assert_eq!(response.into_bytes().await.unwrap(), "abc");
    }

    #[test]
    fn test_switching_protocols() {
        let response = NativeResponse::switching_protocols("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
        assert_eq!(response.status, StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(response.header("upgrade"), Some("websocket"));
        assert_eq!(
            response.header("sec-websocket-accept"),
            Some("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=")
        );
    }
}
