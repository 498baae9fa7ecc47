//! HTTP Response types

use crate::cookie::Cookie;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use smallvec::SmallVec;
use squall_native::{BodyStream, NativeBody, NativeResponse};
use std::fmt;
use tracing::debug;

/// HTTP Status Code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(pub u16);

impl StatusCode {
    // 1xx Informational
    pub const SWITCHING_PROTOCOLS: StatusCode = StatusCode(101);

    // 2xx Success
    pub const OK: StatusCode = StatusCode(200);
    pub const CREATED: StatusCode = StatusCode(201);
    pub const ACCEPTED: StatusCode = StatusCode(202);
    pub const NO_CONTENT: StatusCode = StatusCode(204);

    // 3xx Redirection
    pub const MOVED_PERMANENTLY: StatusCode = StatusCode(301);
    pub const FOUND: StatusCode = StatusCode(302);
    pub const SEE_OTHER: StatusCode = StatusCode(303);
    pub const NOT_MODIFIED: StatusCode = StatusCode(304);
    pub const TEMPORARY_REDIRECT: StatusCode = StatusCode(307);
    pub const PERMANENT_REDIRECT: StatusCode = StatusCode(308);

    // 4xx Client Errors
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const UNAUTHORIZED: StatusCode = StatusCode(401);
    pub const FORBIDDEN: StatusCode = StatusCode(403);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const METHOD_NOT_ALLOWED: StatusCode = StatusCode(405);
    pub const NOT_ACCEPTABLE: StatusCode = StatusCode(406);
    pub const CONFLICT: StatusCode = StatusCode(409);
    pub const PAYLOAD_TOO_LARGE: StatusCode = StatusCode(413);
    pub const UNPROCESSABLE_ENTITY: StatusCode = StatusCode(422);
    pub const TOO_MANY_REQUESTS: StatusCode = StatusCode(429);

    // 5xx Server Errors
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);
    pub const NOT_IMPLEMENTED: StatusCode = StatusCode(501);
    pub const SERVICE_UNAVAILABLE: StatusCode = StatusCode(503);

    /// Get the numeric code
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Get the reason phrase
    pub fn reason_phrase(&self) -> &'static str {
        match self.0 {
            101 => "Switching Protocols",
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            204 => "No Content",
            301 => "Moved Permanently",
            302 => "Found",
            303 => "See Other",
            304 => "Not Modified",
            307 => "Temporary Redirect",
            308 => "Permanent Redirect",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            406 => "Not Acceptable",
            409 => "Conflict",
            413 => "Payload Too Large",
            422 => "Unprocessable Entity",
            429 => "Too Many Requests",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            503 => "Service Unavailable",
            _ => "Unknown",
        }
    }

    /// Check if this is a success status (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.0)
    }

    /// Check if this is a client error status (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.0)
    }

    /// Check if this is a server error status (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.0)
    }
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> Self {
        StatusCode(code)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.0, self.reason_phrase())
    }
}

/// Response body
pub enum Body {
    Empty,
    Bytes(Bytes),
    /// Urlencoded on the wire
    Form(Vec<(String, String)>),
    Stream(BodyStream),
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Body::Form(fields) => f.debug_tuple("Form").field(fields).finish(),
            Body::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// HTTP Response
#[derive(Debug)]
pub struct Response {
    /// Status code
    pub status: StatusCode,
    /// Response headers (stack-allocated for small header counts)
    pub headers: SmallVec<[(String, String); 8]>,
    /// Cookies written as `Set-Cookie`
    pub cookies: Vec<Cookie>,
    /// Response body
    pub body: Body,
}

impl Response {
    /// Create a new response
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: SmallVec::new(),
            cookies: Vec::new(),
            body: Body::Empty,
        }
    }

    /// Create a 200 OK response
    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    /// Create a JSON response
    pub fn json(body: impl Into<Bytes>) -> Self {
        ResponseBuilder::new(StatusCode::OK)
            .header("content-type", "application/json")
            .body(body)
            .build()
    }

    /// Create a text response
    pub fn text(body: impl Into<Bytes>) -> Self {
        ResponseBuilder::new(StatusCode::OK)
            .header("content-type", "text/plain; charset=utf-8")
            .body(body)
            .build()
    }

    /// Create an HTML response
    pub fn html(body: impl Into<Bytes>) -> Self {
        ResponseBuilder::new(StatusCode::OK)
            .header("content-type", "text/html; charset=utf-8")
            .body(body)
            .build()
    }

    /// Create a redirect response
    pub fn redirect(location: &str, permanent: bool) -> Self {
        let status = if permanent {
            StatusCode::PERMANENT_REDIRECT
        } else {
            StatusCode::TEMPORARY_REDIRECT
        };
        ResponseBuilder::new(status).header("location", location).build()
    }

    /// Get a header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get content-type header
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Get body as string, for in-memory UTF-8 bodies
    pub fn body_string(&self) -> Option<String> {
        match &self.body {
            Body::Empty => Some(String::new()),
            Body::Bytes(b) => std::str::from_utf8(b).ok().map(|s| s.to_string()),
            Body::Form(fields) => Some(encode_form(fields)),
            Body::Stream(_) => None,
        }
    }

    /// Replace the body, keeping status, headers and cookies
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Body::Bytes(body.into());
        self
    }

    /// Convert to the native response
    ///
    /// Headers that are not valid HTTP are dropped.
    pub fn into_native(self) -> NativeResponse {
        let status = http::StatusCode::from_u16(self.status.0)
            .unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);
        let mut native = NativeResponse::new(status);

        for (name, value) in &self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    native.headers.append(name, value);
                }
                _ => debug!(header = %name, "dropping invalid response header"),
            }
        }

        for cookie in &self.cookies {
            if let Ok(value) = HeaderValue::from_str(&cookie.to_header_value()) {
                native.headers.append(http::header::SET_COOKIE, value);
            }
        }

        native.body = match self.body {
            Body::Empty => NativeBody::Empty,
            Body::Bytes(bytes) => NativeBody::Full(bytes),
            Body::Form(fields) => {
                if !native.headers.contains_key(http::header::CONTENT_TYPE) {
                    native.headers.insert(
                        http::header::CONTENT_TYPE,
                        HeaderValue::from_static("application/x-www-form-urlencoded"),
                    );
                }
                NativeBody::Full(Bytes::from(encode_form(&fields)))
            }
            Body::Stream(stream) => NativeBody::Stream(stream),
        };
        native
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::ok()
    }
}

fn encode_form(fields: &[(String, String)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Builder for constructing responses
pub struct ResponseBuilder {
    response: Response,
}

impl ResponseBuilder {
    /// Create a new builder
    pub fn new(status: StatusCode) -> Self {
        Self {
            response: Response::new(status),
        }
    }

    /// Set status code
    pub fn status(mut self, status: StatusCode) -> Self {
        self.response.status = status;
        self
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.response.headers.push((name.into(), value.into()));
        self
    }

    /// Add a cookie
    pub fn cookie(mut self, cookie: Cookie) -> Self {
        self.response.cookies.push(cookie);
        self
    }

    /// Set body
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.response.body = Body::Bytes(body.into());
        self
    }

    /// Set a form body
    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.response.body = Body::Form(fields);
        self
    }

    /// Set a streaming body
    pub fn stream(mut self, stream: BodyStream) -> Self {
        self.response.body = Body::Stream(stream);
        self
    }

    /// Build the response
    pub fn build(self) -> Response {
        self.response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookie::SameSite;

    #[test]
    fn test_status_code() {
        assert!(StatusCode::OK.is_success());
        assert!(StatusCode::NOT_ACCEPTABLE.is_client_error());
        assert!(StatusCode::INTERNAL_SERVER_ERROR.is_server_error());
        assert_eq!(StatusCode::NOT_ACCEPTABLE.to_string(), "406 Not Acceptable");
    }

    #[test]
    fn test_response_json() {
        let res = Response::json(r#"{"foo":"bar"}"#);
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.content_type(), Some("application/json"));
    }

    #[tokio::test]
    async fn test_into_native_writes_cookies() {
        let res = ResponseBuilder::new(StatusCode::CREATED)
            .header("x-custom", "value")
            .cookie(Cookie::new("session", "abc").same_site(SameSite::Lax))
            .body("Hello")
            .build()
            .into_native();

        assert_eq!(res.status, http::StatusCode::CREATED);
        assert_eq!(res.header("x-custom"), Some("value"));
        assert_eq!(res.header("set-cookie"), Some("session=abc; SameSite=Lax"));
        assert_eq!(res.into_bytes().await.unwrap(), "Hello");
    }

    #[tokio::test]
    async fn test_form_body_is_urlencoded() {
        let res = ResponseBuilder::new(StatusCode::OK)
            .form(vec![("q".into(), "a b".into()), ("x".into(), "1&2".into())])
            .build()
            .into_native();

        assert_eq!(res.header("content-type"), Some("application/x-www-form-urlencoded"));
        assert_eq!(res.into_bytes().await.unwrap(), "q=a%20b&x=1%262");
    }

    #[test]
    fn test_invalid_header_dropped() {
        let res = ResponseBuilder::new(StatusCode::OK)
            .header("bad header", "v")
            .build()
            .into_native();
        assert!(res.headers.is_empty());
    }
}
