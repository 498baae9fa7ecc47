//! HTTP Request types

use crate::cookie::CookieJar;
use crate::error::{Error, Result};
use bytes::Bytes;
use squall_native::{AbortSignal, NativeRequest};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// HTTP Methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl Method {
    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            _ => Err(Error::UnsupportedMethod(s.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Method a route answers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteMethod {
    /// `*`
    Any,
    Only(Method),
}

impl RouteMethod {
    #[inline]
    pub fn accepts(&self, method: Method) -> bool {
        match self {
            RouteMethod::Any => true,
            RouteMethod::Only(m) => *m == method,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteMethod::Any => "*",
            RouteMethod::Only(m) => m.as_str(),
        }
    }
}

impl From<Method> for RouteMethod {
    fn from(method: Method) -> Self {
        RouteMethod::Only(method)
    }
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incoming request as seen by handlers
///
/// Cheap to clone; the native request is shared.
#[derive(Debug, Clone)]
pub struct Request {
    native: Arc<NativeRequest>,
    method: Method,
    /// Path and query, scheme and host stripped
    url: String,
}

impl Request {
    /// Wrap a native request
    ///
    /// Fails with [`Error::UnsupportedMethod`] for methods outside [`Method`].
    pub fn from_native(native: Arc<NativeRequest>) -> Result<Self> {
        let method = native.method().as_str().parse()?;
        let url = native
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        Ok(Self {
            native,
            method,
            url,
        })
    }

    /// Start building an in-memory request
    pub fn builder(method: Method, url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(method, url)
    }

    #[inline]
    pub fn method(&self) -> Method {
        self.method
    }

    /// Path and query string
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Path without the query string
    pub fn path(&self) -> &str {
        self.url.split_once('?').map_or(self.url.as_str(), |(p, _)| p)
    }

    /// Query string (without leading ?)
    pub fn query(&self) -> Option<&str> {
        self.url.split_once('?').map(|(_, q)| q)
    }

    /// Decoded query pairs in order
    pub fn query_params(&self) -> Vec<(String, String)> {
        self.query().map(parse_query).unwrap_or_default()
    }

    /// Get a header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.native.header(name)
    }

    pub fn headers(&self) -> &http::HeaderMap {
        self.native.headers()
    }

    pub fn cookies(&self) -> CookieJar {
        CookieJar::from_headers(self.native.headers())
    }

    /// Read the body, bounded by the server's size limit
    pub async fn bytes(&self) -> Result<Bytes> {
        Ok(self.native.bytes().await?)
    }

    /// Read the body as UTF-8 text
    pub async fn text(&self) -> Result<String> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::Decode(vec![crate::schema::Issue::new("body", "Body is not valid UTF-8")]))
    }

    pub fn signal(&self) -> &AbortSignal {
        self.native.signal()
    }

    pub fn native(&self) -> &Arc<NativeRequest> {
        &self.native
    }
}

/// Decode an `a=1&b=2` query string
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

/// Percent-decode one URL component, `+` meaning space
pub fn decode_component(s: &str) -> String {
    let s = s.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(s.as_bytes())).into_owned()
}

/// Builder for in-memory requests
pub struct RequestBuilder {
    method: Method,
    url: String,
    headers: Vec<(String, String)>,
    body: Bytes,
    signal: AbortSignal,
}

impl RequestBuilder {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
            signal: AbortSignal::new(),
        }
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set body
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Abort signal observed by the request
    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.signal = signal;
        self
    }

    /// Build the native request
    pub fn build_native(self) -> Result<NativeRequest> {
        let mut builder = http::Request::builder()
            .method(self.method.as_str())
            .uri(self.url.as_str());
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let req = builder
            .body(self.body)
            .map_err(|e| Error::InvalidPath(e.to_string()))?;
        Ok(NativeRequest::from_bytes(req, self.signal))
    }

    /// Build the request
    pub fn build(self) -> Result<Request> {
        Request::from_native(Arc::new(self.build_native()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("OPTIONS".parse::<Method>().unwrap(), Method::Options);
        assert!(matches!(
            "PURGE".parse::<Method>(),
            Err(Error::UnsupportedMethod(m)) if m == "PURGE"
        ));
    }

    #[test]
    fn test_route_method_accepts() {
        assert!(RouteMethod::Any.accepts(Method::Delete));
        assert!(RouteMethod::Only(Method::Get).accepts(Method::Get));
        assert!(!RouteMethod::Only(Method::Get).accepts(Method::Post));
        assert_eq!(RouteMethod::Any.to_string(), "*");
    }

    #[test]
    fn test_url_normalized() {
        let req = Request::builder(Method::Get, "http://example.com:8080/users/1?tab=posts&q=a+b")
            .build()
            .unwrap();
        assert_eq!(req.url(), "/users/1?tab=posts&q=a+b");
        assert_eq!(req.path(), "/users/1");
        assert_eq!(req.query(), Some("tab=posts&q=a+b"));
        assert_eq!(
            req.query_params(),
            vec![
                ("tab".to_string(), "posts".to_string()),
                ("q".to_string(), "a b".to_string()),
            ]
        );
    }

    #[test]
    fn test_decode_component() {
        assert_eq!(decode_component("hello%20world"), "hello world");
        assert_eq!(decode_component("caf%C3%A9"), "café");
        assert_eq!(decode_component("100%"), "100%");
    }

    #[tokio::test]
    async fn test_body_and_headers() {
        let req = Request::builder(Method::Post, "/echo")
            .header("Content-Type", "text/plain")
            .header("cookie", "sid=42")
            .body("hi")
            .build()
            .unwrap();
        assert_eq!(req.header("content-type"), Some("text/plain"));
        assert_eq!(req.cookies().get("sid"), Some("42"));
        assert_eq!(req.text().await.unwrap(), "hi");
    }
}
