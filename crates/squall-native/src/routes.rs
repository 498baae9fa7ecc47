//! Native route table
//!
//! Static assets are answered by the native layer directly. Every other
//! request, matched or not, goes to the fetch callback.

use crate::response::{NativeBody, NativeResponse};
use bytes::Bytes;
use http::header::{self, HeaderValue};
use http::StatusCode;

/// Pre-built response served without calling fetch
#[derive(Debug, Clone)]
pub struct StaticAsset {
    pub status: StatusCode,
    pub content_type: String,
    pub body: Bytes,
}

impl StaticAsset {
    pub fn new(content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    pub fn to_response(&self) -> NativeResponse {
        let mut response = NativeResponse::new(self.status).with_body(NativeBody::Full(self.body.clone()));
        if let Ok(value) = HeaderValue::from_str(&self.content_type) {
            response.headers.insert(header::CONTENT_TYPE, value);
        }
        response
    }
}

/// How the native layer serves a pattern
#[derive(Debug, Clone)]
pub enum NativeRoute {
    Static(StaticAsset),
    Fetch,
}

/// Pattern table loaded into the server with `reload`
#[derive(Debug, Default)]
pub struct NativeRoutes {
    trie: squall_router::Router,
    entries: Vec<(String, NativeRoute)>,
}

impl NativeRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pattern; a repeated pattern replaces the earlier entry
    pub fn insert(&mut self, pattern: impl Into<String>, route: NativeRoute) {
        let pattern = pattern.into();
        if let Some(entry) = self.entries.iter_mut().find(|(p, _)| *p == pattern) {
            entry.1 = route;
            return;
        }
        self.trie.insert(&pattern, self.entries.len() as u32);
        self.entries.push((pattern, route));
    }

    pub fn lookup(&self, path: &str) -> Option<&NativeRoute> {
        let matched = self.trie.find(path)?;
        self.entries.get(matched.id as usize).map(|(_, route)| route)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(p, _)| p.as_str())
    }
}
