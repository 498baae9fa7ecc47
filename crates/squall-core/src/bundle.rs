//! Serving built artifacts
//!
//! A bundler hands the server a [`BundleManifest`]: a lookup from a path to
//! bytes and a content type. The server only reads it.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::response::{Response, ResponseBuilder, StatusCode};
use crate::route_set::{http, RouteSet};
use bytes::Bytes;
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path};
use std::sync::Arc;
use tracing::debug;

/// Artifact lookup supplied by a bundler
pub trait BundleManifest: Send + Sync + 'static {
    /// Artifact bytes for a path relative to the bundle root
    fn resolve(&self, path: &str) -> Option<Bytes>;

    /// Content type of the artifact at `path`
    fn content_type(&self, path: &str) -> Option<String>;
}

/// Content type from a file extension
pub fn mime_for_path(path: &str) -> &'static str {
    let extension = path.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    match extension.to_ascii_lowercase().as_str() {
        // Web
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "wasm" => "application/wasm",
        "xml" => "application/xml",
        // Fonts
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        // Images
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        // Media
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        // Other
        _ => "application/octet-stream",
    }
}

/// Relative artifact path, or `None` for dot-files and traversal
fn sanitize_path(path: &str) -> Option<String> {
    let path = path.trim_start_matches('/');
    if path.is_empty() || path.split('/').any(|s| s.starts_with('.')) {
        return None;
    }

    let mut parts = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(c) => parts.push(c.to_str()?.to_string()),
            Component::ParentDir => return None,
            _ => {}
        }
    }
    Some(parts.join("/"))
}

/// In-memory manifest
#[derive(Debug, Clone, Default)]
pub struct MemoryBundle {
    files: HashMap<String, (String, Bytes)>,
}

impl MemoryBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an artifact, content type guessed from the extension
    pub fn insert(&mut self, path: &str, body: impl Into<Bytes>) {
        let content_type = mime_for_path(path).to_string();
        self.insert_with_type(path, content_type, body);
    }

    pub fn insert_with_type(&mut self, path: &str, content_type: impl Into<String>, body: impl Into<Bytes>) {
        let path = path.trim_start_matches('/').to_string();
        self.files.insert(path, (content_type.into(), body.into()));
    }

    pub fn with(mut self, path: &str, body: impl Into<Bytes>) -> Self {
        self.insert(path, body);
        self
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl BundleManifest for MemoryBundle {
    fn resolve(&self, path: &str) -> Option<Bytes> {
        let path = sanitize_path(path)?;
        self.files.get(&path).map(|(_, body)| body.clone())
    }

    fn content_type(&self, path: &str) -> Option<String> {
        let path = sanitize_path(path)?;
        self.files.get(&path).map(|(ct, _)| ct.clone())
    }
}

/// Build output directory, read once at load
#[derive(Debug, Clone)]
pub struct DirectoryBundle {
    files: MemoryBundle,
}

impl DirectoryBundle {
    /// Read every non-hidden file under `root`
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(Error::Config(format!("bundle root {} is not a directory", root.display())));
        }

        let mut files = MemoryBundle::new();
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let name = entry.file_name();
                if name.to_string_lossy().starts_with('.') {
                    continue;
                }

                let path = entry.path();
                if entry.file_type()?.is_dir() {
                    pending.push(path);
                    continue;
                }

                let Some(relative) = path
                    .strip_prefix(root)
                    .ok()
                    .and_then(|p| p.to_str())
                    .map(|p| p.replace('\\', "/"))
                else {
                    continue;
                };
                files.insert(&relative, fs::read(&path)?);
            }
        }

        debug!(root = %root.display(), files = files.len(), "bundle loaded");
        Ok(Self { files })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl BundleManifest for DirectoryBundle {
    fn resolve(&self, path: &str) -> Option<Bytes> {
        self.files.resolve(path)
    }

    fn content_type(&self, path: &str) -> Option<String> {
        self.files.content_type(path)
    }
}

/// Route set answering from a manifest
///
/// Reads the artifact path from the `path` slot; mount it under a catch-all
/// such as `/assets/[...path]`.
pub fn bundle_routes(manifest: Arc<dyn BundleManifest>) -> RouteSet {
    http(move |ctx: Context| {
        let manifest = Arc::clone(&manifest);
        async move {
            let path = ctx.slot("path").unwrap_or_default();
            let Some(body) = manifest.resolve(&path) else {
                return Err(Error::http(StatusCode::NOT_FOUND, "Not Found"));
            };
            let content_type = manifest
                .content_type(&path)
                .unwrap_or_else(|| mime_for_path(&path).to_string());

            Ok::<Response, Error>(
                ResponseBuilder::new(StatusCode::OK)
                    .header("content-type", content_type)
                    .body(body)
                    .build(),
            )
        }
    })
}
