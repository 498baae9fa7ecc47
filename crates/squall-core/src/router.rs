//! Router: mount patterns to route sets, plus a middleware layer
//!
//! The layer is captured when a path is mounted. Calling
//! [`Router::layer`] after a mount leaves that mount untouched.
//!
//! ```
//! use squall_core::{http, text, Context, Next, Router};
//!
//! let router = Router::new()
//!     .mount("/before", text("plain"))
//!     .layer(http(|ctx: Context, next: Next| async move { next.run(ctx).await }))
//!     .mount("/after", text("wrapped"));
//!
//! assert_eq!(router.mounts().len(), 2);
//! ```

use crate::request::Method;
use crate::route::{Kind, Route};
use crate::route_set::RouteSet;

/// Route set registered under a path pattern
#[derive(Debug, Clone)]
pub struct Mount {
    pub pattern: String,
    pub routes: RouteSet,
}

/// Immutable router
#[derive(Debug, Clone, Default)]
pub struct Router {
    mounts: Vec<Mount>,
    layer: RouteSet,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount a route set at `pattern`
    ///
    /// The current layer wraps the set. Mounting an existing pattern appends
    /// to the set already there.
    pub fn mount(mut self, pattern: impl Into<String>, routes: RouteSet) -> Self {
        let pattern = normalize(pattern.into());
        let layered = self.layer.clone().merge(routes);

        match self.mounts.iter_mut().find(|m| m.pattern == pattern) {
            Some(existing) => {
                let current = std::mem::take(&mut existing.routes);
                existing.routes = current.merge(layered);
            }
            None => self.mounts.push(Mount {
                pattern,
                routes: layered,
            }),
        }
        self
    }

    /// Add routes to the layer applied to later mounts
    #[doc(alias = "use")]
    pub fn layer(mut self, routes: RouteSet) -> Self {
        self.layer = self.layer.merge(routes);
        self
    }

    /// First route at `pattern` accepting `method`, optionally of `kind`
    ///
    /// Introspection helper; request dispatch negotiates instead.
    pub fn get(&self, method: Method, pattern: &str, kind: Option<Kind>) -> Option<&Route> {
        let pattern = normalize(pattern.to_string());
        self.mounts
            .iter()
            .find(|m| m.pattern == pattern)?
            .routes
            .routes()
            .iter()
            .filter(|r| r.accepts(method))
            .find(|r| kind.map_or(true, |k| r.kind() == k))
    }

    /// Mount another router's mounts into this one, in order
    ///
    /// The other router's layer was already applied to its mounts; this
    /// router's layer wraps them too.
    pub fn merge(self, other: Router) -> Self {
        other
            .mounts
            .into_iter()
            .fold(self, |router, m| router.mount(m.pattern, m.routes))
    }

    #[inline]
    pub fn mounts(&self) -> &[Mount] {
        &self.mounts
    }

    #[inline]
    pub fn layer_routes(&self) -> &RouteSet {
        &self.layer
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }
}

/// Leading slash, no trailing slash except for the root
fn normalize(pattern: String) -> String {
    let trimmed = pattern.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::handler::Next;
    use crate::route_set::{html, http, json, text};

    fn passthrough() -> RouteSet {
        http(|ctx: Context, next: Next| async move { next.run(ctx).await })
    }

    #[test]
    fn test_mount_twice_concatenates() {
        let a = text("a").json(serde_json::json!(1));
        let b = html("b");
        let router = Router::new().mount("/api", a).mount("/api", b);

        assert_eq!(router.mounts().len(), 1);
        let kinds: Vec<Kind> = router.mounts()[0]
            .routes
            .routes()
            .iter()
            .map(|r| r.kind())
            .collect();
        assert_eq!(kinds, vec![Kind::Text, Kind::Json, Kind::Html]);
    }

    #[test]
    fn test_layer_is_prepended() {
        let router = Router::new().layer(passthrough()).mount("/", text("t"));
        let routes = router.mounts()[0].routes.routes();
        assert_eq!(routes[0].kind(), Kind::Http);
        assert_eq!(routes[1].kind(), Kind::Text);
    }

    #[test]
    fn test_layer_only_affects_later_mounts() {
        let router = Router::new()
            .mount("/before", text("b"))
            .layer(passthrough())
            .mount("/after", text("a"));

        assert_eq!(router.mounts()[0].routes.len(), 1);
        assert_eq!(router.mounts()[1].routes.len(), 2);
    }

    #[test]
    fn test_builders_do_not_mutate() {
        let base = Router::new().mount("/", text("t"));
        let extended = base.clone().layer(passthrough()).mount("/x", text("x"));
        assert_eq!(base.mounts().len(), 1);
        assert!(base.layer_routes().is_empty());
        assert_eq!(extended.mounts().len(), 2);
    }

    #[test]
    fn test_get_filters_method_and_kind() {
        let router = Router::new().mount("/users", text("list").json(serde_json::json!([])).post());

        assert!(router.get(Method::Get, "/users", None).is_none());
        let route = router.get(Method::Post, "/users", Some(Kind::Json)).unwrap();
        assert_eq!(route.kind(), Kind::Json);
        assert!(router.get(Method::Post, "/missing", None).is_none());
    }

    #[test]
    fn test_get_matches_wildcard_method() {
        let router = Router::new().mount("/", passthrough().text("t"));
        let route = router.get(Method::Delete, "/", None).unwrap();
        assert_eq!(route.kind(), Kind::Http);
    }

    #[test]
    fn test_normalize_patterns() {
        let router = Router::new().mount("users/", text("a")).mount("/users", text("b"));
        assert_eq!(router.mounts().len(), 1);
        assert_eq!(router.mounts()[0].pattern, "/users");
        assert_eq!(normalize(String::new()), "/");
    }

    #[test]
    fn test_merge_routers() {
        let api = Router::new().mount("/a", text("a"));
        let router = Router::new().mount("/a", html("h")).merge(api);
        assert_eq!(router.mounts().len(), 1);
        assert_eq!(router.mounts()[0].routes.len(), 2);
    }
}
