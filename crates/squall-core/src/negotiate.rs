//! Content negotiation
//!
//! Picks one content route from a set using the request's `Accept` header.
//! The resolver is total: it returns a route whenever the set holds one,
//! falling back to the first declared route when no Accept entry can be
//! satisfied.

use crate::route::{Kind, Route};

/// One parsed `Accept` entry
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRange {
    /// Lowercased media type without parameters
    pub mime: String,
    pub quality: f32,
}

/// Parse an `Accept` header into media ranges, best first
///
/// Quality defaults to 1.0, including when `q` does not parse. Entries with
/// `q=0` are dropped. Ties keep header order.
pub fn parse_accept(header: &str) -> Vec<MediaRange> {
    let mut ranges: Vec<MediaRange> = header
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split(';');
            let mime = parts.next()?.trim().to_ascii_lowercase();
            if mime.is_empty() {
                return None;
            }

            let quality = parts
                .filter_map(|param| param.split_once('='))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("q"))
                .and_then(|(_, value)| value.trim().parse::<f32>().ok())
                .filter(|q| q.is_finite())
                .map(|q| q.clamp(0.0, 1.0))
                .unwrap_or(1.0);

            (quality > 0.0).then_some(MediaRange { mime, quality })
        })
        .collect();

    // Stable: equal qualities keep header order
    ranges.sort_by(|a, b| b.quality.total_cmp(&a.quality));
    ranges
}

/// Index of the chosen kind in `kinds`
///
/// `kinds` are the content kinds of a route set in declaration order.
pub fn negotiate(kinds: &[Kind], accept: &str) -> Option<usize> {
    if kinds.is_empty() {
        return None;
    }

    let ranges = parse_accept(accept);
    if ranges.is_empty() {
        return by_priority(kinds, |_| true);
    }

    for range in &ranges {
        let found = match range.mime.as_str() {
            "*/*" | "*" => by_priority(kinds, |_| true),
            mime => match mime.strip_suffix("/*") {
                Some(primary) => by_priority(kinds, |k| k.primary_type() == primary),
                None => Kind::from_mime(mime).and_then(|k| kinds.iter().position(|&p| p == k)),
            },
        };
        if found.is_some() {
            return found;
        }
    }

    // Unsatisfiable Accept: serve what we have
    Some(0)
}

/// First present kind, in priority order, that passes `filter`
fn by_priority(kinds: &[Kind], filter: impl Fn(Kind) -> bool) -> Option<usize> {
    Kind::PRIORITY
        .into_iter()
        .filter(|&k| filter(k))
        .find_map(|k| kinds.iter().position(|&present| present == k))
}

/// Choose the content route answering `accept`
///
/// Http routes are ignored; `None` only when the set has no content route.
pub fn match_kind<'a>(routes: &'a [Route], accept: &str) -> Option<&'a Route> {
    let content: Vec<&Route> = routes.iter().filter(|r| r.is_content()).collect();
    let kinds: Vec<Kind> = content.iter().map(|r| r.kind()).collect();
    negotiate(&kinds, accept).map(|i| content[i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route_set::{html, json, text};
    use crate::route_set::RouteSet;

    fn pick(set: &RouteSet, accept: &str) -> Option<Kind> {
        match_kind(set.routes(), accept).map(|r| r.kind())
    }

    #[test]
    fn test_parse_accept() {
        let ranges = parse_accept("text/html;q=0.9, Application/JSON, */*;q=0.1");
        let mimes: Vec<&str> = ranges.iter().map(|r| r.mime.as_str()).collect();
        assert_eq!(mimes, vec!["application/json", "text/html", "*/*"]);
        assert_eq!(ranges[1].quality, 0.9);
    }

    #[test]
    fn test_parse_accept_edge_cases() {
        assert!(parse_accept("").is_empty());
        assert!(parse_accept(" , ,").is_empty());
        // Malformed q keeps the default
        assert_eq!(parse_accept("text/plain;q=abc")[0].quality, 1.0);
        // q=0 means "not acceptable"
        assert!(parse_accept("text/plain;q=0").is_empty());
        // Parameters other than q are ignored
        assert_eq!(parse_accept("text/html; charset=utf-8")[0].mime, "text/html");
    }

    #[test]
    fn test_empty_accept_uses_priority() {
        let set = text("t").json(serde_json::json!({}));
        assert_eq!(pick(&set, ""), Some(Kind::Json));

        let set = html("h").text("t");
        assert_eq!(pick(&set, ""), Some(Kind::Text));
    }

    #[test]
    fn test_quality_order() {
        let set = html("h").json(serde_json::json!({}));
        assert_eq!(pick(&set, "text/html;q=0.9, application/json;q=1.0"), Some(Kind::Json));
        assert_eq!(pick(&set, "text/html;q=1.0, application/json;q=0.9"), Some(Kind::Html));
    }

    #[test]
    fn test_wildcards() {
        let set = html("h").text("t").json(serde_json::json!({}));
        assert_eq!(pick(&set, "*/*"), Some(Kind::Json));
        assert_eq!(pick(&set, "text/*"), Some(Kind::Text));

        let set = html("h").json(serde_json::json!({}));
        assert_eq!(pick(&set, "text/*"), Some(Kind::Html));
    }

    #[test]
    fn test_unsatisfiable_falls_back_to_first() {
        let set = html("h");
        assert_eq!(pick(&set, "image/png"), Some(Kind::Html));

        let set = text("t").html("h");
        assert_eq!(pick(&set, "image/png"), Some(Kind::Text));
    }

    #[test]
    fn test_no_content_routes() {
        assert_eq!(pick(&RouteSet::new(), "text/html"), None);
        assert_eq!(negotiate(&[], ""), None);
    }

    #[test]
    fn test_first_route_of_kind_wins() {
        let set = text("outer").text("inner");
        let route = match_kind(set.routes(), "text/plain").unwrap();
        assert!(std::ptr::eq(route, &set.routes()[0]));
    }

    #[test]
    fn test_deterministic() {
        let set = html("h").text("t").json(serde_json::json!({}));
        for accept in ["", "*/*", "text/*;q=0.5, application/*", "image/png", "text/html"] {
            let first = pick(&set, accept);
            for _ in 0..10 {
                assert_eq!(pick(&set, accept), first);
            }
        }
    }
}
