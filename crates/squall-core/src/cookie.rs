//! Request cookies and `Set-Cookie` serialization

use std::collections::HashMap;

/// Cookie SameSite attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// HTTP Cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub max_age: Option<i64>, // Seconds
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            domain: None,
            max_age: None,
            secure: false,
            http_only: false,
            same_site: None,
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    pub fn http_only(mut self) -> Self {
        self.http_only = true;
        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    /// Serialize to Set-Cookie header value
    pub fn to_header_value(&self) -> String {
        let mut parts = vec![format!("{}={}", self.name, self.value)];

        if let Some(ref path) = self.path {
            parts.push(format!("Path={}", path));
        }
        if let Some(ref domain) = self.domain {
            parts.push(format!("Domain={}", domain));
        }
        if let Some(max_age) = self.max_age {
            parts.push(format!("Max-Age={}", max_age));
        }
        if self.secure {
            parts.push("Secure".to_string());
        }
        if self.http_only {
            parts.push("HttpOnly".to_string());
        }
        if let Some(same_site) = self.same_site {
            parts.push(format!("SameSite={}", same_site.as_str()));
        }

        parts.join("; ")
    }

    /// Create a deletion cookie (max-age=0)
    pub fn delete(name: impl Into<String>) -> Self {
        Self::new(name, "").max_age(0)
    }
}

/// Cookies sent with a request
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: HashMap<String, String>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `Cookie` header; later duplicates win
    pub fn parse(header: &str) -> Self {
        let mut jar = Self::new();
        jar.extend(header);
        jar
    }

    /// Collect every `Cookie` header of a request
    pub fn from_headers(headers: &http::HeaderMap) -> Self {
        let mut jar = Self::new();
        for value in headers.get_all(http::header::COOKIE) {
            if let Ok(value) = value.to_str() {
                jar.extend(value);
            }
        }
        jar
    }

    fn extend(&mut self, header: &str) {
        for part in header.split(';') {
            if let Some((name, value)) = part.trim().split_once('=') {
                let value = value.trim().trim_matches('"');
                self.cookies.insert(name.trim().to_string(), value.to_string());
            }
        }
    }

    /// Cookie value by name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(|v| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cookies.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cookies.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_serialize() {
        let cookie = Cookie::new("session", "abc123")
            .path("/")
            .secure()
            .http_only()
            .same_site(SameSite::Strict);

        assert_eq!(
            cookie.to_header_value(),
            "session=abc123; Path=/; Secure; HttpOnly; SameSite=Strict"
        );
    }

    #[test]
    fn test_cookie_jar_parse() {
        let jar = CookieJar::parse("session=abc123; theme=\"dark\"; lang=en");

        assert_eq!(jar.get("session"), Some("abc123"));
        assert_eq!(jar.get("theme"), Some("dark"));
        assert_eq!(jar.get("lang"), Some("en"));
        assert_eq!(jar.get("missing"), None);
        assert_eq!(jar.len(), 3);
    }

    #[test]
    fn test_cookie_jar_from_headers() {
        let mut headers = http::HeaderMap::new();
        headers.append("cookie", "a=1".parse().unwrap());
        headers.append("cookie", "b=2; a=3".parse().unwrap());

        let jar = CookieJar::from_headers(&headers);
        assert_eq!(jar.get("a"), Some("3"));
        assert_eq!(jar.get("b"), Some("2"));
    }

    #[test]
    fn test_cookie_delete() {
        let cookie = Cookie::delete("session");
        assert_eq!(cookie.max_age, Some(0));
        assert_eq!(cookie.to_header_value(), "session=; Max-Age=0");
    }
}
