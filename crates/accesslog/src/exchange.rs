//! The request/response pair as seen by the access log
//!
//! The pipeline only reads an exchange, through `HttpExchange`. Servers
//! implement it over their own request objects; `RecordedExchange` is an
//! owned implementation for tests, benchmarks and load generation.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::time::SystemTime;

/// Read access to one completed request/response pair
///
/// Lookups return `None` when the value is absent; the renderer prints `-`.
pub trait HttpExchange {
    fn method(&self) -> &str;

    /// Request URI exactly as received (path and query, still escaped)
    fn raw_uri(&self) -> &[u8];

    /// Decoded request path
    fn request_uri(&self) -> &str;

    fn protocol(&self) -> &str;

    fn status(&self) -> u16;

    /// Response body length in bytes
    fn content_length(&self) -> i64;

    /// Request header by name (case-insensitive)
    fn request_header(&self, name: &str) -> Option<&str>;

    /// Response header by name (case-insensitive)
    fn response_header(&self, name: &str) -> Option<&str>;

    fn attribute(&self, name: &str) -> Option<&dyn fmt::Display>;

    fn request_cookie(&self, name: &str) -> Option<&str>;

    fn response_cookie(&self, name: &str) -> Option<&str>;

    /// First cookie set by the response
    fn first_response_cookie(&self) -> Option<&ResponseCookie>;

    /// Authenticated user, if any
    fn remote_user(&self) -> Option<&str>;

    /// Peer address, `None` for non-IP transports
    fn remote_addr(&self) -> Option<IpAddr>;

    fn server_name(&self) -> Option<&str>;

    /// When the request started
    fn start_time(&self) -> SystemTime;
}

/// Reverse lookup used by `%h` when hostname lookup is enabled
pub trait HostResolver: Send + Sync {
    fn lookup(&self, addr: IpAddr) -> Option<String>;
}

/// Resolver backed by a fixed address table
#[derive(Debug, Clone, Default)]
pub struct StaticHostResolver {
    hosts: HashMap<IpAddr, String>,
}

impl StaticHostResolver {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_host(mut self, addr: IpAddr, name: impl Into<String>) -> Self {
        self.hosts.insert(addr, name.into());
        self
    }
}

impl HostResolver for StaticHostResolver {
    fn lookup(&self, addr: IpAddr) -> Option<String> {
        self.hosts.get(&addr).cloned()
    }
}

/// A cookie set by the response
///
/// Displays in `Set-Cookie` header form:
/// `name=value; Domain=d; Path=p; Max-Age=n; Secure; HttpOnly`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseCookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
}

impl ResponseCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    #[must_use]
    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    #[must_use]
    pub fn http_only(mut self) -> Self {
        self.http_only = true;
        self
    }
}

impl fmt::Display for ResponseCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={domain}")?;
        }
        if let Some(path) = &self.path {
            write!(f, "; Path={path}")?;
        }
        if let Some(max_age) = self.max_age {
            write!(f, "; Max-Age={max_age}")?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        Ok(())
    }
}

/// Owned exchange built field by field
///
/// ```
/// use alog_accesslog::{HttpExchange, RecordedExchange};
///
/// let exchange = RecordedExchange::new("GET", "/index.html")
///     .with_status(200)
///     .with_request_header("User-Agent", "curl/8.0");
/// assert_eq!(exchange.request_header("user-agent"), Some("curl/8.0"));
/// ```
#[derive(Debug, Clone)]
pub struct RecordedExchange {
    method: String,
    raw_uri: Vec<u8>,
    request_uri: String,
    protocol: String,
    status: u16,
    content_length: i64,
    request_headers: Vec<(String, String)>,
    response_headers: Vec<(String, String)>,
    attributes: HashMap<String, String>,
    request_cookies: Vec<(String, String)>,
    response_cookies: Vec<ResponseCookie>,
    remote_user: Option<String>,
    remote_addr: Option<IpAddr>,
    server_name: Option<String>,
    start_time: SystemTime,
}

impl RecordedExchange {
    /// `method uri HTTP/1.1`, status 200, from 127.0.0.1, started now
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        let uri = uri.into();
        let path = uri.split('?').next().unwrap_or_default().to_owned();
        Self {
            method: method.into(),
            raw_uri: uri.into_bytes(),
            request_uri: path,
            protocol: "HTTP/1.1".into(),
            status: 200,
            content_length: 0,
            request_headers: Vec::new(),
            response_headers: Vec::new(),
            attributes: HashMap::new(),
            request_cookies: Vec::new(),
            response_cookies: Vec::new(),
            remote_user: None,
            remote_addr: Some(IpAddr::from([127, 0, 0, 1])),
            server_name: None,
            start_time: SystemTime::now(),
        }
    }

    /// Override the raw URI without touching the decoded path
    #[must_use]
    pub fn with_raw_uri(mut self, raw: impl Into<Vec<u8>>) -> Self {
        self.raw_uri = raw.into();
        self
    }

    #[must_use]
    pub fn with_request_uri(mut self, path: impl Into<String>) -> Self {
        self.request_uri = path.into();
        self
    }

    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_content_length(mut self, length: i64) -> Self {
        self.content_length = length;
        self
    }

    #[must_use]
    pub fn with_request_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_response_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.response_headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.attributes.insert(name.into(), value.to_string());
        self
    }

    #[must_use]
    pub fn with_request_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_cookies.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_response_cookie(mut self, cookie: ResponseCookie) -> Self {
        self.response_cookies.push(cookie);
        self
    }

    #[must_use]
    pub fn with_remote_user(mut self, user: impl Into<String>) -> Self {
        self.remote_user = Some(user.into());
        self
    }

    #[must_use]
    pub fn with_remote_addr(mut self, addr: Option<IpAddr>) -> Self {
        self.remote_addr = addr;
        self
    }

    #[must_use]
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_start_time(mut self, start: SystemTime) -> Self {
        self.start_time = start;
        self
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

impl HttpExchange for RecordedExchange {
    fn method(&self) -> &str {
        &self.method
    }

    fn raw_uri(&self) -> &[u8] {
        &self.raw_uri
    }

    fn request_uri(&self) -> &str {
        &self.request_uri
    }

    fn protocol(&self) -> &str {
        &self.protocol
    }

    fn status(&self) -> u16 {
        self.status
    }

    fn content_length(&self) -> i64 {
        self.content_length
    }

    fn request_header(&self, name: &str) -> Option<&str> {
        find_header(&self.request_headers, name)
    }

    fn response_header(&self, name: &str) -> Option<&str> {
        find_header(&self.response_headers, name)
    }

    fn attribute(&self, name: &str) -> Option<&dyn fmt::Display> {
        self.attributes.get(name).map(|v| v as &dyn fmt::Display)
    }

    fn request_cookie(&self, name: &str) -> Option<&str> {
        self.request_cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn response_cookie(&self, name: &str) -> Option<&str> {
        self.response_cookies
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value.as_str())
    }

    fn first_response_cookie(&self) -> Option<&ResponseCookie> {
        self.response_cookies.first()
    }

    fn remote_user(&self) -> Option<&str> {
        self.remote_user.as_deref()
    }

    fn remote_addr(&self) -> Option<IpAddr> {
        self.remote_addr
    }

    fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    fn start_time(&self) -> SystemTime {
        self.start_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_splits_query_from_path() {
        let exchange = RecordedExchange::new("GET", "/search?q=rust");
        assert_eq!(exchange.raw_uri(), b"/search?q=rust");
        assert_eq!(exchange.request_uri(), "/search");
        assert_eq!(exchange.protocol(), "HTTP/1.1");
        assert_eq!(exchange.status(), 200);
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let exchange = RecordedExchange::new("GET", "/")
            .with_request_header("Referer", "http://example.com/")
            .with_response_header("Content-Type", "text/html");

        assert_eq!(exchange.request_header("referer"), Some("http://example.com/"));
        assert_eq!(exchange.response_header("CONTENT-TYPE"), Some("text/html"));
        assert_eq!(exchange.request_header("Accept"), None);
    }

    #[test]
    fn test_cookie_display() {
        let cookie = ResponseCookie::new("sid", "abc")
            .with_domain("example.com")
            .with_path("/")
            .with_max_age(3600)
            .secure()
            .http_only();
        assert_eq!(
            cookie.to_string(),
            "sid=abc; Domain=example.com; Path=/; Max-Age=3600; Secure; HttpOnly"
        );
        assert_eq!(ResponseCookie::new("a", "b").to_string(), "a=b");
    }

    #[test]
    fn test_attribute_display() {
        let exchange = RecordedExchange::new("GET", "/").with_attribute("count", 42);
        assert_eq!(exchange.attribute("count").map(|v| v.to_string()), Some("42".into()));
        assert!(exchange.attribute("missing").is_none());
    }

    #[test]
    fn test_static_resolver() {
        let addr = IpAddr::from([10, 0, 0, 1]);
        let resolver = StaticHostResolver::new().with_host(addr, "gateway");
        assert_eq!(resolver.lookup(addr).as_deref(), Some("gateway"));
        assert_eq!(resolver.lookup(IpAddr::from([10, 0, 0, 2])), None);
    }
}
