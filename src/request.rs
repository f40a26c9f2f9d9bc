//! Incoming HTTP request type.
//!
//! The router rewrites `url` and `base_url` while a request travels through
//! mounted routers, so a handler mounted at `/api` sees `url() == "/items"`
//! for `/api/items` and `base_url() == "/api"`. `original_url` never changes.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use http::{Extensions, HeaderMap, Method};

use crate::settings::{Query, Settings};

static EMPTY_QUERY: Query = Query::EMPTY;

/// Settings seen by a request before any app binds its own.
fn detached_settings() -> Arc<Settings> {
    static DETACHED: OnceLock<Arc<Settings>> = OnceLock::new();
    DETACHED.get_or_init(|| Arc::new(Settings::new())).clone()
}

/// An incoming HTTP request, carried by `&mut` through dispatch.
pub struct Request {
    pub(crate) method: Method,
    pub(crate) url: String,
    pub(crate) base_url: String,
    pub(crate) original_url: String,
    pub(crate) params: HashMap<String, String>,
    pub(crate) route: Option<String>,
    pub(crate) query: Option<Query>,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) remote_addr: Option<SocketAddr>,
    pub(crate) settings: Arc<Settings>,
    extensions: Extensions,
}

impl Request {
    /// Builds a request for `url`, which is either a path with an optional
    /// query (`/users/1?x=2`) or an absolute URL.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            method,
            original_url: url.clone(),
            url,
            base_url: String::new(),
            params: HashMap::new(),
            route: None,
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            remote_addr: None,
            settings: detached_settings(),
            extensions: Extensions::new(),
        }
    }

    /// Adds a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::HeaderName::from_bytes(name.as_bytes()),
            http::HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn url(&self) -> &str { &self.url }
    pub fn base_url(&self) -> &str { &self.base_url }
    pub fn original_url(&self) -> &str { &self.original_url }
    pub fn params(&self) -> &HashMap<String, String> { &self.params }
    pub fn query(&self) -> &Query { self.query.as_ref().unwrap_or(&EMPTY_QUERY) }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }
    pub fn settings(&self) -> &Arc<Settings> { &self.settings }
    pub fn extensions(&self) -> &Extensions { &self.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.extensions }

    /// Replaces the current URL. Later layers match against the new value.
    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    /// The template of the route currently dispatching, if any.
    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    /// Path portion of the current URL, without query string.
    pub fn path(&self) -> &str {
        pathname(&self.url)
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/:id`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Overwrites a path parameter. Parameter interceptors use this to
    /// transform a value for later handlers.
    pub fn set_param(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    /// Header lookup. Returns `None` for absent or non-UTF-8 values.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// `"http"` or `"https"`, honoring `X-Forwarded-Proto` from a trusted
    /// peer.
    pub fn protocol(&self) -> String {
        let proto = "http";
        if !self.trusted() {
            return proto.to_owned();
        }
        self.header("x-forwarded-proto")
            .map(|h| h.split(',').next().unwrap_or(h).trim().to_owned())
            .unwrap_or_else(|| proto.to_owned())
    }

    pub fn secure(&self) -> bool {
        self.protocol() == "https"
    }

    /// Host name without port, honoring `X-Forwarded-Host` from a trusted
    /// peer.
    pub fn hostname(&self) -> Option<String> {
        let forwarded = self.trusted().then(|| self.header("x-forwarded-host")).flatten();
        let host = forwarded
            .map(|h| h.split(',').next().unwrap_or(h).trim())
            .or_else(|| self.header(http::header::HOST.as_str()))?;

        // IPv6 literals carry colons inside brackets.
        let offset = if host.starts_with('[') { host.find(']').map_or(0, |i| i + 1) } else { 0 };
        let end = host[offset..].find(':').map_or(host.len(), |i| offset + i);
        Some(host[..end].to_owned())
    }

    fn trusted(&self) -> bool {
        self.settings.trust_proxy().trusts(self.remote_addr.map(|a| a.ip()), 0)
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("base_url", &self.base_url)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// The `scheme://host` prefix of an absolute URL, or `""` for a path.
pub(crate) fn proto_host(url: &str) -> &str {
    if url.is_empty() || url.starts_with('/') {
        return "";
    }
    let search = url.find('?').unwrap_or(url.len());
    match url[..search].find("://") {
        Some(fqdn) => {
            let rest = &url[fqdn + 3..];
            let end = rest.find('/').map_or(url.len(), |i| fqdn + 3 + i);
            &url[..end]
        }
        None => "",
    }
}

/// The path portion of a URL: no scheme, host or query.
pub(crate) fn pathname(url: &str) -> &str {
    let rest = &url[proto_host(url).len()..];
    let end = rest.find(['?', '#']).unwrap_or(rest.len());
    &rest[..end]
}
