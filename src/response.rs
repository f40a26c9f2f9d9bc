//! Outgoing HTTP response type.
//!
//! Handlers receive a `&mut Response`, fill it in, and usually return
//! [`Next::End`](crate::Next::End) once they have sent a body.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;

use crate::error::Error;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`Response::bytes`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentType {
    Csv,          // text/csv
    EventStream,  // text/event-stream  (SSE)
    FormData,     // application/x-www-form-urlencoded
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv         => "text/csv",
            Self::EventStream => "text/event-stream",
            Self::FormData    => "application/x-www-form-urlencoded",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use pathway::{ContentType, Response, StatusCode};
///
/// let mut res = Response::new();
/// res.status(StatusCode::CREATED)
///     .set("location", "/users/42")?
///     .json(br#"{"id":42}"#.to_vec());
///
/// let mut res = Response::new();
/// res.bytes(ContentType::Xml, b"<ok/>".to_vec());
/// # Ok::<(), pathway::Error>(())
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    finished: bool,
}

impl Response {
    /// `200 OK`, no headers, empty body.
    pub fn new() -> Self {
        Self { status: StatusCode::OK, headers: HeaderMap::new(), body: Bytes::new(), finished: false }
    }

    pub fn status(&mut self, code: StatusCode) -> &mut Self {
        self.status = code;
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    /// Sets a header, replacing any previous value.
    pub fn set(&mut self, name: &str, value: &str) -> Result<&mut Self, Error> {
        let (name, value) = header(name, value)?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Adds a header value, keeping previous ones.
    pub fn append(&mut self, name: &str, value: &str) -> Result<&mut Self, Error> {
        let (name, value) = header(name, value)?;
        self.headers.append(name, value);
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Sends an HTML body. Keeps a content type set earlier.
    pub fn send(&mut self, body: impl Into<String>) {
        self.finish(ContentType::Html.as_str(), body.into().into_bytes(), false);
    }

    /// `text/plain; charset=utf-8`.
    pub fn text(&mut self, body: impl Into<String>) {
        self.finish(ContentType::Text.as_str(), body.into().into_bytes(), true);
    }

    /// `application/json`.
    ///
    /// Pass bytes from your serialiser directly:
    /// - serde_json: `serde_json::to_vec(&val)?`
    /// - hand-built: `format!(r#"{{"id":{id}}}"#).into_bytes()`
    pub fn json(&mut self, body: Vec<u8>) {
        self.finish(ContentType::Json.as_str(), body, true);
    }

    /// Sends a typed body. Use this for XML, CSV, binary, SSE, etc.
    pub fn bytes(&mut self, content_type: ContentType, body: Vec<u8>) {
        self.finish(content_type.as_str(), body, true);
    }

    /// Sets the status and sends its reason phrase as plain text.
    pub fn send_status(&mut self, code: StatusCode) {
        self.status = code;
        let reason = code.canonical_reason().map_or_else(|| code.as_str().to_owned(), str::to_owned);
        self.text(reason);
    }

    /// Finishes the response with whatever body it already has.
    pub fn end(&mut self) {
        self.finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn finish(&mut self, content_type: &'static str, body: Vec<u8>, replace: bool) {
        if replace || !self.headers.contains_key(CONTENT_TYPE) {
            self.headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        self.body = Bytes::from(body);
        self.finished = true;
    }

    /// Converts into a hyper response. `head` drops the body but keeps its
    /// length.
    pub(crate) fn into_http(self, head: bool) -> http::Response<Full<Bytes>> {
        let len = self.body.len();
        let body = if head { Bytes::new() } else { self.body };
        let mut out = http::Response::new(Full::new(body));
        *out.status_mut() = self.status;
        *out.headers_mut() = self.headers;
        if head {
            out.headers_mut().insert(http::header::CONTENT_LENGTH, HeaderValue::from(len));
        }
        out
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

fn header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), Error> {
    let invalid = || Error::InvalidHeader { name: name.to_owned() };
    let n = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
    let v = HeaderValue::from_str(value).map_err(|_| invalid())?;
    Ok((n, v))
}
