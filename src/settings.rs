//! Application settings.
//!
//! A [`Settings`] store holds named [`Value`]s. A few names have a derived,
//! compiled form that is rebuilt on every write:
//!
//! | Name           | Derived        |
//! |----------------|----------------|
//! | `query parser` | [`QueryParser`]|
//! | `trust proxy`  | [`TrustProxy`] |
//!
//! Stores are layered by mount. When an app is mounted into another, its store
//! is linked to the parent's and every lookup for a name it does not hold
//! falls through to the parent.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::{debug, warn};

/// Environment variable read for the default `env` setting.
pub const ENV_VAR: &str = "PATHWAY_ENV";

const QUERY_PARSER: &str = "query parser";
const TRUST_PROXY: &str = "trust proxy";

/// A setting value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl Value {
    /// Truthiness used by `enabled`/`disabled`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Str(s) => !s.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(n.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

// ── Query ─────────────────────────────────────────────────────────────────────

/// Parsed query string: ordered `(key, value)` pairs, keys may repeat.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Query(Vec<(String, String)>);

impl Query {
    pub(crate) const EMPTY: Query = Query(Vec::new());

    pub fn parse(raw: &str) -> Self {
        Self(url::form_urlencoded::parse(raw.as_bytes()).into_owned().collect())
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0.iter().filter(move |(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for Query {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// How the `query` middleware turns a raw query string into a [`Query`].
#[derive(Clone)]
pub enum QueryParser {
    /// `application/x-www-form-urlencoded` pairs.
    UrlEncoded,
    /// Leave `req.query` empty.
    Disabled,
    Custom(Arc<dyn Fn(&str) -> Query + Send + Sync>),
}

impl QueryParser {
    pub fn custom(f: impl Fn(&str) -> Query + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    pub fn parse(&self, raw: &str) -> Query {
        match self {
            Self::UrlEncoded => Query::parse(raw),
            Self::Disabled => Query::default(),
            Self::Custom(f) => f(raw),
        }
    }

    fn compile(value: &Value) -> Self {
        match value {
            Value::Bool(true) => Self::UrlEncoded,
            Value::Bool(false) => Self::Disabled,
            Value::Str(s) if s == "extended" || s == "simple" => Self::UrlEncoded,
            other => panic!("unknown value for query parser function: {other}"),
        }
    }
}

impl fmt::Debug for QueryParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UrlEncoded => f.write_str("UrlEncoded"),
            Self::Disabled => f.write_str("Disabled"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

// ── TrustProxy ────────────────────────────────────────────────────────────────

/// Which peers are trusted to set `X-Forwarded-*` headers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrustProxy {
    None,
    All,
    /// Trust the first `n` hops from the server.
    Hops(u32),
    /// Trust these addresses. `loopback` in the setting string expands to
    /// every loopback address.
    Addrs { addrs: Vec<IpAddr>, loopback: bool },
}

impl TrustProxy {
    /// Whether `addr`, `hop` steps away from the server, is trusted.
    pub fn trusts(&self, addr: Option<IpAddr>, hop: u32) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Hops(n) => hop < *n,
            Self::Addrs { addrs, loopback } => {
                addr.is_some_and(|a| (*loopback && a.is_loopback()) || addrs.contains(&a))
            }
        }
    }

    fn compile(value: &Value) -> Self {
        match value {
            Value::Bool(true) => Self::All,
            Value::Bool(false) => Self::None,
            Value::Int(n) => Self::Hops(u32::try_from(*n).unwrap_or(0)),
            Value::Str(list) => {
                let mut addrs = Vec::new();
                let mut loopback = false;
                for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    if item == "loopback" {
                        loopback = true;
                        continue;
                    }
                    match item.parse::<IpAddr>() {
                        Ok(addr) => addrs.push(addr),
                        Err(_) => panic!("invalid IP address: {item}"),
                    }
                }
                Self::Addrs { addrs, loopback }
            }
        }
    }
}

// ── Settings ──────────────────────────────────────────────────────────────────

/// A layered settings store. Cheap to share behind an `Arc`.
pub struct Settings {
    values: RwLock<HashMap<String, Value>>,
    query_parser: RwLock<Option<QueryParser>>,
    trust_proxy: RwLock<Option<TrustProxy>>,
    trust_proxy_default: AtomicBool,
    parent: OnceLock<Arc<Settings>>,
    mount_path: OnceLock<String>,
}

impl Settings {
    /// A store holding the default configuration.
    pub fn new() -> Self {
        let settings = Self {
            values: RwLock::new(HashMap::new()),
            query_parser: RwLock::new(None),
            trust_proxy: RwLock::new(None),
            trust_proxy_default: AtomicBool::new(true),
            parent: OnceLock::new(),
            mount_path: OnceLock::new(),
        };
        let env = std::env::var(ENV_VAR).unwrap_or_else(|_| "development".to_owned());

        settings.set("x-powered-by", true);
        settings.set("env", env);
        settings.set(QUERY_PARSER, "extended");
        settings.set("subdomain offset", 2);
        settings.store(TRUST_PROXY, Value::Bool(false));
        settings
    }

    /// Looks `name` up here, then in each parent.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.values.read().get(name) {
            return Some(v.clone());
        }
        self.parent.get().and_then(|p| p.get(name))
    }

    /// Writes `name` and recomputes its derived value.
    ///
    /// # Panics
    ///
    /// When a derived setting receives a value it cannot compile.
    pub fn set(&self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        debug!(setting = name, value = %value, "set");
        if name == TRUST_PROXY {
            self.trust_proxy_default.store(false, Ordering::Relaxed);
        }
        self.store(name, value);
    }

    /// Installs a query parser, bypassing the named variants.
    pub fn set_query_parser(&self, parser: QueryParser) {
        self.values.write().insert(QUERY_PARSER.to_owned(), Value::from("custom"));
        *self.query_parser.write() = Some(parser);
    }

    fn store(&self, name: &str, value: Value) {
        match name {
            QUERY_PARSER => *self.query_parser.write() = Some(QueryParser::compile(&value)),
            TRUST_PROXY => *self.trust_proxy.write() = Some(TrustProxy::compile(&value)),
            _ => {}
        }
        self.values.write().insert(name.to_owned(), value);
    }

    pub fn enabled(&self, name: &str) -> bool {
        self.get(name).is_some_and(|v| v.is_truthy())
    }

    pub fn disabled(&self, name: &str) -> bool {
        !self.enabled(name)
    }

    /// The `env` setting, `"development"` when unset.
    pub fn env(&self) -> String {
        self.get("env")
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_else(|| "development".to_owned())
    }

    pub fn query_parser(&self) -> QueryParser {
        if let Some(p) = self.query_parser.read().as_ref() {
            return p.clone();
        }
        self.parent.get().map_or(QueryParser::UrlEncoded, |p| p.query_parser())
    }

    pub fn trust_proxy(&self) -> TrustProxy {
        if let Some(t) = self.trust_proxy.read().as_ref() {
            return t.clone();
        }
        self.parent.get().map_or(TrustProxy::None, |p| p.trust_proxy())
    }

    /// The path this store's app is reachable under, chained through every
    /// parent. Empty for a top-level app.
    pub fn path(&self) -> String {
        match (self.parent.get(), self.mount_path.get()) {
            (Some(parent), Some(mount)) => format!("{}{}", parent.path(), mount),
            _ => String::new(),
        }
    }

    pub fn mount_path(&self) -> &str {
        self.mount_path.get().map_or("/", String::as_str)
    }

    pub fn parent(&self) -> Option<&Arc<Settings>> {
        self.parent.get()
    }

    /// Links this store under `parent`. A `trust proxy` that was never set
    /// explicitly is dropped so the parent's applies.
    pub(crate) fn attach(&self, parent: Arc<Settings>, mount_path: &str) {
        if self.trust_proxy_default.load(Ordering::Relaxed) {
            self.values.write().remove(TRUST_PROXY);
            *self.trust_proxy.write() = None;
        }
        if self.parent.set(parent).is_err() || self.mount_path.set(mount_path.to_owned()).is_err() {
            warn!(mount_path, "settings already attached, keeping the first parent");
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("values", &*self.values.read())
            .field("mount_path", &self.mount_path.get())
            .field("has_parent", &self.parent.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = Settings::new();
        assert!(s.enabled("x-powered-by"));
        assert_eq!(s.get("subdomain offset"), Some(Value::Int(2)));
        assert_eq!(s.get("query parser"), Some(Value::from("extended")));
        assert_eq!(s.trust_proxy(), TrustProxy::None);
        assert!(s.disabled("missing"));
    }

    #[test]
    fn derived_values_follow_writes() {
        let s = Settings::new();
        s.set("trust proxy", true);
        assert_eq!(s.trust_proxy(), TrustProxy::All);
        s.set("trust proxy", 2);
        assert_eq!(s.trust_proxy(), TrustProxy::Hops(2));
        s.set("query parser", false);
        assert!(matches!(s.query_parser(), QueryParser::Disabled));
    }

    #[test]
    #[should_panic(expected = "unknown value for query parser function")]
    fn unknown_query_parser_panics() {
        Settings::new().set("query parser", "qs");
    }

    #[test]
    fn address_lists() {
        let s = Settings::new();
        s.set("trust proxy", "loopback, 10.0.0.1");
        let trust = s.trust_proxy();
        assert!(trust.trusts(Some("127.0.0.1".parse().unwrap()), 0));
        assert!(trust.trusts(Some("10.0.0.1".parse().unwrap()), 0));
        assert!(!trust.trusts(Some("10.0.0.2".parse().unwrap()), 0));
        assert!(!trust.trusts(None, 0));
    }

    #[test]
    fn hops() {
        let t = TrustProxy::Hops(1);
        assert!(t.trusts(None, 0));
        assert!(!t.trusts(None, 1));
    }

    #[test]
    fn child_falls_back_to_parent() {
        let parent = Arc::new(Settings::new());
        parent.set("title", "root");
        parent.set("trust proxy", true);

        let child = Settings::new();
        child.set("env", "staging");
        child.attach(parent.clone(), "/blog");

        assert_eq!(child.get("title"), Some(Value::from("root")));
        assert_eq!(child.env(), "staging");
        assert_eq!(child.trust_proxy(), TrustProxy::All);
        assert_eq!(child.path(), "/blog");
        assert_eq!(parent.path(), "");
    }

    #[test]
    fn explicit_trust_proxy_survives_mount() {
        let parent = Arc::new(Settings::new());
        parent.set("trust proxy", true);
        let child = Settings::new();
        child.set("trust proxy", false);
        child.attach(parent, "/x");
        assert_eq!(child.trust_proxy(), TrustProxy::None);
    }

    #[test]
    fn paths_chain() {
        let root = Arc::new(Settings::new());
        let mid = Arc::new(Settings::new());
        mid.attach(root, "/a");
        let leaf = Settings::new();
        leaf.attach(mid, "/b");
        assert_eq!(leaf.path(), "/a/b");
        assert_eq!(leaf.mount_path(), "/b");
    }

    #[test]
    fn second_attach_keeps_the_first_parent() {
        let first = Arc::new(Settings::new());
        first.set("title", "first");
        let second = Arc::new(Settings::new());
        second.set("title", "second");

        let child = Settings::new();
        child.attach(first, "/a");
        child.attach(second, "/b");
        assert_eq!(child.get("title"), Some(Value::from("first")));
        assert_eq!(child.mount_path(), "/a");
    }

    #[test]
    fn custom_query_parser() {
        let s = Settings::new();
        s.set_query_parser(QueryParser::custom(|raw| {
            Query::from_iter([("raw".to_owned(), raw.to_owned())])
        }));
        assert_eq!(s.query_parser().parse("a=1").get("raw"), Some("a=1"));
    }

    #[test]
    fn query_pairs() {
        let q = Query::parse("a=1&b=two%20words&a=3");
        assert_eq!(q.get("a"), Some("1"));
        assert_eq!(q.get("b"), Some("two words"));
        assert_eq!(q.get_all("a").collect::<Vec<_>>(), ["1", "3"]);
    }
}
