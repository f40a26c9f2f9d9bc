//! Handlers, the `Next` signal, and type erasure.
//!
//! # The continuation protocol
//!
//! A handler does its work and then tells the dispatcher what happens next
//! by returning a [`Next`]:
//!
//! ```text
//! Next::Continue      keep going with the next matching layer
//! Next::SkipRoute     skip the rest of this route's handlers
//! Next::AbortRouter   leave the current router; its parent carries on
//! Next::Fail(err)     jump to the next error handler
//! Next::End           the handler owns the exchange; stop dispatching
//! ```
//!
//! Returning `Err(err)` is the same as `Next::Fail(err)`, so `?` works inside
//! handlers. A panic inside a handler future is caught and turned into
//! [`Error::Panic`].
//!
//! # How handlers are stored
//!
//! Every handler ends up behind an `Arc<dyn …>` so a router can hold closures
//! of different types in one stack:
//!
//! ```text
//! handler(|req, res| Box::pin(async move { … }))   ← user writes this
//!        ↓
//! Arc::new(FnMiddleware(closure))                  ← heap-allocated wrapper
//!        ↓  stored as Arc<dyn Middleware>
//! middleware.call(req, res) at request time        ← one vtable dispatch
//! ```
//!
//! Closures return a boxed future because the future borrows the request and
//! response for as long as it runs.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;

use crate::application::App;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// A heap-allocated, type-erased future borrowing the request for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What every handler future resolves to.
pub type Outcome = Result<Next, Error>;

/// The signal a handler hands back to the dispatcher.
#[derive(Clone, Debug)]
pub enum Next {
    /// Continue with the next matching layer.
    Continue,
    /// Skip the remaining handlers of the current route. The router keeps
    /// trying other layers.
    SkipRoute,
    /// Skip the rest of the current router. Its parent continues as if the
    /// router had finished without error.
    AbortRouter,
    /// Route to the next error handler.
    Fail(Error),
    /// The handler ended (or took over) the exchange. Nothing else runs.
    End,
}

impl Next {
    pub fn fail(err: impl Into<Error>) -> Self {
        Self::Fail(err.into())
    }

    pub(crate) fn from_error(err: Option<Error>) -> Self {
        err.map_or(Self::Continue, Self::Fail)
    }
}

// ── Handler traits ────────────────────────────────────────────────────────────

/// A normal `(request, response)` handler.
///
/// Implemented for closures via [`handler`]. Implement it directly on your own
/// type when the handler carries state that is awkward to clone into a
/// closure.
pub trait Middleware: Send + Sync + 'static {
    fn call<'a>(&'a self, req: &'a mut Request, res: &'a mut Response) -> BoxFuture<'a, Outcome>;
}

/// An `(error, request, response)` handler. Only runs while an error is
/// pending.
pub trait ErrorMiddleware: Send + Sync + 'static {
    fn call<'a>(
        &'a self,
        err: Error,
        req: &'a mut Request,
        res: &'a mut Response,
    ) -> BoxFuture<'a, Outcome>;
}

/// A parameter interceptor, run before handlers see a bound parameter.
pub(crate) trait ParamCallback: Send + Sync + 'static {
    fn call<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
        value: String,
    ) -> BoxFuture<'a, Outcome>;
}

struct FnMiddleware<F>(F);

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, Outcome>
        + Send
        + Sync
        + 'static,
{
    fn call<'a>(&'a self, req: &'a mut Request, res: &'a mut Response) -> BoxFuture<'a, Outcome> {
        (self.0)(req, res)
    }
}

struct FnErrorMiddleware<F>(F);

impl<F> ErrorMiddleware for FnErrorMiddleware<F>
where
    F: for<'a> Fn(Error, &'a mut Request, &'a mut Response) -> BoxFuture<'a, Outcome>
        + Send
        + Sync
        + 'static,
{
    fn call<'a>(
        &'a self,
        err: Error,
        req: &'a mut Request,
        res: &'a mut Response,
    ) -> BoxFuture<'a, Outcome> {
        (self.0)(err, req, res)
    }
}

pub(crate) struct FnParam<F>(pub(crate) F);

impl<F> ParamCallback for FnParam<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response, String) -> BoxFuture<'a, Outcome>
        + Send
        + Sync
        + 'static,
{
    fn call<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
        value: String,
    ) -> BoxFuture<'a, Outcome> {
        (self.0)(req, res, value)
    }
}

// ── Handler ───────────────────────────────────────────────────────────────────

pub(crate) enum Kind {
    Request(Arc<dyn Middleware>),
    Error(Arc<dyn ErrorMiddleware>),
    Router(Box<Router>),
    App(Box<App>),
}

/// One mountable unit: a request handler, an error handler, a router or an
/// app.
///
/// The kind decides which dispatch path is taken. Request handlers, routers
/// and apps are skipped while an error is pending. Error handlers only run
/// while one is pending.
pub struct Handler {
    pub(crate) kind: Kind,
    name: Option<String>,
}

impl Handler {
    pub fn new(middleware: impl Middleware) -> Self {
        Self { kind: Kind::Request(Arc::new(middleware)), name: None }
    }

    pub fn error(middleware: impl ErrorMiddleware) -> Self {
        Self { kind: Kind::Error(Arc::new(middleware)), name: None }
    }

    /// Names the handler in debug logs.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> &str {
        match (&self.name, &self.kind) {
            (Some(name), _) => name,
            (None, Kind::Router(_)) => "router",
            (None, Kind::App(_)) => "mounted_app",
            (None, _) => "<anonymous>",
        }
    }

    pub fn is_error_handler(&self) -> bool {
        matches!(self.kind, Kind::Error(_))
    }

    /// Runs the handler for the pending `err`, or skips it.
    pub(crate) async fn invoke(&self, err: Option<Error>, req: &mut Request, res: &mut Response) -> Next {
        match (&self.kind, err) {
            (Kind::Error(h), Some(err)) => guard(h.call(err, req, res)).await,
            (Kind::Error(_), None) => Next::Continue,
            (_, Some(err)) => Next::Fail(err),
            (Kind::Request(h), None) => guard(h.call(req, res)).await,
            (Kind::Router(router), None) => router.handle(req, res).await,
            (Kind::App(app), None) => app.handle_mounted(req, res).await,
        }
    }
}

/// Wraps a closure as a request handler.
///
/// ```rust
/// use pathway::{handler, Next};
///
/// let hello = handler(|_req, res| Box::pin(async move {
///     res.text("hello");
///     Ok(Next::End)
/// }));
/// ```
pub fn handler<F>(f: F) -> Handler
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, Outcome>
        + Send
        + Sync
        + 'static,
{
    Handler::new(FnMiddleware(f))
}

/// Wraps a closure as an error handler.
pub fn error_handler<F>(f: F) -> Handler
where
    F: for<'a> Fn(Error, &'a mut Request, &'a mut Response) -> BoxFuture<'a, Outcome>
        + Send
        + Sync
        + 'static,
{
    Handler::error(FnErrorMiddleware(f))
}

/// Awaits a handler future. Errors and panics become [`Next::Fail`].
pub(crate) async fn guard(fut: BoxFuture<'_, Outcome>) -> Next {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(next)) => next,
        Ok(Err(err)) => Next::Fail(err),
        Err(payload) => Next::Fail(Error::from_panic(payload)),
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// An ordered, flattened list of handlers accepted by the registration
/// methods.
///
/// Built from a single [`Handler`], a `Router`, an `App`, arrays, vectors, or
/// vectors of `Handlers` (nested lists are flattened in order).
#[derive(Default)]
pub struct Handlers(pub(crate) Vec<Handler>);

impl Handlers {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for Handlers {
    type Item = Handler;
    type IntoIter = std::vec::IntoIter<Handler>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<Handler> for Handlers {
    fn from(h: Handler) -> Self {
        Self(vec![h])
    }
}

impl From<Vec<Handler>> for Handlers {
    fn from(v: Vec<Handler>) -> Self {
        Self(v)
    }
}

impl<const N: usize> From<[Handler; N]> for Handlers {
    fn from(a: [Handler; N]) -> Self {
        Self(a.into_iter().collect())
    }
}

impl From<Vec<Handlers>> for Handlers {
    fn from(nested: Vec<Handlers>) -> Self {
        Self(nested.into_iter().flat_map(|h| h.0).collect())
    }
}

impl From<Router> for Handler {
    fn from(router: Router) -> Self {
        Self { kind: Kind::Router(Box::new(router)), name: None }
    }
}

impl From<App> for Handler {
    fn from(app: App) -> Self {
        Self { kind: Kind::App(Box::new(app)), name: None }
    }
}

impl From<Router> for Handlers {
    fn from(router: Router) -> Self {
        Handler::from(router).into()
    }
}

impl From<App> for Handlers {
    fn from(app: App) -> Self {
        Handler::from(app).into()
    }
}
