//! Per-path method dispatch.

use http::Method;
use tracing::trace;

use crate::error::Error;
use crate::handler::{Handler, Handlers, Next};
use crate::request::Request;
use crate::response::Response;

/// Handlers sharing one path, each tagged with the method it answers
/// (`None` for all methods).
///
/// Obtain one with [`Router::route`](crate::Router::route):
///
/// ```rust
/// use pathway::{handler, Next, Router};
///
/// let mut router = Router::new();
/// router
///     .route("/users/:id")
///     .get(handler(|_req, res| Box::pin(async move { res.text("read"); Ok(Next::End) })))
///     .put(handler(|_req, res| Box::pin(async move { res.text("write"); Ok(Next::End) })));
/// ```
pub struct Route {
    path: String,
    stack: Vec<(Option<Method>, Handler)>,
    methods: Vec<Method>,
    all: bool,
}

impl Route {
    pub(crate) fn new(path: &str) -> Self {
        trace!(path, "new route");
        Self { path: path.to_owned(), stack: Vec::new(), methods: Vec::new(), all: false }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether a request with `method` has a handler here. HEAD falls back to
    /// GET unless HEAD was declared.
    pub fn handles_method(&self, method: &Method) -> bool {
        if self.all {
            return true;
        }
        self.methods.contains(&self.effective(method))
    }

    /// Declared methods, in declaration order.
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    fn effective(&self, method: &Method) -> Method {
        if *method == Method::HEAD && !self.methods.contains(&Method::HEAD) {
            Method::GET
        } else {
            method.clone()
        }
    }

    /// Handlers for every method.
    pub fn all(&mut self, handlers: impl Into<Handlers>) -> &mut Self {
        let handlers = self.checked(handlers.into(), "all");
        self.all = true;
        self.stack.extend(handlers.into_iter().map(|h| (None, h)));
        self
    }

    pub fn method(&mut self, method: Method, handlers: impl Into<Handlers>) -> &mut Self {
        let handlers = self.checked(handlers.into(), method.as_str());
        trace!(method = %method, path = %self.path, "register");
        if !self.methods.contains(&method) {
            self.methods.push(method.clone());
        }
        self.stack.extend(handlers.into_iter().map(|h| (Some(method.clone()), h)));
        self
    }

    pub fn get(&mut self, handlers: impl Into<Handlers>) -> &mut Self {
        self.method(Method::GET, handlers)
    }

    pub fn post(&mut self, handlers: impl Into<Handlers>) -> &mut Self {
        self.method(Method::POST, handlers)
    }

    pub fn put(&mut self, handlers: impl Into<Handlers>) -> &mut Self {
        self.method(Method::PUT, handlers)
    }

    pub fn delete(&mut self, handlers: impl Into<Handlers>) -> &mut Self {
        self.method(Method::DELETE, handlers)
    }

    pub fn patch(&mut self, handlers: impl Into<Handlers>) -> &mut Self {
        self.method(Method::PATCH, handlers)
    }

    pub fn head(&mut self, handlers: impl Into<Handlers>) -> &mut Self {
        self.method(Method::HEAD, handlers)
    }

    pub fn options(&mut self, handlers: impl Into<Handlers>) -> &mut Self {
        self.method(Method::OPTIONS, handlers)
    }

    fn checked(&self, handlers: Handlers, method: &str) -> Handlers {
        if handlers.is_empty() {
            panic!("Route.{}() requires a callback function", method.to_ascii_lowercase());
        }
        handlers
    }

    /// Runs the entries answering the request's method, in order.
    pub(crate) async fn dispatch(&self, req: &mut Request, res: &mut Response) -> Next {
        if self.stack.is_empty() {
            return Next::Continue;
        }
        let method = self.effective(&req.method);
        req.route = Some(self.path.clone());

        let mut err: Option<Error> = None;
        for (tag, handler) in &self.stack {
            if tag.as_ref().is_some_and(|m| *m != method) {
                continue;
            }
            match handler.invoke(err.take(), req, res).await {
                Next::Continue => {}
                Next::SkipRoute => return Next::Continue,
                Next::AbortRouter => return Next::AbortRouter,
                Next::Fail(e) => err = Some(e),
                Next::End => return Next::End,
            }
        }
        Next::from_error(err)
    }
}
