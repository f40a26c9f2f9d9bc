//! The ordered middleware and routing stack.
//!
//! A [`Router`] is a list of layers tried in registration order. Each layer is
//! either mounted middleware (matched as a path *prefix*, which is trimmed
//! from `req.url` while it runs) or a [`Route`] (matched against the whole
//! remaining path, then dispatched by method).
//!
//! ```text
//! GET /api/users/7
//!   layer 0  mount "/"            logger          → Continue
//!   layer 1  mount "/api"         api router      url "/users/7", base "/api"
//!              layer 0  route "/users/:id"  GET   → End
//! ```
//!
//! Dispatch is an explicit loop. Only mounting a router or an app inside
//! another one recurses.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use tracing::{debug, trace, warn};

use crate::handler::{guard, BoxFuture, FnParam, Handlers, Next, Outcome, ParamCallback};
use crate::layer::{Endpoint, Layer};
use crate::pattern::PatternOptions;
use crate::request::{pathname, proto_host, Request};
use crate::response::Response;
use crate::route::Route;

/// Matching flags shared by every pattern a router compiles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RouterOptions {
    pub(crate) case_sensitive: bool,
    pub(crate) strict: bool,
}

impl RouterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// `/Users` and `/users` are different paths.
    pub fn case_sensitive(mut self, on: bool) -> Self {
        self.case_sensitive = on;
        self
    }

    /// `/users/` and `/users` are different paths.
    pub fn strict(mut self, on: bool) -> Self {
        self.strict = on;
        self
    }
}

/// Interceptor bookkeeping for one parameter name within one request.
struct ParamCall {
    matched: String,
    value: String,
    signal: Option<Next>,
}

/// The routing stack.
///
/// Build it once at startup, then share it. Registration methods take
/// `&mut self` and return it so calls chain.
///
/// ```rust
/// use pathway::{handler, Next, Router};
///
/// let mut api = Router::new();
/// api.get("/items", handler(|_req, res| Box::pin(async move {
///     res.json(b"[]".to_vec());
///     Ok(Next::End)
/// })));
///
/// let mut root = Router::new();
/// root.mount("/api", api);
/// ```
#[derive(Default)]
pub struct Router {
    stack: Vec<Layer>,
    params: HashMap<String, Vec<Arc<dyn ParamCallback>>>,
    options: RouterOptions,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: RouterOptions) -> Self {
        Self { options, ..Self::default() }
    }

    pub fn options(&self) -> RouterOptions {
        self.options
    }

    /// Mounts middleware, routers or apps under `path`. They match any request
    /// path that starts with `path` at a segment boundary.
    ///
    /// # Panics
    ///
    /// If `handlers` is empty or `path` is not a valid template.
    pub fn mount(&mut self, path: &str, handlers: impl Into<Handlers>) -> &mut Self {
        let handlers = handlers.into();
        if handlers.is_empty() {
            panic!("Router::mount() requires a middleware function");
        }
        let options = PatternOptions { case_sensitive: self.options.case_sensitive, strict: false, end: false };
        for handler in handlers {
            debug!(path, handler = handler.name(), "use");
            let layer = Layer::new(path, options, handler)
                .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
            self.stack.push(layer);
        }
        self
    }

    /// Mounts at `/`.
    pub fn middleware(&mut self, handlers: impl Into<Handlers>) -> &mut Self {
        self.mount("/", handlers)
    }

    /// Adds a route for `path` and returns it for method registration.
    pub fn route(&mut self, path: &str) -> &mut Route {
        let options = PatternOptions {
            case_sensitive: self.options.case_sensitive,
            strict: self.options.strict,
            end: true,
        };
        let layer = Layer::route(Route::new(path), options)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self.stack.push(layer);
        match self.stack.last_mut().and_then(Layer::as_route_mut) {
            Some(route) => route,
            None => unreachable!("route layer was just pushed"),
        }
    }

    pub fn method(&mut self, method: Method, path: &str, handlers: impl Into<Handlers>) -> &mut Self {
        self.route(path).method(method, handlers);
        self
    }

    pub fn get(&mut self, path: &str, handlers: impl Into<Handlers>) -> &mut Self {
        self.method(Method::GET, path, handlers)
    }

    pub fn post(&mut self, path: &str, handlers: impl Into<Handlers>) -> &mut Self {
        self.method(Method::POST, path, handlers)
    }

    pub fn put(&mut self, path: &str, handlers: impl Into<Handlers>) -> &mut Self {
        self.method(Method::PUT, path, handlers)
    }

    pub fn delete(&mut self, path: &str, handlers: impl Into<Handlers>) -> &mut Self {
        self.method(Method::DELETE, path, handlers)
    }

    pub fn patch(&mut self, path: &str, handlers: impl Into<Handlers>) -> &mut Self {
        self.method(Method::PATCH, path, handlers)
    }

    /// Handlers for every method on `path`.
    pub fn all(&mut self, path: &str, handlers: impl Into<Handlers>) -> &mut Self {
        self.route(path).all(handlers);
        self
    }

    /// Registers an interceptor for the parameter `name`.
    ///
    /// Interceptors run before any handler of a layer that binds `name`, at
    /// most once per distinct value per request. They may rewrite the value
    /// with [`Request::set_param`]; later layers binding the same value see
    /// the rewritten one.
    ///
    /// # Panics
    ///
    /// If `name` is empty.
    pub fn param<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Request, &'a mut Response, String) -> BoxFuture<'a, Outcome>
            + Send
            + Sync
            + 'static,
    {
        let name = match name.strip_prefix(':') {
            Some(stripped) => {
                warn!(param = name, "leading `:` in param name is deprecated, use `{stripped}`");
                stripped
            }
            None => name,
        };
        if name.is_empty() {
            panic!("param() requires a parameter name");
        }
        self.params.entry(name.to_owned()).or_default().push(Arc::new(FnParam(f)));
        self
    }

    /// Dispatches one request through the stack.
    ///
    /// Returns [`Next::End`] when a handler ended the exchange, `Continue` when
    /// the stack ran out, or `Fail` with the unhandled error. `req.base_url`
    /// and `req.params` are restored before returning.
    pub fn handle<'a>(&'a self, req: &'a mut Request, res: &'a mut Response) -> BoxFuture<'a, Next> {
        Box::pin(self.dispatch(req, res))
    }

    async fn dispatch(&self, req: &mut Request, res: &mut Response) -> Next {
        trace!(method = %req.method, url = %req.url, "dispatching");

        let proto_host = proto_host(&req.url).to_owned();
        let parent_url = req.base_url.clone();
        let parent_params = req.params.clone();

        let mut idx = 0;
        let mut removed = String::new();
        let mut slash_added = false;
        let mut called: HashMap<String, ParamCall> = HashMap::new();
        let mut allowed: Vec<Method> = Vec::new();
        let mut signal = Next::Continue;

        let outcome = loop {
            // Handlers may have replaced the URL since it was trimmed.
            if slash_added {
                if req.url.starts_with('/') {
                    req.url.remove(0);
                }
                slash_added = false;
            }
            if !removed.is_empty() {
                req.base_url.clone_from(&parent_url);
                req.url = match req.url.strip_prefix(proto_host.as_str()) {
                    Some(rest) => format!("{proto_host}{removed}{rest}"),
                    None => format!("{removed}{}", req.url),
                };
                removed.clear();
            }

            let mut err = match std::mem::replace(&mut signal, Next::Continue) {
                Next::Continue | Next::SkipRoute => None,
                Next::Fail(e) => Some(e),
                Next::AbortRouter => break Next::Continue,
                Next::End => break Next::End,
            };

            if idx >= self.stack.len() {
                break Next::from_error(err);
            }

            let path = pathname(&req.url).to_owned();
            let mut found = None;
            while idx < self.stack.len() {
                let layer = &self.stack[idx];
                idx += 1;
                let matched = match layer.matches(&path) {
                    Ok(Some(m)) => m,
                    Ok(None) => continue,
                    Err(e) => {
                        err.get_or_insert(e);
                        continue;
                    }
                };
                if let Some(route) = layer.as_route() {
                    if err.is_some() {
                        continue;
                    }
                    let has_method = route.handles_method(&req.method);
                    if !has_method && req.method == Method::OPTIONS {
                        for m in route.methods() {
                            if !allowed.contains(m) {
                                allowed.push(m.clone());
                            }
                        }
                    }
                    if !has_method && req.method != Method::HEAD {
                        continue;
                    }
                }
                found = Some((layer, matched));
                break;
            }

            let Some((layer, matched)) = found else {
                break Next::from_error(err);
            };

            if let Some(route) = layer.as_route() {
                req.route = Some(route.path().to_owned());
            }
            req.params = matched.params;

            match self.process_params(layer, &mut called, req, res).await {
                Next::Continue => {}
                Next::End => break Next::End,
                interrupted => {
                    signal = err.map_or(interrupted, Next::Fail);
                    continue;
                }
            }

            let handler = match layer.endpoint() {
                Endpoint::Route(route) => {
                    signal = route.dispatch(req, res).await;
                    continue;
                }
                Endpoint::Handler(handler) => handler,
            };

            let prefix = matched.path;
            if !prefix.is_empty() {
                if path.get(..prefix.len()) != Some(prefix.as_str()) {
                    signal = Next::from_error(err);
                    continue;
                }
                if let Some(c) = path[prefix.len()..].chars().next() {
                    if c != '/' && c != '.' {
                        signal = Next::from_error(err);
                        continue;
                    }
                }

                trace!(prefix = %prefix, layer = layer.name(), "trim prefix");
                let rest = req.url.split_off(proto_host.len() + prefix.len());
                req.url = format!("{proto_host}{rest}");
                if proto_host.is_empty() && !req.url.starts_with('/') {
                    req.url.insert(0, '/');
                    slash_added = true;
                }
                let trimmed = prefix.strip_suffix('/').unwrap_or(&prefix);
                req.base_url = format!("{parent_url}{trimmed}");
                removed = prefix;
            }

            trace!(layer = layer.name(), error = err.is_some(), "invoke");
            signal = handler.invoke(err, req, res).await;
        };

        let outcome = match outcome {
            Next::Continue if req.method == Method::OPTIONS && !allowed.is_empty() => {
                send_options(res, &allowed)
            }
            other => other,
        };

        req.base_url = parent_url;
        req.params = parent_params;
        outcome
    }

    /// Runs the interceptors for every key `layer` binds. `Continue` means the
    /// layer may run; anything else is handed back to the dispatch loop.
    async fn process_params(
        &self,
        layer: &Layer,
        called: &mut HashMap<String, ParamCall>,
        req: &mut Request,
        res: &mut Response,
    ) -> Next {
        if self.params.is_empty() {
            return Next::Continue;
        }
        for key in layer.keys() {
            let name = key.name();
            let Some(value) = req.params.get(name).cloned() else {
                continue;
            };
            let Some(callbacks) = self.params.get(name) else {
                continue;
            };

            if let Some(prev) = called.get(name) {
                let failed = prev.signal.as_ref().is_some_and(|s| !matches!(s, Next::SkipRoute));
                if prev.matched == value || failed {
                    req.params.insert(name.to_owned(), prev.value.clone());
                    match &prev.signal {
                        Some(signal) => return signal.clone(),
                        None => continue,
                    }
                }
            }

            let mut call = ParamCall { matched: value.clone(), value: value.clone(), signal: None };
            for callback in callbacks {
                let next = guard(callback.call(req, res, value.clone())).await;
                if let Some(current) = req.params.get(name) {
                    call.value.clone_from(current);
                }
                if !matches!(next, Next::Continue) {
                    call.signal = Some(next.clone());
                    called.insert(name.to_owned(), call);
                    return next;
                }
            }
            called.insert(name.to_owned(), call);
        }
        Next::Continue
    }
}

/// Answers an OPTIONS request nothing handled with the methods the matched
/// routes support.
fn send_options(res: &mut Response, allowed: &[Method]) -> Next {
    let body = allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(",");
    if let Err(e) = res.set("Allow", &body) {
        return Next::Fail(e);
    }
    res.send(body);
    Next::End
}
