//! The application: a router, its settings, and the mount lifecycle.

use std::sync::Arc;

use http::{Method, StatusCode};
use tracing::{debug, error};

use crate::error::Error;
use crate::handler::{BoxFuture, Handlers, Kind, Next, Outcome};
use crate::middleware;
use crate::request::{pathname, Request};
use crate::response::Response;
use crate::route::Route;
use crate::router::{Router, RouterOptions};
use crate::settings::{QueryParser, Settings, Value};

type MountHook = Box<dyn Fn(&App) + Send + Sync>;

/// A top-level application, or a sub-application mounted inside another.
///
/// ```rust
/// use pathway::{handler, App, Next};
///
/// let mut blog = App::new();
/// blog.get("/", handler(|req, res| {
///     let base = req.base_url().to_owned();
///     Box::pin(async move {
///         res.text(format!("blog at {base}"));
///         Ok(Next::End)
///     })
/// }));
///
/// let mut app = App::new();
/// app.set("title", "main").mount("/blog", blog);
/// ```
pub struct App {
    router: Router,
    settings: Arc<Settings>,
    mount_hooks: Vec<MountHook>,
}

impl App {
    pub fn new() -> Self {
        Self::with_options(RouterOptions::default())
    }

    /// An app whose router uses `options`. They are also recorded as the
    /// `case sensitive routing` and `strict routing` settings.
    pub fn with_options(options: RouterOptions) -> Self {
        let settings = Arc::new(Settings::new());
        settings.set("case sensitive routing", options.case_sensitive);
        settings.set("strict routing", options.strict);
        debug!(env = %settings.env(), "booting in {} mode", settings.env());

        let mut router = Router::with_options(options);
        router.middleware(middleware::init(Arc::clone(&settings)));
        router.middleware(middleware::query());

        Self { router, settings, mount_hooks: Vec::new() }
    }

    // ── Settings ──────────────────────────────────────────────────────────────

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.settings.set(name, value);
        self
    }

    /// Reads a setting, falling back to the parent app's when mounted.
    pub fn setting(&self, name: &str) -> Option<Value> {
        self.settings.get(name)
    }

    pub fn enable(&mut self, name: &str) -> &mut Self {
        self.set(name, true)
    }

    pub fn disable(&mut self, name: &str) -> &mut Self {
        self.set(name, false)
    }

    pub fn enabled(&self, name: &str) -> bool {
        self.settings.enabled(name)
    }

    pub fn disabled(&self, name: &str) -> bool {
        self.settings.disabled(name)
    }

    pub fn query_parser(&mut self, parser: QueryParser) -> &mut Self {
        self.settings.set_query_parser(parser);
        self
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// The full path this app is reachable under, `""` when not mounted.
    pub fn path(&self) -> String {
        self.settings.path()
    }

    /// The prefix this app was mounted under, `"/"` when not mounted.
    pub fn mount_path(&self) -> &str {
        self.settings.mount_path()
    }

    // ── Registration ──────────────────────────────────────────────────────────

    /// Mounts middleware, routers or apps under `path`.
    ///
    /// A mounted app is linked to this one: settings it does not hold resolve
    /// here, its `on_mount` hooks fire with `self` once registered, and an
    /// untouched `trust proxy` defers to this app's.
    ///
    /// # Panics
    ///
    /// If `handlers` is empty.
    pub fn mount(&mut self, path: &str, handlers: impl Into<Handlers>) -> &mut Self {
        let mut handlers = handlers.into();
        if handlers.is_empty() {
            panic!("App::mount() requires a middleware function");
        }

        let mut hooks = Vec::new();
        for handler in &mut handlers.0 {
            if let Kind::App(app) = &mut handler.kind {
                debug!(path, "mounting sub app");
                app.settings.attach(Arc::clone(&self.settings), path);
                hooks.append(&mut app.mount_hooks);
            }
        }

        self.router.mount(path, handlers);
        for hook in hooks {
            hook(&*self);
        }
        self
    }

    /// Mounts at `/`.
    pub fn middleware(&mut self, handlers: impl Into<Handlers>) -> &mut Self {
        self.mount("/", handlers)
    }

    /// Runs `hook` with the parent app once this app is mounted.
    pub fn on_mount(&mut self, hook: impl Fn(&App) + Send + Sync + 'static) -> &mut Self {
        self.mount_hooks.push(Box::new(hook));
        self
    }

    pub fn route(&mut self, path: &str) -> &mut Route {
        self.router.route(path)
    }

    pub fn get(&mut self, path: &str, handlers: impl Into<Handlers>) -> &mut Self {
        self.router.get(path, handlers);
        self
    }

    pub fn post(&mut self, path: &str, handlers: impl Into<Handlers>) -> &mut Self {
        self.router.post(path, handlers);
        self
    }

    pub fn put(&mut self, path: &str, handlers: impl Into<Handlers>) -> &mut Self {
        self.router.put(path, handlers);
        self
    }

    pub fn delete(&mut self, path: &str, handlers: impl Into<Handlers>) -> &mut Self {
        self.router.delete(path, handlers);
        self
    }

    pub fn patch(&mut self, path: &str, handlers: impl Into<Handlers>) -> &mut Self {
        self.router.patch(path, handlers);
        self
    }

    pub fn all(&mut self, path: &str, handlers: impl Into<Handlers>) -> &mut Self {
        self.router.all(path, handlers);
        self
    }

    /// See [`Router::param`].
    pub fn param<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Request, &'a mut Response, String) -> BoxFuture<'a, Outcome>
            + Send
            + Sync
            + 'static,
    {
        self.router.param(name, f);
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    /// Dispatches a request and, unless a handler ended the exchange, writes
    /// the default response: `404 Cannot {METHOD} {path}` or the unhandled
    /// error. Returns the router's outcome.
    pub async fn handle(&self, req: &mut Request, res: &mut Response) -> Next {
        let outcome = self.router.handle(req, res).await;
        match &outcome {
            Next::End => {}
            Next::Fail(err) => self.respond_error(err, req, res),
            _ => not_found(req, res),
        }
        outcome
    }

    /// Dispatch as a mounted sub-app. The parent's settings are bound to the
    /// request again on the way out.
    pub(crate) async fn handle_mounted(&self, req: &mut Request, res: &mut Response) -> Next {
        let parent = Arc::clone(&req.settings);
        let outcome = self.router.handle(req, res).await;
        req.settings = parent;
        outcome
    }

    fn respond_error(&self, err: &Error, req: &Request, res: &mut Response) {
        let env = self.settings.env();
        if env != "test" {
            error!(method = %req.method, url = %req.original_url, error = %err, "unhandled error");
        }
        if res.is_finished() {
            return;
        }

        let mut status = err.status();
        if !status.is_client_error() && !status.is_server_error() {
            status = StatusCode::INTERNAL_SERVER_ERROR;
        }
        res.status(status);
        if env == "production" {
            res.text(status.canonical_reason().unwrap_or_default());
        } else {
            res.text(err.to_string());
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(req: &Request, res: &mut Response) {
    if res.is_finished() {
        return;
    }
    let path = pathname(&req.original_url);
    debug!(method = %req.method, path, "default 404");
    res.status(StatusCode::NOT_FOUND);
    if req.method == Method::HEAD {
        res.end();
    } else {
        res.text(format!("Cannot {} {}", req.method, path));
    }
}
