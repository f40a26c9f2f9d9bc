//! # pathway
//!
//! An ordered middleware and routing engine for HTTP services, on hyper and
//! tokio.
//!
//! ## The model
//!
//! An [`App`] owns a [`Router`]: a stack of layers tried in registration
//! order. A layer is either middleware mounted under a path prefix or a
//! [`Route`] answering some methods on one path. Every handler returns a
//! [`Next`] telling the dispatcher what to do:
//!
//! - `Continue` runs the next matching layer,
//! - `SkipRoute` leaves the current route,
//! - `AbortRouter` leaves the current router,
//! - `Fail(err)` (or `Err(err)`) jumps to the next error handler,
//! - `End` means the handler answered the request.
//!
//! Routers and apps mount inside each other. While a mounted stack runs,
//! `req.url()` has the mount prefix trimmed and `req.base_url()` holds it.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use pathway::{error_handler, handler, App, Next, Router, Server, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), pathway::Error> {
//!     let mut users = Router::new();
//!     users
//!         .param("id", |_req, _res, id| Box::pin(async move {
//!             if id.chars().all(|c| c.is_ascii_digit()) {
//!                 Ok(Next::Continue)
//!             } else {
//!                 Err(pathway::Error::http(StatusCode::BAD_REQUEST, "bad id"))
//!             }
//!         }))
//!         .get("/:id", handler(|req, res| {
//!             let id = req.param("id").unwrap_or_default().to_owned();
//!             Box::pin(async move {
//!                 res.json(format!(r#"{{"id":{id}}}"#).into_bytes());
//!                 Ok(Next::End)
//!             })
//!         }));
//!
//!     let mut app = App::new();
//!     app.mount("/users", users).middleware(error_handler(|err, _req, res| {
//!         Box::pin(async move {
//!             res.status(err.status()).text(err.to_string());
//!             Ok(Next::End)
//!         })
//!     }));
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await
//! }
//! ```

mod application;
mod error;
mod handler;
mod layer;
mod pattern;
mod request;
mod response;
mod route;
mod router;
mod server;
mod settings;

pub mod middleware;

pub use application::App;
pub use error::Error;
pub use handler::{
    error_handler, handler, BoxFuture, ErrorMiddleware, Handler, Handlers, Middleware, Next,
    Outcome,
};
pub use request::Request;
pub use response::{ContentType, Response};
pub use route::Route;
pub use router::{Router, RouterOptions};
pub use server::Server;
pub use settings::{Query, QueryParser, Settings, TrustProxy, Value, ENV_VAR};

pub use http::{HeaderMap, Method, StatusCode};
