//! Built-in middleware.
//!
//! Every [`App`](crate::App) registers these two first, in this order:
//!
//! - `init`: binds the app's settings to the request and sets
//!   `X-Powered-By`.
//! - [`query`]: parses the query string into [`Request::query`](crate::Request::query)
//!   with the app's `query parser`.

mod init;
mod query;

pub(crate) use init::init;
pub use query::query;
