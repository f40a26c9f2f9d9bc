use std::sync::Arc;

use crate::handler::{handler, Handler, Next};
use crate::settings::Settings;

const POWERED_BY: &str = "Pathway";

/// Binds `settings` to every request passing through, so handlers and the
/// proxy-aware accessors see the settings of the app they run in.
pub(crate) fn init(settings: Arc<Settings>) -> Handler {
    handler(move |req, res| {
        req.settings = Arc::clone(&settings);
        let powered_by = settings.enabled("x-powered-by");
        Box::pin(async move {
            if powered_by {
                res.set("X-Powered-By", POWERED_BY)?;
            }
            Ok(Next::Continue)
        })
    })
    .named("init")
}
