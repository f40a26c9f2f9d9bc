use crate::handler::{handler, Handler, Next};

/// Parses `req.url`'s query string with the request's `query parser`
/// setting. A query parsed by an outer app is left alone.
pub fn query() -> Handler {
    handler(|req, _res| {
        if req.query.is_none() {
            let raw = raw_query(&req.url);
            req.query = Some(req.settings.query_parser().parse(raw));
        }
        Box::pin(async move { Ok(Next::Continue) })
    })
    .named("query")
}

fn raw_query(url: &str) -> &str {
    let Some(start) = url.find('?') else {
        return "";
    };
    let rest = &url[start + 1..];
    rest.find('#').map_or(rest, |end| &rest[..end])
}
