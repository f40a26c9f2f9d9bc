#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use pathway::{handler, Handler, Method, Next, Request, Response, Router};

pub type Log = Arc<Mutex<Vec<String>>>;

pub fn log() -> Log {
    Log::default()
}

pub fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// A handler that records `label` and returns `next`.
pub fn mark(log: &Log, label: &str, next: Next) -> Handler {
    let log = log.clone();
    let label = label.to_owned();
    handler(move |_req, _res| {
        log.lock().unwrap().push(label.clone());
        let next = next.clone();
        Box::pin(async move { Ok(next) })
    })
}

/// A handler that records `label` with the request's base URL and URL.
pub fn where_am_i(log: &Log, label: &str) -> Handler {
    let log = log.clone();
    let label = label.to_owned();
    handler(move |req, _res| {
        log.lock()
            .unwrap()
            .push(format!("{label} base={} url={}", req.base_url(), req.url()));
        Box::pin(async move { Ok(Next::Continue) })
    })
}

pub async fn run(router: &Router, method: Method, url: &str) -> (Next, Request, Response) {
    let mut req = Request::new(method, url);
    let mut res = Response::new();
    let next = router.handle(&mut req, &mut res).await;
    (next, req, res)
}
