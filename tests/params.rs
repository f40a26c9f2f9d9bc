mod common;

use std::sync::{Arc, Mutex};

use common::{entries, log, mark, run, Log};
use pathway::{error_handler, handler, Error, Handler, Method, Next, Router, StatusCode};

fn record_param(log: &Log, label: &'static str) -> Handler {
    let log = log.clone();
    handler(move |req, _res| {
        log.lock()
            .unwrap()
            .push(format!("{label}:{}", req.param("id").unwrap_or("-")));
        Box::pin(async move { Ok(Next::Continue) })
    })
}

/// An interceptor that logs each call and returns `next`.
fn counting(router: &mut Router, log: &Log, next: Next) {
    let log = log.clone();
    router.param("id", move |_req, _res, id| {
        log.lock().unwrap().push(format!("param {id}"));
        let next = next.clone();
        Box::pin(async move { Ok(next) })
    });
}

#[tokio::test]
async fn interceptors_run_once_per_value_per_request() {
    let log = log();
    let mut router = Router::new();
    counting(&mut router, &log, Next::Continue);
    router
        .get("/user/:id", record_param(&log, "first"))
        .get("/user/:id", record_param(&log, "second"));

    run(&router, Method::GET, "/user/42").await;
    assert_eq!(entries(&log), ["param 42", "first:42", "second:42"]);

    // A new request gets a fresh registry.
    log.lock().unwrap().clear();
    run(&router, Method::GET, "/user/42").await;
    assert_eq!(entries(&log), ["param 42", "first:42", "second:42"]);
}

#[tokio::test]
async fn interceptors_rerun_for_a_different_value() {
    let log = log();
    let mut router = Router::new();
    counting(&mut router, &log, Next::Continue);
    router
        .mount("/user/:id", record_param(&log, "mw"))
        .middleware(handler(|req, _res| {
            req.set_url("/user/7");
            Box::pin(async move { Ok(Next::Continue) })
        }))
        .get("/user/:id", record_param(&log, "route"));

    run(&router, Method::GET, "/user/1").await;
    assert_eq!(entries(&log), ["param 1", "mw:1", "param 7", "route:7"]);
}

#[tokio::test]
async fn transformed_values_are_reused() {
    let log = log();
    let calls = Arc::new(Mutex::new(0));
    let counter = calls.clone();
    let mut router = Router::new();
    router
        .param("id", move |req, _res, id| {
            *counter.lock().unwrap() += 1;
            req.set_param("id", format!("user-{id}"));
            Box::pin(async move { Ok(Next::Continue) })
        })
        .get("/user/:id", record_param(&log, "a"))
        .get("/user/:id", record_param(&log, "b"));

    run(&router, Method::GET, "/user/42").await;
    assert_eq!(entries(&log), ["a:user-42", "b:user-42"]);
    assert_eq!(*calls.lock().unwrap(), 1);
}

#[tokio::test]
async fn interceptors_run_in_registration_order() {
    let log = log();
    let mut router = Router::new();
    for label in ["one", "two"] {
        let log = log.clone();
        router.param("id", move |_req, _res, _id| {
            log.lock().unwrap().push(label.to_owned());
            Box::pin(async move { Ok(Next::Continue) })
        });
    }
    router.get("/user/:id", mark(&log, "route", Next::End));

    run(&router, Method::GET, "/user/1").await;
    assert_eq!(entries(&log), ["one", "two", "route"]);
}

#[tokio::test]
async fn interceptor_failures_skip_the_layer_and_resurface() {
    let log = log();
    let seen = log.clone();
    let mut router = Router::new();
    counting(&mut router, &log, Next::fail(Error::http(StatusCode::NOT_FOUND, "no such user")));
    router
        .get("/user/:id", record_param(&log, "route"))
        .middleware(error_handler(move |err, req, _res| {
            seen.lock().unwrap().push(format!("error {err}"));
            req.set_url("/user/other");
            Box::pin(async move { Ok(Next::Continue) })
        }))
        .mount("/user/:id", record_param(&log, "after"));

    let (next, ..) = run(&router, Method::GET, "/user/1").await;
    // The stored failure re-surfaces for the new value without re-running
    // the interceptor.
    assert!(matches!(next, Next::Fail(e) if e.status() == StatusCode::NOT_FOUND));
    assert_eq!(entries(&log), ["param 1", "error no such user"]);
}

#[tokio::test]
async fn interceptor_skip_route_only_repeats_for_the_same_value() {
    let log = log();
    let mut router = Router::new();
    counting(&mut router, &log, Next::SkipRoute);
    router
        .get("/user/:id", record_param(&log, "first"))
        .get("/user/:id", record_param(&log, "second"))
        .middleware(handler(|req, _res| {
            req.set_url("/user/2");
            Box::pin(async move { Ok(Next::Continue) })
        }))
        .get("/user/:id", record_param(&log, "third"));

    let (next, ..) = run(&router, Method::GET, "/user/1").await;
    assert!(matches!(next, Next::Continue));
    assert_eq!(entries(&log), ["param 1", "param 2"]);
}

#[tokio::test]
async fn interceptors_can_end_the_request() {
    let log = log();
    let mut router = Router::new();
    router
        .param("id", |_req, res, _id| {
            Box::pin(async move {
                res.send_status(StatusCode::FORBIDDEN);
                Ok(Next::End)
            })
        })
        .get("/user/:id", mark(&log, "route", Next::End));

    let (next, _, res) = run(&router, Method::GET, "/user/1").await;
    assert!(matches!(next, Next::End));
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
    assert!(entries(&log).is_empty());
}

#[tokio::test]
async fn leading_colons_are_stripped() {
    let log = log();
    let mut router = Router::new();
    let seen = log.clone();
    router
        .param(":id", move |_req, _res, id| {
            seen.lock().unwrap().push(format!("param {id}"));
            Box::pin(async move { Ok(Next::Continue) })
        })
        .get("/user/:id", mark(&log, "route", Next::End));

    run(&router, Method::GET, "/user/5").await;
    assert_eq!(entries(&log), ["param 5", "route"]);
}

#[tokio::test]
async fn interceptors_without_bound_values_do_not_run() {
    let log = log();
    let mut router = Router::new();
    counting(&mut router, &log, Next::Continue);
    router.get("/user/:id?", mark(&log, "route", Next::End));

    run(&router, Method::GET, "/user").await;
    assert_eq!(entries(&log), ["route"]);
}
