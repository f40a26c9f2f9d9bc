mod common;

use std::sync::{Arc, Mutex};

use common::{entries, log, mark};
use pathway::{
    handler, App, Error, Method, Next, Query, QueryParser, Request, Response, StatusCode,
    TrustProxy, Value,
};

async fn send(app: &App, req: Request) -> (Next, Request, Response) {
    let mut req = req;
    let mut res = Response::new();
    let next = app.handle(&mut req, &mut res).await;
    (next, req, res)
}

fn get(url: &str) -> Request {
    Request::new(Method::GET, url)
}

#[tokio::test]
async fn unmatched_requests_get_the_default_404() {
    let mut app = App::new();
    app.set("env", "test");
    let (_, _, res) = send(&app, get("/missing/page?x=1")).await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(res.body(), b"Cannot GET /missing/page");
}

#[tokio::test]
async fn head_404s_have_no_body() {
    let app = App::new();
    let (_, _, res) = send(&app, Request::new(Method::HEAD, "/missing")).await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert!(res.body().is_empty());
}

#[tokio::test]
async fn the_404_names_the_original_url_inside_mounts() {
    let mut api = App::new();
    api.get("/known", mark(&log(), "known", Next::End));
    let mut app = App::new();
    app.mount("/api", api);

    let (_, _, res) = send(&app, get("/api/unknown")).await;
    assert_eq!(res.body(), b"Cannot GET /api/unknown");
}

#[tokio::test]
async fn unhandled_errors_map_to_their_status() {
    let mut app = App::new();
    app.set("env", "test").get(
        "/teapot",
        handler(|_req, _res| {
            Box::pin(async move { Err(Error::http(StatusCode::IM_A_TEAPOT, "short and stout")) })
        }),
    );
    let (next, _, res) = send(&app, get("/teapot")).await;
    assert!(matches!(next, Next::Fail(_)));
    assert_eq!(res.status_code(), StatusCode::IM_A_TEAPOT);
    assert_eq!(res.body(), b"short and stout");
}

#[tokio::test]
async fn decode_errors_become_400s() {
    let mut app = App::new();
    app.set("env", "test").get("/user/:id", mark(&log(), "route", Next::End));
    let (_, _, res) = send(&app, get("/user/%E0%A4%A")).await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn queries_are_parsed_before_handlers_run() {
    let log = log();
    let seen = log.clone();
    let mut app = App::new();
    app.get(
        "/search",
        handler(move |req, _res| {
            let terms: Vec<_> = req.query().get_all("q").collect();
            seen.lock().unwrap().push(terms.join("+"));
            Box::pin(async move { Ok(Next::End) })
        }),
    );
    send(&app, get("/search?q=rust&q=http%20router")).await;
    assert_eq!(entries(&log), ["rust+http router"]);
}

#[tokio::test]
async fn query_parsing_can_be_disabled_or_replaced() {
    let mut app = App::new();
    app.set("query parser", false).get("/", mark(&log(), "x", Next::End));
    let (_, req, _) = send(&app, get("/?a=1")).await;
    assert!(req.query().is_empty());

    let mut app = App::new();
    app.query_parser(QueryParser::custom(|raw| {
        Query::from_iter([("raw".to_owned(), raw.to_owned())])
    }))
    .get("/", mark(&log(), "x", Next::End));
    let (_, req, _) = send(&app, get("/?a=1&b")).await;
    assert_eq!(req.query().get("raw"), Some("a=1&b"));
}

#[tokio::test]
async fn powered_by_header_follows_the_setting() {
    let mut app = App::new();
    app.get("/", mark(&log(), "x", Next::End));
    let (_, _, res) = send(&app, get("/")).await;
    assert_eq!(res.get("x-powered-by"), Some("Pathway"));

    app.disable("x-powered-by");
    let (_, _, res) = send(&app, get("/")).await;
    assert_eq!(res.get("x-powered-by"), None);
}

#[tokio::test]
async fn trust_proxy_drives_protocol_and_hostname() {
    let log = log();
    let seen = log.clone();
    let mut app = App::new();
    app.set("trust proxy", "loopback").get(
        "/",
        handler(move |req, _res| {
            let host = req.hostname().unwrap_or_default();
            seen.lock().unwrap().push(format!("{} {host}", req.protocol()));
            Box::pin(async move { Ok(Next::End) })
        }),
    );

    let forwarded = |peer: &str| {
        get("/")
            .with_header("host", "internal:8080")
            .with_header("x-forwarded-proto", "https")
            .with_header("x-forwarded-host", "example.com")
            .with_remote_addr(peer.parse().unwrap())
    };
    send(&app, forwarded("127.0.0.1:5000")).await;
    send(&app, forwarded("203.0.113.9:5000")).await;
    assert_eq!(entries(&log), ["https example.com", "http internal"]);
}

#[tokio::test]
async fn sub_apps_inherit_an_untouched_trust_proxy() {
    let log = log();
    let seen = log.clone();
    let mut child = App::new();
    child.get(
        "/",
        handler(move |req, _res| {
            seen.lock().unwrap().push(req.protocol());
            Box::pin(async move { Ok(Next::End) })
        }),
    );
    let child_settings = Arc::clone(child.settings());

    let mut app = App::new();
    app.enable("trust proxy").mount("/child", child);
    assert_eq!(child_settings.trust_proxy(), TrustProxy::All);

    send(&app, get("/child").with_header("x-forwarded-proto", "https")).await;
    assert_eq!(entries(&log), ["https"]);
}

#[test]
fn mount_hooks_and_paths() {
    let fired = Arc::new(Mutex::new(Vec::new()));

    let mut leaf = App::new();
    let leaf_settings = Arc::clone(leaf.settings());
    let hook = fired.clone();
    leaf.on_mount(move |parent| {
        hook.lock().unwrap().push(format!("leaf under {:?}", parent.mount_path()));
    });

    let mut mid = App::new();
    let mid_settings = Arc::clone(mid.settings());
    mid.mount("/leaf", leaf);

    let mut root = App::new();
    root.set("name", "root").mount("/mid", mid);

    assert_eq!(*fired.lock().unwrap(), [r#"leaf under "/""#]);
    assert_eq!(leaf_settings.path(), "/mid/leaf");
    assert_eq!(mid_settings.path(), "/mid");
    assert_eq!(leaf_settings.get("name"), Some(Value::from("root")));
    assert_eq!(root.path(), "");
}

#[test]
fn settings_round_trip() {
    let mut app = App::new();
    app.set("views", "templates").enable("etag").disable("x-powered-by");
    assert_eq!(app.setting("views"), Some(Value::from("templates")));
    assert!(app.enabled("etag"));
    assert!(app.disabled("x-powered-by"));
    assert_eq!(app.setting("subdomain offset"), Some(Value::Int(2)));
}
