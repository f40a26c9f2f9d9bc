//! Minimal pathway example: a users API mounted under `/api`, a parameter
//! interceptor, an error handler and health checks.
//!
//! Run with:
//!   cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/api/users/42
//!   curl http://localhost:3000/api/users/nope        → 400 from the interceptor
//!   curl -X POST http://localhost:3000/api/users -d '{"name":"alice"}'
//!   curl -X DELETE http://localhost:3000/api/users/42
//!   curl -X OPTIONS -i http://localhost:3000/api/users/42   → Allow: GET,DELETE
//!   curl http://localhost:3000/healthz

use pathway::{error_handler, handler, App, Handler, Next, Router, Server, StatusCode};

#[tokio::main]
async fn main() -> Result<(), pathway::Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let mut users = Router::new();
    users
        .param("id", |req, _res, id| {
            Box::pin(async move {
                let Ok(n) = id.parse::<u64>() else {
                    return Err(pathway::Error::http(StatusCode::BAD_REQUEST, format!("bad user id `{id}`")));
                };
                // "007" and "7" are the same user.
                req.set_param("id", n.to_string());
                Ok(Next::Continue)
            })
        })
        .get("/users/:id", get_user())
        .post("/users", create_user())
        .delete("/users/:id", delete_user());

    let mut app = App::new();
    app.get("/healthz", ok("alive"))
        .get("/readyz", ok("ready"))
        .mount("/api", users)
        .middleware(error_handler(|err, _req, res| {
            Box::pin(async move {
                res.status(err.status()).json(format!(r#"{{"error":"{err}"}}"#).into_bytes());
                Ok(Next::End)
            })
        }));

    Server::bind("0.0.0.0:3000").serve(app).await
}

// GET /users/:id
//
// Response::json takes Vec<u8>: pass bytes from your serialiser.
fn get_user() -> Handler {
    handler(|req, res| {
        let id = req.param("id").unwrap_or("unknown").to_owned();
        Box::pin(async move {
            res.json(format!(r#"{{"id":"{id}","name":"alice"}}"#).into_bytes());
            Ok(Next::End)
        })
    })
}

// POST /users
//
// req.body() is &[u8]; pathway does not touch the bytes.
fn create_user() -> Handler {
    handler(|req, res| {
        let empty = req.body().is_empty();
        Box::pin(async move {
            if empty {
                res.send_status(StatusCode::BAD_REQUEST);
                return Ok(Next::End);
            }
            res.status(StatusCode::CREATED)
                .set("location", "/api/users/99")?
                .json(br#"{"id":"99","name":"new_user"}"#.to_vec());
            Ok(Next::End)
        })
    })
}

// DELETE /users/:id → 204 No Content
fn delete_user() -> Handler {
    handler(|_req, res| {
        Box::pin(async move {
            res.status(StatusCode::NO_CONTENT).end();
            Ok(Next::End)
        })
    })
}

fn ok(body: &'static str) -> Handler {
    handler(move |_req, res| {
        Box::pin(async move {
            res.text(body);
            Ok(Next::End)
        })
    })
}
