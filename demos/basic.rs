//! Minimal restline example: JSON endpoints, a validation error, an HTML
//! page and a handler that writes its own response.
//!
//! Run with:
//!   cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl http://localhost:3000/users/0
//!   curl -H 'accept: text/html' http://localhost:3000/users/0
//!   curl -X POST http://localhost:3000/users -d '{"name":""}'
//!   curl http://localhost:3000/stream
//!   curl -X DELETE http://localhost:3000/users/42

use serde::Deserialize;

use restline::middleware::{Attributes, Tracing};
use restline::{
    handler_fn, reply, Attrs, BoxFuture, Config, Content, ContentType, Context, Entity, Error,
    FieldViolation, Method, Outcome, Pipeline, Request, Response, ResponseWriter, Server, Service,
    StatusCode, Trace,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config {
        name: "users".into(),
        endpoint: "0.0.0.0:3000".into(),
        trace_patterns: vec!["^/users".into()],
        debug: true,
        ..Config::default()
    };

    let users = Context::new("/users")
        .use_handler(Tracing)
        .handle(Method::GET, "/{id}", handler_fn(get_user))
        .handle(Method::POST, "", handler_fn(create_user))
        .handle_with(
            Method::DELETE,
            "/{id}",
            handler_fn(delete_user),
            Attrs::from([("audit".to_owned(), serde_json::Value::from(true))]),
        );

    let app = Service::new(&config)
        .expect("invalid config")
        .use_handler(Attributes(Attrs::from([("region".to_owned(), "eu-west".into())])))
        .mount(users)
        .route(Method::GET, "/stream", handler_fn(stream))
        .route(Method::GET, "/robots.txt", handler_fn(robots));

    Server::from_config(&config)
        .expect("invalid endpoint")
        .serve(app)
        .await
        .expect("server error");
}

// GET /users/{id}
fn get_user<'a>(_w: &'a mut ResponseWriter, req: &'a mut Request, _next: Pipeline) -> BoxFuture<'a, Outcome> {
    Box::pin(async move {
        let id = req.param("id").unwrap_or_default().to_owned();
        req.trace(Trace::message(format!("loading user {id}")));
        if id == "0" {
            return Err(Error::msg(StatusCode::NOT_FOUND, format!("no user with id {id}")).into());
        }
        reply(Content::json(serde_json::json!({ "id": id, "name": "alice" })))
    })
}

#[derive(Deserialize)]
struct NewUser {
    name: String,
}

// POST /users
fn create_user<'a>(_w: &'a mut ResponseWriter, req: &'a mut Request, _next: Pipeline) -> BoxFuture<'a, Outcome> {
    Box::pin(async move {
        let user: NewUser = req.json()?;
        if user.name.is_empty() {
            let err = Error::msg(StatusCode::UNPROCESSABLE_ENTITY, "invalid user")
                .with_detail(vec![FieldViolation::new("name", "must not be empty")]);
            return Err(err.into());
        }
        reply(
            Response::new(StatusCode::CREATED, Content::json(serde_json::json!({ "id": "99", "name": user.name })))
                .header("location", "/users/99"),
        )
    })
}

// DELETE /users/{id} → 204 No Content
fn delete_user<'a>(_w: &'a mut ResponseWriter, req: &'a mut Request, _next: Pipeline) -> BoxFuture<'a, Outcome> {
    Box::pin(async move {
        let audited = req.attr("audit").is_some();
        req.trace(Trace::message(format!("delete (audited: {audited})")));
        reply(StatusCode::NO_CONTENT)
    })
}

// GET /stream: writes the response itself.
fn stream<'a>(w: &'a mut ResponseWriter, req: &'a mut Request, _next: Pipeline) -> BoxFuture<'a, Outcome> {
    Box::pin(async move {
        req.finalize();
        w.set_header("content-type", ContentType::Text.as_str())?;
        w.write_status(StatusCode::OK);
        for n in 1..=3 {
            w.write(format!("chunk {n}\n").as_bytes());
        }
        reply(())
    })
}

// GET /robots.txt
fn robots<'a>(_w: &'a mut ResponseWriter, _req: &'a mut Request, _next: Pipeline) -> BoxFuture<'a, Outcome> {
    Box::pin(async { reply(Entity::bytes(ContentType::Text, "User-agent: *\nDisallow:\n")) })
}
