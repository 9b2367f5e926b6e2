use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use serde_json::{Value, json};

use restline::middleware::Attributes;
use restline::{
    handler_fn, reply, App, Attrs, BoxFuture, Config, Content, ContentType, Context, EncodeError, Entity,
    EntityEncoder, Error, FieldViolation, Method, Outcome, Request, Response, ResponseWriter, Service, StatusCode,
};

fn service() -> Service {
    Service::new(&Config { name: "test".into(), ..Config::default() }).unwrap()
}

fn request(method: Method, uri: &str) -> http::Request<Bytes> {
    http::Request::builder().method(method).uri(uri).body(Bytes::new()).unwrap()
}

async fn send(app: &App, req: http::Request<Bytes>) -> (http::response::Parts, Bytes) {
    let (parts, body): (_, Full<Bytes>) = app.handle(req, None).await.into_parts();
    (parts, body.collect().await.unwrap().to_bytes())
}

fn json_body(body: &Bytes) -> Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn text_entity_round_trip() {
    let app = service()
        .route(Method::GET, "/hello", handler_fn(|_w, _req, _next| Box::pin(async {
            reply(Response::new(StatusCode::ACCEPTED, Entity::bytes(ContentType::Text, "hello")))
        })))
        .freeze();

    let (parts, body) = send(&app, request(Method::GET, "/hello")).await;
    assert_eq!(parts.status, StatusCode::ACCEPTED);
    assert_eq!(parts.headers["content-type"], "text/plain");
    assert_eq!(body, "hello");
}

#[tokio::test]
async fn unknown_path_is_a_json_404() {
    let app = service().freeze();
    let (parts, body) = send(&app, request(Method::GET, "/missing")).await;
    assert_eq!(parts.status, StatusCode::NOT_FOUND);
    assert_eq!(parts.headers["content-type"], "application/json");
    assert_eq!(json_body(&body), json!({"status": 404, "message": "not found"}));
}

#[tokio::test]
async fn html_is_sent_when_accepted() {
    let app = service().freeze();
    let req = http::Request::builder()
        .uri("/missing")
        .header("accept", "application/xhtml+xml, text/html")
        .body(Bytes::new())
        .unwrap();
    let (parts, body) = send(&app, req).await;
    let page = std::str::from_utf8(&body).unwrap();

    assert_eq!(parts.status, StatusCode::NOT_FOUND);
    assert_eq!(parts.headers["content-type"], "text/html");
    assert!(page.starts_with("<html><body><h1>404 Not Found</h1>"));
    assert!(page.contains("<p>not found</p>"));
    assert!(serde_json::from_slice::<Value>(&body).is_err());
}

#[tokio::test]
async fn every_response_has_a_request_id() {
    let app = service()
        .route(Method::GET, "/ok", handler_fn(|_w, _req, _next| Box::pin(async { reply(()) })))
        .freeze();

    for uri in ["/ok", "/missing"] {
        let (parts, _) = send(&app, request(Method::GET, uri)).await;
        let id = parts.headers["x-request-id"].to_str().unwrap();
        assert_eq!(uuid::Uuid::parse_str(id).unwrap().get_version_num(), 7);
    }
}

#[tokio::test]
async fn no_result_is_an_empty_200() {
    let app = service()
        .route(Method::GET, "/nothing", handler_fn(|_w, _req, _next| Box::pin(async { reply(()) })))
        .freeze();
    let (parts, body) = send(&app, request(Method::GET, "/nothing")).await;
    assert_eq!(parts.status, StatusCode::OK);
    assert!(parts.headers.get("content-type").is_none());
    assert!(body.is_empty());
}

#[tokio::test]
async fn bare_content_is_a_200() {
    let app = service()
        .route(Method::GET, "/n", handler_fn(|_w, _req, _next| Box::pin(async { reply(Content::json([1, 2, 3])) })))
        .freeze();
    let (parts, body) = send(&app, request(Method::GET, "/n")).await;
    assert_eq!(parts.status, StatusCode::OK);
    assert_eq!(body, "[1,2,3]");
}

struct Counting(Arc<AtomicUsize>);

impl EntityEncoder for Counting {
    fn encode<'a>(
        &'a self,
        w: &'a mut ResponseWriter,
        req: &'a Request,
        status: StatusCode,
        content: Content,
    ) -> BoxFuture<'a, Result<(), EncodeError>> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Box::pin(restline::encode(w, req, status, content))
    }
}

#[tokio::test]
async fn finalized_request_gets_no_second_response() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = service()
        .with_encoder(Arc::new(Counting(Arc::clone(&calls))))
        .route(Method::GET, "/raw", handler_fn(|w, req, _next| Box::pin(async move {
            req.finalize();
            w.write_status(StatusCode::PARTIAL_CONTENT);
            w.write(b"mine");
            // Ignored: the request is finalized.
            reply(Response::new(StatusCode::OK, Content::json("theirs")))
        })))
        .route(Method::GET, "/normal", handler_fn(|_w, _req, _next| Box::pin(async { reply(()) })))
        .freeze();

    let (parts, body) = send(&app, request(Method::GET, "/raw")).await;
    assert_eq!(parts.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(body, "mine");
    assert!(parts.headers.get("x-request-id").is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    send(&app, request(Method::GET, "/normal")).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn marshal_failure_is_a_500() {
    let app = service()
        .route(Method::POST, "/things", handler_fn(|_w, _req, _next| Box::pin(async {
            let mut bad = HashMap::new();
            bad.insert(vec![1], "keys must be strings");
            reply(Response::new(StatusCode::CREATED, Content::json(bad)))
        })))
        .freeze();

    let (parts, body) = send(&app, request(Method::POST, "/things")).await;
    assert_eq!(parts.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.is_empty());
}

#[tokio::test]
async fn wrong_method_lists_the_allowed_ones() {
    let noop = || handler_fn(|_w, _req, _next| Box::pin(async { reply(()) }));
    let app = service()
        .route(Method::PUT, "/users/{id}", noop())
        .route(Method::DELETE, "/users/{id}", noop())
        .freeze();

    let (parts, body) = send(&app, request(Method::GET, "/users/1")).await;
    assert_eq!(parts.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(parts.headers["allow"], "DELETE, PUT");
    assert_eq!(json_body(&body)["message"], "Method Not Allowed");
}

#[tokio::test]
async fn route_attributes_override_earlier_ones() {
    let echo = handler_fn(|_w, req, _next| {
        let attrs = req.attrs().cloned().unwrap_or_default();
        Box::pin(async move { reply(Content::json(attrs)) })
    });
    let service_attrs = Attrs::from([("shared".to_owned(), json!("service")), ("region".to_owned(), json!("eu"))]);
    let route_attrs = Attrs::from([("shared".to_owned(), json!("route")), ("scope".to_owned(), json!(["read"]))]);

    let app = service()
        .use_handler(Attributes(service_attrs))
        .mount(Context::new("/api").handle_with(Method::GET, "/attrs", echo, route_attrs))
        .freeze();

    let (_, body) = send(&app, request(Method::GET, "/api/attrs")).await;
    assert_eq!(json_body(&body), json!({"shared": "route", "region": "eu", "scope": ["read"]}));
}

#[tokio::test]
async fn plain_errors_become_500() {
    let app = service()
        .route(Method::GET, "/boom", handler_fn(|_w, _req, _next| Box::pin(async {
            Outcome::Err(std::io::Error::other("disk on fire").into())
        })))
        .freeze();

    let (parts, body) = send(&app, request(Method::GET, "/boom")).await;
    assert_eq!(parts.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(&body), json!({"status": 500, "message": "disk on fire"}));
}

#[tokio::test]
async fn structured_error_keeps_headers_and_detail() {
    let app = service()
        .route(Method::POST, "/users", handler_fn(|_w, _req, _next| Box::pin(async {
            let err = Error::msg(StatusCode::UNPROCESSABLE_ENTITY, "invalid user")
                .with_header("x-hint", "see detail")
                .with_detail(vec![FieldViolation::new("email", "is required")]);
            Outcome::Err(err.into())
        })))
        .freeze();

    let (parts, body) = send(&app, request(Method::POST, "/users")).await;
    assert_eq!(parts.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(parts.headers["x-hint"], "see detail");
    assert_eq!(
        json_body(&body),
        json!({
            "status": 422,
            "message": "invalid user",
            "detail": [{"field": "email", "message": "is required"}],
        }),
    );
}

#[tokio::test]
async fn context_middleware_can_short_circuit() {
    let deny = handler_fn(|w, req, next| Box::pin(async move {
        if req.header("authorization").is_none() {
            return Outcome::Err(Error::from_status(StatusCode::UNAUTHORIZED).into());
        }
        next.next(w, req).await
    }));
    let secret = handler_fn(|_w, _req, _next| Box::pin(async { reply(Content::json("secret")) }));
    let app = service()
        .mount(Context::new("/admin").use_handler(deny).handle(Method::GET, "/", secret))
        .freeze();

    let (parts, body) = send(&app, request(Method::GET, "/admin")).await;
    assert_eq!(parts.status, StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(&body), json!({"status": 401, "message": "Unauthorized"}));

    let req = http::Request::builder()
        .uri("/admin")
        .header("authorization", "Bearer t")
        .body(Bytes::new())
        .unwrap();
    let (parts, body) = send(&app, req).await;
    assert_eq!(parts.status, StatusCode::OK);
    assert_eq!(body, r#""secret""#);
}

#[tokio::test]
async fn params_and_user_agent() {
    let config = Config { user_agent: Some("restline-test/1".into()), ..Config::default() };
    let app = Service::new(&config)
        .unwrap()
        .route(Method::GET, "/users/{id}", handler_fn(|_w, req, _next| {
            let id = req.param("id").unwrap_or_default().to_owned();
            Box::pin(async move { reply(Content::json(json!({ "id": id }))) })
        }))
        .freeze();

    let (parts, body) = send(&app, request(Method::GET, "/users/42")).await;
    assert_eq!(parts.headers["user-agent"], "restline-test/1");
    assert_eq!(json_body(&body), json!({"id": "42"}));
}

#[tokio::test]
async fn redirect_has_location_and_no_body() {
    let app = service()
        .route(Method::GET, "/old", handler_fn(|_w, _req, _next| Box::pin(async { reply(Response::redirect("/new")) })))
        .freeze();

    let (parts, body) = send(&app, request(Method::GET, "/old")).await;
    assert_eq!(parts.status, StatusCode::FOUND);
    assert_eq!(parts.headers["location"], "/new");
    assert!(body.is_empty());
}

#[tokio::test]
async fn traced_requests_still_dispatch() {
    let config = Config {
        trace_patterns: vec!["^/traced".into()],
        debug: true,
        ..Config::default()
    };
    let app = Service::new(&config)
        .unwrap()
        .route(Method::POST, "/traced", handler_fn(|_w, req, _next| {
            let echoed = req.body().to_vec();
            Box::pin(async move { reply(Entity::bytes(ContentType::OctetStream, echoed)) })
        }))
        .freeze();

    let req = http::Request::builder()
        .method(Method::POST)
        .uri("/traced?x=1")
        .header("authorization", "Bearer secret")
        .body(Bytes::from_static(b"payload"))
        .unwrap();
    let (parts, body) = send(&app, req).await;
    assert_eq!(parts.status, StatusCode::OK);
    assert_eq!(body, "payload");
}

#[tokio::test]
async fn invalid_entity_content_type_is_a_500() {
    let app = service()
        .route(Method::GET, "/status", handler_fn(|_w, _req, _next| Box::pin(async {
            reply(Response::new(StatusCode::SERVICE_UNAVAILABLE, Entity::bytes("text/plain\n", "down")))
        })))
        .freeze();

    let (parts, body) = send(&app, request(Method::GET, "/status")).await;
    assert_eq!(parts.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(parts.headers.get("content-type").is_none());
    assert!(parts.headers.contains_key("x-request-id"));
    assert!(body.is_empty());
}
