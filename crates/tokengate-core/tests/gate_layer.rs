//! Integration tests driving `GateLayer` end to end.

use std::convert::Infallible;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower::{service_fn, Layer, Service, ServiceExt};

use tokengate_core::{Gate, GateLayer, GateSettings};

fn bearer_layer(tokens: &[&str]) -> GateLayer {
    GateLayer::new(Gate::from_settings(GateSettings::bearer(tokens.iter().copied())).expect("gate"))
}

fn session_layer(tokens: &[&str]) -> GateLayer {
    GateLayer::new(Gate::from_settings(GateSettings::session(tokens.iter().copied())).expect("gate"))
}

fn app(layer: GateLayer) -> Router {
    Router::new()
        .route("/", get(|| async { "upstream" }))
        .route("/page", get(|| async { "page" }))
        .route("/echo", post(|body: String| async move { body }))
        .layer(layer)
}

async fn body_text(resp: Response) -> String {
    let body = axum::body::to_bytes(resp.into_body(), 64 * 1024)
        .await
        .expect("body");
    String::from_utf8(body.to_vec()).expect("utf8")
}

#[tokio::test]
async fn bearer_valid_token_forwards() {
    let req = Request::builder()
        .uri("/")
        .header(header::AUTHORIZATION, "Bearer secret1")
        .body(Body::empty())
        .expect("req");
    let resp = app(bearer_layer(&["secret1"])).oneshot(req).await.expect("resp");
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get(header::SET_COOKIE).is_none());
    assert_eq!(body_text(resp).await, "upstream");
}

#[tokio::test]
async fn bearer_missing_scheme_challenges() {
    let req = Request::builder()
        .uri("/")
        .header(header::AUTHORIZATION, "secret1")
        .body(Body::empty())
        .expect("req");
    let resp = app(bearer_layer(&["secret1"])).oneshot(req).await.expect("resp");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        resp.headers()[header::WWW_AUTHENTICATE],
        "Bearer realm=\"Restricted\""
    );
    assert_eq!(body_text(resp).await, "Unauthorized");
}

#[tokio::test]
async fn bearer_no_header_challenges() {
    let req = Request::builder().uri("/").body(Body::empty()).expect("req");
    let resp = app(bearer_layer(&["secret1"])).oneshot(req).await.expect("resp");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));
}

#[tokio::test]
async fn bearer_empty_store_rejects() {
    let req = Request::builder()
        .uri("/")
        .header(header::AUTHORIZATION, "Bearer ")
        .body(Body::empty())
        .expect("req");
    let resp = app(bearer_layer(&[])).oneshot(req).await.expect("resp");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn session_fresh_token_sets_cookie_and_redirects() {
    let req = Request::builder()
        .uri("/page?ta_token=abc123&x=1")
        .body(Body::empty())
        .expect("req");
    let resp = app(session_layer(&["abc123"])).oneshot(req).await.expect("resp");
    assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(resp.headers()[header::LOCATION], "/page?x=1");
    assert_eq!(
        resp.headers()[header::SET_COOKIE],
        "ta_session_token=abc123; Path=/; HttpOnly; Secure; SameSite=Strict"
    );
    // Upgrade answers directly; the page handler never ran.
    assert_ne!(body_text(resp).await, "page");
}

#[tokio::test]
async fn session_redirect_never_contains_token() {
    let req = Request::builder()
        .uri("/page?a=1&ta_token=abc123&b=two%20words&ta_token=abc123&c=3")
        .body(Body::empty())
        .expect("req");
    let resp = app(session_layer(&["abc123"])).oneshot(req).await.expect("resp");
    let location = resp.headers()[header::LOCATION].to_str().expect("ascii");
    assert_eq!(location, "/page?a=1&b=two%20words&c=3");
    assert!(!location.contains("abc123"));
    assert!(!location.contains("ta_token"));
}

#[tokio::test]
async fn session_valid_cookie_forwards() {
    let req = Request::builder()
        .uri("/page")
        .header(header::COOKIE, "ta_session_token=abc123")
        .body(Body::empty())
        .expect("req");
    let resp = app(session_layer(&["abc123"])).oneshot(req).await.expect("resp");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await, "page");
}

#[tokio::test]
async fn session_invalid_token() {
    let req = Request::builder()
        .uri("/page?ta_token=wrong")
        .body(Body::empty())
        .expect("req");
    let resp = app(session_layer(&["abc123"])).oneshot(req).await.expect("resp");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().get(header::SET_COOKIE).is_none());
    assert_eq!(body_text(resp).await, "Invalid token");
}

#[tokio::test]
async fn session_nothing_presented() {
    let req = Request::builder().uri("/page").body(Body::empty()).expect("req");
    let resp = app(session_layer(&["abc123"])).oneshot(req).await.expect("resp");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().get(header::WWW_AUTHENTICATE).is_none());
    assert_eq!(body_text(resp).await, "Unauthorized");
}

#[tokio::test]
async fn session_upgrade_then_cookie_round_trip() {
    let layer = session_layer(&["abc123"]);

    let first = Request::builder()
        .uri("/page?ta_token=abc123")
        .body(Body::empty())
        .expect("req");
    let resp = app(layer.clone()).oneshot(first).await.expect("resp");
    assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
    let set_cookie = resp.headers()[header::SET_COOKIE]
        .to_str()
        .expect("ascii")
        .to_string();
    let location = resp.headers()[header::LOCATION]
        .to_str()
        .expect("ascii")
        .to_string();
    let cookie_pair = set_cookie.split(';').next().expect("pair");

    let second = Request::builder()
        .uri(location)
        .header(header::COOKIE, cookie_pair)
        .body(Body::empty())
        .expect("req");
    let resp = app(layer).oneshot(second).await.expect("resp");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await, "page");
}

#[tokio::test]
async fn session_post_redirect_is_method_preserving() {
    let req = Request::builder()
        .method("POST")
        .uri("/echo?ta_token=abc123")
        .body(Body::from("payload"))
        .expect("req");
    let resp = app(session_layer(&["abc123"])).oneshot(req).await.expect("resp");
    // 307, not 302/303: clients must repeat the POST with its body.
    assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(resp.headers()[header::LOCATION], "/echo");
}

#[tokio::test]
async fn forwarded_request_is_unmodified() {
    let upstream = service_fn(|req: Request<Body>| async move {
        let summary = format!(
            "{} {} auth={} cookie={}",
            req.method(),
            req.uri(),
            req.headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-"),
            req.headers()
                .get(header::COOKIE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-"),
        );
        Ok::<_, Infallible>(Response::new(Body::from(summary)))
    });

    let svc = bearer_layer(&["secret1"]).layer(upstream);
    let req = Request::builder()
        .method("PUT")
        .uri("/a/b?ta_token=keep&x=1")
        .header(header::AUTHORIZATION, "Bearer secret1")
        .header(header::COOKIE, "k=v")
        .body(Body::empty())
        .expect("req");
    let resp = svc.oneshot(req).await.expect("resp");
    assert_eq!(
        body_text(resp).await,
        "PUT /a/b?ta_token=keep&x=1 auth=Bearer secret1 cookie=k=v"
    );
}

#[tokio::test]
async fn rejected_request_does_not_reach_upstream() {
    let upstream = service_fn(|_req: Request<Body>| async move {
        let mut resp = Response::new(Body::empty());
        *resp.status_mut() = StatusCode::IM_A_TEAPOT;
        Ok::<_, Infallible>(resp)
    });
    let svc = session_layer(&["abc123"]).layer(upstream);
    let req = Request::builder()
        .uri("/page?ta_token=nope")
        .body(Body::empty())
        .expect("req");
    let resp = svc.oneshot(req).await.expect("resp");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn rejection_does_not_affect_later_requests() {
    let layer = bearer_layer(&["secret1"]);
    for _ in 0..3 {
        let bad = Request::builder()
            .uri("/")
            .header(header::AUTHORIZATION, "Bearer nope")
            .body(Body::empty())
            .expect("req");
        let resp = app(layer.clone()).oneshot(bad).await.expect("resp");
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
    let good = Request::builder()
        .uri("/")
        .header(header::AUTHORIZATION, "Bearer secret1")
        .body(Body::empty())
        .expect("req");
    let resp = app(layer).oneshot(good).await.expect("resp");
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn rejected_request_releases_inner_capacity() {
    let upstream = service_fn(|_req: Request<Body>| async move {
        Ok::<_, Infallible>(Response::new(Body::empty()))
    });
    let limited = ConcurrencyLimitLayer::new(1).layer(upstream);
    let mut first = bearer_layer(&["secret1"]).layer(limited);
    let mut second = first.clone();

    let req = Request::builder().uri("/").body(Body::empty()).expect("req");
    let resp = ServiceExt::<Request<Body>>::ready(&mut first)
        .await
        .expect("ready")
        .call(req)
        .await
        .expect("resp");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // The only slot must be free again for the next caller.
    let ready = tokio::time::timeout(
        Duration::from_secs(1),
        ServiceExt::<Request<Body>>::ready(&mut second),
    )
    .await;
    assert!(ready.is_ok(), "inner slot still held after rejection");
}
