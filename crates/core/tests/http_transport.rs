//! Real HTTP round trips through `ReqwestTransport` against a local axum server

use axum::extract::Json;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use spectest_core::{
    Credentials, HttpRequest, PluginHost, ReqwestTransport, RunConfig, RunContext, Runner,
    Suite, TestCase, Transport,
};
use std::time::Duration;
use tokio::net::TcpListener;

async fn login() -> impl IntoResponse {
    (
        AppendHeaders([
            (header::SET_COOKIE, "sid=abc123; Path=/"),
            (header::SET_COOKIE, "theme=dark; Path=/"),
        ]),
        Json(json!({"ok": true})),
    )
}

async fn me(headers: HeaderMap) -> impl IntoResponse {
    match headers.get(header::COOKIE).and_then(|v| v.to_str().ok()) {
        Some(cookie) if cookie.contains("sid=abc123") => {
            (StatusCode::OK, Json(json!({"user": "ada"})))
        }
        _ => (StatusCode::UNAUTHORIZED, Json(json!({"message": "login required"}))),
    }
}

async fn echo(Json(body): Json<Value>) -> impl IntoResponse {
    (StatusCode::CREATED, [("x-request-id", "req-42")], Json(body))
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(2)).await;
    "late"
}

async fn text() -> &'static str {
    "plain body"
}

async fn serve() -> String {
    let app = Router::new()
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/echo", post(echo))
        .route("/slow", get(slow))
        .route("/text", get(text));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn transport(base_url: &str) -> ReqwestTransport {
    ReqwestTransport::new(base_url, "spectest-tests", None).unwrap()
}

#[tokio::test]
async fn json_body_is_sent_and_parsed() {
    let base = serve().await;
    let mut request = HttpRequest::new("POST", "/echo");
    request.body = Some(json!({"title": "hello"}));

    let response = transport(&base)
        .send(&request, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(response.status, 201);
    assert_eq!(response.body, json!({"title": "hello"}));
    assert_eq!(response.header("X-Request-Id"), Some("req-42"));
}

#[tokio::test]
async fn non_json_body_is_kept_as_text() {
    let base = serve().await;
    let response = transport(&base)
        .send(&HttpRequest::new("GET", "/text"), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(response.body, json!("plain body"));
}

#[tokio::test]
async fn timeout_is_reported_as_timeout() {
    let base = serve().await;
    let err = transport(&base)
        .send(&HttpRequest::new("GET", "/slow"), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(err.to_string(), "Timeout after 100ms");
}

#[tokio::test]
async fn connection_refused_is_not_a_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = transport(&format!("http://{addr}"))
        .send(&HttpRequest::new("GET", "/"), Duration::from_secs(2))
        .await
        .unwrap_err();
    assert!(!err.is_timeout());
}

#[tokio::test]
async fn session_cookie_flows_between_tests() {
    let base = serve().await;

    let mut login = TestCase::new("login", "/login");
    login.request.method = Some("POST".into());
    login.response.status = Some(200);

    let mut me = TestCase::new("me", "/me");
    me.depends_on = vec!["login".into()];
    me.request.credentials = Some(Credentials::Include);
    me.response.status = Some(200);
    me.response.json = json!({"user": "ada"}).as_object().cloned();

    let config = RunConfig {
        base_url: base,
        ..Default::default()
    };
    let ctx = RunContext::new(config, PluginHost::default()).unwrap();
    let state = ctx.state.clone();
    let report = Runner::new(ctx)
        .run(vec![Suite::new("auth", vec![login, me])])
        .await
        .unwrap();

    assert!(report.success(), "{:?}", report.results);
    assert_eq!(state.session_cookie().as_deref(), Some("sid=abc123; Path=/"));
}
