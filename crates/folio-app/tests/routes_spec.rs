//! HTTP surface checks driven through the router without a socket.

mod support;

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::NaiveDate;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use folio_app::model::Context;
use folio_app::server::{AppState, build_api_router};
use folio_app::stores::DocumentStore;

use support::{ScriptedChat, StaticLayout, TestStack, build_stack, sample_pdf};

fn make_app() -> (Router, TestStack) {
    let stack = build_stack(
        Arc::new(StaticLayout),
        Arc::new(ScriptedChat::new("answer", Vec::new())),
    );
    let state = AppState {
        contexts: stack.contexts.clone(),
        chat: stack.chat.clone(),
        citations: stack.citations.clone(),
    };
    (build_api_router(state), stack)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthz_reports_ok() {
    let (app, _stack) = make_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "ok"}));
}

#[tokio::test]
async fn unknown_context_maps_to_404() {
    let (app, _stack) = make_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/context/ctx_00000000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn chat_without_a_user_turn_maps_to_400() {
    let (app, stack) = make_app();
    let context = Context::new(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
    stack.docs.put_context(&context).await.unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/chat/{}", context.id))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json!({"history": []})).unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "validation");
}

#[tokio::test]
async fn malformed_citation_token_maps_to_400_on_fonts() {
    let (app, stack) = make_app();
    let context = Context::new(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
    stack.docs.put_context(&context).await.unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/fragments/{}", context.id))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json!({"fonts": ["nonsense"]})).unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "validation");
    assert_eq!(body["field"], "fonts");
}

#[tokio::test]
async fn fragments_of_an_empty_citation_list_return_a_pdf() {
    let (app, stack) = make_app();
    let context = Context::new(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
    stack.docs.put_context(&context).await.unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/fragments/{}", context.id))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json!({"fonts": []})).unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/pdf"
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.starts_with(b"%PDF-"));
}

#[tokio::test]
async fn delete_against_an_unknown_context_maps_to_404() {
    let (app, _stack) = make_app();
    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/files/file_00000000?context=ctx_00000000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn multipart_upload_creates_a_context() {
    let (app, _stack) = make_app();

    let boundary = "folio-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"file\"; filename=\"a.pdf\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: application/pdf\r\n\r\n");
    body.extend_from_slice(&sample_pdf(1));
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/context")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let view = body_json(response).await;
    assert!(view["id"].as_str().unwrap().starts_with("ctx_"));
    assert_eq!(view["files"].as_array().unwrap().len(), 1);
    assert_eq!(view["files"][0]["name"], "a.pdf");
}
