#![cfg(feature = "web")]

mod common;

use axum::body::{Body, to_bytes};
use axum::http::{Request, Response, StatusCode, header};
use axum::Router;
use serde_json::Value;
use surveillances::app::{AppState, router};
use surveillances::config::AppConfig;
use tower::ServiceExt;

const BOUNDARY: &str = "surveillances-test-boundary";

fn app() -> Router {
    let config = AppConfig {
        style_dir: "no-such-style-dir".into(),
        ..AppConfig::default()
    };
    router(AppState::new(config))
}

fn with_cookie(builder: axum::http::request::Builder, cookie: Option<&str>) -> axum::http::request::Builder {
    match cookie {
        Some(cookie) => builder.header(header::COOKIE, cookie),
        None => builder,
    }
}

fn upload(bytes: &[u8], cookie: Option<&str>) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"dataset\"; filename=\"planning.xlsx\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    with_cookie(Request::post("/api/dataset"), cookie)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn request(method: &str, uri: &str, cookie: Option<&str>, body: impl Into<Body>) -> Request<Body> {
    with_cookie(Request::builder().method(method).uri(uri), cookie)
        .body(body.into())
        .unwrap()
}

/// `name=value` of the session cookie a response sets.
fn session_cookie(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .unwrap()
        .to_string()
}

async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

async fn json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn header_str<'a>(response: &'a Response<Body>, name: &str) -> &'a str {
    response.headers().get(name).unwrap().to_str().unwrap()
}

fn planning() -> Vec<u8> {
    common::workbook(&[
        ("Dupont", "Maths", "Maths S1", "2024-01-15", "08h30"),
        ("Martin", "Info", "Info/Réseaux", "2024-01-16", "14h00"),
    ])
}

#[tokio::test]
async fn serves_landing_page_and_sets_session() {
    let response = app().oneshot(request("GET", "/", None, Body::empty())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(session_cookie(&response).starts_with("session="));
    let html = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(html.contains("/api/generate/"));
}

#[tokio::test]
async fn generate_needs_a_dataset() {
    let response = app()
        .oneshot(request("POST", "/api/generate/convocation", None, Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await["status"], "error");
}

#[tokio::test]
async fn unknown_kind_is_not_found() {
    let response = app()
        .oneshot(request("GET", "/api/templates/bulletin", None, Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_sheet_is_rejected() {
    let mut book = rust_xlsxwriter::Workbook::new();
    book.add_worksheet().write_string(0, 0, "Enseignant").unwrap();
    let bytes = book.save_to_buffer().unwrap();

    let response = app().oneshot(upload(&bytes, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json(response).await;
    assert!(body["message"].as_str().unwrap().contains("Matière"));
}

#[tokio::test]
async fn upload_generate_and_report() {
    let app = app();

    let response = app.clone().oneshot(upload(&planning(), None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response);
    let summary = json(response).await;
    assert_eq!(summary["rows"], 2);
    assert_eq!(summary["teachers"], 2);
    assert_eq!(summary["exams"], 2);

    let response = app
        .clone()
        .oneshot(request("POST", "/api/generate/fiche", Some(&cookie), Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "content-type"), "application/zip");
    assert_eq!(
        header_str(&response, "content-disposition"),
        "attachment; filename=\"fiches_de_suivi.zip\""
    );
    assert_eq!(header_str(&response, "x-batch-entries"), "2");
    assert_eq!(header_str(&response, "x-batch-failures"), "0");
    let zip = body_bytes(response).await;
    assert_eq!(
        common::entry_names(&zip),
        vec!["Info-Réseaux.pdf", "Maths S1.pdf"]
    );

    let response = app
        .clone()
        .oneshot(request("GET", "/api/report/fiche", Some(&cookie), Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let report = json(response).await;
    assert_eq!(report["total"], 2);
    assert_eq!(report["kind"], "fiche");
    assert_eq!(report["failures"].as_array().unwrap().len(), 0);

    let response = app
        .clone()
        .oneshot(request("GET", "/api/progress", Some(&cookie), Body::empty()))
        .await
        .unwrap();
    let progress = json(response).await;
    assert_eq!(progress["busy"], false);
    assert_eq!(progress["progress"]["label"], "[2/2] Fiche de suivi de Maths S1");
    assert_eq!(progress["fraction"], 1.0);

    let response = app
        .oneshot(request("GET", "/api/report/convocation", Some(&cookie), Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn edited_template_applies_to_the_session() {
    let app = app();
    let response = app.clone().oneshot(upload(&planning(), None)).await.unwrap();
    let cookie = session_cookie(&response);

    let template = "# {{enseignant}}\n\nSalle {{salle}}";
    let response = app
        .clone()
        .oneshot(request("PUT", "/api/templates/convocation", Some(&cookie), template))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body["placeholders"], serde_json::json!(["enseignant", "salle"]));
    assert_eq!(body["unknown"], serde_json::json!(["salle"]));

    let response = app
        .clone()
        .oneshot(request("GET", "/api/templates/convocation", Some(&cookie), Body::empty()))
        .await
        .unwrap();
    assert_eq!(String::from_utf8(body_bytes(response).await).unwrap(), template);

    let response = app
        .clone()
        .oneshot(request("POST", "/api/generate/convocation", Some(&cookie), Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "x-batch-entries"), "0");
    assert_eq!(header_str(&response, "x-batch-failures"), "2");
    assert!(common::entry_names(&body_bytes(response).await).is_empty());

    // another browser still sees the default letter
    let response = app
        .oneshot(request("GET", "/api/templates/convocation", None, Body::empty()))
        .await
        .unwrap();
    let text = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(text.starts_with("# Convocation"));
}
