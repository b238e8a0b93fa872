use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderName, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use log::{error, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::dataset::Dataset;
use crate::documents::DocumentKind;
use crate::error::BatchError;
use crate::grouping::Field;
use crate::packager::{BatchJob, BatchPackager, Progress};
use crate::session::SessionStore;
use crate::template::TemplateRenderer;

/// Multipart field carrying the spreadsheet.
pub const DATASET_FIELD: &str = "dataset";

pub const X_BATCH_ENTRIES: HeaderName = HeaderName::from_static("x-batch-entries");
pub const X_BATCH_FAILURES: HeaderName = HeaderName::from_static("x-batch-failures");

pub struct AppState {
    config: AppConfig,
    sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Arc<Self> {
        let ttl = Duration::from_secs(config.session_ttl_secs);
        Arc::new(AppState {
            config,
            sessions: Arc::new(SessionStore::new(ttl)),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }
}

#[derive(Serialize)]
struct StatusResponse {
    status: String,
    message: Option<String>,
}

#[derive(Serialize)]
struct DatasetSummary {
    status: String,
    rows: usize,
    teachers: usize,
    exams: usize,
}

#[derive(Serialize)]
struct TemplateResponse {
    status: String,
    placeholders: Vec<String>,
    /// Placeholders the document kind does not fill in.
    unknown: Vec<String>,
}

#[derive(Serialize)]
struct ProgressResponse {
    busy: bool,
    progress: Option<Progress>,
    fraction: f32,
}

fn failure(code: StatusCode, message: impl Into<String>) -> Response {
    (
        code,
        Json(StatusResponse {
            status: "error".to_string(),
            message: Some(message.into()),
        }),
    )
        .into_response()
}

fn parse_kind(kind: &str) -> Result<DocumentKind, Response> {
    kind.parse::<DocumentKind>()
        .map_err(|e| failure(StatusCode::NOT_FOUND, e))
}

/// Build the application router; `run` serves it, tests drive it directly.
pub fn router(state: Arc<AppState>) -> Router {
    let limit = state.config.max_upload_bytes;
    Router::new()
        .route("/", get(serve_landing))
        .route("/api/dataset", post(upload_dataset))
        .route("/api/templates/:kind", get(get_template).put(put_template))
        .route("/api/generate/:kind", post(generate))
        .route("/api/report/:kind", get(get_report))
        .route("/api/progress", get(get_progress))
        .layer(DefaultBodyLimit::max(limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let bind = config.bind_address.clone();
    let app = router(AppState::new(config));

    let listener = TcpListener::bind(&bind).await?;
    info!("listening on http://{}", bind);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn serve_landing(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    let (jar, _) = state.sessions.identify(jar);
    (jar, Html(include_str!("./static/index.html")))
}

async fn upload_dataset(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let (jar, id) = state.sessions.identify(jar);

    let mut file_data: Option<Bytes> = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() == Some(DATASET_FIELD) {
                    match field.bytes().await {
                        Ok(bytes) => file_data = Some(bytes),
                        Err(e) => return (jar, failure(e.status(), e.body_text())),
                    }
                }
            }
            Ok(None) => break,
            Err(e) => return (jar, failure(e.status(), e.body_text())),
        }
    }

    let Some(bytes) = file_data.filter(|b| !b.is_empty()) else {
        return (
            jar,
            failure(StatusCode::BAD_REQUEST, "No file data received"),
        );
    };

    let parsed = tokio::task::spawn_blocking(move || Dataset::from_bytes(&bytes)).await;
    let dataset = match parsed {
        Ok(Ok(dataset)) => dataset,
        Ok(Err(e)) => {
            warn!("rejected upload: {}", e);
            return (jar, failure(StatusCode::BAD_REQUEST, e.to_string()));
        }
        Err(e) => {
            error!("dataset loader panicked: {}", e);
            return (
                jar,
                failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read dataset"),
            );
        }
    };

    let summary = DatasetSummary {
        status: "ok".to_string(),
        rows: dataset.len(),
        teachers: dataset.distinct(Field::Person).len(),
        exams: dataset.distinct(Field::Exam).len(),
    };
    info!(
        "session {}: loaded {} rows ({} teachers, {} exams)",
        id, summary.rows, summary.teachers, summary.exams
    );
    state
        .sessions
        .with(&id, |session| session.dataset = Some(Arc::new(dataset)));

    (jar, Json(summary).into_response())
}

async fn get_template(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(kind): Path<String>,
) -> impl IntoResponse {
    let (jar, id) = state.sessions.identify(jar);
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(response) => return (jar, response),
    };
    let template = state.sessions.with(&id, |session| session.template(kind));
    (jar, template.into_response())
}

async fn put_template(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(kind): Path<String>,
    body: String,
) -> impl IntoResponse {
    let (jar, id) = state.sessions.identify(jar);
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(response) => return (jar, response),
    };

    let response = TemplateResponse {
        status: "ok".to_string(),
        placeholders: TemplateRenderer::placeholders(&body).into_iter().collect(),
        unknown: TemplateRenderer::unknown_placeholders(&body, kind.placeholders().iter().copied()),
    };
    if !response.unknown.is_empty() {
        warn!(
            "{} template references unknown placeholders: {}",
            kind,
            response.unknown.join(", ")
        );
    }
    state
        .sessions
        .with(&id, |session| session.set_template(kind, body));

    (jar, Json(response).into_response())
}

async fn generate(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(kind): Path<String>,
) -> impl IntoResponse {
    let (jar, id) = state.sessions.identify(jar);
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(response) => return (jar, response),
    };

    let (dataset, template) = state
        .sessions
        .with(&id, |session| (session.dataset.clone(), session.template(kind)));
    let Some(dataset) = dataset else {
        return (
            jar,
            failure(StatusCode::BAD_REQUEST, "No dataset uploaded"),
        );
    };

    let dates = match state.config.date_format(kind) {
        Ok(dates) => dates,
        Err(e) => return (jar, failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    };

    let guard = match state.sessions.begin_run(&id) {
        Ok(guard) => guard,
        Err(e) => return (jar, failure(StatusCode::CONFLICT, e.to_string())),
    };

    let stylesheet = state.config.stylesheet(kind);
    let policy = state.config.failure_policy;
    let sessions = Arc::clone(&state.sessions);
    let session_id = id.clone();

    let result = tokio::task::spawn_blocking(move || {
        let _guard = guard;
        let job = BatchJob {
            kind,
            template: &template,
            stylesheet: Some(&stylesheet),
            dates: &dates,
        };
        BatchPackager::new(policy).run(&dataset, &job, |progress| {
            info!("{}", progress.label);
            sessions.with(&session_id, |session| session.progress = Some(progress.clone()));
        })
    })
    .await;

    let outcome = match result {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e @ BatchError::Busy)) => {
            return (jar, failure(StatusCode::CONFLICT, e.to_string()));
        }
        Ok(Err(e)) => {
            error!("session {}: {} batch failed: {}", id, kind, e);
            return (jar, failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
        Err(e) => {
            error!("session {}: {} batch panicked: {}", id, kind, e);
            return (
                jar,
                failure(StatusCode::INTERNAL_SERVER_ERROR, "Document generation failed"),
            );
        }
    };

    let entries = outcome.report.entries.len();
    let failures = outcome.report.failures.len();
    state.sessions.with(&id, |session| {
        session.reports.insert(kind, outcome.report);
    });

    let archive = outcome.archive;
    let headers = [
        (header::CONTENT_TYPE, archive.mime_type().to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", archive.file_name),
        ),
        (X_BATCH_ENTRIES, entries.to_string()),
        (X_BATCH_FAILURES, failures.to_string()),
    ];
    (jar, (headers, archive.bytes).into_response())
}

async fn get_report(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(kind): Path<String>,
) -> impl IntoResponse {
    let (jar, id) = state.sessions.identify(jar);
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(response) => return (jar, response),
    };

    match state.sessions.with(&id, |session| session.reports.get(&kind).cloned()) {
        Some(report) => (jar, Json(report).into_response()),
        None => (
            jar,
            failure(StatusCode::NOT_FOUND, format!("No {} batch has run yet", kind)),
        ),
    }
}

async fn get_progress(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    let (jar, id) = state.sessions.identify(jar);
    let (busy, progress) = state
        .sessions
        .with(&id, |session| (session.busy, session.progress.clone()));
    let fraction = progress.as_ref().map_or(0.0, Progress::fraction);

    (
        jar,
        Json(ProgressResponse {
            busy,
            progress,
            fraction,
        }),
    )
}
