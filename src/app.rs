use axum::{
    Form, Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path as AxumPath, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::dataset::Dataset;
use crate::error::StoreError;
use crate::pipeline::{ChartOutcome, Pipeline};
use crate::settings::Settings;
use crate::store::Database;
use crate::upload::store_upload;

const UPLOAD_FIELD: &str = "csv_file";
const INVALID_UPLOAD: &str = "Please upload a valid CSV file.";

pub struct AppState {
    pub settings: Settings,
    pub pipeline: Pipeline,
    pub db: Database,
}

impl AppState {
    pub fn from_settings(settings: Settings) -> Result<Self, StoreError> {
        let db = Database::open(settings.storage.database_dir.clone())?;
        let pipeline = Pipeline::from_settings(&settings);
        Ok(Self {
            settings,
            pipeline,
            db,
        })
    }
}

#[derive(Serialize)]
struct StatusResponse {
    status: String,
    message: Option<String>,
}

#[derive(Deserialize)]
struct FeedbackForm {
    feedback: Option<String>,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Serialize)]
struct Preview {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl From<Dataset> for Preview {
    fn from(dataset: Dataset) -> Self {
        Self {
            columns: dataset.columns().to_vec(),
            rows: dataset
                .rows()
                .iter()
                .map(|row| row.iter().map(|v| v.to_string()).collect())
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct DashboardResponse {
    username: String,
    filename: Option<String>,
    chart: ChartOutcome,
    preview: Option<Preview>,
}

fn status_response(code: StatusCode, status: &str, message: &str) -> Response {
    (
        code,
        Json(StatusResponse {
            status: status.to_string(),
            message: Some(message.to_string()),
        }),
    )
        .into_response()
}

pub fn router(state: Arc<AppState>) -> Router {
    let static_dir = state.settings.storage.static_dir.clone();
    let upload_limit = state.settings.server.max_upload_bytes;

    Router::new()
        .route("/healthz", get(health_check))
        .route(
            "/users/:username/uploads",
            get(list_uploads).post(upload_dataset),
        )
        .route("/users/:username/dashboard", get(dashboard))
        .route("/feedback", post(submit_feedback))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(state)
}

pub async fn run(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let bind = settings.server.bind.clone();
    let state = Arc::new(AppState::from_settings(settings)?);
    let app = router(state);

    let listener = TcpListener::bind(&bind).await?;
    info!("Listening on http://{}", bind);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "ok"
}

async fn upload_dataset(
    AxumPath(username): AxumPath<String>,
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Response {
    let mut upload = None;

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some(UPLOAD_FIELD) {
                    continue;
                }
                let original_name = field.file_name().unwrap_or_default().to_string();
                match field.bytes().await {
                    Ok(bytes) => upload = Some((original_name, bytes)),
                    Err(e) => {
                        warn!("failed to read upload from {}: {}", username, e);
                        return status_response(StatusCode::BAD_REQUEST, "error", INVALID_UPLOAD);
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("malformed multipart body from {}: {}", username, e);
                return status_response(StatusCode::BAD_REQUEST, "error", INVALID_UPLOAD);
            }
        }
    }

    let Some((original_name, bytes)) = upload else {
        return status_response(StatusCode::BAD_REQUEST, "error", INVALID_UPLOAD);
    };

    let storage = &state.settings.storage;
    let stored = store_upload(
        &storage.uploads_dir,
        &original_name,
        &bytes,
        &storage.allowed_extensions,
    )
    .and_then(|(filename, path)| state.db.record_upload(&username, &filename, &path));

    match stored {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(StoreError::InvalidFilename(_) | StoreError::UnsupportedFileType(_)) => {
            status_response(StatusCode::BAD_REQUEST, "error", INVALID_UPLOAD)
        }
        Err(e) => {
            error!("failed to store upload {:?} for {}: {}", original_name, username, e);
            status_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "error",
                "Could not store the uploaded file.",
            )
        }
    }
}

async fn list_uploads(
    AxumPath(username): AxumPath<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    Json(state.db.uploads_for(&username))
}

async fn dashboard(
    AxumPath(username): AxumPath<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let filename = state.db.latest_upload(&username).map(|u| u.filename);

    // plotting and CSV parsing are blocking work
    let worker_state = state.clone();
    let worker_user = username.clone();
    let worker_file = filename.clone();
    let result = tokio::task::spawn_blocking(move || {
        let pipeline = &worker_state.pipeline;
        let chart = pipeline.run(&worker_user, worker_file.as_deref());
        let preview = worker_file
            .as_deref()
            .and_then(|f| pipeline.preview(f).ok())
            .map(Preview::from);
        (chart, preview)
    })
    .await;

    let (chart, preview) = match result {
        Ok(done) => done,
        Err(e) => {
            error!("dashboard worker for {} did not finish: {}", username, e);
            (ChartOutcome::GenerationFailed, None)
        }
    };

    Json(DashboardResponse {
        username,
        filename,
        chart,
        preview,
    })
}

async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    Form(form): Form<FeedbackForm>,
) -> Response {
    let text = form.feedback.as_deref().unwrap_or("");
    match state
        .db
        .add_feedback(text, form.name.as_deref(), form.email.as_deref())
    {
        Ok(_) => status_response(StatusCode::CREATED, "ok", "Thank you for your feedback!"),
        Err(StoreError::EmptyFeedback) => {
            status_response(StatusCode::BAD_REQUEST, "error", "Feedback cannot be empty.")
        }
        Err(e) => {
            error!("failed to store feedback: {}", e);
            status_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "error",
                "Could not save your feedback.",
            )
        }
    }
}
