use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, Query, State,
        rejection::JsonRejection,
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::config::{Config, SessionConfig};
use crate::document::{NormalizedDocument, StoredDocument};
use crate::downloader;
use crate::error::{AppError, Result};
use crate::loader::{self, ParserRegistry, UploadedFile};
use crate::login;
use crate::service::DocumentService;
use crate::store::Store;

/// Upper bound on a request body, covering multi-file uploads
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub documents: DocumentService,
    pub registry: Arc<ParserRegistry>,
    pub session: SessionConfig,
}

impl AppState {
    pub fn new(store: Store, session: SessionConfig) -> Self {
        Self {
            documents: DocumentService::new(store.clone(), session.verify),
            registry: Arc::new(ParserRegistry::default()),
            store,
            session,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DocumentList<T> {
    pub documents: Vec<T>,
}

/// Body of `POST /save`: a normalized record plus the caller's token
#[derive(Debug, Deserialize)]
pub struct SaveRequest {
    #[serde(flatten)]
    pub document: NormalizedDocument,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub id: Option<String>,
}

/// Map a JSON extractor rejection to a 400
pub fn invalid_json(rejection: JsonRejection) -> AppError {
    debug!(error = %rejection, "rejected request body");
    AppError::Validation("Invalid JSON".to_string())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/signup", post(login::handle_signup))
        .route("/login", post(login::handle_login))
        .route("/logout", post(login::handle_logout))
        .route("/upload", post(upload_documents))
        .route("/save", post(save_document))
        .route("/fetch", post(fetch_documents))
        .route("/view", get(view_document))
        .route("/download", get(download_document))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the server and block until a shutdown signal arrives
pub async fn run(config: Config) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let addr = config.server.bind_addr()?;
    let store = Store::connect(&config.database.url).await?;
    let app = router(AppState::new(store.clone(), config.session.clone()));

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, verify_sessions = config.session.verify, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close().await;
    info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

/// Parse uploaded files into normalized previews
///
/// Nothing is persisted; the client decides what to save.
async fn upload_documents(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<DocumentList<NormalizedDocument>>> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {}", e)))?
    {
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Invalid multipart body: {}", e)))?;
        files.push(UploadedFile::new(name, bytes.to_vec()));
    }

    let count = files.len();
    let documents = loader::parse_batch(Arc::clone(&state.registry), files)
        .await
        .map_err(|e| AppError::Validation(e.to_string()))?;

    info!(received = count, accepted = documents.len(), "upload parsed");
    Ok(Json(DocumentList { documents }))
}

async fn save_document(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: std::result::Result<Json<SaveRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<StoredDocument>)> {
    let Json(request) = payload.map_err(invalid_json)?;
    let token = request.token.or_else(|| login::session_token(&jar));

    let stored = state
        .documents
        .save(request.document, token.as_deref())
        .await?;

    Ok((StatusCode::CREATED, Json(stored)))
}

/// List every stored document
///
/// The token may come in the JSON body or, failing that, the session cookie.
async fn fetch_documents(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: std::result::Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<DocumentList<StoredDocument>>> {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(JsonRejection::MissingJsonContentType(_)) => TokenRequest::default(),
        Err(rejection) => return Err(invalid_json(rejection)),
    };
    let token = request.token.or_else(|| login::session_token(&jar));

    let documents = state.documents.list(token.as_deref()).await?;
    Ok(Json(DocumentList { documents }))
}

async fn view_document(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> Result<Json<StoredDocument>> {
    let id = query.id.unwrap_or_default();
    Ok(Json(state.documents.fetch(&id).await?))
}

async fn download_document(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> Result<Response> {
    let id = query.id.unwrap_or_default();
    let stored = state.documents.fetch(&id).await?;

    let export = tokio::task::spawn_blocking(move || downloader::export(&stored.document))
        .await
        .map_err(|e| AppError::Internal(format!("Export task failed: {}", e)))?
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let disposition = format!(
        "attachment; filename*=UTF-8''{}",
        urlencoding::encode(&export.file_name)
    );

    Ok((
        [
            (header::CONTENT_TYPE, export.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        export.bytes,
    )
        .into_response())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
