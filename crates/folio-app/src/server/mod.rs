//! Web server entrypoints live here.

use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{net::TcpListener, sync::watch};

use crate::config::AppConfig;
use crate::services::chat::{ChatError, ChatService};
use crate::services::citation::{CitationError, CitationResolver};
use crate::services::contexts::{ContextError, ContextService, Upload};
use folio_server::{ApiError, ChatRequest, ChatResponse, ContextView, FileView, FragmentsRequest};

const HEALTHZ_PATH: &str = "/v1/healthz";
const HEALTHZ_STATUS: &str = "ok";
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Serialize, Copy, Clone, PartialEq, Eq)]
struct HealthzResponse {
    status: &'static str,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ShutdownEvent {
    Pending,
    CtrlC,
    SigTerm,
    ListenerFailed,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("listen address may not be empty")]
    EmptyListenAddr,
    #[error("invalid listen address `{address}`: {source}")]
    InvalidListenAddr {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to determine local address: {source}")]
    LocalAddr {
        #[source]
        source: std::io::Error,
    },
    #[error("axum server error: {source}")]
    Serve {
        #[source]
        source: std::io::Error,
    },
}

/// Shared handler state. Services are cheap to clone behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub contexts: Arc<ContextService>,
    pub chat: Arc<ChatService>,
    pub citations: Arc<CitationResolver>,
}

pub fn build_api_router(state: AppState) -> Router {
    debug_assert!(HEALTHZ_PATH.starts_with("/v1/"));
    debug_assert!(HEALTHZ_PATH.ends_with("healthz"));

    Router::new()
        .route(HEALTHZ_PATH, get(healthz))
        .route("/api/context", post(create_context))
        .route("/api/context/{id}", get(get_context))
        .route("/api/context/{id}/files", post(add_file))
        .route("/api/files/{id}", delete(delete_file))
        .route("/api/chat/{context}", post(chat))
        .route("/api/fragments/{context}", post(fragments))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

pub async fn serve(config: AppConfig, state: AppState) -> Result<(), ServerError> {
    debug_assert!(config.server.listen_addr.len() <= 128);
    debug_assert!(!config.server.listen_addr.contains('\n'));

    let listen_addr = parse_listen_addr(&config.server.listen_addr)?;

    let listener = bind_listener(listen_addr).await?;

    let local_addr = listener
        .local_addr()
        .map_err(|source| ServerError::LocalAddr { source })?;
    tracing::info!(%local_addr, "folio server listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(ShutdownEvent::Pending);

    let shutdown_future = broadcast_shutdown(shutdown_tx);

    let app = build_api_router(state);

    let mut server_future = Box::pin(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_future)
            .await
    });
    debug_assert!(DRAIN_TIMEOUT.as_secs() == 10);

    let drain_rx = shutdown_rx.clone();
    let mut drain_timeout = Box::pin(drain_timeout_future(drain_rx));

    tokio::select! {
        result = server_future.as_mut() => {
            if let Err(source) = result {
                return Err(ServerError::Serve { source });
            }
        }
        _ = drain_timeout.as_mut() => {
            // Timeout elapsed; dropping the server future forces termination.
        }
    }

    let final_event = *shutdown_rx.borrow();
    if final_event == ShutdownEvent::Pending {
        tracing::info!("server stopped without external shutdown signal");
    } else {
        tracing::info!(?final_event, "server shutdown complete");
    }

    Ok(())
}

/// Service errors rendered as a JSON `ApiError` with a kind-driven status.
struct ApiFailure(ApiError);

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0)).into_response()
    }
}

impl From<ApiError> for ApiFailure {
    fn from(err: ApiError) -> Self {
        ApiFailure(err)
    }
}

impl From<ContextError> for ApiFailure {
    fn from(err: ContextError) -> Self {
        let api = match err {
            ContextError::ContextNotFound(_) | ContextError::FileNotFound(_) => {
                ApiError::not_found(err.to_string())
            }
            ContextError::ForeignFile { .. } => ApiError::validation("context", err.to_string()),
            ContextError::InvalidUpload(_) => ApiError::validation("file", err.to_string()),
            ContextError::Store(_) | ContextError::Blob(_) => ApiError::storage(err.to_string()),
        };
        ApiFailure(api)
    }
}

impl From<ChatError> for ApiFailure {
    fn from(err: ChatError) -> Self {
        let api = match err {
            ChatError::ContextNotFound(_) => ApiError::not_found(err.to_string()),
            ChatError::EmptyQuestion => ApiError::validation("history", err.to_string()),
            ChatError::Provider(_) => ApiError::provider(err.to_string()),
            ChatError::Retrieval(ref inner) if inner.is_provider() => {
                ApiError::provider(err.to_string())
            }
            ChatError::Retrieval(_) | ChatError::Store(_) => ApiError::storage(err.to_string()),
        };
        ApiFailure(api)
    }
}

impl From<CitationError> for ApiFailure {
    fn from(err: CitationError) -> Self {
        let api = match err {
            CitationError::ContextNotFound(_) => ApiError::not_found(err.to_string()),
            CitationError::Malformed(_) => ApiError::validation("fonts", err.to_string()),
            CitationError::Pdf(_) | CitationError::Store(_) | CitationError::Blob(_) => {
                ApiError::storage(err.to_string())
            }
        };
        ApiFailure(api)
    }
}

async fn healthz() -> impl IntoResponse {
    debug_assert_eq!(HEALTHZ_STATUS, "ok");
    debug_assert!(HEALTHZ_STATUS.chars().all(|c| c.is_ascii_lowercase()));

    Json(HealthzResponse {
        status: HEALTHZ_STATUS,
    })
}

async fn create_context(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ContextView>), ApiFailure> {
    let uploads = collect_uploads(multipart).await?;
    let context = state.contexts.create_context(uploads).await?;
    let view = state.contexts.get_context(&context.id).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_context(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ContextView>, ApiFailure> {
    let view = state.contexts.get_context(&id).await?;
    Ok(Json(view))
}

async fn add_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<FileView>), ApiFailure> {
    let mut uploads = collect_uploads(multipart).await?;
    if uploads.len() != 1 {
        return Err(ApiFailure(ApiError::validation(
            "file",
            "exactly one file is expected",
        )));
    }
    // Length was checked above.
    let upload = uploads.remove(0);
    let file = state.contexts.add_file(&id, upload).await?;
    let view = FileView {
        id: file.id,
        name: file.name,
        status: file.status.into(),
        pages: file.pages,
        processed_pages: file.processed_pages,
        chunks: file.chunks,
    };
    Ok((StatusCode::CREATED, Json(view)))
}

#[derive(Debug, Deserialize)]
struct DeleteFileQuery {
    context: String,
}

async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DeleteFileQuery>,
) -> Result<StatusCode, ApiFailure> {
    state.contexts.delete_file(&id, &query.context).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn chat(
    State(state): State<AppState>,
    Path(context): Path<String>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiFailure> {
    let outcome = state.chat.chat(&context, &request).await?;
    Ok(Json(outcome.into_response()))
}

async fn fragments(
    State(state): State<AppState>,
    Path(context): Path<String>,
    Json(request): Json<FragmentsRequest>,
) -> Result<Response, ApiFailure> {
    let pdf = state.citations.cited_pdf(&context, &request.fonts).await?;
    Ok((
        [(header::CONTENT_TYPE, "application/pdf")],
        Bytes::from(pdf),
    )
        .into_response())
}

/// Drain every multipart field that carries bytes into an [`Upload`].
async fn collect_uploads(mut multipart: Multipart) -> Result<Vec<Upload>, ApiFailure> {
    let mut uploads = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                return Err(ApiFailure(ApiError::validation("file", err.to_string())));
            }
        };
        let name = field
            .file_name()
            .or(field.name())
            .unwrap_or("upload.pdf")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|err| ApiFailure(ApiError::validation("file", err.to_string())))?;
        uploads.push(Upload { name, bytes });
    }
    if uploads.is_empty() {
        return Err(ApiFailure(ApiError::validation(
            "file",
            "at least one file is expected",
        )));
    }
    Ok(uploads)
}

async fn wait_for_shutdown() -> ShutdownEvent {
    debug_assert!(DRAIN_TIMEOUT >= Duration::from_secs(1));
    debug_assert!(HEALTHZ_PATH.starts_with('/'));

    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => ShutdownEvent::CtrlC,
            Err(error) => {
                tracing::warn!(%error, "failed to capture Ctrl+C signal");
                ShutdownEvent::ListenerFailed
            }
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => match term.recv().await {
                Some(_) => ShutdownEvent::SigTerm,
                None => ShutdownEvent::ListenerFailed,
            },
            Err(error) => {
                tracing::warn!(%error, "failed to capture SIGTERM");
                ShutdownEvent::ListenerFailed
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending();

    tokio::select! {
        event = ctrl_c => event,
        event = sigterm => event,
    }
}

fn parse_listen_addr(addr: &str) -> Result<SocketAddr, ServerError> {
    debug_assert!(addr.len() <= 128);
    debug_assert!(!addr.contains('\n'));

    let trimmed = addr.trim();
    if trimmed.is_empty() {
        return Err(ServerError::EmptyListenAddr);
    }

    trimmed
        .parse()
        .map_err(|source| ServerError::InvalidListenAddr {
            address: trimmed.to_string(),
            source,
        })
}

async fn bind_listener(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    debug_assert!(addr.port() > 0);
    debug_assert!(addr.ip().is_ipv4() || addr.ip().is_ipv6());

    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            address: addr.to_string(),
            source,
        })
}

fn broadcast_shutdown(
    sender: watch::Sender<ShutdownEvent>,
) -> impl Future<Output = ()> + Send + 'static {
    debug_assert!(!sender.is_closed());
    debug_assert!(DRAIN_TIMEOUT.as_secs() <= 10);
    async move {
        let event = wait_for_shutdown().await;
        debug_assert!(event != ShutdownEvent::Pending);
        if let Err(error) = sender.send(event) {
            tracing::warn!(?event, %error, "failed to broadcast shutdown event");
        }
    }
}

fn drain_timeout_future(
    mut receiver: watch::Receiver<ShutdownEvent>,
) -> impl Future<Output = ()> + Send + 'static {
    debug_assert!(DRAIN_TIMEOUT.as_secs() >= 1);
    debug_assert!(DRAIN_TIMEOUT.as_secs() <= 60);
    async move {
        if receiver.changed().await.is_ok() {
            let event = *receiver.borrow_and_update();
            debug_assert!(event != ShutdownEvent::Pending);
            tracing::info!(?event, "shutdown signal received; draining connections");
            tokio::time::sleep(DRAIN_TIMEOUT).await;
            tracing::warn!(
                ?event,
                seconds = DRAIN_TIMEOUT.as_secs(),
                "graceful shutdown timed out; continuing shutdown"
            );
        }
    }
}
