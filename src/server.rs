//! HTTP server.
//!
//! Exposes the workflow and chat history as a JSON API. Chat submissions
//! are answered with a Server-Sent Events stream of workflow events.
//!
//! # Endpoints
//!
//! | Method   | Path                     | Description                          |
//! |----------|--------------------------|--------------------------------------|
//! | `POST`   | `/api/chat`              | Run the workflow, stream events (SSE) |
//! | `POST`   | `/api/advanced-search`   | Advanced search (always empty)       |
//! | `GET`    | `/api/chats?userId=`     | List a user's chats, newest first    |
//! | `DELETE` | `/api/chats?userId=`     | Clear a user's chats                 |
//! | `GET`    | `/api/chats/{id}`        | Fetch one chat                       |
//! | `POST`   | `/api/chats/{id}/share`  | Share a chat owned by `userId`       |
//! | `GET`    | `/api/share/{id}`        | Fetch a shared chat                  |
//! | `GET`    | `/health`                | Health check                         |
//!
//! # Error Contract
//!
//! ```json
//! { "error": "Chat not found: abc" }
//! ```
//!
//! `400` for a malformed chat submission, `403` for chats owned by another
//! user, `404` for missing records, `500` for everything else (including a
//! malformed advanced-search body).

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::agent::{Submission, Workflow};
use crate::cache::SearchCache;
use crate::error::WatchProError;
use crate::storage::types::Chat;
use crate::storage::ChatStorage;
use crate::tools::search::{SearchDepth, SearchResults};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<Workflow>,
    pub storage: ChatStorage,
    pub cache: SearchCache,
    /// User id applied when a request names none.
    pub default_user_id: String,
}

impl AppState {
    fn user_or_default(&self, user_id: Option<String>) -> String {
        user_id
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| self.default_user_id.clone())
    }
}

/// Builds the router with all routes, CORS and request tracing.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/chat", post(handle_chat))
        .route("/api/advanced-search", post(handle_advanced_search))
        .route("/api/chats", get(handle_list_chats).delete(handle_clear_chats))
        .route("/api/chats/{id}", get(handle_get_chat))
        .route("/api/chats/{id}/share", post(handle_share_chat))
        .route("/api/share/{id}", get(handle_get_shared_chat))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serves the API on `bind` until Ctrl-C.
///
/// # Errors
///
/// Returns an error if binding fails or the server stops abnormally.
pub async fn run_server(state: AppState, bind: &str) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Watch Pro listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    /// Maps a request body the `Json` extractor refused onto `status`
    fn rejected_body(rejection: JsonRejection, status: StatusCode) -> Self {
        tracing::warn!("Rejected request body: {}", rejection.body_text());
        Self {
            status,
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        let status = match err.downcast_ref::<WatchProError>() {
            Some(WatchProError::Forbidden(_)) => StatusCode::FORBIDDEN,
            Some(WatchProError::NotFound(_)) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {:#}", err);
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    store: String,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: state.storage.store().backend_name().to_string(),
    })
}

// ============ POST /api/chat ============

/// Runs the workflow and streams its events.
///
/// Each SSE event is named after the event type and carries it as JSON.
/// A client disconnect drops the stream, which cancels the run.
async fn handle_chat(
    State(state): State<AppState>,
    body: Result<Json<Submission>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let Json(submission) =
        body.map_err(|rejection| AppError::rejected_body(rejection, StatusCode::BAD_REQUEST))?;
    tracing::debug!(
        "Chat submission for chat {:?} (skip classification: {})",
        submission.chat_id,
        submission.skip_classification
    );
    let events = state.workflow.spawn(submission);
    let stream = ReceiverStream::new(events)
        .map(|event| Event::default().event(event.name()).json_data(&event));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// ============ POST /api/advanced-search ============

fn default_max_results() -> i64 {
    10
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdvancedSearchRequest {
    query: String,
    #[serde(default = "default_max_results")]
    max_results: i64,
    #[serde(default)]
    search_depth: SearchDepth,
    #[serde(default)]
    include_domains: Vec<String>,
    #[serde(default)]
    exclude_domains: Vec<String>,
}

#[derive(Debug, Serialize)]
struct AdvancedSearchResponse {
    message: String,
    #[serde(flatten)]
    results: SearchResults,
}

const ADVANCED_SEARCH_MESSAGE: &str = "Advanced search is not available";

/// Advanced search. The search engine behind it was removed, so results are
/// always empty; they are still cached under the request's key.
async fn handle_advanced_search(
    State(state): State<AppState>,
    body: Result<Json<AdvancedSearchRequest>, JsonRejection>,
) -> Result<Json<AdvancedSearchResponse>, AppError> {
    let Json(request) = body.map_err(|rejection| {
        AppError::rejected_body(rejection, StatusCode::INTERNAL_SERVER_ERROR)
    })?;
    let key = SearchCache::search_key(
        &request.query,
        request.max_results,
        request.search_depth.as_str(),
        &request.include_domains,
        &request.exclude_domains,
    );

    let results = match state.cache.get::<SearchResults>(&key).await? {
        Some(cached) => cached,
        None => {
            let results = SearchResults::empty(&request.query);
            state.cache.put(&key, &results).await?;
            results
        }
    };

    Ok(Json(AdvancedSearchResponse {
        message: ADVANCED_SEARCH_MESSAGE.to_string(),
        results,
    }))
}

// ============ /api/chats ============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserQuery {
    #[serde(default)]
    user_id: Option<String>,
}

async fn handle_list_chats(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<Chat>>, AppError> {
    let user_id = state.user_or_default(query.user_id);
    Ok(Json(state.storage.get_chats(&user_id).await?))
}

#[derive(Serialize)]
struct ClearResponse {
    deleted: usize,
}

async fn handle_clear_chats(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<ClearResponse>, AppError> {
    let user_id = state.user_or_default(query.user_id);
    let deleted = state.storage.clear_chats(&user_id).await?;
    tracing::info!("Cleared {} chats for user {}", deleted, user_id);
    Ok(Json(ClearResponse { deleted }))
}

async fn handle_get_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Chat>, AppError> {
    let chat = state
        .storage
        .get_chat(&id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Chat not found: {}", id)))?;

    if let Some(user_id) = query.user_id.filter(|u| !u.is_empty()) {
        if chat.user_id != user_id {
            return Err(anyhow::Error::from(WatchProError::Forbidden(format!(
                "chat {} belongs to another user",
                id
            )))
            .into());
        }
    }
    Ok(Json(chat))
}

async fn handle_share_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Chat>, AppError> {
    let user_id = state.user_or_default(query.user_id);
    state
        .storage
        .share_chat(&id, &user_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("Chat not found: {}", id)))
}

async fn handle_get_shared_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Chat>, AppError> {
    state
        .storage
        .get_shared_chat(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("Shared chat not found: {}", id)))
}
