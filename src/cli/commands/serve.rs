//! HTTP API server.
//!
//! Provides REST endpoints for question answering, retrieval, ingestion, the
//! route and fare catalog, bookings, and the conversational assistant.

use crate::assistant::{Assistant, SmartQuery, SmartReply};
use crate::booking::{Booking, BookingService, ChatMessage, NewBooking};
use crate::catalog::CatalogService;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::error::BusbotError;
use crate::pipeline::{IngestReport, Pipeline};
use crate::rag::ScoredSegment;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock, RwLockReadGuard};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Shared application state.
pub struct AppState {
    pub pipeline: Pipeline,
    pub bookings: BookingService,
    pub assistant: Assistant,
    catalog: RwLock<CatalogService>,
}

impl AppState {
    pub fn new(pipeline: Pipeline, catalog: CatalogService, bookings: BookingService) -> Self {
        Self {
            pipeline,
            bookings,
            assistant: Assistant::new(),
            catalog: RwLock::new(catalog),
        }
    }

    /// The catalog as of the last successful load.
    pub fn catalog(&self) -> Result<RwLockReadGuard<'_, CatalogService>, BusbotError> {
        self.catalog
            .read()
            .map_err(|e| BusbotError::Rag(format!("Failed to acquire catalog lock: {}", e)))
    }

    /// Re-read the catalog from disk. On failure the previous catalog stays in place.
    pub fn reload_catalog(&self) -> Result<(), BusbotError> {
        let fresh = match self.pipeline.catalog() {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!("Keeping the previous catalog: {}", e);
                return Ok(());
            }
        };
        let mut catalog = self
            .catalog
            .write()
            .map_err(|e| BusbotError::Rag(format!("Failed to acquire catalog lock: {}", e)))?;
        *catalog = fresh;
        info!("Reloaded catalog");
        Ok(())
    }
}

/// Run the HTTP API server.
pub async fn run_serve(host: &str, port: u16, settings: Settings) -> anyhow::Result<()> {
    preflight::check(Operation::Ask, &settings)?;

    let bookings = BookingService::new(&settings.booking_path())?;
    let pipeline = Pipeline::open(settings).await?;
    let catalog = pipeline.catalog()?;

    let state = Arc::new(AppState::new(pipeline, catalog, bookings));

    let app = router(state.clone());

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("busbot API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET    /health");
    Output::kv("Ask (RAG)", "POST   /ask");
    Output::kv("Search", "POST   /search");
    Output::kv("Ingest", "POST   /ingest");
    Output::kv("Districts", "GET    /districts");
    Output::kv("Providers", "GET    /providers");
    Output::kv("Policy", "GET    /providers/{name}/policy");
    Output::kv("Routes", "GET    /available-providers?from_district=&to_district=");
    Output::kv("Dropping points", "GET    /dropping-points/{district}");
    Output::kv("Bookings", "GET    /bookings, POST /bookings");
    Output::kv("Booking", "GET    /bookings/{id}, DELETE /bookings/{id}?permanent=");
    Output::kv("By phone", "GET    /bookings/phone/{phone}");
    Output::kv("Statistics", "GET    /stats");
    Output::kv("Assistant", "POST   /query/smart");
    Output::kv("Chat history", "GET    /chat/{session_id}?limit=, DELETE /chat/{session_id}");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    match Arc::try_unwrap(state) {
        Ok(state) => state.pipeline.shutdown().await?,
        Err(_) => warn!("Server state still shared at shutdown, index not flushed"),
    }

    Ok(())
}

/// Build the API router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/ask", post(ask))
        .route("/search", post(search))
        .route("/ingest", post(ingest))
        .route("/districts", get(districts))
        .route("/providers", get(providers))
        .route("/providers/{name}/policy", get(provider_policy))
        .route("/available-providers", get(available_providers))
        .route("/dropping-points/{district}", get(dropping_points))
        .route("/bookings", get(list_bookings).post(create_booking))
        .route("/bookings/phone/{phone}", get(bookings_by_phone))
        .route("/bookings/{id}", get(get_booking).delete(delete_booking))
        .route("/stats", get(stats))
        .route("/query/smart", post(smart_query))
        .route("/chat/{session_id}", get(chat_history).delete(clear_chat))
        .layer(cors)
        .with_state(state)
}

// === Errors ===

/// A [`BusbotError`] rendered as an HTTP response.
///
/// Generation failures become 503 so clients can tell "try again later" apart
/// from an answer that found no information (200 with `grounded: false`).
pub struct ApiError(BusbotError);

impl From<BusbotError> for ApiError {
    fn from(e: BusbotError) -> Self {
        Self(e)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    kind: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            BusbotError::GenerationUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "generation_unavailable")
            }
            BusbotError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            BusbotError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            e if e.is_config() => (StatusCode::INTERNAL_SERVER_ERROR, "configuration"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                kind,
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

// === Request/Response Types ===

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    #[serde(default)]
    top_k: Option<usize>,
    /// Restrict retrieval to this provider instead of detecting one.
    #[serde(default)]
    provider: Option<String>,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
    grounded: bool,
    sources: Vec<SourceInfo>,
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    min_score: Option<f32>,
}

fn default_limit() -> usize {
    5
}

#[derive(Serialize)]
struct SearchResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
    results: Vec<SourceInfo>,
}

#[derive(Serialize)]
struct SourceInfo {
    source_id: String,
    kind: String,
    position: u32,
    label: String,
    content: String,
    score: f32,
}

impl From<ScoredSegment> for SourceInfo {
    fn from(hit: ScoredSegment) -> Self {
        Self {
            label: hit.segment.label(),
            source_id: hit.segment.source_id,
            kind: hit.segment.kind.to_string(),
            position: hit.segment.position,
            content: hit.segment.text,
            score: hit.score,
        }
    }
}

#[derive(Deserialize)]
struct RouteQuery {
    from_district: String,
    to_district: String,
}

#[derive(Deserialize)]
struct DeleteQuery {
    #[serde(default)]
    permanent: bool,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

#[derive(Serialize)]
struct BookingsResponse {
    bookings: Vec<Booking>,
}

#[derive(Deserialize)]
struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    limit: usize,
}

fn default_history_limit() -> usize {
    10
}

#[derive(Serialize)]
struct ChatHistoryResponse {
    session_id: String,
    messages: Vec<ChatMessage>,
}

// === Handlers ===

async fn health(State(state): State<Arc<AppState>>) -> ApiResult<serde_json::Value> {
    let entries = state.pipeline.vector_store().entry_count().await?;
    Ok(Json(serde_json::json!({ "status": "ok", "indexed_segments": entries })))
}

async fn ask(State(state): State<Arc<AppState>>, Json(req): Json<AskRequest>) -> ApiResult<AskResponse> {
    let engine = state.pipeline.engine();
    let k = req.top_k.unwrap_or_else(|| engine.retriever().top_k());

    let answer = engine
        .ask_with(&req.question, k, req.provider.as_deref())
        .await?;

    Ok(Json(AskResponse {
        answer: answer.text,
        grounded: answer.grounded,
        sources: answer.sources.into_iter().map(SourceInfo::from).collect(),
    }))
}

async fn search(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SearchRequest>,
) -> ApiResult<SearchResponse> {
    let result = state
        .pipeline
        .search(&req.query, req.limit, req.min_score)
        .await?;

    Ok(Json(SearchResponse {
        provider: result.provider,
        results: result.hits.into_iter().map(SourceInfo::from).collect(),
    }))
}

async fn ingest(State(state): State<Arc<AppState>>) -> ApiResult<IngestReport> {
    let report = state.pipeline.ingest().await?;
    state.reload_catalog()?;
    Ok(Json(report))
}

async fn districts(State(state): State<Arc<AppState>>) -> ApiResult<serde_json::Value> {
    let catalog = state.catalog()?;
    let body = serde_json::json!({ "districts": catalog.districts() });
    Ok(Json(body))
}

async fn providers(State(state): State<Arc<AppState>>) -> ApiResult<serde_json::Value> {
    let catalog = state.catalog()?;
    let body = serde_json::json!({ "providers": catalog.providers() });
    Ok(Json(body))
}

async fn provider_policy(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<serde_json::Value> {
    match state.pipeline.documents().read_profile(&name)? {
        Some(policy) => Ok(Json(serde_json::json!({ "provider": name, "policy": policy }))),
        None => Err(BusbotError::NotFound(format!("Policy not available for provider '{}'", name)).into()),
    }
}

async fn available_providers(
    State(state): State<Arc<AppState>>,
    Query(route): Query<RouteQuery>,
) -> ApiResult<serde_json::Value> {
    let providers = state
        .catalog()?
        .available_providers(&route.from_district, &route.to_district);

    if providers.is_empty() {
        Ok(Json(serde_json::json!({
            "message": format!(
                "No bus providers operate between {} and {}",
                route.from_district, route.to_district
            ),
            "providers": providers,
        })))
    } else {
        Ok(Json(serde_json::json!({ "providers": providers })))
    }
}

async fn dropping_points(
    State(state): State<Arc<AppState>>,
    Path(district): Path<String>,
) -> ApiResult<serde_json::Value> {
    let catalog = state.catalog()?;
    let points = catalog.dropping_points(&district);

    if points.is_empty() {
        Ok(Json(serde_json::json!({
            "message": format!("No dropping points found for {}", district),
            "dropping_points": points,
        })))
    } else {
        Ok(Json(serde_json::json!({ "dropping_points": points })))
    }
}

async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewBooking>,
) -> std::result::Result<(StatusCode, Json<Booking>), ApiError> {
    let booking = {
        let catalog = state.catalog()?;
        state.bookings.create(&catalog, req)?
    };
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn list_bookings(State(state): State<Arc<AppState>>) -> ApiResult<BookingsResponse> {
    Ok(Json(BookingsResponse {
        bookings: state.bookings.list()?,
    }))
}

async fn bookings_by_phone(
    State(state): State<Arc<AppState>>,
    Path(phone): Path<String>,
) -> ApiResult<BookingsResponse> {
    let bookings = state.bookings.by_phone(&phone)?;
    if bookings.is_empty() {
        return Err(BusbotError::NotFound("No bookings found for this phone number".to_string()).into());
    }
    Ok(Json(BookingsResponse { bookings }))
}

async fn get_booking(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Booking> {
    state
        .bookings
        .get(&id)?
        .map(Json)
        .ok_or_else(|| BusbotError::NotFound(format!("Booking {} not found", id)).into())
}

async fn delete_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> ApiResult<MessageResponse> {
    let (done, message) = if query.permanent {
        (state.bookings.delete(&id)?, format!("Booking {} deleted permanently.", id))
    } else {
        (state.bookings.cancel(&id)?, format!("Booking {} cancelled.", id))
    };

    if done {
        Ok(Json(MessageResponse { message }))
    } else {
        Err(BusbotError::NotFound(format!("Booking {} not found or not active", id)).into())
    }
}

async fn stats(State(state): State<Arc<AppState>>) -> ApiResult<crate::booking::BookingStats> {
    Ok(Json(state.bookings.stats()?))
}

async fn smart_query(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SmartQuery>,
) -> ApiResult<SmartReply> {
    let engine = state.pipeline.engine();
    Ok(Json(state.assistant.respond(req, &state.bookings, &engine).await?))
}

async fn chat_history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<ChatHistoryResponse> {
    let messages = state.bookings.chat_history(&session_id, query.limit)?;
    Ok(Json(ChatHistoryResponse { session_id, messages }))
}

async fn clear_chat(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<MessageResponse> {
    let removed = state.bookings.clear_chat_history(&session_id)?;
    state.assistant.end_session(&session_id)?;
    Ok(Json(MessageResponse {
        message: format!("Cleared {} messages of session {}.", removed, session_id),
    }))
}
