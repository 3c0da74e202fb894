use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header::CONTENT_TYPE, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use lmguard_core_models::{AuditRecord, ChatRequest, ChatResponse};
use lmguard_guard::{
    AgenticGuard, Arbiter, CacheConfig, EmbeddingProvider, HashingEmbedder, HttpArbiter,
    OpenAiEmbedder, SemanticCache, UnavailableArbiter,
};
use lmguard_policy::{PolicyConfigError, PolicyStore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{
    AuditFanout, AuditSink, InMemoryAuditLog, JsonlAuditLog, StudentHasher, DEFAULT_LOG_LIMIT,
    MAX_LOG_LIMIT,
};
use crate::config::{EmbeddingBackend, ServiceConfig};
use crate::errors::{ConfigError, PipelineError};
use crate::metrics::InMemoryMetrics;
use crate::pipeline::GuardPipeline;
use crate::review::{InMemoryReviewQueue, ReviewQueue, ReviewTicket};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<GuardPipeline>,
    pub audit_log: Arc<InMemoryAuditLog>,
    pub reviews: Arc<InMemoryReviewQueue>,
    pub metrics: Arc<InMemoryMetrics>,
}

impl AppState {
    /// Wires the pipeline around an already-built guard. The in-memory audit
    /// log, review queue and metrics registry back the admin endpoints.
    pub fn new(policy: Arc<PolicyStore>, guard: AgenticGuard, hasher: StudentHasher) -> Self {
        Self::assemble(policy, guard, hasher, None)
    }

    fn assemble(
        policy: Arc<PolicyStore>,
        guard: AgenticGuard,
        hasher: StudentHasher,
        durable_audit: Option<Arc<dyn AuditSink>>,
    ) -> Self {
        let audit_log = Arc::new(InMemoryAuditLog::default());
        let reviews = Arc::new(InMemoryReviewQueue::default());
        let metrics = Arc::new(InMemoryMetrics::new());
        let mut audit = AuditFanout::new().with(audit_log.clone());
        if let Some(sink) = durable_audit {
            audit = audit.with(sink);
        }
        let pipeline = GuardPipeline::new(policy, guard)
            .with_audit(Arc::new(audit))
            .with_reviews(reviews.clone())
            .with_metrics(metrics.clone())
            .with_hasher(hasher);
        Self {
            pipeline: Arc::new(pipeline),
            audit_log,
            reviews,
            metrics,
        }
    }

    /// Full startup from configuration. Any error here means the service
    /// must not start.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ConfigError> {
        let policy = Arc::new(PolicyStore::from_file(&config.policy_file)?);

        let embedder: Arc<dyn EmbeddingProvider> = match &config.embedding {
            EmbeddingBackend::Local { dimension } => Arc::new(HashingEmbedder::new(*dimension)),
            EmbeddingBackend::OpenAi { model } => Arc::new(OpenAiEmbedder::new(
                &config.openai_base_url,
                config.openai_api_key.clone().unwrap_or_default(),
                model,
                config.arbiter_timeout,
            )?),
        };

        let cache = Arc::new(SemanticCache::new(CacheConfig {
            max_items: config.cache_max_items,
            similarity_threshold: config.cache_similarity,
            dimension: embedder.dimension(),
        })?);

        let arbiter: Arc<dyn Arbiter> = match &config.openai_api_key {
            Some(key) => Arc::new(HttpArbiter::new(
                &config.openai_base_url,
                key,
                &config.arbiter_model,
                config.arbiter_timeout,
            )?),
            None => {
                warn!("OPENAI_API_KEY not set, borderline messages will be blocked");
                Arc::new(UnavailableArbiter)
            }
        };

        let jsonl = JsonlAuditLog::open(&config.audit_log)?;
        info!(path = %jsonl.path().display(), "audit log opened");

        let guard =
            AgenticGuard::new(embedder, cache, arbiter).with_timeout(config.arbiter_timeout);
        Ok(Self::assemble(
            policy,
            guard,
            StudentHasher::new(&config.hash_salt),
            Some(Arc::new(jsonl)),
        ))
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/metrics", get(metrics))
        .route("/admin/logs", get(admin_logs))
        .route("/admin/reviews", get(admin_reviews))
        .route("/admin/reviews/:ticket_id/resolve", post(resolve_review))
        .route("/admin/policy/reload", post(reload_policy))
        .layer(cors)
        .with_state(state)
}

pub enum AppError {
    /// Body that is not a well-formed chat request.
    Malformed(JsonRejection),
    Pipeline(PipelineError),
    Policy(PolicyConfigError),
    TicketNotFound(Uuid),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Malformed(rejection)
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError::Pipeline(err)
    }
}

impl From<PolicyConfigError> for AppError {
    fn from(err: PolicyConfigError) -> Self {
        AppError::Policy(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Malformed(rejection) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": rejection.body_text() })),
            )
                .into_response(),
            AppError::Pipeline(err) => {
                let status = match err {
                    PipelineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                };
                (status, Json(json!({ "error": err.to_string() }))).into_response()
            }
            AppError::Policy(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response(),
            AppError::TicketNotFound(id) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("no pending review ticket {id}") })),
            )
                .into_response(),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    policy_version: u32,
    cache_entries: usize,
}

async fn health(State(app): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        policy_version: app.pipeline.policy().version,
        cache_entries: app.pipeline.guard().cache().len(),
    })
}

async fn chat(
    State(app): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(request) = payload?;
    Ok(Json(app.pipeline.handle(request).await?))
}

async fn metrics(State(app): State<AppState>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        app.metrics.render(),
    )
}

#[derive(Deserialize, Default)]
struct LogsQuery {
    limit: Option<usize>,
}

impl LogsQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT)
    }
}

async fn admin_logs(
    State(app): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Json<Vec<AuditRecord>> {
    Json(app.audit_log.recent(query.limit()))
}

async fn admin_reviews(State(app): State<AppState>) -> Json<Vec<ReviewTicket>> {
    Json(app.reviews.pending())
}

async fn resolve_review(
    State(app): State<AppState>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<ReviewTicket>, AppError> {
    let ticket = app
        .reviews
        .resolve(ticket_id)
        .ok_or(AppError::TicketNotFound(ticket_id))?;
    info!(%ticket_id, "review ticket resolved");
    Ok(Json(ticket))
}

#[derive(Serialize)]
struct ReloadResponse {
    version: u32,
    digest: String,
    rules: usize,
}

async fn reload_policy(State(app): State<AppState>) -> Result<Json<ReloadResponse>, AppError> {
    let snapshot = app.pipeline.reload_policy()?;
    Ok(Json(ReloadResponse {
        version: snapshot.version,
        digest: snapshot.digest.clone(),
        rules: snapshot.rules.len(),
    }))
}
