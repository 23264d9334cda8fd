//! API Handlers
//!
//! HTTP request handlers for each endpoint. Handlers only render decisions
//! made by the cache, invalidation and rate-limit layers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::cache::{CacheAside, CacheStore, KeyBuilder, KvBackend};
use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::invalidation::{namespaces, EntityType, InvalidationRouter};
use crate::models::{
    AiRequest, AiResponse, DeleteResponse, GetResponse, HealthResponse, InvalidateQuery,
    InvalidateResponse, MetricsQuery, MetricsResponse, SetRequest, SetResponse,
};
use crate::monitor::{CacheMonitor, DEFAULT_FOOTPRINT_SAMPLE};
use crate::provider::{AiProvider, Completion};
use crate::ratelimit::{
    apply_headers, CallerIdentity, OperationClass, RateLimitPolicy, RateLimitRejection,
    RateLimiter,
};

/// Set to "true" when a gated response was served from cache.
pub const CACHED_HEADER: HeaderName = HeaderName::from_static("x-cached");

const DEFAULT_TOP_KEYS: usize = 10;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: CacheStore,
    pub aside: CacheAside,
    pub monitor: Arc<CacheMonitor>,
    pub invalidation: InvalidationRouter,
    pub limiter: RateLimiter,
    pub provider: Arc<dyn AiProvider>,
    /// TTL for entries written without an explicit one, in seconds
    pub default_ttl: u64,
    pub ai_timeout: Duration,
}

impl AppState {
    /// Wires every layer over one backend, using the limits and timeouts
    /// from `config`.
    pub fn new(
        backend: Arc<dyn KvBackend>,
        config: &Config,
        provider: Arc<dyn AiProvider>,
    ) -> Self {
        let store = CacheStore::new(backend, Duration::from_millis(config.store_timeout_ms));
        let monitor = Arc::new(CacheMonitor::new());

        let mut aside = CacheAside::new(store.clone(), monitor.clone());
        if config.single_flight {
            aside = aside.with_single_flight();
        }

        let limiter = OperationClass::ALL.iter().fold(
            RateLimiter::new(store.clone(), config.rate_limit_failure_policy),
            |limiter, &op| limiter.with_policy(op, RateLimitPolicy::for_operation(op, config)),
        );

        Self {
            invalidation: InvalidationRouter::new(store.clone()),
            store,
            aside,
            monitor,
            limiter,
            provider,
            default_ttl: config.default_ttl,
            ai_timeout: Duration::from_secs(config.ai_timeout_secs),
        }
    }
}

/// Handler for GET /health
///
/// Reports "degraded" rather than failing when the store is unreachable;
/// reads still work, they just always miss.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let reachable = match state.store.ping().await {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, "health check: store unreachable");
            false
        }
    };
    Json(HealthResponse::new(state.store.backend_name(), reachable))
}

/// Handler for GET /metrics
pub async fn metrics_handler(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> Json<MetricsResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_TOP_KEYS);
    let footprint = state
        .monitor
        .estimate_footprint(&state.store, DEFAULT_FOOTPRINT_SAMPLE)
        .await;

    Json(MetricsResponse {
        global: state.monitor.global_metrics(),
        top_keys: state.monitor.top_keys(limit),
        footprint,
    })
}

/// Handler for PUT /cache
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(ApiError::InvalidRequest(error_msg));
    }

    let ttl = req.ttl.unwrap_or(state.default_ttl);
    state.store.try_set(&req.key, &req.value, ttl).await?;

    Ok(Json(SetResponse::new(req.key, ttl)))
}

/// Handler for GET /cache/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    match state.store.try_get::<serde_json::Value>(&key).await? {
        Some(value) => Ok(Json(GetResponse::new(key, value))),
        None => Err(ApiError::NotFound(key)),
    }
}

/// Handler for DELETE /cache/:key
///
/// Idempotent: deleting an absent key reports zero removals.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let removed = state.store.try_delete_many(&[key.clone()]).await?;
    Ok(Json(DeleteResponse::new(key, removed)))
}

/// Handler for POST /invalidate/:entity/:id
///
/// Called by write paths after a mutation commits. `?parent=` also purges
/// the parent entity's families.
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    Query(query): Query<InvalidateQuery>,
) -> Result<Json<InvalidateResponse>> {
    let entity: EntityType = entity.parse().map_err(ApiError::InvalidRequest)?;
    if id.is_empty() {
        return Err(ApiError::InvalidRequest("Entity id cannot be empty".to_string()));
    }

    let reports = state
        .invalidation
        .invalidate_cascade(entity, &id, query.parent.as_deref())
        .await;

    Ok(Json(InvalidateResponse::new(reports)))
}

/// Handler for POST /ai/:operation
///
/// The gated path: the limiter is consulted before anything else, and a
/// denied request never reaches the cache or the provider. Allowed requests
/// are answered through cache-aside keyed by operation, prompt and lesson.
pub async fn ai_handler(
    State(state): State<AppState>,
    Path(operation): Path<String>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(req): Json<AiRequest>,
) -> Result<Response> {
    let operation: OperationClass = operation.parse().map_err(ApiError::InvalidRequest)?;
    if let Some(error_msg) = req.validate() {
        return Err(ApiError::InvalidRequest(error_msg));
    }

    let caller = CallerIdentity::from_request(&headers, peer.map(|ConnectInfo(addr)| addr));
    let decision = state.limiter.check(operation, &caller.as_key()).await;
    if !decision.allowed {
        debug!(operation = %operation, caller = %caller, "gated request denied");
        return Err(RateLimitRejection::new(decision, Utc::now()).into());
    }

    let key = ai_cache_key(operation, &req);

    let provider = state.provider.clone();
    let timeout = state.ai_timeout;
    let prompt = req.prompt;
    let cached = state
        .aside
        .with_cache(&key, state.default_ttl, || async move {
            call_provider(provider.as_ref(), operation, &prompt, timeout).await
        })
        .await?;

    let mut response = Json(AiResponse {
        completion: cached.value,
        cached: cached.hit,
    })
    .into_response();

    let response_headers = response.headers_mut();
    apply_headers(&decision, response_headers);
    response_headers.insert(CACHED_HEADER, HeaderValue::from_static(bool_str(cached.hit)));
    Ok(response)
}

/// Cache key for a gated call. The prompt enters as a SHA-256 digest so key
/// size stays fixed whatever the caller sends.
fn ai_cache_key(operation: OperationClass, req: &AiRequest) -> String {
    KeyBuilder::new(format!("ai:{}", operation))
        .param("promptHash", hex::encode(Sha256::digest(req.prompt.as_bytes())))
        .param(namespaces::LESSON_ID, req.lesson_id.as_deref())
        .build()
}

async fn call_provider(
    provider: &dyn AiProvider,
    operation: OperationClass,
    prompt: &str,
    timeout: Duration,
) -> Result<Completion> {
    match tokio::time::timeout(timeout, provider.complete(operation, prompt)).await {
        Ok(Ok(completion)) => Ok(completion),
        Ok(Err(message)) => {
            warn!(operation = %operation, error = %message, "provider call failed");
            Err(ApiError::Upstream(message))
        }
        Err(_) => {
            warn!(operation = %operation, timeout_secs = timeout.as_secs(), "provider call timed out");
            Err(ApiError::UpstreamTimeout(timeout.as_secs()))
        }
    }
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}
