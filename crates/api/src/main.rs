use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use analyst_core::analysis::{pipeline, AnalyzeRequest, ReportRequest};
use analyst_core::domain::analysis::AnalysisResult;
use analyst_core::domain::research::{NewResearchProject, ResearchProject};
use analyst_core::llm::error::LlmError;
use analyst_core::llm::{openai::OpenAiClient, ChatClient, ChatCompletion, ChatMessage, ChatRequest};
use analyst_core::storage;

const DEFAULT_CHAT_TEMPERATURE: f64 = 0.7;
const DEFAULT_CHAT_MAX_TOKENS: u32 = 1024;
const HEALTH_KEY: &str = "health:check";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = analyst_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    // Config is validated here, not ad hoc in handlers: a missing provider
    // key fails startup.
    let llm = OpenAiClient::from_settings(&settings)?;

    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let state = AppState {
        pool,
        llm: Arc::new(llm),
        service_token: settings.service_token.clone(),
    };

    let app = router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[derive(Clone)]
struct AppState {
    pool: Option<PgPool>,
    llm: Arc<dyn ChatClient>,
    service_token: Option<String>,
}

fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/ai/chat", post(chat_proxy))
        .route("/analyze", post(analyze_stock))
        .route("/report", post(report_stock))
        .route("/analyses/:symbol/latest", get(get_latest_analysis))
        .route(
            "/research/projects",
            post(create_research_project).get(list_research_projects),
        )
        .route("/research/projects/:id", get(get_research_project))
        .route("/health", get(health))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_bearer,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn healthz() -> &'static str {
    "ok"
}

// Static bearer token, not per-user authorization. Auth is disabled when no
// SERVICE_TOKEN is configured.
async fn require_bearer(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if bearer_ok(state.service_token.as_deref(), presented) {
        next.run(req).await
    } else {
        ApiError::new(StatusCode::UNAUTHORIZED, "invalid or missing bearer token").into_response()
    }
}

fn bearer_ok(expected: Option<&str>, presented: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    match presented.and_then(|v| v.strip_prefix("Bearer ")) {
        Some(token) => token == expected,
        None => false,
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    fn internal(err: &anyhow::Error) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
    }

    /// Timeouts map to 504 so clients can show "try again"; upstream
    /// provider failures map to 502.
    fn from_pipeline(err: anyhow::Error) -> Self {
        let status = match err.downcast_ref::<LlmError>() {
            Some(LlmError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Some(LlmError::Http { .. }) | Some(LlmError::Transport { .. }) => {
                StatusCode::BAD_GATEWAY
            }
            None => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            sentry_anyhow::capture_anyhow(&err);
        }
        Self::new(status, format!("{err:#}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatProxyRequest {
    messages: Vec<ChatMessage>,
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    max_tokens: Option<u32>,
}

async fn chat_proxy(
    State(state): State<AppState>,
    Json(body): Json<ChatProxyRequest>,
) -> Result<Json<ChatCompletion>, ApiError> {
    if body.messages.is_empty() {
        return Err(ApiError::bad_request("messages must be non-empty"));
    }

    let completion = state
        .llm
        .chat(ChatRequest {
            messages: body.messages,
            temperature: body.temperature.unwrap_or(DEFAULT_CHAT_TEMPERATURE),
            max_tokens: body.max_tokens.unwrap_or(DEFAULT_CHAT_MAX_TOKENS),
        })
        .await
        .map_err(|e| ApiError::from_pipeline(e.into()))?;

    Ok(Json(completion))
}

async fn analyze_stock(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeRequest>,
) -> Result<Json<AnalysisResult>, ApiError> {
    body.validate()
        .map_err(|e| ApiError::bad_request(format!("{e:#}")))?;

    let result = pipeline::analyze(state.llm.as_ref(), &body)
        .await
        .map_err(ApiError::from_pipeline)?;

    if let Some(pool) = &state.pool {
        if let Err(err) = storage::analyses::persist(pool, &result).await {
            sentry_anyhow::capture_anyhow(&err);
            tracing::warn!(symbol = %result.symbol, error = %err, "failed to persist analysis snapshot");
        }
    }

    Ok(Json(result))
}

#[derive(Debug, Serialize)]
struct ReportResponse {
    report: String,
}

async fn report_stock(
    State(state): State<AppState>,
    Json(body): Json<ReportRequest>,
) -> Result<Json<ReportResponse>, ApiError> {
    body.validate()
        .map_err(|e| ApiError::bad_request(format!("{e:#}")))?;

    let report = pipeline::report(state.llm.as_ref(), &body)
        .await
        .map_err(ApiError::from_pipeline)?;

    Ok(Json(ReportResponse { report }))
}

async fn get_latest_analysis(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<AnalysisResult>, ApiError> {
    let Some(pool) = &state.pool else {
        return Err(ApiError::service_unavailable("database unavailable"));
    };

    let result = storage::analyses::fetch_latest(pool, &symbol)
        .await
        .map_err(|e| {
            sentry_anyhow::capture_anyhow(&e);
            ApiError::internal(&e)
        })?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("no analysis for {symbol}")))?;

    Ok(Json(result))
}

async fn create_research_project(
    State(state): State<AppState>,
    Json(body): Json<NewResearchProject>,
) -> Result<(StatusCode, Json<ResearchProject>), ApiError> {
    let Some(pool) = &state.pool else {
        return Err(ApiError::service_unavailable("database unavailable"));
    };

    let project = body
        .into_project(Utc::now())
        .map_err(|e| ApiError::bad_request(format!("{e:#}")))?;

    storage::research::save_project(pool, &project)
        .await
        .map_err(|e| {
            sentry_anyhow::capture_anyhow(&e);
            ApiError::internal(&e)
        })?;

    Ok((StatusCode::CREATED, Json(project)))
}

async fn list_research_projects(
    State(state): State<AppState>,
) -> Result<Json<Vec<ResearchProject>>, ApiError> {
    let Some(pool) = &state.pool else {
        return Err(ApiError::service_unavailable("database unavailable"));
    };

    let projects = storage::research::list_projects(pool).await.map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        ApiError::internal(&e)
    })?;

    Ok(Json(projects))
}

async fn get_research_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ResearchProject>, ApiError> {
    let Some(pool) = &state.pool else {
        return Err(ApiError::service_unavailable("database unavailable"));
    };

    let project = storage::research::load_project(pool, id)
        .await
        .map_err(|e| {
            sentry_anyhow::capture_anyhow(&e);
            ApiError::internal(&e)
        })?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("no project {id}")))?;

    Ok(Json(project))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
    database: &'static str,
}

/// Deep health check: round-trips a value through the KV store.
async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let Some(pool) = &state.pool else {
        return Err(ApiError::service_unavailable("database unavailable"));
    };

    let timestamp = Utc::now();
    let probe = serde_json::json!({ "timestamp": timestamp });

    let round_trip = async {
        storage::kv::set(pool, HEALTH_KEY, &probe).await?;
        let got = storage::kv::get(pool, HEALTH_KEY).await?;
        anyhow::ensure!(
            got.as_ref() == Some(&probe),
            "kv round-trip returned a different value"
        );
        storage::kv::delete(pool, HEALTH_KEY).await?;
        anyhow::Ok(())
    }
    .await;

    match round_trip {
        Ok(()) => Ok(Json(HealthResponse {
            status: "ok",
            timestamp,
            database: "reachable",
        })),
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            Err(ApiError::internal(&err))
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &analyst_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyst_core::domain::analysis::Recommendation;
    use analyst_core::llm::Provider;

    struct StubLlm {
        reply: Result<String, LlmError>,
    }

    #[async_trait::async_trait]
    impl ChatClient for StubLlm {
        fn provider(&self) -> Provider {
            Provider::OpenAi
        }

        async fn chat(&self, _req: ChatRequest) -> Result<ChatCompletion, LlmError> {
            match &self.reply {
                Ok(content) => Ok(ChatCompletion {
                    content: content.clone(),
                    tokens_used: Some(7),
                    model: Some("stub".to_string()),
                    latency_ms: 1,
                }),
                Err(err) => Err(err.clone()),
            }
        }
    }

    fn state_with(reply: Result<String, LlmError>) -> AppState {
        AppState {
            pool: None,
            llm: Arc::new(StubLlm { reply }),
            service_token: None,
        }
    }

    fn acme_body() -> AnalyzeRequest {
        serde_json::from_value(serde_json::json!({
            "stock": {
                "symbol": "ACME",
                "name": "Acme Corp",
                "price": 100.0,
                "changePercent": 2.5,
                "marketCap": 5e9,
                "pe": 15.0,
                "volume": 2e6
            },
            "historicalData": [{"high": 110.0, "low": 90.0, "close": 100.0}],
            "news": [{"title": "ACME beats earnings"}]
        }))
        .unwrap()
    }

    #[test]
    fn bearer_check_accepts_exact_token_only() {
        assert!(bearer_ok(None, None));
        assert!(bearer_ok(Some("anon"), Some("Bearer anon")));
        assert!(!bearer_ok(Some("anon"), Some("Bearer other")));
        assert!(!bearer_ok(Some("anon"), Some("anon")));
        assert!(!bearer_ok(Some("anon"), None));
    }

    #[tokio::test]
    async fn analyze_returns_parsed_result() {
        let state = state_with(Ok("Recommendation: BUY\nTarget Price: $120.00".to_string()));
        let Json(result) = analyze_stock(State(state), Json(acme_body())).await.unwrap();
        assert_eq!(result.recommendation, Recommendation::Buy);
        assert_eq!(result.target_price, Some(120.0));
        assert!(result.risks.len() <= 3);
    }

    #[tokio::test]
    async fn analyze_rejects_empty_series_with_400() {
        let state = state_with(Ok("unused".to_string()));
        let mut body = acme_body();
        body.historical_data.clear();
        let err = analyze_stock(State(state), Json(body)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn timeout_maps_to_504() {
        let state = state_with(Err(LlmError::Timeout { after_secs: 45 }));
        let err = analyze_stock(State(state), Json(acme_body())).await.unwrap_err();
        assert_eq!(err.status, StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn upstream_http_failure_maps_to_502() {
        let state = state_with(Err(LlmError::Http {
            status: 429,
            body: "rate limited".to_string(),
        }));
        let err = analyze_stock(State(state), Json(acme_body())).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn chat_proxy_requires_messages() {
        let state = state_with(Ok("hi".to_string()));
        let err = chat_proxy(
            State(state),
            Json(ChatProxyRequest {
                messages: vec![],
                temperature: None,
                max_tokens: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_without_pool_is_503() {
        let state = state_with(Ok("unused".to_string()));
        let err = health(State(state)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
