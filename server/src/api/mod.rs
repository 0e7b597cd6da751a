use axum::{
    extract::{DefaultBodyLimit, Request, State as AxumState},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use governor::middleware::NoOpMiddleware;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use surfsol_ledger::Ledger;
use thiserror::Error;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::Backend;

mod admin;
mod http;

const REQUEST_ID_HEADER: &str = "x-request-id";
const GATEWAY_TOKEN_HEADER: &str = "x-gateway-token";
const ADMIN_TOKEN_HEADER: &str = "x-admin-token";
const METRICS_TOKEN_HEADER: &str = "x-metrics-token";

pub struct Api {
    backend: Arc<Backend>,
}

type IpGovernorConfig =
    tower_governor::governor::GovernorConfig<SmartIpKeyExtractor, NoOpMiddleware>;

fn default_governor_config() -> Option<IpGovernorConfig> {
    GovernorConfigBuilder::default()
        .key_extractor(SmartIpKeyExtractor)
        .finish()
}

impl Api {
    pub fn new(backend: Arc<Backend>) -> Self {
        Self { backend }
    }

    pub fn router(&self) -> Router {
        let config = &self.backend.config;
        let allow_any_origin = config.allowed_origins.iter().any(|origin| origin == "*");
        if config.allowed_origins.is_empty() {
            tracing::warn!("ALLOWED_HTTP_ORIGINS is empty; all browser origins will be rejected");
        }
        let cors_origins = config
            .allowed_origins
            .iter()
            .filter(|origin| *origin != "*")
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Invalid origin in ALLOWED_HTTP_ORIGINS: {}", origin);
                    None
                }
            })
            .collect::<Vec<_>>();

        let cors = if allow_any_origin {
            CorsLayer::new().allow_origin(AllowOrigin::any())
        } else {
            CorsLayer::new().allow_origin(AllowOrigin::list(cors_origins))
        }
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::HeaderName::from_static(REQUEST_ID_HEADER),
        ])
        .expose_headers([header::HeaderName::from_static(REQUEST_ID_HEADER)]);

        let governor_conf = match (
            config.http_rate_limit_per_second,
            config.http_rate_limit_burst,
        ) {
            (Some(rate_per_second), Some(burst_size)) if rate_per_second > 0 && burst_size > 0 => {
                let nanos_per_request = (1_000_000_000u64 / rate_per_second).max(1);
                let period = Duration::from_nanos(nanos_per_request);
                let config = GovernorConfigBuilder::default()
                    .period(period)
                    .burst_size(burst_size)
                    .key_extractor(SmartIpKeyExtractor)
                    .finish()
                    .or_else(|| {
                        tracing::warn!("invalid rate-limit config; falling back to defaults");
                        default_governor_config()
                    });
                config.map(Arc::new)
            }
            _ => None,
        };

        let user_routes = Router::new()
            .route(
                "/users/:user_id",
                get(http::get_user).post(http::register_user),
            )
            .route("/users/:user_id/locale", post(http::set_locale))
            .route("/users/:user_id/verify", post(http::verify_age))
            .route("/users/:user_id/wallet", post(http::provision_wallet))
            .route("/users/:user_id/wallet/secret", get(http::export_secret))
            .route("/users/:user_id/balance", get(http::get_balance))
            .route(
                "/users/:user_id/deposits",
                get(http::list_deposits).post(http::create_deposit),
            )
            .route("/users/:user_id/bonus", get(http::get_bonus))
            .route("/users/:user_id/bonus/rollover", post(http::apply_rollover))
            .route(
                "/users/:user_id/referral",
                get(http::get_referral).post(http::issue_referral),
            )
            .route(
                "/users/:user_id/referral/attribute",
                post(http::attribute_referral),
            )
            .route(
                "/users/:user_id/withdrawals",
                post(http::request_withdrawal),
            )
            .route("/leaderboard", get(http::leaderboard))
            .route_layer(middleware::from_fn_with_state(
                self.backend.clone(),
                gateway_auth_middleware,
            ));

        let router = Router::new()
            .route("/healthz", get(http::healthz))
            .route("/metrics", get(http::metrics))
            .route("/admin/withdrawals", get(admin::list_pending))
            .route("/admin/withdrawals/:id", get(admin::get_withdrawal))
            .route("/admin/withdrawals/:id/approve", post(admin::approve))
            .route("/admin/withdrawals/:id/reject", post(admin::reject))
            .merge(user_routes);

        let router = match governor_conf {
            Some(config) => router.layer(GovernorLayer { config }),
            None => router,
        };
        let router = router.layer(cors);
        let router = match config.http_body_limit_bytes {
            Some(limit) if limit > 0 => router.layer(DefaultBodyLimit::max(limit)),
            _ => router,
        };
        let router = router.layer(middleware::from_fn_with_state(
            self.backend.clone(),
            request_id_middleware,
        ));
        let router = router.layer(TraceLayer::new_for_http());

        router.with_state(self.backend.clone())
    }
}

async fn request_id_middleware(
    AxumState(backend): AxumState<Arc<Backend>>,
    req: Request,
    next: Next,
) -> Response {
    let request_id = req
        .headers()
        .get(header::HeaderName::from_static(REQUEST_ID_HEADER))
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    let mut response = next.run(req).await;
    match response.status() {
        StatusCode::UNAUTHORIZED => backend.http_metrics().inc_reject_unauthorized(),
        StatusCode::PAYLOAD_TOO_LARGE => backend.http_metrics().inc_reject_body_limit(),
        StatusCode::TOO_MANY_REQUESTS => backend.http_metrics().inc_reject_rate_limit(),
        _ => {}
    }
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(
            header::HeaderName::from_static(REQUEST_ID_HEADER),
            header_value,
        );
    }
    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "http.request"
    );
    response
}

async fn gateway_auth_middleware(
    AxumState(backend): AxumState<Arc<Backend>>,
    req: Request,
    next: Next,
) -> Response {
    if let Some(status) = token_auth_error(
        req.headers(),
        backend.config.gateway_token.as_deref(),
        GATEWAY_TOKEN_HEADER,
    ) {
        return status.into_response();
    }
    next.run(req).await
}

/// `None` when no token is configured or the request presents it.
fn token_auth_error(
    headers: &HeaderMap,
    token: Option<&str>,
    header_name: &str,
) -> Option<StatusCode> {
    let token = token.unwrap_or_default();
    if token.is_empty() {
        return None;
    }
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    let header_token = headers
        .get(header_name)
        .and_then(|value| value.to_str().ok());
    if bearer == Some(token) || header_token == Some(token) {
        None
    } else {
        Some(StatusCode::UNAUTHORIZED)
    }
}

fn metrics_auth_error(backend: &Backend, headers: &HeaderMap) -> Option<StatusCode> {
    token_auth_error(
        headers,
        backend.config.metrics_token.as_deref(),
        METRICS_TOKEN_HEADER,
    )
}

/// Admin access is refused outright when no admin token is configured.
fn admin_auth_error(backend: &Backend, headers: &HeaderMap) -> Option<StatusCode> {
    match backend.config.admin_token.as_deref() {
        None | Some("") => Some(StatusCode::UNAUTHORIZED),
        token => token_auth_error(headers, token, ADMIN_TOKEN_HEADER),
    }
}

#[derive(Error, Debug)]
pub(crate) enum ApiError {
    #[error(transparent)]
    Ledger(#[from] surfsol_ledger::Error),
    #[error(transparent)]
    Chain(#[from] surfsol_client::Error),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    BadRequest(String),
    #[error("ledger task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        use surfsol_ledger::Error as LedgerError;
        match self {
            Self::Ledger(LedgerError::InsufficientBalance(_))
            | Self::Ledger(LedgerError::InvalidAccount(_))
            | Self::Ledger(LedgerError::AmountOverflow(_))
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Ledger(LedgerError::UserNotFound(_)) | Self::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::Chain(surfsol_client::Error::InvalidAddress(_)) => StatusCode::BAD_REQUEST,
            Self::Chain(_) => StatusCode::BAD_GATEWAY,
            Self::Ledger(_) | Self::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Runs a ledger call on the blocking pool; every store access takes the SQLite lock.
async fn with_ledger<T, F>(backend: &Backend, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Ledger) -> surfsol_ledger::Result<T> + Send + 'static,
{
    let ledger = backend.ledger().clone();
    Ok(tokio::task::spawn_blocking(move || f(&ledger)).await??)
}
