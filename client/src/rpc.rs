use futures::future::{BoxFuture, FutureExt};
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use surfsol_types::Amount;
use tracing::{debug, warn};
use url::Url;

use crate::backoff::{jittered_backoff, next_backoff};
use crate::{BalanceOracle, Error, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const ADDRESS_LEN: usize = 32;

/// How transient RPC failures are retried.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
        }
    }
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct BalanceResult {
    value: u64,
}

/// Solana JSON-RPC client.
pub struct RpcClient {
    http: reqwest::Client,
    url: Url,
    timeout: Duration,
    retry: RetryPolicy,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Error::InvalidScheme(url.scheme().to_string()));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            url,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Lamport balance of `address`, as an [`Amount`].
    pub async fn get_balance(&self, address: &str) -> Result<Amount> {
        validate_address(address)?;
        let result: BalanceResult = self.call("getBalance", json!([address])).await?;
        let lamports = i64::try_from(result.value)
            .map_err(|_| Error::BalanceOutOfRange(result.value))?;
        Ok(Amount::from_units(lamports))
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let response = self.post_with_retry(&body).await?;
        let envelope: RpcResponse<T> = response.json().await?;
        if let Some(error) = envelope.error {
            return Err(Error::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        envelope.result.ok_or(Error::UnexpectedResponse)
    }

    async fn post_with_retry(&self, body: &serde_json::Value) -> Result<reqwest::Response> {
        let attempts = self.retry.max_attempts.max(1);
        let mut backoff = self.retry.initial_backoff;
        let mut attempt = 1;
        loop {
            let result = self
                .http
                .post(self.url.clone())
                .timeout(self.timeout)
                .json(body)
                .send()
                .await;
            match result {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    if attempt >= attempts || !is_retryable_status(status) {
                        let text = response.text().await.unwrap_or_default();
                        return Err(Error::FailedWithBody {
                            status,
                            body: format!("POST {}: {text}", self.url),
                        });
                    }
                    warn!(attempt, %status, url = %self.url, "rpc request failed; retrying");
                }
                Err(err) => {
                    if attempt >= attempts || !is_retryable_error(&err) {
                        return Err(err.into());
                    }
                    warn!(attempt, error = %err, url = %self.url, "rpc request failed; retrying");
                }
            }
            let delay = jittered_backoff(&mut rand::thread_rng(), backoff);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "rpc backoff");
            tokio::time::sleep(delay).await;
            backoff = next_backoff(backoff, self.retry.max_backoff);
            attempt += 1;
        }
    }
}

impl BalanceOracle for RpcClient {
    fn balance<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<Amount>> {
        self.get_balance(address).boxed()
    }
}

fn validate_address(address: &str) -> Result<()> {
    let decoded = bs58::decode(address)
        .into_vec()
        .map_err(|_| Error::InvalidAddress(address.to_string()))?;
    if decoded.len() != ADDRESS_LEN {
        return Err(Error::InvalidAddress(address.to_string()));
    }
    Ok(())
}

fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State as AxumState, http::StatusCode as AxumStatusCode, routing::post};
    use axum::{Json, Router};
    use std::net::SocketAddr;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tokio::time::sleep;

    const ADDRESS: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";

    fn no_wait(max_attempts: usize) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    async fn serve_router(router: Router) -> (String, tokio::task::JoinHandle<()>) {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        let actual_addr = listener.local_addr().unwrap();
        let base_url = format!("http://{actual_addr}");

        let handle = tokio::spawn(async move {
            axum::serve(listener, router.into_make_service())
                .await
                .unwrap();
        });

        sleep(Duration::from_millis(50)).await;
        (base_url, handle)
    }

    #[test]
    fn test_client_url_scheme_validation() {
        let result = RpcClient::new("ftp://example.com");
        let Err(err) = result else {
            panic!("ftp should be rejected");
        };
        assert!(matches!(err, Error::InvalidScheme(_)));
        assert_eq!(
            err.to_string(),
            "invalid URL scheme: ftp (expected http or https)"
        );
        assert!(RpcClient::new("http://localhost:8899").is_ok());
        assert!(RpcClient::new("https://api.mainnet-beta.solana.com").is_ok());
        assert!(matches!(RpcClient::new("not a url"), Err(Error::Url(_))));
    }

    #[test]
    fn test_address_validation() {
        assert!(validate_address(ADDRESS).is_ok());
        assert!(validate_address("0OIl").is_err());
        assert!(validate_address("abc").is_err());
    }

    #[tokio::test]
    async fn test_get_balance_converts_lamports() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let router = Router::new()
            .route(
                "/",
                post(
                    |AxumState(seen): AxumState<Arc<std::sync::Mutex<Option<serde_json::Value>>>>,
                     Json(request): Json<serde_json::Value>| async move {
                        let id = request["id"].clone();
                        *seen.lock().unwrap() = Some(request);
                        Json(json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "result": { "context": { "slot": 1 }, "value": 1_500_000_000u64 },
                        }))
                    },
                ),
            )
            .with_state(seen.clone());

        let (base_url, handle) = serve_router(router).await;
        let client = RpcClient::new(&base_url).unwrap();
        let balance = client.get_balance(ADDRESS).await.unwrap();
        assert_eq!(balance, "1.5".parse().unwrap());

        let request = seen.lock().unwrap().clone().unwrap();
        assert_eq!(request["method"], "getBalance");
        assert_eq!(request["params"][0], ADDRESS);

        handle.abort();
    }

    #[tokio::test]
    async fn test_rpc_error_is_surfaced() {
        let router = Router::new().route(
            "/",
            post(|| async {
                Json(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": { "code": -32602, "message": "Invalid param" },
                }))
            }),
        );

        let (base_url, handle) = serve_router(router).await;
        let client = RpcClient::new(&base_url).unwrap();
        let err = client.get_balance(ADDRESS).await.unwrap_err();
        let Error::Rpc { code, message } = err else {
            panic!("expected rpc error, got {err:?}");
        };
        assert_eq!(code, -32602);
        assert_eq!(message, "Invalid param");

        handle.abort();
    }

    #[tokio::test]
    async fn test_retries_retryable_statuses() {
        let counter = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/",
                post(
                    |AxumState(counter): AxumState<Arc<AtomicUsize>>| async move {
                        let attempt = counter.fetch_add(1, Ordering::SeqCst);
                        if attempt < 2 {
                            Err(AxumStatusCode::SERVICE_UNAVAILABLE)
                        } else {
                            Ok(Json(json!({
                                "jsonrpc": "2.0",
                                "id": 1,
                                "result": { "context": { "slot": 1 }, "value": 0 },
                            })))
                        }
                    },
                ),
            )
            .with_state(counter.clone());

        let (base_url, handle) = serve_router(router).await;
        let client = RpcClient::new(&base_url)
            .unwrap()
            .with_retry_policy(no_wait(3));
        let balance = client.get_balance(ADDRESS).await.unwrap();
        assert_eq!(balance, Amount::ZERO);
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        handle.abort();
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let counter = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/",
                post(
                    |AxumState(counter): AxumState<Arc<AtomicUsize>>| async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        AxumStatusCode::BAD_REQUEST
                    },
                ),
            )
            .with_state(counter.clone());

        let (base_url, handle) = serve_router(router).await;
        let client = RpcClient::new(&base_url)
            .unwrap()
            .with_retry_policy(no_wait(3));
        let err = client.get_balance(ADDRESS).await.unwrap_err();
        let Error::FailedWithBody { status, body } = err else {
            panic!("expected FailedWithBody, got {err:?}");
        };
        assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
        assert!(body.contains("POST"));
        assert!(body.contains(&base_url));
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        handle.abort();
    }

    #[tokio::test]
    async fn test_invalid_address_skips_network() {
        let client = RpcClient::new("http://127.0.0.1:9").unwrap();
        assert!(matches!(
            client.get_balance("not-an-address").await,
            Err(Error::InvalidAddress(_))
        ));
    }
}
