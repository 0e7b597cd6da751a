use anyhow::{Context, Result};
use clap::Parser;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use surfsol_client::{RetryPolicy, RpcClient};
use surfsol_ledger::{ChaChaCipher, Ledger};
use surfsol_server::{Api, Backend, ServerConfig};
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SERVICE_NAME: &str = "surfsol-server";

fn init_tracing() -> Result<()> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .ok()
        .and_then(|value| {
            let trimmed = value.trim().to_string();
            (!trimmed.is_empty()).then_some(trimmed)
        });

    if let Some(endpoint) = endpoint {
        let service_name =
            std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| SERVICE_NAME.to_string());
        let rate = std::env::var("OTEL_SAMPLING_RATE")
            .ok()
            .and_then(|value| value.parse::<f64>().ok())
            .map(|value| value.clamp(0.0, 1.0))
            .unwrap_or(1.0);
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()
            .context("failed to build OTLP exporter")?;
        let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
            .with_sampler(opentelemetry_sdk::trace::Sampler::TraceIdRatioBased(rate))
            .with_resource(
                opentelemetry_sdk::Resource::builder_empty()
                    .with_attributes([opentelemetry::KeyValue::new("service.name", service_name)])
                    .build(),
            )
            .with_batch_exporter(exporter)
            .build();
        let tracer = tracer_provider.tracer(SERVICE_NAME);
        opentelemetry::global::set_tracer_provider(tracer_provider);

        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_filter(LevelFilter::INFO))
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    Ok(())
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host interface to bind (default: localhost).
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Path to the SQLite ledger database.
    #[arg(long, default_value = "surfsol.db")]
    database: PathBuf,

    /// Solana JSON-RPC endpoint used for wallet balances.
    #[arg(long, default_value = "https://api.mainnet-beta.solana.com")]
    rpc_url: String,

    /// Per-request RPC timeout in milliseconds (must be > 0).
    #[arg(long, default_value_t = 10_000)]
    rpc_timeout_ms: u64,

    /// Attempts per RPC call, including the first (must be > 0).
    #[arg(long, default_value_t = 3)]
    rpc_max_attempts: usize,

    /// Maximum HTTP request body size in bytes (0 disables limit).
    #[arg(long)]
    http_body_limit_bytes: Option<usize>,

    /// Sustained per-IP request rate (0 disables rate limiting).
    #[arg(long)]
    http_rate_limit_per_second: Option<u64>,

    /// Per-IP burst size (0 disables rate limiting).
    #[arg(long)]
    http_rate_limit_burst: Option<u32>,

    /// Balance lookups in flight while building the leaderboard (must be > 0).
    #[arg(long)]
    leaderboard_concurrency: Option<usize>,

    /// Telegram bot handle used in referral links.
    #[arg(long)]
    bot_username: Option<String>,

    /// Print a fresh base64 WALLET_CIPHER_KEY and exit.
    #[arg(long)]
    generate_cipher_key: bool,
}

fn is_production() -> bool {
    matches!(
        std::env::var("NODE_ENV").as_deref(),
        Ok("production") | Ok("prod")
    )
}

/// Maps an optional arg value to Option: 0 => None, Some(v) => Some(v), None => default
fn map_optional_limit<T: Copy + PartialEq + From<u8>>(
    arg: Option<T>,
    default: Option<T>,
) -> Option<T> {
    match arg {
        Some(v) if v == T::from(0) => None,
        Some(v) => Some(v),
        None => default,
    }
}

fn optional_env(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_origins(value: Option<String>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(|origin| origin.trim().to_string())
        .filter(|origin| !origin.is_empty())
        .collect()
}

fn build_config(args: &Args) -> Result<ServerConfig> {
    let defaults = ServerConfig::default();
    if args.rpc_timeout_ms == 0 {
        anyhow::bail!("rpc timeout must be > 0");
    }
    if args.rpc_max_attempts == 0 {
        anyhow::bail!("rpc max attempts must be > 0");
    }
    let leaderboard_concurrency = match args.leaderboard_concurrency {
        Some(0) => anyhow::bail!("leaderboard concurrency must be > 0"),
        Some(value) => value,
        None => defaults.leaderboard_concurrency,
    };
    let bot_username = match args.bot_username.as_deref().map(str::trim) {
        Some("") => anyhow::bail!("bot username must not be empty"),
        Some(name) => name.trim_start_matches('@').to_string(),
        None => defaults.bot_username,
    };

    Ok(ServerConfig {
        http_rate_limit_per_second: map_optional_limit(
            args.http_rate_limit_per_second,
            defaults.http_rate_limit_per_second,
        ),
        http_rate_limit_burst: map_optional_limit(
            args.http_rate_limit_burst,
            defaults.http_rate_limit_burst,
        ),
        http_body_limit_bytes: map_optional_limit(
            args.http_body_limit_bytes,
            defaults.http_body_limit_bytes,
        ),
        leaderboard_concurrency,
        bot_username,
        allowed_origins: parse_origins(optional_env("ALLOWED_HTTP_ORIGINS")),
        admin_token: optional_env("ADMIN_AUTH_TOKEN"),
        gateway_token: optional_env("GATEWAY_AUTH_TOKEN"),
        metrics_token: optional_env("METRICS_AUTH_TOKEN"),
    })
}

fn require_env(var: &str) -> Result<String> {
    let value = std::env::var(var).unwrap_or_default();
    if value.trim().is_empty() {
        anyhow::bail!("Missing required env: {var}");
    }
    Ok(value)
}

fn ensure_production_env() -> Result<()> {
    if !is_production() {
        return Ok(());
    }

    require_env("ALLOWED_HTTP_ORIGINS")?;
    require_env("ADMIN_AUTH_TOKEN")?;
    require_env("GATEWAY_AUTH_TOKEN")?;
    require_env("METRICS_AUTH_TOKEN")?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if args.generate_cipher_key {
        println!("{}", ChaChaCipher::generate_key());
        return Ok(());
    }

    init_tracing()?;

    ensure_production_env()?;

    let config = build_config(&args)?;

    let cipher_key = require_env("WALLET_CIPHER_KEY")?;
    let cipher =
        ChaChaCipher::from_base64(cipher_key.trim()).context("invalid WALLET_CIPHER_KEY")?;
    let ledger = Ledger::open(&args.database, Arc::new(cipher))
        .with_context(|| format!("failed to open ledger at {}", args.database.display()))?;
    info!(path = %args.database.display(), "ledger opened");

    let rpc = RpcClient::new(&args.rpc_url)
        .context("invalid rpc url")?
        .with_timeout(Duration::from_millis(args.rpc_timeout_ms))
        .with_retry_policy(RetryPolicy {
            max_attempts: args.rpc_max_attempts,
            ..RetryPolicy::default()
        });
    info!(rpc_url = %rpc.url(), "balance oracle configured");

    let backend = Arc::new(Backend::new(ledger, Arc::new(rpc), config));
    let app = Api::new(backend).router();

    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "surfsol server listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_without_flags() {
        let args = Args::parse_from(["surfsol-server"]);
        let config = build_config(&args).unwrap();
        let defaults = ServerConfig::default();
        assert_eq!(
            config.http_rate_limit_per_second,
            defaults.http_rate_limit_per_second
        );
        assert_eq!(config.http_body_limit_bytes, defaults.http_body_limit_bytes);
        assert_eq!(config.bot_username, "SurfSolCasinoBot");
        assert_eq!(args.database, PathBuf::from("surfsol.db"));
    }

    #[test]
    fn test_zero_disables_limits() {
        let args = Args::parse_from([
            "surfsol-server",
            "--http-rate-limit-per-second",
            "0",
            "--http-body-limit-bytes",
            "0",
            "--http-rate-limit-burst",
            "25",
        ]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.http_rate_limit_per_second, None);
        assert_eq!(config.http_body_limit_bytes, None);
        assert_eq!(config.http_rate_limit_burst, Some(25));
    }

    #[test]
    fn test_rejects_invalid_values() {
        let args = Args::parse_from(["surfsol-server", "--rpc-timeout-ms", "0"]);
        assert!(build_config(&args).is_err());

        let args = Args::parse_from(["surfsol-server", "--rpc-max-attempts", "0"]);
        assert!(build_config(&args).is_err());

        let args = Args::parse_from(["surfsol-server", "--leaderboard-concurrency", "0"]);
        assert!(build_config(&args).is_err());

        let args = Args::parse_from(["surfsol-server", "--bot-username", "  "]);
        assert!(build_config(&args).is_err());
    }

    #[test]
    fn test_bot_username_strips_at_sign() {
        let args = Args::parse_from(["surfsol-server", "--bot-username", "@OtherBot"]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.referral_link("ABCD1234"), "https://t.me/OtherBot?start=ABCD1234");
    }

    #[test]
    fn test_parse_origins() {
        assert_eq!(
            parse_origins(Some(" https://a.example , ,https://b.example".to_string())),
            vec!["https://a.example", "https://b.example"]
        );
        assert!(parse_origins(None).is_empty());
    }

    #[test]
    fn test_generate_cipher_key_flag() {
        let args = Args::parse_from(["surfsol-server"]);
        assert!(!args.generate_cipher_key);
        let args = Args::parse_from(["surfsol-server", "--generate-cipher-key"]);
        assert!(args.generate_cipher_key);

        let key = ChaChaCipher::generate_key();
        assert!(ChaChaCipher::from_base64(&key).is_ok());
        assert_ne!(key, ChaChaCipher::generate_key());
    }

    #[test]
    fn test_map_optional_limit() {
        assert_eq!(map_optional_limit(Some(0u64), Some(5)), None);
        assert_eq!(map_optional_limit(Some(7u64), Some(5)), Some(7));
        assert_eq!(map_optional_limit(None, Some(5u64)), Some(5));
    }
}
