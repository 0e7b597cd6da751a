pub const DEFAULT_HTTP_RATE_LIMIT_PER_SECOND: u64 = 50;
pub const DEFAULT_HTTP_RATE_LIMIT_BURST: u32 = 100;
pub const DEFAULT_HTTP_BODY_LIMIT_BYTES: usize = 64 * 1024;
pub const DEFAULT_LEADERBOARD_CONCURRENCY: usize = 8;
pub const DEFAULT_BOT_USERNAME: &str = "SurfSolCasinoBot";

/// Resolved server settings. `None` limits are disabled.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub http_rate_limit_per_second: Option<u64>,
    pub http_rate_limit_burst: Option<u32>,
    pub http_body_limit_bytes: Option<usize>,
    /// Balance lookups in flight while building the leaderboard.
    pub leaderboard_concurrency: usize,
    /// Bot handle used to build referral links.
    pub bot_username: String,
    pub allowed_origins: Vec<String>,
    /// Required for admin routes; admin access is refused when unset.
    pub admin_token: Option<String>,
    /// Shared secret the bot gateway presents on user routes; open when unset.
    pub gateway_token: Option<String>,
    pub metrics_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_rate_limit_per_second: Some(DEFAULT_HTTP_RATE_LIMIT_PER_SECOND),
            http_rate_limit_burst: Some(DEFAULT_HTTP_RATE_LIMIT_BURST),
            http_body_limit_bytes: Some(DEFAULT_HTTP_BODY_LIMIT_BYTES),
            leaderboard_concurrency: DEFAULT_LEADERBOARD_CONCURRENCY,
            bot_username: DEFAULT_BOT_USERNAME.to_string(),
            allowed_origins: Vec::new(),
            admin_token: None,
            gateway_token: None,
            metrics_token: None,
        }
    }
}

impl ServerConfig {
    pub fn referral_link(&self, code: &str) -> String {
        format!("https://t.me/{}?start={code}", self.bot_username)
    }
}
