//! HTTP surface over the surfsol ledger.
//!
//! [`Backend`] owns the ledger, the chain balance oracle and the server metrics. [`Api`] turns
//! it into an axum router.

use std::sync::Arc;
use surfsol_client::BalanceOracle;
use surfsol_ledger::Ledger;

mod api;
pub mod config;
pub mod metrics;

pub use api::Api;
pub use config::ServerConfig;

use metrics::{HttpMetrics, LedgerMetrics, MetricsSnapshot};

pub struct Backend {
    ledger: Ledger,
    oracle: Arc<dyn BalanceOracle>,
    pub config: ServerConfig,
    ledger_metrics: LedgerMetrics,
    http_metrics: HttpMetrics,
}

impl Backend {
    pub fn new(ledger: Ledger, oracle: Arc<dyn BalanceOracle>, config: ServerConfig) -> Self {
        Self {
            ledger,
            oracle,
            config,
            ledger_metrics: LedgerMetrics::default(),
            http_metrics: HttpMetrics::default(),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn oracle(&self) -> &dyn BalanceOracle {
        self.oracle.as_ref()
    }

    pub fn ledger_metrics(&self) -> &LedgerMetrics {
        &self.ledger_metrics
    }

    pub fn http_metrics(&self) -> &HttpMetrics {
        &self.http_metrics
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ledger: self.ledger_metrics.snapshot(),
            http: self.http_metrics.snapshot(),
        }
    }
}
