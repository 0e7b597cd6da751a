use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const LATENCY_BUCKET_COUNT: usize = 12;
const LATENCY_BUCKETS_MS: [u64; LATENCY_BUCKET_COUNT] =
    [1, 2, 5, 10, 25, 50, 100, 250, 500, 1000, 2500, 5000];

#[derive(Clone, Debug, Serialize)]
pub struct LatencySnapshot {
    pub buckets_ms: Vec<u64>,
    pub counts: Vec<u64>,
    pub overflow: u64,
    pub count: u64,
    pub avg_ms: f64,
    pub max_ms: u64,
}

#[derive(Default)]
struct LatencyMetrics {
    buckets: [AtomicU64; LATENCY_BUCKET_COUNT],
    overflow: AtomicU64,
    count: AtomicU64,
    total_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl LatencyMetrics {
    fn record(&self, duration: Duration) {
        let ms = duration.as_millis() as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(ms, Ordering::Relaxed);
        self.max_ms.fetch_max(ms, Ordering::Relaxed);

        match LATENCY_BUCKETS_MS.iter().position(|bucket| ms <= *bucket) {
            Some(idx) => self.buckets[idx].fetch_add(1, Ordering::Relaxed),
            None => self.overflow.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn snapshot(&self) -> LatencySnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let total_ms = self.total_ms.load(Ordering::Relaxed);
        let avg_ms = if count > 0 {
            total_ms as f64 / count as f64
        } else {
            0.0
        };
        LatencySnapshot {
            buckets_ms: LATENCY_BUCKETS_MS.to_vec(),
            counts: self
                .buckets
                .iter()
                .map(|bucket| bucket.load(Ordering::Relaxed))
                .collect(),
            overflow: self.overflow.load(Ordering::Relaxed),
            count,
            avg_ms,
            max_ms: self.max_ms.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct HttpMetricsSnapshot {
    pub deposit: LatencySnapshot,
    pub withdrawal: LatencySnapshot,
    pub leaderboard: LatencySnapshot,
    pub reject_unauthorized: u64,
    pub reject_rate_limit: u64,
    pub reject_body_limit: u64,
}

#[derive(Default)]
pub struct HttpMetrics {
    deposit: LatencyMetrics,
    withdrawal: LatencyMetrics,
    leaderboard: LatencyMetrics,
    reject_unauthorized: AtomicU64,
    reject_rate_limit: AtomicU64,
    reject_body_limit: AtomicU64,
}

impl HttpMetrics {
    pub fn record_deposit(&self, duration: Duration) {
        self.deposit.record(duration);
    }

    pub fn record_withdrawal(&self, duration: Duration) {
        self.withdrawal.record(duration);
    }

    pub fn record_leaderboard(&self, duration: Duration) {
        self.leaderboard.record(duration);
    }

    pub fn inc_reject_unauthorized(&self) {
        self.reject_unauthorized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reject_rate_limit(&self) {
        self.reject_rate_limit.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reject_body_limit(&self) {
        self.reject_body_limit.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HttpMetricsSnapshot {
        HttpMetricsSnapshot {
            deposit: self.deposit.snapshot(),
            withdrawal: self.withdrawal.snapshot(),
            leaderboard: self.leaderboard.snapshot(),
            reject_unauthorized: self.reject_unauthorized.load(Ordering::Relaxed),
            reject_rate_limit: self.reject_rate_limit.load(Ordering::Relaxed),
            reject_body_limit: self.reject_body_limit.load(Ordering::Relaxed),
        }
    }
}

/// Counters for ledger state transitions driven through the API.
#[derive(Default)]
pub struct LedgerMetrics {
    deposits: AtomicU64,
    bonuses_granted: AtomicU64,
    bonuses_converted: AtomicU64,
    referrals_applied: AtomicU64,
    referrals_ignored: AtomicU64,
    withdrawals_instant: AtomicU64,
    withdrawals_queued: AtomicU64,
    withdrawals_approved: AtomicU64,
    withdrawals_rejected: AtomicU64,
    rpc_failures: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LedgerMetricsSnapshot {
    pub deposits: u64,
    pub bonuses_granted: u64,
    pub bonuses_converted: u64,
    pub referrals_applied: u64,
    pub referrals_ignored: u64,
    pub withdrawals_instant: u64,
    pub withdrawals_queued: u64,
    pub withdrawals_approved: u64,
    pub withdrawals_rejected: u64,
    pub rpc_failures: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl LedgerMetrics {
    pub fn inc_deposit(&self) {
        bump(&self.deposits);
    }

    pub fn inc_bonus_granted(&self) {
        bump(&self.bonuses_granted);
    }

    pub fn inc_bonus_converted(&self) {
        bump(&self.bonuses_converted);
    }

    pub fn inc_referral(&self, applied: bool) {
        if applied {
            bump(&self.referrals_applied);
        } else {
            bump(&self.referrals_ignored);
        }
    }

    pub fn inc_withdrawal(&self, instant: bool) {
        if instant {
            bump(&self.withdrawals_instant);
        } else {
            bump(&self.withdrawals_queued);
        }
    }

    pub fn inc_withdrawal_approved(&self) {
        bump(&self.withdrawals_approved);
    }

    pub fn inc_withdrawal_rejected(&self) {
        bump(&self.withdrawals_rejected);
    }

    pub fn inc_rpc_failure(&self) {
        bump(&self.rpc_failures);
    }

    pub fn snapshot(&self) -> LedgerMetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        LedgerMetricsSnapshot {
            deposits: load(&self.deposits),
            bonuses_granted: load(&self.bonuses_granted),
            bonuses_converted: load(&self.bonuses_converted),
            referrals_applied: load(&self.referrals_applied),
            referrals_ignored: load(&self.referrals_ignored),
            withdrawals_instant: load(&self.withdrawals_instant),
            withdrawals_queued: load(&self.withdrawals_queued),
            withdrawals_approved: load(&self.withdrawals_approved),
            withdrawals_rejected: load(&self.withdrawals_rejected),
            rpc_failures: load(&self.rpc_failures),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct MetricsSnapshot {
    pub ledger: LedgerMetricsSnapshot,
    pub http: HttpMetricsSnapshot,
}
