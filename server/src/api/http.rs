use axum::{
    extract::{Path, State as AxumState},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use surfsol_ledger::Error as LedgerError;
use surfsol_types::{
    Amount, Attribution, Bonus, BonusState, Deposit, GrantOutcome, Referral, RolloverOutcome,
    User, UserId,
};

use super::{metrics_auth_error, with_ledger, ApiError};
use crate::Backend;

#[derive(Serialize)]
struct HealthzResponse {
    ok: bool,
}

pub(super) async fn healthz() -> Response {
    Json(HealthzResponse { ok: true }).into_response()
}

pub(super) async fn metrics(
    headers: HeaderMap,
    AxumState(backend): AxumState<Arc<Backend>>,
) -> Response {
    if let Some(status) = metrics_auth_error(&backend, &headers) {
        return status.into_response();
    }
    Json(backend.metrics_snapshot()).into_response()
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct RegisterRequest {
    #[serde(default)]
    locale: Option<String>,
}

pub(super) async fn register_user(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(user_id): Path<UserId>,
    payload: Option<Json<RegisterRequest>>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload.unwrap_or_default();
    let user = with_ledger(&backend, move |ledger| {
        ledger.accounts().register(user_id, payload.locale.as_deref())
    })
    .await?;
    Ok(Json(user).into_response())
}

pub(super) async fn get_user(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(user_id): Path<UserId>,
) -> Result<Response, ApiError> {
    let user = require_user(&backend, user_id).await?;
    Ok(Json(user).into_response())
}

#[derive(Debug, Deserialize)]
pub(super) struct LocaleRequest {
    locale: String,
}

pub(super) async fn set_locale(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(user_id): Path<UserId>,
    Json(payload): Json<LocaleRequest>,
) -> Result<Response, ApiError> {
    let user = with_ledger(&backend, move |ledger| {
        ledger.accounts().set_locale(user_id, &payload.locale)
    })
    .await?;
    Ok(Json(user).into_response())
}

pub(super) async fn verify_age(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(user_id): Path<UserId>,
) -> Result<Response, ApiError> {
    let user = with_ledger(&backend, move |ledger| ledger.accounts().verify_age(user_id)).await?;
    Ok(Json(user).into_response())
}

pub(super) async fn provision_wallet(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(user_id): Path<UserId>,
) -> Result<Response, ApiError> {
    let provision = with_ledger(&backend, move |ledger| {
        ledger.accounts().provision_wallet(user_id)
    })
    .await?;
    Ok(Json(provision).into_response())
}

#[derive(Serialize)]
struct SecretResponse {
    secret: String,
}

pub(super) async fn export_secret(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(user_id): Path<UserId>,
) -> Result<Response, ApiError> {
    let secret = with_ledger(&backend, move |ledger| ledger.accounts().export_secret(user_id))
        .await?
        .ok_or(ApiError::NotFound("wallet"))?;
    Ok(Json(SecretResponse { secret }).into_response())
}

#[derive(Serialize)]
struct BalanceResponse {
    address: String,
    balance: Amount,
}

pub(super) async fn get_balance(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(user_id): Path<UserId>,
) -> Result<Response, ApiError> {
    let address = require_wallet(&backend, user_id).await?;
    let balance = chain_balance(&backend, &address).await?;
    Ok(Json(BalanceResponse { address, balance }).into_response())
}

#[derive(Debug, Deserialize)]
pub(super) struct DepositRequest {
    amount: Amount,
    #[serde(default)]
    referral_code: Option<String>,
}

pub(super) async fn create_deposit(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(user_id): Path<UserId>,
    Json(payload): Json<DepositRequest>,
) -> Result<Response, ApiError> {
    let start = Instant::now();
    let amount = require_positive(payload.amount, "amount")?;
    let referral_code = payload
        .referral_code
        .map(|code| code.trim().to_string())
        .filter(|code| !code.is_empty());
    let receipt = with_ledger(&backend, move |ledger| {
        if ledger.accounts().get_user(user_id)?.is_none() {
            return Err(LedgerError::UserNotFound(user_id));
        }
        ledger.process_deposit(user_id, amount, referral_code.as_deref())
    })
    .await?;

    let metrics = backend.ledger_metrics();
    metrics.inc_deposit();
    if receipt.bonus.as_ref().is_some_and(GrantOutcome::is_granted) {
        metrics.inc_bonus_granted();
    }
    if let Some(referral) = &receipt.referral {
        metrics.inc_referral(referral.is_applied());
    }
    backend.http_metrics().record_deposit(start.elapsed());
    Ok(Json(receipt).into_response())
}

#[derive(Serialize)]
struct DepositsResponse {
    deposits: Vec<Deposit>,
    initial_deposit: Amount,
}

pub(super) async fn list_deposits(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(user_id): Path<UserId>,
) -> Result<Response, ApiError> {
    let response = with_ledger(&backend, move |ledger| {
        Ok(DepositsResponse {
            deposits: ledger.deposits().list_deposits(user_id)?,
            initial_deposit: ledger.deposits().get_initial_deposit(user_id)?,
        })
    })
    .await?;
    Ok(Json(response).into_response())
}

#[derive(Serialize)]
struct BonusResponse {
    #[serde(flatten)]
    bonus: Bonus,
    state: BonusState,
    remaining_rollover: Amount,
}

impl From<Bonus> for BonusResponse {
    fn from(bonus: Bonus) -> Self {
        Self {
            state: bonus.state(),
            remaining_rollover: bonus.remaining_rollover(),
            bonus,
        }
    }
}

pub(super) async fn get_bonus(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(user_id): Path<UserId>,
) -> Result<Response, ApiError> {
    let bonus = with_ledger(&backend, move |ledger| ledger.bonuses().get_bonus(user_id)).await?;
    Ok(Json(BonusResponse::from(bonus)).into_response())
}

#[derive(Debug, Deserialize)]
pub(super) struct RolloverRequest {
    wagered: Amount,
}

pub(super) async fn apply_rollover(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(user_id): Path<UserId>,
    Json(payload): Json<RolloverRequest>,
) -> Result<Response, ApiError> {
    let wagered = require_positive(payload.wagered, "wagered")?;
    let outcome = with_ledger(&backend, move |ledger| {
        ledger.bonuses().apply_rollover(user_id, wagered)
    })
    .await?;
    if matches!(
        outcome,
        RolloverOutcome::Applied {
            converted: true,
            ..
        }
    ) {
        backend.ledger_metrics().inc_bonus_converted();
    }
    Ok(Json(outcome).into_response())
}

#[derive(Serialize)]
struct ReferralResponse {
    referral_link: String,
    #[serde(flatten)]
    referral: Referral,
}

pub(super) async fn issue_referral(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(user_id): Path<UserId>,
) -> Result<Response, ApiError> {
    let referral = with_ledger(&backend, move |ledger| {
        if ledger.accounts().get_user(user_id)?.is_none() {
            return Err(LedgerError::UserNotFound(user_id));
        }
        ledger.referrals().issue_code(user_id)?;
        ledger.referrals().get_referral_info(user_id)
    })
    .await?
    .ok_or(ApiError::NotFound("referral"))?;
    Ok(Json(referral_response(&backend, referral)).into_response())
}

pub(super) async fn get_referral(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(user_id): Path<UserId>,
) -> Result<Response, ApiError> {
    let referral = with_ledger(&backend, move |ledger| {
        ledger.referrals().get_referral_info(user_id)
    })
    .await?
    .ok_or(ApiError::NotFound("referral"))?;
    Ok(Json(referral_response(&backend, referral)).into_response())
}

fn referral_response(backend: &Backend, referral: Referral) -> ReferralResponse {
    ReferralResponse {
        referral_link: backend.config.referral_link(&referral.referral_code),
        referral,
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct AttributeRequest {
    code: String,
}

#[derive(Serialize)]
struct AttributeResponse {
    attribution: Attribution,
}

pub(super) async fn attribute_referral(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(user_id): Path<UserId>,
    Json(payload): Json<AttributeRequest>,
) -> Result<Response, ApiError> {
    let code = payload.code.trim().to_string();
    if code.is_empty() {
        return Err(ApiError::BadRequest("code must not be empty".to_string()));
    }
    let attribution = with_ledger(&backend, move |ledger| {
        ledger.referrals().attribute(user_id, &code)
    })
    .await?;
    Ok(Json(AttributeResponse { attribution }).into_response())
}

#[derive(Debug, Deserialize)]
pub(super) struct WithdrawalRequest {
    amount: Amount,
    address: String,
}

pub(super) async fn request_withdrawal(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(user_id): Path<UserId>,
    Json(payload): Json<WithdrawalRequest>,
) -> Result<Response, ApiError> {
    let start = Instant::now();
    let amount = require_positive(payload.amount, "amount")?;
    let destination = payload.address.trim().to_string();
    if destination.is_empty() {
        return Err(ApiError::BadRequest("address must not be empty".to_string()));
    }
    let wallet = require_wallet(&backend, user_id).await?;
    let balance = chain_balance(&backend, &wallet).await?;
    let decision = with_ledger(&backend, move |ledger| {
        ledger
            .withdrawals()
            .request_withdrawal(user_id, amount, &destination, balance)
    })
    .await?;
    backend
        .ledger_metrics()
        .inc_withdrawal(decision.is_instant());
    backend.http_metrics().record_withdrawal(start.elapsed());
    Ok(Json(decision).into_response())
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub(super) struct LeaderboardEntry {
    pub rank: usize,
    pub username: String,
    pub balance: Amount,
    pub address: String,
}

pub(super) async fn leaderboard(
    AxumState(backend): AxumState<Arc<Backend>>,
) -> Result<Response, ApiError> {
    let start = Instant::now();
    let holders = with_ledger(&backend, |ledger| ledger.accounts().wallet_holders()).await?;
    let concurrency = backend.config.leaderboard_concurrency.max(1);
    let mut balances: Vec<(User, Amount)> = stream::iter(holders)
        .map(|user| {
            let backend = backend.clone();
            async move {
                let address = user.address.clone().unwrap_or_default();
                let balance = match backend.oracle().balance(&address).await {
                    Ok(balance) => balance,
                    Err(err) => {
                        backend.ledger_metrics().inc_rpc_failure();
                        tracing::warn!(
                            user_id = user.user_id,
                            error = %err,
                            "leaderboard balance lookup failed; counting as zero"
                        );
                        Amount::ZERO
                    }
                };
                (user, balance)
            }
        })
        .buffered(concurrency)
        .collect()
        .await;
    balances.sort_by(|a, b| b.1.cmp(&a.1));

    let entries = balances
        .into_iter()
        .enumerate()
        .map(|(idx, (user, balance))| LeaderboardEntry {
            rank: idx + 1,
            username: hide_username(&format!("User{}", user.user_id)),
            balance,
            address: user.address.unwrap_or_default(),
        })
        .collect::<Vec<_>>();
    backend.http_metrics().record_leaderboard(start.elapsed());
    Ok(Json(entries).into_response())
}

/// Masks a display name for public listings.
pub(super) fn hide_username(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    if chars.is_empty() {
        return "Anonymous".to_string();
    }
    if chars.len() < 4 {
        return name.to_string();
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}***{tail}")
}

async fn require_user(backend: &Backend, user_id: UserId) -> Result<User, ApiError> {
    with_ledger(backend, move |ledger| ledger.accounts().get_user(user_id))
        .await?
        .ok_or(ApiError::Ledger(LedgerError::UserNotFound(user_id)))
}

async fn require_wallet(backend: &Backend, user_id: UserId) -> Result<String, ApiError> {
    let user = require_user(backend, user_id).await?;
    let has_wallet = user.has_wallet();
    user.address
        .filter(|_| has_wallet)
        .ok_or(ApiError::NotFound("wallet"))
}

async fn chain_balance(backend: &Backend, address: &str) -> Result<Amount, ApiError> {
    match backend.oracle().balance(address).await {
        Ok(balance) => Ok(balance),
        Err(err) => {
            backend.ledger_metrics().inc_rpc_failure();
            tracing::warn!(address, error = %err, "balance lookup failed");
            Err(err.into())
        }
    }
}

fn require_positive(amount: Amount, field: &str) -> Result<Amount, ApiError> {
    if amount.is_positive() {
        Ok(amount)
    } else {
        Err(ApiError::BadRequest(format!("{field} must be positive")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hide_username() {
        assert_eq!(hide_username(""), "Anonymous");
        assert_eq!(hide_username("Bob"), "Bob");
        assert_eq!(hide_username("Dave"), "Dav***ve");
        assert_eq!(hide_username("User42"), "Use***42");
        assert_eq!(hide_username("Ñandú12"), "Ñan***12");
    }
}
