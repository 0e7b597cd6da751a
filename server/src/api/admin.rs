//! Withdrawal review for the admin console.

use axum::{
    extract::{Path, State as AxumState},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use surfsol_types::WithdrawalId;

use super::{admin_auth_error, with_ledger, ApiError};
use crate::Backend;

pub(super) async fn list_pending(
    headers: HeaderMap,
    AxumState(backend): AxumState<Arc<Backend>>,
) -> Result<Response, ApiError> {
    if let Some(status) = admin_auth_error(&backend, &headers) {
        return Ok(status.into_response());
    }
    let pending = with_ledger(&backend, |ledger| ledger.withdrawals().list_pending()).await?;
    Ok(Json(pending).into_response())
}

pub(super) async fn get_withdrawal(
    headers: HeaderMap,
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(id): Path<WithdrawalId>,
) -> Result<Response, ApiError> {
    if let Some(status) = admin_auth_error(&backend, &headers) {
        return Ok(status.into_response());
    }
    let withdrawal = with_ledger(&backend, move |ledger| ledger.withdrawals().get_withdrawal(id))
        .await?
        .ok_or(ApiError::NotFound("withdrawal"))?;
    Ok(Json(withdrawal).into_response())
}

pub(super) async fn approve(
    headers: HeaderMap,
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(id): Path<WithdrawalId>,
) -> Result<Response, ApiError> {
    if let Some(status) = admin_auth_error(&backend, &headers) {
        return Ok(status.into_response());
    }
    let withdrawal = with_ledger(&backend, move |ledger| ledger.withdrawals().admin_approve(id))
        .await?
        .ok_or(ApiError::NotFound("withdrawal"))?;
    backend.ledger_metrics().inc_withdrawal_approved();
    Ok(Json(withdrawal).into_response())
}

pub(super) async fn reject(
    headers: HeaderMap,
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(id): Path<WithdrawalId>,
) -> Result<Response, ApiError> {
    if let Some(status) = admin_auth_error(&backend, &headers) {
        return Ok(status.into_response());
    }
    let withdrawal = with_ledger(&backend, move |ledger| ledger.withdrawals().admin_reject(id))
        .await?
        .ok_or(ApiError::NotFound("withdrawal"))?;
    backend.ledger_metrics().inc_withdrawal_rejected();
    Ok(Json(withdrawal).into_response())
}
