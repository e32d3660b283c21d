//! Wallet operation handlers
//!
//! Deposits and transfers are step-up gated: `begin` parks the operation and
//! returns assertion options, `complete` verifies the assertion and applies
//! the parked command to the ledger. Balance and history are plain reads.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use passgate_core::{AuthenticationOptions, AuthenticationResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;
use crate::wallet::{Transaction, WalletCommand};

#[derive(Debug, Deserialize, ToSchema)]
pub struct DepositBeginRequest {
    pub username: String,
    /// Amount in cents, 1..=10000 per transaction.
    pub amount: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TransferBeginRequest {
    pub username: String,
    /// Recipient username.
    pub to: String,
    pub amount: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StepUpBeginResponse {
    #[schema(value_type = String)]
    pub operation_id: Uuid,
    #[schema(value_type = String)]
    pub expires_at: DateTime<Utc>,
    /// PublicKeyCredentialRequestOptions for the step-up assertion.
    #[schema(value_type = Object)]
    pub options: AuthenticationOptions,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StepUpCompleteRequest {
    pub username: String,
    #[schema(value_type = String)]
    pub operation_id: Uuid,
    /// The authenticator's assertion response for the step-up challenge.
    #[schema(value_type = Object)]
    pub credential: AuthenticationResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MutationResponse {
    pub verified: bool,
    #[schema(value_type = String)]
    pub operation_id: Uuid,
    /// Actor's balance after the mutation, in cents.
    pub balance: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BalanceResponse {
    pub username: String,
    pub balance: i64,
}

/// POST /wallet/deposit/begin
///
/// Park a deposit and start its step-up ceremony.
#[utoipa::path(
    post,
    path = "/wallet/deposit/begin",
    tag = "Wallet",
    request_body = DepositBeginRequest,
    responses(
        (status = 200, description = "Operation parked; assertion required", body = StepUpBeginResponse),
        (status = 400, description = "Amount out of range"),
        (status = 404, description = "Unknown user or no registered passkeys")
    )
)]
pub async fn deposit_begin(
    State(state): State<AppState>,
    Json(req): Json<DepositBeginRequest>,
) -> Result<Json<StepUpBeginResponse>, ApiError> {
    let user = state.users.require(&req.username.to_lowercase())?;
    let command = WalletCommand::Deposit { amount: req.amount };
    state.ledger.precheck(user.id, &command)?;
    park(&state, user.id, "deposit", &command).await
}

/// POST /wallet/transfer/begin
///
/// Park a transfer and start its step-up ceremony.
#[utoipa::path(
    post,
    path = "/wallet/transfer/begin",
    tag = "Wallet",
    request_body = TransferBeginRequest,
    responses(
        (status = 200, description = "Operation parked; assertion required", body = StepUpBeginResponse),
        (status = 400, description = "Amount out of range or self-transfer"),
        (status = 404, description = "Unknown sender or recipient"),
        (status = 409, description = "Insufficient funds")
    )
)]
pub async fn transfer_begin(
    State(state): State<AppState>,
    Json(req): Json<TransferBeginRequest>,
) -> Result<Json<StepUpBeginResponse>, ApiError> {
    let user = state.users.require(&req.username.to_lowercase())?;
    let recipient = state.users.require(&req.to.to_lowercase())?;
    let command = WalletCommand::Transfer {
        to: recipient.id,
        to_username: recipient.username,
        amount: req.amount,
    };
    state.ledger.precheck(user.id, &command)?;
    park(&state, user.id, "transfer", &command).await
}

async fn park(
    state: &AppState,
    user_id: Uuid,
    kind: &str,
    command: &WalletCommand,
) -> Result<Json<StepUpBeginResponse>, ApiError> {
    let payload = serde_json::to_value(command)
        .map_err(|e| ApiError::internal(format!("command encoding: {e}")))?;
    let (operation, options) = state.coordinator.create_pending(user_id, kind, payload).await?;
    Ok(Json(StepUpBeginResponse {
        operation_id: operation.id,
        expires_at: operation.expires_at,
        options,
    }))
}

/// POST /wallet/deposit/complete
#[utoipa::path(
    post,
    path = "/wallet/deposit/complete",
    tag = "Wallet",
    responses(
        (status = 200, description = "Deposit applied", body = MutationResponse),
        (status = 401, description = "Step-up verification failed"),
        (status = 404, description = "Unknown user or operation"),
        (status = 410, description = "Operation expired")
    )
)]
pub async fn deposit_complete(
    State(state): State<AppState>,
    Json(req): Json<StepUpCompleteRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    resolve_and_execute(&state, req, "deposit").await
}

/// POST /wallet/transfer/complete
#[utoipa::path(
    post,
    path = "/wallet/transfer/complete",
    tag = "Wallet",
    responses(
        (status = 200, description = "Transfer applied", body = MutationResponse),
        (status = 401, description = "Step-up verification failed"),
        (status = 404, description = "Unknown user or operation"),
        (status = 409, description = "Insufficient funds at execution time"),
        (status = 410, description = "Operation expired")
    )
)]
pub async fn transfer_complete(
    State(state): State<AppState>,
    Json(req): Json<StepUpCompleteRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    resolve_and_execute(&state, req, "transfer").await
}

async fn resolve_and_execute(
    state: &AppState,
    req: StepUpCompleteRequest,
    expected_kind: &str,
) -> Result<Json<MutationResponse>, ApiError> {
    let user = state.users.require(&req.username.to_lowercase())?;
    let resolved = state
        .coordinator
        .resolve(req.operation_id, user.id, &req.credential)
        .await?;

    if resolved.operation.kind != expected_kind {
        // Resolved on the wrong endpoint. The assertion was genuine, so the
        // operation is spent either way; refuse to apply it as something
        // it is not.
        return Err(ApiError::bad_request(format!(
            "operation {} is a {}, not a {}",
            resolved.operation.id, resolved.operation.kind, expected_kind
        )));
    }

    let command: WalletCommand = serde_json::from_value(resolved.operation.payload.clone())
        .map_err(|e| ApiError::internal(format!("command decoding: {e}")))?;
    let balance = state.ledger.execute(user.id, &command)?;

    Ok(Json(MutationResponse {
        verified: true,
        operation_id: resolved.operation.id,
        balance,
    }))
}

/// GET /wallet/{username}/balance
#[utoipa::path(
    get,
    path = "/wallet/{username}/balance",
    tag = "Wallet",
    params(("username" = String, Path, description = "Account username")),
    responses(
        (status = 200, description = "Current balance", body = BalanceResponse),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn balance(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let user = state.users.require(&username.to_lowercase())?;
    let balance = state.ledger.balance(user.id)?;
    Ok(Json(BalanceResponse {
        username: user.username,
        balance,
    }))
}

/// GET /wallet/{username}/transactions
#[utoipa::path(
    get,
    path = "/wallet/{username}/transactions",
    tag = "Wallet",
    params(("username" = String, Path, description = "Account username")),
    responses(
        (status = 200, description = "Transaction history, oldest first"),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn transactions(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    let user = state.users.require(&username.to_lowercase())?;
    Ok(Json(state.ledger.transactions(user.id)?))
}
