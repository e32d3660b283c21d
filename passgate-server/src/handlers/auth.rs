//! Passkey ceremony handlers
//!
//! Registration and login endpoints. Each flow is two requests: `begin`
//! returns the options the browser feeds to the WebAuthn API, `complete`
//! takes the authenticator's response and verifies it.

use axum::{extract::State, Json};
use passgate_core::{
    AuthenticationOptions, AuthenticationResponse, RegistrationOptions, RegistrationResponse,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;
use crate::users::validate_username;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterBeginRequest {
    pub username: String,
    /// Shown in authenticator prompts; defaults to the username.
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterCompleteRequest {
    pub username: String,
    /// The authenticator's attestation response.
    #[schema(value_type = Object)]
    pub credential: RegistrationResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterCompleteResponse {
    pub verified: bool,
    #[schema(value_type = String)]
    pub user_id: Uuid,
    /// base64url credential id, for client-side bookkeeping.
    pub credential_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginBeginRequest {
    pub username: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginCompleteRequest {
    pub username: String,
    /// The authenticator's assertion response.
    #[schema(value_type = Object)]
    pub credential: AuthenticationResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginCompleteResponse {
    pub verified: bool,
    #[schema(value_type = String)]
    pub user_id: Uuid,
    pub username: String,
    pub sign_count: u32,
}

/// POST /auth/register/begin
///
/// Create the user on first contact and issue registration options.
#[utoipa::path(
    post,
    path = "/auth/register/begin",
    tag = "Passkeys",
    request_body = RegisterBeginRequest,
    responses(
        (status = 200, description = "PublicKeyCredentialCreationOptions for navigator.credentials.create()"),
        (status = 400, description = "Invalid username")
    )
)]
pub async fn register_begin(
    State(state): State<AppState>,
    Json(req): Json<RegisterBeginRequest>,
) -> Result<Json<RegistrationOptions>, ApiError> {
    let username = req.username.to_lowercase();
    validate_username(&username)?;
    let display_name = req.display_name.unwrap_or_else(|| username.clone());
    let user = state.users.get_or_create(&username, &display_name);

    let options = state
        .engine
        .begin_registration(user.id, &user.username, &user.display_name)
        .await?;
    Ok(Json(options))
}

/// POST /auth/register/complete
///
/// Verify the attestation response and store the credential. Opens the
/// user's wallet account on their first successful registration.
#[utoipa::path(
    post,
    path = "/auth/register/complete",
    tag = "Passkeys",
    responses(
        (status = 200, description = "Credential registered", body = RegisterCompleteResponse),
        (status = 400, description = "Malformed response"),
        (status = 401, description = "Verification failed"),
        (status = 404, description = "Unknown user"),
        (status = 409, description = "Credential id already registered")
    )
)]
pub async fn register_complete(
    State(state): State<AppState>,
    Json(req): Json<RegisterCompleteRequest>,
) -> Result<Json<RegisterCompleteResponse>, ApiError> {
    let user = state.users.require(&req.username.to_lowercase())?;
    let credential = state
        .engine
        .complete_registration(user.id, &req.credential)
        .await?;
    state.ledger.open_account(user.id);
    tracing::info!(
        user_id = %user.id,
        credential = %credential.id_digest(),
        "registration complete"
    );

    Ok(Json(RegisterCompleteResponse {
        verified: true,
        user_id: user.id,
        credential_id: req.credential.raw_id.clone(),
    }))
}

/// POST /auth/login/begin
///
/// Issue authentication options listing the user's registered credentials.
#[utoipa::path(
    post,
    path = "/auth/login/begin",
    tag = "Passkeys",
    request_body = LoginBeginRequest,
    responses(
        (status = 200, description = "PublicKeyCredentialRequestOptions for navigator.credentials.get()"),
        (status = 404, description = "Unknown user or no registered passkeys")
    )
)]
pub async fn login_begin(
    State(state): State<AppState>,
    Json(req): Json<LoginBeginRequest>,
) -> Result<Json<AuthenticationOptions>, ApiError> {
    let user = state.users.require(&req.username.to_lowercase())?;
    let options = state.engine.begin_authentication(user.id).await?;
    Ok(Json(options))
}

/// POST /auth/login/complete
///
/// Verify the assertion response.
#[utoipa::path(
    post,
    path = "/auth/login/complete",
    tag = "Passkeys",
    responses(
        (status = 200, description = "Login verified", body = LoginCompleteResponse),
        (status = 400, description = "Malformed response"),
        (status = 401, description = "Verification failed"),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn login_complete(
    State(state): State<AppState>,
    Json(req): Json<LoginCompleteRequest>,
) -> Result<Json<LoginCompleteResponse>, ApiError> {
    let user = state.users.require(&req.username.to_lowercase())?;
    let credential = state
        .engine
        .complete_authentication(user.id, &req.credential)
        .await?;

    Ok(Json(LoginCompleteResponse {
        verified: true,
        user_id: user.id,
        username: user.username,
        sign_count: credential.sign_count,
    }))
}
