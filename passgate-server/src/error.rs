//! API error handling module
//!
//! Provides a unified error type for all API endpoints with structured error variants.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use passgate_core::{CeremonyError, ChallengeError, RegistryError, StepUpError};
use thiserror::Error;

use crate::wallet::WalletError;

/// API error type with structured variants for different error categories
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request - client provided invalid input
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Not found - requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict - the request collides with existing state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error - unexpected server-side failure
    #[error("Internal error: {0}")]
    Internal(String),

    /// Ceremony error - error from the passkey engine
    #[error("Ceremony error: {0}")]
    Ceremony(#[from] CeremonyError),

    /// Step-up error - error from the step-up coordinator
    #[error("Step-up error: {0}")]
    StepUp(#[from] StepUpError),

    /// Wallet error - error from the ledger
    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),
}

impl ApiError {
    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create an internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Ceremony(e) => ceremony_status(e),
            Self::StepUp(e) => match e {
                // An unknown id and a consumed id are indistinguishable on
                // purpose; both read as "nothing to resolve".
                StepUpError::UnknownOperation => StatusCode::NOT_FOUND,
                StepUpError::OperationExpired => StatusCode::GONE,
                StepUpError::VerificationFailed(inner) => ceremony_status(inner),
            },
            Self::Wallet(e) => match e {
                WalletError::InvalidAmount { .. } | WalletError::SelfTransfer => {
                    StatusCode::BAD_REQUEST
                }
                WalletError::InsufficientFunds { .. } => StatusCode::CONFLICT,
                WalletError::UnknownAccount => StatusCode::NOT_FOUND,
            },
        }
    }

    /// Get the error code for programmatic error handling
    fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "INVALID_INPUT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Ceremony(e) => ceremony_code(e),
            Self::StepUp(e) => match e {
                StepUpError::UnknownOperation => "UNKNOWN_OPERATION",
                StepUpError::OperationExpired => "OPERATION_EXPIRED",
                StepUpError::VerificationFailed(inner) => ceremony_code(inner),
            },
            Self::Wallet(e) => match e {
                WalletError::InvalidAmount { .. } => "INVALID_AMOUNT",
                WalletError::SelfTransfer => "SELF_TRANSFER",
                WalletError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
                WalletError::UnknownAccount => "UNKNOWN_ACCOUNT",
            },
        }
    }

    /// Get sanitized error message for client response
    fn client_message(&self) -> String {
        match self {
            // Verification failures deliberately stay vague; details go to
            // the log and the audit trail, not to the caller.
            Self::Ceremony(e) => ceremony_client_message(e).to_string(),
            Self::StepUp(StepUpError::VerificationFailed(inner)) => {
                ceremony_client_message(inner).to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Get the error category for logging
    fn error_category(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal",
            Self::Ceremony(_) => "ceremony",
            Self::StepUp(_) => "step_up",
            Self::Wallet(_) => "wallet",
        }
    }
}

fn ceremony_status(e: &CeremonyError) -> StatusCode {
    match e {
        // Client sent something unparseable
        CeremonyError::InvalidClientData(_) | CeremonyError::InvalidAssertion(_) => {
            StatusCode::BAD_REQUEST
        }
        // Verification failed; the request was well-formed but not proven
        CeremonyError::OriginMismatch
        | CeremonyError::RpIdMismatch
        | CeremonyError::UnknownCredential
        | CeremonyError::SignatureInvalid
        | CeremonyError::ChallengeRejected(_) => StatusCode::UNAUTHORIZED,
        CeremonyError::Registry(RegistryError::Duplicate) => StatusCode::CONFLICT,
        CeremonyError::Registry(RegistryError::CounterRegression { .. }) => {
            StatusCode::UNAUTHORIZED
        }
        CeremonyError::Registry(RegistryError::Unknown) => StatusCode::UNAUTHORIZED,
        CeremonyError::NoCredentials => StatusCode::NOT_FOUND,
    }
}

fn ceremony_code(e: &CeremonyError) -> &'static str {
    match e {
        CeremonyError::InvalidClientData(_) => "INVALID_CLIENT_DATA",
        CeremonyError::InvalidAssertion(_) => "INVALID_ASSERTION",
        CeremonyError::OriginMismatch => "ORIGIN_MISMATCH",
        CeremonyError::RpIdMismatch => "RP_ID_MISMATCH",
        CeremonyError::UnknownCredential => "UNKNOWN_CREDENTIAL",
        CeremonyError::SignatureInvalid => "SIGNATURE_INVALID",
        CeremonyError::ChallengeRejected(ChallengeError::NotFound) => "CHALLENGE_NOT_FOUND",
        CeremonyError::ChallengeRejected(ChallengeError::Expired) => "CHALLENGE_EXPIRED",
        CeremonyError::ChallengeRejected(ChallengeError::Mismatch) => "CHALLENGE_MISMATCH",
        CeremonyError::ChallengeRejected(ChallengeError::AlreadyConsumed) => "CHALLENGE_CONSUMED",
        CeremonyError::Registry(RegistryError::Duplicate) => "DUPLICATE_CREDENTIAL",
        CeremonyError::Registry(RegistryError::CounterRegression { .. }) => "COUNTER_REGRESSION",
        CeremonyError::Registry(RegistryError::Unknown) => "UNKNOWN_CREDENTIAL",
        CeremonyError::NoCredentials => "NO_CREDENTIALS",
    }
}

fn ceremony_client_message(e: &CeremonyError) -> &'static str {
    match e {
        CeremonyError::InvalidClientData(_) => "Malformed client data",
        CeremonyError::InvalidAssertion(_) => "Malformed authenticator response",
        CeremonyError::Registry(RegistryError::Duplicate) => "Credential already registered",
        CeremonyError::NoCredentials => "No passkeys registered for this user",
        _ => "Passkey verification failed",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let category = self.error_category();
        let code = self.error_code();
        let internal_message = self.to_string();
        let client_message = self.client_message();

        // Log based on severity, always including internal details
        if status.is_server_error() {
            tracing::error!(
                status = %status,
                category = category,
                code = code,
                error = %internal_message,
                "Server error"
            );
        } else {
            tracing::warn!(
                status = %status,
                category = category,
                code = code,
                error = %internal_message,
                "Client error"
            );
        }

        // All error responses include a `code` field for programmatic error handling
        let body = serde_json::json!({
            "error": client_message,
            "code": code,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceremony_errors_map_to_expected_statuses() {
        let cases = [
            (
                ApiError::from(CeremonyError::InvalidClientData("x".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(CeremonyError::SignatureInvalid),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ApiError::from(CeremonyError::ChallengeRejected(ChallengeError::Expired)),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ApiError::from(CeremonyError::Registry(RegistryError::Duplicate)),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::from(CeremonyError::NoCredentials),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(StepUpError::OperationExpired),
                StatusCode::GONE,
            ),
            (
                ApiError::from(StepUpError::UnknownOperation),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(StepUpError::VerificationFailed(
                    CeremonyError::SignatureInvalid,
                )),
                StatusCode::UNAUTHORIZED,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{err}");
        }
    }

    #[test]
    fn verification_detail_stays_out_of_client_message() {
        let err = ApiError::from(CeremonyError::Registry(RegistryError::CounterRegression {
            stored: 9,
            presented: 3,
        }));
        assert!(!err.client_message().contains('9'));
    }
}
