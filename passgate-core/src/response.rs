//! Wire types for ceremony responses.
//!
//! These mirror the JSON a browser produces from
//! `navigator.credentials.create()` / `.get()` after base64url-encoding the
//! binary fields. Field names follow the WebAuthn level-2 JS API exactly,
//! including the `clientDataJSON` capitalization serde's camelCase rule
//! would get wrong.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::CeremonyError;

pub fn b64url_encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn b64url_decode(field: &'static str, value: &str) -> Result<Vec<u8>, CeremonyError> {
    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|_| CeremonyError::InvalidClientData(format!("{field} is not base64url")))
}

/// The parsed `clientDataJSON` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectedClientData {
    /// "webauthn.create" or "webauthn.get".
    #[serde(rename = "type")]
    pub ceremony_type: String,
    /// base64url of the challenge bytes the browser signed over.
    pub challenge: String,
    pub origin: String,
    #[serde(rename = "crossOrigin", skip_serializing_if = "Option::is_none")]
    pub cross_origin: Option<bool>,
}

pub const CEREMONY_TYPE_CREATE: &str = "webauthn.create";
pub const CEREMONY_TYPE_GET: &str = "webauthn.get";

impl CollectedClientData {
    pub fn parse(bytes: &[u8]) -> Result<Self, CeremonyError> {
        serde_json::from_slice(bytes)
            .map_err(|e| CeremonyError::InvalidClientData(format!("clientDataJSON: {e}")))
    }

    /// Challenge bytes as the browser echoed them.
    pub fn challenge_bytes(&self) -> Result<Vec<u8>, CeremonyError> {
        b64url_decode("challenge", &self.challenge)
    }
}

/// Registration response: what `navigator.credentials.create()` yields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationResponse {
    /// base64url credential id, as reported by the client.
    pub id: String,
    #[serde(rename = "rawId")]
    pub raw_id: String,
    #[serde(rename = "type")]
    pub credential_type: String,
    pub response: AttestationResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    #[serde(rename = "attestationObject")]
    pub attestation_object: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<String>,
}

/// Authentication response: what `navigator.credentials.get()` yields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticationResponse {
    pub id: String,
    #[serde(rename = "rawId")]
    pub raw_id: String,
    #[serde(rename = "type")]
    pub credential_type: String,
    pub response: AssertionResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    #[serde(rename = "authenticatorData")]
    pub authenticator_data: String,
    pub signature: String,
    #[serde(rename = "userHandle", skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<String>,
}

impl RegistrationResponse {
    pub fn credential_id(&self) -> Result<Vec<u8>, CeremonyError> {
        b64url_decode("rawId", &self.raw_id)
    }

    pub fn client_data_bytes(&self) -> Result<Vec<u8>, CeremonyError> {
        b64url_decode("clientDataJSON", &self.response.client_data_json)
    }

    pub fn attestation_object_bytes(&self) -> Result<Vec<u8>, CeremonyError> {
        b64url_decode("attestationObject", &self.response.attestation_object)
    }
}

impl AuthenticationResponse {
    pub fn credential_id(&self) -> Result<Vec<u8>, CeremonyError> {
        b64url_decode("rawId", &self.raw_id)
    }

    pub fn client_data_bytes(&self) -> Result<Vec<u8>, CeremonyError> {
        b64url_decode("clientDataJSON", &self.response.client_data_json)
    }

    pub fn authenticator_data_bytes(&self) -> Result<Vec<u8>, CeremonyError> {
        b64url_decode("authenticatorData", &self.response.authenticator_data)
    }

    pub fn signature_bytes(&self) -> Result<Vec<u8>, CeremonyError> {
        b64url_decode("signature", &self.response.signature)
    }
}
