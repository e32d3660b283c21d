//! Registration and authentication ceremonies.
//!
//! `CeremonyEngine` drives both WebAuthn flows against a challenge store and
//! a credential registry. Verification is ordered deliberately:
//!
//! 1. parse and type-check `clientDataJSON`
//! 2. consume the stored challenge (single use, before anything else)
//! 3. origin, then RP id hash
//! 4. credential lookup and signature
//! 5. sign counter, last, after the signature holds
//!
//! A request that fails early therefore still burns its challenge, and a
//! counter regression is only ever reported for a cryptographically valid
//! assertion.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditKind, AuditSink};
use crate::authenticator::{rp_id_hash, AttestationObject, AuthenticatorData};
use crate::challenge::{Challenge, ChallengePurpose, ChallengeStore};
use crate::cose::{ALG_ES256, ALG_PS256, ALG_RS256};
use crate::credential::{Credential, CredentialRegistry};
use crate::error::CeremonyError;
use crate::response::{
    b64url_encode, AuthenticationResponse, CollectedClientData, RegistrationResponse,
    CEREMONY_TYPE_CREATE, CEREMONY_TYPE_GET,
};

/// Relying party identity. `origin` must be the exact scheme://host[:port]
/// browsers will report; `id` is the effective domain.
#[derive(Debug, Clone)]
pub struct RelyingParty {
    pub id: String,
    pub name: String,
    pub origin: String,
}

impl RelyingParty {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            origin: origin.into(),
        }
    }
}

/// `PublicKeyCredentialCreationOptions`, ready to serialize for the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationOptions {
    pub challenge: String,
    pub rp: RpEntity,
    pub user: UserEntity,
    #[serde(rename = "pubKeyCredParams")]
    pub pub_key_cred_params: Vec<CredParam>,
    pub timeout: u32,
    pub attestation: String,
    #[serde(rename = "excludeCredentials")]
    pub exclude_credentials: Vec<CredentialDescriptor>,
    #[serde(rename = "authenticatorSelection")]
    pub authenticator_selection: AuthenticatorSelection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpEntity {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntity {
    /// base64url of the user id bytes.
    pub id: String,
    pub name: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredParam {
    #[serde(rename = "type")]
    pub cred_type: String,
    pub alg: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialDescriptor {
    #[serde(rename = "type")]
    pub cred_type: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatorSelection {
    #[serde(rename = "residentKey")]
    pub resident_key: String,
    #[serde(rename = "userVerification")]
    pub user_verification: String,
}

/// `PublicKeyCredentialRequestOptions`, ready to serialize for the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticationOptions {
    pub challenge: String,
    #[serde(rename = "rpId")]
    pub rp_id: String,
    #[serde(rename = "allowCredentials")]
    pub allow_credentials: Vec<CredentialDescriptor>,
    pub timeout: u32,
    #[serde(rename = "userVerification")]
    pub user_verification: String,
}

const CEREMONY_TIMEOUT_MS: u32 = 60_000;

pub struct CeremonyEngine {
    rp: RelyingParty,
    challenges: Arc<ChallengeStore>,
    registry: Arc<dyn CredentialRegistry>,
    audit: Arc<dyn AuditSink>,
}

impl CeremonyEngine {
    pub fn new(
        rp: RelyingParty,
        challenges: Arc<ChallengeStore>,
        registry: Arc<dyn CredentialRegistry>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            rp,
            challenges,
            registry,
            audit,
        }
    }

    pub fn relying_party(&self) -> &RelyingParty {
        &self.rp
    }

    pub fn challenges(&self) -> &Arc<ChallengeStore> {
        &self.challenges
    }

    pub fn registry(&self) -> &Arc<dyn CredentialRegistry> {
        &self.registry
    }

    /// Issue a fresh registration challenge and creation options.
    pub async fn begin_registration(
        &self,
        user_id: Uuid,
        username: &str,
        display_name: &str,
    ) -> Result<RegistrationOptions, CeremonyError> {
        let challenge = self.challenges.issue(user_id, ChallengePurpose::Registration);
        let existing = self.registry.list_for_user(user_id).await;

        info!(%user_id, username, "registration ceremony started");
        self.audit
            .record(AuditEvent::now(
                AuditKind::RegistrationStarted,
                user_id,
                json!({ "username": username }),
            ))
            .await;

        Ok(RegistrationOptions {
            challenge: b64url_encode(&challenge.value),
            rp: RpEntity {
                id: self.rp.id.clone(),
                name: self.rp.name.clone(),
            },
            user: UserEntity {
                id: b64url_encode(user_id.as_bytes()),
                name: username.to_owned(),
                display_name: display_name.to_owned(),
            },
            pub_key_cred_params: vec![
                CredParam {
                    cred_type: "public-key".into(),
                    alg: ALG_ES256,
                },
                CredParam {
                    cred_type: "public-key".into(),
                    alg: ALG_RS256,
                },
                CredParam {
                    cred_type: "public-key".into(),
                    alg: ALG_PS256,
                },
            ],
            timeout: CEREMONY_TIMEOUT_MS,
            attestation: "none".into(),
            exclude_credentials: descriptors(&existing),
            authenticator_selection: AuthenticatorSelection {
                resident_key: "preferred".into(),
                user_verification: "preferred".into(),
            },
        })
    }

    /// Verify a registration response and persist the new credential.
    pub async fn complete_registration(
        &self,
        user_id: Uuid,
        response: &RegistrationResponse,
    ) -> Result<Credential, CeremonyError> {
        match self.verify_registration(user_id, response).await {
            Ok(credential) => {
                self.audit
                    .record(AuditEvent::now(
                        AuditKind::RegistrationSucceeded,
                        user_id,
                        json!({ "credential": credential.id_digest() }),
                    ))
                    .await;
                Ok(credential)
            }
            Err(err) => {
                warn!(%user_id, error = %err, "registration ceremony failed");
                self.audit
                    .record(AuditEvent::now(
                        AuditKind::RegistrationFailed,
                        user_id,
                        json!({ "error": err.to_string() }),
                    ))
                    .await;
                Err(err)
            }
        }
    }

    async fn verify_registration(
        &self,
        user_id: Uuid,
        response: &RegistrationResponse,
    ) -> Result<Credential, CeremonyError> {
        let client_data = CollectedClientData::parse(&response.client_data_bytes()?)?;
        if client_data.ceremony_type != CEREMONY_TYPE_CREATE {
            return Err(CeremonyError::InvalidClientData(format!(
                "unexpected ceremony type {:?}",
                client_data.ceremony_type
            )));
        }

        let presented = client_data.challenge_bytes()?;
        self.challenges
            .consume(user_id, ChallengePurpose::Registration, &presented)?;

        if client_data.origin != self.rp.origin {
            return Err(CeremonyError::OriginMismatch);
        }

        let attestation = AttestationObject::parse(&response.attestation_object_bytes()?)?;
        let auth_data = &attestation.auth_data;
        if auth_data.rp_id_hash != rp_id_hash(&self.rp.id) {
            return Err(CeremonyError::RpIdMismatch);
        }
        if !auth_data.user_present() {
            return Err(CeremonyError::InvalidAssertion(
                "user presence flag not set".into(),
            ));
        }

        // AttestationObject::parse guarantees the attested credential exists.
        let attested = auth_data
            .attested_credential
            .as_ref()
            .ok_or_else(|| CeremonyError::InvalidAssertion("missing attested credential".into()))?;

        let wire_id = response.credential_id()?;
        if wire_id != attested.credential_id {
            return Err(CeremonyError::InvalidAssertion(
                "credential id does not match attested credential".into(),
            ));
        }

        let credential = Credential::new(
            attested.credential_id.clone(),
            user_id,
            attested.public_key.to_cbor(),
            auth_data.sign_count,
            response.response.transports.clone(),
            self.challenges.clock().now(),
        );
        self.registry.register(credential.clone()).await?;

        info!(%user_id, credential = %credential.id_digest(), "credential registered");
        Ok(credential)
    }

    /// Issue a fresh authentication challenge and request options.
    pub async fn begin_authentication(
        &self,
        user_id: Uuid,
    ) -> Result<AuthenticationOptions, CeremonyError> {
        self.begin_assertion(user_id, ChallengePurpose::Authentication)
            .await
    }

    /// Verify a login assertion.
    pub async fn complete_authentication(
        &self,
        user_id: Uuid,
        response: &AuthenticationResponse,
    ) -> Result<Credential, CeremonyError> {
        match self
            .verify_assertion(user_id, ChallengePurpose::Authentication, response)
            .await
        {
            Ok((credential, _)) => {
                self.audit
                    .record(AuditEvent::now(
                        AuditKind::AuthenticationSucceeded,
                        user_id,
                        json!({ "credential": credential.id_digest() }),
                    ))
                    .await;
                Ok(credential)
            }
            Err(err) => {
                warn!(%user_id, error = %err, "authentication ceremony failed");
                self.audit
                    .record(AuditEvent::now(
                        AuditKind::AuthenticationFailed,
                        user_id,
                        json!({ "error": err.to_string() }),
                    ))
                    .await;
                Err(err)
            }
        }
    }

    /// Issue a step-up challenge. The caller binds its value to a pending
    /// operation; verification happens through [`complete_step_up`].
    ///
    /// [`complete_step_up`]: Self::complete_step_up
    pub async fn begin_step_up(
        &self,
        user_id: Uuid,
    ) -> Result<AuthenticationOptions, CeremonyError> {
        self.begin_assertion(user_id, ChallengePurpose::StepUp).await
    }

    /// Verify a step-up assertion. Returns the credential and the consumed
    /// challenge so the caller can check the operation binding. Audit events
    /// for step-up are emitted by the coordinator, which knows the outcome.
    pub async fn complete_step_up(
        &self,
        user_id: Uuid,
        response: &AuthenticationResponse,
    ) -> Result<(Credential, Challenge), CeremonyError> {
        self.verify_assertion(user_id, ChallengePurpose::StepUp, response)
            .await
    }

    async fn begin_assertion(
        &self,
        user_id: Uuid,
        purpose: ChallengePurpose,
    ) -> Result<AuthenticationOptions, CeremonyError> {
        let credentials = self.registry.list_for_user(user_id).await;
        if credentials.is_empty() {
            return Err(CeremonyError::NoCredentials);
        }
        let challenge = self.challenges.issue(user_id, purpose);
        info!(%user_id, ?purpose, "assertion ceremony started");
        if purpose == ChallengePurpose::Authentication {
            // Step-up begins are audited by the coordinator as StepUpCreated.
            self.audit
                .record(AuditEvent::now(
                    AuditKind::AuthenticationStarted,
                    user_id,
                    json!({ "credentials": credentials.len() }),
                ))
                .await;
        }
        Ok(AuthenticationOptions {
            challenge: b64url_encode(&challenge.value),
            rp_id: self.rp.id.clone(),
            allow_credentials: descriptors(&credentials),
            timeout: CEREMONY_TIMEOUT_MS,
            user_verification: "preferred".into(),
        })
    }

    async fn verify_assertion(
        &self,
        user_id: Uuid,
        purpose: ChallengePurpose,
        response: &AuthenticationResponse,
    ) -> Result<(Credential, Challenge), CeremonyError> {
        let client_data_bytes = response.client_data_bytes()?;
        let client_data = CollectedClientData::parse(&client_data_bytes)?;
        if client_data.ceremony_type != CEREMONY_TYPE_GET {
            return Err(CeremonyError::InvalidClientData(format!(
                "unexpected ceremony type {:?}",
                client_data.ceremony_type
            )));
        }

        let presented = client_data.challenge_bytes()?;
        let challenge = self.challenges.consume(user_id, purpose, &presented)?;

        if client_data.origin != self.rp.origin {
            return Err(CeremonyError::OriginMismatch);
        }

        let auth_data_bytes = response.authenticator_data_bytes()?;
        let auth_data = AuthenticatorData::parse(&auth_data_bytes)?;
        if auth_data.rp_id_hash != rp_id_hash(&self.rp.id) {
            return Err(CeremonyError::RpIdMismatch);
        }
        if !auth_data.user_present() {
            return Err(CeremonyError::InvalidAssertion(
                "user presence flag not set".into(),
            ));
        }

        let credential_id = response.credential_id()?;
        let credential = self
            .registry
            .find(&credential_id)
            .await
            .filter(|c| c.user_id == user_id)
            .ok_or(CeremonyError::UnknownCredential)?;

        // Signature covers authenticatorData || SHA-256(clientDataJSON).
        let mut message = auth_data.raw.clone();
        message.extend_from_slice(&Sha256::digest(&client_data_bytes));
        let public_key = crate::cose::CoseKey::parse(&credential.public_key)
            .map_err(|e| CeremonyError::InvalidAssertion(format!("stored public key: {e}")))?;
        public_key
            .verify(&message, &response.signature_bytes()?)
            .map_err(|_| CeremonyError::SignatureInvalid)?;

        // Counter check is last so a regression is only reported for an
        // otherwise valid assertion.
        let updated = self
            .registry
            .update_sign_count(&credential_id, auth_data.sign_count, self.challenges.clock().now())
            .await?;

        info!(
            %user_id,
            credential = %updated.id_digest(),
            sign_count = updated.sign_count,
            "assertion verified"
        );
        Ok((updated, challenge))
    }
}

fn descriptors(credentials: &[Credential]) -> Vec<CredentialDescriptor> {
    credentials
        .iter()
        .map(|c| CredentialDescriptor {
            cred_type: "public-key".into(),
            id: b64url_encode(&c.id),
            transports: c.transports.clone(),
        })
        .collect()
}
