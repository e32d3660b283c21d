//! Step-up authorization for sensitive operations.
//!
//! A sensitive operation (a transfer, a large deposit) is parked as a
//! [`PendingOperation`] bound to a dedicated step-up challenge. The
//! operation's payload is released to exactly one caller, and only after a
//! fresh assertion over that same challenge verifies.
//!
//! Atomicity comes from remove-at-claim: `resolve` removes the operation
//! from the map before verifying, so concurrent attempts race on the removal
//! and every loser sees [`StepUpError::UnknownOperation`]. If verification
//! fails the operation is reinserted untouched and a new ceremony can be
//! started for it.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditKind, AuditSink};
use crate::ceremony::{AuthenticationOptions, CeremonyEngine};
use crate::challenge::CHALLENGE_TTL_SECS;
use crate::clock::Clock;
use crate::credential::Credential;
use crate::error::{CeremonyError, ChallengeError, StepUpError};
use crate::response::{b64url_decode, AuthenticationResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Pending,
    Expired,
}

/// A parked operation awaiting step-up verification.
#[derive(Debug, Clone)]
pub struct PendingOperation {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Caller-defined discriminator, e.g. "deposit" or "transfer".
    pub kind: String,
    /// Opaque payload, executed by the caller once released.
    pub payload: serde_json::Value,
    pub status: OperationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// The exact challenge bytes this operation is bound to.
    bound_challenge: Vec<u8>,
}

/// A successfully verified operation, released exactly once.
#[derive(Debug, Clone)]
pub struct ResolvedOperation {
    pub operation: PendingOperation,
    pub credential: Credential,
}

pub struct StepUpCoordinator {
    engine: Arc<CeremonyEngine>,
    operations: DashMap<Uuid, PendingOperation>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    ttl: Duration,
}

impl StepUpCoordinator {
    pub fn new(
        engine: Arc<CeremonyEngine>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            engine,
            operations: DashMap::new(),
            clock,
            audit,
            ttl: Duration::seconds(CHALLENGE_TTL_SECS),
        }
    }

    /// Park an operation and start the step-up ceremony for it.
    ///
    /// Every call mints a fresh operation id and challenge; retrying a
    /// failed step-up means parking the operation again.
    pub async fn create_pending(
        &self,
        user_id: Uuid,
        kind: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<(PendingOperation, AuthenticationOptions), StepUpError> {
        let options = self.engine.begin_step_up(user_id).await?;
        let bound_challenge = b64url_decode("challenge", &options.challenge)
            .map_err(StepUpError::VerificationFailed)?;

        let now = self.clock.now();
        let operation = PendingOperation {
            id: Uuid::new_v4(),
            user_id,
            kind: kind.into(),
            payload,
            status: OperationStatus::Pending,
            created_at: now,
            expires_at: now + self.ttl,
            bound_challenge,
        };
        self.operations.insert(operation.id, operation.clone());

        info!(
            %user_id,
            operation = %operation.id,
            kind = operation.kind,
            "step-up operation parked"
        );
        self.audit
            .record(AuditEvent::now(
                AuditKind::StepUpCreated,
                user_id,
                json!({ "operation": operation.id, "kind": operation.kind }),
            ))
            .await;

        Ok((operation, options))
    }

    /// Verify the assertion and release the parked operation.
    ///
    /// On success the operation is gone from the coordinator; no concurrent
    /// or subsequent call can release it again.
    pub async fn resolve(
        &self,
        operation_id: Uuid,
        user_id: Uuid,
        response: &AuthenticationResponse,
    ) -> Result<ResolvedOperation, StepUpError> {
        // Claim the operation before touching the ceremony. Losers of a
        // concurrent race land here with nothing to remove.
        let (_, operation) = self
            .operations
            .remove(&operation_id)
            .ok_or(StepUpError::UnknownOperation)?;

        if operation.user_id != user_id {
            // Reinsert for its owner; the caller learns nothing.
            self.operations.insert(operation.id, operation);
            return Err(StepUpError::UnknownOperation);
        }

        // An operation that already lapsed is no longer resolvable at all;
        // only the transition out of Pending reports the expiry.
        if operation.status != OperationStatus::Pending {
            self.operations.insert(operation.id, operation);
            return Err(StepUpError::UnknownOperation);
        }
        if self.clock.now() > operation.expires_at {
            let mut expired = operation;
            expired.status = OperationStatus::Expired;
            self.operations.insert(expired.id, expired);
            return Err(StepUpError::OperationExpired);
        }

        let (credential, challenge) = match self.engine.complete_step_up(user_id, response).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(%user_id, operation = %operation.id, error = %err, "step-up verification failed");
                self.audit
                    .record(AuditEvent::now(
                        AuditKind::StepUpFailed,
                        user_id,
                        json!({ "operation": operation.id, "error": err.to_string() }),
                    ))
                    .await;
                self.operations.insert(operation.id, operation);
                return Err(StepUpError::VerificationFailed(err));
            }
        };

        // The assertion must be over the challenge this operation was bound
        // to; an assertion over a newer step-up challenge releases nothing.
        // Like any other failed verification, the operation stays parked.
        if challenge.value != operation.bound_challenge {
            self.audit
                .record(AuditEvent::now(
                    AuditKind::StepUpFailed,
                    user_id,
                    json!({ "operation": operation.id, "error": "challenge binding mismatch" }),
                ))
                .await;
            self.operations.insert(operation.id, operation);
            return Err(StepUpError::VerificationFailed(
                CeremonyError::ChallengeRejected(ChallengeError::Mismatch),
            ));
        }

        info!(
            %user_id,
            operation = %operation.id,
            kind = operation.kind,
            credential = %credential.id_digest(),
            "step-up operation released"
        );
        self.audit
            .record(AuditEvent::now(
                AuditKind::StepUpResolved,
                user_id,
                json!({ "operation": operation.id, "kind": operation.kind }),
            ))
            .await;

        Ok(ResolvedOperation {
            operation,
            credential,
        })
    }

    /// Drop operations past their deadline. Expired entries kept for
    /// diagnostics by `resolve` are dropped here too.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.operations.len();
        self.operations
            .retain(|_, op| op.status == OperationStatus::Pending && now <= op.expires_at);
        before - self.operations.len()
    }

    pub fn pending_count(&self) -> usize {
        self.operations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::ceremony::tests::{harness, register, TEST_ORIGIN, TEST_RP_ID};
    use crate::simulator::SoftAuthenticator;

    struct StepUpHarness {
        coordinator: StepUpCoordinator,
        clock: Arc<crate::clock::ManualClock>,
        authenticator: SoftAuthenticator,
        user_id: Uuid,
    }

    async fn stepup_harness() -> StepUpHarness {
        let base = harness();
        let authenticator = SoftAuthenticator::new(TEST_RP_ID, TEST_ORIGIN);
        let user_id = Uuid::new_v4();
        register(&base, &authenticator, user_id).await;
        let coordinator = StepUpCoordinator::new(
            Arc::new(base.engine),
            base.clock.clone(),
            Arc::new(MemoryAuditSink::default()),
        );
        StepUpHarness {
            coordinator,
            clock: base.clock,
            authenticator,
            user_id,
        }
    }

    #[tokio::test]
    async fn park_verify_release() {
        let h = stepup_harness().await;
        let payload = serde_json::json!({ "amount": 250 });
        let (operation, options) = h
            .coordinator
            .create_pending(h.user_id, "deposit", payload.clone())
            .await
            .unwrap();

        let response = h.authenticator.sign_assertion(&options);
        let resolved = h
            .coordinator
            .resolve(operation.id, h.user_id, &response)
            .await
            .unwrap();
        assert_eq!(resolved.operation.payload, payload);
        assert_eq!(resolved.operation.kind, "deposit");
        assert_eq!(h.coordinator.pending_count(), 0);
    }

    #[tokio::test]
    async fn released_exactly_once() {
        let h = stepup_harness().await;
        let (operation, options) = h
            .coordinator
            .create_pending(h.user_id, "transfer", serde_json::json!({ "amount": 40 }))
            .await
            .unwrap();
        let response = h.authenticator.sign_assertion(&options);

        let first = h.coordinator.resolve(operation.id, h.user_id, &response).await;
        assert!(first.is_ok());
        let second = h.coordinator.resolve(operation.id, h.user_id, &response).await;
        assert_eq!(second.unwrap_err(), StepUpError::UnknownOperation);
    }

    #[tokio::test]
    async fn concurrent_resolution_has_one_winner() {
        let h = Arc::new(stepup_harness().await);
        let (operation, options) = h
            .coordinator
            .create_pending(h.user_id, "transfer", serde_json::json!({ "amount": 40 }))
            .await
            .unwrap();
        let response = h.authenticator.sign_assertion(&options);

        let (a, b) = tokio::join!(
            h.coordinator.resolve(operation.id, h.user_id, &response),
            h.coordinator.resolve(operation.id, h.user_id, &response),
        );
        assert_eq!(
            [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(),
            1,
            "exactly one resolution may win"
        );
    }

    #[tokio::test]
    async fn expired_operation_is_refused() {
        let h = stepup_harness().await;
        let (operation, options) = h
            .coordinator
            .create_pending(h.user_id, "deposit", serde_json::json!({ "amount": 10 }))
            .await
            .unwrap();
        let response = h.authenticator.sign_assertion(&options);

        h.clock.advance(chrono::Duration::seconds(301));
        let err = h
            .coordinator
            .resolve(operation.id, h.user_id, &response)
            .await
            .unwrap_err();
        assert_eq!(err, StepUpError::OperationExpired);

        // Once lapsed the operation behaves as gone, then the sweep reaps it.
        let err = h
            .coordinator
            .resolve(operation.id, h.user_id, &response)
            .await
            .unwrap_err();
        assert_eq!(err, StepUpError::UnknownOperation);
        assert_eq!(h.coordinator.sweep(), 1);
        assert_eq!(h.coordinator.pending_count(), 0);
    }

    #[tokio::test]
    async fn failed_verification_keeps_operation_parked() {
        let h = stepup_harness().await;
        let (operation, options) = h
            .coordinator
            .create_pending(h.user_id, "transfer", serde_json::json!({ "amount": 99 }))
            .await
            .unwrap();

        let mut response = h.authenticator.sign_assertion(&options);
        response.response.signature =
            crate::response::b64url_encode(&[0u8; 70]);
        let err = h
            .coordinator
            .resolve(operation.id, h.user_id, &response)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StepUpError::VerificationFailed(CeremonyError::SignatureInvalid)
        );
        assert_eq!(h.coordinator.pending_count(), 1);
    }

    #[tokio::test]
    async fn foreign_user_cannot_claim_operation() {
        let h = stepup_harness().await;
        let (operation, options) = h
            .coordinator
            .create_pending(h.user_id, "transfer", serde_json::json!({ "amount": 5 }))
            .await
            .unwrap();
        let response = h.authenticator.sign_assertion(&options);

        let err = h
            .coordinator
            .resolve(operation.id, Uuid::new_v4(), &response)
            .await
            .unwrap_err();
        assert_eq!(err, StepUpError::UnknownOperation);
        // Rightful owner still succeeds.
        assert!(h
            .coordinator
            .resolve(operation.id, h.user_id, &response)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn stale_operation_does_not_match_newer_challenge() {
        let h = stepup_harness().await;
        let (stale, _) = h
            .coordinator
            .create_pending(h.user_id, "transfer", serde_json::json!({ "amount": 1 }))
            .await
            .unwrap();
        // Second step-up for the same user replaces the stored challenge.
        let (_, fresh_options) = h
            .coordinator
            .create_pending(h.user_id, "transfer", serde_json::json!({ "amount": 2 }))
            .await
            .unwrap();

        let response = h.authenticator.sign_assertion(&fresh_options);
        let err = h
            .coordinator
            .resolve(stale.id, h.user_id, &response)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StepUpError::VerificationFailed(CeremonyError::ChallengeRejected(
                ChallengeError::Mismatch
            ))
        );
        // The mismatch is a failed verification, not a claim: both
        // operations are still parked afterwards.
        assert_eq!(h.coordinator.pending_count(), 2);
    }
}
