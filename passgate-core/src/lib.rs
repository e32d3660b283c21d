//! Passgate Core - WebAuthn ceremony engine with step-up authorization
//!
//! This crate implements the server side of FIDO2/WebAuthn passkey
//! ceremonies plus a step-up layer that gates sensitive operations behind a
//! fresh assertion.
//!
//! # Features
//!
//! - Registration and authentication ceremonies with strict verification
//!   ordering (challenge, origin, RP id, signature, sign counter)
//! - Single-use challenges with a five-minute TTL, consumed atomically
//! - Sign-counter regression detection for cloned authenticators
//! - Step-up operations bound to their own challenge and released exactly
//!   once
//! - Audit sink interface with a structured-logging production sink
//! - A software authenticator for end-to-end tests
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use passgate_core::{
//!     CeremonyEngine, ChallengeStore, MemoryCredentialRegistry, OsEntropy,
//!     RelyingParty, SystemClock, TracingAuditSink,
//! };
//!
//! # async fn example() -> passgate_core::Result<()> {
//! let clock = Arc::new(SystemClock);
//! let challenges = Arc::new(ChallengeStore::new(clock, Arc::new(OsEntropy)));
//! let engine = CeremonyEngine::new(
//!     RelyingParty::new("wallet.example.com", "Example Wallet", "https://wallet.example.com"),
//!     challenges,
//!     Arc::new(MemoryCredentialRegistry::new()),
//!     Arc::new(TracingAuditSink),
//! );
//!
//! let user_id = uuid::Uuid::new_v4();
//! let options = engine.begin_registration(user_id, "alice", "Alice").await?;
//! // Hand `options` to the client; feed its response to
//! // `engine.complete_registration(user_id, &response)`.
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod authenticator;
pub mod ceremony;
pub mod challenge;
pub mod clock;
pub mod cose;
pub mod credential;
pub mod entropy;
pub mod error;
pub mod response;
pub mod simulator;
pub mod stepup;

// Re-export main types for convenience
pub use audit::{AuditEvent, AuditKind, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use authenticator::{AttestationObject, AttestedCredential, AuthenticatorData};
pub use ceremony::{
    AuthenticationOptions, CeremonyEngine, RegistrationOptions, RelyingParty,
};
pub use challenge::{
    Challenge, ChallengePurpose, ChallengeStore, CHALLENGE_LEN, CHALLENGE_TTL_SECS,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use cose::{CoseKey, ALG_ES256, ALG_PS256, ALG_RS256};
pub use credential::{Credential, CredentialRegistry, MemoryCredentialRegistry};
pub use entropy::{EntropySource, MockEntropy, OsEntropy};
pub use error::{CeremonyError, ChallengeError, RegistryError, Result, StepUpError};
pub use response::{AuthenticationResponse, RegistrationResponse};
pub use simulator::SoftAuthenticator;
pub use stepup::{PendingOperation, ResolvedOperation, StepUpCoordinator};
