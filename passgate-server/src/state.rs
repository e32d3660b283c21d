//! Application state module
//!
//! Defines shared state accessible across all request handlers.

use std::sync::Arc;

use passgate_core::{
    CeremonyEngine, ChallengeStore, MemoryCredentialRegistry, OsEntropy, RelyingParty,
    StepUpCoordinator, SystemClock, TracingAuditSink,
};

use crate::config::Config;
use crate::users::UserDirectory;
use crate::wallet::WalletLedger;

/// Application state containing shared resources.
#[derive(Clone)]
pub struct AppState {
    /// Passkey ceremony engine
    pub engine: Arc<CeremonyEngine>,
    /// Step-up coordinator gating wallet mutations
    pub coordinator: Arc<StepUpCoordinator>,
    /// Username directory
    pub users: Arc<UserDirectory>,
    /// Wallet ledger
    pub ledger: Arc<WalletLedger>,
}

impl AppState {
    /// Wire up the full in-memory stack from configuration.
    pub fn from_config(config: &Config) -> Self {
        let clock = Arc::new(SystemClock);
        let audit = Arc::new(TracingAuditSink);
        let challenges = Arc::new(ChallengeStore::new(clock.clone(), Arc::new(OsEntropy)));
        let engine = Arc::new(CeremonyEngine::new(
            RelyingParty::new(
                config.rp_id.clone(),
                config.rp_name.clone(),
                config.rp_origin.clone(),
            ),
            challenges,
            Arc::new(MemoryCredentialRegistry::new()),
            audit.clone(),
        ));
        let coordinator = Arc::new(StepUpCoordinator::new(engine.clone(), clock, audit));
        Self {
            engine,
            coordinator,
            users: Arc::new(UserDirectory::new()),
            ledger: Arc::new(WalletLedger::new()),
        }
    }
}
