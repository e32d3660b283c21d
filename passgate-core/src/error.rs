use thiserror::Error;

/// Failures of the challenge store's consume path.
///
/// All of these are recoverable by restarting the ceremony; the core never
/// retries a consume on its own.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChallengeError {
    #[error("no outstanding challenge for this user and purpose")]
    NotFound,

    #[error("challenge expired")]
    Expired,

    #[error("presented challenge does not match the issued one")]
    Mismatch,

    #[error("challenge already consumed")]
    AlreadyConsumed,
}

/// Failures of the credential registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("credential id already registered")]
    Duplicate,

    /// Sign counter went backwards while the stored counter was non-zero.
    /// Treated as a probable cloned credential, never silently accepted.
    #[error("sign counter regression: stored {stored}, presented {presented}")]
    CounterRegression { stored: u32, presented: u32 },

    #[error("credential not found")]
    Unknown,
}

/// Terminal failures of a registration or authentication ceremony.
///
/// A ceremony instance never retries; the caller must begin a fresh one
/// (which issues a fresh challenge).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CeremonyError {
    #[error("malformed client data: {0}")]
    InvalidClientData(String),

    #[error("malformed assertion: {0}")]
    InvalidAssertion(String),

    #[error("origin mismatch")]
    OriginMismatch,

    #[error("relying party id mismatch")]
    RpIdMismatch,

    #[error("unknown credential")]
    UnknownCredential,

    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("challenge rejected: {0}")]
    ChallengeRejected(#[from] ChallengeError),

    #[error("registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("user has no registered credentials")]
    NoCredentials,
}

/// Failures of step-up operation resolution, terminal for that operation id.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StepUpError {
    #[error("unknown or already resolved operation")]
    UnknownOperation,

    #[error("operation expired")]
    OperationExpired,

    #[error("step-up verification failed: {0}")]
    VerificationFailed(#[from] CeremonyError),
}

pub type Result<T, E = CeremonyError> = std::result::Result<T, E>;
