//! Registered public-key credentials and their storage interface.
//!
//! The registry is async so persistent backends can sit behind it; the
//! in-memory implementation ships here and is what tests and the bundled
//! server use. Credential ids are globally unique across users (WebAuthn
//! convention - an authenticator never mints the same id twice).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::RegistryError;

/// A registered public-key credential.
///
/// `public_key` holds the COSE-encoded key material exactly as attested at
/// registration; it is immutable afterwards. `sign_count` is the last value
/// accepted from the authenticator.
#[derive(Debug, Clone)]
pub struct Credential {
    pub id: Vec<u8>,
    pub user_id: Uuid,
    pub public_key: Vec<u8>,
    pub sign_count: u32,
    pub transports: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(
        id: Vec<u8>,
        user_id: Uuid,
        public_key: Vec<u8>,
        sign_count: u32,
        transports: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            public_key,
            sign_count,
            transports,
            created_at: now,
            last_used_at: None,
        }
    }

    /// Short stable digest of the credential id, safe to log.
    pub fn id_digest(&self) -> String {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(&self.id);
        hex::encode(&digest[..8])
    }
}

/// Per-user set of registered credentials.
#[async_trait]
pub trait CredentialRegistry: Send + Sync {
    /// Insert a newly attested credential. Fails with
    /// [`RegistryError::Duplicate`] if the id exists for any user.
    async fn register(&self, credential: Credential) -> Result<(), RegistryError>;

    async fn find(&self, credential_id: &[u8]) -> Option<Credential>;

    /// All credentials of one user, ordered by registration time (the order
    /// `allowCredentials` is built in).
    async fn list_for_user(&self, user_id: Uuid) -> Vec<Credential>;

    /// Apply the sign-counter check and update atomically, returning the
    /// updated credential.
    ///
    /// Accepts `new_count > stored`, or both exactly zero (authenticators
    /// without a counter report 0 forever). Anything else while the stored
    /// counter is non-zero is a [`RegistryError::CounterRegression`].
    async fn update_sign_count(
        &self,
        credential_id: &[u8],
        new_count: u32,
        now: DateTime<Utc>,
    ) -> Result<Credential, RegistryError>;
}

/// In-memory registry backed by a concurrent map.
#[derive(Default)]
pub struct MemoryCredentialRegistry {
    credentials: DashMap<Vec<u8>, Credential>,
}

impl MemoryCredentialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

#[async_trait]
impl CredentialRegistry for MemoryCredentialRegistry {
    async fn register(&self, credential: Credential) -> Result<(), RegistryError> {
        match self.credentials.entry(credential.id.clone()) {
            Entry::Occupied(_) => Err(RegistryError::Duplicate),
            Entry::Vacant(slot) => {
                tracing::debug!(
                    user_id = %credential.user_id,
                    credential = %credential.id_digest(),
                    "credential registered"
                );
                slot.insert(credential);
                Ok(())
            }
        }
    }

    async fn find(&self, credential_id: &[u8]) -> Option<Credential> {
        self.credentials.get(credential_id).map(|c| c.clone())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Vec<Credential> {
        let mut creds: Vec<Credential> = self
            .credentials
            .iter()
            .filter(|c| c.user_id == user_id)
            .map(|c| c.clone())
            .collect();
        creds.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        creds
    }

    async fn update_sign_count(
        &self,
        credential_id: &[u8],
        new_count: u32,
        now: DateTime<Utc>,
    ) -> Result<Credential, RegistryError> {
        // The entry guard makes the check-then-update atomic; two racing
        // authentications cannot both pass the check against a stale read.
        let mut entry = self
            .credentials
            .get_mut(credential_id)
            .ok_or(RegistryError::Unknown)?;
        let stored = entry.sign_count;
        if stored > 0 && new_count <= stored {
            return Err(RegistryError::CounterRegression {
                stored,
                presented: new_count,
            });
        }
        entry.sign_count = new_count;
        entry.last_used_at = Some(now);
        Ok(entry.clone())
    }
}
