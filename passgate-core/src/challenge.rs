//! In-memory challenge store.
//!
//! Outstanding ceremony challenges are short-lived (5 minute expiry) and
//! never persisted. At most one unconsumed challenge exists per
//! `(user, purpose)` key: issuing a new one replaces the previous, so a
//! stale challenge can never be satisfied later by a reused signature.
//!
//! All mutations go through [`ChallengeStore::issue`] and
//! [`ChallengeStore::consume`]; consume is atomic per key (the dashmap
//! entry guard makes the check-and-mark a single critical section), so
//! concurrent consumers observe at most one success.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::clock::Clock;
use crate::entropy::EntropySource;
use crate::error::ChallengeError;

/// Default challenge lifetime (matches the WebAuthn ceremony timeout).
pub const CHALLENGE_TTL_SECS: i64 = 300;

/// Challenge values are 32 random bytes (spec minimum is 16).
pub const CHALLENGE_LEN: usize = 32;

/// What a challenge was issued for. A response produced for one purpose can
/// never consume a challenge of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ChallengePurpose {
    Registration,
    Authentication,
    StepUp,
}

/// An outstanding cryptographic challenge bound to one user and purpose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub value: Vec<u8>,
    pub purpose: ChallengePurpose,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

impl Challenge {
    /// A challenge is usable for verification iff it is unconsumed and
    /// unexpired.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.consumed && now <= self.expires_at
    }
}

/// Process-wide keyed storage of outstanding challenges.
pub struct ChallengeStore {
    entries: DashMap<(Uuid, ChallengePurpose), Challenge>,
    clock: Arc<dyn Clock>,
    entropy: Arc<dyn EntropySource>,
    ttl: Duration,
}

impl ChallengeStore {
    pub fn new(clock: Arc<dyn Clock>, entropy: Arc<dyn EntropySource>) -> Self {
        Self::with_ttl(clock, entropy, Duration::seconds(CHALLENGE_TTL_SECS))
    }

    pub fn with_ttl(
        clock: Arc<dyn Clock>,
        entropy: Arc<dyn EntropySource>,
        ttl: Duration,
    ) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            entropy,
            ttl,
        }
    }

    /// The clock this store runs on; shared with callers that need to stamp
    /// artifacts consistently with challenge expiry.
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Mint and store a fresh challenge for `(user, purpose)`, replacing any
    /// prior outstanding one for that key.
    pub fn issue(&self, user_id: Uuid, purpose: ChallengePurpose) -> Challenge {
        let now = self.clock.now();
        let challenge = Challenge {
            value: self.entropy.random_bytes(CHALLENGE_LEN),
            purpose,
            user_id,
            created_at: now,
            expires_at: now + self.ttl,
            consumed: false,
        };
        self.entries.insert((user_id, purpose), challenge.clone());
        tracing::debug!(
            user_id = %user_id,
            purpose = ?purpose,
            expires_at = %challenge.expires_at,
            "challenge issued"
        );
        challenge
    }

    /// Validate and mark the stored challenge consumed, exactly once.
    ///
    /// Expired entries are evicted on the way out. The comparison runs on
    /// decoded bytes; callers must never pass an encoded string form.
    pub fn consume(
        &self,
        user_id: Uuid,
        purpose: ChallengePurpose,
        presented: &[u8],
    ) -> Result<Challenge, ChallengeError> {
        let now = self.clock.now();
        match self.entries.entry((user_id, purpose)) {
            Entry::Vacant(_) => Err(ChallengeError::NotFound),
            Entry::Occupied(mut entry) => {
                if now > entry.get().expires_at {
                    entry.remove();
                    return Err(ChallengeError::Expired);
                }
                if entry.get().consumed {
                    return Err(ChallengeError::AlreadyConsumed);
                }
                if entry.get().value != presented {
                    return Err(ChallengeError::Mismatch);
                }
                entry.get_mut().consumed = true;
                Ok(entry.get().clone())
            }
        }
    }

    /// Evict expired and consumed entries. Expiry is also enforced lazily in
    /// [`consume`](Self::consume); the sweep only reclaims memory.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries
            .retain(|_, challenge| challenge.is_usable(now));
        before - self.entries.len()
    }

    /// Number of stored (not necessarily usable) challenges.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ChallengeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeStore")
            .field("entries", &self.entries.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::entropy::MockEntropy;

    fn store_with_clock() -> (ChallengeStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let store = ChallengeStore::new(clock.clone(), Arc::new(MockEntropy::default()));
        (store, clock)
    }

    #[test]
    fn issue_then_consume_succeeds_once() {
        let (store, _) = store_with_clock();
        let user = Uuid::new_v4();
        let challenge = store.issue(user, ChallengePurpose::Registration);
        assert_eq!(challenge.value.len(), CHALLENGE_LEN);

        let consumed = store
            .consume(user, ChallengePurpose::Registration, &challenge.value)
            .unwrap();
        assert!(consumed.consumed);

        assert_eq!(
            store.consume(user, ChallengePurpose::Registration, &challenge.value),
            Err(ChallengeError::AlreadyConsumed)
        );
    }

    #[test]
    fn consume_unknown_key_is_not_found() {
        let (store, _) = store_with_clock();
        assert_eq!(
            store.consume(Uuid::new_v4(), ChallengePurpose::Authentication, b"x"),
            Err(ChallengeError::NotFound)
        );
    }

    #[test]
    fn consume_wrong_value_is_mismatch() {
        let (store, _) = store_with_clock();
        let user = Uuid::new_v4();
        let challenge = store.issue(user, ChallengePurpose::Authentication);
        let mut wrong = challenge.value.clone();
        wrong[0] ^= 0xFF;
        assert_eq!(
            store.consume(user, ChallengePurpose::Authentication, &wrong),
            Err(ChallengeError::Mismatch)
        );
        // A mismatch does not consume the stored challenge.
        assert!(store
            .consume(user, ChallengePurpose::Authentication, &challenge.value)
            .is_ok());
    }

    #[test]
    fn consume_after_ttl_is_expired_and_evicts() {
        let (store, clock) = store_with_clock();
        let user = Uuid::new_v4();
        let challenge = store.issue(user, ChallengePurpose::StepUp);
        clock.advance(Duration::seconds(CHALLENGE_TTL_SECS + 1));
        assert_eq!(
            store.consume(user, ChallengePurpose::StepUp, &challenge.value),
            Err(ChallengeError::Expired)
        );
        // Evicted: a second attempt is NotFound, not Expired.
        assert_eq!(
            store.consume(user, ChallengePurpose::StepUp, &challenge.value),
            Err(ChallengeError::NotFound)
        );
    }

    #[test]
    fn reissue_replaces_prior_challenge() {
        let (store, _) = store_with_clock();
        let user = Uuid::new_v4();
        let first = store.issue(user, ChallengePurpose::Authentication);
        let second = store.issue(user, ChallengePurpose::Authentication);
        assert_ne!(first.value, second.value);
        assert_eq!(
            store.consume(user, ChallengePurpose::Authentication, &first.value),
            Err(ChallengeError::Mismatch)
        );
        assert!(store
            .consume(user, ChallengePurpose::Authentication, &second.value)
            .is_ok());
    }

    #[test]
    fn purposes_are_isolated() {
        let (store, _) = store_with_clock();
        let user = Uuid::new_v4();
        let reg = store.issue(user, ChallengePurpose::Registration);
        let auth = store.issue(user, ChallengePurpose::Authentication);
        assert!(store
            .consume(user, ChallengePurpose::Registration, &reg.value)
            .is_ok());
        assert!(store
            .consume(user, ChallengePurpose::Authentication, &auth.value)
            .is_ok());
    }

    #[test]
    fn sweep_reclaims_expired_and_consumed() {
        let (store, clock) = store_with_clock();
        let user = Uuid::new_v4();
        let consumed = store.issue(user, ChallengePurpose::Registration);
        store
            .consume(user, ChallengePurpose::Registration, &consumed.value)
            .unwrap();
        store.issue(user, ChallengePurpose::Authentication);
        store.issue(Uuid::new_v4(), ChallengePurpose::StepUp);

        clock.advance(Duration::seconds(CHALLENGE_TTL_SECS + 1));
        store.issue(user, ChallengePurpose::StepUp); // still fresh

        assert_eq!(store.sweep(), 3);
        assert_eq!(store.len(), 1);
    }

    /// N concurrent consumers of one challenge: exactly one success, the
    /// rest observe AlreadyConsumed.
    #[test]
    fn concurrent_consume_is_at_most_once() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(ChallengeStore::new(
            clock,
            Arc::new(MockEntropy::default()),
        ));
        let user = Uuid::new_v4();
        let challenge = store.issue(user, ChallengePurpose::StepUp);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            let value = challenge.value.clone();
            handles.push(std::thread::spawn(move || {
                store.consume(user, ChallengePurpose::StepUp, &value)
            }));
        }

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "exactly one consumer may win");
        assert!(results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| r == &Err(ChallengeError::AlreadyConsumed)));
    }
}
