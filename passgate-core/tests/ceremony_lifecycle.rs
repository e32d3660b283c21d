//! End-to-end ceremony tests through the public API.
//!
//! These drive the engine the way a server would: options out, simulated
//! authenticator responses back in, with outcomes checked against the
//! registry, the audit trail, and the step-up coordinator.

use std::sync::Arc;

use passgate_core::{
    AuditKind, CeremonyEngine, CeremonyError, ChallengeError, ChallengeStore, ManualClock,
    MemoryAuditSink, MemoryCredentialRegistry, MockEntropy, RelyingParty, SoftAuthenticator,
    StepUpCoordinator, StepUpError,
};
use uuid::Uuid;

const RP_ID: &str = "wallet.example.com";
const ORIGIN: &str = "https://wallet.example.com";

struct World {
    engine: Arc<CeremonyEngine>,
    coordinator: StepUpCoordinator,
    clock: Arc<ManualClock>,
    audit: Arc<MemoryAuditSink>,
}

fn world() -> World {
    let clock = Arc::new(ManualClock::starting_now());
    let audit = Arc::new(MemoryAuditSink::new());
    let challenges = Arc::new(ChallengeStore::new(
        clock.clone(),
        Arc::new(MockEntropy::default()),
    ));
    let engine = Arc::new(CeremonyEngine::new(
        RelyingParty::new(RP_ID, "Passgate Wallet", ORIGIN),
        challenges,
        Arc::new(MemoryCredentialRegistry::new()),
        audit.clone(),
    ));
    let coordinator = StepUpCoordinator::new(engine.clone(), clock.clone(), audit.clone());
    World {
        engine,
        coordinator,
        clock,
        audit,
    }
}

async fn enroll(world: &World, user_id: Uuid, username: &str) -> SoftAuthenticator {
    let authenticator = SoftAuthenticator::new(RP_ID, ORIGIN);
    let options = world
        .engine
        .begin_registration(user_id, username, username)
        .await
        .unwrap();
    let response = authenticator.create_credential(&options);
    world
        .engine
        .complete_registration(user_id, &response)
        .await
        .unwrap();
    authenticator
}

#[tokio::test]
async fn register_login_and_step_up() {
    let world = world();
    let alice = Uuid::new_v4();
    let authenticator = enroll(&world, alice, "alice").await;

    // Login.
    let options = world.engine.begin_authentication(alice).await.unwrap();
    let assertion = authenticator.sign_assertion(&options);
    let credential = world
        .engine
        .complete_authentication(alice, &assertion)
        .await
        .unwrap();
    assert_eq!(credential.user_id, alice);
    assert!(credential.last_used_at.is_some());

    // Step-up gated transfer.
    let payload = serde_json::json!({ "to": "bob", "amount": 120 });
    let (operation, options) = world
        .coordinator
        .create_pending(alice, "transfer", payload.clone())
        .await
        .unwrap();
    let assertion = authenticator.sign_assertion(&options);
    let resolved = world
        .coordinator
        .resolve(operation.id, alice, &assertion)
        .await
        .unwrap();
    assert_eq!(resolved.operation.payload, payload);

    use AuditKind::*;
    assert_eq!(
        world.audit.kinds(),
        vec![
            RegistrationStarted,
            RegistrationSucceeded,
            AuthenticationStarted,
            AuthenticationSucceeded,
            StepUpCreated,
            StepUpResolved
        ]
    );
}

#[tokio::test]
async fn replayed_assertion_is_rejected() {
    let world = world();
    let alice = Uuid::new_v4();
    let authenticator = enroll(&world, alice, "alice").await;

    let options = world.engine.begin_authentication(alice).await.unwrap();
    let assertion = authenticator.sign_assertion(&options);
    world
        .engine
        .complete_authentication(alice, &assertion)
        .await
        .unwrap();

    // The exact same response again: the challenge is gone.
    let err = world
        .engine
        .complete_authentication(alice, &assertion)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        CeremonyError::ChallengeRejected(ChallengeError::NotFound)
    );
}

#[tokio::test]
async fn registration_challenge_does_not_satisfy_authentication() {
    let world = world();
    let alice = Uuid::new_v4();
    let authenticator = enroll(&world, alice, "alice").await;

    // A registration challenge is outstanding, but no authentication one.
    let reg_options = world
        .engine
        .begin_registration(alice, "alice", "alice")
        .await
        .unwrap();
    let forged = passgate_core::AuthenticationOptions {
        challenge: reg_options.challenge.clone(),
        rp_id: RP_ID.into(),
        allow_credentials: vec![],
        timeout: 60_000,
        user_verification: "preferred".into(),
    };
    let assertion = authenticator.sign_assertion(&forged);
    let err = world
        .engine
        .complete_authentication(alice, &assertion)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        CeremonyError::ChallengeRejected(ChallengeError::NotFound)
    );
}

#[tokio::test]
async fn users_are_isolated() {
    let world = world();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let alice_authenticator = enroll(&world, alice, "alice").await;
    enroll(&world, bob, "bob").await;

    // Bob's ceremony answered with Alice's credential.
    let options = world.engine.begin_authentication(bob).await.unwrap();
    let assertion = alice_authenticator.sign_assertion(&options);
    let err = world
        .engine
        .complete_authentication(bob, &assertion)
        .await
        .unwrap_err();
    assert_eq!(err, CeremonyError::UnknownCredential);
}

#[tokio::test]
async fn second_authenticator_can_also_log_in() {
    let world = world();
    let alice = Uuid::new_v4();
    let first = enroll(&world, alice, "alice").await;
    let second = enroll(&world, alice, "alice").await;

    let options = world.engine.begin_authentication(alice).await.unwrap();
    assert_eq!(options.allow_credentials.len(), 2);
    let assertion = second.sign_assertion(&options);
    world
        .engine
        .complete_authentication(alice, &assertion)
        .await
        .unwrap();

    let options = world.engine.begin_authentication(alice).await.unwrap();
    let assertion = first.sign_assertion(&options);
    world
        .engine
        .complete_authentication(alice, &assertion)
        .await
        .unwrap();
}

#[tokio::test]
async fn step_up_survives_clock_up_to_the_deadline() {
    let world = world();
    let alice = Uuid::new_v4();
    let authenticator = enroll(&world, alice, "alice").await;

    let (operation, options) = world
        .coordinator
        .create_pending(alice, "deposit", serde_json::json!({ "amount": 900 }))
        .await
        .unwrap();

    // Just inside the window still verifies; just outside does not.
    world.clock.advance(chrono::Duration::seconds(299));
    let assertion = authenticator.sign_assertion(&options);
    world
        .coordinator
        .resolve(operation.id, alice, &assertion)
        .await
        .unwrap();

    let (operation, options) = world
        .coordinator
        .create_pending(alice, "deposit", serde_json::json!({ "amount": 900 }))
        .await
        .unwrap();
    world.clock.advance(chrono::Duration::seconds(301));
    let assertion = authenticator.sign_assertion(&options);
    let err = world
        .coordinator
        .resolve(operation.id, alice, &assertion)
        .await
        .unwrap_err();
    assert_eq!(err, StepUpError::OperationExpired);
}
