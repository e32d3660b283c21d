//! A software authenticator for exercising ceremonies end to end.
//!
//! `SoftAuthenticator` behaves like a well-formed platform authenticator
//! with a single resident P-256 credential: it mints attestation objects
//! with `fmt: "none"`, signs assertions, and keeps a sign counter. Knobs for
//! the counter and the reported origin make clone and phishing scenarios
//! reproducible.
//!
//! This is test support; failures here are programmer errors, so it panics
//! rather than surfacing `Result`s into every test.

use std::sync::{Arc, Mutex};

use ciborium::value::Value;
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};
use sha2::{Digest, Sha256};

use crate::authenticator::{encode_authenticator_data, rp_id_hash, FLAG_AT, FLAG_UP, FLAG_UV};
use crate::ceremony::{AuthenticationOptions, RegistrationOptions};
use crate::cose::CoseKey;
use crate::response::{
    b64url_encode, AssertionResponse, AttestationResponse, AuthenticationResponse,
    RegistrationResponse,
};

const SOFT_AAGUID: [u8; 16] = *b"passgate-sim\0\0\0\0";

struct ResidentCredential {
    id: Vec<u8>,
    pkcs8: Vec<u8>,
}

struct Inner {
    credential: Option<ResidentCredential>,
    sign_count: u32,
}

pub struct SoftAuthenticator {
    rp_id: String,
    origin: String,
    rng: SystemRandom,
    state: Arc<Mutex<Inner>>,
}

impl SoftAuthenticator {
    pub fn new(rp_id: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            rp_id: rp_id.into(),
            origin: origin.into(),
            rng: SystemRandom::new(),
            state: Arc::new(Mutex::new(Inner {
                credential: None,
                sign_count: 0,
            })),
        }
    }

    /// A view of the same authenticator that reports a different origin,
    /// as a phishing page would.
    pub fn with_origin(&self, origin: impl Into<String>) -> Self {
        Self {
            rp_id: self.rp_id.clone(),
            origin: origin.into(),
            rng: SystemRandom::new(),
            state: self.state.clone(),
        }
    }

    /// Force the internal counter, to model clones and replays.
    pub fn set_sign_count(&self, count: u32) {
        self.state.lock().expect("authenticator state").sign_count = count;
    }

    /// Mint a new resident credential and answer the creation options.
    pub fn create_credential(&self, options: &RegistrationOptions) -> RegistrationResponse {
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &self.rng)
            .expect("P-256 keygen")
            .as_ref()
            .to_vec();
        let id: [u8; 16] = rand::random();
        {
            let mut state = self.state.lock().expect("authenticator state");
            state.credential = Some(ResidentCredential {
                id: id.to_vec(),
                pkcs8,
            });
        }
        self.attest(options)
    }

    /// Re-attest the existing resident credential against fresh options,
    /// as a second registration attempt with the same authenticator would.
    pub fn recreate_credential(&self, options: &RegistrationOptions) -> RegistrationResponse {
        self.attest(options)
    }

    fn attest(&self, options: &RegistrationOptions) -> RegistrationResponse {
        let state = self.state.lock().expect("authenticator state");
        let credential = state.credential.as_ref().expect("no resident credential");
        let keypair = self.keypair(&credential.pkcs8);
        let cose = cose_from_keypair(&keypair);

        let auth_data = encode_authenticator_data(
            &rp_id_hash(&self.rp_id),
            FLAG_UP | FLAG_UV | FLAG_AT,
            state.sign_count,
            Some((&SOFT_AAGUID, &credential.id, &cose)),
        );
        let attestation_object = encode_attestation_object(&auth_data);
        let client_data = self.client_data("webauthn.create", &options.challenge);

        RegistrationResponse {
            id: b64url_encode(&credential.id),
            raw_id: b64url_encode(&credential.id),
            credential_type: "public-key".into(),
            response: AttestationResponse {
                client_data_json: b64url_encode(&client_data),
                attestation_object: b64url_encode(&attestation_object),
                transports: vec!["internal".into()],
            },
        }
    }

    /// Answer request options with a signed assertion, bumping the counter.
    pub fn sign_assertion(&self, options: &AuthenticationOptions) -> AuthenticationResponse {
        let mut state = self.state.lock().expect("authenticator state");
        state.sign_count += 1;
        let sign_count = state.sign_count;
        let credential = state.credential.as_ref().expect("no resident credential");
        let keypair = self.keypair(&credential.pkcs8);

        let auth_data = encode_authenticator_data(
            &rp_id_hash(&self.rp_id),
            FLAG_UP | FLAG_UV,
            sign_count,
            None,
        );
        let client_data = self.client_data("webauthn.get", &options.challenge);

        let mut message = auth_data.clone();
        message.extend_from_slice(&Sha256::digest(&client_data));
        let signature = keypair.sign(&self.rng, &message).expect("P-256 signing");

        AuthenticationResponse {
            id: b64url_encode(&credential.id),
            raw_id: b64url_encode(&credential.id),
            credential_type: "public-key".into(),
            response: AssertionResponse {
                client_data_json: b64url_encode(&client_data),
                authenticator_data: b64url_encode(&auth_data),
                signature: b64url_encode(signature.as_ref()),
                user_handle: None,
            },
        }
    }

    fn keypair(&self, pkcs8: &[u8]) -> EcdsaKeyPair {
        EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8, &self.rng)
            .expect("stored PKCS#8 key")
    }

    fn client_data(&self, ceremony_type: &str, challenge: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "type": ceremony_type,
            "challenge": challenge,
            "origin": self.origin,
            "crossOrigin": false,
        }))
        .expect("client data encoding")
    }
}

fn cose_from_keypair(keypair: &EcdsaKeyPair) -> CoseKey {
    let point = keypair.public_key().as_ref();
    // Uncompressed SEC1: 0x04 || x || y.
    let x: [u8; 32] = point[1..33].try_into().expect("P-256 x coordinate");
    let y: [u8; 32] = point[33..65].try_into().expect("P-256 y coordinate");
    CoseKey::P256 { x, y }
}

fn encode_attestation_object(auth_data: &[u8]) -> Vec<u8> {
    let map = Value::Map(vec![
        (Value::Text("fmt".into()), Value::Text("none".into())),
        (Value::Text("attStmt".into()), Value::Map(vec![])),
        (Value::Text("authData".into()), Value::Bytes(auth_data.to_vec())),
    ]);
    let mut buf = Vec::new();
    ciborium::into_writer(&map, &mut buf).expect("attestation object encoding");
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authenticator::{AttestationObject, AuthenticatorData};
    use crate::response::{b64url_decode, CollectedClientData};

    fn dummy_registration_options(challenge: &str) -> RegistrationOptions {
        serde_json::from_value(serde_json::json!({
            "challenge": challenge,
            "rp": { "id": "wallet.example.com", "name": "Wallet" },
            "user": { "id": "AA", "name": "alice", "displayName": "Alice" },
            "pubKeyCredParams": [{ "type": "public-key", "alg": -7 }],
            "timeout": 60000,
            "attestation": "none",
            "excludeCredentials": [],
            "authenticatorSelection": {
                "residentKey": "preferred",
                "userVerification": "preferred"
            }
        }))
        .unwrap()
    }

    #[test]
    fn attestation_parses_and_assertion_verifies() {
        let authenticator =
            SoftAuthenticator::new("wallet.example.com", "https://wallet.example.com");
        let registration =
            authenticator.create_credential(&dummy_registration_options("Y2hhbGxlbmdl"));

        let attestation =
            AttestationObject::parse(&registration.attestation_object_bytes().unwrap()).unwrap();
        let attested = attestation.auth_data.attested_credential.unwrap();
        assert_eq!(attested.credential_id, registration.credential_id().unwrap());

        let client_data =
            CollectedClientData::parse(&registration.client_data_bytes().unwrap()).unwrap();
        assert_eq!(client_data.ceremony_type, "webauthn.create");
        assert_eq!(client_data.origin, "https://wallet.example.com");

        let options = AuthenticationOptions {
            challenge: "YW5vdGhlcg".into(),
            rp_id: "wallet.example.com".into(),
            allow_credentials: vec![],
            timeout: 60000,
            user_verification: "preferred".into(),
        };
        let assertion = authenticator.sign_assertion(&options);
        let auth_data_bytes = assertion.authenticator_data_bytes().unwrap();
        let auth_data = AuthenticatorData::parse(&auth_data_bytes).unwrap();
        assert_eq!(auth_data.sign_count, 1);

        let mut message = auth_data_bytes.clone();
        message.extend_from_slice(&Sha256::digest(assertion.client_data_bytes().unwrap()));
        attested
            .public_key
            .verify(&message, &assertion.signature_bytes().unwrap())
            .unwrap();

        let echoed = CollectedClientData::parse(&assertion.client_data_bytes().unwrap()).unwrap();
        assert_eq!(
            b64url_decode("challenge", &echoed.challenge).unwrap(),
            b"another".to_vec()
        );
    }
}
