//! Authenticator data and attestation object parsing.
//!
//! The authenticator data layout is fixed by the WebAuthn spec:
//!
//! ```text
//! rpIdHash (32) || flags (1) || signCount (4, BE) || [attestedCredentialData] || [extensions]
//! ```
//!
//! Attested credential data (present when FLAG_AT is set) is:
//!
//! ```text
//! aaguid (16) || credentialIdLength (2, BE) || credentialId || credentialPublicKey (COSE CBOR)
//! ```

use ciborium::value::Value;
use sha2::{Digest, Sha256};

use crate::cose::CoseKey;
use crate::error::CeremonyError;

/// User present.
pub const FLAG_UP: u8 = 0x01;
/// User verified.
pub const FLAG_UV: u8 = 0x04;
/// Attested credential data included.
pub const FLAG_AT: u8 = 0x40;
/// Extension data included.
pub const FLAG_ED: u8 = 0x80;

const MIN_AUTH_DATA_LEN: usize = 37;

/// SHA-256 of the relying party identifier, as authenticators compute it.
pub fn rp_id_hash(rp_id: &str) -> [u8; 32] {
    Sha256::digest(rp_id.as_bytes()).into()
}

/// Credential material minted during registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredential {
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
    pub public_key: CoseKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub sign_count: u32,
    pub attested_credential: Option<AttestedCredential>,
    /// The exact bytes that were parsed; signatures cover these.
    pub raw: Vec<u8>,
}

impl AuthenticatorData {
    pub fn parse(bytes: &[u8]) -> Result<Self, CeremonyError> {
        if bytes.len() < MIN_AUTH_DATA_LEN {
            return Err(CeremonyError::InvalidAssertion(format!(
                "authenticator data too short: {} bytes",
                bytes.len()
            )));
        }

        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&bytes[..32]);
        let flags = bytes[32];
        let sign_count = u32::from_be_bytes([bytes[33], bytes[34], bytes[35], bytes[36]]);

        let attested_credential = if flags & FLAG_AT != 0 {
            Some(parse_attested_credential(&bytes[MIN_AUTH_DATA_LEN..])?)
        } else {
            None
        };

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested_credential,
            raw: bytes.to_vec(),
        })
    }

    pub fn user_present(&self) -> bool {
        self.flags & FLAG_UP != 0
    }

    pub fn user_verified(&self) -> bool {
        self.flags & FLAG_UV != 0
    }
}

fn parse_attested_credential(bytes: &[u8]) -> Result<AttestedCredential, CeremonyError> {
    if bytes.len() < 18 {
        return Err(CeremonyError::InvalidAssertion(
            "attested credential data truncated".into(),
        ));
    }
    let mut aaguid = [0u8; 16];
    aaguid.copy_from_slice(&bytes[..16]);
    let id_len = u16::from_be_bytes([bytes[16], bytes[17]]) as usize;
    if id_len == 0 {
        return Err(CeremonyError::InvalidAssertion(
            "empty credential id".into(),
        ));
    }
    if bytes.len() < 18 + id_len {
        return Err(CeremonyError::InvalidAssertion(
            "credential id exceeds authenticator data".into(),
        ));
    }
    let credential_id = bytes[18..18 + id_len].to_vec();

    // ciborium stops after one value, which tolerates trailing extension data.
    let key_value: Value = ciborium::from_reader(&bytes[18 + id_len..])
        .map_err(|e| CeremonyError::InvalidAssertion(format!("credential public key: {e}")))?;
    let public_key = CoseKey::from_value(&key_value)
        .map_err(|e| CeremonyError::InvalidAssertion(format!("credential public key: {e}")))?;

    Ok(AttestedCredential {
        aaguid,
        credential_id,
        public_key,
    })
}

/// The CBOR attestation object from a registration response.
#[derive(Debug, Clone)]
pub struct AttestationObject {
    pub fmt: String,
    pub auth_data: AuthenticatorData,
}

impl AttestationObject {
    /// Decode the `{fmt, attStmt, authData}` CBOR map.
    ///
    /// We accept any attestation format but never verify the statement;
    /// only self-asserted ("none") trust is modeled.
    pub fn parse(bytes: &[u8]) -> Result<Self, CeremonyError> {
        let value: Value = ciborium::from_reader(bytes)
            .map_err(|e| CeremonyError::InvalidAssertion(format!("attestation object: {e}")))?;
        let Value::Map(map) = value else {
            return Err(CeremonyError::InvalidAssertion(
                "attestation object must be a CBOR map".into(),
            ));
        };

        let mut fmt = None;
        let mut auth_data_bytes = None;
        for (key, val) in &map {
            let Value::Text(name) = key else { continue };
            match (name.as_str(), val) {
                ("fmt", Value::Text(s)) => fmt = Some(s.clone()),
                ("authData", Value::Bytes(b)) => auth_data_bytes = Some(b.clone()),
                _ => {}
            }
        }

        let fmt = fmt.ok_or_else(|| {
            CeremonyError::InvalidAssertion("attestation object missing fmt".into())
        })?;
        let auth_data_bytes = auth_data_bytes.ok_or_else(|| {
            CeremonyError::InvalidAssertion("attestation object missing authData".into())
        })?;
        let auth_data = AuthenticatorData::parse(&auth_data_bytes)?;

        if auth_data.attested_credential.is_none() {
            return Err(CeremonyError::InvalidAssertion(
                "registration authenticator data lacks attested credential".into(),
            ));
        }

        Ok(Self { fmt, auth_data })
    }
}

/// Serialize authenticator data back to its wire layout.
///
/// Used by the software authenticator; real ceremonies only ever parse.
pub fn encode_authenticator_data(
    rp_id_hash: &[u8; 32],
    flags: u8,
    sign_count: u32,
    attested: Option<(&[u8; 16], &[u8], &CoseKey)>,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(MIN_AUTH_DATA_LEN);
    out.extend_from_slice(rp_id_hash);
    out.push(flags);
    out.extend_from_slice(&sign_count.to_be_bytes());
    if let Some((aaguid, credential_id, key)) = attested {
        out.extend_from_slice(aaguid);
        out.extend_from_slice(&(credential_id.len() as u16).to_be_bytes());
        out.extend_from_slice(credential_id);
        out.extend_from_slice(&key.to_cbor());
    }
    out
}
