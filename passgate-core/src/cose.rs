//! COSE public keys and signature verification.
//!
//! Authenticators hand the relying party a COSE_Key (RFC 9052) CBOR map at
//! registration. We accept the two families real-world authenticators use:
//!
//! - EC2 / P-256 with ES256 (`alg -7`) - the overwhelmingly common case
//! - RSA with RS256 (`alg -257`) or PS256 (`alg -37`) - Windows Hello
//!
//! Verification is delegated to `ring`; RSA keys are wrapped into the ASN.1
//! DER `RSAPublicKey` form ring expects.

use ciborium::value::{Integer, Value};
use thiserror::Error;

/// ES256: ECDSA over P-256 with SHA-256.
pub const ALG_ES256: i64 = -7;
/// RS256: RSASSA-PKCS1-v1_5 with SHA-256.
pub const ALG_RS256: i64 = -257;
/// PS256: RSASSA-PSS with SHA-256.
pub const ALG_PS256: i64 = -37;

const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;
const CRV_P256: i64 = 1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoseError {
    #[error("not a CBOR map: {0}")]
    Malformed(String),

    #[error("unsupported key type {0}")]
    UnsupportedKeyType(i64),

    #[error("unsupported algorithm {0}")]
    UnsupportedAlgorithm(i64),

    #[error("missing or malformed parameter {0}")]
    MissingParameter(&'static str),

    #[error("signature does not verify")]
    BadSignature,
}

/// A decoded COSE public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoseKey {
    /// P-256 point, ES256.
    P256 { x: [u8; 32], y: [u8; 32] },
    /// RSA modulus and exponent, RS256 or PS256 by `alg`.
    Rsa { alg: i64, n: Vec<u8>, e: Vec<u8> },
}

impl CoseKey {
    /// Strict decode of a COSE_Key CBOR map.
    pub fn parse(bytes: &[u8]) -> Result<Self, CoseError> {
        let value: Value = ciborium::from_reader(bytes)
            .map_err(|e| CoseError::Malformed(e.to_string()))?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, CoseError> {
        let Value::Map(map) = value else {
            return Err(CoseError::Malformed("COSE key must be a CBOR map".into()));
        };

        let kty = int_param(map, 1).ok_or(CoseError::MissingParameter("kty"))?;
        let alg = int_param(map, 3).ok_or(CoseError::MissingParameter("alg"))?;

        match kty {
            KTY_EC2 => {
                if alg != ALG_ES256 {
                    return Err(CoseError::UnsupportedAlgorithm(alg));
                }
                let crv = int_param(map, -1).ok_or(CoseError::MissingParameter("crv"))?;
                if crv != CRV_P256 {
                    return Err(CoseError::MissingParameter("crv"));
                }
                let x = coord(map, -2, "x")?;
                let y = coord(map, -3, "y")?;
                Ok(CoseKey::P256 { x, y })
            }
            KTY_RSA => {
                if alg != ALG_RS256 && alg != ALG_PS256 {
                    return Err(CoseError::UnsupportedAlgorithm(alg));
                }
                let n = bytes_param(map, -1).ok_or(CoseError::MissingParameter("n"))?;
                let e = bytes_param(map, -2).ok_or(CoseError::MissingParameter("e"))?;
                Ok(CoseKey::Rsa { alg, n, e })
            }
            other => Err(CoseError::UnsupportedKeyType(other)),
        }
    }

    pub fn algorithm(&self) -> i64 {
        match self {
            CoseKey::P256 { .. } => ALG_ES256,
            CoseKey::Rsa { alg, .. } => *alg,
        }
    }

    /// Canonical CBOR re-encoding, stored as the credential's public key.
    pub fn to_cbor(&self) -> Vec<u8> {
        let map = match self {
            CoseKey::P256 { x, y } => Value::Map(vec![
                (int(1), int(KTY_EC2)),
                (int(3), int(ALG_ES256)),
                (int(-1), int(CRV_P256)),
                (int(-2), Value::Bytes(x.to_vec())),
                (int(-3), Value::Bytes(y.to_vec())),
            ]),
            CoseKey::Rsa { alg, n, e } => Value::Map(vec![
                (int(1), int(KTY_RSA)),
                (int(3), int(*alg)),
                (int(-1), Value::Bytes(n.clone())),
                (int(-2), Value::Bytes(e.clone())),
            ]),
        };
        let mut buf = Vec::new();
        ciborium::into_writer(&map, &mut buf).expect("COSE key encoding is infallible");
        buf
    }

    /// Verify `signature` over `message` with this key.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), CoseError> {
        use ring::signature::{
            UnparsedPublicKey, ECDSA_P256_SHA256_ASN1, RSA_PKCS1_2048_8192_SHA256,
            RSA_PSS_2048_8192_SHA256,
        };
        match self {
            CoseKey::P256 { x, y } => {
                // Uncompressed SEC1 point: 0x04 || x || y.
                let mut point = Vec::with_capacity(65);
                point.push(0x04);
                point.extend_from_slice(x);
                point.extend_from_slice(y);
                UnparsedPublicKey::new(&ECDSA_P256_SHA256_ASN1, &point)
                    .verify(message, signature)
                    .map_err(|_| CoseError::BadSignature)
            }
            CoseKey::Rsa { alg, n, e } => {
                let der = rsa_public_key_der(n, e);
                let params: &'static dyn ring::signature::VerificationAlgorithm = if *alg == ALG_PS256 {
                    &RSA_PSS_2048_8192_SHA256
                } else {
                    &RSA_PKCS1_2048_8192_SHA256
                };
                UnparsedPublicKey::new(params, &der)
                    .verify(message, signature)
                    .map_err(|_| CoseError::BadSignature)
            }
        }
    }
}

fn int(v: i64) -> Value {
    Value::Integer(Integer::from(v))
}

fn lookup<'a>(map: &'a [(Value, Value)], label: i64) -> Option<&'a Value> {
    map.iter().find_map(|(k, v)| match k {
        Value::Integer(i) if i128::from(*i) == i128::from(label) => Some(v),
        _ => None,
    })
}

fn int_param(map: &[(Value, Value)], label: i64) -> Option<i64> {
    match lookup(map, label)? {
        Value::Integer(i) => i64::try_from(i128::from(*i)).ok(),
        _ => None,
    }
}

fn bytes_param(map: &[(Value, Value)], label: i64) -> Option<Vec<u8>> {
    match lookup(map, label)? {
        Value::Bytes(b) => Some(b.clone()),
        _ => None,
    }
}

fn coord(map: &[(Value, Value)], label: i64, name: &'static str) -> Result<[u8; 32], CoseError> {
    let bytes = bytes_param(map, label).ok_or(CoseError::MissingParameter(name))?;
    <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| CoseError::MissingParameter(name))
}

/// DER-encode `RSAPublicKey ::= SEQUENCE { modulus INTEGER, exponent INTEGER }`.
///
/// ring's RSA verifiers take this form rather than raw (n, e).
fn rsa_public_key_der(n: &[u8], e: &[u8]) -> Vec<u8> {
    let n_der = der_integer(n);
    let e_der = der_integer(e);
    let mut body = n_der;
    body.extend_from_slice(&e_der);
    let mut out = vec![0x30];
    der_length(&mut out, body.len());
    out.extend_from_slice(&body);
    out
}

fn der_integer(bytes: &[u8]) -> Vec<u8> {
    let trimmed: Vec<u8> = bytes.iter().skip_while(|&&b| b == 0).copied().collect();
    let trimmed = if trimmed.is_empty() { vec![0] } else { trimmed };
    let pad = trimmed[0] & 0x80 != 0;
    let mut out = vec![0x02];
    der_length(&mut out, trimmed.len() + pad as usize);
    if pad {
        out.push(0);
    }
    out.extend_from_slice(&trimmed);
    out
}

/// Definite-form DER length octets (RSA moduli need the long form).
fn der_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
    } else if len <= 0xFF {
        out.push(0x81);
        out.push(len as u8);
    } else {
        out.push(0x82);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ring::rand::SystemRandom;
    use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};

    fn p256_keypair() -> (EcdsaKeyPair, CoseKey) {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng).unwrap();
        let keypair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &rng)
                .unwrap();
        let point = keypair.public_key().as_ref().to_vec();
        assert_eq!(point[0], 0x04);
        let cose = CoseKey::P256 {
            x: point[1..33].try_into().unwrap(),
            y: point[33..65].try_into().unwrap(),
        };
        (keypair, cose)
    }

    #[test]
    fn p256_roundtrip_parse_and_verify() {
        let (keypair, cose) = p256_keypair();
        let reparsed = CoseKey::parse(&cose.to_cbor()).unwrap();
        assert_eq!(reparsed, cose);
        assert_eq!(reparsed.algorithm(), ALG_ES256);

        let rng = SystemRandom::new();
        let message = b"authenticator data || client data hash";
        let sig = keypair.sign(&rng, message).unwrap();
        reparsed.verify(message, sig.as_ref()).unwrap();
    }

    #[test]
    fn p256_rejects_tampered_message() {
        let (keypair, cose) = p256_keypair();
        let rng = SystemRandom::new();
        let sig = keypair.sign(&rng, b"original").unwrap();
        assert_eq!(
            cose.verify(b"tampered", sig.as_ref()),
            Err(CoseError::BadSignature)
        );
    }

    #[test]
    fn rsa_key_parses() {
        let cose = CoseKey::Rsa {
            alg: ALG_RS256,
            n: vec![0xAB; 256],
            e: vec![0x01, 0x00, 0x01],
        };
        let reparsed = CoseKey::parse(&cose.to_cbor()).unwrap();
        assert_eq!(reparsed, cose);
        assert_eq!(reparsed.algorithm(), ALG_RS256);
    }

    #[test]
    fn rejects_unknown_key_type_and_algorithm() {
        // kty 1 (OKP) is not accepted.
        let okp = Value::Map(vec![(int(1), int(1)), (int(3), int(-8))]);
        let mut buf = Vec::new();
        ciborium::into_writer(&okp, &mut buf).unwrap();
        assert_eq!(CoseKey::parse(&buf), Err(CoseError::UnsupportedKeyType(1)));

        // EC2 with a non-ES256 alg is not accepted.
        let bad_alg = Value::Map(vec![(int(1), int(2)), (int(3), int(-35))]);
        let mut buf = Vec::new();
        ciborium::into_writer(&bad_alg, &mut buf).unwrap();
        assert_eq!(
            CoseKey::parse(&buf),
            Err(CoseError::UnsupportedAlgorithm(-35))
        );
    }

    #[test]
    fn rsa_der_wrapping_is_well_formed() {
        // 2048-bit modulus with the high bit set forces both the long-form
        // length and the 0x00 pad byte.
        let n = vec![0x80; 256];
        let der = rsa_public_key_der(&n, &[0x01, 0x00, 0x01]);
        assert_eq!(der[0], 0x30, "SEQUENCE tag");
        assert_eq!(der[1], 0x82, "long-form length");
        let seq_len = u16::from_be_bytes([der[2], der[3]]) as usize;
        assert_eq!(der.len(), 4 + seq_len, "length field must be accurate");
        assert_eq!(der[4], 0x02, "modulus INTEGER tag");
        assert_eq!(der[7], 0x00, "high-bit modulus must be zero-padded");
    }

    #[test]
    fn der_integer_strips_leading_zeros() {
        let der = der_integer(&[0x00, 0x00, 0x01]);
        assert_eq!(der, vec![0x02, 0x01, 0x01]);
        let zero = der_integer(&[0x00, 0x00]);
        assert_eq!(zero, vec![0x02, 0x01, 0x00]);
    }
}
