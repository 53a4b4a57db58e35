//! Credential signature, validity window and job binding checks.
//!
//! The signed message is the canonical JSON of the credential with its
//! `proof` member removed. `proof.proofValue` carries the Ed25519 signature
//! (base64url, base64 or hex). The credential hash covers the canonical
//! JSON of the whole credential, proof included.

use base64::prelude::*;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::canonical::canonicalize;
use crate::types::{GatewayError, Result};

const PROOF_TYPE: &str = "Ed25519Signature2020";

/// Outcome of a successful verification
#[derive(Debug, Clone)]
pub struct VerifiedCredential {
    /// Hex SHA-256 over the canonical signed credential
    pub vc_hash: String,
    pub job_id: Option<String>,
    pub valid_until: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct CredentialVerifier {
    trust_anchor: Option<VerifyingKey>,
    required_job_id: Option<String>,
}

impl CredentialVerifier {
    /// A verifier without a trust anchor skips the signature check (dev mode)
    pub fn new(trust_anchor: Option<VerifyingKey>, required_job_id: Option<String>) -> Self {
        Self {
            trust_anchor,
            required_job_id: required_job_id.filter(|j| !j.trim().is_empty()),
        }
    }

    pub fn checks_signatures(&self) -> bool {
        self.trust_anchor.is_some()
    }

    /// Verify signature, then hash, then validity window and job id
    pub fn verify(&self, credential: &Value, now: DateTime<Utc>) -> Result<VerifiedCredential> {
        let fields = credential
            .as_object()
            .ok_or_else(|| GatewayError::Validation("vc must be a JSON object".into()))?;

        if let Some(anchor) = &self.trust_anchor {
            let proof_value = fields
                .get("proof")
                .and_then(|p| p.get("proofValue"))
                .and_then(Value::as_str)
                .ok_or_else(|| GatewayError::Credential("credential proof missing".into()))?;
            let signature_bytes = decode_binary(proof_value)
                .ok_or_else(|| GatewayError::Credential("credential proof is not decodable".into()))?;
            let signature = Signature::from_slice(&signature_bytes)
                .map_err(|_| GatewayError::Credential("credential proof has wrong length".into()))?;

            let mut unsigned = fields.clone();
            unsigned.remove("proof");
            let message = canonicalize(&Value::Object(unsigned));
            anchor
                .verify_strict(message.as_bytes(), &signature)
                .map_err(|_| GatewayError::Credential("signature mismatch".into()))?;
        }

        let vc_hash = credential_hash(credential);

        let valid_from = timestamp_field(credential, &["validFrom", "issuanceDate"])?;
        if let Some(from) = valid_from {
            if now < from {
                return Err(GatewayError::Credential(format!(
                    "credential not valid before {}",
                    from.to_rfc3339()
                )));
            }
        }
        let valid_until = timestamp_field(credential, &["validUntil", "expirationDate"])?;
        if let Some(until) = valid_until {
            if now > until {
                return Err(GatewayError::Credential(format!(
                    "credential expired at {}",
                    until.to_rfc3339()
                )));
            }
        }

        let job_id = credential
            .get("credentialSubject")
            .and_then(|s| s.get("jobId"))
            .and_then(Value::as_str)
            .map(str::to_string);
        if let Some(required) = &self.required_job_id {
            if job_id.as_deref() != Some(required.as_str()) {
                return Err(GatewayError::Credential(format!(
                    "credential is not issued for job {}",
                    required
                )));
            }
        }

        Ok(VerifiedCredential {
            vc_hash,
            job_id,
            valid_until,
        })
    }
}

/// Hex SHA-256 of the canonical credential, proof included
pub fn credential_hash(credential: &Value) -> String {
    hex::encode(Sha256::digest(canonicalize(credential).as_bytes()))
}

/// Sign a credential with an issuer key, replacing any existing proof
pub fn attach_proof(credential: &Value, issuer: &SigningKey) -> Result<Value> {
    let mut fields = credential
        .as_object()
        .cloned()
        .ok_or_else(|| GatewayError::Validation("vc must be a JSON object".into()))?;
    fields.remove("proof");
    let signature = issuer.sign(canonicalize(&Value::Object(fields.clone())).as_bytes());
    fields.insert(
        "proof".into(),
        serde_json::json!({
            "type": PROOF_TYPE,
            "proofValue": BASE64_URL_SAFE_NO_PAD.encode(signature.to_bytes()),
        }),
    );
    Ok(Value::Object(fields))
}

/// Decode hex, base64 or base64url text
pub fn decode_binary(raw: &str) -> Option<Vec<u8>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if raw.len() % 2 == 0 && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
        if let Ok(bytes) = hex::decode(raw) {
            return Some(bytes);
        }
    }
    BASE64_URL_SAFE_NO_PAD
        .decode(raw)
        .or_else(|_| BASE64_URL_SAFE.decode(raw))
        .or_else(|_| BASE64_STANDARD.decode(raw))
        .or_else(|_| BASE64_STANDARD_NO_PAD.decode(raw))
        .ok()
}

/// Parse a textual Ed25519 public key
pub fn decode_public_key(raw: &str) -> std::result::Result<VerifyingKey, String> {
    let bytes = decode_binary(raw).ok_or_else(|| "public key is not hex or base64".to_string())?;
    let bytes: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| format!("public key must be 32 bytes, got {}", bytes.len()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| format!("invalid public key: {}", e))
}

fn timestamp_field(credential: &Value, names: &[&str]) -> Result<Option<DateTime<Utc>>> {
    for name in names {
        if let Some(raw) = credential.get(*name).and_then(Value::as_str) {
            let parsed = DateTime::parse_from_rfc3339(raw)
                .map_err(|e| GatewayError::Credential(format!("invalid {}: {}", name, e)))?;
            return Ok(Some(parsed.with_timezone(&Utc)));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rand::rngs::OsRng;
    use serde_json::json;

    fn issuer() -> SigningKey {
        SigningKey::generate(&mut OsRng)
    }

    fn credential() -> Value {
        json!({
            "id": "urn:uuid:1",
            "issuer": "did:example:issuer",
            "validFrom": "2020-01-01T00:00:00Z",
            "validUntil": "2999-01-01T00:00:00Z",
            "credentialSubject": { "id": "did:example:t1", "jobId": "job-1" }
        })
    }

    #[test]
    fn test_valid_signature_and_hash() {
        let key = issuer();
        let signed = attach_proof(&credential(), &key).unwrap();
        let verifier = CredentialVerifier::new(Some(key.verifying_key()), Some("job-1".into()));

        let verified = verifier.verify(&signed, Utc::now()).unwrap();
        let expected = hex::encode(Sha256::digest(canonicalize(&signed).as_bytes()));
        assert_eq!(verified.vc_hash, expected);
        assert_eq!(verified.job_id.as_deref(), Some("job-1"));
    }

    #[test]
    fn test_hash_ignores_key_order_and_whitespace() {
        let key = issuer();
        let signed = attach_proof(&credential(), &key).unwrap();
        let reparsed: Value = serde_json::from_str(&serde_json::to_string_pretty(&signed).unwrap()).unwrap();
        assert_eq!(credential_hash(&signed), credential_hash(&reparsed));
    }

    #[test]
    fn test_tampered_credential_is_rejected() {
        let key = issuer();
        let mut signed = attach_proof(&credential(), &key).unwrap();
        signed["credentialSubject"]["id"] = json!("did:example:mallory");

        let verifier = CredentialVerifier::new(Some(key.verifying_key()), None);
        let err = verifier.verify(&signed, Utc::now()).unwrap_err();
        assert!(matches!(err, GatewayError::Credential(_)));
    }

    #[test]
    fn test_wrong_anchor_is_rejected() {
        let signed = attach_proof(&credential(), &issuer()).unwrap();
        let verifier = CredentialVerifier::new(Some(issuer().verifying_key()), None);
        assert!(matches!(
            verifier.verify(&signed, Utc::now()),
            Err(GatewayError::Credential(_))
        ));
    }

    #[test]
    fn test_validity_window_and_job_binding() {
        let key = issuer();
        let signed = attach_proof(&credential(), &key).unwrap();
        let verifier = CredentialVerifier::new(Some(key.verifying_key()), None);

        let too_early = DateTime::parse_from_rfc3339("2019-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(verifier.verify(&signed, too_early).is_err());
        assert!(verifier
            .verify(&signed, Utc::now() + Duration::days(365 * 1000))
            .is_err());

        let other_job = CredentialVerifier::new(Some(key.verifying_key()), Some("job-2".into()));
        assert!(matches!(
            other_job.verify(&signed, Utc::now()),
            Err(GatewayError::Credential(_))
        ));
    }

    #[test]
    fn test_missing_proof_without_anchor_is_accepted() {
        let verifier = CredentialVerifier::new(None, None);
        assert!(!verifier.checks_signatures());
        assert!(verifier.verify(&credential(), Utc::now()).is_ok());
    }

    #[test]
    fn test_decode_public_key_formats() {
        let key = issuer().verifying_key();
        let bytes = key.to_bytes();
        assert_eq!(decode_public_key(&hex::encode(bytes)).unwrap(), key);
        assert_eq!(decode_public_key(&BASE64_STANDARD.encode(bytes)).unwrap(), key);
        assert_eq!(decode_public_key(&BASE64_URL_SAFE_NO_PAD.encode(bytes)).unwrap(), key);
        assert!(decode_public_key("abcd").is_err());
        assert!(decode_public_key("").is_err());
    }
}
