//! Enrollment authority
//!
//! A trainer enrolls by presenting a bearer token plus a verifiable
//! credential signed by the trust anchor. Each step below is a hard
//! precondition for the next:
//!
//! 1. required fields present, public key parses
//! 2. credential signature verifies over its canonical form
//! 3. credential hash computed (proof included)
//! 4. validity window and job binding hold
//! 5. subject maps to a provisioned ledger identity
//! 6. one ledger registration, signed by that identity, that writes both
//!    the trainer record and its whitelist entry
//! 7. local mirror updated

use chrono::{SecondsFormat, Utc};
use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::credentials::{decode_public_key, CredentialVerifier};
use crate::ledger::{LedgerFunction, LedgerGateway, RejectCode};
use crate::registry::{normalize_subject, IdentityResolver, RegistryRecord, RegistryStore};
use crate::types::{GatewayError, Result};

/// Credential bundle presented for enrollment, after spelling resolution
#[derive(Debug, Clone, Default)]
pub struct EnrollmentRequest {
    pub did: String,
    pub node_id: String,
    pub vc: Option<Value>,
    pub public_key: String,
    pub jwt_sub: String,
    pub state: String,
    pub cluster: String,
}

/// Enrollment body as sent by clients. Several fields have two accepted
/// spellings; both may be present at once.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EnrollmentBody {
    pub did: Option<String>,
    #[serde(rename = "nodeId")]
    pub node_id_camel: Option<String>,
    pub node_id: Option<String>,
    pub vc: Option<Value>,
    pub public_key: Option<String>,
    #[serde(rename = "publicKey")]
    pub public_key_camel: Option<String>,
    pub jwt_sub: Option<String>,
    pub subject: Option<String>,
    pub state_id: Option<String>,
    pub state: Option<String>,
    pub cluster_id: Option<String>,
    pub cluster: Option<String>,
}

impl EnrollmentBody {
    /// `state_id`, `cluster_id`, `public_key`, `nodeId` and `jwt_sub` win
    /// over their alternate spellings; blank values fall through.
    pub fn normalized(self) -> EnrollmentRequest {
        EnrollmentRequest {
            did: pick(&[&self.did]),
            node_id: pick(&[&self.node_id_camel, &self.node_id]),
            vc: self.vc,
            public_key: pick(&[&self.public_key, &self.public_key_camel]),
            jwt_sub: pick(&[&self.jwt_sub, &self.subject]),
            state: pick(&[&self.state_id, &self.state]),
            cluster: pick(&[&self.cluster_id, &self.cluster]),
        }
    }
}

fn pick(candidates: &[&Option<String>]) -> String {
    candidates
        .iter()
        .filter_map(|c| c.as_deref())
        .map(str::trim)
        .find(|c| !c.is_empty())
        .unwrap_or("")
        .to_string()
}

/// Successful enrollment
#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentRecord {
    pub status: &'static str,
    pub jwt_sub: String,
    pub ledger_identity: String,
    pub vc_hash: String,
    pub did: String,
    pub node_id: String,
    pub state: String,
    pub cluster: String,
    pub registered_at: String,
}

/// Per-item outcome of a bulk enrollment
#[derive(Debug, Clone, Serialize)]
pub struct BulkItemResult {
    pub did: String,
    pub node_id: String,
    pub jwt_sub: String,
    pub state: String,
    pub cluster: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vc_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkOutcome {
    pub results: Vec<BulkItemResult>,
    pub any_failed: bool,
}

impl BulkOutcome {
    /// 200 when every item succeeded, 207 otherwise
    pub fn status_code(&self) -> StatusCode {
        if self.any_failed {
            StatusCode::MULTI_STATUS
        } else {
            StatusCode::OK
        }
    }
}

pub struct EnrollmentAuthority {
    ledger: Arc<LedgerGateway>,
    registry: Arc<RegistryStore>,
    verifier: CredentialVerifier,
    resolver: Arc<dyn IdentityResolver>,
}

impl EnrollmentAuthority {
    pub fn new(
        ledger: Arc<LedgerGateway>,
        registry: Arc<RegistryStore>,
        verifier: CredentialVerifier,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            ledger,
            registry,
            verifier,
            resolver,
        }
    }

    /// Enroll one trainer. The subject is the body's `jwt_sub`, else the
    /// registration token subject, else the DID.
    pub async fn register(
        &self,
        request: EnrollmentRequest,
        token_subject: Option<&str>,
    ) -> Result<EnrollmentRecord> {
        let subject = first_non_blank(&[&request.jwt_sub, token_subject.unwrap_or(""), &request.did]);
        self.enroll(request, subject).await
    }

    /// Enroll every item independently; failures never stop the batch
    pub async fn bulk_register(&self, requests: Vec<EnrollmentRequest>) -> BulkOutcome {
        let mut results = Vec::with_capacity(requests.len());
        let mut any_failed = false;

        for request in requests {
            let subject = first_non_blank(&[&request.jwt_sub, &request.node_id, &request.did]);
            let mut item = BulkItemResult {
                did: request.did.clone(),
                node_id: request.node_id.clone(),
                jwt_sub: subject.clone(),
                state: request.state.clone(),
                cluster: request.cluster.clone(),
                status: "ok",
                error: None,
                error_code: None,
                status_code: None,
                ledger_identity: None,
                vc_hash: None,
                registered_at: None,
            };

            match self.enroll(request, subject).await {
                Ok(record) => {
                    item.jwt_sub = record.jwt_sub;
                    item.ledger_identity = Some(record.ledger_identity);
                    item.vc_hash = Some(record.vc_hash);
                    item.registered_at = Some(record.registered_at);
                }
                Err(err) => {
                    any_failed = true;
                    item.status = "error";
                    item.status_code = Some(err.status_code().as_u16());
                    item.error_code = Some(err.code());
                    item.error = Some(err.to_string());
                }
            }
            results.push(item);
        }

        info!(
            total = results.len(),
            failed = results.iter().filter(|r| r.status == "error").count(),
            "bulk enrollment finished"
        );
        BulkOutcome { results, any_failed }
    }

    /// Whether the ledger considers `identity` an authorized trainer.
    /// "Not enrolled" is `false`; transport failures propagate.
    pub async fn is_authorized(&self, identity: &str) -> Result<bool> {
        match self
            .ledger
            .query_json::<bool>(identity, LedgerFunction::IsTrainerAuthorized, &[])
            .await
        {
            Ok(authorized) => Ok(authorized),
            Err(err)
                if matches!(
                    err.rejection_code(),
                    Some(RejectCode::NotAuthorized) | Some(RejectCode::NotFound)
                ) =>
            {
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn enroll(&self, request: EnrollmentRequest, subject: String) -> Result<EnrollmentRecord> {
        // 1. shape
        let did = required(&request.did, "did")?;
        let node_id = required(&request.node_id, "nodeId")?;
        let credential = match request.vc {
            Some(ref vc) if !vc.is_null() => vc,
            _ => return Err(GatewayError::Validation("missing required field: vc".into())),
        };
        let public_key = required(&request.public_key, "public_key")?;
        let state = required(&request.state, "state_id")?;
        let cluster = required(&request.cluster, "cluster_id")?;
        if subject.is_empty() {
            return Err(GatewayError::Validation("missing required field: jwt_sub".into()));
        }
        decode_public_key(&public_key).map_err(GatewayError::Validation)?;

        // 2-4. credential
        let verified = self.verifier.verify(credential, Utc::now()).map_err(|err| {
            if matches!(err, GatewayError::Credential(_)) {
                warn!(did = %did, subject = %subject, error = %err, "credential rejected");
            }
            err
        })?;

        // 5. ledger identity
        let identity = self.resolver.resolve(&subject).map_err(|err| {
            warn!(subject = %subject, error = %err, "identity resolution failed");
            err
        })?;

        // two subjects that normalize apart can still resolve to one identity
        let jwt_sub = normalize_subject(&subject);
        if let Some(existing) = self.registry.find_by_identity(&identity) {
            if existing.jwt_sub != jwt_sub {
                warn!(subject = %jwt_sub, identity = %identity, holder = %existing.jwt_sub, "ledger identity already bound");
                return Err(GatewayError::Conflict(format!(
                    "ledger identity {} is already bound to another subject",
                    identity
                )));
            }
        }

        // 6. ledger registration
        let registered_at = Utc::now();
        let register_args = [
            did.clone(),
            node_id.clone(),
            verified.vc_hash.clone(),
            public_key.clone(),
            state.clone(),
            cluster.clone(),
            jwt_sub.clone(),
            registered_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        ];
        self.ledger
            .invoke(&identity, LedgerFunction::RegisterTrainer, &register_args)
            .await
            .map_err(|err| {
                error!(identity = %identity, error = %err, "ledger registration failed");
                GatewayError::from(err)
            })?;

        // 7. mirror
        let record = RegistryRecord {
            jwt_sub: jwt_sub.clone(),
            did: did.clone(),
            node_id: node_id.clone(),
            state: state.clone(),
            cluster: cluster.clone(),
            vc_hash: verified.vc_hash.clone(),
            public_key,
            ledger_identity: identity.clone(),
            registered_at,
        };
        self.registry.upsert(record).await?;

        info!(subject = %jwt_sub, identity = %identity, state = %state, cluster = %cluster, "trainer enrolled");
        Ok(EnrollmentRecord {
            status: "ok",
            jwt_sub,
            ledger_identity: identity,
            vc_hash: verified.vc_hash,
            did,
            node_id,
            state,
            cluster,
            registered_at: registered_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        })
    }
}

fn required(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(GatewayError::Validation(format!("missing required field: {}", field)));
    }
    Ok(trimmed.to_string())
}

fn first_non_blank(candidates: &[&str]) -> String {
    candidates
        .iter()
        .map(|c| c.trim())
        .find(|c| !c.is_empty())
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_accepts_either_spelling() {
        let body: EnrollmentBody = serde_json::from_str(
            r#"{"did":"did:x","nodeId":"n1","publicKey":"k","subject":"t1","state_id":"s1","cluster_id":"c1","vc":{}}"#,
        )
        .unwrap();
        let request = body.normalized();
        assert_eq!(request.node_id, "n1");
        assert_eq!(request.public_key, "k");
        assert_eq!(request.jwt_sub, "t1");
        assert_eq!(request.state, "s1");
        assert_eq!(request.cluster, "c1");
    }

    #[test]
    fn test_body_with_both_spellings_prefers_ids() {
        let body: EnrollmentBody = serde_json::from_str(
            r#"{"state":"s-old","state_id":"s1","cluster":"c-old","cluster_id":" ","public_key":"k1","publicKey":"k2","jwt_sub":"t1","subject":"t9","node_id":"n2","nodeId":"n1"}"#,
        )
        .unwrap();
        let request = body.normalized();
        assert_eq!(request.state, "s1");
        assert_eq!(request.cluster, "c-old");
        assert_eq!(request.public_key, "k1");
        assert_eq!(request.jwt_sub, "t1");
        assert_eq!(request.node_id, "n1");
        assert!(request.vc.is_none());
    }

    #[test]
    fn test_subject_fallback_order() {
        assert_eq!(first_non_blank(&["", " tok ", "did:x"]), "tok");
        assert_eq!(first_non_blank(&["", "", "did:x"]), "did:x");
        assert_eq!(first_non_blank(&["", ""]), "");
    }
}
