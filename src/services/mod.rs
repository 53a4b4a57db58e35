//! Gateway services, one per component, each talking to the ledger
//! through [`crate::ledger::LedgerGateway`].

pub mod artifacts;
pub mod convergence;
pub mod enrollment;
pub mod jobs;
pub mod whitelist;

use rand::RngCore;
use serde_json::Value;

pub use artifacts::{ArtifactReceipt, ArtifactView, DataReceipt, DataView, ScopedArtifactStore};
pub use convergence::{ChildStatus, ConvergenceTracker, ScopeStatus, STATUS_READERS};
pub use enrollment::{
    BulkItemResult, BulkOutcome, EnrollmentAuthority, EnrollmentBody, EnrollmentRecord,
    EnrollmentRequest,
};
pub use jobs::{
    GenesisModelCidRequest, GenesisModelHashRequest, JobContract, JobRecordRequest,
    TrainingConfigRequest,
};
pub use whitelist::{Hierarchy, WhitelistDirectory};

use crate::auth::AuthContext;
use crate::registry::{RegistryRecord, RegistryStore};
use crate::types::{GatewayError, Result};

/// Mirror record of a caller that writes to the ledger under its own identity
pub(crate) fn enrolled_caller(registry: &RegistryStore, ctx: &AuthContext) -> Result<RegistryRecord> {
    registry
        .find_by_subject(&ctx.subject)
        .ok_or_else(|| GatewayError::Authorization("trainer not registered".into()))
}

/// Identity used for reads: the caller's own if enrolled, else the admin's
pub(crate) fn reader_identity(registry: &RegistryStore, ctx: &AuthContext, admin_identity: &str) -> String {
    registry
        .find_by_subject(&ctx.subject)
        .map(|r| r.ledger_identity)
        .unwrap_or_else(|| admin_identity.to_string())
}

/// First non-blank of an explicit value and a token-derived default
pub(crate) fn select_value(explicit: Option<&str>, fallback: Option<&str>) -> Option<String> {
    explicit
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| fallback.map(str::trim).filter(|v| !v.is_empty()))
        .map(str::to_string)
}

/// Serialize a request payload for storage; null and empty values are refused
pub fn encode_payload(payload: &Value) -> Result<String> {
    let empty = match payload {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    };
    if empty {
        return Err(GatewayError::Validation("payload is required".into()));
    }
    Ok(payload.to_string())
}

/// Stored payloads that are not JSON come back wrapped as `{"raw": ...}`
pub fn decode_payload(stored: &str) -> Value {
    serde_json::from_str(stored).unwrap_or_else(|_| serde_json::json!({ "raw": stored }))
}

/// `{prefix}-{32 hex chars}` from 16 random bytes
pub fn generate_id(prefix: &str) -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{}-{}", prefix, hex::encode(bytes))
}
