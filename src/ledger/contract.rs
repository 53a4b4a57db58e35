//! Ledger-side contract
//!
//! Every function takes positional string arguments and returns the JSON
//! encoding of its result. A remote peer must honour the same names,
//! arguments and rejection codes; [`super::MemoryLedger`] runs this code
//! directly.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

use super::keys::{self, ConvergenceKey};
use super::memory::WorldState;
use super::pagination::{
    paginate, PageRequest, ARTIFACT_DEFAULT_PER_PAGE, WHITELIST_DEFAULT_PER_PAGE,
};
use super::{LedgerError, LedgerFunction, RejectCode};
use crate::types::{
    ArtifactLayer, ConvergenceRecord, ConvergenceScope, ConvergenceSummary, DataRecord,
    JobRecordKind, ScopeConvergence, ScopedArtifact, TrainerIdentity, WhitelistEntry,
    NATION_TARGET, STATUS_AUTHORIZED,
};

type ContractResult<T> = Result<T, LedgerError>;

/// Dispatch one contract call against `state`
pub fn execute(
    state: &mut WorldState,
    identity: &str,
    function: LedgerFunction,
    args: &[String],
    now: DateTime<Utc>,
) -> ContractResult<Vec<u8>> {
    match function {
        LedgerFunction::RegisterTrainer => encode(&register_trainer(state, identity, args, now)?),
        LedgerFunction::IsTrainerAuthorized => encode(&is_trainer_authorized(state, identity)?),
        LedgerFunction::ListWhitelist => encode(&list_whitelist(state, args)?),
        LedgerFunction::CommitChildClaim => {
            encode(&commit_child_claim(state, identity, args, now)?)
        }
        LedgerFunction::DeclareConverged => encode(&declare_converged(state, identity, args, now)?),
        LedgerFunction::ReadStatus => encode(&read_status(state, args)?),
        LedgerFunction::ListStatus => encode(&list_status(state, args)?),
        LedgerFunction::CommitArtifact => encode(&commit_artifact(state, identity, args, now)?),
        LedgerFunction::ReadArtifact => encode(&read_artifact(state, identity, args)?),
        LedgerFunction::ListArtifacts => encode(&list_artifacts(state, identity, args)?),
        LedgerFunction::CommitData => encode(&commit_data(state, identity, args, now)?),
        LedgerFunction::ReadData => encode(&read_data(state, identity, args)?),
        LedgerFunction::UpsertJobRecord => encode(&upsert_job_record(state, args, now)?),
        LedgerFunction::ReadJobRecord => encode(&read_job_record(state, args)?),
    }
}

// =============================================================================
// Trainers and whitelist
// =============================================================================

/// Writes the trainer identity and its whitelist entry in one transaction
fn register_trainer(
    state: &mut WorldState,
    identity: &str,
    args: &[String],
    now: DateTime<Utc>,
) -> ContractResult<TrainerIdentity> {
    let registered_at = match arg(args, 7).trim() {
        "" => now,
        raw => DateTime::parse_from_rfc3339(raw)
            .map_err(|e| LedgerError::invalid(format!("invalid registeredAt: {}", e)))?
            .with_timezone(&Utc),
    };
    let trainer = TrainerIdentity {
        client_id: required(identity, "client identity")?,
        did: required(arg(args, 0), "did")?,
        node_id: required(arg(args, 1), "nodeId")?,
        vc_hash: required(arg(args, 2), "vcHash")?,
        public_key: required(arg(args, 3), "publicKey")?,
        state: required(arg(args, 4), "state")?,
        cluster: required(arg(args, 5), "cluster")?,
        status: STATUS_AUTHORIZED.to_string(),
        registered_at,
    };
    let entry = WhitelistEntry {
        jwt_sub: required(arg(args, 6), "jwtSub")?.to_lowercase(),
        did: trainer.did.clone(),
        node_id: trainer.node_id.clone(),
        state: trainer.state.clone(),
        cluster: trainer.cluster.clone(),
        vc_hash: trainer.vc_hash.clone(),
        public_key: trainer.public_key.clone(),
        registered_at,
    };
    state.put(keys::trainer_key(&trainer.client_id), serde_json::to_vec(&trainer)?);
    state.put(keys::whitelist_key(&entry.jwt_sub), serde_json::to_vec(&entry)?);
    Ok(trainer)
}

/// Missing or inactive trainers are a `NotAuthorized` rejection
fn require_trainer(state: &WorldState, identity: &str) -> ContractResult<TrainerIdentity> {
    let trainer: TrainerIdentity = match state.get(&keys::trainer_key(identity)) {
        Some(bytes) => serde_json::from_slice(bytes)?,
        None => return Err(not_authorized()),
    };
    if !trainer.is_authorized() {
        return Err(not_authorized());
    }
    Ok(trainer)
}

fn is_trainer_authorized(state: &WorldState, identity: &str) -> ContractResult<bool> {
    match require_trainer(state, identity) {
        Ok(_) => Ok(true),
        Err(err) if err.rejection_code() == Some(RejectCode::NotAuthorized) => Ok(false),
        Err(err) => Err(err),
    }
}

fn list_whitelist(
    state: &WorldState,
    args: &[String],
) -> ContractResult<super::Page<WhitelistEntry>> {
    let request = page_request(args, 0, WHITELIST_DEFAULT_PER_PAGE)?;
    let entries: Vec<WhitelistEntry> = decode_all(state, keys::WHITELIST_PREFIX)?;
    Ok(paginate(entries, |e| !e.jwt_sub.is_empty(), request))
}

// =============================================================================
// Convergence
// =============================================================================

fn commit_child_claim(
    state: &mut WorldState,
    identity: &str,
    args: &[String],
    now: DateTime<Utc>,
) -> ContractResult<ConvergenceRecord> {
    let trainer = require_trainer(state, identity)?;
    let scope = parse_scope(arg(args, 0))?;
    let target_id = resolve_target(scope, arg(args, 1))?;
    let child_field = match scope {
        ConvergenceScope::State => "clusterId",
        ConvergenceScope::Nation => "stateId",
    };
    let child_id = normalize_identifier(arg(args, 2), child_field)?;
    let payload = required(arg(args, 3), "payload")?;

    let record = ConvergenceRecord {
        scope,
        target_id,
        child_id,
        source_id: trainer.node_id,
        payload,
        submitted_at: now,
    };
    state.put(
        keys::child_claim_key(scope, &record.target_id, &record.child_id),
        serde_json::to_vec(&record)?,
    );
    Ok(record)
}

/// First declaration wins; the existence check and the write happen in the
/// same call so concurrent declarers are ordered by the ledger.
fn declare_converged(
    state: &mut WorldState,
    identity: &str,
    args: &[String],
    now: DateTime<Utc>,
) -> ContractResult<ConvergenceSummary> {
    let trainer = require_trainer(state, identity)?;
    let scope = parse_scope(arg(args, 0))?;
    let target_id = resolve_target(scope, arg(args, 1))?;

    let key = keys::summary_key(scope, &target_id);
    if state.contains(&key) {
        let message = match scope {
            ConvergenceScope::State => format!("state {} already declared converged", target_id),
            ConvergenceScope::Nation => "nation convergence already declared".to_string(),
        };
        return Err(LedgerError::rejected(RejectCode::AlreadyConverged, message));
    }
    let payload = required(arg(args, 2), "payload")?;

    let summary = ConvergenceSummary {
        scope,
        target_id,
        declared_by: trainer.node_id,
        declared_at: now,
        payload,
    };
    state.put(key, serde_json::to_vec(&summary)?);
    Ok(summary)
}

fn read_status(state: &WorldState, args: &[String]) -> ContractResult<ScopeConvergence> {
    let scope = parse_scope(arg(args, 0))?;
    let target_id = resolve_target(scope, arg(args, 1))?;
    let mut result = ScopeConvergence::empty(scope, target_id.as_str());

    for (key, value) in state.scan(&keys::scope_prefix(scope, &target_id)) {
        match keys::parse_convergence_key(scope, key) {
            Some(ConvergenceKey::Claim { child_id, .. }) => {
                result.children.insert(child_id, serde_json::from_slice(value)?);
            }
            Some(ConvergenceKey::Summary { .. }) => {
                result.summary = Some(serde_json::from_slice(value)?);
            }
            None => continue,
        }
    }
    Ok(result)
}

fn list_status(
    state: &WorldState,
    args: &[String],
) -> ContractResult<BTreeMap<String, ScopeConvergence>> {
    let scope = parse_scope(arg(args, 0))?;
    let mut results: BTreeMap<String, ScopeConvergence> = BTreeMap::new();

    for (key, value) in state.scan(keys::scope_root(scope)) {
        let parsed = match keys::parse_convergence_key(scope, key) {
            Some(parsed) => parsed,
            None => continue,
        };
        match parsed {
            ConvergenceKey::Claim {
                target_id,
                child_id,
            } => {
                let entry = results
                    .entry(target_id.clone())
                    .or_insert_with(|| ScopeConvergence::empty(scope, target_id));
                entry.children.insert(child_id, serde_json::from_slice(value)?);
            }
            ConvergenceKey::Summary { target_id } => {
                let entry = results
                    .entry(target_id.clone())
                    .or_insert_with(|| ScopeConvergence::empty(scope, target_id));
                entry.summary = Some(serde_json::from_slice(value)?);
            }
        }
    }
    Ok(results)
}

// =============================================================================
// Scoped artifacts and legacy data
// =============================================================================

fn commit_artifact(
    state: &mut WorldState,
    identity: &str,
    args: &[String],
    now: DateTime<Utc>,
) -> ContractResult<ScopedArtifact> {
    let trainer = require_trainer(state, identity)?;
    let layer = parse_layer(arg(args, 0))?;
    let scope_id = normalize_identifier(arg(args, 1), "scope identifier")?;
    let id = required(arg(args, 2), "data identifier")?;
    let payload = required(arg(args, 3), "payload")?;

    let key = keys::model_key(&id);
    if state.contains(&key) {
        return Err(LedgerError::rejected(
            RejectCode::AlreadyExists,
            format!("model {} already exists", id),
        ));
    }

    let artifact = ScopedArtifact {
        id,
        layer: layer.as_str().to_string(),
        scope_id,
        owner: trainer.node_id,
        payload,
        submitted_at: now,
    };
    state.put(key, serde_json::to_vec(&artifact)?);
    Ok(artifact)
}

fn read_artifact(
    state: &WorldState,
    identity: &str,
    args: &[String],
) -> ContractResult<ScopedArtifact> {
    require_trainer(state, identity)?;
    let id = required(arg(args, 0), "data identifier")?;
    decode_one(state, &keys::model_key(&id), || format!("model {} not found", id))
}

fn list_artifacts(
    state: &WorldState,
    identity: &str,
    args: &[String],
) -> ContractResult<super::Page<ScopedArtifact>> {
    require_trainer(state, identity)?;
    let layer = parse_layer(arg(args, 0))?;
    let scope_filter = arg(args, 1).trim().to_lowercase();
    let request = page_request(args, 2, ARTIFACT_DEFAULT_PER_PAGE)?;

    let artifacts: Vec<ScopedArtifact> = decode_all(state, keys::MODEL_PREFIX)?;
    Ok(paginate(
        artifacts,
        |a| {
            !a.id.is_empty()
                && a.layer.to_lowercase() == layer.as_str()
                && (scope_filter.is_empty() || a.scope_id.to_lowercase() == scope_filter)
        },
        request,
    ))
}

fn commit_data(
    state: &mut WorldState,
    identity: &str,
    args: &[String],
    now: DateTime<Utc>,
) -> ContractResult<DataRecord> {
    let trainer = require_trainer(state, identity)?;
    let record = DataRecord {
        id: required(arg(args, 0), "data identifier")?,
        owner: trainer.node_id,
        payload: arg(args, 1).to_string(),
        submitted_at: now,
    };
    state.put(keys::data_key(&record.id), serde_json::to_vec(&record)?);
    Ok(record)
}

fn read_data(state: &WorldState, identity: &str, args: &[String]) -> ContractResult<DataRecord> {
    require_trainer(state, identity)?;
    let id = required(arg(args, 0), "data identifier")?;
    decode_one(state, &keys::data_key(&id), || format!("record {} not found", id))
}

// =============================================================================
// Job records
// =============================================================================

fn upsert_job_record(
    state: &mut WorldState,
    args: &[String],
    now: DateTime<Utc>,
) -> ContractResult<serde_json::Value> {
    let kind = parse_job_kind(arg(args, 0))?;
    let job_id = required(arg(args, 1), "jobId")?;
    let mut record: serde_json::Value = serde_json::from_str(arg(args, 2))
        .map_err(|e| LedgerError::invalid(format!("invalid record: {}", e)))?;
    let fields = record
        .as_object_mut()
        .ok_or_else(|| LedgerError::invalid("record must be a JSON object"))?;
    fields.insert("jobId".into(), serde_json::Value::String(job_id.clone()));
    fields.insert("updatedAt".into(), serde_json::to_value(now)?);

    state.put(keys::job_key(kind, &job_id), serde_json::to_vec(&record)?);
    Ok(record)
}

fn read_job_record(state: &WorldState, args: &[String]) -> ContractResult<serde_json::Value> {
    let kind = parse_job_kind(arg(args, 0))?;
    let job_id = required(arg(args, 1), "jobId")?;
    decode_one(state, &keys::job_key(kind, &job_id), || {
        format!("no {} recorded for job {}", kind.as_str(), job_id)
    })
}

// =============================================================================
// Helpers
// =============================================================================

fn encode<T: Serialize>(value: &T) -> ContractResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn arg(args: &[String], idx: usize) -> &str {
    args.get(idx).map(String::as_str).unwrap_or("")
}

fn required(value: &str, field: &str) -> ContractResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::invalid(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

fn normalize_identifier(value: &str, field: &str) -> ContractResult<String> {
    required(value, field).map(|v| v.to_lowercase())
}

fn not_authorized() -> LedgerError {
    LedgerError::rejected(RejectCode::NotAuthorized, "trainer not authorized")
}

fn parse_scope(raw: &str) -> ContractResult<ConvergenceScope> {
    raw.parse().map_err(LedgerError::invalid)
}

fn parse_layer(raw: &str) -> ContractResult<ArtifactLayer> {
    if raw.trim().is_empty() {
        return Err(LedgerError::invalid("layer is required"));
    }
    raw.parse().map_err(LedgerError::invalid)
}

fn parse_job_kind(raw: &str) -> ContractResult<JobRecordKind> {
    raw.parse().map_err(LedgerError::invalid)
}

/// The nation scope has exactly one target
fn resolve_target(scope: ConvergenceScope, raw: &str) -> ContractResult<String> {
    match scope {
        ConvergenceScope::State => normalize_identifier(raw, "stateId"),
        ConvergenceScope::Nation => {
            let target = raw.trim().to_lowercase();
            if target.is_empty() || target == NATION_TARGET {
                Ok(NATION_TARGET.to_string())
            } else {
                Err(LedgerError::invalid(format!(
                    "nation scope has a single target, got {}",
                    target
                )))
            }
        }
    }
}

fn page_request(args: &[String], offset: usize, default_per_page: usize) -> ContractResult<PageRequest> {
    PageRequest::parse(
        Some(arg(args, offset)),
        Some(arg(args, offset + 1)),
        default_per_page,
    )
    .map_err(LedgerError::invalid)
}

fn decode_all<T: DeserializeOwned>(state: &WorldState, prefix: &str) -> ContractResult<Vec<T>> {
    state
        .scan(prefix)
        .map(|(_, value)| serde_json::from_slice(value).map_err(LedgerError::from))
        .collect()
}

fn decode_one<T: DeserializeOwned>(
    state: &WorldState,
    key: &str,
    missing: impl FnOnce() -> String,
) -> ContractResult<T> {
    match state.get(key) {
        Some(bytes) => Ok(serde_json::from_slice(bytes)?),
        None => Err(LedgerError::rejected(RejectCode::NotFound, missing())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn call(state: &mut WorldState, identity: &str, f: LedgerFunction, a: &[&str]) -> ContractResult<Vec<u8>> {
        execute(state, identity, f, &args(a), Utc::now())
    }

    fn enroll(state: &mut WorldState, identity: &str, node: &str, st: &str, cl: &str) {
        call(
            state,
            identity,
            LedgerFunction::RegisterTrainer,
            &["did:example:1", node, "hash", "key", st, cl, identity, ""],
        )
        .unwrap();
    }

    #[test]
    fn test_unregistered_identity_is_not_authorized() {
        let mut state = WorldState::default();
        let out = call(&mut state, "ghost", LedgerFunction::IsTrainerAuthorized, &[]).unwrap();
        assert_eq!(out, b"false");

        enroll(&mut state, "agg", "node-a", "s1", "c1");
        let out = call(&mut state, "agg", LedgerFunction::IsTrainerAuthorized, &[]).unwrap();
        assert_eq!(out, b"true");
    }

    #[test]
    fn test_register_requires_hierarchy_fields() {
        let mut state = WorldState::default();
        let err = call(
            &mut state,
            "x",
            LedgerFunction::RegisterTrainer,
            &["did", "node", "hash", "key", "s1", " ", "x", ""],
        )
        .unwrap_err();
        assert_eq!(err.rejection_code(), Some(RejectCode::InvalidArgument));
        assert!(err.to_string().contains("cluster"));
    }

    #[test]
    fn test_register_writes_whitelist_entry_in_same_call() {
        let mut state = WorldState::default();
        call(
            &mut state,
            "t1@org1",
            LedgerFunction::RegisterTrainer,
            &["did:example:1", "node-1", "hash", "key", "s1", "c1", "Trainer-1", "2026-01-02T03:04:05Z"],
        )
        .unwrap();

        let raw = call(&mut state, "admin", LedgerFunction::ListWhitelist, &["1", "10"]).unwrap();
        let page: crate::ledger::Page<WhitelistEntry> = serde_json::from_slice(&raw).unwrap();
        assert_eq!(page.total, 1);
        let entry = &page.items[0];
        assert_eq!(entry.jwt_sub, "trainer-1");
        assert_eq!(entry.cluster, "c1");
        assert_eq!(entry.registered_at.to_rfc3339(), "2026-01-02T03:04:05+00:00");

        // a rejected registration leaves neither record behind
        let err = call(
            &mut state,
            "t2@org1",
            LedgerFunction::RegisterTrainer,
            &["did:example:2", "node-2", "hash", "key", "s1", "c1", " ", ""],
        )
        .unwrap_err();
        assert_eq!(err.rejection_code(), Some(RejectCode::InvalidArgument));
        assert!(state.get(&keys::trainer_key("t2@org1")).is_none());
        assert_eq!(state.scan(keys::WHITELIST_PREFIX).count(), 1);
    }

    #[test]
    fn test_declare_is_first_write_wins() {
        let mut state = WorldState::default();
        enroll(&mut state, "checker", "node-c", "s1", "c1");

        call(&mut state, "checker", LedgerFunction::DeclareConverged, &["state", "S1", "{\"v\":1}"])
            .unwrap();
        let err = call(
            &mut state,
            "checker",
            LedgerFunction::DeclareConverged,
            &["state", "s1", "{\"v\":2}"],
        )
        .unwrap_err();
        assert_eq!(err.rejection_code(), Some(RejectCode::AlreadyConverged));
        assert_eq!(err.to_string(), "state s1 already declared converged");

        let raw = call(&mut state, "checker", LedgerFunction::ReadStatus, &["state", "s1"]).unwrap();
        let status: ScopeConvergence = serde_json::from_slice(&raw).unwrap();
        assert_eq!(status.summary.unwrap().payload, "{\"v\":1}");
    }

    #[test]
    fn test_nation_declare_message() {
        let mut state = WorldState::default();
        enroll(&mut state, "checker", "node-c", "s1", "c1");
        call(&mut state, "checker", LedgerFunction::DeclareConverged, &["nation", "", "{}"]).unwrap();
        let err = call(&mut state, "checker", LedgerFunction::DeclareConverged, &["nation", "nation", "{}"])
            .unwrap_err();
        assert_eq!(err.to_string(), "nation convergence already declared");
    }

    #[test]
    fn test_claims_upsert_and_list_groups_targets() {
        let mut state = WorldState::default();
        enroll(&mut state, "agg", "node-a", "s1", "c1");

        call(&mut state, "agg", LedgerFunction::CommitChildClaim, &["state", "s1", "C1", "{\"r\":1}"]).unwrap();
        call(&mut state, "agg", LedgerFunction::CommitChildClaim, &["state", "s1", "c1", "{\"r\":2}"]).unwrap();
        call(&mut state, "agg", LedgerFunction::CommitChildClaim, &["state", "s2", "c9", "{}"]).unwrap();

        let raw = call(&mut state, "agg", LedgerFunction::ListStatus, &["state"]).unwrap();
        let all: BTreeMap<String, ScopeConvergence> = serde_json::from_slice(&raw).unwrap();
        assert_eq!(all.keys().collect::<Vec<_>>(), vec!["s1", "s2"]);
        assert_eq!(all["s1"].children.len(), 1);
        assert_eq!(all["s1"].children["c1"].payload, "{\"r\":2}");
        assert_eq!(all["s1"].children["c1"].source_id, "node-a");
    }

    #[test]
    fn test_claim_requires_authorized_trainer_and_payload() {
        let mut state = WorldState::default();
        let err = call(&mut state, "ghost", LedgerFunction::CommitChildClaim, &["state", "s1", "c1", "{}"])
            .unwrap_err();
        assert_eq!(err.rejection_code(), Some(RejectCode::NotAuthorized));

        enroll(&mut state, "agg", "node-a", "s1", "c1");
        let err = call(&mut state, "agg", LedgerFunction::CommitChildClaim, &["state", "s1", "c1", ""])
            .unwrap_err();
        assert_eq!(err.rejection_code(), Some(RejectCode::InvalidArgument));
        assert!(state.scan(keys::STATE_CONV_PREFIX).next().is_none());
    }

    #[test]
    fn test_artifacts_are_write_once_and_filtered_case_insensitively() {
        let mut state = WorldState::default();
        enroll(&mut state, "t1", "node-1", "s1", "c1");

        call(&mut state, "t1", LedgerFunction::CommitArtifact, &["Cluster", "C1", "model-a", "{}"]).unwrap();
        call(&mut state, "t1", LedgerFunction::CommitArtifact, &["cluster", "c2", "model-b", "{}"]).unwrap();
        call(&mut state, "t1", LedgerFunction::CommitArtifact, &["state", "s1", "model-c", "{}"]).unwrap();

        let err = call(&mut state, "t1", LedgerFunction::CommitArtifact, &["cluster", "c1", "model-a", "{}"])
            .unwrap_err();
        assert_eq!(err.rejection_code(), Some(RejectCode::AlreadyExists));

        let raw = call(&mut state, "t1", LedgerFunction::ListArtifacts, &["CLUSTER", "c1", "", ""]).unwrap();
        let page: super::super::Page<ScopedArtifact> = serde_json::from_slice(&raw).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, "model-a");
        assert_eq!(page.items[0].owner, "node-1");
        assert_eq!(page.per_page, ARTIFACT_DEFAULT_PER_PAGE);
    }

    #[test]
    fn test_job_record_stamps_job_id() {
        let mut state = WorldState::default();
        call(
            &mut state,
            "admin",
            LedgerFunction::UpsertJobRecord,
            &["genesis-model-cid", "job-7", "{\"cid\":\"bafy\"}"],
        )
        .unwrap();
        let raw = call(&mut state, "admin", LedgerFunction::ReadJobRecord, &["genesis-model-cid", "job-7"]).unwrap();
        let record: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(record["jobId"], "job-7");
        assert_eq!(record["cid"], "bafy");
        assert!(record.get("updatedAt").is_some());

        let err = call(&mut state, "admin", LedgerFunction::ReadJobRecord, &["training-config", "job-7"])
            .unwrap_err();
        assert_eq!(err.rejection_code(), Some(RejectCode::NotFound));
    }
}
