//! Records stored on the ledger and returned by its contract functions.
//!
//! Field names follow the ledger's JSON wire format (snake_case).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Trainer status required by every trainer-gated ledger call
pub const STATUS_AUTHORIZED: &str = "AUTHORIZED";

/// Target id used for the single nation-wide convergence scope
pub const NATION_TARGET: &str = "nation";

/// Ledger-side trainer registration, keyed by ledger client identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerIdentity {
    pub client_id: String,
    pub did: String,
    pub node_id: String,
    pub state: String,
    pub cluster: String,
    pub vc_hash: String,
    pub public_key: String,
    pub status: String,
    pub registered_at: DateTime<Utc>,
}

impl TrainerIdentity {
    pub fn is_authorized(&self) -> bool {
        self.status.eq_ignore_ascii_case(STATUS_AUTHORIZED)
    }
}

/// Whitelist entry keyed by the caller-presented subject (lowercased)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub jwt_sub: String,
    pub did: String,
    pub node_id: String,
    /// Entries written by older clients may lack state/cluster
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub cluster: String,
    pub vc_hash: String,
    pub public_key: String,
    pub registered_at: DateTime<Utc>,
}

/// Aggregation tier a convergence claim targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConvergenceScope {
    /// Children are the clusters of one state
    State,
    /// Children are the states; the target is always `nation`
    Nation,
}

impl ConvergenceScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::State => "state",
            Self::Nation => "nation",
        }
    }

    /// Name of the child tier, used in key encoding and error messages
    pub fn child_kind(&self) -> &'static str {
        match self {
            Self::State => "cluster",
            Self::Nation => "state",
        }
    }
}

impl fmt::Display for ConvergenceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConvergenceScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "state" => Ok(Self::State),
            "nation" => Ok(Self::Nation),
            other => Err(format!("unknown convergence scope: {}", other)),
        }
    }
}

/// Child claim toward a scope target. Last write wins per key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceRecord {
    pub scope: ConvergenceScope,
    pub target_id: String,
    pub child_id: String,
    /// Node id of the submitting aggregator
    pub source_id: String,
    pub payload: String,
    pub submitted_at: DateTime<Utc>,
}

/// Terminal, write-once declaration that a scope target converged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceSummary {
    pub scope: ConvergenceScope,
    pub target_id: String,
    pub declared_by: String,
    pub declared_at: DateTime<Utc>,
    pub payload: String,
}

/// Raw convergence state for one scope target as read from the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeConvergence {
    pub scope: ConvergenceScope,
    pub target_id: String,
    #[serde(default)]
    pub children: BTreeMap<String, ConvergenceRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ConvergenceSummary>,
}

impl ScopeConvergence {
    pub fn empty(scope: ConvergenceScope, target_id: impl Into<String>) -> Self {
        Self {
            scope,
            target_id: target_id.into(),
            children: BTreeMap::new(),
            summary: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty() && self.summary.is_none()
    }
}

/// Tier a model artifact is scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactLayer {
    Cluster,
    State,
    Nation,
}

impl ArtifactLayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cluster => "cluster",
            Self::State => "state",
            Self::Nation => "nation",
        }
    }

    /// Request field that carries the scope id for this layer
    pub fn scope_field(&self) -> &'static str {
        match self {
            Self::Cluster => "cluster_id",
            Self::State => "state_id",
            Self::Nation => "nation_id",
        }
    }
}

impl fmt::Display for ArtifactLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactLayer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cluster" => Ok(Self::Cluster),
            "state" => Ok(Self::State),
            "nation" => Ok(Self::Nation),
            other => Err(format!("unknown layer: {}", other)),
        }
    }
}

/// Layer-scoped artifact reference. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopedArtifact {
    pub id: String,
    pub layer: String,
    pub scope_id: String,
    /// Enrolled node id of the committing trainer
    pub owner: String,
    pub payload: String,
    pub submitted_at: DateTime<Utc>,
}

/// Unscoped legacy data record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRecord {
    pub id: String,
    pub owner: String,
    pub payload: String,
    pub submitted_at: DateTime<Utc>,
}

/// Kinds of per-job records kept by the job contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobRecordKind {
    GenesisModelCid,
    GenesisModelHash,
    TrainingConfig,
}

impl JobRecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenesisModelCid => "genesis-model-cid",
            Self::GenesisModelHash => "genesis-model-hash",
            Self::TrainingConfig => "training-config",
        }
    }
}

impl FromStr for JobRecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "genesis-model-cid" => Ok(Self::GenesisModelCid),
            "genesis-model-hash" => Ok(Self::GenesisModelHash),
            "training-config" => Ok(Self::TrainingConfig),
            other => Err(format!("unknown job record kind: {}", other)),
        }
    }
}
