//! Ledger gateway
//!
//! Adapts the two ledger primitives, `invoke` (ordered write) and `query`
//! (point read or range scan), onto a set of replicas chosen round-robin.
//! No business logic lives here; the ledger-side contract is in
//! [`contract`] and executes inside a replica.

pub mod contract;
pub mod http;
pub mod keys;
pub mod memory;
pub mod pagination;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

pub use http::HttpReplica;
pub use memory::{MemoryLedger, WorldState};
pub use pagination::{paginate, Page, PageRequest};

/// Contract functions exposed by the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LedgerFunction {
    RegisterTrainer,
    IsTrainerAuthorized,
    ListWhitelist,
    CommitChildClaim,
    DeclareConverged,
    ReadStatus,
    ListStatus,
    CommitArtifact,
    ReadArtifact,
    ListArtifacts,
    CommitData,
    ReadData,
    UpsertJobRecord,
    ReadJobRecord,
}

impl LedgerFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RegisterTrainer => "register-trainer",
            Self::IsTrainerAuthorized => "is-trainer-authorized",
            Self::ListWhitelist => "list-whitelist",
            Self::CommitChildClaim => "commit-child-claim",
            Self::DeclareConverged => "declare-converged",
            Self::ReadStatus => "read-status",
            Self::ListStatus => "list-status",
            Self::CommitArtifact => "commit-artifact",
            Self::ReadArtifact => "read-artifact",
            Self::ListArtifacts => "list-artifacts",
            Self::CommitData => "commit-data",
            Self::ReadData => "read-data",
            Self::UpsertJobRecord => "upsert-job-record",
            Self::ReadJobRecord => "read-job-record",
        }
    }

    /// Functions that mutate world state and must go through `invoke`
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::RegisterTrainer
                | Self::CommitChildClaim
                | Self::DeclareConverged
                | Self::CommitArtifact
                | Self::CommitData
                | Self::UpsertJobRecord
        )
    }
}

impl fmt::Display for LedgerFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason a ledger-side contract refused a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectCode {
    InvalidArgument,
    NotFound,
    NotAuthorized,
    AlreadyConverged,
    AlreadyExists,
}

/// Ledger call failure.
///
/// `Rejected` is a definite answer from the contract; everything else means
/// the outcome is unknown to the gateway.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("{message}")]
    Rejected { code: RejectCode, message: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("undecodable ledger response: {0}")]
    Decode(String),

    #[error("no ledger replicas configured")]
    NoReplicas,
}

impl LedgerError {
    pub fn rejected(code: RejectCode, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::rejected(RejectCode::InvalidArgument, message)
    }

    pub fn rejection_code(&self) -> Option<RejectCode> {
        match self {
            Self::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// One ledger peer able to execute contract functions
#[async_trait]
pub trait LedgerReplica: Send + Sync {
    fn name(&self) -> &str;

    /// Submit an ordered write signed by `identity`
    async fn invoke(
        &self,
        identity: &str,
        function: LedgerFunction,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerError>;

    /// Evaluate a read signed by `identity`
    async fn query(
        &self,
        identity: &str,
        function: LedgerFunction,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerError>;
}

/// Replica set with round-robin selection
pub struct LedgerGateway {
    replicas: Vec<Arc<dyn LedgerReplica>>,
    next: AtomicUsize,
}

impl LedgerGateway {
    /// Order replicas with `default_peer` first and the rest by name
    pub fn new(mut replicas: Vec<Arc<dyn LedgerReplica>>, default_peer: Option<&str>) -> Self {
        replicas.sort_by(|a, b| {
            let a_default = Some(a.name()) == default_peer;
            let b_default = Some(b.name()) == default_peer;
            b_default.cmp(&a_default).then_with(|| a.name().cmp(b.name()))
        });
        Self {
            replicas,
            next: AtomicUsize::new(0),
        }
    }

    pub fn replica_names(&self) -> Vec<String> {
        self.replicas.iter().map(|r| r.name().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// Next replica in rotation
    pub fn select(&self) -> Result<Arc<dyn LedgerReplica>, LedgerError> {
        if self.replicas.is_empty() {
            return Err(LedgerError::NoReplicas);
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.replicas.len();
        Ok(Arc::clone(&self.replicas[idx]))
    }

    pub async fn invoke(
        &self,
        identity: &str,
        function: LedgerFunction,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerError> {
        let replica = self.select()?;
        debug!(peer = %replica.name(), identity = %identity, function = %function, "ledger invoke");
        replica.invoke(identity, function, args).await
    }

    pub async fn query(
        &self,
        identity: &str,
        function: LedgerFunction,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerError> {
        let replica = self.select()?;
        debug!(peer = %replica.name(), identity = %identity, function = %function, "ledger query");
        replica.query(identity, function, args).await
    }

    /// Invoke and decode the contract's JSON return value
    pub async fn invoke_json<T: DeserializeOwned>(
        &self,
        identity: &str,
        function: LedgerFunction,
        args: &[String],
    ) -> Result<T, LedgerError> {
        let bytes = self.invoke(identity, function, args).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Query and decode the contract's JSON return value
    pub async fn query_json<T: DeserializeOwned>(
        &self,
        identity: &str,
        function: LedgerFunction,
        args: &[String],
    ) -> Result<T, LedgerError> {
        let bytes = self.query(identity, function, args).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
