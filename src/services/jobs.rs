//! Per-job records: genesis model CID, genesis model hash and the training
//! configuration of a federated run.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use super::convergence::STATUS_READERS;
use crate::auth::{AuthContext, Role};
use crate::ledger::{LedgerFunction, LedgerGateway};
use crate::types::{GatewayError, JobRecordKind, Result};

/// A request body that becomes one job record
pub trait JobRecordRequest: Serialize {
    const KIND: JobRecordKind;

    fn job_id(&self) -> &str;

    /// Local shape check; failures never reach the ledger
    fn validate(&self) -> Result<()>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenesisModelCidRequest {
    pub job_id: String,
    pub cid: String,
    pub purpose: String,
    pub model_family: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub dataset_summary: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub notes: String,
}

impl JobRecordRequest for GenesisModelCidRequest {
    const KIND: JobRecordKind = JobRecordKind::GenesisModelCid;

    fn job_id(&self) -> &str {
        &self.job_id
    }

    fn validate(&self) -> Result<()> {
        require_text(&[
            ("jobId", &self.job_id),
            ("cid", &self.cid),
            ("purpose", &self.purpose),
            ("modelFamily", &self.model_family),
        ])
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenesisModelHashRequest {
    pub job_id: String,
    pub hash: String,
    pub hash_algorithm: String,
    pub model_format: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub compression: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub notes: String,
}

impl JobRecordRequest for GenesisModelHashRequest {
    const KIND: JobRecordKind = JobRecordKind::GenesisModelHash;

    fn job_id(&self) -> &str {
        &self.job_id
    }

    fn validate(&self) -> Result<()> {
        require_text(&[
            ("jobId", &self.job_id),
            ("hash", &self.hash),
            ("hashAlgorithm", &self.hash_algorithm),
            ("modelFormat", &self.model_format),
        ])
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrainingConfigRequest {
    pub job_id: String,
    pub model_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub model_version: String,
    pub dataset_uri: String,
    pub objective: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub round_duration_sec: i64,
    pub batch_size: i64,
    pub learning_rate: f64,
    pub max_cluster_rounds: i64,
    pub max_state_rounds: i64,
    pub alpha: f64,
}

impl JobRecordRequest for TrainingConfigRequest {
    const KIND: JobRecordKind = JobRecordKind::TrainingConfig;

    fn job_id(&self) -> &str {
        &self.job_id
    }

    fn validate(&self) -> Result<()> {
        require_text(&[
            ("jobId", &self.job_id),
            ("modelName", &self.model_name),
            ("datasetUri", &self.dataset_uri),
            ("objective", &self.objective),
        ])?;
        let positive = [
            ("roundDurationSec", self.round_duration_sec as f64),
            ("batchSize", self.batch_size as f64),
            ("learningRate", self.learning_rate),
            ("maxClusterRounds", self.max_cluster_rounds as f64),
            ("maxStateRounds", self.max_state_rounds as f64),
            ("alpha", self.alpha),
        ];
        for (field, value) in positive {
            if value.is_nan() || value <= 0.0 {
                return Err(GatewayError::Validation(format!(
                    "{} must be greater than zero",
                    field
                )));
            }
        }
        Ok(())
    }
}

fn require_text(fields: &[(&str, &String)]) -> Result<()> {
    for (name, value) in fields {
        if value.trim().is_empty() {
            return Err(GatewayError::Validation(format!("{} is required", name)));
        }
    }
    Ok(())
}

pub struct JobContract {
    ledger: Arc<LedgerGateway>,
    admin_identity: String,
}

impl JobContract {
    pub fn new(ledger: Arc<LedgerGateway>, admin_identity: impl Into<String>) -> Self {
        Self {
            ledger,
            admin_identity: admin_identity.into(),
        }
    }

    pub async fn upsert<R: JobRecordRequest>(&self, ctx: &AuthContext, request: &R) -> Result<Value> {
        ctx.require_role(&[Role::Admin])?;
        request.validate()?;
        let record = serde_json::to_string(request)
            .map_err(|e| GatewayError::Internal(format!("Failed to encode job record: {}", e)))?;

        let args = [
            R::KIND.as_str().to_string(),
            request.job_id().trim().to_string(),
            record,
        ];
        let stored: Value = self
            .ledger
            .invoke_json(&self.admin_identity, LedgerFunction::UpsertJobRecord, &args)
            .await?;

        info!(kind = R::KIND.as_str(), job = %request.job_id(), "job record stored");
        Ok(stored)
    }

    pub async fn read(&self, ctx: &AuthContext, kind: JobRecordKind, job_id: &str) -> Result<Value> {
        ctx.require_role(STATUS_READERS)?;
        let job_id = job_id.trim();
        if job_id.is_empty() {
            return Err(GatewayError::Validation("jobId is required".into()));
        }
        let args = [kind.as_str().to_string(), job_id.to_string()];
        Ok(self
            .ledger
            .query_json(&self.admin_identity, LedgerFunction::ReadJobRecord, &args)
            .await?)
    }
}
