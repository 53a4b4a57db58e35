//! Scoped artifact store and the legacy unscoped data path
//!
//! Scoped artifacts are shared model references: any authorized trainer
//! may read any of them. Legacy data records stay readable only by the
//! node that committed them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use super::{decode_payload, encode_payload, enrolled_caller, generate_id, select_value};
use crate::auth::{AuthContext, Role};
use crate::ledger::{LedgerFunction, LedgerGateway, Page, PageRequest};
use crate::registry::{RegistryRecord, RegistryStore};
use crate::types::{
    ArtifactLayer, DataRecord, GatewayError, Result, ScopedArtifact, NATION_TARGET,
};

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactReceipt {
    pub data_id: String,
    pub layer: ArtifactLayer,
    pub scope_id: String,
    pub node_id: String,
    pub vc_hash: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactView {
    pub data_id: String,
    pub layer: String,
    pub scope_id: String,
    pub owner: String,
    pub payload: Value,
    pub submitted_at: DateTime<Utc>,
}

impl From<ScopedArtifact> for ArtifactView {
    fn from(artifact: ScopedArtifact) -> Self {
        Self {
            payload: decode_payload(&artifact.payload),
            data_id: artifact.id,
            layer: artifact.layer,
            scope_id: artifact.scope_id,
            owner: artifact.owner,
            submitted_at: artifact.submitted_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DataReceipt {
    pub data_id: String,
    pub node_id: String,
    pub vc_hash: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataView {
    pub data_id: String,
    pub owner: String,
    pub payload: Value,
    pub submitted_at: DateTime<Utc>,
}

impl From<DataRecord> for DataView {
    fn from(record: DataRecord) -> Self {
        Self {
            payload: decode_payload(&record.payload),
            data_id: record.id,
            owner: record.owner,
            submitted_at: record.submitted_at,
        }
    }
}

pub struct ScopedArtifactStore {
    ledger: Arc<LedgerGateway>,
    registry: Arc<RegistryStore>,
}

impl ScopedArtifactStore {
    pub fn new(ledger: Arc<LedgerGateway>, registry: Arc<RegistryStore>) -> Self {
        Self { ledger, registry }
    }

    /// Write a new artifact under a fresh id. The scope defaults to the
    /// caller's own cluster or state; nation artifacts share one scope.
    pub async fn commit(
        &self,
        ctx: &AuthContext,
        layer: ArtifactLayer,
        scope_id: Option<&str>,
        payload: &Value,
    ) -> Result<ArtifactReceipt> {
        let caller = self.trainer(ctx)?;
        let scope_id = match layer {
            ArtifactLayer::Cluster => select_value(scope_id, Some(&caller.cluster)),
            ArtifactLayer::State => select_value(scope_id, Some(&caller.state)),
            ArtifactLayer::Nation => select_value(scope_id, Some(NATION_TARGET)),
        }
        .ok_or_else(|| GatewayError::Validation(format!("{} is required", layer.scope_field())))?;
        let payload = encode_payload(payload)?;

        let args = [
            layer.as_str().to_string(),
            scope_id,
            generate_id("model"),
            payload,
        ];
        let artifact: ScopedArtifact = self
            .ledger
            .invoke_json(&caller.ledger_identity, LedgerFunction::CommitArtifact, &args)
            .await?;

        info!(layer = %layer, scope = %artifact.scope_id, id = %artifact.id, owner = %artifact.owner, "artifact committed");
        Ok(ArtifactReceipt {
            data_id: artifact.id,
            layer,
            scope_id: artifact.scope_id,
            node_id: artifact.owner,
            vc_hash: caller.vc_hash,
            submitted_at: artifact.submitted_at,
        })
    }

    /// Any authorized trainer may read any scoped artifact
    pub async fn retrieve(&self, ctx: &AuthContext, layer: ArtifactLayer, id: &str) -> Result<ArtifactView> {
        let caller = self.trainer(ctx)?;
        let artifact: ScopedArtifact = self
            .ledger
            .query_json(&caller.ledger_identity, LedgerFunction::ReadArtifact, &[id.to_string()])
            .await?;
        if !artifact.layer.eq_ignore_ascii_case(layer.as_str()) {
            return Err(GatewayError::NotFound(format!("model {} not found", id)));
        }
        Ok(artifact.into())
    }

    pub async fn list(
        &self,
        ctx: &AuthContext,
        layer: ArtifactLayer,
        scope_id: Option<&str>,
        request: PageRequest,
    ) -> Result<Page<ArtifactView>> {
        let caller = self.trainer(ctx)?;
        let args = [
            layer.as_str().to_string(),
            scope_id.map(|s| s.trim().to_lowercase()).unwrap_or_default(),
            request.page.to_string(),
            request.per_page.to_string(),
        ];
        let page: Page<ScopedArtifact> = self
            .ledger
            .query_json(&caller.ledger_identity, LedgerFunction::ListArtifacts, &args)
            .await?;
        Ok(page.map(ArtifactView::from))
    }

    /// Legacy unscoped write; upserts when the caller supplies an id
    pub async fn commit_data(&self, ctx: &AuthContext, data_id: Option<&str>, payload: &Value) -> Result<DataReceipt> {
        let caller = self.trainer(ctx)?;
        let data_id = select_value(data_id, None).unwrap_or_else(|| generate_id("data"));
        let args = [data_id, encode_payload(payload)?];
        let record: DataRecord = self
            .ledger
            .invoke_json(&caller.ledger_identity, LedgerFunction::CommitData, &args)
            .await?;

        info!(id = %record.id, owner = %record.owner, "data committed");
        Ok(DataReceipt {
            data_id: record.id,
            node_id: record.owner,
            vc_hash: caller.vc_hash,
            submitted_at: record.submitted_at,
        })
    }

    /// Legacy unscoped read; only the committing node may read its record
    pub async fn read_data(&self, ctx: &AuthContext, data_id: &str) -> Result<DataView> {
        let caller = self.trainer(ctx)?;
        let record: DataRecord = self
            .ledger
            .query_json(&caller.ledger_identity, LedgerFunction::ReadData, &[data_id.to_string()])
            .await?;
        if record.owner != caller.node_id {
            warn!(id = %data_id, caller = %caller.node_id, "data read by non-owner refused");
            return Err(GatewayError::Authorization(format!(
                "record {} belongs to another trainer",
                data_id
            )));
        }
        Ok(record.into())
    }

    fn trainer(&self, ctx: &AuthContext) -> Result<RegistryRecord> {
        ctx.require_role(&[Role::Trainer])?;
        enrolled_caller(&self.registry, ctx)
    }
}
