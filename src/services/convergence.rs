//! Hierarchical convergence tracker
//!
//! A scope target is Open until a summary is declared, then Converged for
//! good. Status is derived by joining the ledger's child claims against the
//! children the whitelist hierarchy says should exist.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::whitelist::{Hierarchy, WhitelistDirectory};
use super::{decode_payload, encode_payload, enrolled_caller, reader_identity, select_value};
use crate::auth::{AuthContext, Role};
use crate::ledger::{LedgerFunction, LedgerGateway};
use crate::registry::RegistryStore;
use crate::types::{
    ConvergenceRecord, ConvergenceScope, ConvergenceSummary, GatewayError, Result,
    ScopeConvergence, NATION_TARGET,
};

/// Roles allowed to read a single status
pub const STATUS_READERS: &[Role] = &[
    Role::Trainer,
    Role::Aggregator,
    Role::CentralChecker,
    Role::Admin,
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChildStatus {
    pub child_id: String,
    pub is_converged: bool,
    pub submitted_at: Option<DateTime<Utc>>,
    pub source_id: Option<String>,
    pub payload: Option<Value>,
}

impl ChildStatus {
    fn pending(child_id: &str) -> Self {
        Self {
            child_id: child_id.to_string(),
            is_converged: false,
            submitted_at: None,
            source_id: None,
            payload: None,
        }
    }
}

impl From<&ConvergenceRecord> for ChildStatus {
    fn from(record: &ConvergenceRecord) -> Self {
        Self {
            child_id: record.child_id.clone(),
            is_converged: true,
            submitted_at: Some(record.submitted_at),
            source_id: Some(record.source_id.clone()),
            payload: Some(decode_payload(&record.payload)),
        }
    }
}

/// Derived convergence view of one scope target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeStatus {
    pub scope: ConvergenceScope,
    pub target_id: String,
    pub is_converged: bool,
    pub converged_at: Option<DateTime<Utc>>,
    pub declared_by: Option<String>,
    pub summary_payload: Option<Value>,
    pub expected_children: Vec<String>,
    pub children: Vec<ChildStatus>,
    /// Claims for children the whitelist does not know about
    pub orphaned: Vec<ChildStatus>,
}

impl ScopeStatus {
    /// Join raw ledger state with the expected child set.
    ///
    /// A declared summary always wins for the displayed declaration fields.
    /// Without one, the target is converged when the expected set is non-empty
    /// and every expected child has a claim.
    pub fn compute(raw: &ScopeConvergence, expected: &BTreeSet<String>) -> Self {
        let claims: BTreeMap<String, &ConvergenceRecord> = raw
            .children
            .values()
            .map(|record| (record.child_id.trim().to_lowercase(), record))
            .collect();

        let children: Vec<ChildStatus> = expected
            .iter()
            .map(|child| match claims.get(child) {
                Some(record) => ChildStatus::from(*record),
                None => ChildStatus::pending(child),
            })
            .collect();
        let orphaned: Vec<ChildStatus> = claims
            .iter()
            .filter(|(child, _)| !expected.contains(*child))
            .map(|(_, record)| ChildStatus::from(*record))
            .collect();

        let all_submitted = !expected.is_empty() && children.iter().all(|c| c.is_converged);

        let (is_converged, converged_at, declared_by, summary_payload) = match &raw.summary {
            Some(summary) => (
                true,
                Some(summary.declared_at),
                Some(summary.declared_by.clone()),
                Some(decode_payload(&summary.payload)),
            ),
            None if all_submitted => (
                true,
                children.iter().filter_map(|c| c.submitted_at).max(),
                None,
                None,
            ),
            None => (false, None, None, None),
        };

        Self {
            scope: raw.scope,
            target_id: raw.target_id.clone(),
            is_converged,
            converged_at,
            declared_by,
            summary_payload,
            expected_children: expected.iter().cloned().collect(),
            children,
            orphaned,
        }
    }

    /// Status carrying only a committed declaration
    pub fn declared(summary: ConvergenceSummary) -> Self {
        let raw = ScopeConvergence {
            scope: summary.scope,
            target_id: summary.target_id.clone(),
            children: BTreeMap::new(),
            summary: Some(summary),
        };
        Self::compute(&raw, &BTreeSet::new())
    }
}

/// Children a scope target is expected to have according to the whitelist
pub fn expected_children(hierarchy: &Hierarchy, scope: ConvergenceScope, target_id: &str) -> BTreeSet<String> {
    match scope {
        ConvergenceScope::State => hierarchy.clusters_of(target_id),
        ConvergenceScope::Nation => hierarchy.state_ids(),
    }
}

pub struct ConvergenceTracker {
    ledger: Arc<LedgerGateway>,
    registry: Arc<RegistryStore>,
    whitelist: Arc<WhitelistDirectory>,
    admin_identity: String,
}

impl ConvergenceTracker {
    pub fn new(
        ledger: Arc<LedgerGateway>,
        registry: Arc<RegistryStore>,
        whitelist: Arc<WhitelistDirectory>,
        admin_identity: impl Into<String>,
    ) -> Self {
        Self {
            ledger,
            registry,
            whitelist,
            admin_identity: admin_identity.into(),
        }
    }

    /// Upsert a child claim. Target and child default from the caller's
    /// token: a state claim targets the caller's state on behalf of its
    /// cluster, a nation claim is made on behalf of the caller's state.
    pub async fn commit_child_claim(
        &self,
        ctx: &AuthContext,
        scope: ConvergenceScope,
        target_id: Option<&str>,
        child_id: Option<&str>,
        payload: &Value,
    ) -> Result<ChildStatus> {
        ctx.require_role(&[Role::Aggregator])?;
        let (target, child) = match scope {
            ConvergenceScope::State => (
                select_value(target_id, ctx.state.as_deref()),
                select_value(child_id, ctx.cluster.as_deref()),
            ),
            ConvergenceScope::Nation => (
                Some(NATION_TARGET.to_string()),
                select_value(child_id, ctx.state.as_deref()),
            ),
        };
        let target = target.ok_or_else(|| GatewayError::Validation("stateId is required".into()))?;
        let child = child.ok_or_else(|| {
            GatewayError::Validation(format!("{}Id is required", scope.child_kind()))
        })?;
        let payload = encode_payload(payload)?;
        let caller = enrolled_caller(&self.registry, ctx)?;

        let args = [scope.as_str().to_string(), target, child, payload];
        let record: ConvergenceRecord = self
            .ledger
            .invoke_json(&caller.ledger_identity, LedgerFunction::CommitChildClaim, &args)
            .await?;

        info!(
            scope = %scope,
            target = %record.target_id,
            child = %record.child_id,
            source = %record.source_id,
            "child claim recorded"
        );
        Ok(ChildStatus::from(&record))
    }

    /// Declare a target converged. The existence check runs inside the
    /// ledger call, so of two concurrent declarers exactly one succeeds.
    pub async fn declare_converged(
        &self,
        ctx: &AuthContext,
        scope: ConvergenceScope,
        target_id: Option<&str>,
        payload: &Value,
    ) -> Result<ScopeStatus> {
        ctx.require_role(&[Role::CentralChecker])?;
        let target = self.resolve_target(ctx, scope, target_id)?;
        let payload = encode_payload(payload)?;
        let caller = enrolled_caller(&self.registry, ctx)?;

        let args = [scope.as_str().to_string(), target.clone(), payload];
        let summary: ConvergenceSummary = self
            .ledger
            .invoke_json(&caller.ledger_identity, LedgerFunction::DeclareConverged, &args)
            .await
            .map_err(|err| {
                let err = GatewayError::from(err);
                if matches!(err, GatewayError::AlreadyConverged(_)) {
                    warn!(scope = %scope, target = %target, "repeat convergence declaration refused");
                }
                err
            })?;

        info!(scope = %scope, target = %summary.target_id, declared_by = %summary.declared_by, "scope declared converged");
        // the declaration is committed; a failed read-back must not hide that
        match self.status_of(ctx, scope, Some(&summary.target_id)).await {
            Ok(status) => Ok(status),
            Err(err) => {
                warn!(scope = %scope, target = %summary.target_id, error = %err, "status read after declaration failed");
                Ok(ScopeStatus::declared(summary))
            }
        }
    }

    /// Derived status of one target. An unknown state with no claims and no
    /// summary is NotFound; claims for an unknown target come back orphaned.
    pub async fn status_of(
        &self,
        ctx: &AuthContext,
        scope: ConvergenceScope,
        target_id: Option<&str>,
    ) -> Result<ScopeStatus> {
        ctx.require_role(STATUS_READERS)?;
        let target = self.resolve_target(ctx, scope, target_id)?;
        let identity = reader_identity(&self.registry, ctx, &self.admin_identity);

        let args = [scope.as_str().to_string(), target.clone()];
        let raw: ScopeConvergence = self
            .ledger
            .query_json(&identity, LedgerFunction::ReadStatus, &args)
            .await?;
        let hierarchy = self.whitelist.hierarchy().await?;
        let expected = expected_children(&hierarchy, scope, &raw.target_id);

        if scope == ConvergenceScope::State && raw.is_empty() && expected.is_empty() {
            return Err(GatewayError::NotFound(format!("state {} not found", target)));
        }
        if expected.is_empty() && !raw.children.is_empty() {
            debug!(scope = %scope, target = %raw.target_id, claims = raw.children.len(), "claims without expected children");
        }
        Ok(ScopeStatus::compute(&raw, &expected))
    }

    /// Status of every target with ledger state under the scope. The
    /// hierarchy is fetched once for the whole listing.
    pub async fn list_all(
        &self,
        ctx: &AuthContext,
        scope: ConvergenceScope,
    ) -> Result<BTreeMap<String, ScopeStatus>> {
        ctx.require_role(&[Role::Admin])?;
        let identity = reader_identity(&self.registry, ctx, &self.admin_identity);

        let raw: BTreeMap<String, ScopeConvergence> = self
            .ledger
            .query_json(&identity, LedgerFunction::ListStatus, &[scope.as_str().to_string()])
            .await?;
        let hierarchy = self.whitelist.hierarchy().await?;

        Ok(raw
            .into_iter()
            .map(|(target, convergence)| {
                let expected = expected_children(&hierarchy, scope, &target);
                (target, ScopeStatus::compute(&convergence, &expected))
            })
            .collect())
    }

    fn resolve_target(
        &self,
        ctx: &AuthContext,
        scope: ConvergenceScope,
        target_id: Option<&str>,
    ) -> Result<String> {
        match scope {
            ConvergenceScope::State => select_value(target_id, ctx.state.as_deref())
                .map(|t| t.to_lowercase())
                .ok_or_else(|| GatewayError::Validation("stateId is required".into())),
            ConvergenceScope::Nation => Ok(NATION_TARGET.to_string()),
        }
    }
}
