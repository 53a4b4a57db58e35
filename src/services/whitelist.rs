//! Whitelist directory
//!
//! Paged reads of the ledger whitelist and the `state -> cluster -> entries`
//! hierarchy built from them. Subject lookups go to the registry mirror.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

use crate::ledger::{LedgerFunction, LedgerGateway, Page, PageRequest};
use crate::types::{Result, WhitelistEntry};

/// Page size used when walking the whole whitelist
pub const HIERARCHY_PAGE_SIZE: usize = 50;

/// Bucket for entries without a state
pub const UNKNOWN_STATE: &str = "unknown";
/// Bucket for entries without a cluster
pub const UNASSIGNED_CLUSTER: &str = "unassigned";

/// Enrolled trainers grouped by state then cluster, both sorted
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hierarchy {
    pub states: BTreeMap<String, BTreeMap<String, Vec<WhitelistEntry>>>,
}

#[derive(Debug, Serialize)]
pub struct HierarchyView {
    pub states: Vec<StateNode>,
}

#[derive(Debug, Serialize)]
pub struct StateNode {
    pub state_id: String,
    pub clusters: Vec<ClusterNode>,
}

#[derive(Debug, Serialize)]
pub struct ClusterNode {
    pub cluster_id: String,
    pub nodes: Vec<WhitelistEntry>,
}

impl Hierarchy {
    pub fn from_entries(entries: impl IntoIterator<Item = WhitelistEntry>) -> Self {
        let mut states: BTreeMap<String, BTreeMap<String, Vec<WhitelistEntry>>> = BTreeMap::new();
        for entry in entries {
            let state = bucket(&entry.state, UNKNOWN_STATE);
            let cluster = bucket(&entry.cluster, UNASSIGNED_CLUSTER);
            states
                .entry(state)
                .or_default()
                .entry(cluster)
                .or_default()
                .push(entry);
        }
        Self { states }
    }

    /// Expected clusters of a state, lowercased, sentinel bucket excluded.
    /// Empty when the state is unknown to the whitelist.
    pub fn clusters_of(&self, state_id: &str) -> BTreeSet<String> {
        let wanted = state_id.trim().to_lowercase();
        self.states
            .iter()
            .filter(|(state, _)| state.to_lowercase() == wanted)
            .flat_map(|(_, clusters)| clusters.keys())
            .filter(|c| c.as_str() != UNASSIGNED_CLUSTER)
            .map(|c| c.to_lowercase())
            .collect()
    }

    /// Every known state, lowercased, sentinel bucket excluded
    pub fn state_ids(&self) -> BTreeSet<String> {
        self.states
            .keys()
            .filter(|s| s.as_str() != UNKNOWN_STATE)
            .map(|s| s.to_lowercase())
            .collect()
    }

    pub fn view(&self) -> HierarchyView {
        HierarchyView {
            states: self
                .states
                .iter()
                .map(|(state_id, clusters)| StateNode {
                    state_id: state_id.clone(),
                    clusters: clusters
                        .iter()
                        .map(|(cluster_id, nodes)| ClusterNode {
                            cluster_id: cluster_id.clone(),
                            nodes: nodes.clone(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

fn bucket(value: &str, sentinel: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        sentinel.to_string()
    } else {
        trimmed.to_string()
    }
}

pub struct WhitelistDirectory {
    ledger: Arc<LedgerGateway>,
    admin_identity: String,
}

impl WhitelistDirectory {
    pub fn new(ledger: Arc<LedgerGateway>, admin_identity: impl Into<String>) -> Self {
        Self {
            ledger,
            admin_identity: admin_identity.into(),
        }
    }

    pub async fn list(&self, request: PageRequest) -> Result<Page<WhitelistEntry>> {
        let args = [request.page.to_string(), request.per_page.to_string()];
        let page = self
            .ledger
            .query_json(&self.admin_identity, LedgerFunction::ListWhitelist, &args)
            .await?;
        Ok(page)
    }

    /// Walk every page sequentially and group the result
    pub async fn hierarchy(&self) -> Result<Hierarchy> {
        let mut entries = Vec::new();
        let mut page_number = 1;
        loop {
            let request = PageRequest {
                page: page_number,
                per_page: HIERARCHY_PAGE_SIZE,
            };
            let page = self.list(request).await?;
            let exhausted = !page.has_more || page.items.is_empty();
            entries.extend(page.items);
            if exhausted {
                break;
            }
            page_number += 1;
        }
        debug!(entries = entries.len(), pages = page_number, "whitelist hierarchy built");
        Ok(Hierarchy::from_entries(entries))
    }
}
