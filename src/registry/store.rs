//! Local mirror of enrolled trainers
//!
//! Keyed by the lowercased subject the caller presented at enrollment, with
//! a secondary index by ledger identity. Optionally snapshotted to a JSON
//! file after every write so restarts keep resolving identities without a
//! ledger round trip.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::types::{GatewayError, Result};

/// One enrolled trainer as seen by the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub jwt_sub: String,
    pub did: String,
    pub node_id: String,
    pub state: String,
    pub cluster: String,
    pub vc_hash: String,
    pub public_key: String,
    /// Ledger identity the trainer's calls are signed as
    pub ledger_identity: String,
    pub registered_at: DateTime<Utc>,
}

pub struct RegistryStore {
    by_subject: DashMap<String, RegistryRecord>,
    /// ledger identity -> subject
    by_identity: DashMap<String, String>,
    path: Option<PathBuf>,
    persist_lock: Mutex<()>,
}

impl RegistryStore {
    pub fn in_memory() -> Self {
        Self {
            by_subject: DashMap::new(),
            by_identity: DashMap::new(),
            path: None,
            persist_lock: Mutex::new(()),
        }
    }

    /// Open a file-backed store, loading the snapshot if one exists
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let store = Self {
            path: Some(path.clone()),
            ..Self::in_memory()
        };

        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            let records: Vec<RegistryRecord> = serde_json::from_str(&contents).map_err(|e| {
                GatewayError::Config(format!("corrupt registry snapshot {}: {}", path.display(), e))
            })?;
            for record in records {
                store.index(record);
            }
            info!("Loaded {} registry records from {}", store.len(), path.display());
        } else if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        Ok(store)
    }

    /// Insert or replace the record for its subject. File-backed stores
    /// write the snapshot first and only index once it is on disk.
    pub async fn upsert(&self, mut record: RegistryRecord) -> Result<()> {
        record.jwt_sub = normalize_subject(&record.jwt_sub);
        debug!(subject = %record.jwt_sub, identity = %record.ledger_identity, "registry upsert");

        let Some(path) = self.path.clone() else {
            self.index(record);
            return Ok(());
        };
        let _guard = self.persist_lock.lock().await;

        let mut records: Vec<RegistryRecord> = self
            .by_subject
            .iter()
            .filter(|r| r.key() != &record.jwt_sub)
            .map(|r| r.value().clone())
            .collect();
        records.push(record.clone());
        records.sort_by(|a, b| a.jwt_sub.cmp(&b.jwt_sub));
        let contents = serde_json::to_string_pretty(&records)
            .map_err(|e| GatewayError::Internal(format!("registry encode failed: {}", e)))?;

        tokio::task::spawn_blocking(move || write_snapshot(&path, contents.as_bytes()))
            .await
            .map_err(|e| GatewayError::Internal(format!("registry persist task failed: {}", e)))??;

        self.index(record);
        Ok(())
    }

    pub fn find_by_subject(&self, subject: &str) -> Option<RegistryRecord> {
        self.by_subject
            .get(&normalize_subject(subject))
            .map(|r| r.value().clone())
    }

    pub fn find_by_identity(&self, identity: &str) -> Option<RegistryRecord> {
        let subject = self.by_identity.get(identity)?.value().clone();
        self.find_by_subject(&subject)
    }

    pub fn len(&self) -> usize {
        self.by_subject.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_subject.is_empty()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn index(&self, record: RegistryRecord) {
        if let Some(previous) = self.by_subject.get(&record.jwt_sub) {
            if previous.ledger_identity != record.ledger_identity {
                self.by_identity.remove(&previous.ledger_identity);
            }
        }
        self.by_identity
            .insert(record.ledger_identity.clone(), record.jwt_sub.clone());
        self.by_subject.insert(record.jwt_sub.clone(), record);
    }
}

/// Write the snapshot to a temp file, then rename over the old one
fn write_snapshot(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let mut file = std::fs::File::create(&tmp)?;
    file.write_all(contents)?;
    file.sync_all()?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

pub fn normalize_subject(subject: &str) -> String {
    subject.trim().to_lowercase()
}
