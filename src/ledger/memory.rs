//! In-process ledger replica
//!
//! Executes the contract against an ordered map under a single lock, so an
//! invoke (including any read-check inside it) is one atomic step in a total
//! order. Several replicas can share one world state to stand in for a
//! multi-peer network. Used in dev mode and tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::contract;
use super::{LedgerError, LedgerFunction, LedgerReplica};

/// Ordered key-value world state
#[derive(Debug, Default)]
pub struct WorldState {
    entries: BTreeMap<String, Vec<u8>>,
}

impl WorldState {
    pub fn shared() -> Arc<Mutex<WorldState>> {
        Arc::new(Mutex::new(WorldState::default()))
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn put(&mut self, key: String, value: Vec<u8>) {
        self.entries.insert(key, value);
    }

    /// Entries whose key starts with `prefix`, in key order
    pub fn scan<'a>(&'a self, prefix: &str) -> impl Iterator<Item = (&'a str, &'a [u8])> + 'a {
        let prefix = prefix.to_string();
        self.entries
            .range(prefix.clone()..)
            .take_while(move |(k, _)| k.starts_with(&prefix))
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct MemoryLedger {
    name: String,
    state: Arc<Mutex<WorldState>>,
}

impl MemoryLedger {
    /// Replica with a private world state
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_state(name, WorldState::shared())
    }

    pub fn with_state(name: impl Into<String>, state: Arc<Mutex<WorldState>>) -> Self {
        Self {
            name: name.into(),
            state,
        }
    }

    pub fn state(&self) -> Arc<Mutex<WorldState>> {
        Arc::clone(&self.state)
    }
}

#[async_trait]
impl LedgerReplica for MemoryLedger {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        identity: &str,
        function: LedgerFunction,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerError> {
        let mut state = self.state.lock().await;
        contract::execute(&mut state, identity, function, args, Utc::now())
    }

    async fn query(
        &self,
        identity: &str,
        function: LedgerFunction,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerError> {
        if function.is_write() {
            return Err(LedgerError::invalid(format!(
                "{} must be submitted as a transaction",
                function
            )));
        }
        let mut state = self.state.lock().await;
        contract::execute(&mut state, identity, function, args, Utc::now())
    }
}
