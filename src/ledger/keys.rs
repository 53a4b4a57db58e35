//! World-state key encoding: `{entity}:{id}[:{subkind}:{subid}]`

use crate::types::{ConvergenceScope, JobRecordKind};

pub const TRAINER_PREFIX: &str = "trainer:";
pub const WHITELIST_PREFIX: &str = "whitelist:";
pub const MODEL_PREFIX: &str = "model:";
pub const DATA_PREFIX: &str = "data:";
pub const STATE_CONV_PREFIX: &str = "conv:state:";
pub const NATION_CONV_PREFIX: &str = "conv:nation:";
pub const JOB_PREFIX: &str = "job:";

pub fn trainer_key(client_id: &str) -> String {
    format!("{}{}", TRAINER_PREFIX, client_id)
}

pub fn whitelist_key(subject: &str) -> String {
    format!("{}{}", WHITELIST_PREFIX, subject.trim().to_lowercase())
}

pub fn model_key(id: &str) -> String {
    format!("{}{}", MODEL_PREFIX, id)
}

pub fn data_key(id: &str) -> String {
    format!("{}{}", DATA_PREFIX, id)
}

pub fn job_key(kind: JobRecordKind, job_id: &str) -> String {
    format!("{}{}:{}", JOB_PREFIX, kind.as_str(), job_id)
}

/// Prefix holding every claim and the summary of one scope target
pub fn scope_prefix(scope: ConvergenceScope, target_id: &str) -> String {
    match scope {
        ConvergenceScope::State => format!("{}{}:", STATE_CONV_PREFIX, target_id),
        ConvergenceScope::Nation => NATION_CONV_PREFIX.to_string(),
    }
}

/// Prefix holding every target of a scope
pub fn scope_root(scope: ConvergenceScope) -> &'static str {
    match scope {
        ConvergenceScope::State => STATE_CONV_PREFIX,
        ConvergenceScope::Nation => NATION_CONV_PREFIX,
    }
}

pub fn child_claim_key(scope: ConvergenceScope, target_id: &str, child_id: &str) -> String {
    match scope {
        ConvergenceScope::State => {
            format!("{}{}:cluster:{}", STATE_CONV_PREFIX, target_id, child_id)
        }
        ConvergenceScope::Nation => format!("{}state:{}", NATION_CONV_PREFIX, child_id),
    }
}

pub fn summary_key(scope: ConvergenceScope, target_id: &str) -> String {
    match scope {
        ConvergenceScope::State => format!("{}{}:summary", STATE_CONV_PREFIX, target_id),
        ConvergenceScope::Nation => format!("{}summary", NATION_CONV_PREFIX),
    }
}

/// What a convergence key points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceKey {
    Claim { target_id: String, child_id: String },
    Summary { target_id: String },
}

/// Decode a key under [`scope_root`]; unrelated keys yield `None`
pub fn parse_convergence_key(scope: ConvergenceScope, key: &str) -> Option<ConvergenceKey> {
    let remainder = key.strip_prefix(scope_root(scope))?;
    match scope {
        ConvergenceScope::State => {
            let (target, rest) = remainder.split_once(':')?;
            if target.is_empty() {
                return None;
            }
            if rest == "summary" {
                return Some(ConvergenceKey::Summary {
                    target_id: target.to_string(),
                });
            }
            let child = rest.strip_prefix("cluster:")?;
            if child.is_empty() {
                return None;
            }
            Some(ConvergenceKey::Claim {
                target_id: target.to_string(),
                child_id: child.to_string(),
            })
        }
        ConvergenceScope::Nation => {
            if remainder == "summary" {
                return Some(ConvergenceKey::Summary {
                    target_id: crate::types::NATION_TARGET.to_string(),
                });
            }
            let child = remainder.strip_prefix("state:")?;
            if child.is_empty() {
                return None;
            }
            Some(ConvergenceKey::Claim {
                target_id: crate::types::NATION_TARGET.to_string(),
                child_id: child.to_string(),
            })
        }
    }
}
