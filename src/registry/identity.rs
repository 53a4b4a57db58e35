//! Mapping presented subjects onto ledger identities
//!
//! The mapping is deterministic: the subject is lowercased, reduced to
//! `[a-z0-9._-]`, and suffixed with the organization domain. Whether the
//! resulting identity can sign is a separate question answered by the
//! resolver.

use dashmap::DashSet;
use std::path::PathBuf;

use crate::types::{GatewayError, Result};

pub trait IdentityResolver: Send + Sync {
    /// Ledger identity for `subject`, if signing material is provisioned
    fn resolve(&self, subject: &str) -> Result<String>;
}

pub fn identity_name(subject: &str, org_domain: &str) -> Result<String> {
    let sanitized: String = subject
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let sanitized = sanitized.trim_matches(|c| c == '-' || c == '.');
    if sanitized.is_empty() {
        return Err(GatewayError::IdentityResolution(format!(
            "subject {:?} does not map to a ledger identity",
            subject
        )));
    }
    Ok(format!("{}@{}", sanitized, org_domain))
}

/// Resolves against an organization crypto tree:
/// `{crypto_path}/users/{identity}/msp` must exist.
pub struct MspIdentityResolver {
    crypto_path: PathBuf,
    org_domain: String,
}

impl MspIdentityResolver {
    pub fn new(crypto_path: impl Into<PathBuf>, org_domain: impl Into<String>) -> Self {
        Self {
            crypto_path: crypto_path.into(),
            org_domain: org_domain.into(),
        }
    }

    pub fn msp_path(&self, identity: &str) -> PathBuf {
        self.crypto_path.join("users").join(identity).join("msp")
    }
}

impl IdentityResolver for MspIdentityResolver {
    fn resolve(&self, subject: &str) -> Result<String> {
        let identity = identity_name(subject, &self.org_domain)?;
        if self.msp_path(&identity).is_dir() {
            Ok(identity)
        } else {
            Err(GatewayError::IdentityResolution(format!(
                "no signing material provisioned for {}",
                identity
            )))
        }
    }
}

/// In-memory resolver: either every identity is provisioned (dev mode) or
/// only the listed ones are.
pub struct StaticIdentityResolver {
    org_domain: String,
    provisioned: Option<DashSet<String>>,
}

impl StaticIdentityResolver {
    pub fn accept_all(org_domain: impl Into<String>) -> Self {
        Self {
            org_domain: org_domain.into(),
            provisioned: None,
        }
    }

    pub fn with_identities<I, S>(org_domain: impl Into<String>, identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            org_domain: org_domain.into(),
            provisioned: Some(identities.into_iter().map(Into::into).collect()),
        }
    }

    pub fn provision(&self, identity: impl Into<String>) {
        if let Some(set) = &self.provisioned {
            set.insert(identity.into());
        }
    }
}

impl IdentityResolver for StaticIdentityResolver {
    fn resolve(&self, subject: &str) -> Result<String> {
        let identity = identity_name(subject, &self.org_domain)?;
        match &self.provisioned {
            None => Ok(identity),
            Some(set) if set.contains(&identity) => Ok(identity),
            Some(_) => Err(GatewayError::IdentityResolution(format!(
                "no signing material provisioned for {}",
                identity
            ))),
        }
    }
}
