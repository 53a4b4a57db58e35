//! Configuration for the trainer gateway
//!
//! CLI arguments with environment variable fallbacks using clap.

use clap::Parser;
use ed25519_dalek::VerifyingKey;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::credentials::decode_public_key;

/// Secret used when dev mode runs without AUTH_JWT_SECRET
pub const DEV_JWT_SECRET: &str = "dev-mode-secret-not-for-production-use-123456";

/// Trainer gateway - enrollment, whitelist and convergence tracking for
/// federated training over a permissioned ledger
#[derive(Parser, Debug, Clone)]
#[command(name = "trainer-gateway")]
#[command(about = "Federated trainer gateway over a permissioned ledger")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:9000")]
    pub listen: SocketAddr,

    /// Development mode: in-process ledger, permissive identity resolution,
    /// credential signatures not checked
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// HS256 secret for gateway-issued tokens (required in production)
    #[arg(long, env = "AUTH_JWT_SECRET")]
    pub auth_jwt_secret: Option<String>,

    /// Lifetime of gateway-issued tokens in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    pub jwt_expiry_seconds: u64,

    /// Ed25519 public key of the credential issuer (hex, base64 or base64url)
    #[arg(long, env = "VC_TRUST_ANCHOR_KEY")]
    pub vc_trust_anchor_key: Option<String>,

    /// Job id every enrollment credential must be bound to
    #[arg(long, env = "VC_REQUIRED_JOB_ID")]
    pub vc_required_job_id: Option<String>,

    /// Ledger peers as `name=url,name=url`
    #[arg(long, env = "LEDGER_PEERS")]
    pub ledger_peers: Option<String>,

    /// Peer placed first in the rotation
    #[arg(long, env = "DEFAULT_PEER")]
    pub default_peer: Option<String>,

    /// Ledger identity used for whitelist writes, job records and
    /// reads by callers without an enrolled identity
    #[arg(long, env = "ADMIN_IDENTITY", default_value = "admin@org1.example.com")]
    pub admin_identity: String,

    /// Root of the organization's crypto material; user identities live
    /// under `users/{name}/msp`
    #[arg(long, env = "ORG_CRYPTO_PATH")]
    pub org_crypto_path: Option<PathBuf>,

    /// Domain appended to ledger identity names
    #[arg(long, env = "ORG_DOMAIN", default_value = "org1.example.com")]
    pub org_domain: String,

    /// Snapshot file of the local registry mirror (in-memory when unset)
    #[arg(long, env = "REGISTRY_PATH")]
    pub registry_path: Option<PathBuf>,

    /// Maximum accepted request body size
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "1048576")]
    pub max_body_bytes: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (pretty, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Per-call timeout for remote ledger peers in milliseconds
    #[arg(long, env = "LEDGER_TIMEOUT_MS", default_value = "10000")]
    pub ledger_timeout_ms: u64,

    /// Number of in-process replicas in dev mode when no peers are given
    #[arg(long, env = "DEV_REPLICAS", default_value = "2")]
    pub dev_replicas: usize,
}

impl Args {
    /// Effective JWT secret (dev default when unset in dev mode)
    pub fn jwt_secret(&self) -> Option<String> {
        match (&self.auth_jwt_secret, self.dev_mode) {
            (Some(secret), _) => Some(secret.clone()),
            (None, true) => Some(DEV_JWT_SECRET.to_string()),
            (None, false) => None,
        }
    }

    /// Parse `LEDGER_PEERS` into `(name, url)` pairs
    pub fn peer_list(&self) -> Result<Vec<(String, String)>, String> {
        let raw = match self.ledger_peers.as_deref() {
            Some(raw) => raw,
            None => return Ok(Vec::new()),
        };
        let mut peers = Vec::new();
        for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (name, url) = item
                .split_once('=')
                .map(|(n, u)| (n.trim(), u.trim()))
                .filter(|(n, u)| !n.is_empty() && !u.is_empty())
                .ok_or_else(|| format!("malformed LEDGER_PEERS entry: {}", item))?;
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("ledger peer {} must use an http(s) url", name));
            }
            if peers.iter().any(|(existing, _): &(String, String)| existing == name) {
                return Err(format!("duplicate ledger peer: {}", name));
            }
            peers.push((name.to_string(), url.trim_end_matches('/').to_string()));
        }
        Ok(peers)
    }

    /// Parsed trust anchor, if configured
    pub fn trust_anchor(&self) -> Result<Option<VerifyingKey>, String> {
        match self.vc_trust_anchor_key.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => decode_public_key(raw)
                .map(Some)
                .map_err(|e| format!("VC_TRUST_ANCHOR_KEY: {}", e)),
            _ => Ok(None),
        }
    }

    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger_timeout_ms)
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        let peers = self.peer_list()?;
        self.trust_anchor()?;

        if !self.dev_mode {
            match self.auth_jwt_secret.as_deref() {
                None | Some("") => {
                    return Err("AUTH_JWT_SECRET is required in production mode".to_string())
                }
                Some(secret) if secret.len() < 32 => {
                    return Err("AUTH_JWT_SECRET must be at least 32 characters".to_string())
                }
                _ => {}
            }
            if self.vc_trust_anchor_key.is_none() {
                return Err("VC_TRUST_ANCHOR_KEY is required in production mode".to_string());
            }
            if peers.is_empty() {
                return Err("LEDGER_PEERS is required in production mode".to_string());
            }
            if self.org_crypto_path.is_none() {
                return Err("ORG_CRYPTO_PATH is required in production mode".to_string());
            }
        }

        if let Some(default_peer) = &self.default_peer {
            if !peers.is_empty() && !peers.iter().any(|(name, _)| name == default_peer) {
                return Err(format!("DEFAULT_PEER {} is not in LEDGER_PEERS", default_peer));
            }
        }

        if self.admin_identity.trim().is_empty() {
            return Err("ADMIN_IDENTITY must not be empty".to_string());
        }
        if self.max_body_bytes == 0 {
            return Err("MAX_BODY_BYTES must be greater than zero".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["trainer-gateway"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_peer_list_parsing() {
        let parsed = args(&["--ledger-peers", "peer0=http://p0:7051/, peer1=https://p1"]);
        assert_eq!(
            parsed.peer_list().unwrap(),
            vec![
                ("peer0".to_string(), "http://p0:7051".to_string()),
                ("peer1".to_string(), "https://p1".to_string()),
            ]
        );

        assert!(args(&["--ledger-peers", "peer0"]).peer_list().is_err());
        assert!(args(&["--ledger-peers", "peer0=ftp://x"]).peer_list().is_err());
        assert!(args(&["--ledger-peers", "a=http://x,a=http://y"]).peer_list().is_err());
    }

    #[test]
    fn test_dev_mode_needs_nothing_else() {
        let parsed = args(&["--dev-mode"]);
        assert!(parsed.validate().is_ok());
        assert_eq!(parsed.jwt_secret().as_deref(), Some(DEV_JWT_SECRET));
    }

    #[test]
    fn test_production_requires_secret_and_peers() {
        let err = args(&[]).validate().unwrap_err();
        assert!(err.contains("AUTH_JWT_SECRET"));

        let short = args(&["--auth-jwt-secret", "short"]);
        assert!(short.validate().unwrap_err().contains("32 characters"));
    }

    #[test]
    fn test_unknown_default_peer_is_rejected() {
        let parsed = args(&[
            "--dev-mode",
            "--ledger-peers",
            "peer0=http://p0",
            "--default-peer",
            "peer9",
        ]);
        assert!(parsed.validate().unwrap_err().contains("DEFAULT_PEER"));
    }
}
