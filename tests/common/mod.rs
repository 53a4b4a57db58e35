//! Shared harness: a dev-mode gateway over in-process ledger replicas with a
//! real credential issuer and a file-backed registry mirror.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::prelude::*;
use bytes::Bytes;
use clap::Parser;
use ed25519_dalek::SigningKey;
use http_body_util::BodyExt;
use hyper::{Method, Request, StatusCode};
use rand::rngs::OsRng;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use trainer_gateway::auth::{issue_trainer_token, JwtValidator, Role, TokenInput};
use trainer_gateway::credentials::{attach_proof, CredentialVerifier};
use trainer_gateway::ledger::{
    LedgerError, LedgerFunction, LedgerGateway, LedgerReplica, MemoryLedger, WorldState,
};
use trainer_gateway::registry::{IdentityResolver, RegistryStore, StaticIdentityResolver};
use trainer_gateway::server::dispatch;
use trainer_gateway::services::EnrollmentRequest;
use trainer_gateway::{AppState, Args};

pub const ORG_DOMAIN: &str = "org1.example.com";

pub struct Harness {
    pub state: Arc<AppState>,
    pub issuer: SigningKey,
    pub dir: TempDir,
}

/// An enrolled trainer and the key it signs runtime tokens with
pub struct Trainer {
    pub subject: String,
    pub key: SigningKey,
    pub vc: Value,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_replicas(2)
    }

    pub fn with_replicas(count: usize) -> Self {
        let world = WorldState::shared();
        let replicas: Vec<Arc<dyn LedgerReplica>> = (0..count)
            .map(|i| {
                Arc::new(MemoryLedger::with_state(format!("peer{}", i), Arc::clone(&world)))
                    as Arc<dyn LedgerReplica>
            })
            .collect();
        Self::with_ledger(replicas, |_| {
            Arc::new(StaticIdentityResolver::accept_all(ORG_DOMAIN)) as Arc<dyn IdentityResolver>
        })
    }

    /// Gateway over caller-supplied replicas; the resolver is built against
    /// the harness tempdir
    pub fn with_ledger<F>(replicas: Vec<Arc<dyn LedgerReplica>>, resolver: F) -> Self
    where
        F: FnOnce(&Path) -> Arc<dyn IdentityResolver>,
    {
        let dir = TempDir::new().unwrap();
        let issuer = SigningKey::generate(&mut OsRng);

        let args = Args::parse_from(["trainer-gateway", "--dev-mode"]);
        let registry = Arc::new(RegistryStore::open(dir.path().join("registry.json")).unwrap());

        let state = AppState::assemble(
            args,
            LedgerGateway::new(replicas, None),
            registry,
            JwtValidator::new_dev(),
            CredentialVerifier::new(Some(issuer.verifying_key()), None),
            resolver(dir.path()),
        );

        Self {
            state: Arc::new(state),
            issuer,
            dir,
        }
    }

    /// Signed credential for `did`
    pub fn credential(&self, did: &str) -> Value {
        self.credential_valid_between(did, "2020-01-01T00:00:00Z", "2999-01-01T00:00:00Z")
    }

    /// Signed credential for `did` with an explicit validity window
    pub fn credential_valid_between(&self, did: &str, valid_from: &str, valid_until: &str) -> Value {
        let unsigned = json!({
            "id": format!("urn:uuid:{}", uuid::Uuid::new_v4()),
            "issuer": "did:example:issuer",
            "validFrom": valid_from,
            "validUntil": valid_until,
            "credentialSubject": { "id": did, "jobId": "job-1" }
        });
        attach_proof(&unsigned, &self.issuer).unwrap()
    }

    /// Enrollment body for `subject`, with a fresh node key
    pub fn enrollment(&self, subject: &str, state: &str, cluster: &str) -> (EnrollmentRequest, SigningKey) {
        let key = SigningKey::generate(&mut OsRng);
        let did = format!("did:example:{}", subject);
        let request = EnrollmentRequest {
            did: did.clone(),
            node_id: format!("node-{}", subject),
            vc: Some(self.credential(&did)),
            public_key: BASE64_STANDARD.encode(key.verifying_key().to_bytes()),
            jwt_sub: subject.to_string(),
            state: state.to_string(),
            cluster: cluster.to_string(),
        };
        (request, key)
    }

    pub fn enrollment_json(request: &EnrollmentRequest) -> Value {
        json!({
            "did": request.did,
            "nodeId": request.node_id,
            "vc": request.vc,
            "public_key": request.public_key,
            "jwt_sub": request.jwt_sub,
            "state": request.state,
            "cluster": request.cluster,
        })
    }

    /// Enroll directly through the enrollment authority
    pub async fn enroll(&self, subject: &str, state: &str, cluster: &str) -> Trainer {
        let (request, key) = self.enrollment(subject, state, cluster);
        let vc = request.vc.clone().unwrap();
        self.state.enrollment.register(request, None).await.unwrap();
        Trainer {
            subject: subject.to_string(),
            key,
            vc,
        }
    }

    pub fn gateway_token(&self, subject: &str, role: Role, state: Option<&str>, cluster: Option<&str>) -> String {
        self.state
            .authenticator
            .jwt()
            .generate_token(TokenInput {
                subject: subject.to_string(),
                role,
                state: state.map(str::to_string),
                cluster: cluster.map(str::to_string),
            })
            .unwrap()
    }

    pub fn trainer_token(&self, trainer: &Trainer) -> String {
        issue_trainer_token(&trainer.subject, &trainer.key, 300).unwrap()
    }

    /// Drive one request through the router; returns status and JSON body
    pub async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        let body = body.map(|b| Bytes::from(b.to_string())).unwrap_or_default();
        let response = dispatch(Arc::clone(&self.state), builder.body(body).unwrap()).await;

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}

/// Replica whose peer is unreachable
pub struct UnreachableReplica;

#[async_trait]
impl LedgerReplica for UnreachableReplica {
    fn name(&self) -> &str {
        "unreachable"
    }

    async fn invoke(&self, _: &str, function: LedgerFunction, _: &[String]) -> Result<Vec<u8>, LedgerError> {
        Err(LedgerError::Transport(format!("{} timed out", function)))
    }

    async fn query(&self, _: &str, function: LedgerFunction, _: &[String]) -> Result<Vec<u8>, LedgerError> {
        Err(LedgerError::Transport(format!("{} timed out", function)))
    }
}

/// Replica that commits writes but whose reads time out
pub struct WriteOnlyReplica(pub MemoryLedger);

#[async_trait]
impl LedgerReplica for WriteOnlyReplica {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn invoke(&self, identity: &str, function: LedgerFunction, args: &[String]) -> Result<Vec<u8>, LedgerError> {
        self.0.invoke(identity, function, args).await
    }

    async fn query(&self, _: &str, function: LedgerFunction, _: &[String]) -> Result<Vec<u8>, LedgerError> {
        Err(LedgerError::Transport(format!("{} timed out", function)))
    }
}
