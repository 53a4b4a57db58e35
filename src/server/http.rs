//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo; every accepted connection runs on its
//! own task. Request bodies are collected (size-capped) before dispatch.

use bytes::Bytes;
use http_body_util::{BodyExt, Limited};
use hyper::body::Incoming;
use hyper::header::HeaderValue;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::{Authenticator, JwtValidator};
use crate::config::Args;
use crate::credentials::CredentialVerifier;
use crate::ledger::{HttpReplica, LedgerGateway, LedgerReplica, MemoryLedger, WorldState};
use crate::registry::{IdentityResolver, MspIdentityResolver, RegistryStore, StaticIdentityResolver};
use crate::routes::{self, error_response, BoxBody};
use crate::services::{
    ConvergenceTracker, EnrollmentAuthority, JobContract, ScopedArtifactStore, WhitelistDirectory,
};
use crate::types::GatewayError;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub authenticator: Authenticator,
    pub ledger: Arc<LedgerGateway>,
    /// Local mirror of enrolled trainers
    pub registry: Arc<RegistryStore>,
    pub enrollment: EnrollmentAuthority,
    pub whitelist: Arc<WhitelistDirectory>,
    pub convergence: ConvergenceTracker,
    pub artifacts: ScopedArtifactStore,
    pub jobs: JobContract,
    pub started_at: Instant,
}

impl AppState {
    /// Build the gateway from configuration
    pub fn new(args: Args) -> Result<Self, GatewayError> {
        let registry = Arc::new(match &args.registry_path {
            Some(path) => RegistryStore::open(path)?,
            None => RegistryStore::in_memory(),
        });

        let ledger = LedgerGateway::new(build_replicas(&args)?, args.default_peer.as_deref());

        let jwt = match args.jwt_secret() {
            Some(secret) => JwtValidator::new(secret, args.jwt_expiry_seconds)?,
            None => {
                return Err(GatewayError::Config(
                    "AUTH_JWT_SECRET is required in production mode".into(),
                ))
            }
        };

        let anchor = args.trust_anchor().map_err(GatewayError::Config)?;
        if anchor.is_none() {
            warn!("No VC trust anchor configured - credential signatures are NOT checked");
        }
        let verifier = CredentialVerifier::new(anchor, args.vc_required_job_id.clone());

        let resolver: Arc<dyn IdentityResolver> = match &args.org_crypto_path {
            Some(path) => Arc::new(MspIdentityResolver::new(path, args.org_domain.clone())),
            None if args.dev_mode => {
                warn!("No ORG_CRYPTO_PATH - every subject resolves to a ledger identity");
                Arc::new(StaticIdentityResolver::accept_all(args.org_domain.clone()))
            }
            None => {
                return Err(GatewayError::Config(
                    "ORG_CRYPTO_PATH is required in production mode".into(),
                ))
            }
        };

        Ok(Self::assemble(args, ledger, registry, jwt, verifier, resolver))
    }

    /// Wire services over already-built collaborators
    pub fn assemble(
        args: Args,
        ledger: LedgerGateway,
        registry: Arc<RegistryStore>,
        jwt: JwtValidator,
        verifier: CredentialVerifier,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Self {
        let ledger = Arc::new(ledger);
        let admin = args.admin_identity.clone();

        let whitelist = Arc::new(WhitelistDirectory::new(Arc::clone(&ledger), admin.clone()));
        let enrollment = EnrollmentAuthority::new(
            Arc::clone(&ledger),
            Arc::clone(&registry),
            verifier,
            resolver,
        );
        let convergence = ConvergenceTracker::new(
            Arc::clone(&ledger),
            Arc::clone(&registry),
            Arc::clone(&whitelist),
            admin.clone(),
        );
        let artifacts = ScopedArtifactStore::new(Arc::clone(&ledger), Arc::clone(&registry));
        let jobs = JobContract::new(Arc::clone(&ledger), admin);

        Self {
            args,
            authenticator: Authenticator::new(jwt, Arc::clone(&registry)),
            ledger,
            registry,
            enrollment,
            whitelist,
            convergence,
            artifacts,
            jobs,
            started_at: Instant::now(),
        }
    }
}

/// Remote peers from LEDGER_PEERS; in dev mode without peers, in-process
/// replicas sharing one world state
fn build_replicas(args: &Args) -> Result<Vec<Arc<dyn LedgerReplica>>, GatewayError> {
    let peers = args.peer_list().map_err(GatewayError::Config)?;
    if !peers.is_empty() {
        return peers
            .into_iter()
            .map(|(name, url)| {
                info!("Ledger peer {} at {}", name, url);
                HttpReplica::new(name, url, args.ledger_timeout())
                    .map(|replica| Arc::new(replica) as Arc<dyn LedgerReplica>)
                    .map_err(GatewayError::from)
            })
            .collect();
    }

    if args.dev_mode {
        let world = WorldState::shared();
        let count = args.dev_replicas.max(1);
        info!("Dev mode: {} in-process ledger replicas", count);
        return Ok((0..count)
            .map(|i| {
                Arc::new(MemoryLedger::with_state(format!("peer{}", i), Arc::clone(&world)))
                    as Arc<dyn LedgerReplica>
            })
            .collect());
    }

    Ok(Vec::new())
}

pub async fn run(state: Arc<AppState>) -> Result<(), GatewayError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Trainer gateway listening on {} with {} ledger replica(s)",
        state.args.listen,
        state.ledger.replica_names().len()
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - do not use in production");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let request_id = Uuid::new_v4();
    info!(request_id = %request_id, "[{}] {} {}", addr, req.method(), req.uri().path());

    let (parts, body) = req.into_parts();
    let mut response = match Limited::new(body, state.args.max_body_bytes).collect().await {
        Ok(collected) => dispatch(state, Request::from_parts(parts, collected.to_bytes())).await,
        Err(err) => {
            warn!(request_id = %request_id, "Rejected request body: {}", err);
            error_response(&GatewayError::Validation(format!(
                "Request body rejected (limit {} bytes)",
                state.args.max_body_bytes
            )))
        }
    };

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert("X-Request-Id", value);
    }
    Ok(response)
}

/// Route a collected request to its handler
pub async fn dispatch(state: Arc<AppState>, req: Request<Bytes>) -> Response<BoxBody> {
    let path = req.uri().path().to_string();

    match (req.method(), path.as_str()) {
        (&Method::GET, "/health") | (&Method::GET, "/healthz") => {
            return routes::health_check(state)
        }
        (&Method::GET, "/ready") | (&Method::GET, "/readyz") => {
            return routes::readiness_check(state)
        }
        _ => {}
    }

    if let Some(response) = routes::handle_auth_request(&req, &state).await {
        return response;
    }
    if let Some(response) = routes::handle_whitelist_request(&req, &state).await {
        return response;
    }
    if let Some(response) = routes::handle_convergence_request(&req, &state).await {
        return response;
    }
    if let Some(response) = routes::handle_models_request(&req, &state).await {
        return response;
    }
    if let Some(response) = routes::handle_data_request(&req, &state).await {
        return response;
    }
    if let Some(response) = routes::handle_job_request(&req, &state).await {
        return response;
    }

    if req.method() == Method::OPTIONS {
        return routes::cors_preflight();
    }
    routes::not_found_response(&path)
}
