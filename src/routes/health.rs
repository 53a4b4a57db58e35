//! Health check endpoints
//!
//! - /health, /healthz - Liveness check
//! - /ready, /readyz - Readiness check, 200 only when at least one ledger
//!   replica is configured

use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use super::{json_response, BoxBody};
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    /// Seconds since the gateway started
    pub uptime: u64,
    pub timestamp: String,
    pub mode: &'static str,
    pub ledger: LedgerHealth,
    pub registry: RegistryHealth,
}

#[derive(Serialize)]
pub struct LedgerHealth {
    pub replicas: Vec<String>,
}

#[derive(Serialize)]
pub struct RegistryHealth {
    pub entries: usize,
    pub persistent: bool,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub replicas: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn build_health_response(state: &AppState) -> HealthResponse {
    HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        ledger: LedgerHealth {
            replicas: state.ledger.replica_names(),
        },
        registry: RegistryHealth {
            entries: state.registry.len(),
            persistent: state.registry.path().is_some(),
        },
    }
}

/// Liveness check: always 200 while the process serves requests
pub fn health_check(state: Arc<AppState>) -> Response<BoxBody> {
    json_response(StatusCode::OK, &build_health_response(&state))
}

pub fn readiness_check(state: Arc<AppState>) -> Response<BoxBody> {
    let replicas = state.ledger.replica_names().len();
    if replicas == 0 {
        return json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &ReadinessResponse {
                ready: false,
                replicas,
                error: Some("No ledger replicas configured".into()),
            },
        );
    }
    json_response(
        StatusCode::OK,
        &ReadinessResponse {
            ready: true,
            replicas,
            error: None,
        },
    )
}
