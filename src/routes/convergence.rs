//! Convergence routes, for `scope` in state and nation
//!
//! - POST /{scope}/convergence      - child claim (aggregator, 201)
//! - POST /{scope}/convergence/all  - declare converged (central checker, 201; 409 on repeat)
//! - GET  /{scope}/convergence      - derived status of one target
//! - GET  /{scope}/convergence/list - status of every target (admin)

use bytes::Bytes;
use hyper::{Method, Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::{
    authenticate, cors_preflight, json_response, method_not_allowed, param, parse_json,
    query_params, respond, BoxBody,
};
use crate::server::AppState;
use crate::types::{ConvergenceScope, Result};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConvergenceBody {
    #[serde(alias = "stateId")]
    state_id: Option<String>,
    #[serde(alias = "clusterId")]
    cluster_id: Option<String>,
    payload: Value,
}

impl ConvergenceBody {
    /// (target, child) named by the body for a claim under `scope`
    fn claim_ids(&self, scope: ConvergenceScope) -> (Option<&str>, Option<&str>) {
        match scope {
            ConvergenceScope::State => (self.state_id.as_deref(), self.cluster_id.as_deref()),
            ConvergenceScope::Nation => (None, self.state_id.as_deref()),
        }
    }
}

fn match_convergence_path(path: &str) -> Option<(ConvergenceScope, Option<&str>)> {
    let (scope, rest) = path.trim_start_matches('/').split_once('/')?;
    let scope: ConvergenceScope = scope.parse().ok()?;
    match rest.trim_end_matches('/') {
        "convergence" => Some((scope, None)),
        other => other
            .strip_prefix("convergence/")
            .filter(|action| !action.contains('/'))
            .map(|action| (scope, Some(action))),
    }
}

pub async fn handle_convergence_request(
    req: &Request<Bytes>,
    state: &Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let (scope, action) = match_convergence_path(req.uri().path())?;
    if req.method() == Method::OPTIONS {
        return Some(cors_preflight());
    }

    let response = match (req.method(), action) {
        (&Method::POST, None) => respond(handle_claim(req, state, scope).await),
        (&Method::GET, None) => respond(handle_status(req, state, scope).await),
        (&Method::POST, Some("all")) => respond(handle_declare(req, state, scope).await),
        (&Method::GET, Some("list")) => respond(handle_list(req, state, scope).await),
        (_, None) | (_, Some("all")) | (_, Some("list")) => method_not_allowed(),
        _ => return None,
    };
    Some(response)
}

async fn handle_claim(
    req: &Request<Bytes>,
    state: &AppState,
    scope: ConvergenceScope,
) -> Result<Response<BoxBody>> {
    let ctx = authenticate(req, state)?;
    let body: ConvergenceBody = parse_json(req)?;
    let (target, child) = body.claim_ids(scope);
    let claim = state
        .convergence
        .commit_child_claim(&ctx, scope, target, child, &body.payload)
        .await?;
    Ok(json_response(StatusCode::CREATED, &claim))
}

async fn handle_declare(
    req: &Request<Bytes>,
    state: &AppState,
    scope: ConvergenceScope,
) -> Result<Response<BoxBody>> {
    let ctx = authenticate(req, state)?;
    let body: ConvergenceBody = parse_json(req)?;
    let status = state
        .convergence
        .declare_converged(&ctx, scope, body.state_id.as_deref(), &body.payload)
        .await?;
    Ok(json_response(StatusCode::CREATED, &status))
}

async fn handle_status(
    req: &Request<Bytes>,
    state: &AppState,
    scope: ConvergenceScope,
) -> Result<Response<BoxBody>> {
    let ctx = authenticate(req, state)?;
    let params = query_params(req)?;
    let target = param(&params, &["stateId", "state_id"]);
    let status = state.convergence.status_of(&ctx, scope, target).await?;
    Ok(json_response(StatusCode::OK, &status))
}

async fn handle_list(
    req: &Request<Bytes>,
    state: &AppState,
    scope: ConvergenceScope,
) -> Result<Response<BoxBody>> {
    let ctx = authenticate(req, state)?;
    let statuses = state.convergence.list_all(&ctx, scope).await?;
    Ok(json_response(StatusCode::OK, &statuses))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convergence_path_matching() {
        assert_eq!(
            match_convergence_path("/state/convergence"),
            Some((ConvergenceScope::State, None))
        );
        assert_eq!(
            match_convergence_path("/nation/convergence/all"),
            Some((ConvergenceScope::Nation, Some("all")))
        );
        assert_eq!(
            match_convergence_path("/state/convergence/list"),
            Some((ConvergenceScope::State, Some("list")))
        );
        assert_eq!(match_convergence_path("/cluster/convergence"), None);
        assert_eq!(match_convergence_path("/state/models"), None);
        assert_eq!(match_convergence_path("/state/convergence/a/b"), None);
    }

    #[test]
    fn test_claim_ids_per_scope() {
        let body: ConvergenceBody =
            serde_json::from_str(r#"{"stateId":"s1","clusterId":"c1","payload":{}}"#).unwrap();
        assert_eq!(body.claim_ids(ConvergenceScope::State), (Some("s1"), Some("c1")));
        assert_eq!(body.claim_ids(ConvergenceScope::Nation), (None, Some("s1")));
    }
}
