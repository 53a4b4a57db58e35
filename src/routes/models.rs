//! Scoped model artifact routes
//!
//! - POST /{layer}/models      - commit an artifact (201)
//! - GET  /{layer}/models      - list, filtered by `scopeId`, paged
//! - GET  /{layer}/models/{id} - read one artifact
//!
//! `layer` is one of cluster, state, nation.

use bytes::Bytes;
use hyper::{Method, Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::{
    authenticate, cors_preflight, json_response, method_not_allowed, param, parse_json,
    query_params, respond, BoxBody,
};
use crate::ledger::pagination::ARTIFACT_DEFAULT_PER_PAGE;
use crate::ledger::PageRequest;
use crate::server::AppState;
use crate::types::{ArtifactLayer, GatewayError, Result};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CommitModelRequest {
    #[serde(alias = "scopeId")]
    scope_id: Option<String>,
    #[serde(alias = "clusterId")]
    cluster_id: Option<String>,
    #[serde(alias = "stateId")]
    state_id: Option<String>,
    #[serde(alias = "nationId")]
    nation_id: Option<String>,
    payload: Value,
}

impl CommitModelRequest {
    /// Explicit `scope_id`, else the layer's own id field
    fn scope_for(&self, layer: ArtifactLayer) -> Option<&str> {
        let layer_field = match layer {
            ArtifactLayer::Cluster => &self.cluster_id,
            ArtifactLayer::State => &self.state_id,
            ArtifactLayer::Nation => &self.nation_id,
        };
        self.scope_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(layer_field.as_deref())
    }
}

/// Layer and remaining segments of a `/{layer}/models...` path
fn match_models_path(path: &str) -> Option<(ArtifactLayer, Vec<&str>)> {
    let mut parts = path.trim_start_matches('/').splitn(3, '/');
    let layer: ArtifactLayer = parts.next()?.parse().ok()?;
    if parts.next()? != "models" {
        return None;
    }
    let rest = parts
        .next()
        .map(|r| r.split('/').filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    Some((layer, rest))
}

pub async fn handle_models_request(
    req: &Request<Bytes>,
    state: &Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let (layer, rest) = match_models_path(req.uri().path())?;
    if req.method() == Method::OPTIONS {
        return Some(cors_preflight());
    }

    let response = match (req.method(), rest.as_slice()) {
        (&Method::POST, []) => respond(handle_commit(req, state, layer).await),
        (&Method::GET, []) => respond(handle_list(req, state, layer).await),
        (&Method::GET, [id]) => respond(handle_retrieve(req, state, layer, id).await),
        (_, []) | (_, [_]) => method_not_allowed(),
        _ => return None,
    };
    Some(response)
}

async fn handle_commit(
    req: &Request<Bytes>,
    state: &AppState,
    layer: ArtifactLayer,
) -> Result<Response<BoxBody>> {
    let ctx = authenticate(req, state)?;
    let body: CommitModelRequest = parse_json(req)?;
    let receipt = state
        .artifacts
        .commit(&ctx, layer, body.scope_for(layer), &body.payload)
        .await?;
    Ok(json_response(StatusCode::CREATED, &receipt))
}

async fn handle_list(
    req: &Request<Bytes>,
    state: &AppState,
    layer: ArtifactLayer,
) -> Result<Response<BoxBody>> {
    let ctx = authenticate(req, state)?;
    let params = query_params(req)?;
    let request = PageRequest::parse(
        param(&params, &["page"]),
        param(&params, &["perPage", "per_page"]),
        ARTIFACT_DEFAULT_PER_PAGE,
    )
    .map_err(GatewayError::Validation)?;
    let scope = param(&params, &["scopeId", "scope_id", layer.scope_field()]);

    let page = state.artifacts.list(&ctx, layer, scope, request).await?;
    Ok(json_response(StatusCode::OK, &page))
}

async fn handle_retrieve(
    req: &Request<Bytes>,
    state: &AppState,
    layer: ArtifactLayer,
    id: &str,
) -> Result<Response<BoxBody>> {
    let ctx = authenticate(req, state)?;
    let artifact = state.artifacts.retrieve(&ctx, layer, id).await?;
    Ok(json_response(StatusCode::OK, &artifact))
}
