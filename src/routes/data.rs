//! Legacy unscoped data routes
//!
//! - POST /data/commit - write a record (201)
//! - GET  /data/{id}   - read a record; owner only

use bytes::Bytes;
use hyper::{Method, Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::{
    authenticate, cors_preflight, json_response, method_not_allowed, parse_json, respond,
    segments, BoxBody,
};
use crate::server::AppState;
use crate::types::Result;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CommitDataRequest {
    #[serde(alias = "dataId", alias = "id")]
    data_id: Option<String>,
    payload: Value,
}

pub async fn handle_data_request(
    req: &Request<Bytes>,
    state: &Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path();
    if path != "/data" && !path.starts_with("/data/") {
        return None;
    }
    if req.method() == Method::OPTIONS {
        return Some(cors_preflight());
    }

    let response = match (req.method(), segments(path, "/data").as_slice()) {
        (&Method::POST, ["commit"]) => respond(handle_commit(req, state).await),
        (&Method::GET, [id]) => respond(handle_read(req, state, id).await),
        (_, [_]) => method_not_allowed(),
        _ => return None,
    };
    Some(response)
}

async fn handle_commit(req: &Request<Bytes>, state: &AppState) -> Result<Response<BoxBody>> {
    let ctx = authenticate(req, state)?;
    let body: CommitDataRequest = parse_json(req)?;
    let receipt = state
        .artifacts
        .commit_data(&ctx, body.data_id.as_deref(), &body.payload)
        .await?;
    Ok(json_response(StatusCode::CREATED, &receipt))
}

async fn handle_read(req: &Request<Bytes>, state: &AppState, id: &str) -> Result<Response<BoxBody>> {
    let ctx = authenticate(req, state)?;
    let record = state.artifacts.read_data(&ctx, id).await?;
    Ok(json_response(StatusCode::OK, &record))
}
