//! Job contract routes, for `kind` in genesis-model-cid, genesis-model-hash
//! and training-config
//!
//! - POST /job-contract/{kind}         - upsert the record (admin)
//! - GET  /job-contract/{kind}?jobId=  - read the record

use bytes::Bytes;
use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;

use super::{
    authenticate, cors_preflight, json_response, method_not_allowed, param, parse_json,
    query_params, respond, segments, BoxBody,
};
use crate::server::AppState;
use crate::services::{GenesisModelCidRequest, GenesisModelHashRequest, TrainingConfigRequest};
use crate::types::{GatewayError, JobRecordKind, Result};

pub async fn handle_job_request(
    req: &Request<Bytes>,
    state: &Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path();
    if !path.starts_with("/job-contract/") {
        return None;
    }
    let kind = match segments(path, "/job-contract").as_slice() {
        [kind] => kind.parse::<JobRecordKind>().ok()?,
        _ => return None,
    };

    let response = match *req.method() {
        Method::OPTIONS => cors_preflight(),
        Method::POST => respond(handle_upsert(req, state, kind).await),
        Method::GET => respond(handle_read(req, state, kind).await),
        _ => method_not_allowed(),
    };
    Some(response)
}

async fn handle_upsert(
    req: &Request<Bytes>,
    state: &AppState,
    kind: JobRecordKind,
) -> Result<Response<BoxBody>> {
    let ctx = authenticate(req, state)?;
    let stored = match kind {
        JobRecordKind::GenesisModelCid => {
            state.jobs.upsert(&ctx, &parse_json::<GenesisModelCidRequest>(req)?).await?
        }
        JobRecordKind::GenesisModelHash => {
            state.jobs.upsert(&ctx, &parse_json::<GenesisModelHashRequest>(req)?).await?
        }
        JobRecordKind::TrainingConfig => {
            state.jobs.upsert(&ctx, &parse_json::<TrainingConfigRequest>(req)?).await?
        }
    };
    Ok(json_response(StatusCode::OK, &stored))
}

async fn handle_read(
    req: &Request<Bytes>,
    state: &AppState,
    kind: JobRecordKind,
) -> Result<Response<BoxBody>> {
    let ctx = authenticate(req, state)?;
    let params = query_params(req)?;
    let job_id = param(&params, &["jobId", "job_id"])
        .ok_or_else(|| GatewayError::Validation("jobId is required".into()))?;
    let record = state.jobs.read(&ctx, kind, job_id).await?;
    Ok(json_response(StatusCode::OK, &record))
}
