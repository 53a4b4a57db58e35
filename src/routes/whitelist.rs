//! GET /whitelist - paged whitelist, or the state/cluster hierarchy with
//! `view=hierarchy`

use bytes::Bytes;
use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;

use super::{
    authenticate, cors_preflight, json_response, method_not_allowed, param, query_params, respond,
    BoxBody,
};
use crate::auth::WHITELIST_READERS;
use crate::ledger::pagination::WHITELIST_DEFAULT_PER_PAGE;
use crate::ledger::PageRequest;
use crate::server::AppState;
use crate::types::{GatewayError, Result};

pub async fn handle_whitelist_request(
    req: &Request<Bytes>,
    state: &Arc<AppState>,
) -> Option<Response<BoxBody>> {
    if req.uri().path() != "/whitelist" {
        return None;
    }
    let response = match *req.method() {
        Method::OPTIONS => cors_preflight(),
        Method::GET => respond(handle_list(req, state).await),
        _ => method_not_allowed(),
    };
    Some(response)
}

async fn handle_list(req: &Request<Bytes>, state: &AppState) -> Result<Response<BoxBody>> {
    let ctx = authenticate(req, state)?;
    ctx.require_role(WHITELIST_READERS)?;
    let params = query_params(req)?;

    if param(&params, &["view"]).is_some_and(|v| v.eq_ignore_ascii_case("hierarchy")) {
        let hierarchy = state.whitelist.hierarchy().await?;
        return Ok(json_response(StatusCode::OK, &hierarchy.view()));
    }

    let request = PageRequest::parse(
        param(&params, &["page"]),
        param(&params, &["perPage", "per_page"]),
        WHITELIST_DEFAULT_PER_PAGE,
    )
    .map_err(GatewayError::Validation)?;
    let page = state.whitelist.list(request).await?;
    Ok(json_response(StatusCode::OK, &page))
}
