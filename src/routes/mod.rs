//! HTTP routes for the trainer gateway
//!
//! Each router owns one path prefix and returns `None` for paths it does
//! not serve. Handlers receive the request with its body already collected.

pub mod convergence;
pub mod data;
pub mod enrollment;
pub mod health;
pub mod jobs;
pub mod models;
pub mod whitelist;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error};

pub use convergence::handle_convergence_request;
pub use data::handle_data_request;
pub use enrollment::handle_auth_request;
pub use health::{health_check, readiness_check};
pub use jobs::handle_job_request;
pub use models::handle_models_request;
pub use whitelist::handle_whitelist_request;

use crate::auth::AuthContext;
use crate::server::AppState;
use crate::types::{GatewayError, Result};

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .body(full_body(json))
        .unwrap()
}

/// Render a gateway error with its status and code
pub fn error_response(err: &GatewayError) -> Response<BoxBody> {
    let status = err.status_code();
    if status.is_server_error() {
        error!(code = err.code(), "request failed: {}", err);
    } else {
        debug!(code = err.code(), "request rejected: {}", err);
    }
    json_response(
        status,
        &ErrorResponse {
            error: err.to_string(),
            code: Some(err.code().to_string()),
        },
    )
}

/// Collapse a handler result into a response
pub fn respond(result: Result<Response<BoxBody>>) -> Response<BoxBody> {
    result.unwrap_or_else(|err| error_response(&err))
}

pub fn cors_preflight() -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .header("Access-Control-Max-Age", "86400")
        .body(empty_body())
        .unwrap()
}

pub fn method_not_allowed() -> Response<BoxBody> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &ErrorResponse {
            error: "Method not allowed".into(),
            code: None,
        },
    )
}

pub fn not_found_response(path: &str) -> Response<BoxBody> {
    json_response(
        StatusCode::NOT_FOUND,
        &ErrorResponse {
            error: format!("No route for {}", path),
            code: Some("NOT_FOUND".into()),
        },
    )
}

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

pub fn get_auth_header(req: &Request<Bytes>) -> Option<&str> {
    req.headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
}

/// Authenticate the caller of a runtime request
pub fn authenticate(req: &Request<Bytes>, state: &AppState) -> Result<AuthContext> {
    state.authenticator.authenticate(get_auth_header(req))
}

pub fn parse_json<T: DeserializeOwned>(req: &Request<Bytes>) -> Result<T> {
    if req.body().is_empty() {
        return Err(GatewayError::Validation("Request body is required".into()));
    }
    serde_json::from_slice(req.body())
        .map_err(|e| GatewayError::Validation(format!("Invalid JSON: {}", e)))
}

/// Query string parameters; later duplicates win
pub fn query_params(req: &Request<Bytes>) -> Result<HashMap<String, String>> {
    match req.uri().query() {
        Some(query) => serde_urlencoded::from_str(query)
            .map_err(|e| GatewayError::Validation(format!("Invalid query string: {}", e))),
        None => Ok(HashMap::new()),
    }
}

/// First present parameter among `names`
pub fn param<'a>(params: &'a HashMap<String, String>, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .find_map(|n| params.get(*n))
        .map(String::as_str)
}

/// Path segments after `prefix`, without empty segments
pub fn segments<'a>(path: &'a str, prefix: &str) -> Vec<&'a str> {
    path.strip_prefix(prefix)
        .unwrap_or("")
        .split('/')
        .filter(|s| !s.is_empty())
        .collect()
}
