//! Enrollment routes
//!
//! - POST /auth/register-trainer  - enroll one trainer (registration token)
//! - POST /auth/register-trainers - enroll many trainers (admin)
//! - GET  /auth/me                - caller's mirror record and ledger verdict

use bytes::Bytes;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::{
    authenticate, cors_preflight, get_auth_header, json_response, method_not_allowed, parse_json,
    respond, BoxBody,
};
use crate::auth::{extract_token_from_header, token_kind, Role, TokenKind};
use crate::registry::RegistryRecord;
use crate::server::AppState;
use crate::services::{EnrollmentBody, EnrollmentRequest};
use crate::types::{GatewayError, Result};

/// Bulk body: a bare array or `{"trainers": [...]}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BulkRequest {
    List(Vec<EnrollmentBody>),
    Wrapped { trainers: Vec<EnrollmentBody> },
}

impl BulkRequest {
    fn into_items(self) -> Vec<EnrollmentRequest> {
        match self {
            Self::List(items) | Self::Wrapped { trainers: items } => {
                items.into_iter().map(EnrollmentBody::normalized).collect()
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct MeResponse {
    subject: String,
    role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cluster: Option<String>,
    enrolled: bool,
    authorized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<RegistryRecord>,
}

pub async fn handle_auth_request(
    req: &Request<Bytes>,
    state: &Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path();
    if !path.starts_with("/auth/") {
        return None;
    }
    if req.method() == Method::OPTIONS {
        return Some(cors_preflight());
    }

    let response = match (req.method(), path) {
        (&Method::POST, "/auth/register-trainer") => respond(handle_register(req, state).await),
        (&Method::POST, "/auth/register-trainers") => {
            respond(handle_bulk_register(req, state).await)
        }
        (&Method::GET, "/auth/me") => respond(handle_me(req, state).await),
        (_, "/auth/register-trainer") | (_, "/auth/register-trainers") | (_, "/auth/me") => {
            method_not_allowed()
        }
        _ => return None,
    };
    Some(response)
}

/// Any valid gateway-issued token may register; its subject is the
/// fallback presented subject.
async fn handle_register(req: &Request<Bytes>, state: &AppState) -> Result<Response<BoxBody>> {
    let token = extract_token_from_header(get_auth_header(req))
        .ok_or_else(|| GatewayError::Authentication("No token provided".into()))?;
    if token_kind(token)? != TokenKind::Gateway {
        return Err(GatewayError::Authentication(
            "Registration requires a gateway-issued token".into(),
        ));
    }
    let result = state.authenticator.jwt().verify_token(token);
    let claims = match result.claims {
        Some(claims) if result.valid => claims,
        _ => {
            return Err(GatewayError::Authentication(
                result.error.unwrap_or_else(|| "Invalid or expired token".into()),
            ))
        }
    };

    let request = parse_json::<EnrollmentBody>(req)?.normalized();
    let record = state.enrollment.register(request, Some(&claims.sub)).await?;
    Ok(json_response(StatusCode::OK, &record))
}

async fn handle_bulk_register(req: &Request<Bytes>, state: &AppState) -> Result<Response<BoxBody>> {
    let ctx = authenticate(req, state)?;
    ctx.require_role(&[Role::Admin])?;

    let items = parse_json::<BulkRequest>(req)?.into_items();
    if items.is_empty() {
        return Err(GatewayError::Validation("at least one trainer is required".into()));
    }
    info!(admin = %ctx.subject, count = items.len(), "bulk enrollment requested");

    let outcome = state.enrollment.bulk_register(items).await;
    Ok(json_response(outcome.status_code(), &outcome))
}

async fn handle_me(req: &Request<Bytes>, state: &AppState) -> Result<Response<BoxBody>> {
    let ctx = authenticate(req, state)?;
    let record = state.registry.find_by_subject(&ctx.subject);
    let authorized = match &record {
        Some(record) => state.enrollment.is_authorized(&record.ledger_identity).await?,
        None => false,
    };

    Ok(json_response(
        StatusCode::OK,
        &MeResponse {
            subject: ctx.subject,
            role: ctx.role,
            state: ctx.state,
            cluster: ctx.cluster,
            enrolled: record.is_some(),
            authorized,
            record,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_body_shapes() {
        let bare: BulkRequest = serde_json::from_str(r#"[{"did":"a"},{"did":"b"}]"#).unwrap();
        assert_eq!(bare.into_items().len(), 2);
        let wrapped: BulkRequest = serde_json::from_str(r#"{"trainers":[{"did":"a"}]}"#).unwrap();
        assert_eq!(wrapped.into_items()[0].did, "a");
    }
}
