//! Authentication and role checks for runtime requests

pub mod jwt;
pub mod roles;

use std::sync::Arc;
use tracing::debug;

pub use jwt::{
    extract_token_from_header, issue_trainer_token, peek_trainer_subject, token_kind,
    verify_trainer_token, Claims, JwtValidator, TokenInput, TokenKind, TokenValidationResult,
    TrainerClaims,
};
pub use roles::{Role, WHITELIST_READERS};

use crate::credentials::decode_public_key;
use crate::registry::RegistryStore;
use crate::types::{GatewayError, Result};

/// Authenticated caller
#[derive(Debug, Clone, PartialEq)]
pub struct AuthContext {
    pub subject: String,
    pub role: Role,
    pub state: Option<String>,
    pub cluster: Option<String>,
}

impl AuthContext {
    pub fn require_role(&self, allowed: &[Role]) -> Result<()> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(GatewayError::Authorization(format!(
                "role {} is not permitted for this operation",
                self.role
            )))
        }
    }
}

/// Resolves bearer tokens into an [`AuthContext`]
pub struct Authenticator {
    jwt: JwtValidator,
    registry: Arc<RegistryStore>,
}

impl Authenticator {
    pub fn new(jwt: JwtValidator, registry: Arc<RegistryStore>) -> Self {
        Self { jwt, registry }
    }

    pub fn jwt(&self) -> &JwtValidator {
        &self.jwt
    }

    /// Authenticate the value of an `Authorization` header
    pub fn authenticate(&self, auth_header: Option<&str>) -> Result<AuthContext> {
        let token = extract_token_from_header(auth_header)
            .ok_or_else(|| GatewayError::Authentication("No token provided".into()))?;

        match token_kind(token)? {
            TokenKind::Gateway => {
                let result = self.jwt.verify_token(token);
                let claims = match result.claims {
                    Some(claims) if result.valid => claims,
                    _ => {
                        return Err(GatewayError::Authentication(
                            result.error.unwrap_or_else(|| "Invalid or expired token".into()),
                        ))
                    }
                };
                Ok(AuthContext {
                    subject: claims.sub,
                    role: claims.role,
                    state: claims.state,
                    cluster: claims.cluster,
                })
            }
            TokenKind::Trainer => self.authenticate_trainer(token),
        }
    }

    /// Trainer tokens verify against the public key enrolled for their subject
    fn authenticate_trainer(&self, token: &str) -> Result<AuthContext> {
        let subject = peek_trainer_subject(token)?;
        let record = self
            .registry
            .find_by_subject(&subject)
            .ok_or_else(|| GatewayError::Authorization("trainer not registered".into()))?;
        let key = decode_public_key(&record.public_key)
            .map_err(|e| GatewayError::Internal(format!("enrolled key unusable: {}", e)))?;
        verify_trainer_token(token, &key)?;

        debug!(subject = %record.jwt_sub, "trainer token verified");
        Ok(AuthContext {
            subject: record.jwt_sub,
            role: Role::Trainer,
            state: Some(record.state),
            cluster: Some(record.cluster),
        })
    }
}
