//! JWT handling
//!
//! Two kinds of bearer token reach the gateway:
//! - gateway-issued HS256 tokens carrying a role (registration, admin,
//!   aggregator, central checker)
//! - EdDSA runtime tokens a trainer signs with its own enrolled key
//!
//! The algorithm in the token header decides which path verifies it.

use base64::prelude::*;
use ed25519_dalek::{SigningKey, VerifyingKey};
use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use zeroize::Zeroizing;

use crate::auth::Role;
use crate::types::GatewayError;

/// PKCS#8 v1 prefix for a raw Ed25519 seed
const ED25519_PKCS8_PREFIX: [u8; 16] = [
    0x30, 0x2e, 0x02, 0x01, 0x00, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x04, 0x22, 0x04, 0x20,
];

/// Payload of a gateway-issued token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    pub iat: u64,
    pub exp: u64,
}

/// Payload of a trainer runtime token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerClaims {
    pub sub: String,
    #[serde(default)]
    pub iat: u64,
    pub exp: u64,
}

/// Input for creating a new token
#[derive(Debug, Clone)]
pub struct TokenInput {
    pub subject: String,
    pub role: Role,
    pub state: Option<String>,
    pub cluster: Option<String>,
}

/// Result of token validation
#[derive(Debug)]
pub struct TokenValidationResult {
    pub valid: bool,
    pub claims: Option<Claims>,
    pub error: Option<String>,
}

impl TokenValidationResult {
    pub fn valid(claims: Claims) -> Self {
        Self {
            valid: true,
            claims: Some(claims),
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            claims: None,
            error: Some(error.into()),
        }
    }
}

/// Which verification path a token needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Gateway,
    Trainer,
}

/// HS256 validator and generator for gateway-issued tokens
#[derive(Clone)]
pub struct JwtValidator {
    secret: Zeroizing<String>,
    expiry_seconds: u64,
}

impl JwtValidator {
    /// Create a new JWT validator
    ///
    /// Returns an error if the secret is empty or too short
    pub fn new(secret: String, expiry_seconds: u64) -> Result<Self, GatewayError> {
        if secret.is_empty() {
            return Err(GatewayError::Config(
                "AUTH_JWT_SECRET is required in production mode".into(),
            ));
        }

        if secret.len() < 32 {
            return Err(GatewayError::Config(
                "AUTH_JWT_SECRET must be at least 32 characters".into(),
            ));
        }

        Ok(Self {
            secret: Zeroizing::new(secret),
            expiry_seconds,
        })
    }

    /// Create a validator for dev mode
    pub fn new_dev() -> Self {
        Self {
            secret: Zeroizing::new("dev-mode-secret-not-for-production-use-123456".into()),
            expiry_seconds: 3600,
        }
    }

    /// Generate a gateway token
    pub fn generate_token(&self, input: TokenInput) -> Result<String, GatewayError> {
        let now = unix_now()?;
        let claims = Claims {
            sub: input.subject,
            role: input.role,
            state: input.state,
            cluster: input.cluster,
            iat: now,
            exp: now + self.expiry_seconds,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| GatewayError::Internal(format!("Failed to generate token: {}", e)))
    }

    /// Verify and decode a gateway token
    pub fn verify_token(&self, token: &str) -> TokenValidationResult {
        let validation = Validation::new(Algorithm::HS256);

        match decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        ) {
            Ok(token_data) => TokenValidationResult::valid(token_data.claims),
            Err(err) => TokenValidationResult::invalid(describe(&err)),
        }
    }
}

/// Classify a token by its header algorithm
pub fn token_kind(token: &str) -> Result<TokenKind, GatewayError> {
    let header = decode_header(token)
        .map_err(|_| GatewayError::Authentication("Malformed token".into()))?;
    match header.alg {
        Algorithm::HS256 => Ok(TokenKind::Gateway),
        Algorithm::EdDSA => Ok(TokenKind::Trainer),
        other => Err(GatewayError::Authentication(format!(
            "Unsupported token algorithm: {:?}",
            other
        ))),
    }
}

/// Read the subject of a trainer token before its key is known.
///
/// The result is only a lookup hint; [`verify_trainer_token`] must follow.
pub fn peek_trainer_subject(token: &str) -> Result<String, GatewayError> {
    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    let data = decode::<TrainerClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|_| GatewayError::Authentication("Malformed token".into()))?;
    Ok(data.claims.sub)
}

/// Verify a trainer runtime token against the trainer's enrolled key
pub fn verify_trainer_token(token: &str, key: &VerifyingKey) -> Result<TrainerClaims, GatewayError> {
    let decoding_key = DecodingKey::from_ed_components(&BASE64_URL_SAFE_NO_PAD.encode(key.to_bytes()))
        .map_err(|e| GatewayError::Internal(format!("Invalid enrolled key: {}", e)))?;
    let validation = Validation::new(Algorithm::EdDSA);

    decode::<TrainerClaims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|err| GatewayError::Authentication(describe(&err).into()))
}

/// Sign a trainer runtime token; used by trainer clients and tests
pub fn issue_trainer_token(
    subject: &str,
    key: &SigningKey,
    expiry_seconds: u64,
) -> Result<String, GatewayError> {
    let now = unix_now()?;
    let claims = TrainerClaims {
        sub: subject.to_string(),
        iat: now,
        exp: now + expiry_seconds,
    };
    let mut der = ED25519_PKCS8_PREFIX.to_vec();
    der.extend_from_slice(&key.to_bytes());

    encode(
        &Header::new(Algorithm::EdDSA),
        &claims,
        &EncodingKey::from_ed_der(&der),
    )
    .map_err(|e| GatewayError::Internal(format!("Failed to sign trainer token: {}", e)))
}

/// Extract token from Authorization header.
/// Supports "Bearer <token>" format and raw tokens.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;

    if let Some(token) = header.strip_prefix("Bearer ") {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    if !header.contains(' ') {
        let token = header.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    None
}

fn describe(err: &jsonwebtoken::errors::Error) -> &'static str {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => "Token expired",
        ErrorKind::InvalidToken => "Invalid token",
        ErrorKind::InvalidSignature => "Invalid signature",
        ErrorKind::InvalidAlgorithm => "Unexpected token algorithm",
        _ => "Token validation failed",
    }
}

fn unix_now() -> Result<u64, GatewayError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| GatewayError::Internal(format!("System time error: {}", e)))
}
