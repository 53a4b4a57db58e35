//! Verifiable credentials presented at enrollment

pub mod canonical;
pub mod verifier;

pub use canonical::canonicalize;
pub use verifier::{
    attach_proof, credential_hash, decode_binary, decode_public_key, CredentialVerifier,
    VerifiedCredential,
};
