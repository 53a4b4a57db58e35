//! Shared types: errors and the records exchanged with the ledger

pub mod error;
pub mod records;

pub use error::{GatewayError, Result};
pub use records::*;
