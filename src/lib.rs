//! Trainer gateway for hierarchical federated learning
//!
//! Edge trainers enroll once with a signed verifiable credential, then
//! commit model artifacts and convergence claims that coordinators read to
//! decide when a round is complete at each tier (cluster, state, nation).
//!
//! ## Components
//!
//! - **Ledger gateway**: round-robin `invoke`/`query` over ledger replicas
//! - **Enrollment authority**: credential checks, identity binding, mirror
//! - **Whitelist directory**: paged whitelist and its state/cluster hierarchy
//! - **Convergence tracker**: child claims, one-time declarations, derived status
//! - **Scoped artifact store**: layer-scoped model references and legacy data

pub mod auth;
pub mod config;
pub mod credentials;
pub mod ledger;
pub mod registry;
pub mod routes;
pub mod server;
pub mod services;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{GatewayError, Result};
