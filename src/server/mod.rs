//! HTTP server for the trainer gateway

pub mod http;

pub use http::{dispatch, run, AppState};
