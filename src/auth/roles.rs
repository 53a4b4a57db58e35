//! Caller roles carried by gateway-issued tokens

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Holder of a registration token; may only enroll itself
    Registrar,
    /// Enrolled edge node, authenticated with its own key
    Trainer,
    /// Submits child convergence claims
    Aggregator,
    /// Declares scopes fully converged
    CentralChecker,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Registrar => "registrar",
            Role::Trainer => "trainer",
            Role::Aggregator => "aggregator",
            Role::CentralChecker => "central_checker",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "registrar" => Ok(Role::Registrar),
            "trainer" => Ok(Role::Trainer),
            "aggregator" => Ok(Role::Aggregator),
            "central_checker" => Ok(Role::CentralChecker),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Roles allowed to read the whitelist
pub const WHITELIST_READERS: &[Role] = &[Role::Admin, Role::Aggregator, Role::CentralChecker];
