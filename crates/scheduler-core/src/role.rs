//! Privilege roles carried by a resolved token.
//!
//! The token-info service returns role names as free-form strings. The
//! three roles the broker actually tunes quotas for are promoted to an
//! enum; anything else collapses into `Unknown` so quota lookup stays
//! total instead of requiring a fallible match at every call site.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Developer,
    Guest,
    /// Any role string the token service returns that isn't one of the above.
    /// Quota lookup still resolves (see `AdmissionConfig::default`), it just
    /// shares a single conservative bucket.
    Unknown(String),
}

impl Role {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "ADMIN" => Role::Admin,
            "DEVELOPER" => Role::Developer,
            "GUEST" => Role::Guest,
            other => Role::Unknown(other.to_string()),
        }
    }

    /// Canonical key used for config lookups and metrics labels.
    pub fn key(&self) -> &str {
        match self {
            Role::Admin => "ADMIN",
            Role::Developer => "DEVELOPER",
            Role::Guest => "GUEST",
            Role::Unknown(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Unknown(raw) => write!(f, "UNKNOWN({raw})"),
            other => write!(f, "{}", other.key()),
        }
    }
}
