use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Token naming one logical query. A fresh one is minted every time the
/// pagination window restarts at its first page; responses carrying any
/// other token are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryEpoch(Uuid);

impl QueryEpoch {
    pub fn mint() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wire form sent as the `uuid` query parameter.
    pub fn as_token(&self) -> String {
        self.0.simple().to_string()
    }

    /// Compares against a token echoed back by the backend. Unparseable
    /// tokens never match.
    pub fn matches_token(&self, token: &str) -> bool {
        Uuid::parse_str(token).map(|parsed| parsed == self.0).unwrap_or(false)
    }
}

impl fmt::Display for QueryEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}
