use std::fmt;

use serde::{Deserialize, Serialize};

/// Operator roles recognised by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Master,
    User,
    Reader,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Master => "MASTER",
            Role::User => "USER",
            Role::Reader => "READER",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "MASTER" => Some(Role::Master),
            "USER" => Some(Role::User),
            "READER" => Some(Role::Reader),
            _ => None,
        }
    }

    /// Highest-privilege role. MASTER may cancel any execution and is the
    /// only role allowed to submit raw cache commands.
    pub fn is_master(&self) -> bool {
        matches!(self, Role::Master)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
