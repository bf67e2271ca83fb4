use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The fixed set of dashboard roles. Every identity holds exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Participant,
    Sponsor,
    Judge,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Participant, Role::Sponsor, Role::Judge];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Participant => "participant",
            Role::Sponsor => "sponsor",
            Role::Judge => "judge",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl Display for UnknownRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown role '{}'", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    /// Exact, case-sensitive match against the lowercase wire names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// An authenticated principal.
///
/// Serialized with the field names of the persisted session layout
/// (`id`, `email`, `role`, `walletAddress`, `name`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub role: Role,
    #[serde(rename = "walletAddress", default, skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
    #[serde(rename = "name")]
    pub display_name: String,
}

impl Identity {
    pub fn new(id: impl Into<String>, email: impl Into<String>, role: Role, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            role,
            wallet_address: None,
            display_name: display_name.into(),
        }
    }

    pub fn is_wallet(&self) -> bool { self.wallet_address.is_some() }
}
