use serde::{Deserialize, Serialize};

use super::principal::{Identity, Role, UnknownRole};

/// A row of the upstream `profiles` table.
///
/// `role` stays a plain string here because the table is written by other services;
/// conversion into an `Identity` is where it is checked against the role enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRow {
    pub user_id: String,
    pub email: String,
    pub role: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

impl TryFrom<ProfileRow> for Identity {
    type Error = UnknownRole;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        let role: Role = row.role.parse()?;
        // Profiles without a full name display as their email.
        let display_name = row.full_name.unwrap_or_else(|| row.email.clone());
        Ok(Identity::new(row.user_id, row.email, role, display_name))
    }
}

impl From<&Identity> for ProfileRow {
    fn from(identity: &Identity) -> Self {
        ProfileRow {
            user_id: identity.id.clone(),
            email: identity.email.clone(),
            role: identity.role.as_str().to_string(),
            full_name: Some(identity.display_name.clone()),
        }
    }
}
