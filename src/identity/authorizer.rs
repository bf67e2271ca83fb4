use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use super::principal::{Identity, Role};
use crate::error::AuthError;

/// A non-empty-by-convention set of roles permitted to reach a view.
///
/// Kept sorted and deduplicated so equality and display are stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet(Vec<Role>);

impl RoleSet {
    pub fn new<I: IntoIterator<Item = Role>>(roles: I) -> Self {
        let mut v: Vec<Role> = roles.into_iter().collect();
        v.sort();
        v.dedup();
        Self(v)
    }

    pub fn only(role: Role) -> Self { Self(vec![role]) }

    pub fn contains(&self, role: Role) -> bool { self.0.contains(&role) }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = &Role> { self.0.iter() }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<T: IntoIterator<Item = Role>>(iter: T) -> Self { Self::new(iter) }
}

impl Display for RoleSet {
    /// Renders as `admin or judge`, the phrasing used on the denial view.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|r| r.as_str()).collect();
        f.write_str(&names.join(" or "))
    }
}

/// Role gate shared by the access guard and the HTTP layer.
///
/// No identity is `Unauthenticated`; an identity whose role is outside `required`
/// is `ForbiddenRole`. An empty set admits nobody.
pub fn check_role_allowed(identity: Option<&Identity>, required: &RoleSet) -> Result<(), AuthError> {
    let Some(identity) = identity else { return Err(AuthError::Unauthenticated); };
    if required.contains(identity.role) {
        Ok(())
    } else {
        Err(AuthError::ForbiddenRole { required: required.clone(), actual: identity.role })
    }
}
