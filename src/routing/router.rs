use serde::Serialize;
use tracing::warn;

use crate::identity::{Identity, Role, RoleSet};

/// Addressable views of the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Login,
    AdminDashboard,
    ParticipantDashboard,
    SponsorDashboard,
    JudgeDashboard,
    NotFound,
}

impl Destination {
    pub const DASHBOARDS: [Destination; 4] = [
        Destination::AdminDashboard,
        Destination::ParticipantDashboard,
        Destination::SponsorDashboard,
        Destination::JudgeDashboard,
    ];

    /// Route pattern; `*` for the catch-all.
    pub fn path(&self) -> &'static str {
        match self {
            Destination::Login => "/login",
            Destination::AdminDashboard => "/admin",
            Destination::ParticipantDashboard => "/participant",
            Destination::SponsorDashboard => "/sponsor",
            Destination::JudgeDashboard => "/judge",
            Destination::NotFound => "*",
        }
    }

    /// Exact path lookup, ignoring one trailing slash. `/` is not a destination of its own.
    pub fn from_path(path: &str) -> Option<Destination> {
        let p = if path.len() > 1 { path.strip_suffix('/').unwrap_or(path) } else { path };
        match p {
            "/login" => Some(Destination::Login),
            "/admin" => Some(Destination::AdminDashboard),
            "/participant" => Some(Destination::ParticipantDashboard),
            "/sponsor" => Some(Destination::SponsorDashboard),
            "/judge" => Some(Destination::JudgeDashboard),
            _ => None,
        }
    }

    pub fn home_for(role: Role) -> Destination {
        match role {
            Role::Admin => Destination::AdminDashboard,
            Role::Participant => Destination::ParticipantDashboard,
            Role::Sponsor => Destination::SponsorDashboard,
            Role::Judge => Destination::JudgeDashboard,
        }
    }

    /// Roles allowed to view a dashboard; `None` for public destinations.
    pub fn required_roles(&self) -> Option<RoleSet> {
        match self {
            Destination::AdminDashboard => Some(RoleSet::only(Role::Admin)),
            Destination::ParticipantDashboard => Some(RoleSet::only(Role::Participant)),
            Destination::SponsorDashboard => Some(RoleSet::only(Role::Sponsor)),
            Destination::JudgeDashboard => Some(RoleSet::only(Role::Judge)),
            Destination::Login | Destination::NotFound => None,
        }
    }
}

/// Home destination for the current identity, or the login page without one.
pub fn route_for(identity: Option<&Identity>) -> Destination {
    match identity {
        None => Destination::Login,
        Some(identity) => Destination::home_for(identity.role),
    }
}

/// Outcome of resolving a requested path against the current identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Navigation {
    Redirect { to: Destination },
    Render { destination: Destination },
    /// Must pass an access guard for `required` before rendering.
    Protected { destination: Destination, required: RoleSet },
    NotFound { path: String },
}

pub fn resolve(path: &str, identity: Option<&Identity>) -> Navigation {
    if path == "/" || path.is_empty() {
        return Navigation::Redirect { to: route_for(identity) };
    }
    match Destination::from_path(path) {
        Some(Destination::Login) => match identity {
            Some(_) => Navigation::Redirect { to: route_for(identity) },
            None => Navigation::Render { destination: Destination::Login },
        },
        Some(dest) => match (identity, dest.required_roles()) {
            (None, Some(_)) => Navigation::Redirect { to: Destination::Login },
            (Some(_), Some(required)) => Navigation::Protected { destination: dest, required },
            (_, None) => Navigation::Render { destination: dest },
        },
        None => {
            warn!(target: "hackchain::routing", path = %path, "attempted to access non-existent route");
            Navigation::NotFound { path: path.to_string() }
        }
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod router_tests;
