//! Per-view role enforcement.
//!
//! An `AccessGuard` is long-lived: it belongs to one protected view within one session and
//! remembers the decision it made last time. Re-evaluating with an unchanged identity never
//! produces a second denial notice; a notice is emitted only on the transition into a
//! forbidden decision (first evaluation, or after the guard last allowed, or after the
//! actual role changed).

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::notify::{DenialNotifier, Denial};
use crate::error::AuthError;
use crate::identity::{check_role_allowed, Identity, Role, RoleSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AccessDenied {
    Unauthenticated,
    Forbidden {
        #[serde(rename = "requiredRoles")]
        required_roles: RoleSet,
        #[serde(rename = "actualRole")]
        actual_role: Role,
    },
}

impl AccessDenied {
    /// Text shown on the denial view.
    pub fn message(&self) -> String {
        match self {
            AccessDenied::Unauthenticated => "Please log in to access this page.".to_string(),
            AccessDenied::Forbidden { required_roles, actual_role } => {
                format!("Required role: {}. Your role: {}.", required_roles, actual_role)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Render,
    Denied(AccessDenied),
}

impl GuardOutcome {
    pub fn is_allowed(&self) -> bool { matches!(self, GuardOutcome::Render) }
}

/// Either the wrapped view or the denial that replaced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guarded<V> {
    View(V),
    Denied(AccessDenied),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Allowed,
    Unauthenticated,
    Forbidden(Role),
}

pub struct AccessGuard {
    label: String,
    required: RoleSet,
    notifier: Arc<dyn DenialNotifier>,
    last: Option<Decision>,
}

impl AccessGuard {
    /// `label` names the protected view in notices and logs.
    pub fn new(label: impl Into<String>, required: RoleSet, notifier: Arc<dyn DenialNotifier>) -> Self {
        Self { label: label.into(), required, notifier, last: None }
    }

    pub fn required(&self) -> &RoleSet { &self.required }

    pub fn label(&self) -> &str { &self.label }

    pub fn evaluate(&mut self, identity: Option<&Identity>) -> GuardOutcome {
        let (decision, outcome) = match check_role_allowed(identity, &self.required) {
            Ok(()) => (Decision::Allowed, GuardOutcome::Render),
            Err(AuthError::ForbiddenRole { required, actual }) => (
                Decision::Forbidden(actual),
                GuardOutcome::Denied(AccessDenied::Forbidden { required_roles: required, actual_role: actual }),
            ),
            Err(_) => (Decision::Unauthenticated, GuardOutcome::Denied(AccessDenied::Unauthenticated)),
        };
        let previous = self.last.replace(decision);
        if let Decision::Forbidden(actual) = decision {
            if previous != Some(decision) {
                debug!(target: "hackchain::guard", view = %self.label, role = %actual, "access decision changed to forbidden");
                self.notifier.denied(&Denial {
                    view: self.label.clone(),
                    required: self.required.clone(),
                    actual,
                });
            }
        }
        outcome
    }

    /// Build the view only when access is allowed.
    pub fn render<V>(&mut self, identity: Option<&Identity>, view: impl FnOnce() -> V) -> Guarded<V> {
        match self.evaluate(identity) {
            GuardOutcome::Render => Guarded::View(view()),
            GuardOutcome::Denied(denied) => Guarded::Denied(denied),
        }
    }
}

impl std::fmt::Debug for AccessGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGuard")
            .field("label", &self.label)
            .field("required", &self.required)
            .field("last", &self.last)
            .finish()
    }
}

#[cfg(test)]
#[path = "guard_tests.rs"]
mod guard_tests;
