use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::identity::{Role, RoleSet};

/// A forbidden access, as reported by an `AccessGuard`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub view: String,
    pub required: RoleSet,
    pub actual: Role,
}

pub trait DenialNotifier: Send + Sync {
    fn denied(&self, denial: &Denial);
}

/// Logs each denial at warn.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl DenialNotifier for TracingNotifier {
    fn denied(&self, denial: &Denial) {
        warn!(target: "hackchain::guard", view = %denial.view, required = %denial.required, actual = %denial.actual, "access denied");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeVariant {
    Default,
    Destructive,
}

/// User-facing notice, drained by the client and shown as a toast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub variant: NoticeVariant,
    pub at: DateTime<Utc>,
}

impl Notice {
    pub fn new(title: impl Into<String>, description: impl Into<String>, variant: NoticeVariant) -> Self {
        Self { title: title.into(), description: description.into(), variant, at: Utc::now() }
    }

    /// Toast text lists the roles comma-separated; the denial view uses "or".
    pub fn access_denied(denial: &Denial) -> Self {
        let roles: Vec<&str> = denial.required.iter().map(|r| r.as_str()).collect();
        Self::new(
            "Access Denied",
            format!("This area is restricted to {} users only.", roles.join(", ")),
            NoticeVariant::Destructive,
        )
    }
}

/// Bounded inbox of notices for one session. When full, the oldest notice is dropped.
#[derive(Debug)]
pub struct NotificationQueue {
    capacity: usize,
    items: Mutex<VecDeque<Notice>>,
}

impl NotificationQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, items: Mutex::new(VecDeque::with_capacity(capacity)) }
    }

    pub fn push(&self, notice: Notice) {
        let mut items = self.items.lock();
        if items.len() == self.capacity {
            items.pop_front();
        }
        items.push_back(notice);
    }

    pub fn drain(&self) -> Vec<Notice> { self.items.lock().drain(..).collect() }

    pub fn len(&self) -> usize { self.items.lock().len() }

    pub fn is_empty(&self) -> bool { self.items.lock().is_empty() }
}

impl DenialNotifier for NotificationQueue {
    fn denied(&self, denial: &Denial) { self.push(Notice::access_denied(denial)); }
}

/// Forwards each denial to every inner notifier in order.
#[derive(Clone, Default)]
pub struct Fanout(Vec<Arc<dyn DenialNotifier>>);

impl Fanout {
    pub fn new() -> Self { Self(Vec::new()) }

    pub fn with(mut self, notifier: Arc<dyn DenialNotifier>) -> Self {
        self.0.push(notifier);
        self
    }
}

impl DenialNotifier for Fanout {
    fn denied(&self, denial: &Denial) {
        for n in &self.0 {
            n.denied(denial);
        }
    }
}
