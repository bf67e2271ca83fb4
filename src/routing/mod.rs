mod guard;
mod notify;
mod router;

pub use guard::{AccessDenied, AccessGuard, GuardOutcome, Guarded};
pub use notify::{Denial, DenialNotifier, Fanout, Notice, NoticeVariant, NotificationQueue, TracingNotifier};
pub use router::{resolve, route_for, Destination, Navigation};
