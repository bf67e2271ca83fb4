//! Authentication state for one browser session.
//!
//! `AuthContext` owns a `SessionStore` and a `CredentialVerifier` and is passed explicitly
//! to whoever needs it; there is no process-wide instance. State changes are published
//! whole through a `tokio::sync::watch` channel, so readers never observe a half-updated
//! identity.
//!
//! Lifecycle:
//! - `uninitialized` until `initialize()` restores (or fails to restore) a stored identity.
//! - `loading` while any login/connect is in flight.
//! - `authenticated` / `unauthenticated` once settled.
//!
//! Sign-in operations run as detached tasks: dropping the returned future does not stop
//! the operation, which still commits its result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::principal::Identity;
use super::provider::{validate_login_input, validate_wallet_address, CredentialVerifier};
use super::session::SessionStore;
use crate::config::LatencyModel;
use crate::error::AuthError;
use crate::tprintln;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    Uninitialized,
    Loading,
    Authenticated,
    Unauthenticated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthState {
    pub phase: AuthPhase,
    pub identity: Option<Identity>,
}

impl AuthState {
    fn initial() -> Self { Self { phase: AuthPhase::Uninitialized, identity: None } }

    fn settled(identity: Option<Identity>) -> Self {
        let phase = if identity.is_some() { AuthPhase::Authenticated } else { AuthPhase::Unauthenticated };
        Self { phase, identity }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.phase, AuthPhase::Uninitialized | AuthPhase::Loading)
    }
}

struct Inner {
    store: SessionStore,
    verifier: Arc<dyn CredentialVerifier>,
    latency: LatencyModel,
    state: watch::Sender<AuthState>,
    /// Sign-in operations started but not yet committed.
    in_flight: Mutex<usize>,
    initialized: AtomicBool,
}

#[derive(Clone)]
pub struct AuthContext {
    inner: Arc<Inner>,
}

impl AuthContext {
    pub fn new(store: SessionStore, verifier: Arc<dyn CredentialVerifier>, latency: LatencyModel) -> Self {
        let (state, _) = watch::channel(AuthState::initial());
        Self {
            inner: Arc::new(Inner {
                store,
                verifier,
                latency,
                state,
                in_flight: Mutex::new(0),
                initialized: AtomicBool::new(false),
            }),
        }
    }

    /// Restore a persisted identity and leave `uninitialized`. Only the first call has
    /// any effect.
    pub fn initialize(&self) {
        if self.inner.initialized.swap(true, Ordering::SeqCst) {
            return;
        }
        let restored = self.inner.store.restore();
        {
            let in_flight = self.inner.in_flight.lock();
            self.inner.state.send_modify(|s| {
                // A sign-in that committed before initialization wins over the stored value.
                let identity = s.identity.take().or(restored);
                let settled = AuthState::settled(identity);
                s.phase = if *in_flight > 0 { AuthPhase::Loading } else { settled.phase };
                s.identity = settled.identity;
            });
        }
        let snap = self.snapshot();
        debug!(target: "hackchain::auth", phase = ?snap.phase, user = ?snap.identity.as_ref().map(|i| &i.id), "auth context initialized");
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> { self.inner.state.subscribe() }

    pub fn snapshot(&self) -> AuthState { self.inner.state.borrow().clone() }

    pub fn identity(&self) -> Option<Identity> { self.inner.state.borrow().identity.clone() }

    pub fn is_loading(&self) -> bool { self.inner.state.borrow().is_loading() }

    /// Email/password sign-in. `true` on success; any failure leaves the current
    /// identity (if any) in place.
    pub async fn login(&self, email: &str, password: &str) -> bool {
        self.try_login(email, password).await.is_ok()
    }

    pub async fn try_login(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        validate_login_input(email, password)?;
        let this = self.clone();
        let email = email.to_string();
        let password = password.to_string();
        let task = tokio::spawn(async move {
            this.begin();
            tokio::time::sleep(this.inner.latency.login).await;
            let verifier = this.inner.verifier.clone();
            let email_for_check = email.clone();
            let result = tokio::task::spawn_blocking(move || verifier.verify_password(&email_for_check, &password))
                .await
                .map_err(|e| AuthError::TaskFailed(e.to_string()))
                .and_then(|found| found.ok_or(AuthError::InvalidCredentials));
            match &result {
                Ok(identity) => info!(target: "hackchain::auth", user = %identity.id, role = %identity.role, "login succeeded"),
                Err(e) => info!(target: "hackchain::auth", email = %email, "login failed: {}", e),
            }
            this.commit_off_thread(result.as_ref().ok().cloned()).await;
            result
        });
        task.await.map_err(|e| AuthError::TaskFailed(e.to_string()))?
    }

    /// Wallet sign-in. Malformed addresses are rejected before any state change.
    pub async fn connect_wallet(&self, address: &str, signature: Option<&str>) -> bool {
        self.try_connect_wallet(address, signature).await.is_ok()
    }

    pub async fn try_connect_wallet(&self, address: &str, signature: Option<&str>) -> Result<Identity, AuthError> {
        validate_wallet_address(address)?;
        let this = self.clone();
        let address = address.to_string();
        let signature = signature.map(str::to_string);
        let task = tokio::spawn(async move {
            this.begin();
            tokio::time::sleep(this.inner.latency.wallet).await;
            let result = this
                .inner
                .verifier
                .verify_wallet(&address, signature.as_deref())
                .ok_or(AuthError::MalformedWalletAddress);
            if let Ok(identity) = &result {
                info!(target: "hackchain::auth", user = %identity.id, "wallet connected");
            }
            this.commit_off_thread(result.as_ref().ok().cloned()).await;
            result
        });
        task.await.map_err(|e| AuthError::TaskFailed(e.to_string()))?
    }

    /// Clear the stored session and drop the current identity. Safe to repeat.
    ///
    /// Touches storage synchronously; async callers should run it on the blocking pool.
    pub fn logout(&self) {
        // Storage and state change under the in-flight lock, in the same order as `commit`,
        // so a concurrent sign-in lands wholly before or wholly after.
        let previous = {
            let in_flight = self.inner.in_flight.lock();
            self.inner.store.clear();
            self.inner.state.send_replace(AuthState {
                phase: if *in_flight > 0 { AuthPhase::Loading } else { AuthPhase::Unauthenticated },
                identity: None,
            })
        };
        if let Some(prev) = previous.identity {
            info!(target: "hackchain::auth", user = %prev.id, wallet = prev.is_wallet(), "logged out");
        }
    }

    fn begin(&self) {
        let mut in_flight = self.inner.in_flight.lock();
        *in_flight += 1;
        self.inner.state.send_modify(|s| s.phase = AuthPhase::Loading);
    }

    /// `commit` on the blocking pool: it writes storage while holding the in-flight lock.
    async fn commit_off_thread(&self, identity: Option<Identity>) {
        let this = self.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || this.commit(identity)).await {
            warn!(target: "hackchain::auth", "commit task failed: {}", e);
        }
    }

    /// Finish one in-flight operation, installing `identity` when it succeeded.
    /// Last writer wins between concurrent successes.
    fn commit(&self, identity: Option<Identity>) {
        let mut in_flight = self.inner.in_flight.lock();
        // Persist under the lock so storage and memory agree on the last writer.
        if let Some(identity) = &identity {
            self.inner.store.persist(identity);
        }
        *in_flight = in_flight.saturating_sub(1);
        let remaining = *in_flight;
        let initialized = self.inner.initialized.load(Ordering::SeqCst);
        self.inner.state.send_modify(|s| {
            if let Some(identity) = identity {
                s.identity = Some(identity);
            }
            s.phase = if remaining > 0 {
                AuthPhase::Loading
            } else if !initialized && s.identity.is_none() {
                AuthPhase::Uninitialized
            } else if s.identity.is_some() {
                AuthPhase::Authenticated
            } else {
                AuthPhase::Unauthenticated
            };
        });
        tprintln!("auth.commit remaining={} phase={:?}", remaining, self.inner.state.borrow().phase);
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
