use std::time::Duration;

use super::*;
use crate::config::HashingConfig;
use crate::identity::session::{MemoryBackend, SessionBackend, SESSION_KEY};
use crate::identity::{LocalVerifier, Role, DEMO_WALLET_ADDRESS};

fn context_with(backend: Arc<MemoryBackend>, latency: LatencyModel) -> AuthContext {
    let verifier = Arc::new(LocalVerifier::demo(&HashingConfig::fast()).expect("demo verifier"));
    AuthContext::new(SessionStore::new(backend), verifier, latency)
}

fn ready_context() -> (AuthContext, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    let ctx = context_with(backend.clone(), LatencyModel::none());
    ctx.initialize();
    (ctx, backend)
}

#[tokio::test]
async fn starts_loading_until_initialized() {
    let backend = Arc::new(MemoryBackend::new());
    let ctx = context_with(backend, LatencyModel::none());
    assert_eq!(ctx.snapshot().phase, AuthPhase::Uninitialized);
    assert!(ctx.is_loading());
    ctx.initialize();
    assert_eq!(ctx.snapshot(), AuthState { phase: AuthPhase::Unauthenticated, identity: None });
    assert!(!ctx.is_loading());
}

#[tokio::test]
async fn initialize_restores_persisted_identity() {
    let backend = Arc::new(MemoryBackend::new());
    let judge = Identity::new("4", "judge@hackathon.app", Role::Judge, "Judge User");
    SessionStore::new(backend.clone()).persist(&judge);

    let ctx = context_with(backend, LatencyModel::none());
    ctx.initialize();
    assert_eq!(ctx.snapshot().phase, AuthPhase::Authenticated);
    assert_eq!(ctx.identity(), Some(judge));
}

#[tokio::test]
async fn initialize_discards_corrupt_session() {
    let backend = Arc::new(MemoryBackend::new());
    backend.write(SESSION_KEY, "\u{0}\u{1}garbage").unwrap();
    let ctx = context_with(backend.clone(), LatencyModel::none());
    ctx.initialize();
    assert_eq!(ctx.snapshot().phase, AuthPhase::Unauthenticated);
    assert!(backend.is_empty());
}

#[tokio::test]
async fn initialize_runs_once() {
    let backend = Arc::new(MemoryBackend::new());
    let ctx = context_with(backend.clone(), LatencyModel::none());
    ctx.initialize();
    SessionStore::new(backend).persist(&Identity::new("1", "admin@hackathon.app", Role::Admin, "Admin User"));
    ctx.initialize();
    assert_eq!(ctx.identity(), None);
}

#[tokio::test]
async fn login_success_persists_and_authenticates() {
    let (ctx, backend) = ready_context();
    assert!(ctx.login("admin@hackathon.app", "admin123").await);
    let snap = ctx.snapshot();
    assert_eq!(snap.phase, AuthPhase::Authenticated);
    assert_eq!(snap.identity.as_ref().map(|i| i.role), Some(Role::Admin));
    assert_eq!(SessionStore::new(backend).restore(), snap.identity);
}

#[tokio::test]
async fn login_failure_stays_unauthenticated() {
    let (ctx, backend) = ready_context();
    assert!(!ctx.login("admin@hackathon.app", "wrong").await);
    assert_eq!(ctx.snapshot(), AuthState { phase: AuthPhase::Unauthenticated, identity: None });
    assert!(backend.is_empty());
}

#[tokio::test]
async fn unknown_email_and_wrong_password_fail_alike() {
    let (ctx, _) = ready_context();
    let a = ctx.try_login("admin@hackathon.app", "wrong").await;
    let b = ctx.try_login("ghost@hackathon.app", "admin123").await;
    assert_eq!(a, Err(AuthError::InvalidCredentials));
    assert_eq!(a, b);
}

#[tokio::test]
async fn empty_fields_fail_without_entering_loading() {
    let (ctx, _) = ready_context();
    let rx = ctx.subscribe();
    assert_eq!(ctx.try_login("", "admin123").await, Err(AuthError::MissingCredentials));
    assert!(!rx.has_changed().unwrap());
}

#[tokio::test]
async fn failed_login_keeps_existing_identity() {
    let (ctx, _) = ready_context();
    assert!(ctx.login("sponsor@hackathon.app", "sponsor123").await);
    assert!(!ctx.login("admin@hackathon.app", "nope").await);
    let snap = ctx.snapshot();
    assert_eq!(snap.phase, AuthPhase::Authenticated);
    assert_eq!(snap.identity.map(|i| i.role), Some(Role::Sponsor));
}

#[tokio::test]
async fn logout_twice_equals_once() {
    let (ctx, backend) = ready_context();
    assert!(ctx.login("judge@hackathon.app", "judge123").await);
    ctx.logout();
    let once = ctx.snapshot();
    ctx.logout();
    assert_eq!(ctx.snapshot(), once);
    assert_eq!(once, AuthState { phase: AuthPhase::Unauthenticated, identity: None });
    assert!(backend.is_empty());
}

#[tokio::test]
async fn wallet_connect_creates_participant() {
    let (ctx, backend) = ready_context();
    assert!(ctx.connect_wallet(DEMO_WALLET_ADDRESS, None).await);
    let identity = ctx.identity().expect("wallet identity");
    assert_eq!(identity.role, Role::Participant);
    assert_eq!(identity.wallet_address.as_deref(), Some(DEMO_WALLET_ADDRESS));
    assert_eq!(SessionStore::new(backend).restore(), Some(identity));
}

#[tokio::test]
async fn malformed_wallet_is_rejected_before_loading() {
    let (ctx, _) = ready_context();
    let rx = ctx.subscribe();
    assert!(!ctx.connect_wallet("0x1234", None).await);
    assert_eq!(
        ctx.try_connect_wallet("not-an-address", Some("sig")).await,
        Err(AuthError::MalformedWalletAddress)
    );
    assert!(!rx.has_changed().unwrap());
    assert_eq!(ctx.snapshot().phase, AuthPhase::Unauthenticated);
}

#[tokio::test(start_paused = true)]
async fn loading_is_visible_during_simulated_latency() {
    let backend = Arc::new(MemoryBackend::new());
    let ctx = context_with(backend, LatencyModel::default());
    ctx.initialize();
    let mut rx = ctx.subscribe();

    let login = tokio::spawn({
        let ctx = ctx.clone();
        async move { ctx.login("participant@hackathon.app", "participant123").await }
    });
    rx.wait_for(|s| s.phase == AuthPhase::Loading).await.unwrap();
    assert!(ctx.is_loading());
    assert_eq!(ctx.identity(), None);

    assert!(login.await.unwrap());
    assert_eq!(ctx.snapshot().phase, AuthPhase::Authenticated);
}

#[tokio::test(start_paused = true)]
async fn abandoned_login_still_commits() {
    let backend = Arc::new(MemoryBackend::new());
    let ctx = context_with(backend.clone(), LatencyModel::default());
    ctx.initialize();
    let mut rx = ctx.subscribe();

    let abandoned = tokio::time::timeout(Duration::from_millis(10), ctx.login("admin@hackathon.app", "admin123")).await;
    assert!(abandoned.is_err());

    let state = rx.wait_for(|s| s.phase == AuthPhase::Authenticated).await.unwrap().clone();
    assert_eq!(state.identity.map(|i| i.role), Some(Role::Admin));
    assert!(!backend.is_empty());
}

#[tokio::test]
async fn concurrent_logins_settle_on_one_identity() {
    let (ctx, backend) = ready_context();
    let (a, b) = tokio::join!(
        ctx.login("admin@hackathon.app", "admin123"),
        ctx.login("judge@hackathon.app", "judge123"),
    );
    assert!(a && b);
    let snap = ctx.snapshot();
    assert_eq!(snap.phase, AuthPhase::Authenticated);
    let role = snap.identity.as_ref().map(|i| i.role);
    assert!(matches!(role, Some(Role::Admin) | Some(Role::Judge)));
    // The stored session is whichever identity committed last, same as memory.
    assert_eq!(SessionStore::new(backend).restore(), snap.identity);
}

/// Removes at once, then holds the caller before returning, widening the window in which
/// a sign-in can commit while logout is still inside the store.
struct SlowRemove {
    inner: MemoryBackend,
    delay: Duration,
}

impl SessionBackend for SlowRemove {
    fn read(&self, key: &str) -> Result<Option<String>, AuthError> { self.inner.read(key) }

    fn write(&self, key: &str, value: &str) -> Result<(), AuthError> { self.inner.write(key, value) }

    fn remove(&self, key: &str) -> Result<(), AuthError> {
        self.inner.remove(key)?;
        std::thread::sleep(self.delay);
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn logout_racing_a_commit_keeps_storage_and_memory_in_step() {
    let backend = Arc::new(SlowRemove { inner: MemoryBackend::new(), delay: Duration::from_millis(50) });
    let verifier = Arc::new(LocalVerifier::demo(&HashingConfig::fast()).expect("demo verifier"));
    let latency = LatencyModel { login: Duration::from_millis(20), wallet: Duration::ZERO };
    let ctx = AuthContext::new(SessionStore::new(backend.clone()), verifier.clone(), latency);
    ctx.initialize();

    let login = tokio::spawn({
        let ctx = ctx.clone();
        async move { ctx.login("admin@hackathon.app", "admin123").await }
    });
    tokio::time::sleep(Duration::from_millis(5)).await;
    let out = ctx.clone();
    tokio::task::spawn_blocking(move || out.logout()).await.unwrap();
    assert!(login.await.unwrap());

    let stored = SessionStore::new(backend.clone()).restore();
    assert_eq!(ctx.identity(), stored);
    assert_ne!(ctx.snapshot().phase, AuthPhase::Loading);

    let reopened = AuthContext::new(SessionStore::new(backend), verifier, LatencyModel::none());
    reopened.initialize();
    assert_eq!(reopened.identity(), ctx.identity());
}
