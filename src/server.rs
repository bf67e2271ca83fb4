//!
//! hackchain HTTP server
//! ---------------------
//! Axum front end hosting many independent browser sessions.
//!
//! Responsibilities:
//! - Session management with a cookie + CSRF token model. Each cookie maps to its own
//!   `AuthContext`, persisted through a namespaced `SessionStore` so sessions survive restarts.
//! - Login, wallet connect and logout endpoints.
//! - Navigation endpoints that run route resolution and per-session access guards.
//! - A per-session notification inbox the client drains to show toasts.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::config::{AppConfig, LatencyModel};
use crate::error::{AppError, AuthError};
use crate::identity::{
    gen_token, is_well_formed_token, AuthContext, CredentialVerifier, FileBackend, Identity, LocalVerifier,
    SessionBackend, SessionStore,
};
use crate::routing::{
    resolve, route_for, AccessDenied, AccessGuard, Destination, Fanout, Guarded, Navigation, Notice, NoticeVariant,
    NotificationQueue, TracingNotifier,
};
use crate::tprintln;

pub const SESSION_COOKIE: &str = "hackchain_session";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Everything the server keeps for one browser.
pub struct SessionEntry {
    pub auth: AuthContext,
    /// One guard per dashboard, created on first visit.
    pub guards: Mutex<HashMap<Destination, AccessGuard>>,
    pub notices: Arc<NotificationQueue>,
    pub csrf: String,
    last_seen: Mutex<Instant>,
}

impl SessionEntry {
    /// Run the session's guard for `destination`, building `view` only when allowed.
    fn guarded<V>(&self, destination: Destination, view: impl FnOnce() -> V) -> Option<Guarded<V>> {
        let required = destination.required_roles()?;
        let identity = self.auth.identity();
        let mut guards = self.guards.lock();
        let guard = guards.entry(destination).or_insert_with(|| {
            let notifier = Fanout::new().with(Arc::new(TracingNotifier)).with(self.notices.clone());
            AccessGuard::new(destination.path().trim_start_matches('/'), required, Arc::new(notifier))
        });
        Some(guard.render(identity.as_ref(), view))
    }

    fn touch(&self) { *self.last_seen.lock() = Instant::now(); }

    fn idle_for(&self, now: Instant) -> Duration { now.saturating_duration_since(*self.last_seen.lock()) }
}

/// What every new entry is built from.
#[derive(Clone)]
struct EntryParts {
    backend: Arc<dyn SessionBackend>,
    verifier: Arc<dyn CredentialVerifier>,
    latency: LatencyModel,
    notification_capacity: usize,
}

impl EntryParts {
    /// Restores any identity stored under `sid`, so this reads storage.
    fn build(&self, sid: &str, notices: Option<Arc<NotificationQueue>>) -> Result<SessionEntry, AuthError> {
        let store = SessionStore::namespaced(self.backend.clone(), sid);
        let auth = AuthContext::new(store, self.verifier.clone(), self.latency);
        auth.initialize();
        Ok(SessionEntry {
            auth,
            guards: Mutex::new(HashMap::new()),
            notices: notices.unwrap_or_else(|| Arc::new(NotificationQueue::new(self.notification_capacity))),
            csrf: gen_token()?,
            last_seen: Mutex::new(Instant::now()),
        })
    }
}

/// Session id -> entry.
///
/// A cookie naming an id the registry does not hold is adopted only when storage has an
/// identity for it; any other cookie gets a freshly minted id. Entries idle longer than the
/// TTL are evicted by `evict_idle`.
pub struct SessionRegistry {
    parts: EntryParts,
    idle_ttl: Duration,
    entries: RwLock<HashMap<String, Arc<SessionEntry>>>,
}

pub struct BrowserSession {
    pub sid: String,
    pub entry: Arc<SessionEntry>,
    /// The id was minted by this request and must be sent back as a cookie.
    pub minted: bool,
}

impl SessionRegistry {
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        verifier: Arc<dyn CredentialVerifier>,
        latency: LatencyModel,
        notification_capacity: usize,
    ) -> Self {
        Self {
            parts: EntryParts { backend, verifier, latency, notification_capacity },
            idle_ttl: AppConfig::default().session_idle_ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_idle_ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = ttl;
        self
    }

    async fn build_off_thread(&self, sid: String, notices: Option<Arc<NotificationQueue>>) -> Result<SessionEntry, AuthError> {
        let parts = self.parts.clone();
        tokio::task::spawn_blocking(move || parts.build(&sid, notices))
            .await
            .map_err(|e| AuthError::TaskFailed(e.to_string()))?
    }

    /// Look up the session for a cookie value, reopening or minting as needed.
    pub async fn open(&self, sid: Option<&str>) -> Result<BrowserSession, AuthError> {
        if let Some(sid) = sid.filter(|s| is_well_formed_token(s)) {
            if let Some(entry) = self.entries.read().await.get(sid).cloned() {
                entry.touch();
                return Ok(BrowserSession { sid: sid.to_string(), entry, minted: false });
            }
            let fresh = self.build_off_thread(sid.to_string(), None).await?;
            if fresh.auth.identity().is_some() {
                let mut map = self.entries.write().await;
                let entry = map.entry(sid.to_string()).or_insert_with(|| Arc::new(fresh)).clone();
                entry.touch();
                debug!(target: "hackchain::session", "reopened session from storage");
                return Ok(BrowserSession { sid: sid.to_string(), entry, minted: false });
            }
        }
        self.mint(None).await
    }

    async fn mint(&self, notices: Option<Arc<NotificationQueue>>) -> Result<BrowserSession, AuthError> {
        let sid = gen_token()?;
        let entry = Arc::new(self.build_off_thread(sid.clone(), notices).await?);
        let total = {
            let mut map = self.entries.write().await;
            map.insert(sid.clone(), entry.clone());
            map.len()
        };
        tprintln!("session.mint total={}", total);
        Ok(BrowserSession { sid, entry, minted: true })
    }

    /// Move a session that just signed in to a new id and csrf token. The identity is
    /// persisted under the new id and the old id is logged out and forgotten, so an id
    /// known before sign-in is worthless after it. Pending notices carry over.
    pub async fn rotate(&self, current: BrowserSession) -> Result<BrowserSession, AuthError> {
        let identity = current.entry.auth.identity();
        let sid = gen_token()?;
        let parts = self.parts.clone();
        let old = current.entry.clone();
        let new_sid = sid.clone();
        let entry = tokio::task::spawn_blocking(move || {
            if let Some(identity) = &identity {
                SessionStore::namespaced(parts.backend.clone(), &new_sid).persist(identity);
            }
            old.auth.logout();
            parts.build(&new_sid, Some(old.notices.clone()))
        })
        .await
        .map_err(|e| AuthError::TaskFailed(e.to_string()))??;
        let entry = Arc::new(entry);
        {
            let mut map = self.entries.write().await;
            map.remove(&current.sid);
            map.insert(sid.clone(), entry.clone());
        }
        debug!(target: "hackchain::session", "session id rotated after sign-in");
        Ok(BrowserSession { sid, entry, minted: true })
    }

    /// Drop entries idle for at least the TTL. Stored identities stay, so a returning
    /// cookie is restored by `open`. Returns how many were dropped.
    pub async fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let mut map = self.entries.write().await;
        let before = map.len();
        map.retain(|_, entry| entry.idle_for(now) < self.idle_ttl);
        before - map.len()
    }

    pub fn idle_ttl(&self) -> Duration { self.idle_ttl }

    pub async fn len(&self) -> usize { self.entries.read().await.len() }

    pub async fn is_empty(&self) -> bool { self.entries.read().await.is_empty() }
}

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(registry: SessionRegistry) -> Self { Self { sessions: Arc::new(registry) } }

    /// File-backed sessions under `data_dir`, credentials from the seed file or the demo table.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let backend = FileBackend::new(&config.data_dir)
            .with_context(|| format!("While opening session storage at {}", config.data_dir.display()))?;
        info!(target: "startup", root = %backend.root().display(), "session storage ready");
        let verifier = match &config.credentials_file {
            Some(path) => LocalVerifier::from_seed_file(path, &config.hashing)
                .with_context(|| format!("While loading credentials from {}", path.display()))?,
            None => LocalVerifier::demo(&config.hashing)?,
        };
        info!(target: "startup", accounts = verifier.len(), "credential table ready");
        let registry =
            SessionRegistry::new(Arc::new(backend), Arc::new(verifier), config.latency, config.notification_capacity)
                .with_idle_ttl(config.session_idle_ttl);
        Ok(Self::new(registry))
    }
}

/// Background sweep of idle sessions, every quarter TTL.
fn spawn_session_sweeper(registry: Arc<SessionRegistry>) {
    let every = (registry.idle_ttl() / 4).max(Duration::from_secs(1));
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(every).await;
            let removed = registry.evict_idle().await;
            if removed > 0 {
                debug!(target: "hackchain::session", removed, "session_sweep");
            }
        }
    });
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/login", post(login))
        .route("/api/wallet", post(connect_wallet))
        .route("/api/logout", post(logout))
        .route("/api/csrf", get(get_csrf))
        .route("/api/session", get(get_session))
        .route("/api/notifications", get(get_notifications))
        .route("/api/access/{destination}", get(check_access))
        .route("/", get(navigate))
        .route("/login", get(navigate))
        .route("/admin", get(navigate))
        .route("/participant", get(navigate))
        .route("/sponsor", get(navigate))
        .route("/judge", get(navigate))
        .fallback(navigate)
        .with_state(state)
}

/// Start the HTTP server with the given configuration.
pub async fn run_with_config(config: AppConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(&config)?;
    spawn_session_sweeper(state.sessions.clone());
    let app = build_router(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    info!(target: "startup", "Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("While binding {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie = headers.get(header::COOKIE)?;
    let s = cookie.to_str().ok()?;
    for part in s.split(';') {
        let p = part.trim();
        if let Some((k, v)) = p.split_once('=') {
            if k == name {
                return Some(v.to_string());
            }
        }
    }
    None
}

fn set_session_cookie(sid: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("{}={}; HttpOnly; Secure; SameSite=Strict; Path=/", SESSION_COOKIE, sid)).ok()
}

fn validate_csrf(session: &BrowserSession, headers: &HeaderMap) -> bool {
    if session.minted {
        return false;
    }
    let Some(provided) = headers.get(CSRF_HEADER).and_then(|v| v.to_str().ok()) else { return false; };
    provided == session.entry.csrf
}

async fn browser_session(state: &AppState, headers: &HeaderMap) -> Result<BrowserSession, AppError> {
    let cookie = parse_cookie(headers, SESSION_COOKIE);
    state.sessions.open(cookie.as_deref()).await.map_err(|e| {
        error!(target: "hackchain::http", "session open failed: {}", e);
        AppError::from(e)
    })
}

fn reply(session: &BrowserSession, status: StatusCode, mut headers: HeaderMap, body: serde_json::Value) -> Response {
    if session.minted {
        if let Some(v) = set_session_cookie(&session.sid) {
            headers.insert(header::SET_COOKIE, v);
        }
    }
    (status, headers, Json(body)).into_response()
}

fn ok(session: &BrowserSession, body: serde_json::Value) -> Response {
    reply(session, StatusCode::OK, HeaderMap::new(), body)
}

fn fail(session: &BrowserSession, err: AppError) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    reply(session, status, HeaderMap::new(), err.to_json())
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
struct WalletPayload {
    #[serde(default)]
    address: String,
    #[serde(default)]
    signature: Option<String>,
}

async fn login(State(state): State<AppState>, headers: HeaderMap, Json(payload): Json<LoginPayload>) -> Response {
    let session = match browser_session(&state, &headers).await {
        Ok(s) => s,
        Err(e) => return e.into_response(),
    };
    match session.entry.auth.try_login(&payload.email, &payload.password).await {
        Ok(identity) => {
            session.entry.notices.push(Notice::new(
                "Welcome to HackChain!",
                "Login successful. Redirecting to your dashboard...",
                NoticeVariant::Default,
            ));
            signed_in(&state, session, identity).await
        }
        Err(AuthError::MissingCredentials) => {
            session.entry.notices.push(Notice::new(
                "Missing Information",
                "Please enter both email and password.",
                NoticeVariant::Destructive,
            ));
            fail(&session, AuthError::MissingCredentials.into())
        }
        Err(e) => {
            session.entry.notices.push(Notice::new(
                "Login Failed",
                "Invalid email or password. Please try again.",
                NoticeVariant::Destructive,
            ));
            fail(&session, e.into())
        }
    }
}

/// Successful sign-in: move the browser to a fresh session id before answering.
async fn signed_in(state: &AppState, session: BrowserSession, identity: Identity) -> Response {
    let destination = route_for(Some(&identity));
    match state.sessions.rotate(session).await {
        Ok(rotated) => ok(&rotated, json!({"status": "ok", "identity": identity, "destination": destination.path()})),
        Err(e) => {
            error!(target: "hackchain::http", "session rotation failed: {}", e);
            AppError::from(e).into_response()
        }
    }
}

async fn connect_wallet(State(state): State<AppState>, headers: HeaderMap, Json(payload): Json<WalletPayload>) -> Response {
    let session = match browser_session(&state, &headers).await {
        Ok(s) => s,
        Err(e) => return e.into_response(),
    };
    let address = payload.address.as_str();
    if address.is_empty() {
        session.entry.notices.push(Notice::new(
            "Missing Wallet Address",
            "Please enter your wallet address.",
            NoticeVariant::Destructive,
        ));
        return fail(&session, AppError::user("missing_wallet_address", "wallet address is required"));
    }
    match session.entry.auth.try_connect_wallet(address, payload.signature.as_deref()).await {
        Ok(identity) => {
            session.entry.notices.push(Notice::new(
                "Wallet Connected!",
                "Successfully connected to HackChain.",
                NoticeVariant::Default,
            ));
            signed_in(&state, session, identity).await
        }
        Err(AuthError::MalformedWalletAddress) => {
            session.entry.notices.push(Notice::new(
                "Invalid Wallet Address",
                "Please enter a valid Ethereum wallet address.",
                NoticeVariant::Destructive,
            ));
            fail(&session, AuthError::MalformedWalletAddress.into())
        }
        Err(e) => {
            session.entry.notices.push(Notice::new(
                "Connection Failed",
                "Failed to connect wallet. Please try again.",
                NoticeVariant::Destructive,
            ));
            fail(&session, e.into())
        }
    }
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session = match browser_session(&state, &headers).await {
        Ok(s) => s,
        Err(e) => return e.into_response(),
    };
    // Require CSRF token
    if !validate_csrf(&session, &headers) {
        return fail(&session, AppError::csrf("invalid_csrf", "missing or invalid csrf token"));
    }
    let auth = session.entry.auth.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || auth.logout()).await {
        return fail(&session, AuthError::TaskFailed(e.to_string()).into());
    }
    ok(&session, json!({"status": "ok", "destination": Destination::Login.path()}))
}

async fn get_csrf(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session = match browser_session(&state, &headers).await {
        Ok(s) => s,
        Err(e) => return e.into_response(),
    };
    let token = session.entry.csrf.clone();
    ok(&session, json!({"status": "ok", "csrf": token}))
}

async fn get_session(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session = match browser_session(&state, &headers).await {
        Ok(s) => s,
        Err(e) => return e.into_response(),
    };
    let snap = session.entry.auth.snapshot();
    let destination = route_for(snap.identity.as_ref());
    ok(
        &session,
        json!({
            "status": "ok",
            "phase": snap.phase,
            "isLoading": snap.is_loading(),
            "identity": snap.identity,
            "destination": destination.path(),
        }),
    )
}

async fn get_notifications(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session = match browser_session(&state, &headers).await {
        Ok(s) => s,
        Err(e) => return e.into_response(),
    };
    let notices = session.entry.notices.drain();
    ok(&session, json!({"status": "ok", "notifications": notices}))
}

fn denied_body(denial: &AccessDenied, destination: Destination) -> serde_json::Value {
    json!({
        "status": "denied",
        "view": "access_denied",
        "destination": destination,
        "denial": denial,
        "message": denial.message(),
    })
}

fn denied_status(denial: &AccessDenied) -> StatusCode {
    match denial {
        AccessDenied::Unauthenticated => StatusCode::UNAUTHORIZED,
        AccessDenied::Forbidden { .. } => StatusCode::FORBIDDEN,
    }
}

async fn check_access(State(state): State<AppState>, headers: HeaderMap, Path(destination): Path<String>) -> Response {
    let session = match browser_session(&state, &headers).await {
        Ok(s) => s,
        Err(e) => return e.into_response(),
    };
    let Some(dest) = Destination::from_path(&format!("/{}", destination)) else {
        return fail(&session, AppError::not_found("unknown_destination".to_string(), format!("no such view: {}", destination)));
    };
    match session.entry.guarded(dest, || ()) {
        Some(Guarded::View(())) => ok(&session, json!({"status": "ok", "allowed": true, "destination": dest})),
        Some(Guarded::Denied(denial)) => {
            reply(&session, denied_status(&denial), HeaderMap::new(), denied_body(&denial, dest))
        }
        None => ok(&session, json!({"status": "ok", "allowed": true, "destination": dest})),
    }
}

async fn navigate(State(state): State<AppState>, headers: HeaderMap, uri: Uri) -> Response {
    let session = match browser_session(&state, &headers).await {
        Ok(s) => s,
        Err(e) => return e.into_response(),
    };
    let snap = session.entry.auth.snapshot();
    if snap.is_loading() {
        return reply(&session, StatusCode::ACCEPTED, HeaderMap::new(), json!({"status": "loading", "view": "loading"}));
    }
    let identity = snap.identity;
    let path = uri.path();
    match resolve(path, identity.as_ref()) {
        Navigation::Redirect { to } => {
            debug!(target: "hackchain::http", from = %path, to = to.path(), "redirect");
            let mut h = HeaderMap::new();
            h.insert(header::LOCATION, HeaderValue::from_static(to.path()));
            reply(&session, StatusCode::SEE_OTHER, h, json!({"status": "redirect", "location": to.path()}))
        }
        Navigation::Render { destination } => {
            ok(&session, json!({"status": "ok", "view": destination, "identity": identity}))
        }
        Navigation::Protected { destination, .. } => {
            let rendered = session.entry.guarded(destination, || {
                json!({"status": "ok", "view": destination, "identity": identity})
            });
            match rendered {
                Some(Guarded::View(body)) => ok(&session, body),
                Some(Guarded::Denied(denial)) => {
                    reply(&session, denied_status(&denial), HeaderMap::new(), denied_body(&denial, destination))
                }
                None => ok(&session, json!({"status": "ok", "view": destination, "identity": identity})),
            }
        }
        Navigation::NotFound { path } => reply(
            &session,
            StatusCode::NOT_FOUND,
            HeaderMap::new(),
            json!({"status": "not_found", "view": Destination::NotFound, "path": path}),
        ),
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod server_tests;
