use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use hackchain::config::{HashingConfig, LatencyModel};
use hackchain::identity::{LocalVerifier, MemoryBackend, SessionBackend, DEMO_WALLET_ADDRESS};
use hackchain::server::{build_router, AppState, SessionRegistry, CSRF_HEADER, SESSION_COOKIE};

fn app_on(backend: Arc<dyn SessionBackend>) -> Router {
    let verifier = Arc::new(LocalVerifier::demo(&HashingConfig::fast()).expect("demo verifier"));
    build_router(AppState::new(SessionRegistry::new(backend, verifier, LatencyModel::none(), 8)))
}

fn app() -> Router { app_on(Arc::new(MemoryBackend::new())) }

struct Reply {
    status: StatusCode,
    location: Option<String>,
    cookie: Option<String>,
    body: Value,
}

async fn send(app: &Router, method: Method, uri: &str, cookie: Option<&str>, csrf: Option<&str>, body: Option<Value>) -> Reply {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(sid) = cookie {
        req = req.header(header::COOKIE, format!("{}={}", SESSION_COOKIE, sid));
    }
    if let Some(token) = csrf {
        req = req.header(CSRF_HEADER, token);
    }
    let req = match body {
        Some(v) => req.header(header::CONTENT_TYPE, "application/json").body(Body::from(v.to_string())).unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let location = resp.headers().get(header::LOCATION).map(|v| v.to_str().unwrap().to_string());
    let cookie = resp.headers().get(header::SET_COOKIE).map(|v| {
        let s = v.to_str().unwrap();
        let pair = s.split(';').next().unwrap();
        pair.split_once('=').unwrap().1.to_string()
    });
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    Reply { status, location, cookie, body }
}

async fn get(app: &Router, uri: &str, sid: &str) -> Reply { send(app, Method::GET, uri, Some(sid), None, None).await }

async fn new_session(app: &Router) -> String {
    let r = send(app, Method::GET, "/api/session", None, None, None).await;
    assert_eq!(r.status, StatusCode::OK);
    r.cookie.expect("first request mints a session cookie")
}

async fn login_as(app: &Router, sid: &str, email: &str, password: &str) -> Reply {
    send(app, Method::POST, "/api/login", Some(sid), None, Some(json!({"email": email, "password": password}))).await
}

/// Sign in and return the session id the server moved the browser to.
async fn signed_in_as(app: &Router, email: &str, password: &str) -> String {
    let sid = new_session(app).await;
    let r = login_as(app, &sid, email, password).await;
    assert_eq!(r.status, StatusCode::OK);
    r.cookie.expect("sign-in issues a new session cookie")
}

#[tokio::test]
async fn first_visit_mints_cookie_and_redirects_to_login() {
    let app = app();
    let r = send(&app, Method::GET, "/", None, None, None).await;
    assert_eq!(r.status, StatusCode::SEE_OTHER);
    assert_eq!(r.location.as_deref(), Some("/login"));
    let sid = r.cookie.expect("cookie");
    let again = get(&app, "/", &sid).await;
    assert!(again.cookie.is_none());
}

#[tokio::test]
async fn admin_login_routes_to_admin_dashboard() {
    let app = app();
    let sid = new_session(&app).await;
    let r = login_as(&app, &sid, "admin@hackathon.app", "admin123").await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.body["destination"], "/admin");
    assert_eq!(r.body["identity"]["role"], "admin");
    let sid = r.cookie.expect("new session cookie");

    let root = get(&app, "/", &sid).await;
    assert_eq!(root.location.as_deref(), Some("/admin"));
    let dash = get(&app, "/admin", &sid).await;
    assert_eq!(dash.status, StatusCode::OK);
    assert_eq!(dash.body["view"], "admin_dashboard");
    let login_page = get(&app, "/login", &sid).await;
    assert_eq!(login_page.location.as_deref(), Some("/admin"));
}

#[tokio::test]
async fn failed_login_is_generic_and_stays_unauthenticated() {
    let app = app();
    let sid = new_session(&app).await;
    let wrong = login_as(&app, &sid, "admin@hackathon.app", "wrong").await;
    let unknown = login_as(&app, &sid, "nobody@hackathon.app", "admin123").await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.body, unknown.body);
    assert_eq!(wrong.body["code"], "invalid_credentials");

    let s = get(&app, "/api/session", &sid).await;
    assert_eq!(s.body["phase"], "unauthenticated");
    assert_eq!(s.body["identity"], Value::Null);
    assert_eq!(s.body["destination"], "/login");
}

#[tokio::test]
async fn missing_fields_are_a_bad_request() {
    let app = app();
    let sid = new_session(&app).await;
    let r = send(&app, Method::POST, "/api/login", Some(&sid), None, Some(json!({"email": "admin@hackathon.app"}))).await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
    assert_eq!(r.body["code"], "missing_credentials");
    let notes = get(&app, "/api/notifications", &sid).await;
    assert_eq!(notes.body["notifications"][0]["title"], "Missing Information");
}

#[tokio::test]
async fn participant_denied_admin_with_one_notice() {
    let app = app();
    let sid = signed_in_as(&app, "participant@hackathon.app", "participant123").await;
    // Drop the login toast.
    get(&app, "/api/notifications", &sid).await;

    for _ in 0..3 {
        let r = get(&app, "/admin", &sid).await;
        assert_eq!(r.status, StatusCode::FORBIDDEN);
        assert_eq!(r.body["denial"], json!({"reason": "forbidden", "requiredRoles": ["admin"], "actualRole": "participant"}));
    }
    let notes = get(&app, "/api/notifications", &sid).await;
    let list = notes.body["notifications"].as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["description"], "This area is restricted to admin users only.");
    assert_eq!(list[0]["variant"], "destructive");
}

#[tokio::test]
async fn anonymous_dashboard_visit_redirects_to_login() {
    let app = app();
    let sid = new_session(&app).await;
    for path in ["/admin", "/participant", "/sponsor", "/judge"] {
        let r = get(&app, path, &sid).await;
        assert_eq!(r.status, StatusCode::SEE_OTHER, "{}", path);
        assert_eq!(r.location.as_deref(), Some("/login"));
    }
    let access = get(&app, "/api/access/judge", &sid).await;
    assert_eq!(access.status, StatusCode::UNAUTHORIZED);
    assert_eq!(access.body["denial"]["reason"], "unauthenticated");
    let notes = get(&app, "/api/notifications", &sid).await;
    assert_eq!(notes.body["notifications"], json!([]));
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let app = app();
    let sid = new_session(&app).await;
    let r = get(&app, "/campaigns/42", &sid).await;
    assert_eq!(r.status, StatusCode::NOT_FOUND);
    assert_eq!(r.body["path"], "/campaigns/42");
    let unknown_view = get(&app, "/api/access/treasury", &sid).await;
    assert_eq!(unknown_view.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn wallet_connect_creates_participant_session() {
    let app = app();
    let sid = new_session(&app).await;
    let bad = send(&app, Method::POST, "/api/wallet", Some(&sid), None, Some(json!({"address": "0x1234"}))).await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad.body["code"], "malformed_wallet_address");

    let empty = send(&app, Method::POST, "/api/wallet", Some(&sid), None, Some(json!({"address": ""}))).await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);

    let padded = format!(" {} ", DEMO_WALLET_ADDRESS);
    let spaced = send(&app, Method::POST, "/api/wallet", Some(&sid), None, Some(json!({"address": padded}))).await;
    assert_eq!(spaced.status, StatusCode::BAD_REQUEST);

    let r = send(&app, Method::POST, "/api/wallet", Some(&sid), None, Some(json!({"address": DEMO_WALLET_ADDRESS}))).await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.body["identity"]["id"], "wallet_0x742d35");
    assert_eq!(r.body["identity"]["walletAddress"], DEMO_WALLET_ADDRESS);
    assert_eq!(r.body["destination"], "/participant");
    let connected = r.cookie.expect("wallet sign-in issues a new session cookie");
    assert_ne!(connected, sid);
    assert_eq!(get(&app, "/api/access/participant", &connected).await.status, StatusCode::OK);
    assert_eq!(get(&app, "/api/access/participant", &sid).await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_requires_csrf_and_is_idempotent() {
    let app = app();
    let sid = signed_in_as(&app, "sponsor@hackathon.app", "sponsor123").await;

    let no_token = send(&app, Method::POST, "/api/logout", Some(&sid), None, None).await;
    assert_eq!(no_token.status, StatusCode::FORBIDDEN);
    assert_eq!(no_token.body["code"], "invalid_csrf");
    assert_eq!(get(&app, "/api/session", &sid).await.body["identity"]["role"], "sponsor");

    let csrf = get(&app, "/api/csrf", &sid).await.body["csrf"].as_str().unwrap().to_string();
    for _ in 0..2 {
        let r = send(&app, Method::POST, "/api/logout", Some(&sid), Some(&csrf), None).await;
        assert_eq!(r.status, StatusCode::OK);
        assert_eq!(r.body["destination"], "/login");
    }
    let s = get(&app, "/api/session", &sid).await;
    assert_eq!(s.body["phase"], "unauthenticated");
    assert_eq!(get(&app, "/sponsor", &sid).await.location.as_deref(), Some("/login"));
}

#[tokio::test]
async fn csrf_token_from_another_session_is_rejected() {
    let app = app();
    let a = signed_in_as(&app, "judge@hackathon.app", "judge123").await;
    let b = new_session(&app).await;
    let b_token = get(&app, "/api/csrf", &b).await.body["csrf"].as_str().unwrap().to_string();
    let r = send(&app, Method::POST, "/api/logout", Some(&a), Some(&b_token), None).await;
    assert_eq!(r.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn session_survives_restart_on_shared_storage() {
    let backend: Arc<dyn SessionBackend> = Arc::new(MemoryBackend::new());
    let sid = {
        let app = app_on(backend.clone());
        signed_in_as(&app, "judge@hackathon.app", "judge123").await
    };
    let restarted = app_on(backend);
    let r = get(&restarted, "/", &sid).await;
    assert_eq!(r.location.as_deref(), Some("/judge"));
    assert!(r.cookie.is_none());
}

#[tokio::test]
async fn sign_in_rotates_the_session_cookie() {
    let app = app();
    let planted = new_session(&app).await;
    let old_csrf = get(&app, "/api/csrf", &planted).await.body["csrf"].as_str().unwrap().to_string();

    let r = login_as(&app, &planted, "admin@hackathon.app", "admin123").await;
    assert_eq!(r.status, StatusCode::OK);
    let fresh = r.cookie.expect("new session cookie");
    assert_ne!(fresh, planted);

    // Whoever knew the pre-login cookie gets an anonymous session, not the admin.
    let stale = get(&app, "/api/session", &planted).await;
    assert_eq!(stale.body["identity"], Value::Null);
    assert!(stale.cookie.is_some());

    let now = get(&app, "/api/session", &fresh).await;
    assert_eq!(now.body["identity"]["role"], "admin");
    let new_csrf = get(&app, "/api/csrf", &fresh).await.body["csrf"].as_str().unwrap().to_string();
    assert_ne!(new_csrf, old_csrf);
    let notes = get(&app, "/api/notifications", &fresh).await;
    assert_eq!(notes.body["notifications"][0]["title"], "Welcome to HackChain!");
}

#[tokio::test]
async fn padded_email_does_not_match() {
    let app = app();
    let sid = new_session(&app).await;
    let r = login_as(&app, &sid, "  admin@hackathon.app\t", "admin123").await;
    assert_eq!(r.status, StatusCode::UNAUTHORIZED);
    assert_eq!(r.body["code"], "invalid_credentials");
    assert!(r.cookie.is_none());
}
