//!
//! hackchain runtime configuration
//! --------------------------------
//! Settings resolve in three layers: built-in defaults, then `HACKCHAIN_*` environment
//! variables, then command-line flags. Unparseable values at a layer are ignored and the
//! layer below wins.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Argon2id cost parameters for hashing seed credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingConfig {
    /// Memory cost in KiB.
    pub m_cost_kib: u32,
    /// Iterations.
    pub t_cost: u32,
    /// Lanes.
    pub p_cost: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            m_cost_kib: argon2::Params::DEFAULT_M_COST,
            t_cost: argon2::Params::DEFAULT_T_COST,
            p_cost: argon2::Params::DEFAULT_P_COST,
        }
    }
}

impl HashingConfig {
    /// Minimum-cost parameters for tests. Never use for real credentials.
    pub fn fast() -> Self { Self { m_cost_kib: 64, t_cost: 1, p_cost: 1 } }
}

/// Simulated round-trip latency for the two sign-in flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyModel {
    pub login: Duration,
    pub wallet: Duration,
}

impl Default for LatencyModel {
    fn default() -> Self {
        Self { login: Duration::from_millis(1000), wallet: Duration::from_millis(1500) }
    }
}

impl LatencyModel {
    pub fn none() -> Self { Self { login: Duration::ZERO, wallet: Duration::ZERO } }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub http_port: u16,
    /// Root folder of the file-backed session store.
    pub data_dir: PathBuf,
    pub latency: LatencyModel,
    /// JSON file of credential seeds; the built-in demo table when unset.
    pub credentials_file: Option<PathBuf>,
    pub hashing: HashingConfig,
    /// Cap on undelivered notifications kept per session.
    pub notification_capacity: usize,
    /// In-memory sessions untouched for this long are evicted; their stored identity stays.
    pub session_idle_ttl: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            data_dir: PathBuf::from("data/sessions"),
            latency: LatencyModel::default(),
            credentials_file: None,
            hashing: HashingConfig::default(),
            notification_capacity: 32,
            session_idle_ttl: Duration::from_secs(30 * 60),
        }
    }
}

pub const USAGE: &str = "hackchain\n\nUSAGE:\n  hackchain [--http-port N] [--data-dir PATH] [--login-delay-ms N] [--wallet-delay-ms N] [--credentials PATH] [--session-ttl-secs N]\n\nOPTIONS:\n  --http-port N          HTTP port (env: HACKCHAIN_HTTP_PORT, default 8080)\n  --data-dir PATH        Session storage folder (env: HACKCHAIN_DATA_DIR, default data/sessions)\n  --login-delay-ms N     Simulated login latency (env: HACKCHAIN_LOGIN_DELAY_MS, default 1000)\n  --wallet-delay-ms N    Simulated wallet latency (env: HACKCHAIN_WALLET_DELAY_MS, default 1500)\n  --credentials PATH     Credential seed JSON file (env: HACKCHAIN_CREDENTIALS_FILE, default built-in demo users)\n  --session-ttl-secs N   Idle time before an in-memory session is evicted (env: HACKCHAIN_SESSION_TTL_SECS, default 1800)\n";

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].as_str());
        }
        i += 1;
    }
    None
}

pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

impl AppConfig {
    /// Resolve from the process environment and the given argv.
    pub fn from_env_and_args(args: &[String]) -> Self {
        Self::resolve(|name| env::var(name).ok(), args)
    }

    /// Layer resolution with an injectable environment lookup.
    pub fn resolve<F>(lookup: F, args: &[String]) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = AppConfig::default();

        // Environment variables
        if let Some(p) = lookup("HACKCHAIN_HTTP_PORT").and_then(|v| v.parse::<u16>().ok()) { cfg.http_port = p; }
        if let Some(d) = lookup("HACKCHAIN_DATA_DIR").filter(|v| !v.is_empty()) { cfg.data_dir = PathBuf::from(d); }
        if let Some(ms) = lookup("HACKCHAIN_LOGIN_DELAY_MS").and_then(|v| v.parse::<u64>().ok()) {
            cfg.latency.login = Duration::from_millis(ms);
        }
        if let Some(ms) = lookup("HACKCHAIN_WALLET_DELAY_MS").and_then(|v| v.parse::<u64>().ok()) {
            cfg.latency.wallet = Duration::from_millis(ms);
        }
        if let Some(f) = lookup("HACKCHAIN_CREDENTIALS_FILE").filter(|v| !v.is_empty()) {
            cfg.credentials_file = Some(PathBuf::from(f));
        }
        if let Some(secs) = lookup("HACKCHAIN_SESSION_TTL_SECS").and_then(|v| v.parse::<u64>().ok()) {
            cfg.session_idle_ttl = Duration::from_secs(secs);
        }

        // CLI arguments override environment
        if let Some(p) = arg_value(args, "--http-port").and_then(|v| v.parse::<u16>().ok()) { cfg.http_port = p; }
        if let Some(d) = arg_value(args, "--data-dir") { cfg.data_dir = PathBuf::from(d); }
        if let Some(ms) = arg_value(args, "--login-delay-ms").and_then(|v| v.parse::<u64>().ok()) {
            cfg.latency.login = Duration::from_millis(ms);
        }
        if let Some(ms) = arg_value(args, "--wallet-delay-ms").and_then(|v| v.parse::<u64>().ok()) {
            cfg.latency.wallet = Duration::from_millis(ms);
        }
        if let Some(f) = arg_value(args, "--credentials") { cfg.credentials_file = Some(PathBuf::from(f)); }
        if let Some(secs) = arg_value(args, "--session-ttl-secs").and_then(|v| v.parse::<u64>().ok()) {
            cfg.session_idle_ttl = Duration::from_secs(secs);
        }

        cfg
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
