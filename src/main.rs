//!
//! hackchain server binary
//! -----------------------
//! Command-line entry point for the dashboard's auth and routing server. Configured via
//! CLI flags and `HACKCHAIN_*` environment variables.

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use hackchain::config::{has_flag, AppConfig, USAGE};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("{}", USAGE);
        return Ok(());
    }

    // Init logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env_and_args(&args);

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "startup",
        "hackchain starting: RUST_LOG='{}', http_port={}, data_dir='{}', login_delay_ms={}, wallet_delay_ms={}, credentials={}",
        rust_log,
        config.http_port,
        config.data_dir.display(),
        config.latency.login.as_millis(),
        config.latency.wallet.as_millis(),
        config.credentials_file.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "<demo>".to_string()),
    );

    hackchain::server::run_with_config(config).await
}
