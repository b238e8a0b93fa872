#![cfg(not(tarpaulin_include))]

use log::info;
use std::env;
use surveillances::app;
use surveillances::config::AppConfig;

/// Main entry point for the web application
///
/// Configuration comes from `SURVEILLANCES_CONFIG` and `SURVEILLANCES_BIND`;
/// the first command line argument, when present, overrides the bind
/// address. Logging is controlled by `RUST_LOG`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut config = AppConfig::from_env()?;
    if let Some(bind) = env::args().nth(1) {
        config.bind_address = bind;
    }

    info!(
        "starting with styles from {} and {:?} failure policy",
        config.style_dir.display(),
        config.failure_policy
    );
    app::run(config).await
}
