//! Chrome Native Messaging Host for SiteWarden
//!
//! This binary runs as a standalone native messaging host for the SiteWarden extension.
//! It communicates via stdin/stdout using Chrome's native messaging protocol, so
//! all logging goes to stderr.

use log::{error, info};
use sitewarden_lib::{
    clock::{Clock, SystemClock},
    config::HostConfig,
    db::{migrations, Database},
    engine::EngineOptions,
    error::InitError,
    native_host::NativeHost,
    store::PolicyStore,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn build_host() -> Result<NativeHost, InitError> {
    let config = HostConfig::load()?;
    // Chrome passes the calling extension's origin as the first argument
    let caller_origin = std::env::args().nth(1);
    let block_page = config.block_page(caller_origin.as_deref())?;

    let db_path = config.database_path()?;
    let db = Database::open(&db_path).map_err(InitError::DatabaseOpen)?;
    migrations::run(db.connection()).map_err(InitError::Migration)?;
    info!("Using database at {}", db_path.display());

    let store = PolicyStore::new(Arc::new(Mutex::new(db)));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let options = EngineOptions {
        block_page,
        daily_summary_hour: config.daily_summary_hour,
    };

    Ok(NativeHost::new(
        store,
        clock,
        options,
        Duration::from_secs(config.tick_interval_secs),
    ))
}

fn main() {
    init_logging();

    let host = match build_host() {
        Ok(host) => host,
        Err(e) => {
            error!("Initialization error: {e}");
            std::process::exit(1);
        }
    };

    // Returns once Chrome closes the connection
    if let Err(e) = host.run(std::io::stdin().lock(), std::io::stdout()) {
        error!("Native host error: {e}");
        std::process::exit(1);
    }
}
