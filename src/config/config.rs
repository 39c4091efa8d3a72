use parking_lot::RwLock;
use std::{
    net::SocketAddr,
    sync::{Arc, OnceLock},
    time::Duration,
};

use super::{
    cli::CliConfig,
    file::FileConfig,
    net::NetConfig,
    types::{FramingMode, LogLevel},
};

// -----------------------------------------------------------------------------
// ----- Global Singleton ------------------------------------------------------

static ROOT_CONFIG: OnceLock<Arc<RwLock<Config>>> = OnceLock::new();

// -----------------------------------------------------------------------------
// ----- Config ----------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: LogLevel,
    pub framing: FramingMode,
    pub poll_timeout: Duration,
    pub idle_after: Duration,
    pub net: NetConfig,
}

// -----------------------------------------------------------------------------
// ----- Config: Static --------------------------------------------------------

impl Config {
    /// Async because the config file is read with non-blocking IO.
    pub async fn init() {
        CliConfig::init();
        let cli = CliConfig::snapshot();
        FileConfig::init(cli.config_file_location.as_deref()).await;

        Self::load();
    }

    pub fn snapshot() -> Config {
        Self::handle().read().clone()
    }
}

// -----------------------------------------------------------------------------
// ----- Config: Private -------------------------------------------------------

impl Config {
    fn load() {
        let cli = CliConfig::snapshot();
        let file = FileConfig::handle();

        let next = Config {
            listen_addr: cli.listen_addr,
            log_level: cli.log_level,
            framing: cli.framing,
            poll_timeout: cli.poll_timeout,
            idle_after: cli.idle_after,
            net: file.net.clone(),
        };

        if let Some(handle) = ROOT_CONFIG.get() {
            *handle.write() = next;
        } else {
            let _ = ROOT_CONFIG.set(Arc::new(RwLock::new(next)));
        }
    }

    fn handle() -> Arc<RwLock<Config>> {
        ROOT_CONFIG
            .get()
            .expect("Config not initialized; call Config::init().await first")
            .clone()
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
