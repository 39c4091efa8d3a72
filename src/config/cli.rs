use clap::Parser;
use parking_lot::RwLock;
use std::{
    fs,
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
    time::Duration,
};

use super::types::{FramingMode, LogLevel};

// -----------------------------------------------------------------------------
// ----- Global Singleton ------------------------------------------------------

static CLI_CONFIG: OnceLock<Arc<RwLock<CliConfig>>> = OnceLock::new();

// -----------------------------------------------------------------------------
// ----- CliConfig -------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct CliConfig {
    pub listen_addr: SocketAddr,
    pub config_file_location: Option<PathBuf>,
    pub log_level: LogLevel,
    pub framing: FramingMode,
    pub poll_timeout: Duration,
    pub idle_after: Duration,
}

impl CliConfig {
    pub fn init() {
        CLI_CONFIG.get_or_init(|| {
            let cfg = Self::from_args();
            cfg.validate();
            Arc::new(RwLock::new(cfg))
        });
    }

    pub fn snapshot() -> CliConfig {
        handle().read().clone()
    }
}

// -----------------------------------------------------------------------------
// ----- CliConfig: Private ----------------------------------------------------

impl CliConfig {
    fn from_args() -> Self {
        let args = Args::try_parse().unwrap_or_else(|e| panic!("Invalid CLI/ENV: {e}"));
        Self::from_parsed(args)
    }

    fn validate(&self) {
        if let Some(path) = &self.config_file_location {
            must_exist_file(path, "--config / simplenet.toml");
        }
    }

    fn from_parsed(args: Args) -> Self {
        Self {
            listen_addr: SocketAddr::from((args.host, args.port)),
            config_file_location: args.config_file,
            log_level: args.log_level,
            framing: args.framing,
            poll_timeout: args.poll_timeout,
            idle_after: args.idle_after,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Args ------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "simplenet", version, about = "TCP echo and command server")]
struct Args {
    // IPv4 or IPv6 literal (e.g., 0.0.0.0, 127.0.0.1, ::, ::1).
    #[arg(long = "host", short = 'H', env = "SIMPLENET_HOST", default_value = "127.0.0.1")]
    host: IpAddr,

    #[arg(long = "port", short = 'p', env = "SIMPLENET_PORT")]
    port: u16,

    #[arg(long = "log", env = "SIMPLENET_LOG", default_value = "info")]
    log_level: LogLevel,

    // Optional; defaults apply when absent.
    #[arg(long = "config", env = "SIMPLENET_CONFIG_FILE")]
    config_file: Option<PathBuf>,

    #[arg(long = "framing", env = "SIMPLENET_FRAMING", default_value = "command")]
    framing: FramingMode,

    // e.g. "500ms", "2s"
    #[arg(
        long = "poll-timeout",
        env = "SIMPLENET_POLL_TIMEOUT",
        default_value = "1s",
        value_parser = humantime::parse_duration
    )]
    poll_timeout: Duration,

    // Connections quiet for longer than this are reported on poll timeouts.
    #[arg(
        long = "idle-after",
        env = "SIMPLENET_IDLE_AFTER",
        default_value = "30s",
        value_parser = humantime::parse_duration
    )]
    idle_after: Duration,
}

// -----------------------------------------------------------------------------
// ----- Private Utils ---------------------------------------------------------

fn handle() -> Arc<RwLock<CliConfig>> {
    CLI_CONFIG
        .get()
        .expect("config not initialized; call Config::init().await first")
        .clone()
}

fn must_exist_file(path: &Path, hint: &str) {
    let md = fs::metadata(path).unwrap_or_else(|_| {
        panic!("required file missing: {} (from {hint})", path.display());
    });

    if !md.is_file() {
        panic!("path is not a file: {} (from {hint})", path.display());
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
