//! Configuration system for the Huddle hub.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/huddle/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;
use std::time::Duration;

use crate::history::DEFAULT_HISTORY_CAP;
use crate::mailbox::DEFAULT_MAILBOX_CAP;
use crate::typing::DEFAULT_TYPING_TTL;

/// Errors that can occur when loading hub configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct HubConfigFile {
    server: ServerFileConfig,
    hub: HubFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    sweep_interval_ms: Option<u64>,
}

/// `[hub]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct HubFileConfig {
    history_cap: Option<usize>,
    typing_ttl_ms: Option<u64>,
    liveness_ttl_ms: Option<u64>,
    max_payload_size: Option<usize>,
    mailbox_cap: Option<usize>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the hub server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Huddle presence, chat and signaling hub")]
pub struct HubCliArgs {
    /// Address to bind the hub to.
    #[arg(short, long, env = "HUDDLE_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/huddle/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of chat events kept for replay.
    #[arg(long)]
    pub history_cap: Option<usize>,

    /// Milliseconds a typing flag lives without refresh.
    #[arg(long)]
    pub typing_ttl_ms: Option<u64>,

    /// Milliseconds a polling client may stay silent before it is swept.
    #[arg(long)]
    pub liveness_ttl_ms: Option<u64>,

    /// Maximum chat body or signal payload size in bytes.
    #[arg(long)]
    pub max_payload_size: Option<usize>,

    /// Maximum queued events per polling client.
    #[arg(long)]
    pub mailbox_cap: Option<usize>,

    /// Milliseconds between liveness sweeps.
    #[arg(long)]
    pub sweep_interval_ms: Option<u64>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "HUDDLE_LOG")]
    pub log_level: String,

    /// Write logs to this file instead of stdout.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Limits and lifetimes used by the hub components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubSettings {
    /// Number of chat events kept for replay.
    pub history_cap: usize,
    /// Lifetime of a typing flag without refresh.
    pub typing_ttl: Duration,
    /// Silence after which a polling client is considered gone.
    pub liveness_ttl: Duration,
    /// Maximum chat body or serialized signal payload size in bytes.
    pub max_payload_size: usize,
    /// Maximum queued events per polling client.
    pub mailbox_cap: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            history_cap: DEFAULT_HISTORY_CAP,
            typing_ttl: DEFAULT_TYPING_TTL,
            liveness_ttl: Duration::from_secs(30),
            max_payload_size: 10 * 1024 * 1024,
            mailbox_cap: DEFAULT_MAILBOX_CAP,
        }
    }
}

/// Fully resolved hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Address to bind the server to (e.g., `0.0.0.0:5000`).
    pub bind_addr: String,
    /// Interval of the maintenance task.
    pub sweep_interval: Duration,
    /// Component limits.
    pub settings: HubSettings,
    /// Log level filter string.
    pub log_level: String,
    /// Optional log file.
    pub log_file: Option<PathBuf>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".to_string(),
            sweep_interval: Duration::from_secs(1),
            settings: HubSettings::default(),
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl HubConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and missing file
    /// is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &HubCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `HubConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &HubCliArgs, file: &HubConfigFile) -> Self {
        let defaults = Self::default();
        let hub = &file.hub;
        let millis = |flag: Option<u64>, from_file: Option<u64>, default: Duration| {
            flag.or(from_file).map_or(default, Duration::from_millis)
        };

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            sweep_interval: millis(
                cli.sweep_interval_ms,
                file.server.sweep_interval_ms,
                defaults.sweep_interval,
            ),
            settings: HubSettings {
                history_cap: cli
                    .history_cap
                    .or(hub.history_cap)
                    .unwrap_or(defaults.settings.history_cap),
                typing_ttl: millis(cli.typing_ttl_ms, hub.typing_ttl_ms, defaults.settings.typing_ttl),
                liveness_ttl: millis(
                    cli.liveness_ttl_ms,
                    hub.liveness_ttl_ms,
                    defaults.settings.liveness_ttl,
                ),
                max_payload_size: cli
                    .max_payload_size
                    .or(hub.max_payload_size)
                    .unwrap_or(defaults.settings.max_payload_size),
                mailbox_cap: cli
                    .mailbox_cap
                    .or(hub.mailbox_cap)
                    .unwrap_or(defaults.settings.mailbox_cap),
            },
            log_level: cli.log_level.clone(),
            log_file: cli.log_file.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file for the hub.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<HubConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(HubConfigFile::default());
        };
        config_dir.join("huddle").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HubConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
