use anyhow::{bail, Result};
use config::{Config, Environment, File as ConfigFile};
use sharex_p2p::{Multiaddr, ANNOUNCE_TOPIC, DEFAULT_HEARTBEAT_INTERVAL};
use sharex_storage::{DEFAULT_CHUNK_SIZE, DEFAULT_KUBO_API_URL};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

pub const CONFIG_FILE_NAME: &str = "sharex.toml";
pub const ENV_PREFIX: &str = "SHAREX";
pub const STORE_BACKENDS: &[&str] = &["sled", "memory", "kubo"];
pub const DEFAULT_GATEWAY_BASE: &str = "https://ipfs.io";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub config_path: Option<PathBuf>,

    // Storage
    pub data_dir: PathBuf,
    pub store_backend: String,
    pub chunk_size: usize,
    pub kubo_api_url: String,

    // P2P
    pub listen_multiaddrs: Vec<String>,
    pub bootstrap_multiaddrs: Vec<String>,
    pub relay_multiaddrs: Vec<String>,
    pub enable_mdns: bool,
    pub enable_relay: bool,

    // Announcements
    pub announce_topic: String,
    pub heartbeat_interval_secs: u64,

    pub gateway_base: String,

    // Logging
    pub log_level: String,
    pub log_format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            data_dir: default_data_dir(),
            store_backend: "sled".to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            kubo_api_url: DEFAULT_KUBO_API_URL.to_string(),
            listen_multiaddrs: vec!["/ip4/0.0.0.0/tcp/4003".to_string()],
            bootstrap_multiaddrs: Vec::new(),
            relay_multiaddrs: Vec::new(),
            enable_mdns: true,
            enable_relay: true,
            announce_topic: ANNOUNCE_TOPIC.to_string(),
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL.as_secs(),
            gateway_base: DEFAULT_GATEWAY_BASE.to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("sharex"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}

impl AppConfig {
    /// Layer defaults, the optional TOML file and `SHAREX_*` environment
    /// variables. Without an explicit path, `<data_dir>/sharex.toml` is used
    /// when it exists.
    pub fn load(config_path_override: Option<&Path>, data_dir_override: Option<&Path>) -> Result<Self> {
        let defaults = AppConfig::default();
        let data_dir = data_dir_override
            .map(Path::to_path_buf)
            .unwrap_or_else(|| defaults.data_dir.clone());

        let resolved_path = match config_path_override {
            Some(path) => {
                if !path.exists() {
                    bail!(
                        "Configuration file {} not found (specified via --config)",
                        path.display()
                    );
                }
                Some(path.to_path_buf())
            }
            None => Some(data_dir.join(CONFIG_FILE_NAME)).filter(|path| path.exists()),
        };

        let mut builder = Config::builder();
        if let Some(path) = &resolved_path {
            builder = builder.add_source(ConfigFile::from(path.as_path()));
        }
        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX));
        let config = builder.build()?;

        let data_dir = match data_dir_override {
            Some(dir) => dir.to_path_buf(),
            None => get_string_value(&config, &["data_dir", "storage.data_dir"])
                .map(PathBuf::from)
                .unwrap_or(data_dir),
        };

        Ok(Self {
            config_path: resolved_path,
            data_dir,
            store_backend: get_string_value(&config, &["store_backend", "storage.backend"])
                .map(|value| value.to_lowercase())
                .unwrap_or(defaults.store_backend),
            chunk_size: get_u64_value(&config, &["chunk_size", "storage.chunk_size"])
                .map(|value| value as usize)
                .unwrap_or(defaults.chunk_size),
            kubo_api_url: get_string_value(&config, &["kubo_api_url", "storage.kubo_api_url"])
                .unwrap_or(defaults.kubo_api_url),
            listen_multiaddrs: get_list_value(&config, &["listen_multiaddrs", "p2p.listen_multiaddrs"])
                .unwrap_or(defaults.listen_multiaddrs),
            bootstrap_multiaddrs: get_list_value(
                &config,
                &["bootstrap_multiaddrs", "p2p.bootstrap_multiaddrs"],
            )
            .unwrap_or(defaults.bootstrap_multiaddrs),
            relay_multiaddrs: get_list_value(&config, &["relay_multiaddrs", "p2p.relay_multiaddrs"])
                .unwrap_or(defaults.relay_multiaddrs),
            enable_mdns: get_bool_value(
                &config,
                &["enable_mdns", "p2p.enable_mdns"],
                defaults.enable_mdns,
            ),
            enable_relay: get_bool_value(
                &config,
                &["enable_relay", "p2p.enable_relay"],
                defaults.enable_relay,
            ),
            announce_topic: get_string_value(&config, &["announce_topic", "announce.topic"])
                .unwrap_or(defaults.announce_topic),
            heartbeat_interval_secs: get_u64_value(
                &config,
                &["heartbeat_interval_secs", "announce.heartbeat_interval_secs"],
            )
            .unwrap_or(defaults.heartbeat_interval_secs),
            gateway_base: get_string_value(&config, &["gateway_base", "gateway.base"])
                .unwrap_or(defaults.gateway_base),
            log_level: get_string_value(&config, &["log_level", "log.level"])
                .unwrap_or(defaults.log_level),
            log_format: get_string_value(&config, &["log_format", "log.format"])
                .unwrap_or(defaults.log_format),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            bail!("DATA_DIR must not be empty");
        }
        if !STORE_BACKENDS.contains(&self.store_backend.as_str()) {
            bail!(
                "unknown store backend '{}' (expected one of: {})",
                self.store_backend,
                STORE_BACKENDS.join(", ")
            );
        }
        if self.store_backend == "kubo"
            && !(self.kubo_api_url.starts_with("http://") || self.kubo_api_url.starts_with("https://"))
        {
            bail!("KUBO_API_URL must be an http(s) URL, got '{}'", self.kubo_api_url);
        }
        if self.chunk_size == 0 {
            bail!("CHUNK_SIZE must be greater than zero");
        }
        if self.heartbeat_interval_secs == 0 {
            bail!("HEARTBEAT_INTERVAL_SECS must be greater than zero");
        }
        if self.announce_topic.trim().is_empty() {
            bail!("ANNOUNCE_TOPIC must not be empty");
        }
        Ok(())
    }

    pub fn content_dir(&self) -> PathBuf {
        self.data_dir.join("content")
    }
}

fn get_string_value(config: &Config, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        config
            .get_string(key)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

fn get_u64_value(config: &Config, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| {
        config
            .get_int(key)
            .ok()
            .and_then(|value| u64::try_from(value).ok())
    })
}

fn get_bool_value(config: &Config, keys: &[&str], default: bool) -> bool {
    for key in keys {
        if let Ok(value) = config.get_bool(key) {
            return value;
        }
        if let Ok(raw) = config.get_string(key) {
            if let Ok(parsed) = raw.parse::<bool>() {
                return parsed;
            }
        }
    }
    default
}

/// Arrays from files, comma-separated strings from the environment.
fn get_list_value(config: &Config, keys: &[&str]) -> Option<Vec<String>> {
    keys.iter().find_map(|key| {
        if let Ok(values) = config.get_array(key) {
            return Some(
                values
                    .into_iter()
                    .filter_map(|value| value.into_string().ok())
                    .collect(),
            );
        }
        config.get_string(key).ok().map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .collect()
        })
    })
}

pub fn parse_multiaddrs(values: &[String], label: &str) -> Vec<Multiaddr> {
    values
        .iter()
        .filter_map(|value| {
            if value.is_empty() {
                return None;
            }
            match Multiaddr::from_str(value) {
                Ok(addr) => Some(addr),
                Err(err) => {
                    warn!("Invalid {} multiaddr {}: {}", label, value, err);
                    None
                }
            }
        })
        .collect()
}
