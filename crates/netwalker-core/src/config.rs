use crate::collector::CollectorSettings;
use crate::connection::{Credentials, SessionConfig};
use crate::engine::{EngineConfig, Seed};
use crate::error::WalkError;
use crate::filter::{parse_glob_list, parse_subnet_list, NeighborFilter};
use crate::secrets;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// `[discovery]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    pub max_depth: u32,
    /// Idle window in seconds; extended while new work keeps arriving.
    pub discovery_timeout: u64,
    pub concurrent_devices: usize,
    pub enable_progress_tracking: bool,
    pub connection_timeout: u64,
    pub seed_file: Option<String>,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            max_depth: 9,
            discovery_timeout: 7200,
            concurrent_devices: 10,
            enable_progress_tracking: true,
            connection_timeout: 30,
            seed_file: None,
        }
    }
}

/// `[credentials]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CredentialSettings {
    pub prompt_for_enable_password: bool,
}

/// `[exclusions]` section; all values are comma-separated glob lists except
/// `exclude_subnets`, which is a comma-separated CIDR list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExclusionSettings {
    pub exclude_platforms: String,
    pub exclude_capabilities: String,
    pub exclude_hostnames: String,
    pub exclude_subnets: String,
}

/// `[database]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub enabled: bool,
    pub url: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "sqlite:netwalker.db".to_string(),
        }
    }
}

/// `[vlan_collection]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VlanSettings {
    pub enabled: bool,
    pub timeout: u64,
}

impl Default for VlanSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: 60,
        }
    }
}

/// `[output]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub site_boundary_pattern: String,
    pub directory: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            site_boundary_pattern: "*-CORE-*".to_string(),
            directory: ".".to_string(),
        }
    }
}

/// `[visio]` section; consumed by the out-of-core diagram renderer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VisioSettings {
    pub exclude_devices: String,
}

/// The immutable configuration value constructed at startup. Precedence:
/// environment (`NETWALKER__SECTION__KEY`) over INI file over defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WalkerConfig {
    pub discovery: DiscoverySettings,
    pub credentials: CredentialSettings,
    pub exclusions: ExclusionSettings,
    pub database: DatabaseSettings,
    pub vlan_collection: VlanSettings,
    pub output: OutputSettings,
    pub visio: VisioSettings,
}

impl WalkerConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, WalkError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            if !path.exists() {
                return Err(WalkError::ConfigError(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path.to_path_buf()).format(FileFormat::Ini));
        }
        builder = builder.add_source(Environment::with_prefix("NETWALKER").separator("__"));

        let config = builder.build()?;
        let walker: WalkerConfig = config.try_deserialize()?;
        debug!(discovery = ?walker.discovery, "Configuration loaded");
        Ok(walker)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_workers: self.discovery.concurrent_devices.max(1),
            discovery_timeout: Duration::from_secs(self.discovery.discovery_timeout),
            enable_progress: self.discovery.enable_progress_tracking,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            connect_timeout: Duration::from_secs(self.discovery.connection_timeout),
            ..SessionConfig::default()
        }
    }

    pub fn collector_settings(&self) -> CollectorSettings {
        CollectorSettings {
            session: self.session_config(),
            vlan_enabled: self.vlan_collection.enabled,
            vlan_timeout: Duration::from_secs(self.vlan_collection.timeout),
        }
    }

    pub fn neighbor_filter(&self) -> NeighborFilter {
        NeighborFilter::new(
            self.discovery.max_depth,
            parse_glob_list(&self.exclusions.exclude_platforms),
            parse_glob_list(&self.exclusions.exclude_capabilities),
            parse_glob_list(&self.exclusions.exclude_hostnames),
            parse_subnet_list(&self.exclusions.exclude_subnets),
        )
    }
}

/// Resolve credentials with the precedence: CLI flag, environment,
/// interactive prompt. Stored values may carry the `ENC:` prefix.
pub fn resolve_credentials(
    username: Option<String>,
    password: Option<String>,
    enable_password: Option<String>,
    settings: &CredentialSettings,
) -> Result<Credentials, WalkError> {
    let username = username
        .or_else(|| std::env::var("NETWALKER_USERNAME").ok())
        .ok_or_else(|| {
            WalkError::ConfigError(
                "No username provided (use --username or NETWALKER_USERNAME)".to_string(),
            )
        })?;

    let password = match password.or_else(|| std::env::var("NETWALKER_PASSWORD").ok()) {
        Some(stored) => Some(secrets::reveal(&stored)?),
        None => Some(secrets::prompt_password(&format!("Password for {}", username))?),
    };

    let enable_password =
        match enable_password.or_else(|| std::env::var("NETWALKER_ENABLE_PASSWORD").ok()) {
            Some(stored) => Some(secrets::reveal(&stored)?),
            None if settings.prompt_for_enable_password => {
                Some(secrets::prompt_password("Enable password")?)
            }
            None => None,
        };

    Ok(Credentials {
        username,
        password,
        enable_password,
    })
}

/// Parse the seed file: one `hostname:ip` pair per line, `#` comments and
/// blank lines allowed.
pub fn load_seed_file(path: &Path) -> Result<Vec<Seed>, WalkError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| WalkError::SeedError(format!("Cannot read {}: {}", path.display(), e)))?;
    let mut seeds = Vec::new();
    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        seeds.push(parse_seed(line).map_err(|e| {
            WalkError::SeedError(format!("{} line {}: {}", path.display(), lineno + 1, e))
        })?);
    }
    Ok(seeds)
}

/// Parse the `--seed-devices "NAME:IP[,NAME:IP…]"` flag value.
pub fn parse_seed_list(raw: &str) -> Result<Vec<Seed>, WalkError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| parse_seed(pair).map_err(WalkError::SeedError))
        .collect()
}

fn parse_seed(pair: &str) -> Result<Seed, String> {
    let Some((hostname, ip)) = pair.split_once(':') else {
        return Err(format!("Expected hostname:ip, got {:?}", pair));
    };
    let hostname = hostname.trim();
    let ip = ip.trim();
    if hostname.is_empty() || ip.is_empty() {
        return Err(format!("Expected hostname:ip, got {:?}", pair));
    }
    Ok(Seed {
        hostname: hostname.to_string(),
        ip: ip.to_string(),
    })
}

/// Merge seed sources; CLI seeds win on duplicate IPs.
pub fn merge_seeds(from_file: Vec<Seed>, from_cli: Vec<Seed>) -> Vec<Seed> {
    let mut merged = from_cli;
    for seed in from_file {
        if !merged.iter().any(|s| s.ip == seed.ip) {
            merged.push(seed);
        }
    }
    merged
}
