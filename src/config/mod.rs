//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::cache::EntityType;

mod cli;

pub use cli::{CliArgs, Command, PublishAction, PublishArgs, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "cachewire";
const ENV_PREFIX: &str = "CACHEWIRE";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 4100;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_NODE_ID: &str = "cachewire";
const DEFAULT_DEDUPE_WINDOW: usize = 4096;
const DEFAULT_DELIVERY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 200;
const DEFAULT_DELIVERY_TIMEOUT_SECS: u64 = 5;
const DEFAULT_CONTENT_REGION_LIMIT: usize = 2000;
const DEFAULT_ACCESS_RULE_REGION_LIMIT: usize = 500;
const DEFAULT_PREVIEW_LIMIT: usize = 1000;
const DEFAULT_DOCUMENT_LIMIT: usize = 5000;
const DEFAULT_DOMAIN_LIMIT: usize = 256;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cluster: ClusterSettings,
    pub cache: CacheSettings,
    pub content: ContentSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct ClusterSettings {
    pub node_id: String,
    /// Peer base URLs without trailing slash.
    pub peers: Vec<String>,
    pub dedupe_window: NonZeroUsize,
    pub delivery_attempts: NonZeroU32,
    pub retry_backoff: Duration,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub regions: Vec<EntityType>,
    pub content_region_limit: usize,
    pub access_rule_region_limit: usize,
    pub preview_limit: usize,
    pub document_limit: usize,
    pub domain_limit: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ContentSettings {
    /// TOML seed for the in-memory content store; empty store when unset.
    pub seed_file: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("cluster.peers")
            .with_list_parse_key("cache.regions")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Publish(_)) => {}
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    cluster: RawClusterSettings,
    cache: RawCacheSettings,
    content: RawContentSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(node_id) = overrides.cluster_node_id.as_ref() {
            self.cluster.node_id = Some(node_id.clone());
        }
        if !overrides.cluster_peers.is_empty() {
            self.cluster.peers = Some(overrides.cluster_peers.clone());
        }
        if let Some(attempts) = overrides.cluster_delivery_attempts {
            self.cluster.delivery_attempts = Some(attempts);
        }
        if let Some(path) = overrides.content_seed_file.as_ref() {
            self.content.seed_file = Some(path.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cluster,
            cache,
            content,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            cluster: build_cluster_settings(cluster)?,
            cache: build_cache_settings(cache)?,
            content: build_content_settings(content)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr =
        parse_socket_addr(&host, port).map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cluster_settings(cluster: RawClusterSettings) -> Result<ClusterSettings, LoadError> {
    let node_id = cluster
        .node_id
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_NODE_ID.to_string());
    if node_id.is_empty() {
        return Err(LoadError::invalid("cluster.node_id", "must not be empty"));
    }

    let peers = cluster
        .peers
        .unwrap_or_default()
        .into_iter()
        .map(|peer| peer.trim().to_string())
        .filter(|peer| !peer.is_empty())
        .map(|peer| normalize_peer(&peer))
        .collect::<Result<Vec<_>, _>>()?;

    let dedupe_window = NonZeroUsize::new(cluster.dedupe_window.unwrap_or(DEFAULT_DEDUPE_WINDOW))
        .ok_or_else(|| LoadError::invalid("cluster.dedupe_window", "must be greater than zero"))?;

    let delivery_attempts = non_zero_u32(
        cluster
            .delivery_attempts
            .unwrap_or(DEFAULT_DELIVERY_ATTEMPTS)
            .into(),
        "cluster.delivery_attempts",
    )?;

    let timeout_secs = cluster
        .timeout_seconds
        .unwrap_or(DEFAULT_DELIVERY_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "cluster.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ClusterSettings {
        node_id,
        peers,
        dedupe_window,
        delivery_attempts,
        retry_backoff: Duration::from_millis(
            cluster.retry_backoff_ms.unwrap_or(DEFAULT_RETRY_BACKOFF_MS),
        ),
        timeout: Duration::from_secs(timeout_secs),
    })
}

fn normalize_peer(peer: &str) -> Result<String, LoadError> {
    let url = Url::parse(peer)
        .map_err(|err| LoadError::invalid("cluster.peers", format!("`{peer}`: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "cluster.peers",
            format!("`{peer}`: scheme must be http or https"),
        ));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let regions = cache
        .regions
        .unwrap_or_else(|| vec![EntityType::Content, EntityType::PublicAccessEntry]);

    Ok(CacheSettings {
        regions,
        content_region_limit: non_zero_limit(
            cache.content_region_limit,
            DEFAULT_CONTENT_REGION_LIMIT,
            "cache.content_region_limit",
        )?,
        access_rule_region_limit: non_zero_limit(
            cache.access_rule_region_limit,
            DEFAULT_ACCESS_RULE_REGION_LIMIT,
            "cache.access_rule_region_limit",
        )?,
        preview_limit: non_zero_limit(
            cache.preview_limit,
            DEFAULT_PREVIEW_LIMIT,
            "cache.preview_limit",
        )?,
        document_limit: non_zero_limit(
            cache.document_limit,
            DEFAULT_DOCUMENT_LIMIT,
            "cache.document_limit",
        )?,
        domain_limit: non_zero_limit(
            cache.domain_limit,
            DEFAULT_DOMAIN_LIMIT,
            "cache.domain_limit",
        )?,
    })
}

fn build_content_settings(content: RawContentSettings) -> Result<ContentSettings, LoadError> {
    let seed_file = content.seed_file.filter(|path| !path.as_os_str().is_empty());
    Ok(ContentSettings { seed_file })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawClusterSettings {
    node_id: Option<String>,
    peers: Option<Vec<String>>,
    dedupe_window: Option<usize>,
    delivery_attempts: Option<u32>,
    retry_backoff_ms: Option<u64>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    regions: Option<Vec<EntityType>>,
    content_region_limit: Option<usize>,
    access_rule_region_limit: Option<usize>,
    preview_limit: Option<usize>,
    document_limit: Option<usize>,
    domain_limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawContentSettings {
    seed_file: Option<PathBuf>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_limit(
    value: Option<usize>,
    default: usize,
    key: &'static str,
) -> Result<usize, LoadError> {
    match value.unwrap_or(default) {
        0 => Err(LoadError::invalid(key, "must be greater than zero")),
        limit => Ok(limit),
    }
}
