//! Typed settings assembled from layered sources.
//!
//! Precedence, lowest first: `config/default.toml`, `canopy.toml`, the file
//! named by `--config-file`, `CANOPY__SECTION__KEY` environment variables,
//! then command-line overrides.

mod cli;

pub use cli::{CliArgs, Command, MigrateArgs, ServeArgs, ServeOverrides};

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::CacheProviderKind;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "canopy";
const ENV_PREFIX: &str = "CANOPY";

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

/// Where node rows live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(format!(
                "unknown backend `{other}` (expected postgres or memory)"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub backend: StoreBackend,
    /// Required for the postgres backend and for `migrate`.
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
    pub acquire_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub provider: CacheProviderKind,
    pub ttl: Duration,
    pub max_entries: NonZeroUsize,
    pub redis_url: Option<String>,
    pub key_prefix: String,
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

fn invalid(key: &'static str, reason: impl Into<String>) -> LoadError {
    LoadError::Invalid {
        key,
        reason: reason.into(),
    }
}

/// Parse the process arguments and load settings for the chosen subcommand.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));
    if let Some(path) = cli.config_file.as_deref() {
        builder = builder.add_source(File::from(path).required(true));
    }
    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    match cli.command_or_default() {
        Command::Serve(args) => raw.apply_serve_overrides(&args.overrides),
        Command::Migrate(args) => raw.database.url = args.database_url.or(raw.database.url),
    }

    Settings::try_from(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
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
struct RawDatabaseSettings {
    backend: Option<String>,
    url: Option<String>,
    max_connections: Option<u32>,
    acquire_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    provider: Option<String>,
    ttl_seconds: Option<u64>,
    max_entries: Option<u64>,
    redis_url: Option<String>,
    key_prefix: Option<String>,
    connect_timeout_ms: Option<u64>,
    response_timeout_ms: Option<u64>,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, cli: &ServeOverrides) {
        fn set<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                slot.clone_from(value);
            }
        }

        set(&mut self.server.host, &cli.server_host);
        set(&mut self.server.port, &cli.server_port);
        set(
            &mut self.server.graceful_shutdown_seconds,
            &cli.server_graceful_shutdown_seconds,
        );
        set(&mut self.logging.level, &cli.log_level);
        set(&mut self.logging.json, &cli.log_json);
        set(&mut self.database.url, &cli.database_url);
        set(&mut self.database.backend, &cli.database_backend);
        set(&mut self.database.max_connections, &cli.database_max_connections);
        set(&mut self.cache.provider, &cli.cache_provider);
        set(&mut self.cache.ttl_seconds, &cli.cache_ttl_seconds);
        set(&mut self.cache.redis_url, &cli.redis_url);
    }
}

impl TryFrom<RawSettings> for Settings {
    type Error = LoadError;

    fn try_from(raw: RawSettings) -> Result<Self, Self::Error> {
        Ok(Self {
            server: raw.server.try_into()?,
            logging: raw.logging.try_into()?,
            database: raw.database.try_into()?,
            cache: raw.cache.try_into()?,
        })
    }
}

impl TryFrom<RawServerSettings> for ServerSettings {
    type Error = LoadError;

    fn try_from(raw: RawServerSettings) -> Result<Self, Self::Error> {
        let host = non_blank(raw.host).unwrap_or_else(|| "127.0.0.1".to_string());
        let port = raw.port.unwrap_or(8080);
        if port == 0 {
            return Err(invalid("server.port", "port must be greater than zero"));
        }
        let candidate = format!("{host}:{port}");
        let addr = candidate
            .parse()
            .map_err(|err| invalid("server.host", format!("invalid address `{candidate}`: {err}")))?;

        Ok(Self {
            addr,
            graceful_shutdown: positive_secs(
                raw.graceful_shutdown_seconds.unwrap_or(30),
                "server.graceful_shutdown_seconds",
            )?,
        })
    }
}

impl TryFrom<RawLoggingSettings> for LoggingSettings {
    type Error = LoadError;

    fn try_from(raw: RawLoggingSettings) -> Result<Self, Self::Error> {
        let level = match non_blank(raw.level) {
            Some(level) => LevelFilter::from_str(&level)
                .map_err(|err| invalid("logging.level", format!("failed to parse: {err}")))?,
            None => LevelFilter::INFO,
        };
        let format = if raw.json.unwrap_or(false) {
            LogFormat::Json
        } else {
            LogFormat::Compact
        };
        Ok(Self { level, format })
    }
}

impl TryFrom<RawDatabaseSettings> for DatabaseSettings {
    type Error = LoadError;

    fn try_from(raw: RawDatabaseSettings) -> Result<Self, Self::Error> {
        let backend = match non_blank(raw.backend) {
            Some(value) => value
                .parse()
                .map_err(|reason: String| invalid("database.backend", reason))?,
            None => StoreBackend::Postgres,
        };
        let max_connections = NonZeroU32::new(raw.max_connections.unwrap_or(10))
            .ok_or_else(|| invalid("database.max_connections", "must be greater than zero"))?;

        Ok(Self {
            backend,
            url: non_blank(raw.url),
            max_connections,
            acquire_timeout: positive_secs(
                raw.acquire_timeout_seconds.unwrap_or(5),
                "database.acquire_timeout_seconds",
            )?,
        })
    }
}

impl TryFrom<RawCacheSettings> for CacheSettings {
    type Error = LoadError;

    fn try_from(raw: RawCacheSettings) -> Result<Self, Self::Error> {
        let provider = match non_blank(raw.provider).as_deref() {
            None | Some("memory") => CacheProviderKind::Memory,
            Some("redis") => CacheProviderKind::Redis,
            Some("disabled") => CacheProviderKind::Disabled,
            Some(other) => {
                return Err(invalid(
                    "cache.provider",
                    format!("unknown provider `{other}` (expected memory, redis or disabled)"),
                ));
            }
        };

        let ttl_seconds = raw.ttl_seconds.unwrap_or(300);
        if ttl_seconds == 0 {
            return Err(invalid(
                "cache.ttl_seconds",
                "must be greater than zero; set provider = \"disabled\" to turn caching off",
            ));
        }

        let max_entries = usize::try_from(raw.max_entries.unwrap_or(1024))
            .ok()
            .and_then(NonZeroUsize::new)
            .ok_or_else(|| invalid("cache.max_entries", "must be greater than zero"))?;

        let redis_url = non_blank(raw.redis_url);
        if provider == CacheProviderKind::Redis && redis_url.is_none() {
            return Err(invalid("cache.redis_url", "required when provider is redis"));
        }

        let key_prefix = non_blank(raw.key_prefix).unwrap_or_else(|| "tree".to_string());
        if key_prefix.contains(char::is_whitespace) {
            return Err(invalid("cache.key_prefix", "must not contain whitespace"));
        }

        let connect_timeout_ms = raw.connect_timeout_ms.unwrap_or(2000);
        if connect_timeout_ms == 0 {
            return Err(invalid("cache.connect_timeout_ms", "must be greater than zero"));
        }
        let response_timeout_ms = raw.response_timeout_ms.unwrap_or(500);
        if response_timeout_ms == 0 {
            return Err(invalid("cache.response_timeout_ms", "must be greater than zero"));
        }

        Ok(Self {
            provider,
            ttl: Duration::from_secs(ttl_seconds),
            max_entries,
            redis_url,
            key_prefix,
            connect_timeout: Duration::from_millis(connect_timeout_ms),
            response_timeout: Duration::from_millis(response_timeout_ms),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn positive_secs(seconds: u64, key: &'static str) -> Result<Duration, LoadError> {
    if seconds == 0 {
        return Err(invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(seconds))
}
