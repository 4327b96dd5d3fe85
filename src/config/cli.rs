//! Command-line surface of the `canopy` server binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

#[derive(Debug, Parser)]
#[command(name = "canopy", version, about = "Canopy tree node service")]
pub struct CliArgs {
    /// Extra configuration file layered over `config/default.toml` and `canopy.toml`.
    #[arg(long = "config-file", env = "CANOPY_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl CliArgs {
    /// The subcommand to run; `serve` when none was given.
    pub fn command_or_default(&self) -> Command {
        self.command
            .clone()
            .unwrap_or_else(|| Command::Serve(Box::default()))
    }
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Apply pending database migrations and exit.
    Migrate(MigrateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MigrateArgs {
    /// Database to migrate, overriding configuration.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Node store backend (postgres|memory).
    #[arg(long = "database-backend", value_name = "BACKEND")]
    pub database_backend: Option<String>,

    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Tree cache provider (memory|redis|disabled).
    #[arg(long = "cache-provider", value_name = "PROVIDER")]
    pub cache_provider: Option<String>,

    #[arg(long = "cache-ttl-seconds", value_name = "SECONDS")]
    pub cache_ttl_seconds: Option<u64>,

    #[arg(long = "redis-url", value_name = "URL")]
    pub redis_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_serve() {
        let args = CliArgs::parse_from(["canopy"]);
        assert!(args.command.is_none());
        assert!(matches!(args.command_or_default(), Command::Serve(_)));
    }

    #[test]
    fn migrate_takes_a_database_url() {
        let args = CliArgs::parse_from(["canopy", "migrate", "--database-url", "postgres://example"]);

        match args.command_or_default() {
            Command::Migrate(migrate) => {
                assert_eq!(migrate.database_url.as_deref(), Some("postgres://example"));
            }
            other => panic!("wrong command parsed: {other:?}"),
        }
    }

    #[test]
    fn serve_accepts_overrides() {
        let args = CliArgs::parse_from([
            "canopy",
            "serve",
            "--server-host",
            "0.0.0.0",
            "--cache-provider",
            "disabled",
            "--log-json",
            "yes",
        ]);

        match args.command_or_default() {
            Command::Serve(serve) => {
                assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
                assert_eq!(serve.overrides.cache_provider.as_deref(), Some("disabled"));
                assert_eq!(serve.overrides.log_json, Some(true));
            }
            other => panic!("wrong command parsed: {other:?}"),
        }
    }
}
