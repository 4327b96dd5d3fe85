use std::{io, net::SocketAddr};

use sqlx::migrate::MigrateError;
use thiserror::Error;

/// Startup and serving failures of the process infrastructure.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("failed to bind listener on {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("http server terminated")]
    Serve(#[source] io::Error),
    #[error("could not connect to postgres")]
    Connect(#[source] sqlx::Error),
    #[error("database migrations failed")]
    Migrate(#[source] MigrateError),
    #[error("tracing subscriber could not be installed: {0}")]
    Telemetry(String),
    #[error("{0}")]
    Configuration(String),
}
