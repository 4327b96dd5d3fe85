use std::{process, sync::Arc};

use canopy::{
    application::{error::AppError, repos::NodesRepo, tree::TreeService},
    cache::{self, CacheConfig, TreeCache},
    config::{self, CliArgs, Command, Settings, StoreBackend},
    infra::{
        db::{self, PgNodeStore},
        error::InfraError,
        http::{self, RouterState},
        memory::InMemoryNodes,
        telemetry,
    },
};
use sqlx::PgPool;
use tokio::{net::TcpListener, signal, sync::Notify, task::JoinError};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    let chain = error.causes();
    let emit = || error!(error = %error, causes = ?chain, "canopy stopped");

    if dispatcher::has_been_set() {
        emit();
    } else {
        let fallback = tracing_subscriber::fmt()
            .with_max_level(Level::ERROR)
            .finish();
        dispatcher::with_default(&Dispatch::new(fallback), emit);
    }
}

async fn run() -> Result<(), AppError> {
    let (cli, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    match cli.command_or_default() {
        Command::Serve(_) => serve(cli, settings).await,
        Command::Migrate(_) => {
            let pool = open_postgres(&settings).await?;
            db::migrate(&pool).await.map_err(InfraError::Migrate)?;
            info!(target = "canopy::migrate", "Migrations applied");
            Ok(())
        }
    }
}

async fn open_postgres(settings: &Settings) -> Result<PgPool, AppError> {
    let url = settings.database.url.as_deref().ok_or_else(|| {
        InfraError::Configuration("database.url is required for the postgres backend".into())
    })?;
    let pool = db::connect_pool(
        url,
        settings.database.max_connections.get(),
        settings.database.acquire_timeout,
    )
    .await
    .map_err(InfraError::Connect)?;
    Ok(pool)
}

async fn node_store(settings: &Settings) -> Result<Arc<dyn NodesRepo>, AppError> {
    if settings.database.backend == StoreBackend::Memory {
        warn!(
            target = "canopy::store",
            "Using the in-memory node store; data is lost on exit"
        );
        return Ok(Arc::new(InMemoryNodes::new()));
    }

    let pool = open_postgres(settings).await?;
    db::migrate(&pool).await.map_err(InfraError::Migrate)?;
    info!(
        target = "canopy::store",
        max_connections = settings.database.max_connections.get(),
        "Postgres node store ready"
    );
    Ok(Arc::new(PgNodeStore::new(pool)))
}

async fn tree_cache(settings: &Settings) -> Result<TreeCache, AppError> {
    let cache_config = CacheConfig::from(&settings.cache);
    let provider = cache::provider_from_config(&cache_config)?;

    // An unreachable backend only degrades reads to misses.
    if let Err(err) = provider.initialize().await {
        warn!(
            target = "canopy::cache",
            provider = provider.name(),
            error = %err,
            "Tree cache backend unavailable at startup; continuing degraded"
        );
    }

    info!(
        target = "canopy::cache",
        provider = provider.name(),
        ttl_seconds = cache_config.ttl_seconds,
        "Tree cache ready"
    );
    Ok(TreeCache::new(provider))
}

async fn serve(cli: CliArgs, settings: Settings) -> Result<(), AppError> {
    let tree = Arc::new(TreeService::new(
        node_store(&settings).await?,
        tree_cache(&settings).await?,
    ));
    #[cfg(unix)]
    tokio::spawn(reload_on_hangup(cli, tree.cache().clone()));
    #[cfg(not(unix))]
    drop(cli);
    let router = http::build_router(RouterState::new(tree));

    let addr = settings.server.addr;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| InfraError::Bind { addr, source })?;
    info!(target = "canopy::server", addr = %addr, "Listening");

    let stopping = Arc::new(Notify::new());
    let signalled = stopping.clone();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        shutdown_signal().await;
        signalled.notify_one();
    });
    let mut task = tokio::spawn(async move { server.await });

    tokio::select! {
        joined = &mut task => return finished(joined),
        _ = stopping.notified() => {}
    }

    let grace = settings.server.graceful_shutdown;
    info!(
        target = "canopy::server",
        grace_seconds = grace.as_secs(),
        "Draining in-flight requests"
    );
    match tokio::time::timeout(grace, &mut task).await {
        Ok(joined) => finished(joined),
        Err(_) => {
            warn!(
                target = "canopy::server",
                "Grace period elapsed; aborting remaining connections"
            );
            task.abort();
            Ok(())
        }
    }
}

fn finished(joined: Result<std::io::Result<()>, JoinError>) -> Result<(), AppError> {
    match joined {
        Ok(Ok(())) => {
            info!(target = "canopy::server", "Server stopped");
            Ok(())
        }
        Ok(Err(err)) => Err(InfraError::Serve(err).into()),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

/// Re-reads configuration on SIGHUP and applies the new cache TTL. Other
/// settings need a restart.
#[cfg(unix)]
async fn reload_on_hangup(cli: CliArgs, cache: TreeCache) {
    let mut hangups = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(err) => {
            warn!(target = "canopy::config", error = %err, "Failed to listen for SIGHUP");
            return;
        }
    };

    while hangups.recv().await.is_some() {
        match config::load(&cli) {
            Ok(settings) => {
                cache.set_ttl(settings.cache.ttl).await;
                info!(
                    target = "canopy::config",
                    ttl_seconds = settings.cache.ttl.as_secs(),
                    "Tree cache TTL reloaded"
                );
            }
            Err(err) => warn!(
                target = "canopy::config",
                error = %err,
                "Configuration reload failed; keeping the current TTL"
            ),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(target = "canopy::server", error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(target = "canopy::server", error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
