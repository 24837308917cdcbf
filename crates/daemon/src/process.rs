//! Service lifecycle
//!
//! [`start_service`] builds the registry, binds the listener and serves in
//! the background. [`spawn_service`] is the foreground variant used by the
//! binary: it also installs logging and waits for ctrl-c or SIGTERM. Either
//! way every helper is torn down once the HTTP server has stopped.

use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::http_server;
use crate::service_config::{Config, LOG_FILE_NAME};
use crate::service_state::State;

/// Handle to a running service
///
/// Cloneable. Dropping every handle stops the service as well.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    trigger: Arc<watch::Sender<bool>>,
    finished: watch::Receiver<bool>,
    local_addr: SocketAddr,
}

impl ShutdownHandle {
    /// Address the HTTP server actually bound
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Ask the service to stop; returns immediately
    pub fn shutdown(&self) {
        self.trigger.send_replace(true);
    }

    /// Wait until the server has stopped and every volume was released
    pub async fn wait(&self) {
        let mut finished = self.finished.clone();
        // An error means the service task is gone, which is just as final.
        let _ = finished.wait_for(|done| *done).await;
    }
}

/// Install the global tracing subscriber
///
/// Logs go to stderr. In debug mode they are also written to
/// `<log_dir>/zkvol.log`; the returned guard flushes that file on drop.
pub fn init_tracing(config: &Config) -> anyhow::Result<Option<WorkerGuard>> {
    let default_level = if config.debug() { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_layer, guard) = match (&config.supervisor.log_dir, config.debug()) {
        (Some(log_dir), true) => {
            fs::create_dir_all(log_dir)
                .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;
            let appender = tracing_appender::rolling::never(log_dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer)), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(guard)
}

/// Build the registry and serve the plugin API in the background
pub async fn start_service(config: &Config) -> anyhow::Result<(State, ShutdownHandle)> {
    let state = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || State::from_config(&config))
            .await
            .context("registry setup panicked")?
    };

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, "plugin API listening");

    let (trigger, mut triggered) = watch::channel(false);
    let (finished_tx, finished) = watch::channel(false);

    let router = http_server::router(state.clone());
    let registry = state.registry().clone();
    tokio::spawn(async move {
        let shutdown = async move {
            let _ = triggered.wait_for(|stop| *stop).await;
            tracing::info!("shutting down plugin API");
        };
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
        {
            tracing::error!("plugin API server failed: {}", e);
        }

        // Requests are drained; nothing can take new mount references now.
        if let Err(e) = tokio::task::spawn_blocking(move || registry.shutdown()).await {
            tracing::error!("registry shutdown panicked: {}", e);
        }
        finished_tx.send_replace(true);
    });

    Ok((
        state,
        ShutdownHandle {
            trigger: Arc::new(trigger),
            finished,
            local_addr,
        },
    ))
}

/// Run the daemon in the foreground until ctrl-c or SIGTERM
pub async fn spawn_service(config: &Config) -> anyhow::Result<()> {
    let _guard = init_tracing(config)?;
    tracing::warn!("zookeeper-volume v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::debug!(?config, "resolved configuration");

    let (_state, handle) = start_service(config).await?;

    tokio::select! {
        _ = shutdown_signal() => handle.shutdown(),
        _ = handle.wait() => tracing::warn!("plugin API stopped on its own"),
    }
    handle.wait().await;

    tracing::info!("daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}
