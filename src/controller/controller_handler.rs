use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinError;

use crate::child_process::{ChildExit, ChildProcess};
use crate::configuration::{Config, StorageBackend};
use crate::data_capture::{StdioCapture, StdioStream};
use crate::error_handling::types::{ChildError, GatewayError};
use crate::routing::{MessageRouter, StdinWriter};
use crate::storage::database_storage::DatabaseStorage;
use crate::storage::file_storage::FileStorage;
use crate::storage::memory_storage::MemoryStorage;
use crate::storage::{LogEmitter, LogStorage};
use crate::web_interface::WebServer;

/// Time granted to the log writer for draining its queue on shutdown.
const LOG_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// First thing that ended the gateway.
enum Outcome {
    ChildExited(Result<ChildExit, ChildError>),
    RouterStopped(Result<Result<(), GatewayError>, JoinError>),
    StdinStopped(Result<Result<(), ChildError>, JoinError>),
    ServerStopped(Result<(), JoinError>),
    Signal(&'static str),
}

/// Owns the gateway's lifecycle: child, router, log writer and web server.
pub struct Controller {
    pub config: Config,
}

impl Controller {
    pub fn new(config: Config) -> Result<Self, GatewayError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Runs the gateway until the child exits, a component fails or a termination signal
    /// arrives.
    ///
    /// Returns the process exit code: the child's code when it exited on its own, 1 when a
    /// component failed and 0 on a signal.
    pub async fn run(&self) -> Result<i32, GatewayError> {
        self.log_summary();
        let command = self.config.command()?;

        let storage = self.open_storage().await?;
        let (emitter, log_task) = match &storage {
            Some(storage) => {
                let (emitter, task) = LogEmitter::spawn(storage.clone(), self.config.log_queue);
                (emitter, Some(task))
            }
            None => (LogEmitter::disabled(), None),
        };

        let mut child = ChildProcess::spawn(command)?;
        let stdio = child.take_stdio()?;

        let (events, event_rx) = mpsc::channel(self.config.event_buffer);
        StdioCapture::spawn(StdioStream::Stdout, stdio.stdout, events.clone());
        StdioCapture::spawn(StdioStream::Stderr, stdio.stderr, events.clone());
        let (stdin, mut stdin_task) = StdinWriter::spawn(stdio.stdin);
        let mut router = tokio::spawn(MessageRouter::new(stdin, emitter).run(event_rx));

        let web = WebServer::new(&self.config, events, storage)?;
        let (addr, serving) = match web.bind() {
            Ok(bound) => bound,
            Err(e) => {
                router.abort();
                stdin_task.abort();
                child.kill().await;
                return Err(e.into());
            }
        };
        debug!("Web server bound to {}", addr);
        let mut server = tokio::spawn(serving);

        let outcome = tokio::select! {
            biased;
            exit = child.wait() => Outcome::ChildExited(exit),
            result = &mut router => Outcome::RouterStopped(result),
            result = &mut stdin_task => Outcome::StdinStopped(result),
            result = &mut server => Outcome::ServerStopped(result),
            signal = shutdown_signal() => Outcome::Signal(signal),
        };

        let code = match outcome {
            Outcome::ChildExited(Ok(exit)) => {
                info!("Child exited: code={:?}, signal={:?}", exit.code, exit.signal);
                exit.exit_code()
            }
            Outcome::ChildExited(Err(e)) => {
                error!("Lost track of the child: {}", e);
                child.kill().await;
                1
            }
            Outcome::RouterStopped(result) => {
                match result {
                    Ok(Ok(())) => error!("Router stopped unexpectedly"),
                    Ok(Err(e)) => error!("Router failed: {}", e),
                    Err(e) => error!("Router task failed: {}", e),
                }
                child.kill().await;
                1
            }
            Outcome::StdinStopped(result) => {
                match result {
                    Ok(Ok(())) => error!("Stdin writer stopped unexpectedly"),
                    Ok(Err(e)) => error!("Stdin writer failed: {}", e),
                    Err(e) => error!("Stdin writer task failed: {}", e),
                }
                child.kill().await;
                1
            }
            Outcome::ServerStopped(result) => {
                match result {
                    Ok(()) => error!("Web server stopped unexpectedly"),
                    Err(e) => error!("Web server task failed: {}", e),
                }
                child.kill().await;
                1
            }
            Outcome::Signal(name) => {
                info!("Caught {}, shutting down", name);
                child.kill().await;
                0
            }
        };

        server.abort();
        router.abort();
        stdin_task.abort();
        if let Some(task) = log_task {
            if tokio::time::timeout(LOG_FLUSH_TIMEOUT, task).await.is_err() {
                warn!("Log writer did not drain its queue in time, pending records are lost");
            }
        }
        Ok(code)
    }

    fn log_summary(&self) {
        let config = &self.config;
        info!("Starting stdiogate");
        info!("  - port: {}", config.port);
        info!("  - stdio: {}", config.stdio.as_deref().unwrap_or_default());
        info!("  - base URL: {}", config.base_url);
        info!("  - sse path: {}", config.sse_path);
        info!("  - message path: {}", config.message_path);
        match &config.cors {
            None => info!("  - CORS: disabled"),
            Some(origins) if origins.is_empty() => info!("  - CORS: any origin"),
            Some(origins) => info!("  - CORS: {}", origins.join(", ")),
        }
        info!(
            "  - health endpoints: {}",
            if config.health_endpoints.is_empty() {
                "(none)".to_string()
            } else {
                config.health_endpoints.join(", ")
            }
        );
        info!("  - headers: {}", config.headers.len());
        info!("  - log store: {:?}", config.log_store);
    }

    /// Opens the configured log store, `None` when logging is disabled.
    pub async fn open_storage(&self) -> Result<Option<Arc<dyn LogStorage>>, GatewayError> {
        let location = self.config.log_store_location();
        let storage: Arc<dyn LogStorage> = match self.config.log_store {
            StorageBackend::None => {
                info!("Log store disabled");
                return Ok(None);
            }
            StorageBackend::Memory => Arc::new(MemoryStorage::new()),
            StorageBackend::File => Arc::new(FileStorage::new(&location)?),
            StorageBackend::Sqlite => Arc::new(DatabaseStorage::new_file(&location).await?),
        };
        if self.config.log_store != StorageBackend::Memory {
            info!("Log store at {}", location.display());
        }
        Ok(Some(storage))
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut term, mut hup) = match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
        (Ok(term), Ok(hup)) => (term, hup),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Failed to install SIGTERM/SIGHUP handlers: {}", e);
            return ctrl_c().await;
        }
    };
    tokio::select! {
        name = ctrl_c() => name,
        _ = term.recv() => "SIGTERM",
        _ = hup.recv() => "SIGHUP",
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> &'static str {
    ctrl_c().await
}

async fn ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for SIGINT: {}", e);
        std::future::pending::<()>().await;
    }
    "SIGINT"
}
