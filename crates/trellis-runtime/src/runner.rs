//! The update loop.
//!
//! ```text
//! storage.init()
//!   └─ client.self_id()
//!       └─ loop next_update()
//!            ├─ Concurrent: spawn dispatch into a JoinSet
//!            └─ Sequential: await dispatch inline
//!          until shutdown (in-flight tasks aborted)
//!             or disconnect (in-flight tasks awaited)
//! storage.close()   exactly once, even if the loop panicked
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! let config = ConfigLoader::new().load()?;
//! Runner::from_config(client, router, &config)?.run().await?;
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::signal;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};
use trellis_core::{BoxedClient, BoxedUpdate};
use trellis_framework::Router;

use crate::config::{DispatchMode, TrellisConfig, build_storage};
use crate::dispatcher::Dispatcher;
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// Why the update loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Shutdown,
    Disconnected,
}

/// Pulls updates from a client and dispatches them.
pub struct Runner {
    client: BoxedClient,
    dispatcher: Dispatcher,
    mode: DispatchMode,
}

impl Runner {
    pub fn new(client: BoxedClient, dispatcher: Dispatcher) -> Self {
        Self {
            client,
            dispatcher,
            mode: DispatchMode::default(),
        }
    }

    /// Builds a runner from configuration.
    ///
    /// This initializes logging, selects the storage backend and the
    /// dispatch mode.
    pub fn from_config(
        client: BoxedClient,
        router: Router,
        config: &TrellisConfig,
    ) -> RuntimeResult<Self> {
        logging::init_from_config(&config.logging);

        let storage = build_storage(&config.storage)?;
        info!(
            log_level = %config.logging.level,
            mode = ?config.dispatch.mode,
            storage = ?config.storage.backend,
            "Runner initialized from configuration"
        );

        Ok(Self::new(client, Dispatcher::new(router, storage)).mode(config.dispatch.mode))
    }

    pub fn mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Runs until Ctrl+C, SIGTERM or disconnect.
    pub async fn run(self) -> RuntimeResult<()> {
        self.run_until(wait_for_signal()).await
    }

    /// Runs until `shutdown` resolves or the client disconnects.
    pub async fn run_until<F>(self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()> + Send,
    {
        let storage = self.dispatcher.storage().clone();
        storage.init().await?;
        debug!("Storage initialized");

        let served = AssertUnwindSafe(self.serve(shutdown)).catch_unwind().await;
        let closed = storage.close().await;
        debug!("Storage closed");

        match served {
            Ok(result) => {
                if let (Err(_), Err(e)) = (&result, &closed) {
                    error!(error = %e, "Failed to close storage");
                }
                result?;
                closed?;
                Ok(())
            }
            Err(panic) => {
                if let Err(e) = closed {
                    error!(error = %e, "Failed to close storage");
                }
                Err(RuntimeError::Panicked(panic_message(panic.as_ref())))
            }
        }
    }

    async fn serve<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()> + Send,
    {
        let self_id = self.client.self_id().await?;
        info!(self_id, mode = ?self.mode, "Runner started");

        let mut tasks = JoinSet::new();
        let mut shutdown = std::pin::pin!(shutdown);

        let reason = loop {
            tokio::select! {
                biased;

                () = &mut shutdown => break StopReason::Shutdown,

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    self.report(joined);
                }

                update = self.client.next_update() => match update {
                    Some(update) => match self.mode {
                        DispatchMode::Concurrent => {
                            tasks.spawn(dispatch_task(
                                self.dispatcher.clone(),
                                update,
                                self.client.clone(),
                                self_id,
                            ));
                        }
                        DispatchMode::Sequential => {
                            let run = dispatch_task(
                                self.dispatcher.clone(),
                                update,
                                self.client.clone(),
                                self_id,
                            );
                            if let Err(panic) = AssertUnwindSafe(run).catch_unwind().await {
                                error!(panic = %panic_message(panic.as_ref()), "Dispatch panicked");
                            }
                        }
                    },
                    None => break StopReason::Disconnected,
                },
            }
        };

        match reason {
            StopReason::Shutdown => {
                info!(in_flight = tasks.len(), "Shutdown requested");
                tasks.abort_all();
            }
            StopReason::Disconnected => {
                info!(in_flight = tasks.len(), "Client disconnected");
            }
        }
        while let Some(joined) = tasks.join_next().await {
            self.report(joined);
        }

        info!("Runner stopped");
        Ok(())
    }

    fn report(&self, joined: Result<(), JoinError>) {
        let Err(e) = joined else {
            return;
        };
        if e.is_cancelled() {
            if self.client.is_connected() {
                debug!("Dispatch task cancelled");
            }
        } else if e.is_panic() {
            let panic = e.into_panic();
            error!(panic = %panic_message(panic.as_ref()), "Dispatch task panicked");
        } else {
            warn!(error = %e, "Dispatch task failed");
        }
    }
}

async fn dispatch_task(
    dispatcher: Dispatcher,
    update: BoxedUpdate,
    client: BoxedClient,
    self_id: i64,
) {
    dispatcher.dispatch(update, client, self_id).await;
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Waits for Ctrl+C or SIGTERM.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler");
                wait_for_ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}
