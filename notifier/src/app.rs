//! Application wiring and lifecycle.
//!
//! [`Application`] owns the task pool, the event bus and everything
//! subscribed to it:
//!
//! 1. **Startup**: connect storage, build the chat gateway when the bot is
//!    enabled, subscribe the synchronizer
//! 2. **Runtime**: run the pool workers and the update poller
//! 3. **Shutdown**: on the signal, flip the shutdown watch so workers stop
//!    pulling tasks and the poller stops polling, then wait for both with a
//!    timeout
//!
//! With the bot disabled neither the synchronizer nor the poller exist.
//! Producers still publish; the events simply have no subscribers.

use crate::actions::ActionHandler;
use crate::config::Config;
use crate::listeners::Synchronizer;
use crate::render::Renderer;
use crate::requests::RequestService;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use storefront_sync_core::StorageError;
use storefront_sync_core::environment::{ActionSink, Clock, MessagingGateway, Storage, SystemClock};
use storefront_sync_postgres::PostgresStorage;
use storefront_sync_runtime::{EventBus, Subscription, TaskPool};
use storefront_sync_telegram::{TelegramClient, TelegramError, TelegramGateway, UpdatePoller};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Startup failures.
#[derive(Error, Debug)]
pub enum AppError {
    /// Storage could not be reached or migrated
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The Telegram gateway could not be configured
    #[error("telegram error: {0}")]
    Telegram(#[from] TelegramError),
}

/// A fully wired notifier, ready to run.
pub struct Application {
    pool: TaskPool,
    bus: Arc<EventBus>,
    requests: Arc<RequestService>,
    actions: Option<Arc<ActionHandler>>,
    poller: Option<UpdatePoller>,
    subscriptions: Vec<Subscription>,
    shutdown_timeout: Duration,
}

impl Application {
    /// Connect to `PostgreSQL` and Telegram as configured.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] if the database is unreachable, a migration
    /// fails, or the bot is enabled without a token.
    pub async fn build(config: &Config) -> Result<Self, AppError> {
        info!("Connecting to database...");
        let storage =
            PostgresStorage::connect(&config.database.url, config.database.max_connections).await?;
        storage.migrate().await?;
        info!("Database connected and migrated");

        let storage: Arc<dyn Storage> = Arc::new(storage);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        if !config.telegram.enabled {
            info!("Telegram bot disabled; requests will not be mirrored");
            return Ok(Self::assemble(config, storage, None, clock));
        }

        let token = config
            .telegram
            .token
            .clone()
            .ok_or(TelegramError::MissingToken)?;
        let client = TelegramClient::new(token).with_api_url(config.telegram.api_url.as_str());
        let gateway: Arc<dyn MessagingGateway> = Arc::new(TelegramGateway::new(client.clone()));

        let app = Self::assemble(config, storage, Some(gateway), clock);
        let poller = app.actions.as_ref().map(|actions| {
            let sink: Arc<dyn ActionSink> = actions.clone();
            UpdatePoller::new(client, sink, config.telegram.poll_timeout())
        });
        info!(group_id = config.telegram.group_id, "Telegram bot enabled");

        Ok(Self { poller, ..app })
    }

    /// Wire the engine around already constructed collaborators.
    ///
    /// Without a gateway the synchronizer is not subscribed and no action
    /// handler exists.
    #[must_use]
    pub fn assemble(
        config: &Config,
        storage: Arc<dyn Storage>,
        gateway: Option<Arc<dyn MessagingGateway>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let pool = TaskPool::new(config.workers.pool_size, config.workers.queue_capacity);
        let bus = Arc::new(EventBus::new(&pool));

        let mut subscriptions = Vec::new();
        let actions = gateway.map(|gateway| {
            let synchronizer = Arc::new(Synchronizer::new(
                Arc::clone(&storage),
                Arc::clone(&gateway),
                Renderer::new(config.telegram.deep_link_base.as_str()),
                config.telegram.group_id,
            ));
            subscriptions = synchronizer.register(&bus);

            Arc::new(ActionHandler::new(
                Arc::clone(&storage),
                gateway,
                Arc::clone(&bus),
                Arc::clone(&clock),
                config.moderator_roles.clone(),
            ))
        });

        let requests = Arc::new(RequestService::new(storage, Arc::clone(&bus), clock));

        Self {
            pool,
            bus,
            requests,
            actions,
            poller: None,
            subscriptions,
            shutdown_timeout: config.server.shutdown_timeout(),
        }
    }

    /// The task pool every handler runs on.
    #[must_use]
    pub const fn pool(&self) -> &TaskPool {
        &self.pool
    }

    /// The domain events.
    #[must_use]
    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    /// Producer-side request operations.
    #[must_use]
    pub fn requests(&self) -> Arc<RequestService> {
        Arc::clone(&self.requests)
    }

    /// The chat action handler, if the bot is enabled.
    #[must_use]
    pub fn actions(&self) -> Option<Arc<ActionHandler>> {
        self.actions.clone()
    }

    /// Number of synchronizer handlers subscribed to the bus.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Run until `signal` resolves, then shut down gracefully.
    pub async fn run(self, signal: impl Future<Output = ()>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut handles: Vec<(&'static str, JoinHandle<()>)> = Vec::with_capacity(2);
        let pool = self.pool.clone();
        let pool_shutdown = shutdown_rx.clone();
        handles.push((
            "task pool",
            tokio::spawn(async move { pool.run(pool_shutdown).await }),
        ));
        if let Some(poller) = self.poller {
            handles.push((
                "update poller",
                tokio::spawn(async move { poller.run(shutdown_rx).await }),
            ));
        }

        info!(subscriptions = self.subscriptions.len(), "Notifier running");
        signal.await;
        info!("Shutdown signal received, stopping...");

        let _ = shutdown_tx.send(true);
        await_shutdown(handles, self.shutdown_timeout).await;

        for subscription in self.subscriptions {
            subscription.unsubscribe();
        }
        info!("Graceful shutdown complete");
    }
}

async fn await_shutdown(handles: Vec<(&'static str, JoinHandle<()>)>, timeout: Duration) {
    for (task, handle) in handles {
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => info!(task, "Stopped gracefully"),
            Ok(Err(e)) => warn!(task, error = %e, "Task failed"),
            Err(_) => warn!(task, "Shutdown timed out"),
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received SIGTERM signal"),
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("pool", &self.pool)
            .field("chat_enabled", &self.actions.is_some())
            .field("subscriptions", &self.subscriptions.len())
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish_non_exhaustive()
    }
}
