//! Inbound dispatch: long-polls `getUpdates` and hands button presses to an
//! [`ActionSink`].
//!
//! Presses run on their own tasks, never on the task pool. The sink
//! republishes into the pool, and a worker blocked on its own full queue
//! would never drain it.

use crate::client::TelegramClient;
use crate::types::Update;
use std::sync::Arc;
use std::time::Duration;
use storefront_sync_core::Context;
use storefront_sync_core::environment::ActionSink;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Long-polling loop for callback queries.
///
/// Each callback query becomes one spawned task calling
/// [`ActionSink::on_action`]. The poll offset always advances past every
/// received update, so a press is dispatched at most once.
pub struct UpdatePoller {
    client: TelegramClient,
    sink: Arc<dyn ActionSink>,
    timeout: Duration,
    error_pause: Duration,
}

impl UpdatePoller {
    /// Create a poller waiting up to `timeout` per `getUpdates` call.
    #[must_use]
    pub fn new(
        client: TelegramClient,
        sink: Arc<dyn ActionSink>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            sink,
            timeout,
            error_pause: Duration::from_secs(1),
        }
    }

    /// Builder: how long to wait before polling again after a failed poll
    #[must_use]
    pub const fn with_error_pause(mut self, pause: Duration) -> Self {
        self.error_pause = pause;
        self
    }

    /// Poll until `shutdown` turns `true`, then wait for in-flight presses.
    ///
    /// Handlers receive a context cancelled by the same signal.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        let ctx = Context::with_cancellation(shutdown);
        let mut in_flight = JoinSet::new();
        let mut offset = 0;

        tracing::info!(timeout_secs = self.timeout.as_secs(), "Update poller started");

        loop {
            let polled = tokio::select! {
                biased;

                () = ctx.cancelled() => break,

                result = self.client.get_updates(offset, self.timeout) => result,
            };

            match polled {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        self.dispatch(&ctx, update, &mut in_flight);
                    }
                    while let Some(joined) = in_flight.try_join_next() {
                        log_join(joined);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, offset, "Failed to poll updates");
                    tokio::select! {
                        () = ctx.cancelled() => break,
                        () = tokio::time::sleep(self.error_pause) => {}
                    }
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            log_join(joined);
        }
        tracing::info!(offset, "Update poller stopped");
    }

    fn dispatch(&self, ctx: &Context, update: Update, in_flight: &mut JoinSet<()>) {
        let Some(action) = update.callback_query.and_then(|query| query.into_action()) else {
            tracing::debug!(update_id = update.update_id, "Ignoring update without callback data");
            return;
        };

        let ctx = ctx.clone().with_request_id(format!("callback-{}", action.id));
        let sink = Arc::clone(&self.sink);
        in_flight.spawn(async move { sink.on_action(ctx, action).await });
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "Action handler task failed");
    }
}

impl std::fmt::Debug for UpdatePoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdatePoller")
            .field("client", &self.client)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
