//! # Storefront Sync Runtime
//!
//! Runtime building blocks for the storefront notification engine.
//!
//! ## Core Components
//!
//! - **Task Pool**: fixed-size worker group draining one bounded queue; all
//!   background work runs here
//! - **Event Hub**: typed, independently subscribable event kinds that fan
//!   each publication out to the pool
//! - **Event Bus**: the four domain events (Created and Changed, for orders
//!   and for feedback)
//! - **Metrics**: Prometheus exporter
//!
//! ## Example
//!
//! ```
//! use storefront_sync_core::Context;
//! use storefront_sync_runtime::{Event, TaskPool};
//! use tokio::sync::watch;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = TaskPool::new(2, 16);
//! let greetings: Event<String> = Event::new("greetings", pool.clone());
//!
//! let subscription = greetings.subscribe(|_ctx, name| async move {
//!     tracing::info!(%name, "greeted");
//!     Ok(())
//! });
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let runner = tokio::spawn({
//!     let pool = pool.clone();
//!     async move { pool.run(shutdown_rx).await }
//! });
//!
//! greetings.publish(&Context::background(), "Ann".to_string()).await?;
//! subscription.unsubscribe();
//!
//! shutdown_tx.send(true)?;
//! runner.await?;
//! # Ok(())
//! # }
//! ```

/// Bounded worker pool
pub mod pool;

/// Typed publish/subscribe on top of the pool
pub mod event;

/// Created/Changed events for orders and feedback
pub mod bus;

/// Prometheus metrics for observability
pub mod metrics;

pub use bus::EventBus;
pub use event::{Event, Subscription};
pub use pool::{PoolError, Task, TaskPool};
