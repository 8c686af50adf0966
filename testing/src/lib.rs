//! # Storefront Sync Testing
//!
//! Testing utilities and helpers for the storefront notification engine.
//!
//! This crate provides:
//! - In-memory implementations of the collaborator traits
//! - A running task pool harness
//! - Fixtures for requests, users and principals
//! - Property-based strategies for domain types
//!
//! ## Example
//!
//! ```
//! use storefront_sync_core::environment::Storage;
//! use storefront_sync_core::request::{RequestKind, RequestStatus};
//! use storefront_sync_testing::{InMemoryStorage, fixtures};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let storage = InMemoryStorage::new();
//! storage.insert_request(fixtures::order(42, RequestStatus::InProgress));
//!
//! let order = storage.load_request(RequestKind::Order, 42).await.unwrap();
//! assert_eq!(order.status, RequestStatus::InProgress);
//! # }
//! ```

use chrono::{DateTime, Utc};
use storefront_sync_core::environment::Clock;

/// In-memory storage
mod storage;

/// Recording messaging gateway and action sink
mod gateway;

pub use gateway::{AnswerRecord, EditRecord, RecordingGateway, RecordingSink, SendRecord};
pub use storage::InMemoryStorage;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use storefront_sync_testing::mocks::FixedClock;
    /// use storefront_sync_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(epoch())
    }

    /// 2025-01-01 00:00:00 UTC, the time every fixture is stamped with.
    #[must_use]
    pub fn epoch() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }
}

/// Test helpers and utilities.
pub mod helpers {
    use std::time::Duration;
    use storefront_sync_runtime::TaskPool;
    use tokio::sync::watch;
    use tokio::task::JoinHandle;

    /// Poll `check` every few milliseconds until it holds or two seconds pass.
    ///
    /// Returns whether the condition was eventually met.
    pub async fn eventually<F>(check: F) -> bool
    where
        F: FnMut() -> bool,
    {
        eventually_within(Duration::from_secs(2), check).await
    }

    /// [`eventually`] with an explicit deadline.
    pub async fn eventually_within<F>(deadline: Duration, mut check: F) -> bool
    where
        F: FnMut() -> bool,
    {
        tokio::time::timeout(deadline, async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .is_ok()
    }

    /// Let already-scheduled pool tasks run, for asserting that something
    /// did *not* happen.
    pub async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    /// A [`TaskPool`] with its workers running in the background.
    pub struct PoolHarness {
        pool: TaskPool,
        shutdown: watch::Sender<bool>,
        runner: JoinHandle<()>,
    }

    impl PoolHarness {
        /// Spawn a pool with `workers` workers and `capacity` queue slots.
        #[must_use]
        pub fn start(workers: usize, capacity: usize) -> Self {
            let pool = TaskPool::new(workers, capacity);
            let (shutdown, shutdown_rx) = watch::channel(false);
            let runner = tokio::spawn({
                let pool = pool.clone();
                async move { pool.run(shutdown_rx).await }
            });
            Self {
                pool,
                shutdown,
                runner,
            }
        }

        /// The running pool.
        #[must_use]
        pub const fn pool(&self) -> &TaskPool {
            &self.pool
        }

        /// A receiver on the shutdown signal, for contexts and pollers.
        #[must_use]
        pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
            self.shutdown.subscribe()
        }

        /// Signal shutdown and wait for the workers to exit.
        pub async fn stop(self) {
            let _ = self.shutdown.send(true);
            if let Err(e) = self.runner.await {
                tracing::warn!(error = %e, "Pool runner did not exit cleanly");
            }
        }
    }

    impl Default for PoolHarness {
        fn default() -> Self {
            Self::start(4, 64)
        }
    }

    /// Install a `tracing` subscriber writing to the test output.
    ///
    /// Safe to call from several tests; only the first call wins.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "storefront_sync=debug".into()),
            )
            .with_test_writer()
            .try_init();
    }
}

/// Fixtures for domain records.
pub mod fixtures {
    use super::mocks::epoch;
    use storefront_sync_core::request::{
        FeedbackType, NewServiceRequest, OrderSource, RequestKind, RequestStatus, ServiceRequest,
    };
    use storefront_sync_core::user::{InboundAction, Principal, User, UserRole};
    use uuid::Uuid;

    /// A guest order with the given id and status.
    #[must_use]
    pub fn order(id: i64, status: RequestStatus) -> ServiceRequest {
        ServiceRequest {
            kind: RequestKind::Order,
            id,
            uuid: fixture_uuid(0x8000, id),
            status,
            source: Some(OrderSource::Landing),
            feedback_type: None,
            name: "Anna".to_string(),
            phone: "+7 (900) 123-45-67".to_string(),
            content: "Balloon arch, 3m".to_string(),
            user_id: None,
            created_at: epoch(),
            updated_at: epoch(),
        }
    }

    /// A guest feedback item with the given id and status.
    #[must_use]
    pub fn feedback(id: i64, status: RequestStatus) -> ServiceRequest {
        ServiceRequest {
            kind: RequestKind::Feedback,
            id,
            uuid: fixture_uuid(0x9000, id),
            status,
            source: None,
            feedback_type: Some(FeedbackType::ManagerContact),
            name: "Boris".to_string(),
            phone: "+7 900 765 43 21".to_string(),
            content: "Please call me back.".to_string(),
            user_id: None,
            created_at: epoch(),
            updated_at: epoch(),
        }
    }

    fn fixture_uuid(variant: u128, id: i64) -> Uuid {
        let prefix: u128 = 0x0190_0000_0000_7000 << 64;
        Uuid::from_u128(prefix | (variant << 48) | u128::from(id.unsigned_abs()))
    }

    /// Draft of a new request of `kind`.
    #[must_use]
    pub fn draft(kind: RequestKind) -> NewServiceRequest {
        let template = match kind {
            RequestKind::Order => order(0, RequestStatus::Created),
            RequestKind::Feedback => feedback(0, RequestStatus::Created),
        };
        NewServiceRequest {
            uuid: Uuid::new_v4(),
            source: template.source,
            feedback_type: template.feedback_type,
            name: template.name,
            phone: template.phone,
            content: template.content,
            user_id: None,
            created_at: epoch(),
        }
    }

    /// A stored user linked to the chat principal `external_id`.
    #[must_use]
    pub fn user(id: i64, external_id: i64, role: UserRole) -> User {
        User {
            id,
            external_id: Some(external_id),
            uuid: Uuid::new_v4(),
            first_name: "Maria".to_string(),
            last_name: Some("Ivanova".to_string()),
            username: Some("maria_iv".to_string()),
            role,
            created_at: epoch(),
            updated_at: epoch(),
        }
    }

    /// A chat principal with the given platform id.
    #[must_use]
    pub fn principal(external_id: i64) -> Principal {
        Principal {
            external_id,
            first_name: "Maria".to_string(),
            last_name: Some("Ivanova".to_string()),
            username: Some("maria_iv".to_string()),
        }
    }

    /// A button press by `external_id` carrying `payload`.
    #[must_use]
    pub fn action(external_id: i64, payload: &str) -> InboundAction {
        InboundAction {
            id: format!("cb-{external_id}"),
            principal: principal(external_id),
            payload: payload.to_string(),
        }
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;
    use storefront_sync_core::request::{RequestKind, RequestStatus};

    /// Any request kind.
    pub fn request_kind() -> impl Strategy<Value = RequestKind> {
        prop_oneof![Just(RequestKind::Order), Just(RequestKind::Feedback)]
    }

    /// Any request status.
    pub fn request_status() -> impl Strategy<Value = RequestStatus> {
        prop_oneof![
            Just(RequestStatus::Created),
            Just(RequestStatus::InProgress),
            Just(RequestStatus::Reviewed),
        ]
    }
}

pub use helpers::{PoolHarness, eventually, settle};
pub use mocks::{FixedClock, test_clock};
