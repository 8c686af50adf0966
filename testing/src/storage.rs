use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use storefront_sync_core::StorageError;
use storefront_sync_core::environment::Storage;
use storefront_sync_core::request::{MessageMapping, NewServiceRequest, RequestKind, ServiceRequest};
use storefront_sync_core::user::{AuthorProfile, NewUser, User};
use uuid::Uuid;

#[derive(Debug, Default)]
struct State {
    requests: HashMap<(RequestKind, i64), ServiceRequest>,
    users: HashMap<i64, User>,
    mappings: Vec<MessageMapping>,
    next_request_id: i64,
    next_user_id: i64,
    status_writes: usize,
    fail_save_status: bool,
    fail_create_mapping: bool,
    fail_resolve_author: bool,
}

/// Mock storage.
///
/// Keeps requests, users and mappings in memory. Individual operations can
/// be switched into failure mode to exercise downstream-error paths.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    state: Arc<Mutex<State>>,
}

impl InMemoryStorage {
    /// Create an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StorageError> {
        self.state
            .lock()
            .map_err(|_| StorageError::Database("storage lock poisoned".to_string()))
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard)
    }

    /// Seed a request, replacing any request with the same kind and id.
    pub fn insert_request(&self, request: ServiceRequest) {
        self.with_state(|state| {
            state.next_request_id = state.next_request_id.max(request.id);
            state.requests.insert((request.kind, request.id), request);
        });
    }

    /// Seed a user, replacing any user with the same id.
    pub fn insert_user(&self, user: User) {
        self.with_state(|state| {
            state.next_user_id = state.next_user_id.max(user.id);
            state.users.insert(user.id, user);
        });
    }

    /// Current snapshot of a request.
    #[must_use]
    pub fn request(&self, kind: RequestKind, id: i64) -> Option<ServiceRequest> {
        self.with_state(|state| state.requests.get(&(kind, id)).cloned())
    }

    /// Every user, in id order.
    #[must_use]
    pub fn users(&self) -> Vec<User> {
        self.with_state(|state| {
            let mut users: Vec<_> = state.users.values().cloned().collect();
            users.sort_by_key(|user| user.id);
            users
        })
    }

    /// Every mapping row recorded for a request, in insertion order.
    #[must_use]
    pub fn mappings_for(&self, kind: RequestKind, request_id: i64) -> Vec<MessageMapping> {
        self.with_state(|state| {
            state
                .mappings
                .iter()
                .filter(|m| m.kind == kind && m.request_id == request_id)
                .copied()
                .collect()
        })
    }

    /// Number of successful [`Storage::save_status`] calls.
    #[must_use]
    pub fn status_writes(&self) -> usize {
        self.with_state(|state| state.status_writes)
    }

    /// Make [`Storage::save_status`] fail.
    pub fn fail_save_status(&self, fail: bool) {
        self.with_state(|state| state.fail_save_status = fail);
    }

    /// Make [`Storage::create_mapping`] fail.
    pub fn fail_create_mapping(&self, fail: bool) {
        self.with_state(|state| state.fail_create_mapping = fail);
    }

    /// Make [`Storage::resolve_author`] fail.
    pub fn fail_resolve_author(&self, fail: bool) {
        self.with_state(|state| state.fail_resolve_author = fail);
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn load_request(
        &self,
        kind: RequestKind,
        id: i64,
    ) -> Result<ServiceRequest, StorageError> {
        self.lock()?
            .requests
            .get(&(kind, id))
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn load_request_by_uuid(
        &self,
        kind: RequestKind,
        uuid: Uuid,
    ) -> Result<ServiceRequest, StorageError> {
        self.lock()?
            .requests
            .values()
            .find(|r| r.kind == kind && r.uuid == uuid)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn create_request(
        &self,
        kind: RequestKind,
        draft: &NewServiceRequest,
    ) -> Result<ServiceRequest, StorageError> {
        let mut state = self.lock()?;
        if state.requests.values().any(|r| r.uuid == draft.uuid) {
            return Err(StorageError::Conflict(format!("uuid {} already exists", draft.uuid)));
        }
        state.next_request_id += 1;
        let request = draft.clone().into_request(kind, state.next_request_id);
        state.requests.insert((kind, request.id), request.clone());
        Ok(request)
    }

    async fn save_status(&self, request: &ServiceRequest) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        if state.fail_save_status {
            return Err(StorageError::Database("save_status failure injected".to_string()));
        }
        let stored = state
            .requests
            .get_mut(&(request.kind, request.id))
            .ok_or(StorageError::NotFound)?;
        stored.status = request.status;
        stored.updated_at = request.updated_at;
        state.status_writes += 1;
        Ok(())
    }

    async fn create_mapping(&self, mapping: &MessageMapping) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        if state.fail_create_mapping {
            return Err(StorageError::Database("create_mapping failure injected".to_string()));
        }
        state.mappings.push(*mapping);
        Ok(())
    }

    async fn get_mapping(
        &self,
        kind: RequestKind,
        request_id: i64,
    ) -> Result<MessageMapping, StorageError> {
        self.lock()?
            .mappings
            .iter()
            .filter(|m| m.kind == kind && m.request_id == request_id)
            .max_by_key(|m| m.message_id)
            .copied()
            .ok_or(StorageError::NotFound)
    }

    async fn resolve_author(&self, user_id: i64) -> Result<AuthorProfile, StorageError> {
        let state = self.lock()?;
        if state.fail_resolve_author {
            return Err(StorageError::Database("resolve_author failure injected".to_string()));
        }
        state
            .users
            .get(&user_id)
            .map(AuthorProfile::from)
            .ok_or(StorageError::NotFound)
    }

    async fn find_user_by_external_id(&self, external_id: i64) -> Result<User, StorageError> {
        self.lock()?
            .users
            .values()
            .find(|u| u.external_id == Some(external_id))
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn create_user(&self, user: &NewUser) -> Result<User, StorageError> {
        let mut state = self.lock()?;
        if user.external_id.is_some()
            && state.users.values().any(|u| u.external_id == user.external_id)
        {
            return Err(StorageError::Conflict("external id already linked".to_string()));
        }
        state.next_user_id += 1;
        let created = user.clone().into_user(state.next_user_id);
        state.users.insert(created.id, created.clone());
        Ok(created)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use crate::fixtures;
    use storefront_sync_core::request::RequestStatus;

    #[tokio::test]
    async fn latest_mapping_wins() {
        let storage = InMemoryStorage::new();
        for message_id in [10, 30, 20] {
            storage
                .create_mapping(&MessageMapping {
                    kind: RequestKind::Order,
                    request_id: 7,
                    chat_id: -100,
                    message_id,
                })
                .await
                .unwrap();
        }

        let mapping = storage.get_mapping(RequestKind::Order, 7).await.unwrap();
        assert_eq!(mapping.message_id, 30);
        assert_eq!(
            storage.get_mapping(RequestKind::Feedback, 7).await,
            Err(StorageError::NotFound)
        );
    }

    #[tokio::test]
    async fn save_status_updates_only_status_fields() {
        let storage = InMemoryStorage::new();
        storage.insert_request(fixtures::order(1, RequestStatus::Created));

        let mut changed = fixtures::order(1, RequestStatus::Reviewed);
        changed.name = "ignored".to_string();
        storage.save_status(&changed).await.unwrap();

        let stored = storage.request(RequestKind::Order, 1).unwrap();
        assert_eq!(stored.status, RequestStatus::Reviewed);
        assert_eq!(stored.name, "Anna");
        assert_eq!(storage.status_writes(), 1);
    }

    #[tokio::test]
    async fn created_requests_get_fresh_ids() {
        let storage = InMemoryStorage::new();
        storage.insert_request(fixtures::order(5, RequestStatus::Created));

        let created = storage
            .create_request(RequestKind::Order, &fixtures::draft(RequestKind::Order))
            .await
            .unwrap();
        assert_eq!(created.id, 6);
        assert_eq!(created.status, RequestStatus::Created);
    }
}
