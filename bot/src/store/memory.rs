//! Volatile store, used when database persistence is disabled.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use vpswatch_common::EndpointStatus;

use super::{Endpoint, EndpointId, EndpointStore, OwnerId, StoreError};

#[derive(Default)]
struct Inner {
    next_id: EndpointId,
    /// Kept in insertion (and therefore id) order.
    endpoints: Vec<Endpoint>,
}

/// Keeps endpoints in process memory. Everything is lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave a half-written record behind.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl EndpointStore for MemoryStore {
    async fn insert(
        &self,
        owner: OwnerId,
        host: &str,
        port: u16,
        label: &str,
    ) -> Result<Endpoint, StoreError> {
        let mut inner = self.lock();
        if inner
            .endpoints
            .iter()
            .any(|e| e.owner == owner && e.host == host)
        {
            return Err(StoreError::Duplicate {
                host: host.to_owned(),
            });
        }
        inner.next_id += 1;
        let endpoint = Endpoint {
            id: inner.next_id,
            owner,
            host: host.to_owned(),
            port,
            label: label.to_owned(),
            status: EndpointStatus::Unknown,
            created_at: Utc::now(),
        };
        inner.endpoints.push(endpoint.clone());
        Ok(endpoint)
    }

    async fn list_by_owner(&self, owner: OwnerId) -> Result<Vec<Endpoint>, StoreError> {
        Ok(self
            .lock()
            .endpoints
            .iter()
            .filter(|e| e.owner == owner)
            .cloned()
            .collect())
    }

    async fn find_by_owner_and_host(
        &self,
        owner: OwnerId,
        host: &str,
    ) -> Result<Option<Endpoint>, StoreError> {
        Ok(self
            .lock()
            .endpoints
            .iter()
            .find(|e| e.owner == owner && e.host == host)
            .cloned())
    }

    async fn find_by_owner_and_id(
        &self,
        owner: OwnerId,
        id: EndpointId,
    ) -> Result<Option<Endpoint>, StoreError> {
        Ok(self
            .lock()
            .endpoints
            .iter()
            .find(|e| e.owner == owner && e.id == id)
            .cloned())
    }

    async fn update_status(
        &self,
        id: EndpointId,
        status: EndpointStatus,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        Ok(inner
            .endpoints
            .iter_mut()
            .find(|e| e.id == id)
            .map(|e| e.status = status)
            .is_some())
    }

    async fn delete(&self, owner: OwnerId, id: EndpointId) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let before = inner.endpoints.len();
        inner
            .endpoints
            .retain(|e| !(e.owner == owner && e.id == id));
        Ok(inner.endpoints.len() != before)
    }

    async fn list_all(&self) -> Result<Vec<Endpoint>, StoreError> {
        Ok(self.lock().endpoints.clone())
    }
}
