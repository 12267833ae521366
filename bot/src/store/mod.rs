//! Endpoint persistence.
//!
//! The rest of the bot only talks to [`EndpointStore`]. Uniqueness of
//! `(owner, host)` is enforced by the implementations themselves, never by
//! a check-then-insert in the callers.

mod memory;
mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error as ThisError;
use vpswatch_common::{Address, EndpointStatus};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Chat id of the user owning an endpoint.
pub type OwnerId = i64;
/// Store assigned, creation ordered endpoint id.
pub type EndpointId = i64;

/// A monitored address registered by one owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub id: EndpointId,
    pub owner: OwnerId,
    pub host: String,
    pub port: u16,
    /// Display name; the host when none was given.
    pub label: String,
    pub status: EndpointStatus,
    pub created_at: DateTime<Utc>,
}

impl Endpoint {
    #[must_use]
    pub fn address(&self) -> Address {
        Address {
            host: self.host.clone(),
            port: self.port,
        }
    }
}

/// Errors returned by [`EndpointStore`] implementations.
#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("Endpoint '{host}' is already registered")]
    Duplicate { host: String },
    #[error("Endpoint store unavailable")]
    Unavailable(#[source] eyre::Report),
}

/// CRUD over endpoint records.
///
/// Implementations must keep `(owner, host)` unique atomically and return
/// listings in creation order.
///
/// # Errors
///
/// Every operation returns [`StoreError::Unavailable`] when the backend fails.
/// [`EndpointStore::insert`] additionally returns [`StoreError::Duplicate`].
#[async_trait]
pub trait EndpointStore: Send + Sync {
    /// Registers a new endpoint with status [`EndpointStatus::Unknown`].
    async fn insert(
        &self,
        owner: OwnerId,
        host: &str,
        port: u16,
        label: &str,
    ) -> Result<Endpoint, StoreError>;

    async fn list_by_owner(&self, owner: OwnerId) -> Result<Vec<Endpoint>, StoreError>;

    async fn find_by_owner_and_host(
        &self,
        owner: OwnerId,
        host: &str,
    ) -> Result<Option<Endpoint>, StoreError>;

    async fn find_by_owner_and_id(
        &self,
        owner: OwnerId,
        id: EndpointId,
    ) -> Result<Option<Endpoint>, StoreError>;

    /// Returns whether a row was updated; `false` means the endpoint is gone.
    async fn update_status(&self, id: EndpointId, status: EndpointStatus)
    -> Result<bool, StoreError>;

    /// Deletes an endpoint of `owner`. Returns whether anything was deleted.
    async fn delete(&self, owner: OwnerId, id: EndpointId) -> Result<bool, StoreError>;

    /// Every endpoint of every owner, for the monitor sweep.
    async fn list_all(&self) -> Result<Vec<Endpoint>, StoreError>;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Behaviour every store implementation has to share.
    pub(crate) async fn exercise_contract(store: &dyn EndpointStore) {
        let a = store.insert(1, "10.0.0.5", 22, "web").await.unwrap();
        let b = store.insert(1, "example.org", 443, "example.org").await.unwrap();
        let other = store.insert(2, "10.0.0.5", 2222, "theirs").await.unwrap();

        assert_eq!(a.status, EndpointStatus::Unknown);
        assert!(a.id < b.id, "ids must follow creation order");
        assert_eq!(other.port, 2222);

        // Duplicate (owner, host) leaves the store untouched.
        let dup = store.insert(1, "10.0.0.5", 80, "again").await;
        assert!(
            matches!(dup, Err(StoreError::Duplicate { ref host }) if host == "10.0.0.5"),
            "expected duplicate, got {dup:?}"
        );
        let mine = store.list_by_owner(1).await.unwrap();
        assert_eq!(mine, vec![a.clone(), b.clone()]);

        assert_eq!(
            store.find_by_owner_and_host(1, "example.org").await.unwrap(),
            Some(b.clone())
        );
        assert_eq!(store.find_by_owner_and_host(2, "example.org").await.unwrap(), None);
        assert_eq!(store.find_by_owner_and_id(1, a.id).await.unwrap(), Some(a.clone()));
        assert_eq!(store.find_by_owner_and_id(2, a.id).await.unwrap(), None);

        assert!(store.update_status(a.id, EndpointStatus::Up).await.unwrap());
        assert_eq!(
            store.find_by_owner_and_id(1, a.id).await.unwrap().unwrap().status,
            EndpointStatus::Up
        );
        assert!(!store.update_status(9_999, EndpointStatus::Down).await.unwrap());

        // Deleting is scoped to the owner.
        assert!(!store.delete(2, a.id).await.unwrap());
        assert!(store.delete(1, a.id).await.unwrap());
        assert!(!store.delete(1, a.id).await.unwrap());

        let all = store.list_all().await.unwrap();
        assert_eq!(
            all.iter().map(|e| e.id).collect::<Vec<_>>(),
            vec![b.id, other.id]
        );

        // The host is free again after deletion.
        store.insert(1, "10.0.0.5", 22, "web again").await.unwrap();
    }
}
