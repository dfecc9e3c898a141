//! Storage traits — the contact store and the namespaced key-value store.
//!
//! The contact store is row-oriented and never assumed to support
//! multi-row transactions: every `write_fields` call is applied on its own,
//! last write wins.

use async_trait::async_trait;

use crate::contacts::{Contact, ContactPatch, NewContact, RowPosition};
use crate::error::DatabaseError;

/// Canonical persistence for contacts.
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Every contact, in store order, each carrying its position handle.
    async fn read_all(&self) -> Result<Vec<Contact>, DatabaseError>;

    /// The full row at `position`.
    async fn read_one(&self, position: RowPosition) -> Result<Option<Contact>, DatabaseError>;

    /// Look up a contact by its (normalized) email.
    async fn find_by_email(&self, email: &str) -> Result<Option<Contact>, DatabaseError>;

    /// The most recently added `limit` contacts, newest first.
    async fn read_recent(&self, limit: usize) -> Result<Vec<Contact>, DatabaseError>;

    /// Apply a partial update to one row.
    ///
    /// Returns `DatabaseError::NotFound` if no row exists at `position`.
    async fn write_fields(
        &self,
        position: RowPosition,
        patch: &ContactPatch,
    ) -> Result<(), DatabaseError>;

    /// Append a new contact, returning its position.
    async fn append(&self, contact: &NewContact) -> Result<RowPosition, DatabaseError>;
}

/// Namespaced string key-value storage for small pieces of engine state
/// (cache snapshots, the last-run marker, batch cursors).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, DatabaseError>;

    async fn set(&self, namespace: &str, key: &str, value: &str) -> Result<(), DatabaseError>;

    async fn delete(&self, namespace: &str, key: &str) -> Result<(), DatabaseError>;
}
