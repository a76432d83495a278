//! Storage backends.
//!
//! One polymorphic contract, [`Backend`], with interchangeable
//! implementations: an in-process map, a local JSON file, a sqlite
//! document table, and a PostgREST-style row API. The lineage store never
//! sees which one is behind the `Arc<dyn Backend>`.
//!
//! The lost-update protection for concurrent appends lives here exactly
//! once, in [`Backend::append_child`]: read the children with a version
//! token, conditionally write, retry on a moved version. Implementations
//! only supply the versioned read and the guarded write.

mod file;
mod memory;
mod rest;
mod sqlite;

pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use rest::RestBackend;
pub use sqlite::SqliteBackend;

use uuid::Uuid;

use crate::error::StoreError;
use crate::models::WhisperNode;

/// Opaque per-record version token. Bumped by every accepted children
/// write; a guarded write against a stale token is rejected.
pub type Version = u64;

/// Compare-and-swap rounds before an append gives up with `Contention`.
pub const MAX_APPEND_ATTEMPTS: u32 = 8;

/// Uniform CRUD + conditional-write contract over durable storage.
///
/// All operations touch external storage and perform no internal retries;
/// retry policy belongs to [`Backend::append_child`] and, above it, the
/// store's callers.
pub trait Backend: Send + Sync {
    /// Persist a brand-new node. Durable before returning `Ok`.
    ///
    /// Fails with `Conflict` if the id already exists.
    fn put(&self, node: &WhisperNode) -> Result<(), StoreError>;

    /// Fetch one node, `NotFound` if absent.
    fn get(&self, id: Uuid) -> Result<WhisperNode, StoreError>;

    /// Snapshot of all nodes, unordered with respect to lineage. Each
    /// call re-reads current state.
    fn list_all(&self) -> Result<Vec<WhisperNode>, StoreError>;

    /// Read a parent's children together with its version token.
    fn load_children(&self, parent: Uuid) -> Result<(Vec<Uuid>, Version), StoreError>;

    /// Conditionally replace a parent's children.
    ///
    /// Accepted only while the record still carries `expected`; returns
    /// `Ok(false)` when the version moved underneath the caller (no write
    /// happened) and `Ok(true)` when the write landed and bumped the
    /// version.
    fn store_children(
        &self,
        parent: Uuid,
        expected: Version,
        children: &[Uuid],
    ) -> Result<bool, StoreError>;

    /// Atomically append `child` to `parent`'s children.
    ///
    /// Idempotent: a child already present is success without a write, so
    /// retried appends never duplicate an entry. Concurrent appends to the
    /// same parent each land exactly once; after [`MAX_APPEND_ATTEMPTS`]
    /// lost compare-and-swap rounds the append fails with `Contention`.
    fn append_child(&self, parent: Uuid, child: Uuid) -> Result<(), StoreError> {
        for attempt in 1..=MAX_APPEND_ATTEMPTS {
            let (mut children, version) = self.load_children(parent)?;
            if children.contains(&child) {
                return Ok(());
            }
            children.push(child);
            if self.store_children(parent, version, &children)? {
                return Ok(());
            }
            tracing::debug!(
                %parent,
                %child,
                attempt,
                "children moved under conditional write, retrying"
            );
        }
        tracing::warn!(%parent, %child, "append retries exhausted");
        Err(StoreError::Contention {
            parent,
            attempts: MAX_APPEND_ATTEMPTS,
        })
    }
}
