//! In-process backend.
//!
//! The original system fell back to a process-global map whenever its
//! remote table was unreachable. Here that map is just another adapter
//! behind the same trait, selected by configuration. It is also the
//! natural fixture for tests.

use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use super::{Backend, Version};
use crate::error::StoreError;
use crate::models::WhisperNode;

struct Versioned {
    node: WhisperNode,
    version: Version,
}

#[derive(Default)]
pub struct MemoryBackend {
    records: RwLock<HashMap<Uuid, Versioned>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for MemoryBackend {
    fn put(&self, node: &WhisperNode) -> Result<(), StoreError> {
        let mut records = self.records.write().expect("record map lock poisoned");
        if records.contains_key(&node.id) {
            return Err(StoreError::Conflict(node.id));
        }
        records.insert(
            node.id,
            Versioned {
                node: node.clone(),
                version: 0,
            },
        );
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<WhisperNode, StoreError> {
        let records = self.records.read().expect("record map lock poisoned");
        records
            .get(&id)
            .map(|r| r.node.clone())
            .ok_or(StoreError::NotFound(id))
    }

    fn list_all(&self) -> Result<Vec<WhisperNode>, StoreError> {
        let records = self.records.read().expect("record map lock poisoned");
        Ok(records.values().map(|r| r.node.clone()).collect())
    }

    fn load_children(&self, parent: Uuid) -> Result<(Vec<Uuid>, Version), StoreError> {
        let records = self.records.read().expect("record map lock poisoned");
        let record = records.get(&parent).ok_or(StoreError::NotFound(parent))?;
        Ok((record.node.children.clone(), record.version))
    }

    fn store_children(
        &self,
        parent: Uuid,
        expected: Version,
        children: &[Uuid],
    ) -> Result<bool, StoreError> {
        let mut records = self.records.write().expect("record map lock poisoned");
        let record = records.get_mut(&parent).ok_or(StoreError::NotFound(parent))?;
        if record.version != expected {
            return Ok(false);
        }
        record.node.children = children.to_vec();
        record.version += 1;
        Ok(true)
    }
}
