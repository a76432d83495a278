//! Local file backend.
//!
//! The whole forest lives in one JSON document keyed by id, the same
//! layout the original prototype kept in `whispers.json`. Writes go
//! through a temp file and an atomic rename. The file has no native
//! conditional-write primitive, so a single writer lock makes the whole
//! read-modify-write critical section exclusive. The version token is the
//! children count, which is monotonic because children only ever grow.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{Backend, Version};
use crate::codec;
use crate::error::StoreError;
use crate::models::WhisperNode;

pub struct FileBackend {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileBackend {
    /// Open (or create room for) a forest document at `path`.
    ///
    /// Legacy records are normalized through the codec and, if anything
    /// needed repair, the document is rewritten once before the backend
    /// accepts traffic.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }

        let backend = Self {
            path,
            write_lock: Mutex::new(()),
        };
        backend.repair_on_open()?;
        Ok(backend)
    }

    fn repair_on_open(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().expect("file writer lock poisoned");
        if !self.path.exists() {
            return Ok(());
        }
        let raw = self.load_raw()?;
        let mut repaired_any = false;
        let mut nodes = Vec::with_capacity(raw.len());
        for value in raw.values() {
            let (node, repaired) = codec::decode(value)?;
            repaired_any |= repaired;
            nodes.push(node);
        }
        if repaired_any {
            tracing::info!(
                path = %self.path.display(),
                records = nodes.len(),
                "normalized legacy whisper document"
            );
            self.write_nodes(&nodes)?;
        }
        Ok(())
    }

    fn load_raw(&self) -> Result<Map<String, Value>, StoreError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        if text.trim().is_empty() {
            return Ok(Map::new());
        }
        let value: Value = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        value
            .as_object()
            .cloned()
            .ok_or_else(|| StoreError::Backend(anyhow::anyhow!("forest document is not an object")))
    }

    fn load_nodes(&self) -> Result<Vec<WhisperNode>, StoreError> {
        self.load_raw()?
            .values()
            .map(|v| codec::decode(v).map(|(node, _)| node))
            .collect()
    }

    /// Replace the document atomically: temp file, fsync, rename.
    fn write_nodes(&self, nodes: &[WhisperNode]) -> Result<(), StoreError> {
        let mut map = Map::new();
        for node in nodes {
            map.insert(node.id.to_string(), codec::encode(node)?);
        }
        let text = serde_json::to_string_pretty(&Value::Object(map))?;

        let tmp = tmp_path(&self.path);
        {
            use std::io::Write;
            let mut file = fs::File::create(&tmp)
                .with_context(|| format!("creating {}", tmp.display()))?;
            file.write_all(text.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

impl Backend for FileBackend {
    fn put(&self, node: &WhisperNode) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().expect("file writer lock poisoned");
        let mut nodes = self.load_nodes()?;
        if nodes.iter().any(|n| n.id == node.id) {
            return Err(StoreError::Conflict(node.id));
        }
        nodes.push(node.clone());
        self.write_nodes(&nodes)
    }

    fn get(&self, id: Uuid) -> Result<WhisperNode, StoreError> {
        self.load_nodes()?
            .into_iter()
            .find(|n| n.id == id)
            .ok_or(StoreError::NotFound(id))
    }

    fn list_all(&self) -> Result<Vec<WhisperNode>, StoreError> {
        self.load_nodes()
    }

    fn load_children(&self, parent: Uuid) -> Result<(Vec<Uuid>, Version), StoreError> {
        let node = self.get(parent)?;
        let version = node.children.len() as Version;
        Ok((node.children, version))
    }

    fn store_children(
        &self,
        parent: Uuid,
        expected: Version,
        children: &[Uuid],
    ) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().expect("file writer lock poisoned");
        let mut nodes = self.load_nodes()?;
        let node = nodes
            .iter_mut()
            .find(|n| n.id == parent)
            .ok_or(StoreError::NotFound(parent))?;
        if node.children.len() as Version != expected {
            return Ok(false);
        }
        node.children = children.to_vec();
        self.write_nodes(&nodes)?;
        Ok(true)
    }
}
