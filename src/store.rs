//! The lineage store: forest invariants and the create/remix/read
//! operations, independent of which backend persists the nodes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::backend::Backend;
use crate::error::StoreError;
use crate::models::{compose_message, CreateRootInput, LinkState, RemixInput, WhisperNode};

/// Fixed literal between a parent's message and a remix continuation.
///
/// Applied consistently so a composed message maps back to its lineage
/// unambiguously.
pub const SEPARATOR: &str = " → ";

/// An inconsistency found by [`LineageStore::audit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineageIssue {
    /// A node names a parent that does not exist.
    DanglingParent { child: Uuid, parent: Uuid },
    /// A parent's children list names a node that does not exist.
    MissingChild { parent: Uuid, child: Uuid },
    /// A parent lists a child whose own parent pointer disagrees.
    MismatchedBacklink { parent: Uuid, child: Uuid },
    /// A persisted node whose parent has not linked it yet (the
    /// recoverable partial-failure state).
    UnlinkedChild { parent: Uuid, child: Uuid },
    /// The parent chain from this node loops back on itself.
    ParentCycle { node: Uuid },
}

pub struct LineageStore {
    backend: Arc<dyn Backend>,
}

impl LineageStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    // ============================================================
    // Create / remix
    // ============================================================

    /// Create a root whisper.
    ///
    /// The stored message is composed from the motif and phrase; an empty
    /// composition is `InvalidInput`.
    pub fn create_root(&self, input: CreateRootInput) -> Result<WhisperNode, StoreError> {
        let message = compose_message(input.motif.as_deref(), input.phrase.as_deref());
        if message.trim().is_empty() {
            return Err(StoreError::InvalidInput(
                "a whisper needs a motif and/or a message".into(),
            ));
        }

        let node = WhisperNode {
            id: Uuid::new_v4(),
            message,
            motif: clean(input.motif),
            phrase: clean(input.phrase),
            author: clean(input.author),
            timestamp: Utc::now(),
            parent: None,
            children: Vec::new(),
        };
        self.backend.put(&node)?;
        tracing::debug!(id = %node.id, "root whisper created");
        Ok(node)
    }

    /// Extend an existing whisper with a continuation.
    ///
    /// The child is durably persisted before the parent is touched, so a
    /// failed or abandoned append can never produce a parent link to a
    /// missing node. If the append exhausts its retries the child still
    /// exists; that is surfaced as `PartialFailure` carrying the node, and
    /// [`LineageStore::link_child`] can finish the job later.
    pub fn remix(&self, parent_id: Uuid, input: RemixInput) -> Result<WhisperNode, StoreError> {
        let parent = self.backend.get(parent_id)?;

        let continuation = input.continuation.trim();
        if continuation.is_empty() {
            return Err(StoreError::InvalidInput(
                "a remix needs a continuation".into(),
            ));
        }

        let node = WhisperNode {
            id: Uuid::new_v4(),
            message: format!("{}{}{}", parent.message, SEPARATOR, continuation),
            motif: parent.motif.clone(),
            phrase: None,
            author: clean(input.author),
            timestamp: Utc::now(),
            parent: Some(parent_id),
            children: Vec::new(),
        };

        self.backend.put(&node)?;
        if let Err(source) = self.backend.append_child(parent_id, node.id) {
            tracing::warn!(
                parent = %parent_id,
                child = %node.id,
                error = %source,
                "remix persisted but linking failed"
            );
            return Err(StoreError::PartialFailure {
                node: Box::new(node),
                source: Box::new(source),
            });
        }
        Ok(node)
    }

    /// Retry the parent link for a persisted-but-unlinked remix.
    ///
    /// Idempotent; linking an already-linked child is success.
    pub fn link_child(&self, parent_id: Uuid, child_id: Uuid) -> Result<(), StoreError> {
        let child = self.backend.get(child_id)?;
        if child.parent != Some(parent_id) {
            return Err(StoreError::InvalidInput(format!(
                "whisper {} does not name {} as its parent",
                child_id, parent_id
            )));
        }
        self.backend.append_child(parent_id, child_id)
    }

    // ============================================================
    // Reads
    // ============================================================

    pub fn get_node(&self, id: Uuid) -> Result<WhisperNode, StoreError> {
        self.backend.get(id)
    }

    /// Full snapshot, unordered. Callers partition roots from remixes by
    /// filtering on `parent`.
    pub fn get_forest(&self) -> Result<Vec<WhisperNode>, StoreError> {
        self.backend.list_all()
    }

    /// Resolve a node's children, skipping ids that no longer resolve.
    ///
    /// An unresolvable entry is logged, not fatal. It is the observable
    /// shadow of a partial failure elsewhere, and readers should not crash
    /// on it.
    pub fn resolve_children(&self, id: Uuid) -> Result<Vec<WhisperNode>, StoreError> {
        let node = self.backend.get(id)?;
        let mut resolved = Vec::with_capacity(node.children.len());
        for child_id in &node.children {
            match self.backend.get(*child_id) {
                Ok(child) => resolved.push(child),
                Err(StoreError::NotFound(_)) => {
                    tracing::warn!(parent = %id, child = %child_id, "skipping unresolvable child");
                }
                Err(other) => return Err(other),
            }
        }
        Ok(resolved)
    }

    /// Where a persisted node stands in the link lifecycle.
    ///
    /// Roots are linked trivially; a remix is linked once its parent's
    /// children contain it. Nothing ever leaves `PersistedLinked`.
    pub fn link_state(&self, node: &WhisperNode) -> Result<LinkState, StoreError> {
        let Some(parent_id) = node.parent else {
            return Ok(LinkState::PersistedLinked);
        };
        let parent = self.backend.get(parent_id)?;
        if parent.children.contains(&node.id) {
            Ok(LinkState::PersistedLinked)
        } else {
            Ok(LinkState::PersistedUnlinked)
        }
    }

    // ============================================================
    // Audit
    // ============================================================

    /// Check the whole forest against the lineage invariants.
    ///
    /// Read-only: reports dangling parents, one-way links, and parent
    /// cycles without mutating anything. An `UnlinkedChild` is the
    /// expected residue of an interrupted remix and is repairable with
    /// [`LineageStore::link_child`].
    pub fn audit(&self) -> Result<Vec<LineageIssue>, StoreError> {
        let nodes = self.backend.list_all()?;
        let by_id: HashMap<Uuid, &WhisperNode> = nodes.iter().map(|n| (n.id, n)).collect();
        let mut issues = Vec::new();

        for node in &nodes {
            if let Some(parent_id) = node.parent {
                match by_id.get(&parent_id) {
                    None => issues.push(LineageIssue::DanglingParent {
                        child: node.id,
                        parent: parent_id,
                    }),
                    Some(parent) if !parent.children.contains(&node.id) => {
                        issues.push(LineageIssue::UnlinkedChild {
                            parent: parent_id,
                            child: node.id,
                        })
                    }
                    Some(_) => {}
                }
            }

            for child_id in &node.children {
                match by_id.get(child_id) {
                    None => issues.push(LineageIssue::MissingChild {
                        parent: node.id,
                        child: *child_id,
                    }),
                    Some(child) if child.parent != Some(node.id) => {
                        issues.push(LineageIssue::MismatchedBacklink {
                            parent: node.id,
                            child: *child_id,
                        })
                    }
                    Some(_) => {}
                }
            }

            if has_parent_cycle(node, &by_id) {
                issues.push(LineageIssue::ParentCycle { node: node.id });
            }
        }

        if !issues.is_empty() {
            tracing::warn!(count = issues.len(), "lineage audit found inconsistencies");
        }
        Ok(issues)
    }
}

fn has_parent_cycle(node: &WhisperNode, by_id: &HashMap<Uuid, &WhisperNode>) -> bool {
    let mut seen = HashSet::new();
    let mut current = node.parent;
    seen.insert(node.id);
    while let Some(id) = current {
        if !seen.insert(id) {
            return true;
        }
        current = by_id.get(&id).and_then(|n| n.parent);
    }
    false
}

/// Optional free-text input: trimmed, empty collapses to `None`.
fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
