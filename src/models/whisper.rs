use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One immutable text fragment with optional ancestry.
///
/// Whispers form a forest: a node with `parent: None` is a root, and every
/// remix names exactly one parent. All fields are write-once except
/// `children`, which is append-only: the only sanctioned mutation in the
/// store is appending a freshly persisted child id.
///
/// # Lifecycle
/// A node is created exactly once, either as a root or as a remix of an
/// existing node. Nodes are never edited or deleted. A remix whose append
/// to the parent has not yet landed is valid but unlinked (see
/// [`LinkState`]); a later `link_child` completes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WhisperNode {
    pub id: Uuid,
    /// Fully composed display text: the root text, or the parent's message
    /// plus the remix separator plus the continuation.
    pub message: String,
    pub motif: Option<String>,
    pub phrase: Option<String>,
    pub author: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// `None` marks a root. Never changes after creation.
    pub parent: Option<Uuid>,
    /// Ids of nodes that named this node as parent, in link order.
    /// Append-only; never reordered or shrunk.
    #[serde(default)]
    pub children: Vec<Uuid>,
}

impl WhisperNode {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Input for creating a root whisper.
///
/// The stored `message` is composed from `motif` and `phrase` via
/// [`compose_message`]; creation fails with `InvalidInput` when the
/// composition trims to nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateRootInput {
    /// Short symbolic tag, typically an emoji.
    pub motif: Option<String>,
    /// The remixable text itself.
    pub phrase: Option<String>,
    pub author: Option<String>,
}

/// Input for remixing an existing whisper.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemixInput {
    /// Continuation appended to the parent's message.
    pub continuation: String,
    pub author: Option<String>,
}

/// Observable linkage state of a persisted node.
///
/// Roots are trivially linked. A remix is `PersistedUnlinked` between its
/// own durable write and the append into its parent's children; nothing
/// ever leaves `PersistedLinked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    PersistedUnlinked,
    PersistedLinked,
}

/// Compose a root whisper's display message from its motif and phrase.
///
/// Both present → `"{motif} {phrase}"`; otherwise whichever is non-empty.
pub fn compose_message(motif: Option<&str>, phrase: Option<&str>) -> String {
    let motif = motif.unwrap_or("").trim();
    let phrase = phrase.unwrap_or("").trim();
    match (motif.is_empty(), phrase.is_empty()) {
        (false, false) => format!("{} {}", motif, phrase),
        (false, true) => motif.to_string(),
        _ => phrase.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_joins_motif_and_phrase() {
        assert_eq!(
            compose_message(Some("🌱"), Some("Growth begins in silence.")),
            "🌱 Growth begins in silence."
        );
    }

    #[test]
    fn compose_handles_missing_parts() {
        assert_eq!(compose_message(Some("🌱"), None), "🌱");
        assert_eq!(compose_message(None, Some("alone")), "alone");
        assert_eq!(compose_message(None, None), "");
        assert_eq!(compose_message(Some("  "), Some("  ")), "");
    }

    #[test]
    fn children_default_to_empty_on_deserialize() {
        let node: WhisperNode = serde_json::from_value(serde_json::json!({
            "id": "c9bb4f3e-8a8e-4f2e-9f6a-0a4c8f2d1b11",
            "message": "hello",
            "motif": null,
            "phrase": "hello",
            "author": null,
            "timestamp": "2024-05-01T12:00:00Z",
            "parent": null
        }))
        .unwrap();
        assert!(node.children.is_empty());
        assert!(node.is_root());
    }
}
