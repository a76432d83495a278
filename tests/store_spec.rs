use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use speculate2::speculate;
use uuid::Uuid;
use whisper_hub::backend::MemoryBackend;
use whisper_hub::{
    Backend, CreateRootInput, LineageIssue, LineageStore, LinkState, RemixInput, StoreError,
    Version, WhisperNode, SEPARATOR,
};

fn root_input(phrase: &str) -> CreateRootInput {
    CreateRootInput {
        motif: None,
        phrase: Some(phrase.to_string()),
        author: None,
    }
}

fn remix_input(continuation: &str) -> RemixInput {
    RemixInput {
        continuation: continuation.to_string(),
        author: None,
    }
}

/// Memory backend whose conditional writes can be jammed, standing in for
/// a parent under hopeless contention. Everything else passes through.
#[derive(Default)]
struct Jammable {
    inner: MemoryBackend,
    jammed: AtomicBool,
}

impl Backend for Jammable {
    fn put(&self, node: &WhisperNode) -> Result<(), StoreError> {
        self.inner.put(node)
    }
    fn get(&self, id: Uuid) -> Result<WhisperNode, StoreError> {
        self.inner.get(id)
    }
    fn list_all(&self) -> Result<Vec<WhisperNode>, StoreError> {
        self.inner.list_all()
    }
    fn load_children(&self, parent: Uuid) -> Result<(Vec<Uuid>, Version), StoreError> {
        self.inner.load_children(parent)
    }
    fn store_children(
        &self,
        parent: Uuid,
        expected: Version,
        children: &[Uuid],
    ) -> Result<bool, StoreError> {
        if self.jammed.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.inner.store_children(parent, expected, children)
    }
}

speculate! {
    before {
        let backend = Arc::new(MemoryBackend::new());
        let store = LineageStore::new(backend.clone());
    }

    describe "create_root" {
        it "persists the supplied fields with no parent" {
            let node = store.create_root(CreateRootInput {
                motif: Some("🌱".into()),
                phrase: Some("Growth begins in silence.".into()),
                author: Some("Dexter".into()),
            }).expect("create failed");

            assert!(node.parent.is_none());
            assert!(node.children.is_empty());
            assert_eq!(node.message, "🌱 Growth begins in silence.");
            assert_eq!(node.motif.as_deref(), Some("🌱"));
            assert_eq!(node.phrase.as_deref(), Some("Growth begins in silence."));
            assert_eq!(node.author.as_deref(), Some("Dexter"));

            let loaded = store.get_node(node.id).expect("get failed");
            assert_eq!(loaded, node);
        }

        it "accepts a motif-only whisper" {
            let node = store.create_root(CreateRootInput {
                motif: Some("🔥".into()),
                phrase: None,
                author: None,
            }).expect("create failed");
            assert_eq!(node.message, "🔥");
        }

        it "rejects an empty composition" {
            let err = store.create_root(CreateRootInput {
                motif: Some("".into()),
                phrase: Some("   ".into()),
                author: Some("".into()),
            }).unwrap_err();
            assert!(matches!(err, StoreError::InvalidInput(_)));
        }

        it "collapses blank author to none" {
            let node = store.create_root(CreateRootInput {
                motif: None,
                phrase: Some("anonymous".into()),
                author: Some("   ".into()),
            }).expect("create failed");
            assert!(node.author.is_none());
        }
    }

    describe "remix" {
        it "extends the parent message and links the child" {
            let root = store.create_root(root_input("Growth begins in silence.")).unwrap();
            let child = store
                .remix(root.id, remix_input("but community makes it grow."))
                .expect("remix failed");

            assert_eq!(
                child.message,
                "Growth begins in silence. → but community makes it grow."
            );
            assert_eq!(child.parent, Some(root.id));
            assert_eq!(store.get_node(root.id).unwrap().children, vec![child.id]);
        }

        it "uses the fixed separator so lineage is recoverable" {
            let root = store.create_root(root_input("a")).unwrap();
            let child = store.remix(root.id, remix_input("b")).unwrap();
            let grandchild = store.remix(child.id, remix_input("c")).unwrap();
            assert_eq!(grandchild.message, format!("a{}b{}c", SEPARATOR, SEPARATOR));
        }

        it "inherits the parent motif" {
            let root = store.create_root(CreateRootInput {
                motif: Some("🧵".into()),
                phrase: Some("thread".into()),
                author: None,
            }).unwrap();
            let child = store.remix(root.id, remix_input("pulled")).unwrap();
            assert_eq!(child.motif.as_deref(), Some("🧵"));
            assert!(child.phrase.is_none());
        }

        it "rejects a blank continuation without creating anything" {
            let root = store.create_root(root_input("anchor")).unwrap();
            let err = store.remix(root.id, remix_input("   ")).unwrap_err();
            assert!(matches!(err, StoreError::InvalidInput(_)));
            assert_eq!(store.get_forest().unwrap().len(), 1);
        }

        it "fails with not found for an unknown parent" {
            let err = store.remix(Uuid::new_v4(), remix_input("x")).unwrap_err();
            assert!(matches!(err, StoreError::NotFound(_)));
        }

        it "resolve_children returns the remix" {
            let root = store.create_root(root_input("Growth begins in silence.")).unwrap();
            store.remix(root.id, remix_input("x")).unwrap();

            let children = store.resolve_children(root.id).unwrap();
            assert_eq!(children.len(), 1);
            assert_eq!(
                children[0].message,
                format!("Growth begins in silence.{}x", SEPARATOR)
            );
        }
    }

    describe "get_node and get_forest" {
        it "get_node fails with not found for an unknown id" {
            let err = store.get_node(Uuid::new_v4()).unwrap_err();
            assert!(matches!(err, StoreError::NotFound(_)));
        }

        it "get_forest partitions into roots and remixes by parent" {
            let a = store.create_root(root_input("a")).unwrap();
            let b = store.create_root(root_input("b")).unwrap();
            store.remix(a.id, remix_input("a2")).unwrap();

            let forest = store.get_forest().unwrap();
            let roots: Vec<_> = forest.iter().filter(|n| n.is_root()).collect();
            let remixes: Vec<_> = forest.iter().filter(|n| !n.is_root()).collect();
            assert_eq!(roots.len(), 2);
            assert_eq!(remixes.len(), 1);
            assert!(roots.iter().any(|n| n.id == b.id));
        }
    }

    describe "link_child" {
        it "is idempotent for an already linked child" {
            let root = store.create_root(root_input("anchor")).unwrap();
            let child = store.remix(root.id, remix_input("x")).unwrap();

            store.link_child(root.id, child.id).unwrap();
            store.link_child(root.id, child.id).unwrap();
            assert_eq!(store.get_node(root.id).unwrap().children, vec![child.id]);
        }

        it "refuses to link a node under the wrong parent" {
            let a = store.create_root(root_input("a")).unwrap();
            let b = store.create_root(root_input("b")).unwrap();
            let child = store.remix(a.id, remix_input("x")).unwrap();

            let err = store.link_child(b.id, child.id).unwrap_err();
            assert!(matches!(err, StoreError::InvalidInput(_)));
        }
    }

    describe "partial failure" {
        before {
            let jammable = Arc::new(Jammable::default());
            let store = LineageStore::new(jammable.clone());
        }

        it "surfaces the persisted node when linking cannot land" {
            let root = store.create_root(root_input("anchor")).unwrap();
            jammable.jammed.store(true, Ordering::SeqCst);

            let err = store.remix(root.id, remix_input("stranded")).unwrap_err();
            let StoreError::PartialFailure { node, source } = err else {
                panic!("expected partial failure");
            };
            assert!(matches!(*source, StoreError::Contention { .. }));

            // The node is durably there, just unlinked.
            let stranded = store.get_node(node.id).unwrap();
            assert_eq!(store.link_state(&stranded).unwrap(), LinkState::PersistedUnlinked);
            assert!(store.resolve_children(root.id).unwrap().is_empty());

            // Once the contention clears, link_child completes the remix.
            jammable.jammed.store(false, Ordering::SeqCst);
            store.link_child(root.id, stranded.id).unwrap();
            assert_eq!(store.link_state(&stranded).unwrap(), LinkState::PersistedLinked);
            assert_eq!(store.get_node(root.id).unwrap().children, vec![stranded.id]);
        }
    }

    describe "link_state" {
        it "roots are trivially linked" {
            let root = store.create_root(root_input("anchor")).unwrap();
            assert_eq!(store.link_state(&root).unwrap(), LinkState::PersistedLinked);
        }
    }

    describe "audit" {
        it "reports nothing for a healthy forest" {
            let root = store.create_root(root_input("anchor")).unwrap();
            store.remix(root.id, remix_input("x")).unwrap();
            store.remix(root.id, remix_input("y")).unwrap();
            assert!(store.audit().unwrap().is_empty());
        }

        it "reports an unlinked child as repairable" {
            let root = store.create_root(root_input("anchor")).unwrap();
            // Persist a child directly without linking it.
            let orphan = WhisperNode {
                id: Uuid::new_v4(),
                message: "anchor → stray".into(),
                motif: None,
                phrase: None,
                author: None,
                timestamp: chrono::Utc::now(),
                parent: Some(root.id),
                children: Vec::new(),
            };
            backend.put(&orphan).unwrap();

            let issues = store.audit().unwrap();
            assert_eq!(
                issues,
                vec![LineageIssue::UnlinkedChild { parent: root.id, child: orphan.id }]
            );

            store.link_child(root.id, orphan.id).unwrap();
            assert!(store.audit().unwrap().is_empty());
        }

        it "reports dangling parents and missing children" {
            let ghost_parent = Uuid::new_v4();
            let node = WhisperNode {
                id: Uuid::new_v4(),
                message: "adrift".into(),
                motif: None,
                phrase: None,
                author: None,
                timestamp: chrono::Utc::now(),
                parent: Some(ghost_parent),
                children: vec![Uuid::new_v4()],
            };
            backend.put(&node).unwrap();

            let issues = store.audit().unwrap();
            assert!(issues.iter().any(|i| matches!(
                i,
                LineageIssue::DanglingParent { child, .. } if *child == node.id
            )));
            assert!(issues.iter().any(|i| matches!(
                i,
                LineageIssue::MissingChild { parent, .. } if *parent == node.id
            )));
        }
    }
}
