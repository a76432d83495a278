//! whisper-hub: a lineage store for immutable text fragments.
//!
//! Whispers are short user-authored fragments. Anyone can remix one by
//! appending a continuation, which creates a new immutable node pointing
//! at its parent. Over time the records form a forest of disjoint trees.
//! This crate is the store underneath that workflow: the data model, the
//! forest invariants, and the concurrency-safe create/remix/read
//! operations, over interchangeable storage backends (in-process map,
//! local JSON file, sqlite document table, PostgREST-style row API).
//!
//! The one real piece of design tension is the append: two users remixing
//! the same whisper at the same time must both end up in its `children`.
//! Every backend therefore exposes a versioned read and a conditional
//! write, and [`backend::Backend::append_child`] runs the shared
//! compare-and-retry loop on top. Presentation concerns (forms,
//! navigation, rendering) live outside this crate and talk to
//! [`store::LineageStore`] through plain values.

pub mod backend;
pub mod codec;
pub mod config;
pub mod error;
pub mod link;
pub mod models;
pub mod store;

pub use backend::{Backend, Version};
pub use config::BackendConfig;
pub use error::StoreError;
pub use models::{CreateRootInput, LinkState, RemixInput, WhisperNode};
pub use store::{LineageIssue, LineageStore, SEPARATOR};
