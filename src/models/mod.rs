//! Domain model for the whisper lineage store.
//!
//! A single entity, [`WhisperNode`], plus the plain input values the
//! presentation layer hands to the store. Nodes are immutable once
//! created; only the `children` list grows, and only through the store's
//! append protocol.

mod whisper;

pub use whisper::*;
