//! # axon0 — Protocol types for the axon agent orchestration kernel
//!
//! This crate defines the vocabulary every other axon crate speaks:
//!
//! | Module | What it provides |
//! |--------|------------------|
//! | [`id`] | Typed opaque identifiers (run, task, session, artifact) |
//! | [`event`] | The sealed event union and the immutable event record |
//! | [`log`] | The append-only [`EventLog`] contract and the run-scoped [`EventWriter`] |
//! | [`hash`] | Canonical JSON and SHA-256 content hashing |
//! | [`side_effect`] | Tool side-effect classification |
//!
//! ## Design Principle
//!
//! The event log is the single source of truth. Executors never expose
//! internal state directly — they emit events, and everything downstream
//! (replay, memory, monitoring) is a fold over the event stream. axon0
//! fixes the event vocabulary so that producers and consumers can evolve
//! independently.
//!
//! ## Sequencing
//!
//! Dense per-run sequence numbers are allocated by [`log::EventWriter`],
//! not by the log backend. Writer clones share one mutex-guarded counter,
//! and the lock is held across the append so seq order always equals
//! append order — including across parallel task workers.

#![deny(missing_docs)]

pub mod event;
pub mod hash;
pub mod id;
pub mod log;
pub mod side_effect;

// Re-exports for convenience
pub use event::{Event, EventKind};
pub use hash::{canonical_json, hash_value, sha256_hex, short_hash};
pub use id::{ArtifactId, RunId, SessionId, TaskId};
pub use log::{EventLog, EventWriter, LogError};
pub use side_effect::SideEffect;
