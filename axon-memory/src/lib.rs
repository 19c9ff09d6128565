#![deny(missing_docs)]
//! Memory derivation for axon — everything here is a view over state the
//! kernel already owns.
//!
//! [`episodic::EpisodicStore`] folds event streams into per-run
//! summaries. [`semantic::SemanticStore`] keeps structured facts with
//! provenance and detects conflicting values per key.
//! [`pack::ContextPackBuilder`] assembles facts into weighted, freshness-
//! scored claims for downstream decision-making.

pub mod episodic;
pub mod pack;
pub mod semantic;

pub use episodic::{EpisodeSummary, EpisodicStore};
pub use pack::{Claim, ContextPack, ContextPackBuilder, EvidenceItem};
pub use semantic::{ConflictRecord, Fact, Provenance, SemanticStore};
