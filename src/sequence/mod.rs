//! Outreach sequences — definitions, progression rules, and the store-backed service.

pub mod catalog;
pub mod engine;
pub mod service;

pub use catalog::{MAX_STEPS, Sequence, SequenceCatalog, SequenceStep};
pub use engine::{SequenceEngine, compute_readiness};
pub use service::{SequenceService, SweepReport};
