//! Thread identity resolution.
//!
//! Reconciles a contact's stored step-one metadata with the message that
//! was actually sent. Strategies run in order:
//! 1. `StoredThread` — the stored thread id still resolves
//! 2. `ExactSubject` — sent mail with the verbatim stored subject
//! 3. `TimeWindow` — sent mail closest to `last_email_date`

pub mod resolver;
pub mod strategy;
pub mod types;

pub use resolver::{ThreadResolver, identity_patch};
pub use strategy::{ExactSubject, ResolveStrategy, StoredThread, TimeWindow};
pub use types::{Confidence, Resolution, ResolveOutcome, ResolveRequest, ThreadPassReport};
