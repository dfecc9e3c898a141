//! Store-backed sequence operations.
//!
//! Each mutation reads the current row, lets `SequenceEngine` compute the
//! replacement, writes only the changed fields, and invalidates the contact's
//! cache entry before returning.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::ContactCache;
use crate::clock::Clock;
use crate::contacts::{Contact, ContactField, ContactPatch, NewContact, normalize_email};
use crate::error::EngineError;
use crate::sequence::{SequenceCatalog, SequenceEngine};
use crate::store::ContactStore;

/// Outcome counts of a paused-contact sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub reactivated: usize,
    pub errors: usize,
}

/// Applies sequence progression to stored contacts.
pub struct SequenceService {
    store: Option<Arc<dyn ContactStore>>,
    catalog: Arc<SequenceCatalog>,
    cache: Arc<ContactCache>,
    engine: SequenceEngine,
    clock: Arc<dyn Clock>,
}

impl SequenceService {
    pub fn new(
        store: Option<Arc<dyn ContactStore>>,
        catalog: Arc<SequenceCatalog>,
        cache: Arc<ContactCache>,
        engine: SequenceEngine,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            catalog,
            cache,
            engine,
            clock,
        }
    }

    /// The connected store, or `ConfigMissing`.
    pub fn store(&self) -> Result<&Arc<dyn ContactStore>, EngineError> {
        self.store.as_ref().ok_or_else(EngineError::store_missing)
    }

    pub fn engine(&self) -> SequenceEngine {
        self.engine
    }

    /// Enroll a new contact at step 1.
    pub async fn add_contact(&self, new: NewContact) -> Result<Contact, EngineError> {
        let store = self.store()?;
        if self.catalog.get(&new.sequence).is_none() {
            return Err(EngineError::UnknownSequence(new.sequence));
        }
        let position = store.append(&new).await?;
        let contact = new.into_contact(position);
        info!(email = %contact.email, sequence = %contact.sequence, "Contact enrolled");
        Ok(contact)
    }

    /// Load a contact from the store by email.
    pub async fn get_contact(&self, email: &str) -> Result<Contact, EngineError> {
        self.store()?
            .find_by_email(email)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity: "contact".into(),
                id: normalize_email(email),
            })
    }

    /// Whether the contact's next step is due today.
    pub async fn is_ready(&self, email: &str) -> Result<bool, EngineError> {
        let contact = self.get_contact(email).await?;
        Ok(self.engine.is_ready(&contact, self.clock.now()))
    }

    /// Record that the contact's current step was just sent.
    ///
    /// `sent_subject` is stored as the step-one subject when the step being
    /// recorded is the first one.
    pub async fn advance_contact(
        &self,
        email: &str,
        sent_subject: Option<&str>,
    ) -> Result<Contact, EngineError> {
        let store = self.store()?;
        let contact = self.get_contact(email).await?;
        let sequence = self
            .catalog
            .get(&contact.sequence)
            .ok_or_else(|| EngineError::UnknownSequence(contact.sequence.clone()))?;

        let delay = sequence.delay_after(contact.current_step);
        let mut updated =
            self.engine
                .advance(&contact, delay, sequence.step_count(), self.clock.now())?;

        if contact.current_step == 1
            && let Some(subject) = sent_subject.map(str::trim).filter(|s| !s.is_empty())
        {
            updated.step_one_subject = subject.to_string();
        }

        let patch = ContactPatch::diff(&contact, &updated);
        store.write_fields(contact.position, &patch).await?;
        self.invalidate(&contact.email).await;

        info!(
            email = %updated.email,
            step = updated.current_step,
            status = %updated.status,
            next_step_date = ?updated.next_step_date,
            "Contact advanced"
        );
        Ok(updated)
    }

    /// Mark the per-step call as done for the contact's current step.
    pub async fn mark_call_completed(&self, email: &str) -> Result<Contact, EngineError> {
        let store = self.store()?;
        let mut contact = self.get_contact(email).await?;
        if contact.call_completed {
            return Ok(contact);
        }
        let patch = ContactPatch::new().set(ContactField::CallCompleted(true));
        store.write_fields(contact.position, &patch).await?;
        self.invalidate(&contact.email).await;
        patch.apply_to(&mut contact);
        Ok(contact)
    }

    /// Reactivate paused contacts whose next step date has arrived.
    ///
    /// Each row is written independently; a failed write is logged and
    /// counted, and the contact is retried on the next sweep. Returns the
    /// report plus the replacements that were persisted.
    pub async fn reactivate_paused(
        &self,
        contacts: &[Contact],
    ) -> Result<(SweepReport, Vec<Contact>), EngineError> {
        let store = self.store()?;
        let now = self.clock.now();
        let mut report = SweepReport::default();
        let mut persisted = Vec::new();

        for updated in self.engine.sweep_paused(contacts, now) {
            let patch = ContactPatch::new().set(ContactField::Status(updated.status));
            match store.write_fields(updated.position, &patch).await {
                Ok(()) => {
                    self.invalidate(&updated.email).await;
                    debug!(email = %updated.email, "Paused contact reactivated");
                    report.reactivated += 1;
                    persisted.push(updated);
                }
                Err(e) => {
                    warn!(email = %updated.email, error = %e, "Failed to reactivate contact");
                    report.errors += 1;
                }
            }
        }

        if report.reactivated > 0 {
            info!(count = report.reactivated, "Reactivated paused contacts");
        }
        Ok((report, persisted))
    }

    async fn invalidate(&self, email: &str) {
        if let Err(e) = self.cache.remove(email).await {
            warn!(email = %email, error = %e, "Failed to invalidate cache entry");
        }
    }
}
