//! Ranked resolution pipeline and the batch thread-identity pass.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::batch::select_batch;
use crate::contacts::{Contact, ContactPatch};
use crate::error::EngineError;
use crate::mail::MailSearch;
use crate::store::ContactStore;

use super::strategy::{ExactSubject, ResolveStrategy, StoredThread, TimeWindow};
use super::types::{Resolution, ResolveOutcome, ResolveRequest, ThreadPassReport};

/// Identifies a contact's step-one message and thread from sent mail.
pub struct ThreadResolver {
    mail: Arc<dyn MailSearch>,
    strategies: Vec<Box<dyn ResolveStrategy>>,
}

impl ThreadResolver {
    /// The default pipeline: stored thread, exact subject, time window.
    pub fn new(mail: Arc<dyn MailSearch>, self_address: &str) -> Self {
        Self::with_strategies(
            mail,
            vec![
                Box::new(StoredThread),
                Box::new(ExactSubject),
                Box::new(TimeWindow::new(self_address)),
            ],
        )
    }

    pub fn with_strategies(
        mail: Arc<dyn MailSearch>,
        strategies: Vec<Box<dyn ResolveStrategy>>,
    ) -> Self {
        Self { mail, strategies }
    }

    pub fn mail(&self) -> &Arc<dyn MailSearch> {
        &self.mail
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run strategies in order; the first match wins.
    pub async fn resolve(&self, request: &ResolveRequest) -> Result<ResolveOutcome, EngineError> {
        for strategy in &self.strategies {
            if let Some(resolution) = strategy.attempt(self.mail.as_ref(), request).await? {
                debug!(
                    email = %request.email,
                    strategy = resolution.strategy,
                    message_id = %resolution.message_id,
                    subject_changed = resolution.subject_changed,
                    "Resolved outbound thread"
                );
                return Ok(ResolveOutcome::Found(resolution));
            }
        }
        debug!(email = %request.email, "No outbound thread found");
        Ok(ResolveOutcome::NotFound)
    }

    pub async fn resolve_contact(&self, contact: &Contact) -> Result<ResolveOutcome, EngineError> {
        self.resolve(&ResolveRequest::from_contact(contact)).await
    }

    /// Resolve and write any changed identity fields back to the store.
    ///
    /// Returns the outcome and the patch that was written (empty when nothing
    /// changed or nothing was found).
    pub async fn resolve_and_heal(
        &self,
        store: &dyn ContactStore,
        contact: &Contact,
    ) -> Result<(ResolveOutcome, ContactPatch), EngineError> {
        let outcome = self.resolve_contact(contact).await?;
        let patch = match outcome.resolution() {
            Some(resolution) => identity_patch(contact, resolution),
            None => ContactPatch::new(),
        };

        if !patch.is_empty() {
            store.write_fields(contact.position, &patch).await?;
            info!(
                email = %contact.email,
                fields = ?patch.field_names(),
                "Healed thread identity"
            );
        }
        Ok((outcome, patch))
    }

    /// Resolve contacts that have been emailed but lack a thread identity.
    ///
    /// At most `limit` contacts are processed, resuming after `cursor`.
    /// Changes are applied to `contacts` in place so later passes see them.
    /// A failure on one contact is logged and counted; the rest continue.
    pub async fn resolve_pending(
        &self,
        store: &dyn ContactStore,
        contacts: &mut [Contact],
        cursor: Option<&str>,
        limit: usize,
    ) -> ThreadPassReport {
        let slice = select_batch(contacts, Contact::needs_thread_identity, cursor, limit);
        let mut report = ThreadPassReport {
            deferred: slice.deferred(),
            next_cursor: slice.next_cursor.clone(),
            ..Default::default()
        };

        for &i in &slice.indices {
            let contact = &mut contacts[i];
            report.processed += 1;

            match self.resolve_and_heal(store, contact).await {
                Ok((ResolveOutcome::Found(resolution), patch)) => {
                    report.found += 1;
                    if resolution.subject_changed {
                        report.subjects_healed += 1;
                    }
                    if !patch.is_empty() {
                        patch.apply_to(contact);
                        report.touched.push(contact.email.clone());
                    }
                }
                Ok((ResolveOutcome::NotFound, _)) => report.not_found += 1,
                Err(e) => {
                    warn!(email = %contact.email, error = %e, "Thread resolution failed");
                    report.errors += 1;
                }
            }
        }

        info!(
            processed = report.processed,
            found = report.found,
            not_found = report.not_found,
            errors = report.errors,
            deferred = report.deferred,
            "Thread resolution pass complete"
        );
        report
    }
}

/// Identity fields on `contact` that differ from `resolution`.
pub fn identity_patch(contact: &Contact, resolution: &Resolution) -> ContactPatch {
    let mut healed = contact.clone();
    healed.step_one_message_id = Some(resolution.message_id.clone());
    healed.thread_id = Some(resolution.thread_id.clone());
    if resolution.subject_changed {
        healed.step_one_subject = resolution.actual_subject.clone();
    }
    ContactPatch::diff(contact, &healed)
}
