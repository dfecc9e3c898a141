//! Sequence progression — readiness, step advancement, paused reactivation.
//!
//! Every operation here is pure: it takes a contact snapshot and returns a
//! complete replacement (or an error), never a partially mutated record.

use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};

use crate::clock::business_date;
use crate::contacts::{Contact, ContactStatus};
use crate::error::EngineError;

/// Readiness in UTC: absent date, or date-only `next_step_date <= now`.
pub fn compute_readiness(next_step_date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    SequenceEngine::default().compute_readiness(next_step_date, now)
}

/// Applies sequence rules using calendar days in a fixed offset.
#[derive(Debug, Clone, Copy)]
pub struct SequenceEngine {
    offset: FixedOffset,
}

impl Default for SequenceEngine {
    fn default() -> Self {
        Self { offset: Utc.fix() }
    }
}

impl SequenceEngine {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// True when `next_step_date` is unset or its calendar day has arrived.
    /// Time of day on either side is ignored.
    pub fn compute_readiness(
        &self,
        next_step_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        match next_step_date {
            None => true,
            Some(next) => business_date(next, self.offset) <= business_date(now, self.offset),
        }
    }

    pub fn is_ready(&self, contact: &Contact, now: DateTime<Utc>) -> bool {
        self.compute_readiness(contact.next_step_date, now)
    }

    /// Record that the current step was sent at `now`.
    ///
    /// Moves to the next step due `delay_days` later, or completes the
    /// sequence when the current step was the last one.
    pub fn advance(
        &self,
        contact: &Contact,
        delay_days: u32,
        sequence_step_count: u32,
        now: DateTime<Utc>,
    ) -> Result<Contact, EngineError> {
        if contact.status != ContactStatus::Active {
            return Err(EngineError::InvalidState {
                email: contact.email.clone(),
                status: contact.status,
                operation: "advance",
            });
        }

        let mut next = contact.clone();
        next.last_email_date = Some(now);
        next.call_completed = false;

        if contact.current_step.saturating_add(1) > sequence_step_count {
            next.status = ContactStatus::Completed;
            next.next_step_date = None;
            next.current_step = contact.current_step.min(sequence_step_count.max(1));
        } else {
            next.current_step = contact.current_step + 1;
            next.next_step_date = Some(now + Duration::days(i64::from(delay_days)));
        }

        Ok(next)
    }

    /// Reactivate a paused contact whose next step date has arrived.
    ///
    /// A paused contact without a next step date stays paused.
    pub fn auto_activate(&self, contact: &Contact, now: DateTime<Utc>) -> (Contact, bool) {
        let due = contact.status == ContactStatus::Paused
            && contact.next_step_date.is_some()
            && self.compute_readiness(contact.next_step_date, now);

        if !due {
            return (contact.clone(), false);
        }

        let mut next = contact.clone();
        next.status = ContactStatus::Active;
        (next, true)
    }

    /// Apply `auto_activate` across `contacts`, returning only changed replacements.
    pub fn sweep_paused(&self, contacts: &[Contact], now: DateTime<Utc>) -> Vec<Contact> {
        contacts
            .iter()
            .filter(|c| c.status == ContactStatus::Paused)
            .filter_map(|c| match self.auto_activate(c, now) {
                (updated, true) => Some(updated),
                _ => None,
            })
            .collect()
    }
}
