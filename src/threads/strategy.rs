//! Resolution strategies, tried in rank order by `ThreadResolver`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::contacts::normalize_email;
use crate::error::MailError;
use crate::mail::{MailMessage, MailSearch, SearchCriterion, SentQuery};

use super::types::{Confidence, Resolution, ResolveRequest};

pub(crate) const SUBJECT_SEARCH_LIMIT: usize = 10;
pub(crate) const WINDOW_SEARCH_LIMIT: usize = 25;

/// One way of identifying a contact's outbound message.
///
/// `Ok(None)` means "no match here, try the next strategy". Errors are
/// mail-search failures and stop the pipeline for this contact.
#[async_trait]
pub trait ResolveStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn attempt(
        &self,
        mail: &dyn MailSearch,
        request: &ResolveRequest,
    ) -> Result<Option<Resolution>, MailError>;
}

/// Re-fetch the stored thread id.
///
/// Only a non-draft message sent to the contact counts; a thread holding
/// nothing but the contact's reply falls through to the next strategy.
pub struct StoredThread;

#[async_trait]
impl ResolveStrategy for StoredThread {
    fn name(&self) -> &'static str {
        "stored_thread"
    }

    async fn attempt(
        &self,
        mail: &dyn MailSearch,
        request: &ResolveRequest,
    ) -> Result<Option<Resolution>, MailError> {
        let Some(thread_id) = request.thread_id.as_deref() else {
            return Ok(None);
        };
        let Some(thread) = mail.get_thread(thread_id).await? else {
            debug!(email = %request.email, thread_id, "Stored thread no longer exists");
            return Ok(None);
        };

        let chosen = thread
            .chronological()
            .into_iter()
            .find(|m| !m.is_draft && m.is_to(&request.email));

        Ok(chosen.map(|m| Resolution::from_message(m, request, Confidence::Stored, self.name())))
    }
}

/// Search sent mail for the verbatim stored subject.
pub struct ExactSubject;

#[async_trait]
impl ResolveStrategy for ExactSubject {
    fn name(&self) -> &'static str {
        "exact_subject"
    }

    async fn attempt(
        &self,
        mail: &dyn MailSearch,
        request: &ResolveRequest,
    ) -> Result<Option<Resolution>, MailError> {
        let Some(subject) = request.step_one_subject.as_deref() else {
            return Ok(None);
        };
        let query = SentQuery {
            recipient: request.email.clone(),
            criterion: SearchCriterion::SubjectExact(subject.to_string()),
            limit: SUBJECT_SEARCH_LIMIT,
        };

        let candidates = mail.search_sent(&query).await?;
        Ok(candidates
            .iter()
            .filter(|m| !m.is_draft)
            .find(|m| m.is_to(&request.email) && m.subject == subject)
            .map(|m| Resolution::from_message(m, request, Confidence::Exact, self.name())))
    }
}

/// Pick the sent message closest in time to `last_email_date`.
///
/// Looks one day before and two days after. Covers subjects edited by hand
/// after sending.
pub struct TimeWindow {
    self_address: String,
}

impl TimeWindow {
    pub const DAYS_BEFORE: i64 = 1;
    pub const DAYS_AFTER: i64 = 2;

    pub fn new(self_address: &str) -> Self {
        Self {
            self_address: normalize_email(self_address),
        }
    }

    /// The candidate nearest `anchor` inside the window; ties go to the
    /// earliest in `candidates` order.
    pub fn closest<'a>(
        &self,
        candidates: &'a [MailMessage],
        email: &str,
        anchor: DateTime<Utc>,
    ) -> Option<&'a MailMessage> {
        let start = anchor - Duration::days(Self::DAYS_BEFORE);
        let end = anchor + Duration::days(Self::DAYS_AFTER);
        candidates
            .iter()
            .filter(|m| !m.is_draft)
            .filter(|m| m.is_from(&self.self_address) && m.is_to(email))
            .filter(|m| m.date >= start && m.date <= end)
            .min_by_key(|m| (m.date - anchor).abs())
    }
}

#[async_trait]
impl ResolveStrategy for TimeWindow {
    fn name(&self) -> &'static str {
        "time_window"
    }

    async fn attempt(
        &self,
        mail: &dyn MailSearch,
        request: &ResolveRequest,
    ) -> Result<Option<Resolution>, MailError> {
        let Some(anchor) = request.last_email_date else {
            return Ok(None);
        };
        let after = (anchor - Duration::days(Self::DAYS_BEFORE)).date_naive();
        // `before` is exclusive; widen by a day to keep the last window day.
        let before = (anchor + Duration::days(Self::DAYS_AFTER + 1)).date_naive();
        let query = SentQuery {
            recipient: request.email.clone(),
            criterion: SearchCriterion::DateRange { after, before },
            limit: WINDOW_SEARCH_LIMIT,
        };

        let candidates = mail.search_sent(&query).await?;
        Ok(self
            .closest(&candidates, &request.email, anchor)
            .map(|m| Resolution::from_message(m, request, Confidence::Approximate, self.name())))
    }
}
