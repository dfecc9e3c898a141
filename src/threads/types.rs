//! Thread resolution types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::contacts::{Contact, normalize_email};
use crate::mail::MailMessage;

/// What the resolver knows about a contact's first outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveRequest {
    pub email: String,
    /// Stored step-one subject. May be stale or absent.
    pub step_one_subject: Option<String>,
    pub last_email_date: Option<DateTime<Utc>>,
    /// Stored thread id. May be absent.
    pub thread_id: Option<String>,
}

impl ResolveRequest {
    pub fn from_contact(contact: &Contact) -> Self {
        Self {
            email: normalize_email(&contact.email),
            step_one_subject: contact.step_one_subject().map(str::to_string),
            last_email_date: contact.last_email_date,
            thread_id: contact.thread_id().map(str::to_string),
        }
    }
}

/// How a resolution was reached, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// The stored thread id still resolves.
    Stored,
    /// Verbatim subject match.
    Exact,
    /// Closest message in time; the subject may have been edited.
    Approximate,
}

/// The outbound message identified for a contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub message_id: String,
    pub thread_id: String,
    pub actual_subject: String,
    /// The message's subject differs from the stored one.
    pub subject_changed: bool,
    pub confidence: Confidence,
    /// Name of the strategy that produced this resolution.
    pub strategy: &'static str,
}

impl Resolution {
    pub fn from_message(
        message: &MailMessage,
        request: &ResolveRequest,
        confidence: Confidence,
        strategy: &'static str,
    ) -> Self {
        let stored = request.step_one_subject.as_deref().unwrap_or("");
        let actual = message.subject.as_str();
        Self {
            message_id: message.id.clone(),
            thread_id: message.thread_id.clone(),
            actual_subject: actual.to_string(),
            subject_changed: !actual.trim().is_empty() && actual != stored,
            confidence,
            strategy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    Found(Resolution),
    NotFound,
}

impl ResolveOutcome {
    pub fn resolution(&self) -> Option<&Resolution> {
        match self {
            ResolveOutcome::Found(r) => Some(r),
            ResolveOutcome::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, ResolveOutcome::Found(_))
    }
}

/// Outcome counts of one thread-resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ThreadPassReport {
    pub processed: usize,
    pub found: usize,
    pub subjects_healed: usize,
    pub not_found: usize,
    pub errors: usize,
    pub deferred: usize,
    pub next_cursor: Option<String>,
    /// Emails whose rows were written during the pass.
    #[serde(skip)]
    pub touched: Vec<String>,
}
