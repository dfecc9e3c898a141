//! Contact model — one row per tracked recipient.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Handle back into the contact store for writeback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowPosition(pub i64);

impl fmt::Display for RowPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row:{}", self.0)
    }
}

/// Where a contact sits in its sequence lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    Active,
    Paused,
    Completed,
    Unsubscribed,
}

impl ContactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactStatus::Active => "active",
            ContactStatus::Paused => "paused",
            ContactStatus::Completed => "completed",
            ContactStatus::Unsubscribed => "unsubscribed",
        }
    }
}

impl fmt::Display for ContactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContactStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(ContactStatus::Active),
            "paused" => Ok(ContactStatus::Paused),
            "completed" => Ok(ContactStatus::Completed),
            "unsubscribed" => Ok(ContactStatus::Unsubscribed),
            other => Err(format!("unknown contact status: {other}")),
        }
    }
}

/// Contact priority, used only for ordering in the UI layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" | "" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// A tracked contact.
///
/// `is_ready` is intentionally absent: readiness is derived from
/// `next_step_date` against the clock every time it is needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub position: RowPosition,
    /// Normalized (trimmed, lower-cased) address. Identity key.
    pub email: String,
    pub name: String,
    pub company: String,
    pub title: String,
    /// Name of the sequence this contact is enrolled in.
    pub sequence: String,
    /// 1-based step index of the next email to send.
    pub current_step: u32,
    pub status: ContactStatus,
    pub last_email_date: Option<DateTime<Utc>>,
    pub next_step_date: Option<DateTime<Utc>>,
    pub priority: Priority,
    /// Subject of the initial outreach email. May be stale or empty.
    #[serde(default)]
    pub step_one_subject: String,
    #[serde(default)]
    pub step_one_message_id: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub reply_received: bool,
    #[serde(default)]
    pub reply_date: Option<DateTime<Utc>>,
    /// Per-step call-tracking flag, cleared whenever the step advances.
    #[serde(default)]
    pub call_completed: bool,
}

impl Contact {
    /// Stored thread id, ignoring blanks.
    pub fn thread_id(&self) -> Option<&str> {
        non_blank(self.thread_id.as_deref())
    }

    /// Stored step-one message id, ignoring blanks.
    pub fn step_one_message_id(&self) -> Option<&str> {
        non_blank(self.step_one_message_id.as_deref())
    }

    /// Stored step-one subject, ignoring blanks.
    pub fn step_one_subject(&self) -> Option<&str> {
        non_blank(Some(self.step_one_subject.as_str()))
    }

    /// Whether this contact still needs its outbound thread identified.
    pub fn needs_thread_identity(&self) -> bool {
        self.last_email_date.is_some()
            && (self.thread_id().is_none() || self.step_one_message_id().is_none())
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Fields supplied when adding a contact. Everything else starts at defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContact {
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub title: String,
    pub sequence: String,
    #[serde(default)]
    pub priority: Priority,
}

impl NewContact {
    /// Materialize the initial record: step 1, active, no dates.
    pub fn into_contact(self, position: RowPosition) -> Contact {
        Contact {
            position,
            email: normalize_email(&self.email),
            name: self.name,
            company: self.company,
            title: self.title,
            sequence: self.sequence,
            current_step: 1,
            status: ContactStatus::Active,
            last_email_date: None,
            next_step_date: None,
            priority: self.priority,
            step_one_subject: String::new(),
            step_one_message_id: None,
            thread_id: None,
            reply_received: false,
            reply_date: None,
            call_completed: false,
        }
    }
}

/// Normalize an email address for identity comparison.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!("Paused".parse::<ContactStatus>().unwrap(), ContactStatus::Paused);
        assert!("archived".parse::<ContactStatus>().is_err());
    }

    #[test]
    fn new_contact_starts_active_at_step_one() {
        let c = NewContact {
            email: "Bob@Acme.io".into(),
            name: "Bob".into(),
            company: "Acme".into(),
            title: "CTO".into(),
            sequence: "default".into(),
            priority: Priority::High,
        }
        .into_contact(RowPosition(7));

        assert_eq!(c.email, "bob@acme.io");
        assert_eq!(c.current_step, 1);
        assert_eq!(c.status, ContactStatus::Active);
        assert!(c.last_email_date.is_none());
        assert!(c.next_step_date.is_none());
        assert!(!c.needs_thread_identity());
    }

    #[test]
    fn blank_thread_id_is_treated_as_missing() {
        let mut c = NewContact {
            email: "a@b.c".into(),
            name: String::new(),
            company: String::new(),
            title: String::new(),
            sequence: "default".into(),
            priority: Priority::default(),
        }
        .into_contact(RowPosition(1));
        c.thread_id = Some("   ".into());
        c.last_email_date = Some(Utc::now());
        assert!(c.thread_id().is_none());
        assert!(c.needs_thread_identity());
    }
}
