//! Mail-search types — candidate messages, threads, and sent-mail queries.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::address::{extract_address, recipients_include};

/// One message as returned by the mail-search collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailMessage {
    /// Collaborator-native message id.
    pub id: String,
    pub thread_id: String,
    /// Raw `From` header value.
    pub from: String,
    /// Raw `To` header values.
    pub to: Vec<String>,
    pub subject: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub is_draft: bool,
}

impl MailMessage {
    /// Normalized sender address, if the `From` header holds one.
    pub fn sender(&self) -> Option<String> {
        extract_address(&self.from)
    }

    pub fn is_from(&self, email: &str) -> bool {
        self.sender().as_deref() == Some(crate::contacts::normalize_email(email).as_str())
    }

    pub fn is_to(&self, email: &str) -> bool {
        recipients_include(&self.to, email)
    }
}

/// A conversation and its messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailThread {
    pub id: String,
    pub messages: Vec<MailMessage>,
}

impl MailThread {
    /// Messages ordered oldest first. Equal timestamps keep their original order.
    pub fn chronological(&self) -> Vec<&MailMessage> {
        let mut messages: Vec<&MailMessage> = self.messages.iter().collect();
        messages.sort_by_key(|m| m.date);
        messages
    }
}

/// How sent mail is filtered beyond the recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCriterion {
    /// Subject match on the verbatim stored subject.
    SubjectExact(String),
    /// Calendar-day range; `after` inclusive, `before` exclusive.
    DateRange { after: NaiveDate, before: NaiveDate },
}

/// A sent-mail search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentQuery {
    pub recipient: String,
    pub criterion: SearchCriterion,
    pub limit: usize,
}

impl SentQuery {
    /// Render the collaborator's query-string form.
    pub fn to_query_string(&self) -> String {
        let base = format!("in:sent to:{}", self.recipient);
        match &self.criterion {
            SearchCriterion::SubjectExact(subject) => {
                format!("{base} subject:\"{}\"", escape_quoted(subject))
            }
            SearchCriterion::DateRange { after, before } => format!(
                "{base} after:{} before:{}",
                after.format("%Y/%m/%d"),
                before.format("%Y/%m/%d")
            ),
        }
    }
}

/// Escape a value for use inside a double-quoted query token.
pub fn escape_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message(id: &str, day: u32) -> MailMessage {
        MailMessage {
            id: id.into(),
            thread_id: "t".into(),
            from: "Me <me@example.com>".into(),
            to: vec!["lead@example.com".into()],
            subject: "Hi".into(),
            date: Utc.with_ymd_and_hms(2024, 1, day, 9, 0, 0).unwrap(),
            is_draft: false,
        }
    }

    #[test]
    fn subject_query_escapes_quotes() {
        let q = SentQuery {
            recipient: "lead@example.com".into(),
            criterion: SearchCriterion::SubjectExact(r#"Re: "Q1" \ plans"#.into()),
            limit: 10,
        };
        assert_eq!(
            q.to_query_string(),
            r#"in:sent to:lead@example.com subject:"Re: \"Q1\" \\ plans""#
        );
    }

    #[test]
    fn date_range_query_format() {
        let q = SentQuery {
            recipient: "lead@example.com".into(),
            criterion: SearchCriterion::DateRange {
                after: NaiveDate::from_ymd_opt(2024, 1, 9).unwrap(),
                before: NaiveDate::from_ymd_opt(2024, 1, 13).unwrap(),
            },
            limit: 10,
        };
        assert_eq!(
            q.to_query_string(),
            "in:sent to:lead@example.com after:2024/01/09 before:2024/01/13"
        );
    }

    #[test]
    fn chronological_sorts_oldest_first() {
        let thread = MailThread {
            id: "t".into(),
            messages: vec![message("b", 12), message("a", 10), message("c", 11)],
        };
        let ids: Vec<&str> = thread.chronological().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
    }

    #[test]
    fn sender_and_recipient_checks() {
        let m = message("a", 10);
        assert!(m.is_from("ME@example.com"));
        assert!(m.is_to("Lead@Example.com"));
        assert!(!m.is_to("me@example.com"));
    }
}
