//! Reply detection by polling the contact's outbound thread.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::batch::select_batch;
use crate::contacts::{Contact, ContactPatch};
use crate::error::EngineError;
use crate::store::ContactStore;
use crate::threads::{ThreadResolver, identity_patch};

/// Outcome counts of one reply-detection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplyScanReport {
    pub processed: usize,
    pub replies_found: usize,
    pub errors: usize,
    pub deferred: usize,
    pub next_cursor: Option<String>,
    /// Emails whose rows were written during the pass.
    #[serde(skip)]
    pub touched: Vec<String>,
}

pub struct ReplyDetector {
    resolver: Arc<ThreadResolver>,
}

impl ReplyDetector {
    pub fn new(resolver: Arc<ThreadResolver>) -> Self {
        Self { resolver }
    }

    /// Emailed, not yet replied, and with something to find the thread by.
    ///
    /// A contact with `reply_received` set is never checked again.
    pub fn is_eligible(contact: &Contact) -> bool {
        contact.last_email_date.is_some()
            && !contact.reply_received
            && (contact.step_one_subject().is_some() || contact.thread_id().is_some())
    }

    /// Look for a reply from `contact` and return the fields to update.
    ///
    /// The thread is resolved through the full pipeline, so a stale stored id
    /// falls through to the subject and time-window searches. When nothing
    /// resolves, the stored id is still checked. The patch also carries any
    /// thread identity discovered along the way. An empty patch means nothing
    /// changed.
    pub async fn check_contact(&self, contact: &Contact) -> Result<ContactPatch, EngineError> {
        let mut updated = contact.clone();

        let thread_id = match self.resolver.resolve_contact(contact).await?.resolution() {
            Some(resolution) => {
                identity_patch(contact, resolution).apply_to(&mut updated);
                Some(resolution.thread_id.clone())
            }
            None => contact.thread_id().map(str::to_string),
        };

        let Some(thread_id) = thread_id else {
            debug!(email = %contact.email, "No thread to check for replies");
            return Ok(ContactPatch::new());
        };

        let Some(thread) = self.resolver.mail().get_thread(&thread_id).await? else {
            debug!(email = %contact.email, thread_id = %thread_id, "Thread not found");
            return Ok(ContactPatch::diff(contact, &updated));
        };

        let reply = thread
            .chronological()
            .into_iter()
            .find(|m| !m.is_draft && m.is_from(&contact.email));

        if let Some(reply) = reply {
            debug!(email = %contact.email, message_id = %reply.id, "Reply detected");
            updated.reply_received = true;
            updated.reply_date = Some(reply.date);
        }

        Ok(ContactPatch::diff(contact, &updated))
    }

    /// Check up to `limit` eligible contacts, resuming after `cursor`.
    ///
    /// Updates are written per contact and applied to `contacts` in place.
    /// A failure on one contact is logged and counted; it stays eligible.
    pub async fn scan(
        &self,
        store: &dyn ContactStore,
        contacts: &mut [Contact],
        cursor: Option<&str>,
        limit: usize,
    ) -> ReplyScanReport {
        let slice = select_batch(contacts, Self::is_eligible, cursor, limit);
        let mut report = ReplyScanReport {
            deferred: slice.deferred(),
            next_cursor: slice.next_cursor.clone(),
            ..Default::default()
        };

        for &i in &slice.indices {
            let contact = &mut contacts[i];
            report.processed += 1;

            let result = match self.check_contact(contact).await {
                Ok(patch) if patch.is_empty() => Ok(patch),
                Ok(patch) => {
                    let written = store.write_fields(contact.position, &patch).await;
                    written.map(|()| patch).map_err(EngineError::from)
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(patch) if !patch.is_empty() => {
                    patch.apply_to(contact);
                    report.touched.push(contact.email.clone());
                    if contact.reply_received {
                        report.replies_found += 1;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(email = %contact.email, error = %e, "Reply check failed");
                    report.errors += 1;
                }
            }
        }

        info!(
            processed = report.processed,
            replies_found = report.replies_found,
            errors = report.errors,
            deferred = report.deferred,
            "Reply detection pass complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::{ContactField, NewContact, Priority};
    use crate::mail::{InMemoryMailbox, MailMessage};
    use crate::store::LibSqlBackend;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    const ME: &str = "me@example.com";

    fn sent_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 15, 0, 0).unwrap()
    }

    fn message(id: &str, thread: &str, from: &str, to: &str, at: DateTime<Utc>) -> MailMessage {
        MailMessage {
            id: id.into(),
            thread_id: thread.into(),
            from: from.into(),
            to: vec![to.into()],
            subject: "Quick question".into(),
            date: at,
            is_draft: false,
        }
    }

    async fn emailed(store: &LibSqlBackend, email: &str, thread: Option<&str>) -> Contact {
        let position = store
            .append(&NewContact {
                email: email.into(),
                name: String::new(),
                company: String::new(),
                title: String::new(),
                sequence: "default".into(),
                priority: Priority::Medium,
            })
            .await
            .unwrap();
        let patch = ContactPatch::new()
            .set(ContactField::LastEmailDate(Some(sent_at())))
            .set(ContactField::StepOneSubject("Quick question".into()))
            .set(ContactField::ThreadId(thread.map(str::to_string)));
        store.write_fields(position, &patch).await.unwrap();
        store.read_one(position).await.unwrap().unwrap()
    }

    fn detector(mb: &Arc<InMemoryMailbox>) -> ReplyDetector {
        ReplyDetector::new(Arc::new(ThreadResolver::new(mb.clone(), ME)))
    }

    #[test]
    fn eligibility() {
        let mut c = NewContact {
            email: "lead@example.com".into(),
            name: String::new(),
            company: String::new(),
            title: String::new(),
            sequence: "default".into(),
            priority: Priority::Medium,
        }
        .into_contact(crate::contacts::RowPosition(1));
        assert!(!ReplyDetector::is_eligible(&c));

        c.last_email_date = Some(sent_at());
        assert!(!ReplyDetector::is_eligible(&c));

        c.thread_id = Some("t1".into());
        assert!(ReplyDetector::is_eligible(&c));

        c.reply_received = true;
        assert!(!ReplyDetector::is_eligible(&c));
    }

    #[tokio::test]
    async fn first_reply_from_contact_is_recorded() {
        let store = LibSqlBackend::new_memory().await.unwrap();
        let contact = emailed(&store, "lead@example.com", Some("t1")).await;

        let mb = Arc::new(InMemoryMailbox::new(ME));
        let first = sent_at() + Duration::hours(20);
        mb.add(message("m1", "t1", ME, "lead@example.com", sent_at())).await;
        mb.add(message("r2", "t1", "Lead <lead@example.com>", ME, first + Duration::hours(1)))
            .await;
        mb.add(message("r1", "t1", "Lead <LEAD@example.com>", ME, first)).await;

        let mut contacts = vec![contact];
        let report = detector(&mb).scan(&store, &mut contacts, None, 50).await;
        assert_eq!(report.replies_found, 1);
        assert!(contacts[0].reply_received);
        assert_eq!(contacts[0].reply_date, Some(first));

        let stored = store.read_one(contacts[0].position).await.unwrap().unwrap();
        assert!(stored.reply_received);
        assert_eq!(stored.reply_date, Some(first));
    }

    #[tokio::test]
    async fn own_messages_are_not_replies() {
        let store = LibSqlBackend::new_memory().await.unwrap();
        let contact = emailed(&store, "lead@example.com", Some("t1")).await;

        let mb = Arc::new(InMemoryMailbox::new(ME));
        mb.add(message("m1", "t1", ME, "lead@example.com", sent_at())).await;
        mb.add(message("m2", "t1", ME, "lead@example.com", sent_at() + Duration::days(3)))
            .await;

        let mut contacts = vec![contact];
        let report = detector(&mb).scan(&store, &mut contacts, None, 50).await;
        assert_eq!(report.processed, 1);
        assert_eq!(report.replies_found, 0);
        assert!(!contacts[0].reply_received);

        let stored = store.read_one(contacts[0].position).await.unwrap().unwrap();
        assert!(!stored.reply_received);
        assert_eq!(stored.step_one_message_id.as_deref(), Some("m1"));
    }

    #[tokio::test]
    async fn replied_contacts_are_never_rechecked() {
        let store = LibSqlBackend::new_memory().await.unwrap();
        let contact = emailed(&store, "lead@example.com", Some("t1")).await;

        let mb = Arc::new(InMemoryMailbox::new(ME));
        mb.add(message("r1", "t1", "lead@example.com", ME, sent_at() + Duration::hours(2)))
            .await;
        let detector = detector(&mb);

        let mut contacts = vec![contact];
        detector.scan(&store, &mut contacts, None, 50).await;
        assert!(contacts[0].reply_received);
        let fetches = mb.thread_fetch_count();

        let report = detector.scan(&store, &mut contacts, None, 50).await;
        assert_eq!(report.processed, 0);
        assert_eq!(mb.thread_fetch_count(), fetches);
        assert!(contacts[0].reply_received);
    }

    #[tokio::test]
    async fn discovers_and_persists_thread_identity() {
        let store = LibSqlBackend::new_memory().await.unwrap();
        let contact = emailed(&store, "lead@example.com", None).await;

        let mb = Arc::new(InMemoryMailbox::new(ME));
        mb.add(message("m1", "t9", ME, "lead@example.com", sent_at())).await;

        let mut contacts = vec![contact];
        let report = detector(&mb).scan(&store, &mut contacts, None, 50).await;
        assert_eq!(report.replies_found, 0);
        assert_eq!(report.touched.len(), 1);

        let stored = store.read_one(contacts[0].position).await.unwrap().unwrap();
        assert_eq!(stored.thread_id.as_deref(), Some("t9"));
        assert_eq!(stored.step_one_message_id.as_deref(), Some("m1"));
        assert!(!stored.reply_received);
    }

    #[tokio::test]
    async fn failure_does_not_halt_batch() {
        let store = LibSqlBackend::new_memory().await.unwrap();
        let a = emailed(&store, "a@example.com", Some("ta")).await;
        let b = emailed(&store, "b@example.com", Some("tb")).await;

        let mb = Arc::new(InMemoryMailbox::new(ME));
        mb.add(message("ra", "ta", "a@example.com", ME, sent_at())).await;
        mb.add(message("rb", "tb", "b@example.com", ME, sent_at())).await;
        mb.fail_thread("ta").await;

        let mut contacts = vec![a, b];
        let report = detector(&mb).scan(&store, &mut contacts, None, 50).await;
        assert_eq!(report.processed, 2);
        assert_eq!(report.errors, 1);
        assert_eq!(report.replies_found, 1);
        assert!(!contacts[0].reply_received);
        assert!(ReplyDetector::is_eligible(&contacts[0]));
        assert!(contacts[1].reply_received);
    }

    #[tokio::test]
    async fn batch_cap_defers_remainder() {
        let store = LibSqlBackend::new_memory().await.unwrap();
        let mut contacts = Vec::new();
        for name in ["a", "b", "c"] {
            let email = format!("{name}@example.com");
            contacts.push(emailed(&store, &email, Some(&format!("t{name}"))).await);
        }
        let mb = Arc::new(InMemoryMailbox::new(ME));
        let detector = detector(&mb);

        let first = detector.scan(&store, &mut contacts, None, 2).await;
        assert_eq!(first.processed, 2);
        assert_eq!(first.deferred, 1);
        assert_eq!(first.next_cursor.as_deref(), Some("b@example.com"));

        let second = detector
            .scan(&store, &mut contacts, first.next_cursor.as_deref(), 2)
            .await;
        assert_eq!(second.processed, 2);
        // Each check runs the subject and time-window searches once.
        assert_eq!(mb.search_count(), 8);
    }

    #[tokio::test]
    async fn stale_thread_id_is_resolved_and_healed() {
        let store = LibSqlBackend::new_memory().await.unwrap();
        let contact = emailed(&store, "lead@example.com", Some("gone")).await;
        let patch = ContactPatch::new().set(ContactField::StepOneMessageId(Some("old".into())));
        store.write_fields(contact.position, &patch).await.unwrap();
        let contact = store.read_one(contact.position).await.unwrap().unwrap();

        let mb = Arc::new(InMemoryMailbox::new(ME));
        let replied = sent_at() + Duration::hours(4);
        mb.add(message("m1", "t1", ME, "lead@example.com", sent_at())).await;
        mb.add(message("r1", "t1", "lead@example.com", ME, replied)).await;

        let mut contacts = vec![contact];
        let report = detector(&mb).scan(&store, &mut contacts, None, 50).await;
        assert_eq!(report.processed, 1);
        assert_eq!(report.replies_found, 1);

        let stored = store.read_one(contacts[0].position).await.unwrap().unwrap();
        assert!(stored.reply_received);
        assert_eq!(stored.reply_date, Some(replied));
        assert_eq!(stored.thread_id.as_deref(), Some("t1"));
        assert_eq!(stored.step_one_message_id.as_deref(), Some("m1"));
    }
}
