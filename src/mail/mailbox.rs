//! In-memory mailbox — used by tests and as the index behind the `.eml` loader.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::contacts::normalize_email;
use crate::error::MailError;

use super::search::MailSearch;
use super::types::{MailMessage, MailThread, SearchCriterion, SentQuery};

/// A mailbox held entirely in memory.
///
/// "Sent" means the sender is `self_address`. Subject search is a
/// case-insensitive substring match, so callers needing an exact subject
/// must check it themselves. Results keep insertion order.
pub struct InMemoryMailbox {
    self_address: String,
    messages: RwLock<Vec<MailMessage>>,
    failing_recipients: RwLock<HashSet<String>>,
    failing_threads: RwLock<HashSet<String>>,
    searches: AtomicUsize,
    thread_fetches: AtomicUsize,
}

impl InMemoryMailbox {
    pub fn new(self_address: &str) -> Self {
        Self::from_messages(self_address, Vec::new())
    }

    pub fn from_messages(self_address: &str, messages: Vec<MailMessage>) -> Self {
        Self {
            self_address: normalize_email(self_address),
            messages: RwLock::new(messages),
            failing_recipients: RwLock::new(HashSet::new()),
            failing_threads: RwLock::new(HashSet::new()),
            searches: AtomicUsize::new(0),
            thread_fetches: AtomicUsize::new(0),
        }
    }

    pub fn self_address(&self) -> &str {
        &self.self_address
    }

    pub async fn add(&self, message: MailMessage) {
        self.messages.write().await.push(message);
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }

    /// Make every search addressed to `recipient` fail.
    pub async fn fail_searches_for(&self, recipient: &str) {
        self.failing_recipients
            .write()
            .await
            .insert(normalize_email(recipient));
    }

    /// Make fetching `thread_id` fail.
    pub async fn fail_thread(&self, thread_id: &str) {
        self.failing_threads.write().await.insert(thread_id.to_string());
    }

    /// Number of `search_sent` calls so far.
    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::Relaxed)
    }

    /// Number of `get_thread` calls so far.
    pub fn thread_fetch_count(&self) -> usize {
        self.thread_fetches.load(Ordering::Relaxed)
    }

    fn matches(&self, message: &MailMessage, query: &SentQuery) -> bool {
        if !message.is_from(&self.self_address) || !message.is_to(&query.recipient) {
            return false;
        }
        match &query.criterion {
            SearchCriterion::SubjectExact(subject) => message
                .subject
                .to_lowercase()
                .contains(&subject.to_lowercase()),
            SearchCriterion::DateRange { after, before } => {
                let day = message.date.date_naive();
                day >= *after && day < *before
            }
        }
    }
}

#[async_trait]
impl MailSearch for InMemoryMailbox {
    async fn search_sent(&self, query: &SentQuery) -> Result<Vec<MailMessage>, MailError> {
        self.searches.fetch_add(1, Ordering::Relaxed);

        if self
            .failing_recipients
            .read()
            .await
            .contains(&normalize_email(&query.recipient))
        {
            return Err(MailError::SearchFailed {
                query: query.to_query_string(),
                reason: "injected failure".into(),
            });
        }

        let messages = self.messages.read().await;
        let found: Vec<MailMessage> = messages
            .iter()
            .filter(|m| self.matches(m, query))
            .take(query.limit)
            .cloned()
            .collect();

        debug!(query = %query.to_query_string(), count = found.len(), "Mailbox search");
        Ok(found)
    }

    async fn get_thread(&self, thread_id: &str) -> Result<Option<MailThread>, MailError> {
        self.thread_fetches.fetch_add(1, Ordering::Relaxed);

        if self.failing_threads.read().await.contains(thread_id) {
            return Err(MailError::ThreadFetch {
                id: thread_id.to_string(),
                reason: "injected failure".into(),
            });
        }

        let messages: Vec<MailMessage> = self
            .messages
            .read()
            .await
            .iter()
            .filter(|m| m.thread_id == thread_id)
            .cloned()
            .collect();

        if messages.is_empty() {
            return Ok(None);
        }
        Ok(Some(MailThread {
            id: thread_id.to_string(),
            messages,
        }))
    }
}
