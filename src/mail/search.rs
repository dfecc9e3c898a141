//! The mail-search seam.

use async_trait::async_trait;

use crate::error::MailError;

use super::types::{MailMessage, MailThread, SentQuery};

/// Read-only access to the user's mailbox.
///
/// `search_sent` returns candidates in the backend's relevance order; callers
/// apply their own draft and recipient checks. `get_thread` returns `None`
/// for an unknown id rather than an error.
#[async_trait]
pub trait MailSearch: Send + Sync {
    async fn search_sent(&self, query: &SentQuery) -> Result<Vec<MailMessage>, MailError>;

    async fn get_thread(&self, thread_id: &str) -> Result<Option<MailThread>, MailError>;
}
