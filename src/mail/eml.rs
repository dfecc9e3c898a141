//! `.eml` directory mailbox.
//!
//! Parses every `.eml` file under a directory into an in-memory index.
//! Files anywhere under a `drafts/` subdirectory are marked as drafts.
//! Threads are keyed by the root of the `References` chain, falling back to
//! `In-Reply-To` and then the message's own id.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::DateTime;
use mail_parser::{HeaderValue, MessageParser};
use tracing::{debug, info, warn};

use crate::error::MailError;

use super::mailbox::InMemoryMailbox;
use super::search::MailSearch;
use super::types::{MailMessage, MailThread, SentQuery};

const DRAFTS_DIR: &str = "drafts";

pub struct EmlDirectoryMailbox {
    root: PathBuf,
    index: InMemoryMailbox,
}

impl EmlDirectoryMailbox {
    /// Load and index every `.eml` file under `dir`.
    ///
    /// Unparseable files are skipped with a warning.
    pub fn load(dir: &Path, self_address: &str) -> Result<Self, MailError> {
        if !dir.is_dir() {
            return Err(MailError::Unavailable(format!(
                "{} is not a directory",
                dir.display()
            )));
        }

        let mut files = Vec::new();
        collect_eml_files(dir, &mut files)?;
        files.sort();

        let parser = MessageParser::default();
        let mut messages = Vec::with_capacity(files.len());
        for path in &files {
            let raw = std::fs::read(path)?;
            match parse_message(&parser, &raw, path, is_draft_path(dir, path)) {
                Some(message) => messages.push(message),
                None => warn!(path = %path.display(), "Skipping unparseable .eml file"),
            }
        }

        info!(dir = %dir.display(), count = messages.len(), "Loaded mailbox");
        Ok(Self {
            root: dir.to_path_buf(),
            index: InMemoryMailbox::from_messages(self_address, messages),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn len(&self) -> usize {
        self.index.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.index.is_empty().await
    }
}

#[async_trait]
impl MailSearch for EmlDirectoryMailbox {
    async fn search_sent(&self, query: &SentQuery) -> Result<Vec<MailMessage>, MailError> {
        self.index.search_sent(query).await
    }

    async fn get_thread(&self, thread_id: &str) -> Result<Option<MailThread>, MailError> {
        self.index.get_thread(thread_id).await
    }
}

fn collect_eml_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), MailError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_eml_files(&path, out)?;
        } else if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("eml"))
        {
            out.push(path);
        }
    }
    Ok(())
}

fn is_draft_path(root: &Path, path: &Path) -> bool {
    path.strip_prefix(root)
        .map(|rel| {
            rel.parent()
                .is_some_and(|p| p.components().any(|c| c.as_os_str() == DRAFTS_DIR))
        })
        .unwrap_or(false)
}

fn parse_message(
    parser: &MessageParser,
    raw: &[u8],
    path: &Path,
    is_draft: bool,
) -> Option<MailMessage> {
    let parsed = parser.parse(raw)?;

    let id = parsed
        .message_id()
        .map(str::to_string)
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))?;

    let thread_id = first_header_text(parsed.references())
        .or_else(|| first_header_text(parsed.in_reply_to()))
        .unwrap_or_else(|| id.clone());

    let from = parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address.as_ref())
        .map(|s| s.to_string())
        .unwrap_or_default();

    let to = header_addresses(parsed.to());

    let date = parsed
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0));
    let Some(date) = date else {
        debug!(path = %path.display(), "Message has no usable Date header");
        return None;
    };

    Some(MailMessage {
        id,
        thread_id,
        from,
        to,
        subject: parsed.subject().unwrap_or_default().to_string(),
        date,
        is_draft,
    })
}

fn first_header_text(value: &HeaderValue) -> Option<String> {
    match value {
        HeaderValue::Text(text) => Some(text.to_string()),
        HeaderValue::TextList(list) => list.first().map(|t| t.to_string()),
        _ => None,
    }
}

fn header_addresses(addr: Option<&mail_parser::Address>) -> Vec<String> {
    let Some(addr) = addr else {
        return Vec::new();
    };
    match addr {
        mail_parser::Address::List(addrs) => addrs
            .iter()
            .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            .collect(),
        mail_parser::Address::Group(groups) => groups
            .iter()
            .flat_map(|g| {
                g.addresses
                    .iter()
                    .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::types::SearchCriterion;

    fn write(dir: &Path, rel: &str, body: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, body).unwrap();
    }

    const OUTBOUND: &str = "Message-ID: <m1@example.com>\r\n\
From: Me <me@example.com>\r\n\
To: Lead <lead@example.com>\r\n\
Subject: Quick question\r\n\
Date: Wed, 10 Jan 2024 15:00:00 +0000\r\n\
\r\n\
Hello there.\r\n";

    const REPLY: &str = "Message-ID: <m2@example.com>\r\n\
From: lead@example.com\r\n\
To: me@example.com\r\n\
Subject: Re: Quick question\r\n\
In-Reply-To: <m1@example.com>\r\n\
References: <m1@example.com>\r\n\
Date: Thu, 11 Jan 2024 09:30:00 +0000\r\n\
\r\n\
Sounds good.\r\n";

    const DRAFT: &str = "Message-ID: <d1@example.com>\r\n\
From: me@example.com\r\n\
To: lead@example.com\r\n\
Subject: Quick question\r\n\
Date: Wed, 10 Jan 2024 14:00:00 +0000\r\n\
\r\n\
Draft.\r\n";

    fn subject_query() -> SentQuery {
        SentQuery {
            recipient: "lead@example.com".into(),
            criterion: SearchCriterion::SubjectExact("Quick question".into()),
            limit: 10,
        }
    }

    #[tokio::test]
    async fn loads_and_threads_messages() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "sent/outbound.eml", OUTBOUND);
        write(dir.path(), "inbox/reply.eml", REPLY);
        write(dir.path(), "notes.txt", "not mail");

        let mb = EmlDirectoryMailbox::load(dir.path(), "me@example.com").unwrap();
        assert_eq!(mb.len().await, 2);

        let found = mb.search_sent(&subject_query()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "m1@example.com");
        assert_eq!(found[0].thread_id, "m1@example.com");
        assert!(!found[0].is_draft);

        let thread = mb.get_thread("m1@example.com").await.unwrap().unwrap();
        let ids: Vec<&str> = thread.chronological().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1@example.com", "m2@example.com"]);
        assert_eq!(
            thread.chronological()[1].sender().as_deref(),
            Some("lead@example.com")
        );
    }

    #[tokio::test]
    async fn drafts_directory_marks_drafts() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "drafts/draft.eml", DRAFT);
        write(dir.path(), "outbound.eml", OUTBOUND);

        let mb = EmlDirectoryMailbox::load(dir.path(), "me@example.com").unwrap();
        let found = mb.search_sent(&subject_query()).await.unwrap();
        let draft = found.iter().find(|m| m.id == "d1@example.com").unwrap();
        assert!(draft.is_draft);
        let sent = found.iter().find(|m| m.id == "m1@example.com").unwrap();
        assert!(!sent.is_draft);
    }

    #[test]
    fn missing_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = EmlDirectoryMailbox::load(&dir.path().join("nope"), "me@example.com")
            .err()
            .unwrap();
        assert!(matches!(err, MailError::Unavailable(_)));
    }
}
