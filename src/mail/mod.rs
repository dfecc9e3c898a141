//! Mail-search collaborator — the interface the resolver and detector poll,
//! plus in-memory and `.eml`-directory backends.

pub mod address;
pub mod eml;
pub mod mailbox;
pub mod search;
pub mod types;

pub use address::{extract_address, recipients_include};
pub use eml::EmlDirectoryMailbox;
pub use mailbox::InMemoryMailbox;
pub use search::MailSearch;
pub use types::{MailMessage, MailThread, SearchCriterion, SentQuery};
