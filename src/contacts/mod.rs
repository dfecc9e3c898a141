//! Contact records tracked through outreach sequences.

pub mod model;
pub mod patch;

pub use model::{Contact, ContactStatus, NewContact, Priority, RowPosition, normalize_email};
pub use patch::{ContactField, ContactPatch};
