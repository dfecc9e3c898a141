//! Partial contact updates for `ContactStore::write_fields`.

use chrono::{DateTime, Utc};

use super::model::{Contact, ContactStatus};

/// A single mutable contact field and its new value.
#[derive(Debug, Clone, PartialEq)]
pub enum ContactField {
    CurrentStep(u32),
    Status(ContactStatus),
    LastEmailDate(Option<DateTime<Utc>>),
    NextStepDate(Option<DateTime<Utc>>),
    StepOneSubject(String),
    StepOneMessageId(Option<String>),
    ThreadId(Option<String>),
    ReplyReceived(bool),
    ReplyDate(Option<DateTime<Utc>>),
    CallCompleted(bool),
}

impl ContactField {
    /// Stable field name, used for logging and as the store column name.
    pub fn name(&self) -> &'static str {
        match self {
            ContactField::CurrentStep(_) => "current_step",
            ContactField::Status(_) => "status",
            ContactField::LastEmailDate(_) => "last_email_date",
            ContactField::NextStepDate(_) => "next_step_date",
            ContactField::StepOneSubject(_) => "step_one_subject",
            ContactField::StepOneMessageId(_) => "step_one_message_id",
            ContactField::ThreadId(_) => "thread_id",
            ContactField::ReplyReceived(_) => "reply_received",
            ContactField::ReplyDate(_) => "reply_date",
            ContactField::CallCompleted(_) => "call_completed",
        }
    }

    fn apply(&self, contact: &mut Contact) {
        match self.clone() {
            ContactField::CurrentStep(v) => contact.current_step = v,
            ContactField::Status(v) => contact.status = v,
            ContactField::LastEmailDate(v) => contact.last_email_date = v,
            ContactField::NextStepDate(v) => contact.next_step_date = v,
            ContactField::StepOneSubject(v) => contact.step_one_subject = v,
            ContactField::StepOneMessageId(v) => contact.step_one_message_id = v,
            ContactField::ThreadId(v) => contact.thread_id = v,
            ContactField::ReplyReceived(v) => contact.reply_received = v,
            ContactField::ReplyDate(v) => contact.reply_date = v,
            ContactField::CallCompleted(v) => contact.call_completed = v,
        }
    }
}

/// An ordered set of field updates for one contact row.
///
/// Each field appears at most once; setting a field twice keeps the last value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContactPatch {
    fields: Vec<ContactField>,
}

impl ContactPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a field update.
    pub fn set(mut self, field: ContactField) -> Self {
        self.fields.retain(|f| f.name() != field.name());
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[ContactField] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Apply every field to `contact` in place.
    pub fn apply_to(&self, contact: &mut Contact) {
        for field in &self.fields {
            field.apply(contact);
        }
    }

    /// Field names touched by this patch, for log lines.
    pub fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(ContactField::name).collect()
    }

    /// The minimal patch turning `before` into `after` for the mutable fields.
    pub fn diff(before: &Contact, after: &Contact) -> Self {
        let mut patch = Self::new();
        if before.current_step != after.current_step {
            patch = patch.set(ContactField::CurrentStep(after.current_step));
        }
        if before.status != after.status {
            patch = patch.set(ContactField::Status(after.status));
        }
        if before.last_email_date != after.last_email_date {
            patch = patch.set(ContactField::LastEmailDate(after.last_email_date));
        }
        if before.next_step_date != after.next_step_date {
            patch = patch.set(ContactField::NextStepDate(after.next_step_date));
        }
        if before.step_one_subject != after.step_one_subject {
            patch = patch.set(ContactField::StepOneSubject(after.step_one_subject.clone()));
        }
        if before.step_one_message_id != after.step_one_message_id {
            patch = patch.set(ContactField::StepOneMessageId(
                after.step_one_message_id.clone(),
            ));
        }
        if before.thread_id != after.thread_id {
            patch = patch.set(ContactField::ThreadId(after.thread_id.clone()));
        }
        if before.reply_received != after.reply_received {
            patch = patch.set(ContactField::ReplyReceived(after.reply_received));
        }
        if before.reply_date != after.reply_date {
            patch = patch.set(ContactField::ReplyDate(after.reply_date));
        }
        if before.call_completed != after.call_completed {
            patch = patch.set(ContactField::CallCompleted(after.call_completed));
        }
        patch
    }
}
