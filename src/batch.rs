//! Cursor-bounded batch selection shared by the maintenance passes.
//!
//! Eligible contacts are ordered by email. A run starts just after the
//! persisted cursor (wrapping around to the beginning) and takes at most
//! `limit` contacts. Anything left over is picked up by the next run.

use crate::contacts::Contact;

/// The slice of contacts one pass should process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSlice {
    /// Indices into the input slice, in processing order.
    pub indices: Vec<usize>,
    /// Total eligible contacts, including deferred ones.
    pub eligible: usize,
    /// Where the next run should resume, when work was deferred.
    pub next_cursor: Option<String>,
}

impl BatchSlice {
    pub fn deferred(&self) -> usize {
        self.eligible - self.indices.len()
    }
}

pub fn select_batch(
    contacts: &[Contact],
    is_eligible: impl Fn(&Contact) -> bool,
    cursor: Option<&str>,
    limit: usize,
) -> BatchSlice {
    let mut order: Vec<usize> = contacts
        .iter()
        .enumerate()
        .filter(|(_, c)| is_eligible(c))
        .map(|(i, _)| i)
        .collect();
    order.sort_by(|&a, &b| contacts[a].email.cmp(&contacts[b].email).then(a.cmp(&b)));

    let eligible = order.len();
    let start = cursor
        .and_then(|cur| order.iter().position(|&i| contacts[i].email.as_str() > cur))
        .unwrap_or(0);
    order.rotate_left(start);
    order.truncate(limit);

    let next_cursor = if eligible > order.len() {
        order.last().map(|&i| contacts[i].email.clone())
    } else {
        None
    };

    BatchSlice {
        indices: order,
        eligible,
        next_cursor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::{NewContact, Priority, RowPosition};

    fn contacts(emails: &[&str]) -> Vec<Contact> {
        emails
            .iter()
            .enumerate()
            .map(|(i, e)| {
                NewContact {
                    email: (*e).into(),
                    name: String::new(),
                    company: String::new(),
                    title: String::new(),
                    sequence: "default".into(),
                    priority: Priority::Medium,
                }
                .into_contact(RowPosition(i as i64 + 1))
            })
            .collect()
    }

    fn emails(all: &[Contact], slice: &BatchSlice) -> Vec<String> {
        slice.indices.iter().map(|&i| all[i].email.clone()).collect()
    }

    #[test]
    fn everything_fits() {
        let all = contacts(&["c@x.com", "a@x.com", "b@x.com"]);
        let slice = select_batch(&all, |_| true, None, 10);
        assert_eq!(emails(&all, &slice), vec!["a@x.com", "b@x.com", "c@x.com"]);
        assert!(slice.next_cursor.is_none());
        assert_eq!(slice.deferred(), 0);
    }

    #[test]
    fn cap_defers_remainder_and_resumes() {
        let all = contacts(&["a@x.com", "b@x.com", "c@x.com", "d@x.com", "e@x.com"]);

        let first = select_batch(&all, |_| true, None, 2);
        assert_eq!(emails(&all, &first), vec!["a@x.com", "b@x.com"]);
        assert_eq!(first.next_cursor.as_deref(), Some("b@x.com"));
        assert_eq!(first.deferred(), 3);

        let second = select_batch(&all, |_| true, first.next_cursor.as_deref(), 2);
        assert_eq!(emails(&all, &second), vec!["c@x.com", "d@x.com"]);

        let third = select_batch(&all, |_| true, second.next_cursor.as_deref(), 2);
        assert_eq!(emails(&all, &third), vec!["e@x.com", "a@x.com"]);
    }

    #[test]
    fn cursor_past_end_wraps() {
        let all = contacts(&["a@x.com", "b@x.com"]);
        let slice = select_batch(&all, |_| true, Some("z@x.com"), 1);
        assert_eq!(emails(&all, &slice), vec!["a@x.com"]);
    }

    #[test]
    fn ineligible_are_skipped() {
        let all = contacts(&["a@x.com", "b@x.com", "c@x.com"]);
        let slice = select_batch(&all, |c| c.email != "b@x.com", None, 10);
        assert_eq!(emails(&all, &slice), vec!["a@x.com", "c@x.com"]);
        assert_eq!(slice.eligible, 2);
    }
}
