//! Header address parsing — just enough to compare senders and recipients.

use std::sync::LazyLock;

use regex::Regex;

use crate::contacts::normalize_email;

static ANGLE_ADDR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\s*([^<>\s]+@[^<>\s]+)\s*>").unwrap());

static BARE_ADDR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([^\s<>,;:"']+@[^\s<>,;:"']+)"#).unwrap());

/// Pull the address out of a header value such as `"Ann Lee" <Ann@Example.com>`.
///
/// Returns the normalized address, or `None` if the value holds no address.
pub fn extract_address(header: &str) -> Option<String> {
    ANGLE_ADDR
        .captures(header)
        .or_else(|| BARE_ADDR.captures(header))
        .and_then(|c| c.get(1))
        .map(|m| normalize_email(m.as_str()))
}

/// All normalized addresses in a comma-separated recipient header.
pub fn extract_addresses(header: &str) -> Vec<String> {
    header.split(',').filter_map(extract_address).collect()
}

/// Whether any recipient entry resolves to `email`.
pub fn recipients_include(recipients: &[String], email: &str) -> bool {
    let target = normalize_email(email);
    recipients
        .iter()
        .flat_map(|r| extract_addresses(r))
        .any(|addr| addr == target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_display_name_form() {
        assert_eq!(
            extract_address(r#""Ann Lee" <Ann@Example.com>"#).as_deref(),
            Some("ann@example.com")
        );
    }

    #[test]
    fn extracts_bare_address() {
        assert_eq!(
            extract_address("  BOB@example.org ").as_deref(),
            Some("bob@example.org")
        );
    }

    #[test]
    fn no_address_found() {
        assert!(extract_address("undisclosed-recipients").is_none());
        assert!(extract_address("").is_none());
    }

    #[test]
    fn recipient_lists_are_split() {
        let to = vec!["Ann <ann@example.com>, carl@example.com".to_string()];
        assert!(recipients_include(&to, "Carl@Example.com"));
        assert!(recipients_include(&to, "ann@example.com"));
        assert!(!recipients_include(&to, "dave@example.com"));
    }
}
