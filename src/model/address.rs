//! Sender address extraction from `From:` header values.

use std::sync::LazyLock;

use regex::Regex;

/// Greedy `prefix<address>` pattern. The leading `.*` backtracks, so with
/// several `<...>` groups the last one that still has a `>` after it wins.
static ANGLE_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.*)<(.*)>").expect("static regex is valid"));

/// Extract the canonical sender address from a raw `From:` header value.
///
/// # Examples
/// - `"Jane Doe <jane@example.com>"` → `"jane@example.com"`
/// - `"<jane@example.com>"` → `"jane@example.com"`
/// - `"jane@example.com"` → `"jane@example.com"` (returned verbatim)
pub fn sender_of(from_header: &str) -> String {
    match ANGLE_ADDRESS.captures(from_header) {
        Some(caps) => caps
            .get(2)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default(),
        None => from_header.to_string(),
    }
}

/// The domain part of a sender address: text after the first `@`, up to the next `@`.
///
/// Returns `None` when the address contains no `@`.
pub fn domain_of(sender: &str) -> Option<&str> {
    sender.split('@').nth(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_with_display_name() {
        assert_eq!(sender_of("Jane Doe <jane@example.com>"), "jane@example.com");
    }

    #[test]
    fn test_sender_angle_only() {
        assert_eq!(sender_of("<jane@example.com>"), "jane@example.com");
    }

    #[test]
    fn test_sender_bare_address() {
        assert_eq!(sender_of("jane@example.com"), "jane@example.com");
    }

    #[test]
    fn test_sender_quoted_display_name() {
        assert_eq!(
            sender_of("\"Doe, Jane\" <jane@example.com>"),
            "jane@example.com"
        );
    }

    #[test]
    fn test_sender_multiple_groups_takes_last() {
        assert_eq!(
            sender_of("Relay <relay@a.com> via <jane@b.com>"),
            "jane@b.com"
        );
    }

    #[test]
    fn test_sender_trailing_bracket_is_greedy() {
        assert_eq!(sender_of("x <jane@b.com> tail>"), "jane@b.com> tail");
    }

    #[test]
    fn test_sender_unclosed_last_group_backtracks() {
        assert_eq!(sender_of("a <jane@b.com> <broken"), "jane@b.com");
    }

    #[test]
    fn test_sender_empty() {
        assert_eq!(sender_of(""), "");
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(domain_of("a@b.com"), Some("b.com"));
        assert_eq!(domain_of("a@b.com@c.org"), Some("b.com"));
        assert_eq!(domain_of("a@"), Some(""));
        assert_eq!(domain_of("nobody"), None);
    }
}
