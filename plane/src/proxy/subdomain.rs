//! Subdomain extraction and validation

use crate::errors::PlatformError;

/// Longest DNS label
pub const MAX_LABEL_LEN: usize = 63;

/// Strip the port from a `Host` value
pub fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // IPv6 literal, no subdomain possible anyway
        return host;
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Extract the subdomain label of a request host.
///
/// With `root_domain` set, the label is whatever precedes `.{root_domain}`.
/// Hosts outside the root domain fall back to their first label when they
/// have at least three. Returns `None` when there is no subdomain component.
/// The label is lowercased, as host names are case-insensitive.
pub fn extract_label(host: &str, root_domain: &str) -> Option<String> {
    find_label(host, root_domain).map(str::to_ascii_lowercase)
}

fn find_label<'a>(host: &'a str, root_domain: &str) -> Option<&'a str> {
    let host = strip_port(host.trim()).trim_end_matches('.');
    if host.is_empty() || host.starts_with('[') {
        return None;
    }

    let root = root_domain.trim_matches('.');
    if !root.is_empty() {
        if host.eq_ignore_ascii_case(root) {
            return None;
        }
        let suffix_len = root.len() + 1;
        let split = host.len().saturating_sub(suffix_len);
        if host.len() > suffix_len && host.is_char_boundary(split) {
            let (label, suffix) = host.split_at(split);
            if suffix.starts_with('.') && suffix[1..].eq_ignore_ascii_case(root) {
                return Some(label);
            }
        }
    }

    let mut parts = host.split('.');
    let first = parts.next()?;
    if parts.count() >= 2 {
        Some(first)
    } else {
        None
    }
}

/// Check a label against `^[A-Za-z0-9_-]{1,63}$`
pub fn validate_label(label: &str) -> Result<(), PlatformError> {
    let valid = !label.is_empty()
        && label.len() <= MAX_LABEL_LEN
        && label
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(PlatformError::Validation("invalid subdomain".to_string()))
    }
}
