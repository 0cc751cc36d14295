// src/utils/validate.rs

//! Identifier and address validation shared by the crawler and the write path.

use std::sync::LazyLock;

use regex::Regex;

static POST_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9/_-]+$").expect("post ID pattern is valid"));

/// Whether `post_id` only uses letters, digits, `/`, `-` and `_`.
pub fn is_valid_post_id(post_id: &str) -> bool {
    POST_ID.is_match(post_id)
}

/// Loose structural check of an email address.
///
/// One `@`, a non-empty local part, a dotted domain, and no whitespace or angle brackets.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(|c| c.is_whitespace() || c == '<' || c == '>') {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let mut labels = domain.split('.');
    let first = labels.next().unwrap_or_default();
    let rest: Vec<&str> = labels.collect();
    !first.is_empty() && !rest.is_empty() && rest.iter().all(|l| !l.is_empty())
}

/// Strip a single trailing `/` from a post path, leaving the root path alone.
pub fn normalize_post_id(post_id: &str) -> &str {
    match post_id.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => post_id,
    }
}
