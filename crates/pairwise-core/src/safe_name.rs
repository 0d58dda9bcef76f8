//! Oracle-safe identifiers derived from display names.

use std::collections::BTreeSet;

/// Fallback identifier when a display name has no usable characters.
pub const FALLBACK_SAFE_NAME: &str = "P";

/// Derive an identifier matching `[A-Za-z0-9_]+` from `display_name`, unique
/// against `issued`.
///
/// Whitespace runs collapse to a single `_`, every other character outside the
/// identifier alphabet is dropped, and collisions get a `_2`, `_3`, ... suffix.
#[must_use]
pub fn make_safe_name(display_name: &str, issued: &BTreeSet<String>) -> String {
    let mut base = String::with_capacity(display_name.len());
    let mut in_whitespace = false;
    for ch in display_name.chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                base.push('_');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        if ch.is_ascii_alphanumeric() || ch == '_' {
            base.push(ch);
        }
    }
    if base.is_empty() {
        base.push_str(FALLBACK_SAFE_NAME);
    }

    if !issued.contains(&base) {
        return base;
    }
    let mut suffix = 2usize;
    loop {
        let candidate = format!("{base}_{suffix}");
        if !issued.contains(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}
