//! Stable entity keys.
//!
//! Key strategy:
//!   Person:  `person:email:<email>`     (when the email is known)
//!   Company: `company:domain:<domain>`  (when the domain is known)
//!   Topic:   `topic:<normalized name>`
//!   Fallback: `<type>:name:<normalized name>`
//!
//! Resolution is a pure function of the entity attributes. Documents
//! processed independently converge on the same key, and therefore on the
//! same graph node.

use unicode_normalization::{char::canonical_combining_class, UnicodeNormalization};

/// NFKD-decompose, drop combining marks, lowercase, collapse inner
/// whitespace, trim.
pub fn normalize(s: &str) -> String {
    let decomposed: String = s
        .nfkd()
        .filter(|c| canonical_combining_class(*c) == 0)
        .collect();
    decomposed
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn resolve_entity_key(
    entity_type: &str,
    name: &str,
    email: Option<&str>,
    domain: Option<&str>,
) -> String {
    let etype = entity_type.trim().to_lowercase();
    let etype = if etype.is_empty() { "unknown".to_string() } else { etype };

    let email = email.map(str::trim).filter(|e| !e.is_empty());
    let domain = domain.map(str::trim).filter(|d| !d.is_empty());

    match (etype.as_str(), email, domain) {
        ("person", Some(email), _) => format!("person:email:{}", email.to_lowercase()),
        ("company", _, Some(domain)) => format!("company:domain:{}", domain.to_lowercase()),
        ("topic", _, _) => format!("topic:{}", normalize(name)),
        _ => format!("{etype}:name:{}", normalize(name)),
    }
}
