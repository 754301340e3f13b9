//! Family grouping of similar entries
//!
//! Entries of the same shape (a SQL statement with different literals, an
//! exception with different ids in its message, a route with different path
//! ids) share a family hash. Normalization is a strategy so embedders can
//! tune what "similar" means.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Strategy used to reduce raw identifiers to their family shape
pub trait FamilyNormalizer: Send + Sync {
    /// Statement shape with literals replaced by `?`
    fn normalize_sql(&self, sql: &str) -> String;

    /// Class plus a bounded, digit-insensitive message prefix
    fn normalize_exception(&self, class: &str, message: &str) -> String;

    /// Route shape with numeric and uuid segments replaced by `{id}`
    fn normalize_path(&self, path: &str) -> String;
}

/// Built-in normalizer
#[derive(Debug, Clone)]
pub struct DefaultNormalizer {
    exception_chars: usize,
}

impl DefaultNormalizer {
    pub fn new(exception_chars: usize) -> Self {
        Self { exception_chars }
    }
}

impl Default for DefaultNormalizer {
    fn default() -> Self {
        Self::new(200)
    }
}

impl FamilyNormalizer for DefaultNormalizer {
    fn normalize_sql(&self, sql: &str) -> String {
        let mut out = String::with_capacity(sql.len());
        let mut chars = sql.chars().peekable();
        // Digits directly after an identifier char belong to the identifier
        let mut in_word = false;

        while let Some(c) = chars.next() {
            match c {
                '\'' => {
                    // '' is an escaped quote inside a literal
                    loop {
                        match chars.next() {
                            Some('\'') if chars.peek() == Some(&'\'') => {
                                chars.next();
                            }
                            Some('\'') | None => break,
                            Some(_) => {}
                        }
                    }
                    out.push('?');
                    in_word = false;
                }
                c if c.is_ascii_digit() && !in_word => {
                    while matches!(chars.peek(), Some(d) if d.is_ascii_digit() || *d == '.') {
                        chars.next();
                    }
                    out.push('?');
                }
                c if c.is_whitespace() => {
                    if !out.is_empty() && !out.ends_with(' ') {
                        out.push(' ');
                    }
                    in_word = false;
                }
                c => {
                    out.extend(c.to_lowercase());
                    in_word = c.is_alphanumeric() || c == '_';
                }
            }
        }

        collapse_placeholder_lists(out.trim_end())
    }

    fn normalize_exception(&self, class: &str, message: &str) -> String {
        let mut shape = String::with_capacity(class.len() + self.exception_chars + 2);
        shape.push_str(class);
        shape.push_str(": ");

        let mut last_was_digit = false;
        for c in message.chars().take(self.exception_chars) {
            if c.is_ascii_digit() {
                if !last_was_digit {
                    shape.push('N');
                }
                last_was_digit = true;
            } else {
                shape.push(c);
                last_was_digit = false;
            }
        }

        shape
    }

    fn normalize_path(&self, path: &str) -> String {
        let normalized: Vec<&str> = path
            .split('/')
            .map(|segment| {
                let is_id = (!segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()))
                    || Uuid::parse_str(segment).is_ok();
                if is_id {
                    "{id}"
                } else {
                    segment
                }
            })
            .collect();

        normalized.join("/")
    }
}

/// `IN (?, ?, ?)` and `(?,?)` collapse to a single placeholder
fn collapse_placeholder_lists(sql: &str) -> String {
    let mut out = sql.replace("?,?", "?, ?");
    while out.contains("?, ?") {
        out = out.replace("?, ?", "?");
    }
    out
}

/// Stable hash of a family shape
///
/// Parts are joined with a unit separator and hashed with SHA-256; the first
/// 16 bytes are returned as lowercase hex.
pub fn family_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\x1f");
        }
        hasher.update(part.as_bytes());
    }

    hasher.finalize()[..16]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
