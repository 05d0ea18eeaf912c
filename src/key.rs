//! Key Transform
//!
//! Maps object identifiers to backend-relative keys.
//!
//! ## Layout
//! ```text
//! e3b0c44298fc1c14...  →  e3/b0/c44298fc1c14...
//!  ││ ││ └──────────────────┘
//!  ││ ││      remainder (file name)
//!  ││ └┴─ second-level shard
//!  └┴──── first-level shard
//! ```
//!
//! The layout is part of the on-disk/in-bucket format and must not change.

use crate::error::{Result, StoreError};

/// Segment separator used in every key, on every backend
pub const KEY_SEPARATOR: char = '/';

/// Shard an identifier into `id[0:2]/id[2:4]/id[4:]`
///
/// Identifiers shorter than 5 characters are returned unchanged. Pure and
/// total; the result is stable across restarts and backends.
pub fn transform_key(id: &str) -> String {
    if id.len() < 5 || !id.is_char_boundary(2) || !id.is_char_boundary(4) {
        return id.to_string();
    }

    let mut key = String::with_capacity(id.len() + 2);
    key.push_str(&id[0..2]);
    key.push(KEY_SEPARATOR);
    key.push_str(&id[2..4]);
    key.push(KEY_SEPARATOR);
    key.push_str(&id[4..]);
    key
}

/// Attachment layout: `uuid[0]/uuid[1]/uuid`
pub fn attachment_key(uuid: &str) -> String {
    let mut chars = uuid.chars();
    match (chars.next(), chars.next()) {
        (Some(a), Some(b)) => format!("{a}{KEY_SEPARATOR}{b}{KEY_SEPARATOR}{uuid}"),
        _ => uuid.to_string(),
    }
}

/// Split a key into its segments, rejecting anything that could escape a root
///
/// Used by backends that map keys onto paths.
pub fn key_segments(key: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = key.split(KEY_SEPARATOR).collect();
    let bad = segments
        .iter()
        .any(|s| s.is_empty() || *s == "." || *s == ".." || s.contains('\\'));
    if bad {
        return Err(StoreError::InvalidIdentifier(key.to_string()));
    }
    Ok(segments)
}
