//! # Name Guard
//!
//! Collection names and script names arrive straight from URL path segments.
//! This module decides which of them are allowed to reach the database driver
//! or the filesystem.
//!
//! ## Collection Rules
//! - 1-120 characters
//! - Must match `^[A-Za-z0-9_][A-Za-z0-9_.\-]*$`
//! - Must not use the reserved `system.` namespace
//!
//! ## Script Rules
//! - 1-64 characters of `[A-Za-z0-9_\-]` (no separators, no dots)

use crate::error::{DeckError, DeckResult};
use lazy_static::lazy_static;
use regex::Regex;

/// Maximum collection name length accepted by the guard
const MAX_COLLECTION_NAME: usize = 120;

/// Maximum script name length accepted by the guard
const MAX_SCRIPT_NAME: usize = 64;

lazy_static! {
    static ref COLLECTION_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.\-]*$").unwrap();
    static ref SCRIPT_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_\-]+$").unwrap();
}

/// Validates that a collection name is safe to hand to the driver
pub fn validate_collection_name(name: &str) -> DeckResult<()> {
    if name.is_empty() || name.len() > MAX_COLLECTION_NAME {
        return Err(DeckError::InvalidCollection(format!(
            "Collection name '{}' must be 1-{} characters",
            name, MAX_COLLECTION_NAME
        )));
    }

    if !COLLECTION_REGEX.is_match(name) {
        return Err(DeckError::InvalidCollection(format!(
            "Collection name '{}' contains invalid characters",
            name
        )));
    }

    if name.starts_with("system.") {
        return Err(DeckError::InvalidCollection(format!(
            "Collection '{}' is in the reserved system namespace",
            name
        )));
    }

    Ok(())
}

/// Validates a script base name (without extension)
pub fn validate_script_name(name: &str) -> DeckResult<()> {
    if name.is_empty() || name.len() > MAX_SCRIPT_NAME {
        return Err(DeckError::InvalidScript(format!(
            "Script name '{}' must be 1-{} characters",
            name, MAX_SCRIPT_NAME
        )));
    }

    if !SCRIPT_REGEX.is_match(name) {
        return Err(DeckError::InvalidScript(format!(
            "Script name '{}' may only contain letters, digits, '_' and '-'",
            name
        )));
    }

    Ok(())
}
