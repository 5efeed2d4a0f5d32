//! Reference name validation.
//!
//! Bookmark and tag names follow git-style conventions:
//! - Must be non-empty
//! - Must not contain whitespace, `~`, `^`, `:`, `?`, `*`, `[`, `\`
//! - Must not contain `..` or `@{`
//! - Must not start or end with `.` or `/`, nor end with `.lock`
//! - Components between slashes must be non-empty and not start with `.`
//!
//! Workspace ids and repository names are single path components.

use crate::error::{RefError, Result};
use crate::types::RefKind;

/// Characters that are forbidden anywhere in a reference name.
const FORBIDDEN_CHARS: &[char] = &[' ', '\t', '\n', '\r', '~', '^', ':', '?', '*', '[', '\\'];

const MAX_NAME_LEN: usize = 255;

fn invalid(kind: &'static str, name: &str, reason: impl Into<String>) -> RefError {
    RefError::InvalidName {
        kind,
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn check_common(kind: &'static str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(kind, name, "must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid(kind, name, format!("longer than {MAX_NAME_LEN} bytes")));
    }
    if let Some(ch) = name.chars().find(|c| FORBIDDEN_CHARS.contains(c) || c.is_control()) {
        return Err(invalid(kind, name, format!("contains forbidden character {ch:?}")));
    }
    if name.contains("..") {
        return Err(invalid(kind, name, "must not contain '..'"));
    }
    if name.contains("@{") {
        return Err(invalid(kind, name, "must not contain '@{'"));
    }
    if name.starts_with('.') || name.ends_with('.') {
        return Err(invalid(kind, name, "must not start or end with '.'"));
    }
    if name.ends_with(".lock") {
        return Err(invalid(kind, name, "must not end with '.lock'"));
    }
    Ok(())
}

/// Validate a bookmark or tag name.
///
/// ```
/// use anvil_refs::{validate_ref_name, RefKind};
///
/// assert!(validate_ref_name(RefKind::Bookmark, "main").is_ok());
/// assert!(validate_ref_name(RefKind::Bookmark, "feature/auth").is_ok());
/// assert!(validate_ref_name(RefKind::Tag, "bad..name").is_err());
/// ```
pub fn validate_ref_name(kind: RefKind, name: &str) -> Result<()> {
    let label = kind.as_str();
    check_common(label, name)?;

    if name.starts_with('/') || name.ends_with('/') {
        return Err(invalid(label, name, "must not start or end with '/'"));
    }
    for component in name.split('/') {
        if component.is_empty() {
            return Err(invalid(label, name, "path components must not be empty"));
        }
        if component.starts_with('.') {
            return Err(invalid(
                label,
                name,
                format!("component must not start with '.': {component:?}"),
            ));
        }
    }
    Ok(())
}

/// Validate a workspace id. Same character rules, no slashes.
pub fn validate_workspace_name(name: &str) -> Result<()> {
    check_common("workspace", name)?;
    if name.contains('/') {
        return Err(invalid("workspace", name, "must not contain '/'"));
    }
    Ok(())
}

/// Validate a hosted repository name. Used to map names onto directories,
/// so only `[A-Za-z0-9._-]` is accepted.
pub fn validate_repo_name(name: &str) -> Result<()> {
    check_common("repository", name)?;
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(invalid(
            "repository",
            name,
            "only ASCII letters, digits, '-', '_' and '.' are allowed",
        ));
    }
    Ok(())
}
