//! Branch naming rules.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Branch every content item starts on.
pub const DEFAULT_BRANCH: &str = "main";

/// Maximum allowed length for a branch name.
pub const MAX_BRANCH_NAME_LENGTH: usize = 100;

static BRANCH_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9-]+$").expect("valid regex"));

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a branch name: lowercase letters, digits and hyphens only, within
/// [`MAX_BRANCH_NAME_LENGTH`].
pub fn validate_branch_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::Validation(
            "Branch name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_BRANCH_NAME_LENGTH {
        return Err(CoreError::Validation(format!(
            "Branch name must not exceed {MAX_BRANCH_NAME_LENGTH} characters, got {}",
            name.len()
        )));
    }
    if !BRANCH_NAME_RE.is_match(name) {
        return Err(CoreError::Validation(format!(
            "Branch name '{name}' may only contain lowercase letters, digits and hyphens"
        )));
    }
    Ok(())
}

/// Change message recorded on the first version of a new branch.
pub fn branch_message(source_branch: &str, source_version: i32) -> String {
    format!("Branched from {source_branch} v{source_version}")
}
