//! Input checks and path planning for forking a worktree.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{MuscatError, Result};

static BRANCH_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_\-./]+$").expect("valid branch name pattern"));

static PATH_UNSAFE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9\-_.]").expect("valid path pattern"));

/// Rejects branch names the fork flow does not accept.
pub fn validate_branch_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(MuscatError::InvalidBranchName {
            name: name.to_string(),
            reason: "Branch name is required".to_string(),
        });
    }
    if !BRANCH_NAME.is_match(name) {
        return Err(MuscatError::InvalidBranchName {
            name: name.to_string(),
            reason: "Branch name can only contain letters, numbers, hyphens, dots, and slashes"
                .to_string(),
        });
    }
    // git would read these as an option.
    if name.starts_with('-') {
        return Err(MuscatError::InvalidBranchName {
            name: name.to_string(),
            reason: "Branch name cannot start with a hyphen".to_string(),
        });
    }
    // Empty, `.` and `..` segments escape or collapse the worktree directory.
    if name.split('/').any(|segment| matches!(segment, "" | "." | "..")) {
        return Err(MuscatError::InvalidBranchName {
            name: name.to_string(),
            reason: "Branch name cannot contain empty, '.' or '..' segments".to_string(),
        });
    }
    Ok(())
}

/// Turns a branch name into a single directory name.
///
/// Example: `Feature/Auth Flow` -> `feature-authflow`
pub fn sanitize_branch_for_path(branch: &str) -> String {
    let dashed = branch.replace('/', "-");
    PATH_UNSAFE.replace_all(&dashed, "").to_lowercase()
}

/// Where a fork of `repo_name` onto `branch` is checked out by default.
///
/// Example: `~/code-craft/workspaces/myapp/feature-auth`
pub fn default_worktree_path(workspaces_dir: &Path, repo_name: &str, branch: &str) -> PathBuf {
    workspaces_dir
        .join(repo_name)
        .join(sanitize_branch_for_path(branch))
}

/// Last path component, or `Untitled` for paths without one.
pub fn repo_name_from_path(path: &str) -> String {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("Untitled")
        .to_string()
}
