//! Worktree operations against git.
//!
//! [`WorktreeBackend`] is what the engine talks to; [`GitCli`] implements it
//! by shelling out to `git`. Tests substitute an in-memory backend.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use fs_err as fs;

use crate::error::{MuscatError, Result};
use crate::types::WorktreeRecord;

/// git's complaint when removing a worktree with local changes.
const DIRTY_MARKERS: &[&str] = &["contains modified or untracked files", "use --force"];

pub trait WorktreeBackend {
    fn list_worktrees(&self, repo_path: &str) -> Result<Vec<WorktreeRecord>>;

    /// Creates `branch_name` from `base_branch` and checks it out at `worktree_path`.
    fn create_worktree(
        &self,
        repo_path: &str,
        worktree_path: &str,
        branch_name: &str,
        base_branch: &str,
    ) -> Result<WorktreeRecord>;

    /// Fails with [`MuscatError::DirtyWorktree`] when `force` is false and the
    /// worktree has local changes.
    fn remove_worktree(&self, repo_path: &str, worktree_path: &str, force: bool) -> Result<()>;

    /// Resolves the primary worktree path from any path inside the repository.
    fn main_repo_path(&self, current_path: &str) -> Result<String>;

    /// Whether the worktree has staged, unstaged or untracked changes.
    fn has_uncommitted_changes(&self, worktree_path: &str) -> Result<bool>;
}

/// Parses `git worktree list --porcelain`.
///
/// The first block is the primary worktree. A trailing block without a
/// terminating blank line is still emitted.
pub fn parse_worktree_list(output: &str) -> Vec<WorktreeRecord> {
    let mut records = Vec::new();
    let mut current: Option<WorktreeRecord> = None;

    for line in output.lines() {
        if line.trim().is_empty() {
            flush(&mut current, &mut records);
            continue;
        }

        if let Some(path) = line.strip_prefix("worktree ") {
            flush(&mut current, &mut records);
            current = Some(WorktreeRecord {
                path: path.to_string(),
                head: String::new(),
                branch: None,
                is_bare: false,
                is_detached: false,
                is_main: false,
            });
            continue;
        }

        let Some(record) = current.as_mut() else {
            continue;
        };
        if let Some(head) = line.strip_prefix("HEAD ") {
            record.head = head.to_string();
        } else if let Some(branch) = line.strip_prefix("branch ") {
            let name = branch.strip_prefix("refs/heads/").unwrap_or(branch);
            record.branch = Some(name.to_string());
        } else if line == "bare" {
            record.is_bare = true;
        } else if line == "detached" {
            record.is_detached = true;
        }
    }
    flush(&mut current, &mut records);

    records
}

fn flush(current: &mut Option<WorktreeRecord>, records: &mut Vec<WorktreeRecord>) {
    if let Some(mut record) = current.take() {
        record.is_main = records.is_empty();
        records.push(record);
    }
}

/// [`WorktreeBackend`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    git: PathBuf,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            git: PathBuf::from("git"),
        }
    }
}

impl GitCli {
    pub fn with_binary(git: PathBuf) -> Self {
        Self { git }
    }

    fn output(&self, dir: &str, args: &[&str]) -> Result<Output> {
        Command::new(&self.git)
            .args(args)
            .current_dir(dir)
            .output()
            .map_err(|e| MuscatError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                details: e.to_string(),
            })
    }

    /// Runs git in `dir` and returns trimmed stdout, or the stderr as an error.
    fn run(&self, dir: &str, args: &[&str]) -> Result<String> {
        let output = self.output(dir, args)?;
        if !output.status.success() {
            return Err(MuscatError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                details: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl WorktreeBackend for GitCli {
    fn list_worktrees(&self, repo_path: &str) -> Result<Vec<WorktreeRecord>> {
        let stdout = self.run(repo_path, &["worktree", "list", "--porcelain"])?;
        Ok(parse_worktree_list(&stdout))
    }

    fn create_worktree(
        &self,
        repo_path: &str,
        worktree_path: &str,
        branch_name: &str,
        base_branch: &str,
    ) -> Result<WorktreeRecord> {
        if !Path::new(repo_path).exists() {
            return Err(MuscatError::CommandFailed {
                command: "git worktree add".to_string(),
                details: format!("Repository path does not exist: {repo_path}"),
            });
        }
        self.run(repo_path, &["rev-parse", "--git-dir"])
            .map_err(|_| MuscatError::CommandFailed {
                command: "git rev-parse --git-dir".to_string(),
                details: format!("Not a git repository: {repo_path}"),
            })?;

        if let Some(parent) = Path::new(worktree_path).parent() {
            fs::create_dir_all(parent).map_err(|e| MuscatError::Io {
                context: format!("Failed to create directory {}", parent.display()),
                source: e,
            })?;
        }

        // An unknown base ref falls back to the current HEAD.
        let resolved = match self.run(repo_path, &["rev-parse", "--verify", base_branch]) {
            Ok(commit) => commit,
            Err(_) => {
                tracing::warn!(base_branch, "Base ref not found, forking from HEAD");
                self.run(repo_path, &["rev-parse", "HEAD"])?
            }
        };

        self.run(
            repo_path,
            &["worktree", "add", "-b", branch_name, worktree_path, resolved.as_str()],
        )?;

        // The new branch starts at `resolved`, so that is its HEAD.
        Ok(WorktreeRecord {
            path: worktree_path.to_string(),
            head: resolved,
            branch: Some(branch_name.to_string()),
            is_bare: false,
            is_detached: false,
            is_main: false,
        })
    }

    fn remove_worktree(&self, repo_path: &str, worktree_path: &str, force: bool) -> Result<()> {
        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push(worktree_path);

        let output = self.output(repo_path, &args)?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !force && DIRTY_MARKERS.iter().any(|m| stderr.contains(m)) {
            return Err(MuscatError::DirtyWorktree {
                path: worktree_path.to_string(),
            });
        }
        Err(MuscatError::CommandFailed {
            command: format!("git {}", args.join(" ")),
            details: stderr,
        })
    }

    fn main_repo_path(&self, current_path: &str) -> Result<String> {
        let common = self.run(current_path, &["rev-parse", "--git-common-dir"])?;
        let common_path = if Path::new(&common).is_absolute() {
            PathBuf::from(&common)
        } else {
            Path::new(current_path)
                .join(&common)
                .canonicalize()
                .map_err(|e| MuscatError::Io {
                    context: format!("Failed to resolve {common}"),
                    source: e,
                })?
        };

        let repo_root = if common_path.file_name().is_some_and(|n| n == ".git") {
            common_path.parent().map(Path::to_path_buf).unwrap_or(common_path)
        } else {
            common_path
        };
        Ok(repo_root.to_string_lossy().to_string())
    }

    fn has_uncommitted_changes(&self, worktree_path: &str) -> Result<bool> {
        let status = self.run(worktree_path, &["status", "--porcelain"])?;
        Ok(!status.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PORCELAIN: &str = "\
worktree /Users/dev/projects/myapp
HEAD abc1234def5678
branch refs/heads/main

worktree /Users/dev/projects/myapp-feature-auth
HEAD def5678abc1234
branch refs/heads/feature/authentication

worktree /Users/dev/projects/myapp-detached
HEAD 789abc123def45
detached
";

    #[test]
    fn test_parse_marks_first_as_main() {
        let records = parse_worktree_list(PORCELAIN);
        assert_eq!(records.len(), 3);
        assert!(records[0].is_main);
        assert!(!records[1].is_main);
        assert!(!records[2].is_main);
    }

    #[test]
    fn test_parse_strips_ref_prefix() {
        let records = parse_worktree_list(PORCELAIN);
        assert_eq!(records[0].branch.as_deref(), Some("main"));
        assert_eq!(records[1].branch.as_deref(), Some("feature/authentication"));
        assert_eq!(records[1].head, "def5678abc1234");
    }

    #[test]
    fn test_parse_detached_has_no_branch() {
        let records = parse_worktree_list(PORCELAIN);
        assert_eq!(records[2].branch, None);
        assert!(records[2].is_detached);
    }

    #[test]
    fn test_parse_last_block_without_blank_line() {
        let output = "worktree /r\nHEAD 1111\nbranch refs/heads/main\n\nworktree /r-x\nHEAD 2222\nbranch refs/heads/x";
        let records = parse_worktree_list(output);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].path, "/r-x");
        assert_eq!(records[1].branch.as_deref(), Some("x"));
    }

    #[test]
    fn test_parse_bare_repository() {
        let output = "worktree /srv/repo.git\nbare\n\nworktree /srv/wt\nHEAD 3333\nbranch refs/heads/dev\n";
        let records = parse_worktree_list(output);
        assert!(records[0].is_bare);
        assert!(records[0].is_main);
        assert!(!records[1].is_bare);
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_worktree_list("").is_empty());
        assert!(parse_worktree_list("\n\n").is_empty());
    }

    #[test]
    fn test_parse_ignores_lines_before_first_worktree() {
        let records = parse_worktree_list("HEAD 000\nworktree /r\nHEAD 111\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].head, "111");
    }

    /// Writes an executable shell script standing in for `git`.
    #[cfg(unix)]
    fn fake_git(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("git");
        std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn test_create_reports_success_once_worktree_is_added() {
        let temp = tempfile::TempDir::new().unwrap();
        let repo = temp.path().join("repo");
        std::fs::create_dir_all(&repo).unwrap();
        // Anything other than the three calls below fails, including a
        // follow-up `rev-parse HEAD` inside the new worktree.
        let git = fake_git(
            temp.path(),
            r#"case "$1 $2" in
  "rev-parse --git-dir") echo .git ;;
  "rev-parse --verify") echo 1a2b3c4d5e6f7a8b ;;
  "worktree add") mkdir -p "$5" ;;
  *) echo "unexpected: $*" >&2; exit 1 ;;
esac
"#,
        );
        let worktree = temp.path().join("ws").join("child");

        let record = GitCli::with_binary(git)
            .create_worktree(
                repo.to_str().unwrap(),
                worktree.to_str().unwrap(),
                "child",
                "a",
            )
            .unwrap();

        assert!(worktree.exists());
        assert_eq!(record.head, "1a2b3c4d5e6f7a8b");
        assert_eq!(record.branch.as_deref(), Some("child"));
    }

    #[cfg(unix)]
    #[test]
    fn test_uncommitted_changes_from_porcelain_status() {
        let temp = tempfile::TempDir::new().unwrap();
        let dirty = GitCli::with_binary(fake_git(temp.path(), "echo ' M src/lib.rs'\n"));
        assert!(dirty.has_uncommitted_changes(".").unwrap());

        let other = tempfile::TempDir::new().unwrap();
        let clean = GitCli::with_binary(fake_git(other.path(), "exit 0\n"));
        assert!(!clean.has_uncommitted_changes(".").unwrap());
    }

    #[test]
    fn test_missing_binary_is_command_failure() {
        let git = GitCli::with_binary(PathBuf::from("/definitely/not/a/real/git"));
        let err = git.list_worktrees(".").unwrap_err();
        assert!(matches!(err, MuscatError::CommandFailed { .. }));
    }
}
