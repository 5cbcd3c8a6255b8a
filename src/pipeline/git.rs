//! Git helpers
//!
//! Thin wrappers over the `git` binary, each command bounded by its own
//! timeout. Nothing here mutates the repository.

use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::ai::timeout::with_timeout;
use crate::constants::git::{
    DIFF_TIMEOUT_SECS, LOG_TIMEOUT_SECS, PROBE_TIMEOUT_SECS, SHOW_TIMEOUT_SECS,
};
use crate::types::{Result, ScoutError};

static HUNK_NEW_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\+(\d+)").expect("Hardcoded hunk header regex pattern should be valid")
});

struct GitOutput {
    success: bool,
    stdout: String,
}

async fn git(dir: &Path, args: &[&str], timeout_secs: u64) -> Result<GitOutput> {
    let label = format!("git {}", args.first().copied().unwrap_or_default());
    let child = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ScoutError::Git(format!("Failed to spawn git: {}", e)))?;

    let output = with_timeout(
        Duration::from_secs(timeout_secs),
        async {
            child
                .wait_with_output()
                .await
                .map_err(|e| ScoutError::Git(format!("{} failed: {}", label, e)))
        },
        &label,
    )
    .await?;

    if !output.status.success() {
        debug!(
            "{} exited with {}: {}",
            label,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(GitOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
    })
}

async fn is_work_tree(dir: &Path) -> bool {
    matches!(
        git(dir, &["rev-parse", "--git-dir"], PROBE_TIMEOUT_SECS).await,
        Ok(GitOutput { success: true, .. })
    )
}

/// Uncommitted changes under `path` (a file or directory), falling back to
/// staged changes. `None` outside a work tree, when the tree is clean, or
/// when git itself is unavailable.
pub async fn working_tree_diff(path: &Path) -> Option<String> {
    let (dir, file_arg) = if path.is_file() {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        (parent, path.file_name().and_then(|n| n.to_str()))
    } else {
        (path, None)
    };

    if !is_work_tree(dir).await {
        return None;
    }

    let mut unstaged = vec!["diff", "HEAD"];
    let mut staged = vec!["diff", "--cached"];
    if let Some(file) = file_arg {
        unstaged.push(file);
        staged.push(file);
    }

    for args in [unstaged, staged] {
        match git(dir, &args, DIFF_TIMEOUT_SECS).await {
            Ok(out) if !out.stdout.is_empty() => return Some(out.stdout),
            Ok(_) => {}
            Err(e) => {
                warn!("Working tree diff failed: {}", e);
                return None;
            }
        }
    }
    None
}

/// A commit (or range) ready for the diff analyzer
#[derive(Debug, Clone, Default)]
pub struct CommitDiff {
    pub diff: String,
    pub message: String,
    /// Post-change contents of the changed files still present on disk
    pub file_contents: BTreeMap<String, String>,
    pub changed_lines: BTreeMap<String, Vec<usize>>,
}

/// Collect the diff of `commit` (or `compare_to..commit`), its message, and
/// the contents of at most `max_files` changed files
pub async fn commit_diff(
    project: &Path,
    commit: &str,
    compare_to: Option<&str>,
    max_files: usize,
) -> Result<CommitDiff> {
    let not_found =
        || ScoutError::Git("Could not get diff for commit. Check project path and commit ID.".into());

    if !project.is_dir() || !is_work_tree(project).await {
        return Err(not_found());
    }

    let (diff_args, files_args): (Vec<&str>, Vec<&str>) = match compare_to {
        Some(base) => (
            vec!["diff", base, commit],
            vec!["diff", "--name-only", base, commit],
        ),
        None => (
            vec!["show", commit, "--format=", "--patch"],
            vec!["show", commit, "--format=", "--name-only"],
        ),
    };

    let diff = git(project, &diff_args, SHOW_TIMEOUT_SECS).await?.stdout;
    if diff.is_empty() {
        return Err(not_found());
    }

    let message = git(project, &["log", "-1", "--format=%B", commit], LOG_TIMEOUT_SECS)
        .await?
        .stdout;

    let files = git(project, &files_args, LOG_TIMEOUT_SECS).await?.stdout;
    let mut file_contents = BTreeMap::new();
    for rel in files
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(max_files)
    {
        let full = project.join(rel);
        if !full.is_file() {
            continue;
        }
        match tokio::fs::read(&full).await {
            Ok(bytes) => {
                file_contents.insert(rel.to_string(), String::from_utf8_lossy(&bytes).into_owned());
            }
            Err(e) => debug!("Skipping changed file {}: {}", rel, e),
        }
    }

    let changed_lines = parse_diff_line_numbers(&diff);
    Ok(CommitDiff {
        diff,
        message,
        file_contents,
        changed_lines,
    })
}

/// New-side line numbers of added lines, per `+++ b/<path>` file
pub fn parse_diff_line_numbers(diff: &str) -> BTreeMap<String, Vec<usize>> {
    let mut changed: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    let mut current: Option<String> = None;
    let mut line_no = 0usize;

    for line in diff.split('\n') {
        if let Some(path) = line.strip_prefix("+++ b/") {
            changed.entry(path.to_string()).or_default();
            current = Some(path.to_string());
        } else if line.starts_with("@@ ") {
            if let Some(start) = HUNK_NEW_START
                .captures(line)
                .and_then(|c| c[1].parse::<usize>().ok())
            {
                line_no = start;
            }
        } else if let Some(file) = &current {
            if line.starts_with('+') && !line.starts_with("+++") {
                if let Some(lines) = changed.get_mut(file) {
                    lines.push(line_no);
                }
                line_no += 1;
            } else if !line.starts_with('-') {
                line_no += 1;
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DIFF: &str = "\
diff --git a/app/db.py b/app/db.py
--- a/app/db.py
+++ b/app/db.py
@@ -10,4 +10,5 @@ def query(name):
     conn = connect()
-    sql = \"SELECT * FROM users WHERE name = ?\"
+    sql = \"SELECT * FROM users WHERE name = '\" + name + \"'\"
+    log(sql)
     return conn.execute(sql)
diff --git a/app/new.py b/app/new.py
--- /dev/null
+++ b/app/new.py
@@ -0,0 +1,2 @@
+import os
+os.system(input())";

    #[test]
    fn test_parse_diff_line_numbers() {
        let lines = parse_diff_line_numbers(DIFF);
        assert_eq!(lines["app/db.py"], vec![11, 12]);
        assert_eq!(lines["app/new.py"], vec![1, 2]);
    }

    #[test]
    fn test_parse_ignores_lines_before_first_file() {
        let lines = parse_diff_line_numbers("+orphan\n@@ -1 +1 @@\n+x");
        assert!(lines.is_empty());
        assert!(parse_diff_line_numbers("").is_empty());
    }

    #[tokio::test]
    async fn test_non_repository_has_no_diff() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), "print(1)\n").unwrap();
        assert!(working_tree_diff(dir.path()).await.is_none());
        assert!(working_tree_diff(&dir.path().join("a.py")).await.is_none());
    }

    #[tokio::test]
    async fn test_commit_diff_rejects_missing_project() {
        let err = commit_diff(Path::new("/definitely/not/here"), "HEAD", None, 20)
            .await
            .unwrap_err();
        assert!(matches!(err, ScoutError::Git(_)));
    }

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    fn run(dir: &Path, args: &[&str]) {
        let status = std::process::Command::new("git")
            .args(["-c", "user.name=test", "-c", "user.email=test@example.com"])
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap()
            .status;
        assert!(status.success(), "git {:?} failed", args);
    }

    #[tokio::test]
    async fn test_commit_diff_and_working_tree_diff() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        run(root, &["init", "-q"]);
        std::fs::write(root.join("app.py"), "def f():\n    return 1\n").unwrap();
        run(root, &["add", "."]);
        run(root, &["commit", "-q", "-m", "initial"]);
        std::fs::write(root.join("app.py"), "def f():\n    return eval(input())\n").unwrap();
        run(root, &["commit", "-q", "-am", "use eval"]);

        let commit = commit_diff(root, "HEAD", None, 20).await.unwrap();
        assert_eq!(commit.message, "use eval");
        assert!(commit.diff.contains("eval(input())"));
        assert_eq!(commit.changed_lines["app.py"], vec![2]);
        assert!(commit.file_contents["app.py"].contains("eval"));

        let ranged = commit_diff(root, "HEAD", Some("HEAD~1"), 20).await.unwrap();
        assert_eq!(ranged.changed_lines["app.py"], vec![2]);

        assert!(working_tree_diff(root).await.is_none());
        std::fs::write(root.join("app.py"), "def f():\n    return 2\n").unwrap();
        let diff = working_tree_diff(&root.join("app.py")).await.unwrap();
        assert!(diff.contains("return 2"));
    }
}
