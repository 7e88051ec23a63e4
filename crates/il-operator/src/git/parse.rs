//! Git output parsing helpers.

use std::process::Output;

use super::types::StagedChange;

/// Formats a git error with both stdout and stderr for better debugging.
pub fn format_git_error(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

    match (stderr.is_empty(), stdout.is_empty()) {
        (true, true) => format!(
            "Command failed with exit code {}",
            output.status.code().unwrap_or(-1)
        ),
        (true, false) => stdout,
        (false, true) => stderr,
        (false, false) => format!("{}\n{}", stderr, stdout),
    }
}

/// Parses `git status --porcelain` output into the entries staged in the index.
///
/// Untracked (`??`) and worktree-only changes are ignored.
pub fn parse_staged_changes(porcelain: &str) -> Vec<StagedChange> {
    let mut staged = Vec::new();

    for line in porcelain.lines() {
        if line.len() < 4 || line.starts_with("##") || line.starts_with("??") {
            continue;
        }
        let index_status = line.chars().next().unwrap_or(' ');
        if index_status == ' ' {
            continue;
        }

        let file_path = line[3..].trim();
        // Renames are reported as "R  old -> new"
        let path = file_path
            .rsplit_once(" -> ")
            .map(|(_, new)| new)
            .unwrap_or(file_path);

        staged.push(StagedChange {
            path: path.trim_matches('"').to_string(),
            status: index_status,
        });
    }

    staged
}

/// Picks the revision for `reference` out of `git ls-remote` output.
///
/// Branches win over tags; annotated tags resolve to the peeled commit.
/// Without a reference the `HEAD` line is used.
pub fn parse_ls_remote(output: &str, reference: Option<&str>) -> Option<String> {
    let refs: Vec<(&str, &str)> = output
        .lines()
        .filter_map(|line| line.split_once('\t'))
        .map(|(sha, name)| (sha.trim(), name.trim()))
        .collect();

    let find = |wanted: &str| {
        refs.iter()
            .find(|(_, name)| *name == wanted)
            .map(|(sha, _)| sha.to_string())
    };

    match reference {
        None => find("HEAD"),
        Some(reference) => find(&format!("refs/heads/{}", reference))
            .or_else(|| find(&format!("refs/tags/{}^{{}}", reference)))
            .or_else(|| find(&format!("refs/tags/{}", reference)))
            .or_else(|| find(reference)),
    }
}

/// Returns true if `value` looks like a full commit id.
pub fn is_full_sha(value: &str) -> bool {
    value.len() == 40 && value.chars().all(|c| c.is_ascii_hexdigit())
}
