// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Utility functions for Loom
//!
//! Pure helpers shared by the tools and the binary.

use crate::error::{LoomError, Result};
use std::path::{Component, Path, PathBuf};

/// Find the project root by looking for common manifest files
///
/// Searches from the given directory upward for project markers.
pub fn find_project_root_from(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir;
    let manifest_files = ["package.json", "tsconfig.json", "jsconfig.json", ".git"];

    loop {
        for manifest in &manifest_files {
            if current.join(manifest).exists() {
                return Some(current.to_path_buf());
            }
        }

        match current.parent() {
            Some(parent) => current = parent,
            None => return None,
        }
    }
}

/// Format an error for display to the user
pub fn format_error(error: &LoomError) -> String {
    match error {
        LoomError::StorageConnectivity { .. } => format!(
            "Error: {}\nCheck the storage path in ~/.loom/settings.json and that the directory is writable.",
            error
        ),
        LoomError::IndexingInProgress(_) => {
            format!("Error: {}\nWait for the running index to finish.", error)
        }
        LoomError::Llm(_) => format!(
            "Error: {}\nIs the model server running? Check llm.base_url in ~/.loom/settings.json.",
            error
        ),
        _ => format!("Error: {}", error),
    }
}

/// Resolve a project-relative path, rejecting anything that escapes the root.
///
/// `..` segments are folded lexically, so paths to files that do not exist
/// yet are accepted. The deepest part of the result that exists on disk is
/// then resolved through symlinks and must still lie under the root.
pub fn resolve_project_path(root: &Path, relative: &str) -> Result<PathBuf> {
    let relative = relative.trim();
    if relative.is_empty() {
        return Err(LoomError::InvalidInput("Path must not be empty".to_string()));
    }

    let candidate = Path::new(relative);
    let stripped = if candidate.is_absolute() {
        candidate.strip_prefix(root).map_err(|_| {
            LoomError::InvalidInput(format!("Path '{}' is outside the project root", relative))
        })?
    } else {
        candidate
    };

    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in stripped.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(LoomError::InvalidInput(format!(
                        "Path '{}' is outside the project root",
                        relative
                    )));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(LoomError::InvalidInput(format!(
                    "Path '{}' is outside the project root",
                    relative
                )));
            }
        }
    }

    let mut resolved = root.to_path_buf();
    resolved.extend(parts);
    ensure_physically_inside(root, &resolved, relative)?;
    Ok(resolved)
}

/// Reject `path` when its existing prefix resolves outside `root`.
fn ensure_physically_inside(root: &Path, path: &Path, relative: &str) -> Result<()> {
    // A root that is not on disk holds nothing a link could point out of.
    let Ok(real_root) = root.canonicalize() else {
        return Ok(());
    };
    let Some(existing) = path.ancestors().find(|p| p.symlink_metadata().is_ok()) else {
        return Ok(());
    };
    let outside = || LoomError::InvalidInput(format!("Path '{}' is outside the project root", relative));
    // Dangling links fail here too.
    let real = existing.canonicalize().map_err(|_| outside())?;
    if real.starts_with(&real_root) {
        Ok(())
    } else {
        Err(outside())
    }
}

/// Project-relative, `/`-separated form of an absolute path under `root`.
pub fn relative_path_string(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// First `max` characters of `s`, with an ellipsis when cut.
pub fn truncate_chars(s: &str, max: usize) -> String {
    let line = s.lines().next().unwrap_or_default();
    if line.chars().count() <= max && line.len() == s.len() {
        return line.to_string();
    }
    let cut: String = line.chars().take(max).collect();
    format!("{}…", cut)
}

/// Check if a command is an exit command
pub fn is_exit_command(input: &str) -> bool {
    let trimmed = input.trim().to_lowercase();
    matches!(trimmed.as_str(), "exit" | "quit" | "/exit" | "/quit")
}

/// Parse a slash command into (command_name, arguments)
///
/// Returns None if the input is not a slash command.
pub fn parse_slash_command(input: &str) -> Option<(&str, &str)> {
    let without_slash = input.trim().strip_prefix('/')?;
    match without_slash.find(char::is_whitespace) {
        Some(idx) => Some((&without_slash[..idx], without_slash[idx..].trim())),
        None => Some((without_slash, "")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("héllo world", 5), "héllo…");
        assert_eq!(truncate_chars("first\nsecond", 20), "first…");
    }

    #[test]
    fn test_find_project_root() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        let nested = dir.path().join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_project_root_from(&nested), Some(dir.path().to_path_buf()));
    }

    #[test]
    fn test_resolve_project_path_accepts_inner_paths() {
        let root = Path::new("/project");
        assert_eq!(
            resolve_project_path(root, "src/a.ts").unwrap(),
            PathBuf::from("/project/src/a.ts")
        );
        assert_eq!(
            resolve_project_path(root, "./src/../lib/b.ts").unwrap(),
            PathBuf::from("/project/lib/b.ts")
        );
        assert_eq!(
            resolve_project_path(root, "/project/src/c.ts").unwrap(),
            PathBuf::from("/project/src/c.ts")
        );
    }

    #[test]
    fn test_resolve_project_path_rejects_escapes() {
        let root = Path::new("/project");
        assert!(resolve_project_path(root, "../etc/passwd").is_err());
        assert!(resolve_project_path(root, "src/../../x").is_err());
        assert!(resolve_project_path(root, "/etc/passwd").is_err());
        assert!(resolve_project_path(root, "  ").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_project_path_rejects_symlink_escapes() {
        use std::os::unix::fs::symlink;

        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("passwd"), "secret").unwrap();
        let project = TempDir::new().unwrap();
        let root = project.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        symlink(outside.path(), root.join("vendor")).unwrap();
        symlink(outside.path().join("passwd"), root.join("src/passwd.ts")).unwrap();
        symlink(root.join("missing-target"), root.join("dangling.ts")).unwrap();
        symlink(root.join("src"), root.join("alias")).unwrap();

        assert!(resolve_project_path(root, "vendor/passwd").is_err());
        assert!(resolve_project_path(root, "vendor/new/file.ts").is_err());
        assert!(resolve_project_path(root, "vendor").is_err());
        assert!(resolve_project_path(root, "src/passwd.ts").is_err());
        assert!(resolve_project_path(root, "dangling.ts").is_err());

        assert!(resolve_project_path(root, "alias/a.ts").is_ok());
        assert!(resolve_project_path(root, "src/not/yet/created.ts").is_ok());
        assert!(resolve_project_path(root, "src").is_ok());
    }

    #[test]
    fn test_relative_path_string() {
        assert_eq!(
            relative_path_string(Path::new("/p"), Path::new("/p/src/a.ts")),
            "src/a.ts"
        );
    }

    #[test]
    fn test_format_error_adds_hint() {
        let msg = format_error(&LoomError::StorageConnectivity {
            attempts: 3,
            message: "refused".into(),
        });
        assert!(msg.contains("settings.json"));
        assert_eq!(
            format_error(&LoomError::Session("x".into())),
            "Error: Session error: x"
        );
    }

    #[test]
    fn test_exit_and_slash_commands() {
        assert!(is_exit_command(" QUIT "));
        assert!(!is_exit_command("quitter"));
        assert_eq!(parse_slash_command("/undo"), Some(("undo", "")));
        assert_eq!(parse_slash_command("/stats  now "), Some(("stats", "now")));
        assert_eq!(parse_slash_command("hello"), None);
    }
}
