//! Locating the external tools (`git`, `gh`) the adapters shell out to.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Resolve a tool, preferring an explicitly configured path.
///
/// A configured value may be an absolute path or a bare name looked up on
/// `PATH`. When nothing is configured `default_name` is looked up instead.
pub fn resolve_tool(configured: Option<&str>, default_name: &str) -> Option<PathBuf> {
    match configured.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => find_bin(value),
        None => find_bin(default_name),
    }
}

/// Look up `command` on `PATH`, falling back to the usual system locations
/// when `PATH` is unset or empty.
pub fn find_bin(command: &str) -> Option<PathBuf> {
    let path = Path::new(command);
    if path.components().count() > 1 {
        return path.is_file().then(|| path.to_path_buf());
    }

    let names = candidate_names(command);
    search_paths()
        .into_iter()
        .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}

fn search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(env_path) = std::env::var_os("PATH")
        && !env_path.to_string_lossy().trim().is_empty()
    {
        push_unique_paths(&mut paths, std::env::split_paths(&env_path));
    }

    if paths.is_empty() {
        push_unique_paths(&mut paths, default_search_paths());
    }

    paths
}

fn default_search_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        ["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin", "/bin"]
            .into_iter()
            .map(PathBuf::from)
            .collect()
    }
    #[cfg(target_os = "linux")]
    {
        ["/usr/local/bin", "/usr/bin", "/bin"]
            .into_iter()
            .map(PathBuf::from)
            .collect()
    }
    #[cfg(target_os = "windows")]
    {
        let mut paths = Vec::new();
        if let Some(root) = std::env::var_os("SystemRoot") {
            let root = PathBuf::from(root);
            paths.push(root.join("System32"));
            paths.push(root);
        }
        if let Some(program_files) = std::env::var_os("ProgramFiles") {
            let program_files = PathBuf::from(program_files);
            paths.push(program_files.join("Git").join("cmd"));
            paths.push(program_files.join("GitHub CLI"));
        }
        paths
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        Vec::new()
    }
}

fn candidate_names(command: &str) -> Vec<OsString> {
    #[cfg(target_os = "windows")]
    {
        let mut names = vec![OsString::from(command)];
        if Path::new(command).extension().is_none() {
            let exts =
                std::env::var("PATHEXT").unwrap_or_else(|_| ".COM;.EXE;.BAT;.CMD".to_string());
            names.extend(
                exts.split(';')
                    .map(str::trim)
                    .filter(|ext| !ext.is_empty())
                    .map(|ext| OsString::from(format!("{command}{ext}"))),
            );
        }
        names
    }
    #[cfg(not(target_os = "windows"))]
    {
        vec![OsString::from(command)]
    }
}

fn push_unique_paths<I>(dest: &mut Vec<PathBuf>, paths: I)
where
    I: IntoIterator<Item = PathBuf>,
{
    for path in paths {
        if !dest.contains(&path) {
            dest.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_bin_missing() {
        assert!(find_bin("non_existent_binary_12345").is_none());
        assert!(find_bin("/definitely/not/here/tool").is_none());
    }

    #[test]
    fn test_resolve_tool_ignores_blank_override() {
        assert_eq!(
            resolve_tool(Some("  "), "non_existent_binary_12345"),
            find_bin("non_existent_binary_12345")
        );
    }

    #[test]
    fn test_resolve_tool_uses_absolute_override() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("my-git");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();
        let resolved = resolve_tool(Some(tool.to_str().unwrap()), "git");
        assert_eq!(resolved, Some(tool));
    }

    #[test]
    fn test_push_unique_paths() {
        let mut dest = vec![PathBuf::from("/a")];
        push_unique_paths(&mut dest, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(dest, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }

    #[test]
    fn test_candidate_names_include_command() {
        assert!(candidate_names("gh").contains(&OsString::from("gh")));
    }
}
