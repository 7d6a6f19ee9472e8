//! Filename validation and base-directory containment checks.
//!
//! [`validate_filename`] is a pure syntactic check performed before any
//! I/O. [`resolve_within`] runs afterwards against the real filesystem and
//! catches escapes a string check cannot see (symlinked directories).

use std::ffi::OsStr;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tokio::fs;

use super::SCRIPT_SUFFIX;
use crate::error::CoreError;

/// Allow-listed filename characters plus the mandatory suffix.
static FILENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._\-/]+\.rhai$").expect("valid regex"));

/// A validated, relative script path such as `tools/ping.rhai`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptPath(String);

impl ScriptPath {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The path with the script suffix removed (`tools/ping`).
    pub fn without_suffix(&self) -> &str {
        self.0.strip_suffix(SCRIPT_SUFFIX).unwrap_or(&self.0)
    }

    /// Path segments of [`Self::without_suffix`].
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.without_suffix().split('/')
    }
}

impl fmt::Display for ScriptPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<Path> for ScriptPath {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}

/// Validate an upload filename.
///
/// Rejects empty names, a missing `.rhai` suffix, absolute paths, `..`
/// segments, characters outside `[A-Za-z0-9._\-/]`, empty or `.` segments
/// and a bare suffix with no name in front of it.
pub fn validate_filename(filename: &str) -> Result<ScriptPath, CoreError> {
    let invalid = |msg: &str| Err(CoreError::Validation(msg.to_string()));

    if filename.is_empty() {
        return invalid("filename must not be empty");
    }
    if !filename.ends_with(SCRIPT_SUFFIX) {
        return invalid("filename must end with .rhai");
    }
    if filename.starts_with('/') || filename.starts_with('\\') || has_drive_prefix(filename) {
        return invalid("filename must be a relative path");
    }
    if filename.split(['/', '\\']).any(|segment| segment == "..") {
        return invalid("filename cannot contain parent directory traversal ('..')");
    }
    if filename.rsplit('/').next() == Some(SCRIPT_SUFFIX) {
        return invalid("filename must have a name before the .rhai suffix");
    }
    if !FILENAME_RE.is_match(filename) {
        return invalid("filename contains disallowed characters");
    }
    if filename
        .split('/')
        .any(|segment| segment.is_empty() || segment == ".")
    {
        return invalid("filename must not contain empty or '.' path segments");
    }

    Ok(ScriptPath(filename.to_string()))
}

/// `C:foo.rhai` style prefixes.
fn has_drive_prefix(filename: &str) -> bool {
    let bytes = filename.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Resolve `relative` under the canonical `base` and prove containment.
///
/// The destination itself must not be a symlink: writing through one would
/// replace whatever it points at, even another script inside the base. The
/// deepest existing ancestor is then canonicalized so symlinked directories
/// are followed before the check. A dangling symlink at any level is
/// refused.
pub async fn resolve_within(base: &Path, relative: &ScriptPath) -> Result<PathBuf, CoreError> {
    let joined = base.join(relative);
    if let Ok(meta) = fs::symlink_metadata(&joined).await {
        if meta.file_type().is_symlink() {
            return Err(CoreError::PathEscape(format!(
                "{} is a symlink",
                joined.display()
            )));
        }
    }

    let mut existing = joined.as_path();
    let mut tail: Vec<&OsStr> = Vec::new();

    let resolved = loop {
        match fs::canonicalize(existing).await {
            Ok(canonical) => break canonical,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if fs::symlink_metadata(existing).await.is_ok() {
                    return Err(CoreError::PathEscape(format!(
                        "{} is a dangling symlink",
                        existing.display()
                    )));
                }
                let (Some(parent), Some(name)) = (existing.parent(), existing.file_name()) else {
                    return Err(CoreError::PathEscape(joined.display().to_string()));
                };
                tail.push(name);
                existing = parent;
            }
            Err(e) => return Err(CoreError::Storage(e)),
        }
    };

    let destination = tail
        .iter()
        .rev()
        .fold(resolved, |acc, part| acc.join(part));

    if destination.starts_with(base) {
        Ok(destination)
    } else {
        Err(CoreError::PathEscape(destination.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn rejection(filename: &str) -> String {
        match validate_filename(filename) {
            Err(CoreError::Validation(msg)) => msg,
            other => panic!("expected validation error for {filename:?}, got {other:?}"),
        }
    }

    #[test]
    fn accepts_nested_relative_path() {
        let path = validate_filename("tools/ping.rhai").unwrap();
        assert_eq!(path.as_str(), "tools/ping.rhai");
        assert_eq!(path.without_suffix(), "tools/ping");
        assert_eq!(path.segments().collect::<Vec<_>>(), vec!["tools", "ping"]);
    }

    #[test]
    fn accepts_dashes_underscores_and_dots() {
        assert!(validate_filename("my-dir/v1.2_tool.rhai").is_ok());
    }

    #[test]
    fn rejects_empty() {
        assert!(rejection("").contains("empty"));
    }

    #[test]
    fn rejects_wrong_suffix() {
        assert!(rejection("tools/ping.py").contains(".rhai"));
    }

    #[test]
    fn rejects_absolute_paths() {
        assert!(rejection("/etc/evil.rhai").contains("relative"));
        assert!(rejection("C:evil.rhai").contains("relative"));
    }

    #[test]
    fn rejects_parent_traversal() {
        assert!(rejection("../evil.rhai").contains(".."));
        assert!(rejection("a/../../evil.rhai").contains(".."));
    }

    #[test]
    fn rejects_disallowed_characters() {
        assert!(rejection("tools/p ing.rhai").contains("disallowed"));
        assert!(rejection("tools\\ping.rhai").contains("disallowed"));
        assert!(rejection("tööls/ping.rhai").contains("disallowed"));
    }

    #[test]
    fn rejects_empty_and_dot_segments() {
        assert!(rejection("a//b.rhai").contains("segments"));
        assert!(rejection("./b.rhai").contains("segments"));
    }

    #[test]
    fn rejects_bare_suffix() {
        assert!(rejection(".rhai").contains("name before"));
        assert!(rejection("tools/.rhai").contains("name before"));
    }

    #[tokio::test]
    async fn resolves_inside_base() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let relative = validate_filename("tools/ping.rhai").unwrap();

        let resolved = resolve_within(&base, &relative).await.unwrap();
        assert_eq!(resolved, base.join("tools").join("ping.rhai"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinked_directory_escaping_base_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        std::os::unix::fs::symlink(outside.path(), base.join("linked")).unwrap();

        let relative = validate_filename("linked/evil.rhai").unwrap();
        let err = resolve_within(&base, &relative).await.unwrap_err();
        assert_matches!(err, CoreError::PathEscape(_));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dangling_symlink_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        std::os::unix::fs::symlink("/nonexistent/target.rhai", base.join("evil.rhai")).unwrap();

        let relative = validate_filename("evil.rhai").unwrap();
        let err = resolve_within(&base, &relative).await.unwrap_err();
        assert_matches!(err, CoreError::PathEscape(_));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_symlink_to_another_script_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        std::fs::write(base.join("target.rhai"), "fn handle() { 1 }").unwrap();
        std::os::unix::fs::symlink(base.join("target.rhai"), base.join("alias.rhai")).unwrap();

        let relative = validate_filename("alias.rhai").unwrap();
        let err = resolve_within(&base, &relative).await.unwrap_err();
        assert_matches!(err, CoreError::PathEscape(ref msg) if msg.ends_with("is a symlink"));
    }
}
