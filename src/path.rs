//! Lexical path helpers. Nothing here touches the filesystem except
//! [`cwd`].

use std::path::{Component, Path, PathBuf};

const FILE_PROTOCOL: &str = "file://";

pub fn cwd() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"))
}

/// `file:///a/b` → `/a/b`; anything else is returned unchanged.
pub fn strip_file_protocol(path: &str) -> &str {
    path.strip_prefix(FILE_PROTOCOL).unwrap_or(path)
}

/// Collapses `.` and `..` components without consulting the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolves `path` against `base`, the way a shell would resolve a
/// relative path from inside `base`.
pub fn resolve(base: &Path, path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        normalize(path)
    } else if base.is_absolute() {
        normalize(&base.join(path))
    } else {
        normalize(&cwd().join(base).join(path))
    }
}

pub fn absolute(path: impl AsRef<Path>) -> PathBuf {
    resolve(&cwd(), path)
}

pub fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map_or_else(cwd, Path::to_path_buf)
}

/// Path of `to` relative to the directory `from`. Both are made absolute
/// first.
pub fn relative(from: &Path, to: &Path) -> PathBuf {
    let from = absolute(from);
    let to = absolute(to);

    let from_parts: Vec<_> = from.components().collect();
    let to_parts: Vec<_> = to.components().collect();
    let common = from_parts
        .iter()
        .zip(&to_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..from_parts.len() {
        out.push("..");
    }
    for part in &to_parts[common..] {
        out.push(part.as_os_str());
    }
    out
}

/// Renders a path with forward slashes regardless of platform.
pub fn slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
