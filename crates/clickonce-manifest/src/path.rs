//! Path conventions for manifest-relative file references.
//!
//! Manifests may use either `\` or `/` as separator. Everything here works on
//! the slash-normalized form.

/// Extension identifying application manifests, which are traversed instead
/// of being treated as plain payload.
pub const MANIFEST_EXTENSION: &str = ".manifest";

/// Replace backslash separators with forward slashes.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Last element of a slash-separated path.
///
/// Trailing slashes are ignored, an empty path yields `"."` and a path made
/// only of slashes yields `"/"`.
pub fn file_name(path: &str) -> &str {
    if path.is_empty() {
        return ".";
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/";
    }
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Extension of the last path element, including the leading dot, or `""`.
pub fn extension(path: &str) -> &str {
    for (idx, b) in path.bytes().enumerate().rev() {
        match b {
            b'/' => break,
            b'.' => return &path[idx..],
            _ => {}
        }
    }
    ""
}

pub fn is_manifest(name: &str) -> bool {
    extension(name) == MANIFEST_EXTENSION
}
