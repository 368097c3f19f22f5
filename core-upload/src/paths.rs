//! Object key layout.
//!
//! Every object lives at `{namespace_root}/{uid}/{file_name}`. The uid segment
//! is the only thing separating one user's files from another's.

use core_auth::UserId;

/// Prefix under which all of `uid`'s objects are stored, with trailing `/`.
pub fn user_prefix(namespace_root: &str, uid: &UserId) -> String {
    format!("{}/{}/", namespace_root, uid)
}

/// Full key of `file_name` in `uid`'s namespace.
pub fn object_key(namespace_root: &str, uid: &UserId, file_name: &str) -> String {
    format!("{}{}", user_prefix(namespace_root, uid), file_name)
}

/// Whether `name` can be used as the last segment of a key without
/// escaping the user's prefix.
pub fn is_single_segment(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// Split a file name at its last `.` into base and extension.
///
/// The extension keeps its leading dot and is empty when the name has none.
///
/// ```
/// use core_upload::paths::split_extension;
///
/// assert_eq!(split_extension("cat.png"), ("cat", ".png"));
/// assert_eq!(split_extension("backup.tar.gz"), ("backup.tar", ".gz"));
/// assert_eq!(split_extension("README"), ("README", ""));
/// ```
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) => name.split_at(idx),
        None => (name, ""),
    }
}

/// Extension without the dot, if the name has a non-empty one.
pub fn extension_of(name: &str) -> Option<&str> {
    let (_, ext) = split_extension(name);
    ext.strip_prefix('.').filter(|ext| !ext.is_empty())
}
