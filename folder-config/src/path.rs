//! Path canonicalization for index keys.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use path_absolutize::Absolutize;

/// Canonical absolute form of `path`, usable as an index key.
///
/// The longest existing ancestor is resolved through the filesystem (so
/// symlinked prefixes such as a temp dir agree with walked paths) and the
/// missing remainder is appended lexically. Paths that no longer exist, like
/// the source of a move or a deleted folder, still map to the key they were
/// indexed under.
pub fn canonicalize(path: &Path) -> PathBuf {
    let absolute = match path.absolutize() {
        Ok(absolute) => absolute.into_owned(),
        Err(_) => path.to_path_buf(),
    };

    let mut existing = absolute.as_path();
    let mut missing: Vec<&OsStr> = Vec::new();
    loop {
        if let Ok(mut resolved) = dunce::canonicalize(existing) {
            for part in missing.iter().rev() {
                resolved.push(part);
            }
            return resolved;
        }

        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name);
                existing = parent;
            }
            _ => return absolute.clone(),
        }
    }
}

/// Rewrite `path` from under `from` to under `to`.
pub fn rebase(path: &Path, from: &Path, to: &Path) -> Option<PathBuf> {
    let rest = path.strip_prefix(from).ok()?;
    if rest.as_os_str().is_empty() {
        Some(to.to_path_buf())
    } else {
        Some(to.join(rest))
    }
}
