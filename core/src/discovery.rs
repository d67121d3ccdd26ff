//! Input discovery for a recorded game directory.
//!
//! A game directory holds the bootstrap record and the event log side by
//! side. An explicit path always wins; otherwise the last file, in
//! sorted name order, whose name ends with the expected suffix is used.

use crate::error::AuditResult;
use std::path::{Path, PathBuf};

pub const BOOT_SUFFIX: &str = "boot.json";
pub const EVENTS_SUFFIX: &str = ".events.jsonl";

/// The last entry of `dir`, in sorted name order, ending with `suffix`.
pub fn find_latest(dir: &Path, suffix: &str) -> AuditResult<Option<PathBuf>> {
    let mut matches = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let named = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(suffix));
        if named && path.is_file() {
            matches.push(path);
        }
    }
    matches.sort();
    Ok(matches.pop())
}

/// `explicit` if given, else the latest match in `dir`, else nothing.
pub fn resolve_input(
    explicit: Option<&str>,
    dir: Option<&Path>,
    suffix: &str,
) -> AuditResult<Option<PathBuf>> {
    if let Some(path) = explicit {
        return Ok(Some(PathBuf::from(path)));
    }
    match dir {
        Some(dir) => find_latest(dir, suffix),
        None => Ok(None),
    }
}
