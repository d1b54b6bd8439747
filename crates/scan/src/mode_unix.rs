//! Unix permission checks.

use std::fs::Metadata;
use std::os::unix::fs::PermissionsExt;

const WORLD_WRITABLE: u32 = 0o002;
const STICKY: u32 = 0o1000;
const SETGID: u32 = 0o2000;
const SETUID: u32 = 0o4000;

/// Flags world-writable entries (unless sticky) and set-id regular files.
///
/// Symlinks always report 0o777 and are skipped.
pub fn is_suspicious(meta: &Metadata) -> bool {
    if meta.file_type().is_symlink() {
        return false;
    }

    let mode = meta.permissions().mode();
    let world_writable = mode & WORLD_WRITABLE != 0 && mode & STICKY == 0;
    let set_id = meta.is_file() && mode & (SETUID | SETGID) != 0;

    world_writable || set_id
}
