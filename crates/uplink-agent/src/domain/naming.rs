//! # Path Naming
//!
//! Where archives are staged and where they land.

use super::envelope::SourceCategory;
use std::path::{Component, Path, PathBuf};
use uplink_crypto::derive_name;

/// Scratch directory under the application root.
pub const SCRATCH_DIR: &str = ".tmp";

/// `<app_root>/.tmp`
pub fn scratch_dir(app_root: &Path) -> PathBuf {
    app_root.join(SCRATCH_DIR)
}

/// `<app_root>/.tmp/<pbkdf2(file_token, session_token)>.zip`
///
/// Runs 4096 PBKDF2 rounds; call from a blocking context when latency matters.
pub fn temp_artifact_path(app_root: &Path, file_token: &str, session_token: &str) -> PathBuf {
    scratch_dir(app_root).join(format!("{}.zip", derive_name(file_token, session_token)))
}

/// Resolve a control-plane path against the application root and normalize
/// `.` / `..` lexically.
pub fn resolve_path(app_root: &Path, raw: &str) -> PathBuf {
    let candidate = Path::new(raw);
    if candidate.is_absolute() {
        normalize(candidate)
    } else {
        normalize(&app_root.join(candidate))
    }
}

/// Directory an archive is extracted into: the destination itself for
/// `modules`, its parent otherwise.
pub fn extraction_root(destination: &Path, source: &SourceCategory) -> PathBuf {
    match source {
        SourceCategory::Modules => destination.to_path_buf(),
        SourceCategory::Other(_) => destination
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| destination.to_path_buf()),
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Never climb above the root
                if !matches!(
                    out.components().next_back(),
                    None | Some(Component::RootDir) | Some(Component::Prefix(_))
                ) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
