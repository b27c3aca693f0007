//! Directory replacement
//!
//! On Linux with glibc the two directories are exchanged with a single
//! `renameat2(RENAME_EXCHANGE)`, so the canonical path always names a complete
//! tree. Elsewhere the old tree is first renamed to a backup sibling, leaving a
//! short window where the canonical path does not exist.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::path_utils::sibling_with_suffix;

/// Suffix of the backup sibling used by the rename fallback
pub const BACKUP_SUFFIX: &str = ".distguard-old";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapStrategy {
    /// Atomic exchange of the two directories
    Exchange,
    /// Old tree renamed aside, new tree renamed in
    RenameWithBackup,
}

#[derive(Debug, Error)]
pub enum SwapError {
    #[error("failed to move {} to {}: {source}", from.display(), to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("stale backup {} could not be removed: {source}", path.display())]
    StaleBackup { path: PathBuf, source: io::Error },
}

/// Put `replacement` at `target` and delete the tree that was there
pub fn replace_dir(target: &Path, replacement: &Path) -> Result<SwapStrategy, SwapError> {
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    {
        match exchange(target, replacement) {
            Ok(()) => {
                // the old tree now sits at the replacement path
                remove_old_tree(replacement);
                return Ok(SwapStrategy::Exchange);
            }
            Err(err) => {
                tracing::debug!(error = %err, "atomic exchange unavailable, renaming instead");
            }
        }
    }
    rename_with_backup(target, replacement)?;
    Ok(SwapStrategy::RenameWithBackup)
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn exchange(a: &Path, b: &Path) -> io::Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let to_c = |path: &Path| {
        CString::new(path.as_os_str().as_bytes())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))
    };
    let a = to_c(a)?;
    let b = to_c(b)?;
    // SAFETY: both pointers come from live CStrings and AT_FDCWD resolves them
    // relative to the working directory, as rename(2) would.
    let rc = unsafe {
        libc::renameat2(
            libc::AT_FDCWD,
            a.as_ptr(),
            libc::AT_FDCWD,
            b.as_ptr(),
            libc::RENAME_EXCHANGE,
        )
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

fn rename_with_backup(target: &Path, replacement: &Path) -> Result<(), SwapError> {
    let backup = sibling_with_suffix(target, BACKUP_SUFFIX);
    if backup.exists() {
        fs::remove_dir_all(&backup).map_err(|source| SwapError::StaleBackup {
            path: backup.clone(),
            source,
        })?;
    }

    fs::rename(target, &backup).map_err(|source| SwapError::Rename {
        from: target.to_path_buf(),
        to: backup.clone(),
        source,
    })?;

    if let Err(source) = fs::rename(replacement, target) {
        if let Err(restore) = fs::rename(&backup, target) {
            tracing::error!(
                backup = %backup.display(),
                error = %restore,
                "could not restore the original build, it is kept at the backup path"
            );
        }
        return Err(SwapError::Rename {
            from: replacement.to_path_buf(),
            to: target.to_path_buf(),
            source,
        });
    }

    remove_old_tree(&backup);
    Ok(())
}

/// The swap already succeeded, so a leftover tree is only worth a warning
fn remove_old_tree(path: &Path) {
    if let Err(err) = fs::remove_dir_all(path) {
        tracing::warn!(path = %path.display(), error = %err, "failed to remove the previous build");
    }
}
