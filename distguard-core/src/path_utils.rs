//! Path helpers shared by the walker and the pipeline
//!
//! Reports always use forward slashes so the same build gives the same JSON on
//! every platform.

use std::io;
use std::path::{Component, Path, PathBuf};

/// Normalize path to forward slashes
#[inline]
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Convert a path to a normalized string
#[inline]
pub fn path_to_string(path: &Path) -> String {
    normalize_path(&path.to_string_lossy())
}

/// `dist` + `.old` → `dist.old`, in the same parent directory
pub fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// Absolute form of `path` with `.` and `..` folded, without touching the filesystem
pub fn lexical_absolute(path: &Path) -> io::Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Whether `inner` is `outer` or lies below it
pub fn is_within(inner: &Path, outer: &Path) -> bool {
    inner.starts_with(outer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("assets\\js\\app.js"), "assets/js/app.js");
        assert_eq!(normalize_path("assets/js/app.js"), "assets/js/app.js");
        assert_eq!(normalize_path(""), "");
    }

    #[test]
    fn test_sibling_with_suffix() {
        let path = PathBuf::from("site").join("dist");
        assert_eq!(
            sibling_with_suffix(&path, ".distguard-old"),
            PathBuf::from("site").join("dist.distguard-old")
        );
    }

    #[test]
    fn test_lexical_absolute_folds_dots() {
        let base = std::env::current_dir().unwrap();
        let path = lexical_absolute(Path::new("./a/../b")).unwrap();
        assert_eq!(path, base.join("b"));
        assert!(path.is_absolute());
    }

    #[test]
    fn test_is_within() {
        assert!(is_within(Path::new("/p/dist/x"), Path::new("/p/dist")));
        assert!(is_within(Path::new("/p/dist"), Path::new("/p/dist")));
        assert!(!is_within(Path::new("/p/dist-protected"), Path::new("/p/dist")));
    }
}
