use std::path::{Path, PathBuf};

use vfuse_proto::FsError;

/// Check a wire path and resolve it under `root`.
///
/// Accepted paths are non-empty, relative, already in lexical clean form
/// and never climb out with `..`. `.` names the root itself. Anything else
/// is [`FsError::BadPath`] before storage is touched.
pub fn resolve(root: &Path, name: &str) -> Result<PathBuf, FsError> {
    if !is_clean_relative(name) {
        return Err(FsError::BadPath);
    }
    if name == "." {
        return Ok(root.to_path_buf());
    }
    Ok(root.join(name))
}

/// Whether `name` is a clean, relative, non-escaping slash path.
pub fn is_clean_relative(name: &str) -> bool {
    if name == "." {
        return true;
    }
    if name.is_empty() || name.starts_with('/') || name.contains('\0') {
        return false;
    }
    name.split('/')
        .all(|component| !matches!(component, "" | "." | ".."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_clean_relative_paths() {
        for name in [".", "a", "a/b", "dir/file.txt", "..a", "a..", ".hidden/x"] {
            assert!(is_clean_relative(name), "{name:?} should be accepted");
        }
    }

    #[test]
    fn rejects_unclean_or_escaping_paths() {
        for name in [
            "", "/", "/etc/passwd", "a/", "a//b", "./a", "a/.", "a/./b", "..", "../a", "a/..",
            "a/../b", "nul\0byte",
        ] {
            assert!(!is_clean_relative(name), "{name:?} should be rejected");
        }
    }

    #[test]
    fn dot_resolves_to_root() {
        let root = Path::new("/srv/share");
        assert_eq!(resolve(root, ".").unwrap(), root);
        assert_eq!(resolve(root, "a/b").unwrap(), root.join("a/b"));
        assert_eq!(resolve(root, "../x").unwrap_err(), FsError::BadPath);
    }
}
