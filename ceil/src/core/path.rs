//! Lexical path helpers for sandbox containment.
//!
//! Nothing here touches the filesystem; symlink resolution lives in
//! [`crate::audit`].

use std::path::{Component, Path, PathBuf};

/// Join `relative` onto `root` and fold `.`/`..` components without
/// consulting the filesystem.
///
/// An absolute `relative` replaces `root`, the way [`Path::join`] does, so
/// `/etc/passwd` is judged on its own. `..` never climbs above the
/// filesystem root.
pub fn normalize_join(root: &Path, relative: &str) -> PathBuf {
    normalize(&root.join(relative))
}

/// Fold `.` and `..` components of `path` lexically.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// True when `path` equals `root` or lies beneath it, compared component-wise.
///
/// Both arguments are expected to be normalized already. Component comparison
/// keeps `/project-evil` from passing as a child of `/project`.
pub fn is_within(root: &Path, path: &Path) -> bool {
    path.starts_with(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_components_fold_lexically() {
        let root = Path::new("/project");
        assert_eq!(
            normalize_join(root, "src/../lib/./a.rs"),
            PathBuf::from("/project/lib/a.rs")
        );
        assert_eq!(
            normalize_join(root, "../../etc/passwd"),
            PathBuf::from("/etc/passwd")
        );
    }

    #[test]
    fn parent_never_climbs_above_filesystem_root() {
        assert_eq!(
            normalize(Path::new("/a/../../../b")),
            PathBuf::from("/b")
        );
    }

    #[test]
    fn absolute_target_replaces_root() {
        assert_eq!(
            normalize_join(Path::new("/project"), "/etc/hosts"),
            PathBuf::from("/etc/hosts")
        );
    }

    #[test]
    fn containment_is_component_wise() {
        let root = Path::new("/project");
        assert!(is_within(root, Path::new("/project")));
        assert!(is_within(root, Path::new("/project/a/b.txt")));
        assert!(!is_within(root, Path::new("/project-evil/a")));
        assert!(!is_within(root, Path::new("/etc/passwd")));
    }
}
