//! Project root detection and the path containment boundary.
//!
//! Nothing here holds state, so every function is safe to call from any
//! number of concurrent tool calls.

use std::path::{Component, Path, PathBuf};

use crate::error::ToolError;

/// Files or directories whose presence marks a project root.
pub const PROJECT_MARKERS: &[&str] = &[
    ".git",
    "package.json",
    "pyproject.toml",
    "Cargo.toml",
    "go.mod",
];

/// Makes `path` absolute against the process working directory and folds
/// `.`/`..` components without touching the filesystem.
pub fn absolutize(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    normalize_lexically(&joined)
}

/// Joins a relative tool input onto `base`; absolute inputs are kept as-is.
pub fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_lexically(path)
    } else {
        absolutize(&base.join(path))
    }
}

pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped =
                    matches!(out.components().next_back(), Some(Component::Normal(_))) && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Returns the nearest ancestor of `path` that contains a project marker.
///
/// The walk starts at `path` itself when it is a directory, otherwise at its
/// parent. Without any marker the immediate parent of `path` is returned.
pub fn find_root(path: &Path) -> PathBuf {
    let abs = absolutize(path);
    let start = if abs.is_dir() {
        abs.clone()
    } else {
        abs.parent().map(Path::to_path_buf).unwrap_or_else(|| abs.clone())
    };

    for dir in start.ancestors() {
        if PROJECT_MARKERS.iter().any(|marker| dir.join(marker).exists()) {
            return dir.to_path_buf();
        }
    }

    abs.parent().map(Path::to_path_buf).unwrap_or(abs)
}

/// Proves that `path` lies within `root` (or is `root` itself).
///
/// The comparison is component-wise, so `/work/project` is not inside
/// `/work/proj`. When the filesystem can resolve both sides the check is
/// repeated on canonical paths, which rejects symlinks pointing outside.
pub fn validate_within_root(path: &Path, root: &Path) -> Result<PathBuf, ToolError> {
    if !path.is_absolute() {
        return Err(ToolError::Security {
            path: path.to_path_buf(),
            message: format!("Path must be absolute: {}", path.display()),
        });
    }

    let abs = normalize_lexically(path);
    let abs_root = absolutize(root);

    if !abs.starts_with(&abs_root) {
        return Err(outside_workspace(path, root));
    }

    if let (Some(real), Ok(real_root)) = (canonical_existing_prefix(&abs), abs_root.canonicalize())
        && !real.starts_with(&real_root)
    {
        return Err(outside_workspace(path, root));
    }

    Ok(abs)
}

fn outside_workspace(path: &Path, root: &Path) -> ToolError {
    ToolError::Security {
        path: path.to_path_buf(),
        message: format!(
            "Path \"{}\" is outside workspace \"{}\". File operations are restricted to the project directory.",
            path.display(),
            root.display()
        ),
    }
}

/// Canonicalizes the deepest existing ancestor of `path` and re-appends the
/// components that do not exist yet (targets of create/rename).
fn canonical_existing_prefix(path: &Path) -> Option<PathBuf> {
    let mut missing = Vec::new();
    let mut current = path;
    loop {
        if let Ok(real) = current.canonicalize() {
            let mut out = real;
            for part in missing.iter().rev() {
                out.push(part);
            }
            return Some(out);
        }
        missing.push(current.file_name()?.to_os_string());
        current = current.parent()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn validate_accepts_nested_path_and_root_itself() {
        let root = Path::new("/root/proj");
        let ok = validate_within_root(Path::new("/root/proj/sub/f.ts"), root).unwrap();
        assert_eq!(ok, PathBuf::from("/root/proj/sub/f.ts"));
        validate_within_root(Path::new("/root/proj"), root).unwrap();
    }

    #[test]
    fn validate_rejects_sibling_and_prefix_lookalike() {
        let root = Path::new("/root/proj");
        let err = validate_within_root(Path::new("/root/other/f.ts"), root).unwrap_err();
        assert!(matches!(err, ToolError::Security { .. }));
        assert!(err.to_string().contains("outside workspace"));

        let err = validate_within_root(Path::new("/root/project/f.ts"), root).unwrap_err();
        assert!(matches!(err, ToolError::Security { .. }));
    }

    #[test]
    fn validate_rejects_parent_traversal_and_relative_paths() {
        let root = Path::new("/root/proj");
        let err = validate_within_root(Path::new("/root/proj/../other/f.ts"), root).unwrap_err();
        assert!(matches!(err, ToolError::Security { .. }));

        let err = validate_within_root(Path::new("sub/f.ts"), root).unwrap_err();
        assert!(err.to_string().contains("must be absolute"));
    }

    #[cfg(unix)]
    #[test]
    fn validate_rejects_symlink_escaping_root() {
        let root_dir = tempdir().unwrap();
        let outside_dir = tempdir().unwrap();
        std::fs::write(outside_dir.path().join("secret.txt"), "x").unwrap();
        std::os::unix::fs::symlink(outside_dir.path(), root_dir.path().join("link")).unwrap();

        let target = root_dir.path().join("link").join("secret.txt");
        let err = validate_within_root(&target, root_dir.path()).unwrap_err();
        assert!(matches!(err, ToolError::Security { .. }));
    }

    #[test]
    fn validate_accepts_not_yet_existing_file_inside_root() {
        let root_dir = tempdir().unwrap();
        let target = root_dir.path().join("new").join("file.rs");
        validate_within_root(&target, root_dir.path()).unwrap();
    }

    #[test]
    fn find_root_prefers_nearest_marker() {
        let dir = tempdir().unwrap();
        let outer = dir.path();
        let inner = outer.join("packages").join("app");
        std::fs::create_dir_all(inner.join("src")).unwrap();
        std::fs::create_dir(outer.join(".git")).unwrap();
        std::fs::write(inner.join("package.json"), "{}").unwrap();
        let file = inner.join("src").join("index.ts");
        std::fs::write(&file, "export {}\n").unwrap();

        assert_eq!(find_root(&file), absolutize(&inner));
    }

    #[test]
    fn find_root_starts_from_directory_argument() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("proj");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join("Cargo.toml"), "[package]\n").unwrap();

        assert_eq!(find_root(&project), absolutize(&project));
    }

    #[test]
    fn find_root_falls_back_to_parent_without_markers() {
        let file = Path::new("/lspx-no-markers-here/deep/file.py");
        assert_eq!(find_root(file), PathBuf::from("/lspx-no-markers-here/deep"));
    }

    #[test]
    fn normalize_folds_dots_without_escaping_filesystem_root() {
        assert_eq!(
            normalize_lexically(Path::new("/a/./b/../c")),
            PathBuf::from("/a/c")
        );
        assert_eq!(normalize_lexically(Path::new("/../a")), PathBuf::from("/a"));
        assert_eq!(normalize_lexically(Path::new("../a")), PathBuf::from("../a"));
    }

    #[test]
    fn resolve_against_joins_relative_inputs() {
        let base = Path::new("/work/repo");
        assert_eq!(
            resolve_against(base, Path::new("src/../lib.rs")),
            PathBuf::from("/work/repo/lib.rs")
        );
        assert_eq!(
            resolve_against(base, Path::new("/elsewhere/x.rs")),
            PathBuf::from("/elsewhere/x.rs")
        );
    }
}
