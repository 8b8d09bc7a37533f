use std::path::{Component, Path, PathBuf};

/// Directory that confines every file tool.
///
/// Paths given by providers are interpreted relative to the root. Absolute
/// paths are accepted only when they already point inside it.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// Sandbox rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The confining directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `requested` to a path inside the root, or explains why not.
    pub fn resolve(&self, requested: &str) -> Result<PathBuf, String> {
        if requested.trim().is_empty() {
            return Err("Empty path".into());
        }
        let requested_path = Path::new(requested);
        let relative = if requested_path.is_absolute() {
            requested_path
                .strip_prefix(&self.root)
                .map_err(|_| format!("Access denied: '{requested}' is outside the sandbox"))?
                .to_path_buf()
        } else {
            requested_path.to_path_buf()
        };

        let mut resolved = self.root.clone();
        let mut depth = 0usize;
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    if depth == 0 {
                        return Err(format!(
                            "Access denied: '{requested}' escapes the sandbox"
                        ));
                    }
                    resolved.pop();
                    depth -= 1;
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(format!("Access denied: '{requested}' is not a sandbox path"));
                }
            }
        }

        // Symlinks inside the root must not lead out of it, even when the
        // final path does not exist yet.
        if let Ok(real_root) = self.root.canonicalize() {
            let real = deepest_existing(&resolved)
                .canonicalize()
                .map_err(|e| format!("Cannot resolve '{requested}': {e}"))?;
            if !real.starts_with(&real_root) {
                return Err(format!("Access denied: '{requested}' escapes the sandbox"));
            }
        }
        Ok(resolved)
    }

    /// Root-relative display form of a resolved path.
    pub fn display(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string()
    }
}

/// `path` itself, or its nearest ancestor that exists on disk.
fn deepest_existing(path: &Path) -> &Path {
    let mut current = path;
    while std::fs::symlink_metadata(current).is_err() {
        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }
    current
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_stay_inside() {
        let sandbox = Sandbox::new("/srv/work");
        assert_eq!(
            sandbox.resolve("notes/a.txt").unwrap(),
            PathBuf::from("/srv/work/notes/a.txt")
        );
        assert_eq!(
            sandbox.resolve("notes/../b.txt").unwrap(),
            PathBuf::from("/srv/work/b.txt")
        );
    }

    #[test]
    fn escapes_are_denied() {
        let sandbox = Sandbox::new("/srv/work");
        assert!(sandbox.resolve("../etc/passwd").is_err());
        assert!(sandbox.resolve("/etc/passwd").is_err());
        assert!(sandbox.resolve("").is_err());
    }

    #[test]
    fn absolute_paths_inside_root_are_accepted() {
        let sandbox = Sandbox::new("/srv/work");
        assert_eq!(
            sandbox.resolve("/srv/work/x").unwrap(),
            PathBuf::from("/srv/work/x")
        );
        assert_eq!(sandbox.display(Path::new("/srv/work/x/y")), "x/y");
    }

    #[cfg(unix)]
    #[test]
    fn symlink_out_of_root_is_denied() {
        let outside = tempfile::TempDir::new().unwrap();
        let root = tempfile::TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), root.path().join("link")).unwrap();
        let sandbox = Sandbox::new(root.path());
        assert!(sandbox.resolve("link").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn new_file_under_symlinked_dir_is_denied() {
        let outside = tempfile::TempDir::new().unwrap();
        let root = tempfile::TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), root.path().join("escape")).unwrap();
        let sandbox = Sandbox::new(root.path());
        assert!(sandbox.resolve("escape/new.txt").is_err());
        assert!(sandbox.resolve("escape/deeper/new.txt").is_err());

        std::fs::create_dir(root.path().join("real")).unwrap();
        assert!(sandbox.resolve("real/new.txt").is_ok());
        assert!(sandbox.resolve("missing/dir/new.txt").is_ok());
    }
}
