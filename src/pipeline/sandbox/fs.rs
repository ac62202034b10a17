//! Read-only filesystem access confined to one root directory.
//!
//! Every path handed in or out is resolved with symlinks, `.` and `..`
//! expanded before the containment test, so `root/link/../..` or a symlink
//! pointing elsewhere cannot slip past a string-prefix comparison.

use std::io::Read;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use super::SandboxError;

/// Sandboxed, read-only view of a source tree.
#[derive(Debug, Clone)]
pub struct SandboxFs {
    root: PathBuf,
}

impl SandboxFs {
    /// Open a sandbox rooted at `root`. The root must exist and be a directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SandboxError> {
        let given = root.as_ref();
        let root = given
            .canonicalize()
            .map_err(|e| SandboxError::Configuration {
                root: given.to_path_buf(),
                reason: e.to_string(),
            })?;

        if !root.is_dir() {
            return Err(SandboxError::Configuration {
                root,
                reason: "not a directory".into(),
            });
        }

        tracing::debug!(root = %root.display(), "Sandbox opened");
        Ok(Self { root })
    }

    /// Canonical root of the sandbox.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `path` (relative to the root, or absolute) and ensure the
    /// result is the root or one of its descendants.
    pub fn resolve_under_root(&self, path: impl AsRef<Path>) -> Result<PathBuf, SandboxError> {
        let path = path.as_ref();
        let candidate = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        let resolved = resolve_lenient(&candidate);
        if !resolved.starts_with(&self.root) {
            tracing::warn!(path = %path.display(), "Sandbox violation rejected");
            return Err(SandboxError::Violation(resolved));
        }
        Ok(resolved)
    }

    /// All regular files with the given extension, sorted by path.
    ///
    /// Symlinks are neither followed into nor reported, so every returned
    /// path physically lives under the root.
    pub fn list_source_files(&self, extension: &str) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable directory entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(extension))
            .collect();

        files.sort();
        files
    }

    /// Same as [`list_source_files`](Self::list_source_files), as root-relative paths.
    pub fn list_relative_source_files(
        &self,
        extension: &str,
    ) -> Result<Vec<PathBuf>, SandboxError> {
        self.list_source_files(extension)
            .iter()
            .map(|path| self.to_relative(path))
            .collect()
    }

    /// Read a file under the root as text.
    ///
    /// Invalid UTF-8 is replaced with U+FFFD instead of failing.
    pub fn read_text(
        &self,
        path: impl AsRef<Path>,
        max_bytes: u64,
    ) -> Result<String, SandboxError> {
        let resolved = self.resolve_under_root(path)?;

        let metadata = match std::fs::metadata(&resolved) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SandboxError::NotFound(resolved));
            }
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            return Err(SandboxError::NotFound(resolved));
        }
        if metadata.len() > max_bytes {
            return Err(SandboxError::SizeLimitExceeded {
                path: resolved,
                size: metadata.len(),
                max_bytes,
            });
        }

        // Bounded read: the file may have grown since the metadata call.
        let mut bytes = Vec::with_capacity(metadata.len() as usize);
        std::fs::File::open(&resolved)?
            .take(max_bytes.saturating_add(1))
            .read_to_end(&mut bytes)?;
        if bytes.len() as u64 > max_bytes {
            return Err(SandboxError::SizeLimitExceeded {
                path: resolved,
                size: bytes.len() as u64,
                max_bytes,
            });
        }

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Convert a path under the root to its root-relative form.
    pub fn to_relative(&self, path: impl AsRef<Path>) -> Result<PathBuf, SandboxError> {
        let resolved = self.resolve_under_root(path)?;
        resolved
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .map_err(|_| SandboxError::Violation(resolved.clone()))
    }
}

/// Resolve `.`, `..` and symlinks like `realpath`, tolerating a tail that
/// does not exist yet. While inside a missing tail components are applied
/// lexically; a `..` that climbs back onto an existing path resumes
/// symlink resolution from there.
fn resolve_lenient(path: &Path) -> PathBuf {
    let mut resolved = PathBuf::new();
    let mut missing = false;

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
                if missing {
                    missing = !resolved.exists();
                }
            }
            Component::Normal(name) => {
                resolved.push(name);
                if missing {
                    continue;
                }
                match resolved.canonicalize() {
                    Ok(real) => resolved = real,
                    Err(_) => missing = true,
                }
            }
        }
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_tree() -> (tempfile::TempDir, SandboxFs) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir_all(root.join("pkg/sub")).unwrap();
        std::fs::write(root.join("main.py"), "print('main')\n").unwrap();
        std::fs::write(root.join("pkg/util.py"), "def f(): pass\n").unwrap();
        std::fs::write(root.join("pkg/sub/deep.py"), "X = 1\n").unwrap();
        std::fs::write(root.join("pkg/notes.txt"), "not python").unwrap();
        std::fs::write(dir.path().join("outside.py"), "SECRET = 1\n").unwrap();
        let fs = SandboxFs::new(&root).unwrap();
        (dir, fs)
    }

    #[test]
    fn rejects_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let result = SandboxFs::new(dir.path().join("nope"));
        assert!(matches!(result, Err(SandboxError::Configuration { .. })));
    }

    #[test]
    fn rejects_file_as_root() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file.py");
        std::fs::write(&file, "x").unwrap();
        let result = SandboxFs::new(&file);
        assert!(matches!(result, Err(SandboxError::Configuration { .. })));
    }

    #[test]
    fn lists_matching_files_in_sorted_order() {
        let (_dir, fs) = setup_tree();
        let files = fs.list_relative_source_files("py").unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from("main.py"),
                PathBuf::from("pkg/sub/deep.py"),
                PathBuf::from("pkg/util.py"),
            ]
        );
    }

    #[test]
    fn listing_is_stable_across_calls() {
        let (_dir, fs) = setup_tree();
        assert_eq!(fs.list_source_files("py"), fs.list_source_files("py"));
    }

    #[test]
    fn resolve_then_relative_round_trips() {
        let (_dir, fs) = setup_tree();
        for rel in fs.list_relative_source_files("py").unwrap() {
            let abs = fs.resolve_under_root(&rel).unwrap();
            assert_eq!(fs.to_relative(&abs).unwrap(), rel);
        }
    }

    #[test]
    fn parent_segments_escaping_root_are_rejected() {
        let (_dir, fs) = setup_tree();
        let result = fs.resolve_under_root("pkg/../../outside.py");
        assert!(matches!(result, Err(SandboxError::Violation(_))));

        let read = fs.read_text("pkg/sub/../../../outside.py", 1_000);
        assert!(matches!(read, Err(SandboxError::Violation(_))));
    }

    #[test]
    fn parent_segments_inside_root_are_allowed() {
        let (_dir, fs) = setup_tree();
        let resolved = fs.resolve_under_root("pkg/sub/../util.py").unwrap();
        assert_eq!(resolved, fs.root().join("pkg/util.py"));
    }

    #[test]
    fn missing_tail_cannot_climb_out() {
        let (_dir, fs) = setup_tree();
        let result = fs.resolve_under_root("ghost/../../outside.py");
        assert!(matches!(result, Err(SandboxError::Violation(_))));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_after_missing_segment_is_still_resolved() {
        let (dir, fs) = setup_tree();
        std::os::unix::fs::symlink("..", fs.root().join("escape")).unwrap();
        assert!(dir.path().join("outside.py").exists());

        assert!(matches!(
            fs.resolve_under_root("ghost/../escape/outside.py"),
            Err(SandboxError::Violation(_))
        ));
        assert!(matches!(
            fs.read_text("ghost/../escape/outside.py", 1_000),
            Err(SandboxError::Violation(_))
        ));
        assert!(matches!(
            fs.read_text("ghost/more/../../escape/outside.py", 1_000),
            Err(SandboxError::Violation(_))
        ));
    }

    #[test]
    fn missing_segment_then_parent_resolves_inside_root() {
        let (_dir, fs) = setup_tree();
        let resolved = fs.resolve_under_root("ghost/../pkg/util.py").unwrap();
        assert_eq!(resolved, fs.root().join("pkg/util.py"));
    }

    #[test]
    fn sibling_with_shared_prefix_is_rejected() {
        let (dir, fs) = setup_tree();
        let evil = dir.path().join("root_evil");
        std::fs::create_dir_all(&evil).unwrap();
        std::fs::write(evil.join("x.py"), "x").unwrap();

        let result = fs.read_text(evil.join("x.py"), 1_000);
        assert!(matches!(result, Err(SandboxError::Violation(_))));
    }

    #[test]
    fn absolute_path_under_root_is_accepted() {
        let (_dir, fs) = setup_tree();
        let abs = fs.root().join("main.py");
        assert_eq!(fs.read_text(&abs, 1_000).unwrap(), "print('main')\n");
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_is_rejected() {
        let (dir, fs) = setup_tree();
        std::os::unix::fs::symlink(dir.path(), fs.root().join("escape")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("outside.py"), fs.root().join("leak.py"))
            .unwrap();

        assert!(matches!(
            fs.read_text("escape/outside.py", 1_000),
            Err(SandboxError::Violation(_))
        ));
        assert!(matches!(
            fs.read_text("leak.py", 1_000),
            Err(SandboxError::Violation(_))
        ));
        // Symlinks are not reported by discovery either.
        let files = fs.list_relative_source_files("py").unwrap();
        assert!(!files.iter().any(|f| f.starts_with("escape") || f == Path::new("leak.py")));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_inside_root_is_allowed() {
        let (_dir, fs) = setup_tree();
        std::os::unix::fs::symlink(fs.root().join("pkg"), fs.root().join("alias")).unwrap();
        let text = fs.read_text("alias/util.py", 1_000).unwrap();
        assert_eq!(text, "def f(): pass\n");
    }

    #[test]
    fn read_missing_file_is_not_found() {
        let (_dir, fs) = setup_tree();
        assert!(matches!(
            fs.read_text("nope.py", 1_000),
            Err(SandboxError::NotFound(_))
        ));
    }

    #[test]
    fn read_directory_is_not_found() {
        let (_dir, fs) = setup_tree();
        assert!(matches!(
            fs.read_text("pkg", 1_000),
            Err(SandboxError::NotFound(_))
        ));
    }

    #[test]
    fn read_respects_size_limit() {
        let (_dir, fs) = setup_tree();
        let result = fs.read_text("main.py", 4);
        match result {
            Err(SandboxError::SizeLimitExceeded { size, max_bytes, .. }) => {
                assert_eq!(size, 14);
                assert_eq!(max_bytes, 4);
            }
            other => panic!("expected SizeLimitExceeded, got {other:?}"),
        }
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() {
        let (_dir, fs) = setup_tree();
        std::fs::write(fs.root().join("bad.py"), [b'a', 0xFF, b'b']).unwrap();
        assert_eq!(fs.read_text("bad.py", 1_000).unwrap(), "a\u{FFFD}b");
    }

    #[test]
    fn to_relative_outside_root_is_violation() {
        let (dir, fs) = setup_tree();
        let result = fs.to_relative(dir.path().join("outside.py"));
        assert!(matches!(result, Err(SandboxError::Violation(_))));
    }

    #[test]
    fn reads_never_modify_tree() {
        let (_dir, fs) = setup_tree();
        let before = fs.list_source_files("py");
        for path in &before {
            fs.read_text(path, 1_000).unwrap();
        }
        assert_eq!(fs.list_source_files("py"), before);
    }

    #[test]
    fn per_file_classification() {
        assert!(SandboxError::NotFound(PathBuf::from("a")).is_per_file());
        assert!(!SandboxError::Violation(PathBuf::from("a")).is_per_file());
    }
}
