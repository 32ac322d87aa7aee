use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Errors raised while resolving a user supplied path against the music root
#[derive(Error, Debug)]
pub enum PathGuardError {
    #[error("Path escapes the music root: {path}")]
    Escape { path: String },

    #[error("Cannot resolve {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl PathGuardError {
    pub fn is_escape(&self) -> bool {
        matches!(self, PathGuardError::Escape { .. })
    }
}

/// Confines every player-addressable path to a single root directory.
///
/// Resolution is done in two steps. The relative segments are first checked
/// lexically so that `..` climbing above the root, or an absolute segment, is
/// rejected even when the target does not exist. The joined path is then
/// canonicalised (following symlinks) and compared component-wise with the
/// canonical root, so a link pointing outside the root is rejected too.
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    /// Build a guard for `root`. The root must exist; it is stored canonicalised.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, PathGuardError> {
        let root = root.as_ref();
        let canonical = std::fs::canonicalize(root).map_err(|source| PathGuardError::Io {
            path: root.display().to_string(),
            source,
        })?;
        Ok(Self { root: canonical })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `segments` below the root and return the canonical absolute path.
    pub fn resolve<S: AsRef<str>>(&self, segments: &[S]) -> Result<PathBuf, PathGuardError> {
        let mut relative = PathBuf::new();
        for segment in segments {
            relative.push(segment.as_ref());
        }

        check_lexical(&relative)?;

        let joined = self.root.join(&relative);
        let canonical = std::fs::canonicalize(&joined).map_err(|source| PathGuardError::Io {
            path: relative.display().to_string(),
            source,
        })?;

        // Path::starts_with compares whole components, so "/music2" is not
        // accepted under "/music".
        if !canonical.starts_with(&self.root) {
            return Err(PathGuardError::Escape {
                path: relative.display().to_string(),
            });
        }

        Ok(canonical)
    }
}

fn check_lexical(relative: &Path) -> Result<(), PathGuardError> {
    let mut depth: usize = 0;
    for component in relative.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return Err(PathGuardError::Escape {
                        path: relative.display().to_string(),
                    });
                }
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(PathGuardError::Escape {
                    path: relative.display().to_string(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn music_tree() -> (TempDir, PathGuard) {
        let temp_dir = TempDir::new().unwrap();
        let music = temp_dir.path().join("music");
        fs::create_dir_all(music.join("album")).unwrap();
        fs::write(music.join("album").join("a.mp3"), b"a").unwrap();
        fs::write(temp_dir.path().join("secret.txt"), b"s").unwrap();
        let guard = PathGuard::new(&music).unwrap();
        (temp_dir, guard)
    }

    #[test]
    fn test_resolve_inside_root() {
        let (_tmp, guard) = music_tree();

        let resolved = guard.resolve(&["album", "a.mp3"]).unwrap();
        assert_eq!(resolved, guard.root().join("album").join("a.mp3"));

        let root = guard.resolve::<&str>(&[]).unwrap();
        assert_eq!(root, guard.root());
    }

    #[test]
    fn test_dotdot_that_stays_inside_is_allowed() {
        let (_tmp, guard) = music_tree();
        let resolved = guard.resolve(&["album", "..", "album", "a.mp3"]).unwrap();
        assert_eq!(resolved, guard.root().join("album").join("a.mp3"));
    }

    #[test]
    fn test_dotdot_escape_is_rejected() {
        let (_tmp, guard) = music_tree();

        let err = guard.resolve(&["..", "secret.txt"]).unwrap_err();
        assert!(err.is_escape());

        let err = guard.resolve(&["album", "..", "..", "secret.txt"]).unwrap_err();
        assert!(err.is_escape());

        // Rejected even though the target does not exist
        let err = guard.resolve(&["..", "does-not-exist"]).unwrap_err();
        assert!(err.is_escape());
    }

    #[test]
    fn test_absolute_segment_is_rejected() {
        let (tmp, guard) = music_tree();
        let outside = tmp.path().join("secret.txt");
        let err = guard.resolve(&[outside.to_string_lossy().to_string()]).unwrap_err();
        assert!(err.is_escape());
    }

    #[test]
    fn test_sibling_with_common_prefix_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("music")).unwrap();
        fs::create_dir_all(temp_dir.path().join("music2")).unwrap();
        fs::write(temp_dir.path().join("music2").join("x.mp3"), b"x").unwrap();
        let guard = PathGuard::new(temp_dir.path().join("music")).unwrap();

        let err = guard.resolve(&["..", "music2", "x.mp3"]).unwrap_err();
        assert!(err.is_escape());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_pointing_outside_is_rejected() {
        let (tmp, guard) = music_tree();
        std::os::unix::fs::symlink(tmp.path().join("secret.txt"), guard.root().join("link.mp3"))
            .unwrap();

        let err = guard.resolve(&["link.mp3"]).unwrap_err();
        assert!(err.is_escape());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_inside_root_resolves_to_target() {
        let (_tmp, guard) = music_tree();
        std::os::unix::fs::symlink(guard.root().join("album"), guard.root().join("shortcut"))
            .unwrap();

        let resolved = guard.resolve(&["shortcut", "a.mp3"]).unwrap();
        assert_eq!(resolved, guard.root().join("album").join("a.mp3"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let (_tmp, guard) = music_tree();
        let err = guard.resolve(&["album", "missing.mp3"]).unwrap_err();
        assert!(matches!(err, PathGuardError::Io { .. }));
    }
}
