//! Workspace traversal with ignore pruning

use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use walkdir::WalkDir;

use super::IgnoreSet;

/// One file or directory selected for the archive
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Absolute (or root-joined) path on the local filesystem
    pub path: PathBuf,
    /// Path relative to the workspace root; this is the name in the archive
    pub relative: PathBuf,
    pub metadata: Metadata,
}

impl FileEntry {
    pub fn is_dir(&self) -> bool {
        self.metadata.is_dir()
    }

    pub fn size(&self) -> u64 {
        self.metadata.len()
    }

    /// Permission bits
    #[cfg(unix)]
    pub fn mode(&self) -> u32 {
        use std::os::unix::fs::PermissionsExt;
        self.metadata.permissions().mode() & 0o7777
    }

    /// Permission bits
    #[cfg(not(unix))]
    pub fn mode(&self) -> u32 {
        if self.is_dir() {
            0o755
        } else if self.metadata.permissions().readonly() {
            0o444
        } else {
            0o644
        }
    }

    /// Modification time in seconds since the epoch
    pub fn mtime(&self) -> u64 {
        self.metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Depth-first walk of a workspace in file name order.
///
/// Ignored directories are pruned: nothing below them is read or even
/// considered. The root itself is never yielded. Symlinks are followed, so
/// a dangling link is an error.
pub struct WorkspaceWalk<'a> {
    root: PathBuf,
    ignore: &'a IgnoreSet,
}

impl<'a> WorkspaceWalk<'a> {
    pub fn new(root: impl Into<PathBuf>, ignore: &'a IgnoreSet) -> Self {
        Self {
            root: root.into(),
            ignore,
        }
    }

    /// Visit every kept entry in walk order
    pub fn for_each<F>(&self, visit: F) -> io::Result<()>
    where
        F: FnMut(FileEntry) -> io::Result<()>,
    {
        self.for_each_observed(|_| {}, visit)
    }

    /// Like [`for_each`](Self::for_each), also reporting every relative path
    /// the pruning filter looks at, kept or not
    pub fn for_each_observed<O, F>(&self, mut observe: O, mut visit: F) -> io::Result<()>
    where
        O: FnMut(&Path),
        F: FnMut(FileEntry) -> io::Result<()>,
    {
        let root = self.root.as_path();
        let ignore = self.ignore;

        let walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let relative = relative_to(root, entry.path());
                observe(relative);
                !ignore.is_ignored(relative)
            });

        for entry in walker {
            let entry = entry.map_err(io::Error::from)?;
            let metadata = entry.metadata().map_err(io::Error::from)?;
            visit(FileEntry {
                relative: relative_to(root, entry.path()).to_path_buf(),
                path: entry.into_path(),
                metadata,
            })?;
        }
        Ok(())
    }

    /// Collect every kept entry
    pub fn entries(&self) -> io::Result<Vec<FileEntry>> {
        let mut entries = Vec::new();
        self.for_each(|entry| {
            entries.push(entry);
            Ok(())
        })?;
        Ok(entries)
    }
}

fn relative_to<'p>(root: &Path, path: &'p Path) -> &'p Path {
    path.strip_prefix(root).unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn workspace() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("b/c.txt"), "charlie").unwrap();
        fs::write(dir.path().join("b/skip.tmp"), "scratch").unwrap();
        dir
    }

    fn relatives(entries: &[FileEntry]) -> Vec<String> {
        entries
            .iter()
            .map(|e| e.relative.to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_walk_order_and_filtering() {
        let dir = workspace();
        let ignore = IgnoreSet::new(["*.tmp"]);
        let entries = WorkspaceWalk::new(dir.path(), &ignore).entries().unwrap();
        assert_eq!(relatives(&entries), vec!["a.txt", "b", "b/c.txt"]);
        assert!(entries[1].is_dir());
        assert_eq!(entries[0].size(), 5);
    }

    #[test]
    fn test_ignored_directory_is_pruned() {
        let dir = workspace();
        let ignore = IgnoreSet::new(["b"]);
        let mut considered = Vec::new();
        let mut kept = Vec::new();
        WorkspaceWalk::new(dir.path(), &ignore)
            .for_each_observed(
                |path| considered.push(path.to_path_buf()),
                |entry| {
                    kept.push(entry);
                    Ok(())
                },
            )
            .unwrap();

        assert_eq!(relatives(&kept), vec!["a.txt"]);
        assert!(considered.iter().any(|p| p == Path::new("b")));
        assert!(!considered
            .iter()
            .any(|p| p.starts_with("b") && p != Path::new("b")));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_is_error() {
        let dir = workspace();
        std::os::unix::fs::symlink(dir.path().join("missing"), dir.path().join("link")).unwrap();
        let ignore = IgnoreSet::default();
        assert!(WorkspaceWalk::new(dir.path(), &ignore).entries().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_mode_bits() {
        use std::os::unix::fs::PermissionsExt;
        let dir = workspace();
        let script = dir.path().join("run.sh");
        fs::write(&script, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let ignore = IgnoreSet::default();
        let entries = WorkspaceWalk::new(dir.path(), &ignore).entries().unwrap();
        let entry = entries
            .iter()
            .find(|e| e.relative == Path::new("run.sh"))
            .unwrap();
        assert_eq!(entry.mode(), 0o755);
        assert!(entry.mtime() > 0);
    }
}
