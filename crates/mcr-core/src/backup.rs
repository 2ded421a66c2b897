//! Filesystem half of a backup: naming the snapshot and copying the tree.

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::debug;
use walkdir::WalkDir;

/// Directory name for a backup taken at `at`, e.g. `backup_20240305090407`.
pub fn backup_dir_name(at: NaiveDateTime) -> String {
    format!("backup_{}", at.format("%Y%m%d%H%M%S"))
}

/// First unused destination under `root` for a backup taken at `at`.
///
/// Backups within the same second get `_1`, `_2`, ... suffixes.
pub fn backup_destination(root: &Path, at: NaiveDateTime) -> PathBuf {
    let base = backup_dir_name(at);
    let mut candidate = root.join(&base);
    let mut suffix = 1;
    while candidate.exists() {
        candidate = root.join(format!("{}_{}", base, suffix));
        suffix += 1;
    }
    candidate
}

/// File-name glob patterns skipped during a copy.
#[derive(Debug, Clone, Default)]
pub struct ExcludeSet {
    patterns: Vec<glob::Pattern>,
}

impl ExcludeSet {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, glob::PatternError> {
        let patterns = patterns
            .iter()
            .map(|p| glob::Pattern::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Whether an entry with this file name is skipped.
    pub fn is_excluded(&self, name: &OsStr) -> bool {
        let name = name.to_string_lossy();
        self.patterns.iter().any(|p| p.matches(&name))
    }
}

/// Counters reported after a copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files: u64,
    pub bytes: u64,
    pub skipped: u64,
}

/// Recursively copy `src` into the new directory `dst`.
///
/// `dst` must not exist yet. Symlinks are followed. Entries matching
/// `exclude` are skipped along with everything beneath them, and so is `dst`
/// itself when it lies inside `src`.
pub fn copy_tree(src: &Path, dst: &Path, exclude: &ExcludeSet) -> io::Result<CopyStats> {
    if !src.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("source directory {:?} does not exist", src),
        ));
    }
    if dst.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("destination {:?} already exists", dst),
        ));
    }
    std::fs::create_dir_all(dst)?;

    let mut stats = CopyStats::default();
    let mut skipped = 0;

    let walker = WalkDir::new(src)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let keep = !exclude.is_excluded(entry.file_name()) && !entry.path().starts_with(dst);
            if !keep {
                skipped += 1;
            }
            keep
        });

    for entry in walker {
        let entry = entry?;
        if entry.depth() == 0 {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            stats.bytes += std::fs::copy(entry.path(), &target)?;
            stats.files += 1;
        }
    }

    stats.skipped = skipped;
    debug!(
        "Copied {} files ({} bytes) from {:?} to {:?}, skipped {}",
        stats.files, stats.bytes, src, dst, stats.skipped
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_backup_dir_name_is_zero_padded() {
        assert_eq!(backup_dir_name(at(9, 4, 7)), "backup_20240305090407");
        assert_eq!(backup_dir_name(at(23, 59, 59)), "backup_20240305235959");
    }

    #[test]
    fn test_destination_suffixes_same_second() {
        let root = tempfile::tempdir().unwrap();
        let first = backup_destination(root.path(), at(12, 0, 0));
        assert_eq!(first, root.path().join("backup_20240305120000"));

        std::fs::create_dir(&first).unwrap();
        let second = backup_destination(root.path(), at(12, 0, 0));
        assert_eq!(second, root.path().join("backup_20240305120000_1"));

        std::fs::create_dir(&second).unwrap();
        let third = backup_destination(root.path(), at(12, 0, 0));
        assert_eq!(third, root.path().join("backup_20240305120000_2"));
    }

    #[test]
    fn test_exclude_set_matches_file_names() {
        let exclude = ExcludeSet::new(&["*.log", "cache"]).unwrap();
        assert!(exclude.is_excluded(OsStr::new("latest.log")));
        assert!(exclude.is_excluded(OsStr::new("cache")));
        assert!(!exclude.is_excluded(OsStr::new("level.dat")));
        assert!(!exclude.is_excluded(OsStr::new("log.txt")));
    }

    #[test]
    fn test_exclude_set_rejects_bad_pattern() {
        assert!(ExcludeSet::new(&["[unclosed"]).is_err());
    }

    #[test]
    fn test_copy_tree_skips_excluded() {
        let src = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("world/region")).unwrap();
        std::fs::write(src.path().join("server.properties"), "motd=hi").unwrap();
        std::fs::write(src.path().join("world/level.dat"), [1u8, 2, 3]).unwrap();
        std::fs::write(src.path().join("world/region/r.0.0.mca"), [0u8; 16]).unwrap();
        std::fs::write(src.path().join("server.log"), "noise").unwrap();
        std::fs::create_dir(src.path().join("old.log")).unwrap();
        std::fs::write(src.path().join("old.log/inner.txt"), "hidden").unwrap();

        let out = tempfile::tempdir().unwrap();
        let dst = out.path().join("backup");
        let exclude = ExcludeSet::new(&["*.log"]).unwrap();
        let stats = copy_tree(src.path(), &dst, &exclude).unwrap();

        assert_eq!(stats.files, 3);
        assert_eq!(stats.bytes, 7 + 3 + 16);
        assert_eq!(stats.skipped, 2);
        assert_eq!(
            std::fs::read_to_string(dst.join("server.properties")).unwrap(),
            "motd=hi"
        );
        assert!(dst.join("world/region/r.0.0.mca").is_file());
        assert!(!dst.join("server.log").exists());
        assert!(!dst.join("old.log").exists());
    }

    #[test]
    fn test_copy_tree_refuses_existing_destination() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let err = copy_tree(src.path(), dst.path(), &ExcludeSet::default()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_copy_tree_missing_source() {
        let root = tempfile::tempdir().unwrap();
        let err = copy_tree(
            &root.path().join("missing"),
            &root.path().join("dst"),
            &ExcludeSet::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_copy_tree_skips_destination_inside_source() {
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("level.dat"), "x").unwrap();
        std::fs::create_dir(src.path().join("backups")).unwrap();
        let dst = src.path().join("backups/backup_1");

        let stats = copy_tree(src.path(), &dst, &ExcludeSet::default()).unwrap();
        assert_eq!(stats.files, 1);
        assert!(dst.join("level.dat").is_file());
        assert!(!dst.join("backups/backup_1").exists());
    }
}
