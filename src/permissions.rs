//! File mode normalization for the staging tree.

use std::collections::BTreeSet;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{BuildError, FsContext, Result};
use crate::layout::MODE_EXECUTABLE;

/// Set every directory under `staging` (including itself) to 0755.
pub fn normalize_directories(staging: &Path) -> Result<usize> {
    let mut count = 0;
    for entry in WalkDir::new(staging) {
        let entry = entry.fs_context("walking staging tree", staging)?;
        if entry.file_type().is_dir() {
            set_mode(entry.path(), MODE_EXECUTABLE)?;
            count += 1;
        }
    }
    Ok(count)
}

/// Apply `table` (staging-relative path → mode) and check that it covers
/// every regular file in the tree.
///
/// A table entry whose file is missing is an error, and so is a staged file
/// without an entry.
pub fn apply_table(staging: &Path, table: &[(PathBuf, u32)]) -> Result<()> {
    for (relative, mode) in table {
        let path = staging.join(relative);
        if !path.is_file() {
            return Err(BuildError::missing_path(
                "file from permission table not staged",
                &path,
            ));
        }
        set_mode(&path, *mode)?;
    }

    let uncovered = uncovered_files(staging, table)?;
    if !uncovered.is_empty() {
        return Err(BuildError::UncoveredFiles(uncovered));
    }
    Ok(())
}

/// Regular files (and symlinks) under `staging` that `table` does not list.
pub fn uncovered_files(staging: &Path, table: &[(PathBuf, u32)]) -> Result<Vec<PathBuf>> {
    let covered: BTreeSet<&Path> = table.iter().map(|(p, _)| p.as_path()).collect();
    let mut uncovered = Vec::new();

    for entry in WalkDir::new(staging).sort_by_file_name() {
        let entry = entry.fs_context("walking staging tree", staging)?;
        if entry.file_type().is_dir() {
            continue;
        }
        let relative = entry.path().strip_prefix(staging).unwrap_or(entry.path());
        if !covered.contains(relative) {
            uncovered.push(relative.to_path_buf());
        }
    }
    Ok(uncovered)
}

fn set_mode(path: &Path, mode: u32) -> Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .fs_context("setting permissions", path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mode_of(path: &Path) -> u32 {
        fs::metadata(path).unwrap().permissions().mode() & 0o7777
    }

    fn tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("DEBIAN")).unwrap();
        fs::create_dir_all(root.join("usr/bin")).unwrap();
        fs::write(root.join("DEBIAN/postinst"), "#!/bin/sh\n").unwrap();
        fs::write(root.join("usr/bin/redapid"), "elf").unwrap();
        let mode = |bits| fs::Permissions::from_mode(bits);
        fs::set_permissions(root.join("usr/bin"), mode(0o700)).unwrap();
        fs::set_permissions(root.join("DEBIAN/postinst"), mode(0o600)).unwrap();
        temp
    }

    #[test]
    fn test_normalize_directories() {
        let temp = tree();
        let count = normalize_directories(temp.path()).unwrap();

        assert_eq!(count, 4);
        assert_eq!(mode_of(&temp.path().join("usr/bin")), 0o755);
        assert_eq!(mode_of(&temp.path().join("DEBIAN")), 0o755);
    }

    #[test]
    fn test_apply_table_sets_exact_modes() {
        let temp = tree();
        let table = vec![
            (PathBuf::from("DEBIAN/postinst"), 0o755),
            (PathBuf::from("usr/bin/redapid"), 0o755),
        ];

        apply_table(temp.path(), &table).unwrap();

        assert_eq!(mode_of(&temp.path().join("DEBIAN/postinst")), 0o755);
        assert_eq!(mode_of(&temp.path().join("usr/bin/redapid")), 0o755);
    }

    #[test]
    fn test_apply_table_reports_uncovered_file() {
        let temp = tree();
        fs::write(temp.path().join("usr/bin/stray"), "x").unwrap();
        let table = vec![
            (PathBuf::from("DEBIAN/postinst"), 0o755),
            (PathBuf::from("usr/bin/redapid"), 0o755),
        ];

        let err = apply_table(temp.path(), &table).unwrap_err();
        match err {
            BuildError::UncoveredFiles(paths) => {
                assert_eq!(paths, vec![PathBuf::from("usr/bin/stray")]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_apply_table_missing_entry_file() {
        let temp = tree();
        let table = vec![(PathBuf::from("etc/redapid.conf"), 0o644)];
        let err = apply_table(temp.path(), &table).unwrap_err();
        assert!(err.to_string().contains("etc/redapid.conf"));
    }
}
