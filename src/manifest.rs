//! Package metadata derived from the staged tree: version tag, installed size
//! and the `DEBIAN/md5sums` checksum manifest.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::{BuildError, FsContext, Result};
use crate::process::{run_checked, CommandRunner, CommandSpec};

/// Turn `--version` output into a package version: line breaks removed,
/// spaces and tabs become hyphens.
pub fn normalize_version(raw: &str) -> String {
    raw.replace(['\n', '\r'], "")
        .trim()
        .replace([' ', '\t'], "-")
}

/// Leading numeric field of `du -s` output, e.g. `"1234\t/path"` → `1234`.
pub fn parse_installed_size(du_output: &str) -> Option<u64> {
    du_output.split_whitespace().next()?.parse().ok()
}

/// Disk usage of `staging` in KiB, excluding the staging-relative `control_dir`.
///
/// `du` runs from inside the staging root so the exclusion pattern never
/// contains the checkout path; `du` treats it as a glob.
pub fn installed_size(
    runner: &dyn CommandRunner,
    staging: &Path,
    control_dir: &Path,
) -> Result<u64> {
    let spec = CommandSpec::new("du")
        .arg("-s")
        .arg("--exclude")
        .path_arg(&Path::new(".").join(control_dir))
        .arg(".")
        .current_dir(staging);
    let output = run_checked(runner, &spec)?;

    parse_installed_size(&output.stdout).ok_or_else(|| BuildError::UnexpectedOutput {
        command: spec.to_string(),
        detail: format!("no leading size field in {:?}", output.stdout),
    })
}

/// Append `<md5>  <path>` lines for every file under `staging/subtree` to
/// `manifest`.
///
/// Files are listed in sorted order and hashed by a single `md5sum` run from
/// the staging root, so paths in the manifest are staging-relative.
pub fn append_checksums(
    runner: &dyn CommandRunner,
    staging: &Path,
    subtree: &Path,
    manifest: &Path,
) -> Result<usize> {
    let root = staging.join(subtree);
    if !root.is_dir() {
        return Err(BuildError::missing_path(
            "checksum subtree not found",
            &root,
        ));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(&root).sort_by_file_name() {
        let entry = entry.fs_context("walking staging tree", &root)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(staging)
            .map_err(|_| BuildError::missing_path("file outside staging tree", entry.path()))?;
        files.push(relative.as_os_str().to_os_string());
    }

    let mut lines = String::new();
    if !files.is_empty() {
        let spec = CommandSpec::new("md5sum")
            .args(files.iter().cloned())
            .current_dir(staging);
        lines = run_checked(runner, &spec)?.stdout;
        if !lines.is_empty() && !lines.ends_with('\n') {
            lines.push('\n');
        }
    }

    if let Some(parent) = manifest.parent() {
        fs::create_dir_all(parent).fs_context("creating directory", parent)?;
    }
    let mut out = OpenOptions::new()
        .create(true)
        .append(true)
        .open(manifest)
        .fs_context("opening checksum manifest", manifest)?;
    out.write_all(lines.as_bytes())
        .fs_context("writing checksum manifest", manifest)?;

    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::mock::MockRunner;
    use crate::process::{CommandOutput, SystemRunner};
    use tempfile::TempDir;

    #[test]
    fn test_parse_installed_size() {
        assert_eq!(parse_installed_size("1234\t/path"), Some(1234));
        assert_eq!(parse_installed_size("88\tdist\n"), Some(88));
        assert_eq!(parse_installed_size(""), None);
        assert_eq!(parse_installed_size("du: cannot access"), None);
    }

    #[test]
    fn test_normalize_version() {
        assert_eq!(normalize_version("2.0.3\n"), "2.0.3");
        assert_eq!(normalize_version("1.0 beta 2\n"), "1.0-beta-2");
        assert_eq!(normalize_version("1.0\r\n"), "1.0");
    }

    #[test]
    fn test_installed_size_passes_exclusion() {
        let runner = MockRunner::new().on("du -s", |spec| {
            assert_eq!(spec.cwd.as_deref(), Some(Path::new("/work/dist")));
            Ok(CommandOutput::success("1234\t.\n"))
        });
        let size = installed_size(&runner, Path::new("/work/dist"), Path::new("DEBIAN")).unwrap();

        assert_eq!(size, 1234);
        assert_eq!(
            runner.calls(),
            vec!["du -s --exclude ./DEBIAN .".to_string()]
        );
    }

    #[test]
    fn test_installed_size_excludes_control_dir_under_glob_path() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join("build[1]").join("dist");
        fs::create_dir_all(staging.join("DEBIAN")).unwrap();
        fs::write(staging.join("DEBIAN/big"), vec![1u8; 400 * 1024]).unwrap();
        fs::write(staging.join("f"), vec![1u8; 4 * 1024]).unwrap();

        let size = installed_size(&SystemRunner, &staging, Path::new("DEBIAN")).unwrap();

        assert!(size < 100, "control dir was counted: {size} KiB");
    }

    #[test]
    fn test_installed_size_garbage_output() {
        let runner = MockRunner::new().stdout("du", "total\n");
        let err = installed_size(&runner, Path::new("/d"), Path::new("DEBIAN")).unwrap_err();
        assert!(matches!(err, BuildError::UnexpectedOutput { .. }));
    }

    #[test]
    fn test_append_checksums_sorted_and_relative() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path();
        fs::create_dir_all(staging.join("usr/bin")).unwrap();
        fs::create_dir_all(staging.join("usr/share/doc/redapid")).unwrap();
        fs::create_dir_all(staging.join("DEBIAN")).unwrap();
        fs::write(staging.join("usr/share/doc/redapid/copyright"), "c").unwrap();
        fs::write(staging.join("usr/bin/redapid"), "b").unwrap();
        fs::write(staging.join("DEBIAN/md5sums"), "").unwrap();

        let runner = MockRunner::new().on("md5sum", |spec| {
            assert_eq!(
                spec.args,
                vec!["usr/bin/redapid", "usr/share/doc/redapid/copyright"]
            );
            Ok(CommandOutput::success(
                "aa  usr/bin/redapid\nbb  usr/share/doc/redapid/copyright\n",
            ))
        });

        let manifest = staging.join("DEBIAN/md5sums");
        let count = append_checksums(&runner, staging, Path::new("usr"), &manifest).unwrap();

        assert_eq!(count, 2);
        assert_eq!(
            fs::read_to_string(&manifest).unwrap(),
            "aa  usr/bin/redapid\nbb  usr/share/doc/redapid/copyright\n"
        );
    }

    #[test]
    fn test_append_checksums_command_failure() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("usr/bin")).unwrap();
        fs::write(temp.path().join("usr/bin/x"), "x").unwrap();
        let runner = MockRunner::new().fail("md5sum", 1, "md5sum: usr/bin/x: Permission denied\n");

        let err = append_checksums(
            &runner,
            temp.path(),
            Path::new("usr"),
            &temp.path().join("DEBIAN/md5sums"),
        )
        .unwrap_err();
        assert_eq!(
            err.captured_output(),
            Some("md5sum: usr/bin/x: Permission denied\n")
        );
    }
}
