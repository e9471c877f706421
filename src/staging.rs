//! Staging tree assembly: clean, copy the asset skeleton, overlay artifacts.

use std::fs;
use std::path::Path;

use crate::error::{BuildError, FsContext, Result};

/// Remove a previous staging tree, if any.
pub fn clean(staging: &Path) -> Result<()> {
    if staging.exists() || staging.is_symlink() {
        if staging.is_dir() && !staging.is_symlink() {
            fs::remove_dir_all(staging).fs_context("removing old staging directory", staging)?;
        } else {
            fs::remove_file(staging).fs_context("removing old staging path", staging)?;
        }
    }
    Ok(())
}

/// Copy the static asset tree into a fresh staging directory.
///
/// Fails if `assets` is missing or `staging` already exists.
pub fn stage_assets(assets: &Path, staging: &Path) -> Result<()> {
    if !assets.is_dir() {
        return Err(BuildError::missing_path(
            "asset template tree not found",
            assets,
        ));
    }
    if staging.exists() {
        return Err(BuildError::Filesystem {
            context: "staging directory already exists".to_string(),
            path: staging.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::AlreadyExists, "not cleaned"),
        });
    }
    copy_dir_recursive(assets, staging)
}

/// Recursively copy a directory, preserving symlinks.
///
/// Regular files keep their permission bits (`fs::copy` semantics).
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).fs_context("creating directory", dst)?;

    let mut entries = fs::read_dir(src)
        .fs_context("reading directory", src)?
        .collect::<std::io::Result<Vec<_>>>()
        .fs_context("reading directory entry", src)?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let file_type = entry.file_type().fs_context("reading file type", &src_path)?;

        if file_type.is_symlink() {
            let target = fs::read_link(&src_path).fs_context("reading symlink", &src_path)?;
            std::os::unix::fs::symlink(&target, &dst_path)
                .fs_context("creating symlink", &dst_path)?;
        } else if file_type.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path).fs_context("copying file", &src_path)?;
        }
    }

    Ok(())
}

/// Copy `src` to `dst`, creating `dst`'s parent directories first.
pub fn install_file(src: &Path, dst: &Path) -> Result<()> {
    if !src.is_file() {
        return Err(BuildError::missing_path("file to install not found", src));
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).fs_context("creating directory", parent)?;
    }
    fs::copy(src, dst).fs_context("copying file", src)?;
    Ok(())
}
