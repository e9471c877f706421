//! `build-report.json`: what one build run did and what it produced.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::context::BuildContext;
use crate::error::BuildError;

pub const REPORT_FILENAME: &str = "build-report.json";

#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub name: String,
    pub status: String,
    pub completed_stages: Vec<String>,
    pub failed_stage: Option<String>,
    pub error: Option<String>,
    pub architecture: Option<String>,
    pub version: Option<String>,
    pub installed_size_kib: Option<u64>,
    pub package_path: Option<String>,
    pub package_sha256: Option<String>,
    pub package_size_bytes: Option<u64>,
    pub started_at_utc: String,
    pub finished_at_utc: String,
}

impl BuildReport {
    /// Summarize a finished run. Hashes the package file when one was built.
    pub fn from_run(
        ctx: &BuildContext,
        outcome: &std::result::Result<(), BuildError>,
        started_at: OffsetDateTime,
    ) -> Result<Self> {
        let (package_sha256, package_size_bytes) = match &ctx.package_file {
            Some(path) if path.is_file() => {
                let (sha, size) = sha256_file(path)?;
                (Some(sha), Some(size))
            }
            _ => (None, None),
        };

        let (status, failed_stage, error) = match outcome {
            Ok(()) => ("success", None, None),
            Err(err) => (
                "failed",
                err.stage().map(str::to_string),
                Some(err.describe()),
            ),
        };

        Ok(Self {
            name: ctx.config.name.clone(),
            status: status.to_string(),
            completed_stages: ctx.completed.iter().map(|s| s.to_string()).collect(),
            failed_stage,
            error,
            architecture: ctx.architecture.clone(),
            version: ctx.version.clone(),
            installed_size_kib: ctx.installed_size,
            package_path: ctx.package_file.as_ref().map(|p| p.display().to_string()),
            package_sha256,
            package_size_bytes,
            started_at_utc: rfc3339(started_at)?,
            finished_at_utc: rfc3339(OffsetDateTime::now_utc())?,
        })
    }
}

pub fn report_path(output_dir: &Path) -> PathBuf {
    output_dir.join(REPORT_FILENAME)
}

/// Write `report` as pretty JSON, replacing any previous report atomically.
pub fn write_report(path: &Path, report: &BuildReport) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("path without parent '{}'", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("creating report directory '{}'", parent.display()))?;

    let tmp = path.with_extension(format!("tmp-{}", std::process::id()));
    let payload = serde_json::to_vec_pretty(report).context("serializing build report")?;
    fs::write(&tmp, payload).with_context(|| format!("writing temp file '{}'", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| {
        format!(
            "renaming temp file '{}' to '{}'",
            tmp.display(),
            path.display()
        )
    })?;
    Ok(())
}

/// Hex SHA-256 and byte size of a file.
pub fn sha256_file(path: &Path) -> Result<(String, u64)> {
    let f = File::open(path).with_context(|| format!("opening '{}'", path.display()))?;
    let mut r = BufReader::new(f);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = r
            .read(&mut buf)
            .with_context(|| format!("reading '{}'", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((format!("{:x}", hasher.finalize()), size))
}

fn rfc3339(at: OffsetDateTime) -> Result<String> {
    at.format(&Rfc3339).context("formatting timestamp")
}
