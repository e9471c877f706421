//! Error taxonomy for the package assembly pipeline.
//!
//! Every failure aborts the build. Nothing here is retried: a failing tool or
//! a missing path is a build-environment problem for the operator to fix.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// All errors that can stop a build.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Wrong privilege level, unsupported platform, or missing host tools.
    /// Detected before any side effects.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// One or more placeholders were never found in the template.
    #[error(
        "not all placeholders were applied to '{}': missing {}",
        template.display(),
        missing.join(", ")
    )]
    TemplateIncomplete {
        template: PathBuf,
        missing: Vec<String>,
    },

    /// An invoked tool exited non-zero (or could not be spawned).
    #[error("command `{command}` failed ({})", describe_exit(*exit_code))]
    ExternalCommandFailed {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    /// A tool succeeded but printed something we cannot interpret.
    #[error("unexpected output from `{command}`: {detail}")]
    UnexpectedOutput { command: String, detail: String },

    /// Missing source path, permission denied, or any other I/O failure.
    #[error("{context} '{}'", path.display())]
    Filesystem {
        context: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Staged files that have no entry in the permission table.
    #[error("permission table does not cover staged files: {}", display_paths(.0))]
    UncoveredFiles(Vec<PathBuf>),

    /// Unreadable or invalid `pkg-assembler.toml`.
    #[error("invalid configuration '{}': {detail}", path.display())]
    Config { path: PathBuf, detail: String },

    /// Any of the above, tagged with the pipeline stage that raised it.
    #[error("stage '{stage}' failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<BuildError>,
    },
}

/// Alias for `Result<T, BuildError>`.
pub type Result<T> = std::result::Result<T, BuildError>;

impl BuildError {
    /// Name of the stage that failed, if the error went through the pipeline driver.
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            BuildError::Stage { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// The error underneath any stage tag.
    pub fn root(&self) -> &BuildError {
        match self {
            BuildError::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Captured stdout/stderr of a failed tool, for display to the operator.
    pub fn captured_output(&self) -> Option<&str> {
        match self.root() {
            BuildError::ExternalCommandFailed { output, .. } if !output.trim().is_empty() => {
                Some(output.as_str())
            }
            _ => None,
        }
    }

    /// One-line description: the error plus the I/O cause of a filesystem failure.
    pub fn describe(&self) -> String {
        match self.root() {
            BuildError::Filesystem { source, .. } => format!("{self}: {source}"),
            _ => self.to_string(),
        }
    }

    pub(crate) fn missing_path(context: impl Into<String>, path: &Path) -> Self {
        BuildError::Filesystem {
            context: context.into(),
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotFound, "path does not exist"),
        }
    }
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code".to_string(),
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Attach a path and an action description to an `io::Result`.
pub(crate) trait FsContext<T> {
    fn fs_context(self, context: &str, path: &Path) -> Result<T>;
}

impl<T> FsContext<T> for io::Result<T> {
    fn fs_context(self, context: &str, path: &Path) -> Result<T> {
        self.map_err(|source| BuildError::Filesystem {
            context: context.to_string(),
            path: path.to_path_buf(),
            source,
        })
    }
}

impl<T> FsContext<T> for std::result::Result<T, walkdir::Error> {
    fn fs_context(self, context: &str, path: &Path) -> Result<T> {
        self.map_err(|err| {
            let path = err
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| path.to_path_buf());
            let source = err
                .into_io_error()
                .unwrap_or_else(|| io::Error::other("filesystem loop detected"));
            BuildError::Filesystem {
                context: context.to_string(),
                path,
                source,
            }
        })
    }
}
