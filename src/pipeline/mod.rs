//! The package build as an ordered list of named stages.
//!
//! Each [`Stage`] is a plain function of the [`BuildContext`] and a
//! [`CommandRunner`]. The driver runs them in order, records every finished
//! stage in the context, and stops at the first error, tagging it with the
//! stage name. Nothing is rolled back: the staging tree stays as far as the
//! build got, and the next run's `clean` stage removes it.

pub mod stages;

use crate::context::BuildContext;
use crate::error::{BuildError, Result};
use crate::process::CommandRunner;

/// Signature of a stage body.
pub type StageFn = fn(&mut BuildContext, &dyn CommandRunner) -> Result<()>;

/// One named step of the build.
#[derive(Clone, Copy)]
pub struct Stage {
    pub name: &'static str,
    /// Shown when the stage starts.
    pub description: &'static str,
    pub run: StageFn,
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

/// Ordered stages and the driver that runs them.
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// The full Debian package build.
    pub fn standard() -> Self {
        Self::new(stages::standard())
    }

    /// Drop the stages named in `names`.
    pub fn without(mut self, names: &[&str]) -> Self {
        self.stages.retain(|s| !names.contains(&s.name));
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name).collect()
    }

    /// Run every stage in order; stop at the first failure.
    pub fn run(&self, ctx: &mut BuildContext, runner: &dyn CommandRunner) -> Result<()> {
        let total = self.stages.len();
        for (index, stage) in self.stages.iter().enumerate() {
            tracing::info!("[{}/{}] {}", index + 1, total, stage.description);

            if let Err(err) = (stage.run)(ctx, runner) {
                tracing::error!("stage '{}' failed: {}", stage.name, err);
                return Err(BuildError::Stage {
                    stage: stage.name,
                    source: Box::new(err),
                });
            }
            ctx.completed.push(stage.name);
        }
        Ok(())
    }
}
