//! Stage bodies of the standard Debian package build, in execution order.

use std::fs;
use std::io;

use crate::config::{PolicyConfig, PrivilegePolicy};
use crate::context::BuildContext;
use crate::error::{BuildError, FsContext, Result};
use crate::layout::gz;
use crate::process::{capture_line, run_checked, CommandRunner, CommandSpec};
use crate::template::{
    self, PlaceholderSet, ARCHITECTURE_TOKEN, INSTALLED_SIZE_TOKEN, VERSION_TOKEN,
};
use crate::{manifest, permissions, preflight, staging};

use super::Stage;

/// Every stage of a package build.
pub fn standard() -> Vec<Stage> {
    vec![
        Stage {
            name: "preflight",
            description: "checking host",
            run: preflight_checks,
        },
        Stage {
            name: "clean",
            description: "removing old build directories",
            run: clean,
        },
        Stage {
            name: "detect-architecture",
            description: "detecting target architecture",
            run: detect_architecture,
        },
        Stage {
            name: "compile",
            description: "compiling",
            run: compile,
        },
        Stage {
            name: "stage-assets",
            description: "copying build data",
            run: stage_assets,
        },
        Stage {
            name: "install-binary",
            description: "copying binary",
            run: install_binary,
        },
        Stage {
            name: "derive-version",
            description: "querying binary version",
            run: derive_version,
        },
        Stage {
            name: "installed-size",
            description: "measuring installed size",
            run: installed_size,
        },
        Stage {
            name: "specialize-control",
            description: "creating DEBIAN/control from template",
            run: specialize_control,
        },
        Stage {
            name: "strip-binary",
            description: "stripping binary",
            run: strip_binary,
        },
        Stage {
            name: "install-docs",
            description: "installing and compressing documentation",
            run: install_docs,
        },
        Stage {
            name: "checksums",
            description: "computing md5sums",
            run: checksums,
        },
        Stage {
            name: "permissions",
            description: "normalizing permissions",
            run: normalize_permissions,
        },
        Stage {
            name: "take-ownership",
            description: "changing owner to root",
            run: take_ownership,
        },
        Stage {
            name: "package",
            description: "building Debian package",
            run: package,
        },
        Stage {
            name: "restore-ownership",
            description: "changing owner back to invoking user",
            run: restore_ownership,
        },
        Stage {
            name: "verify",
            description: "checking Debian package",
            run: verify,
        },
        Stage {
            name: "post-clean",
            description: "cleaning up",
            run: post_clean,
        },
    ]
}

fn preflight_checks(ctx: &mut BuildContext, _: &dyn CommandRunner) -> Result<()> {
    preflight::run_all(&ctx.config, ctx.euid)
}

fn clean(ctx: &mut BuildContext, runner: &dyn CommandRunner) -> Result<()> {
    match staging::clean(&ctx.staging_dir) {
        Err(err) if needs_elevated_removal(&err, &ctx.config.policy) => {
            tracing::warn!(
                "{}, retrying with {}",
                err.describe(),
                ctx.config.policy.elevate.join(" ")
            );
            remove_elevated(ctx, runner)
        }
        other => other,
    }
}

/// A build interrupted between the two ownership changes leaves a root-owned
/// staging tree that only an elevated `rm` can remove.
fn needs_elevated_removal(err: &BuildError, policy: &PolicyConfig) -> bool {
    let denied = matches!(
        err,
        BuildError::Filesystem { source, .. } if source.kind() == io::ErrorKind::PermissionDenied
    );
    denied && policy.privilege == PrivilegePolicy::RefuseRoot && !policy.elevate.is_empty()
}

fn remove_elevated(ctx: &BuildContext, runner: &dyn CommandRunner) -> Result<()> {
    let spec = CommandSpec::new("rm")
        .arg("-rf")
        .path_arg(&ctx.staging_dir)
        .wrapped_in(&ctx.config.policy.elevate);
    run_checked(runner, &spec)?;

    if ctx.staging_dir.exists() {
        return Err(BuildError::Filesystem {
            context: "staging directory still present after elevated removal".to_string(),
            path: ctx.staging_dir.clone(),
            source: io::Error::from(io::ErrorKind::AlreadyExists),
        });
    }
    Ok(())
}

fn detect_architecture(ctx: &mut BuildContext, runner: &dyn CommandRunner) -> Result<()> {
    let spec = CommandSpec::new("dpkg").arg("--print-architecture");
    let arch = capture_line(runner, &spec)?;
    if arch.trim().is_empty() {
        return Err(BuildError::UnexpectedOutput {
            command: spec.to_string(),
            detail: "empty architecture".to_string(),
        });
    }
    tracing::info!("building for {arch}");
    ctx.architecture = Some(arch);
    Ok(())
}

fn make(ctx: &BuildContext) -> CommandSpec {
    CommandSpec::new(ctx.config.toolchain.make.as_str()).current_dir(&ctx.source_dir)
}

fn compile(ctx: &mut BuildContext, runner: &dyn CommandRunner) -> Result<()> {
    if !ctx.source_dir.is_dir() {
        return Err(BuildError::missing_path(
            "source directory not found",
            &ctx.source_dir,
        ));
    }
    run_checked(runner, &make(ctx).arg("clean"))?;
    run_checked(
        runner,
        &make(ctx).env("CC", ctx.config.toolchain.compiler.as_str()),
    )?;

    let binary = ctx.compiled_binary();
    if !binary.is_file() {
        return Err(BuildError::missing_path(
            "compiled binary not produced",
            &binary,
        ));
    }
    Ok(())
}

fn stage_assets(ctx: &mut BuildContext, _: &dyn CommandRunner) -> Result<()> {
    staging::stage_assets(&ctx.assets_dir, &ctx.staging_dir)
}

fn install_binary(ctx: &mut BuildContext, _: &dyn CommandRunner) -> Result<()> {
    let dest = ctx.staged(&ctx.layout.installed_binary());
    staging::install_file(&ctx.compiled_binary(), &dest)
}

fn derive_version(ctx: &mut BuildContext, runner: &dyn CommandRunner) -> Result<()> {
    let spec = CommandSpec::new(ctx.compiled_binary())
        .arg(ctx.config.version_flag.as_str())
        .current_dir(&ctx.source_dir);
    let output = run_checked(runner, &spec)?;

    let version = manifest::normalize_version(&output.stdout);
    if version.is_empty() {
        return Err(BuildError::UnexpectedOutput {
            command: spec.to_string(),
            detail: "empty version".to_string(),
        });
    }
    tracing::info!("version {version}");
    ctx.version = Some(version);
    Ok(())
}

fn installed_size(ctx: &mut BuildContext, runner: &dyn CommandRunner) -> Result<()> {
    let size = manifest::installed_size(runner, &ctx.staging_dir, &ctx.layout.control_dir())?;
    ctx.installed_size = Some(size);
    Ok(())
}

fn specialize_control(ctx: &mut BuildContext, _: &dyn CommandRunner) -> Result<()> {
    let (Some(version), Some(arch), Some(size)) = (
        ctx.version.as_deref(),
        ctx.architecture.as_deref(),
        ctx.installed_size,
    ) else {
        return Err(BuildError::Precondition(
            "control needs version, architecture and installed size".to_string(),
        ));
    };

    let placeholders = PlaceholderSet::new()
        .with(VERSION_TOKEN, version)
        .with(ARCHITECTURE_TOKEN, arch)
        .with(INSTALLED_SIZE_TOKEN, size.to_string());
    let control = ctx.staged(&ctx.layout.control_file());
    template::specialize(&control, &control, &placeholders)
}

fn strip_binary(ctx: &mut BuildContext, runner: &dyn CommandRunner) -> Result<()> {
    let binary = ctx.staged(&ctx.layout.installed_binary());
    run_checked(
        runner,
        &CommandSpec::new("objcopy")
            .args(["--strip-debug", "--strip-unneeded"])
            .path_arg(&binary),
    )?;
    Ok(())
}

fn install_docs(ctx: &mut BuildContext, runner: &dyn CommandRunner) -> Result<()> {
    staging::install_file(&ctx.changelog, &ctx.staged(&ctx.layout.changelog()))?;

    for doc in ctx.layout.compressed_docs() {
        let path = ctx.staged(&doc);
        if !path.is_file() {
            return Err(BuildError::missing_path(
                "documentation file not staged",
                &path,
            ));
        }
        run_checked(runner, &CommandSpec::new("gzip").arg("-9n").path_arg(&path))?;

        let compressed = gz(&path);
        if !compressed.is_file() {
            return Err(BuildError::missing_path(
                "gzip did not produce",
                &compressed,
            ));
        }
    }
    Ok(())
}

fn checksums(ctx: &mut BuildContext, runner: &dyn CommandRunner) -> Result<()> {
    let manifest_path = ctx.staged(&ctx.layout.md5sums_file());
    let count = manifest::append_checksums(
        runner,
        &ctx.staging_dir,
        &ctx.layout.checksum_root(),
        &manifest_path,
    )?;
    tracing::debug!("{count} files in {}", manifest_path.display());
    Ok(())
}

fn normalize_permissions(ctx: &mut BuildContext, _: &dyn CommandRunner) -> Result<()> {
    permissions::normalize_directories(&ctx.staging_dir)?;
    permissions::apply_table(&ctx.staging_dir, &ctx.layout.permission_table())
}

fn chown(ctx: &BuildContext, owner: &str) -> CommandSpec {
    let spec = CommandSpec::new("chown")
        .arg("-R")
        .arg(owner)
        .path_arg(&ctx.staging_dir);
    match ctx.config.policy.privilege {
        PrivilegePolicy::RefuseRoot => spec.wrapped_in(&ctx.config.policy.elevate),
        PrivilegePolicy::RequireRoot => spec,
    }
}

fn take_ownership(ctx: &mut BuildContext, runner: &dyn CommandRunner) -> Result<()> {
    run_checked(runner, &chown(ctx, "root:root"))?;
    Ok(())
}

fn package(ctx: &mut BuildContext, runner: &dyn CommandRunner) -> Result<()> {
    let output = ctx.package_path().ok_or_else(|| {
        BuildError::Precondition("package name needs version and architecture".to_string())
    })?;
    fs::create_dir_all(&ctx.output_dir).fs_context("creating output directory", &ctx.output_dir)?;

    run_checked(
        runner,
        &CommandSpec::new("dpkg")
            .arg("-b")
            .path_arg(&ctx.staging_dir)
            .path_arg(&output),
    )?;
    if !output.is_file() {
        return Err(BuildError::missing_path(
            "package builder did not produce",
            &output,
        ));
    }

    tracing::info!("wrote {}", output.display());
    ctx.package_file = Some(output);
    Ok(())
}

fn restore_ownership(ctx: &mut BuildContext, runner: &dyn CommandRunner) -> Result<()> {
    let owner = ctx.owner.chown_spec();
    run_checked(runner, &chown(ctx, &owner))?;
    Ok(())
}

/// Lines a package linter prints for errors and warnings.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LintFindings {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Split linter output into `E:` and `W:` findings.
pub fn lint_findings(output: &str) -> LintFindings {
    let mut findings = LintFindings::default();
    for line in output.lines().map(str::trim) {
        if line.starts_with("E:") {
            findings.errors.push(line.to_string());
        } else if line.starts_with("W:") {
            findings.warnings.push(line.to_string());
        }
    }
    findings
}

fn verify(ctx: &mut BuildContext, runner: &dyn CommandRunner) -> Result<()> {
    let package = ctx
        .package_file
        .clone()
        .ok_or_else(|| BuildError::Precondition("no package to verify".to_string()))?;

    let spec = CommandSpec::new(ctx.config.lint.tool.as_str())
        .args(ctx.config.lint.args.iter().cloned())
        .path_arg(&package);
    let output = run_checked(runner, &spec)?;
    let findings = lint_findings(&output.combined());

    for warning in &findings.warnings {
        tracing::warn!("{warning}");
    }

    let fatal = !findings.errors.is_empty()
        || (ctx.config.lint.fail_on_warnings && !findings.warnings.is_empty());
    if fatal {
        return Err(BuildError::ExternalCommandFailed {
            command: spec.to_string(),
            exit_code: output.code,
            output: output.combined(),
        });
    }
    Ok(())
}

fn post_clean(ctx: &mut BuildContext, runner: &dyn CommandRunner) -> Result<()> {
    run_checked(runner, &make(ctx).arg("clean"))?;
    Ok(())
}
