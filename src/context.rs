//! Build context threaded through every pipeline stage.

use std::path::{Path, PathBuf};

use crate::config::PackageConfig;
use crate::layout::PackageLayout;

/// Real and effective ids of this process, read once per build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessIds {
    pub uid: u32,
    pub gid: u32,
    pub euid: u32,
}

impl ProcessIds {
    pub fn current() -> Self {
        // SAFETY: getuid/getgid/geteuid cannot fail and have no side effects.
        let (uid, gid, euid) = unsafe { (libc::getuid(), libc::getgid(), libc::geteuid()) };
        Self { uid, gid, euid }
    }
}

/// Numeric user and group that owns the build directory after packaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    pub uid: u32,
    pub gid: u32,
}

impl Owner {
    /// The invoking user: the real uid/gid, or `SUDO_UID`/`SUDO_GID` when
    /// running as root under sudo.
    pub fn invoking(ids: ProcessIds) -> Self {
        let sudo = |key: &str| std::env::var(key).ok().and_then(|v| v.parse::<u32>().ok());
        Self::resolve(
            ids.uid,
            ids.gid,
            ids.euid,
            sudo("SUDO_UID"),
            sudo("SUDO_GID"),
        )
    }

    fn resolve(
        uid: u32,
        gid: u32,
        euid: u32,
        sudo_uid: Option<u32>,
        sudo_gid: Option<u32>,
    ) -> Self {
        match (euid, sudo_uid, sudo_gid) {
            (0, Some(uid), Some(gid)) => Self { uid, gid },
            _ => Self { uid, gid },
        }
    }

    /// `uid:gid` as accepted by `chown`.
    pub fn chown_spec(&self) -> String {
        format!("{}:{}", self.uid, self.gid)
    }
}

/// Mutable state of one build.
///
/// All paths are absolute, resolved once against the working directory (itself
/// made absolute against the current directory). Stages read their inputs from
/// here and record what they discover (architecture, version, installed size,
/// package path).
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub config: PackageConfig,
    pub layout: PackageLayout,
    pub work_dir: PathBuf,
    pub source_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub changelog: PathBuf,
    pub output_dir: PathBuf,
    pub owner: Owner,
    /// Effective uid checked against the privilege policy.
    pub euid: u32,
    pub architecture: Option<String>,
    pub version: Option<String>,
    pub installed_size: Option<u64>,
    pub package_file: Option<PathBuf>,
    /// Names of the stages that finished, in order.
    pub completed: Vec<&'static str>,
}

impl BuildContext {
    pub fn new(config: PackageConfig, work_dir: &Path) -> Self {
        let work_dir = if work_dir.is_absolute() {
            work_dir.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(work_dir))
                .unwrap_or_else(|_| work_dir.to_path_buf())
        };
        let work_dir = work_dir.as_path();
        let ids = ProcessIds::current();
        let resolve = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                work_dir.join(p)
            }
        };

        Self {
            layout: PackageLayout::from_config(&config),
            work_dir: work_dir.to_path_buf(),
            source_dir: resolve(&config.paths.source_dir),
            assets_dir: resolve(&config.paths.assets_dir),
            staging_dir: resolve(&config.paths.staging_dir),
            changelog: resolve(&config.paths.changelog),
            output_dir: resolve(&config.paths.output_dir),
            owner: Owner::invoking(ids),
            euid: ids.euid,
            architecture: None,
            version: None,
            installed_size: None,
            package_file: None,
            completed: Vec::new(),
            config,
        }
    }

    /// Absolute path of a staging-relative path.
    pub fn staged(&self, relative: &Path) -> PathBuf {
        self.staging_dir.join(relative)
    }

    /// The freshly compiled binary inside the source directory.
    pub fn compiled_binary(&self) -> PathBuf {
        self.source_dir.join(&self.config.binary)
    }

    /// `<name>-<version>_<arch>.deb` in the output directory, once both are known.
    pub fn package_path(&self) -> Option<PathBuf> {
        let version = self.version.as_deref()?;
        let arch = self.architecture.as_deref()?;
        let file = format!("{}-{}_{}.deb", self.config.name, version, arch);
        Some(self.output_dir.join(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_resolved_against_work_dir() {
        let mut config = PackageConfig::with_defaults("redapid");
        config.paths.changelog = PathBuf::from("/srv/changelog");
        let ctx = BuildContext::new(config, Path::new("/work"));

        assert_eq!(ctx.source_dir, PathBuf::from("/work/redapid"));
        assert_eq!(ctx.staging_dir, PathBuf::from("/work/dist"));
        assert_eq!(ctx.changelog, PathBuf::from("/srv/changelog"));
        assert_eq!(
            ctx.compiled_binary(),
            PathBuf::from("/work/redapid/redapid")
        );
        assert_eq!(
            ctx.staged(Path::new("DEBIAN/control")),
            PathBuf::from("/work/dist/DEBIAN/control")
        );
    }

    #[test]
    fn test_relative_work_dir_made_absolute() {
        let config = PackageConfig::with_defaults("redapid");
        let ctx = BuildContext::new(config, Path::new("checkout"));

        assert!(ctx.work_dir.is_absolute());
        assert!(ctx.staging_dir.is_absolute());
        assert!(ctx.staging_dir.ends_with("checkout/dist"));
    }

    #[test]
    fn test_context_records_process_euid() {
        let config = PackageConfig::with_defaults("redapid");
        let ctx = BuildContext::new(config, Path::new("/work"));
        assert_eq!(ctx.euid, ProcessIds::current().euid);
    }

    #[test]
    fn test_package_path_needs_version_and_arch() {
        let mut ctx =
            BuildContext::new(PackageConfig::with_defaults("redapid"), Path::new("/work"));
        assert!(ctx.package_path().is_none());

        ctx.version = Some("2.0.3".into());
        ctx.architecture = Some("armhf".into());
        assert_eq!(
            ctx.package_path(),
            Some(PathBuf::from("/work/./redapid-2.0.3_armhf.deb"))
        );
    }

    #[test]
    fn test_owner_prefers_sudo_ids_when_root() {
        assert_eq!(
            Owner::resolve(0, 0, 0, Some(1000), Some(1001)),
            Owner {
                uid: 1000,
                gid: 1001
            }
        );
        assert_eq!(
            Owner::resolve(1000, 1000, 1000, Some(5), Some(5)),
            Owner {
                uid: 1000,
                gid: 1000
            }
        );
        assert_eq!(Owner::resolve(0, 0, 0, None, None).chown_spec(), "0:0");
    }
}
