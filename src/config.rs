//! Project configuration (`pkg-assembler.toml`).
//!
//! Only `[package].name` is required; everything else defaults to the layout
//! of a C daemon built with `make` next to a `build_data/linux` asset tree.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{BuildError, Result};

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILENAME: &str = "pkg-assembler.toml";

/// Environment variable that overrides `toolchain.compiler`.
pub const COMPILER_ENV: &str = "PKG_ASSEMBLER_CC";

/// Who may run the build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrivilegePolicy {
    /// Build as an ordinary user; only the ownership change is elevated.
    #[default]
    RefuseRoot,
    /// Build as root; no elevation prefix is used.
    RequireRoot,
}

#[derive(Debug, Clone)]
pub struct PackageConfig {
    pub name: String,
    pub binary: String,
    pub version_flag: String,
    pub paths: PathsConfig,
    pub toolchain: ToolchainConfig,
    pub policy: PolicyConfig,
    pub layout: LayoutConfig,
    pub lint: LintConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathsConfig {
    /// Directory where `make` runs and the binary is produced.
    pub source_dir: PathBuf,
    /// Static packaging skeleton copied into the staging tree.
    pub assets_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub changelog: PathBuf,
    /// Where the `.deb` and the build report are written.
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ToolchainConfig {
    pub make: String,
    pub compiler: String,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            make: "make".to_string(),
            compiler: "gcc".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PolicyConfig {
    pub privilege: PrivilegePolicy,
    /// Command prefix for the root ownership change, e.g. `["sudo"]`.
    pub elevate: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            privilege: PrivilegePolicy::default(),
            elevate: vec!["sudo".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutConfig {
    /// Suffixes of `etc/cron.d/<name>-<fragment>` files.
    pub cron_fragments: Vec<String>,
    /// Man page file names; the section is the trailing number.
    pub man_pages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LintConfig {
    pub tool: String,
    pub args: Vec<String>,
    pub fail_on_warnings: bool,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            tool: "lintian".to_string(),
            args: vec!["--pedantic".to_string()],
            fail_on_warnings: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    package: PackageToml,
    #[serde(default)]
    paths: PathsToml,
    #[serde(default)]
    toolchain: ToolchainConfig,
    #[serde(default)]
    policy: PolicyConfig,
    #[serde(default)]
    layout: LayoutToml,
    #[serde(default)]
    lint: LintConfig,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PackageToml {
    name: String,
    binary: Option<String>,
    version_flag: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PathsToml {
    source_dir: Option<PathBuf>,
    assets_dir: Option<PathBuf>,
    staging_dir: Option<PathBuf>,
    changelog: Option<PathBuf>,
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LayoutToml {
    cron_fragments: Option<Vec<String>>,
    man_pages: Option<Vec<String>>,
}

impl PackageConfig {
    /// Config with every default applied for a package called `name`.
    pub fn with_defaults(name: &str) -> Self {
        Self {
            name: name.to_string(),
            binary: name.to_string(),
            version_flag: "--version".to_string(),
            paths: PathsConfig {
                source_dir: PathBuf::from(name),
                assets_dir: PathBuf::from("build_data/linux"),
                staging_dir: PathBuf::from("dist"),
                changelog: PathBuf::from("../changelog"),
                output_dir: PathBuf::from("."),
            },
            toolchain: ToolchainConfig::default(),
            policy: PolicyConfig::default(),
            layout: LayoutConfig {
                cron_fragments: Vec::new(),
                man_pages: vec![format!("{name}.8"), format!("{name}.conf.5")],
            },
            lint: LintConfig::default(),
        }
    }

    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| BuildError::Config {
            path: path.to_path_buf(),
            detail: format!("cannot read file: {e}"),
        })?;
        Self::parse(&text, path)
    }

    /// Parse config text; `origin` is only used in error messages.
    pub fn parse(text: &str, origin: &Path) -> Result<Self> {
        let parsed: ConfigToml = toml::from_str(text).map_err(|e| BuildError::Config {
            path: origin.to_path_buf(),
            detail: e.to_string(),
        })?;

        let name = parsed.package.name.trim().to_string();
        if name.is_empty() || name.contains('/') || name.contains(char::is_whitespace) {
            return Err(BuildError::Config {
                path: origin.to_path_buf(),
                detail: format!("package.name '{name}' is not a valid package name"),
            });
        }

        let mut config = Self::with_defaults(&name);
        if let Some(binary) = parsed.package.binary {
            config.binary = binary;
        }
        if let Some(flag) = parsed.package.version_flag {
            config.version_flag = flag;
        }

        let paths = parsed.paths;
        let defaults = &mut config.paths;
        if let Some(p) = paths.source_dir {
            defaults.source_dir = p;
        }
        if let Some(p) = paths.assets_dir {
            defaults.assets_dir = p;
        }
        if let Some(p) = paths.staging_dir {
            defaults.staging_dir = p;
        }
        if let Some(p) = paths.changelog {
            defaults.changelog = p;
        }
        if let Some(p) = paths.output_dir {
            defaults.output_dir = p;
        }

        if let Some(fragments) = parsed.layout.cron_fragments {
            config.layout.cron_fragments = fragments;
        }
        if let Some(pages) = parsed.layout.man_pages {
            for page in &pages {
                if man_section(page).is_none() {
                    return Err(BuildError::Config {
                        path: origin.to_path_buf(),
                        detail: format!("man page '{page}' has no numeric section suffix"),
                    });
                }
            }
            config.layout.man_pages = pages;
        }

        config.toolchain = parsed.toolchain;
        config.policy = parsed.policy;
        config.lint = parsed.lint;
        Ok(config)
    }

    /// Apply `PKG_ASSEMBLER_CC`, if set and non-empty.
    pub fn apply_env_overrides(&mut self) {
        self.apply_compiler_override(std::env::var(COMPILER_ENV).ok());
    }

    fn apply_compiler_override(&mut self, value: Option<String>) {
        if let Some(cc) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
            tracing::debug!("compiler overridden by {COMPILER_ENV}: {cc}");
            self.toolchain.compiler = cc;
        }
    }
}

/// Section of a man page file name: `redapid.conf.5` → `5`.
pub fn man_section(page: &str) -> Option<&str> {
    let (_, section) = page.rsplit_once('.')?;
    let starts_with_digit = section.chars().next().is_some_and(|c| c.is_ascii_digit());
    starts_with_digit.then_some(section)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<PackageConfig> {
        PackageConfig::parse(text, Path::new("pkg-assembler.toml"))
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse("[package]\nname = \"redapid\"\n").unwrap();

        assert_eq!(config.binary, "redapid");
        assert_eq!(config.version_flag, "--version");
        assert_eq!(config.paths.source_dir, PathBuf::from("redapid"));
        assert_eq!(config.paths.staging_dir, PathBuf::from("dist"));
        assert_eq!(config.toolchain.compiler, "gcc");
        assert_eq!(config.policy.privilege, PrivilegePolicy::RefuseRoot);
        assert_eq!(config.policy.elevate, vec!["sudo".to_string()]);
        assert_eq!(config.layout.man_pages, vec!["redapid.8", "redapid.conf.5"]);
        assert_eq!(config.lint.args, vec!["--pedantic".to_string()]);
        assert!(!config.lint.fail_on_warnings);
    }

    #[test]
    fn test_full_config() {
        let config = parse(
            r#"
[package]
name = "redapid"
binary = "redapid-bin"

[paths]
source_dir = "src/redapid"
changelog = "CHANGELOG"

[toolchain]
compiler = "clang"

[policy]
privilege = "require-root"
elevate = []

[layout]
cron_fragments = ["delete-purged-programs"]

[lint]
args = ["--pedantic", "--allow-root"]
fail_on_warnings = true
"#,
        )
        .unwrap();

        assert_eq!(config.binary, "redapid-bin");
        assert_eq!(config.paths.source_dir, PathBuf::from("src/redapid"));
        assert_eq!(config.paths.assets_dir, PathBuf::from("build_data/linux"));
        assert_eq!(config.toolchain.compiler, "clang");
        assert_eq!(config.toolchain.make, "make");
        assert_eq!(config.policy.privilege, PrivilegePolicy::RequireRoot);
        assert!(config.policy.elevate.is_empty());
        assert_eq!(config.layout.cron_fragments, vec!["delete-purged-programs"]);
        assert!(config.lint.fail_on_warnings);
    }

    #[test]
    fn test_demo_config_parses() {
        let config = parse(include_str!("../demos/pkg-assembler.toml")).unwrap();
        assert_eq!(config.name, "redapid");
        assert_eq!(config.layout.cron_fragments, vec!["delete-purged-programs"]);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = parse("[package]\nname = \"x\"\nflavour = \"y\"\n").unwrap_err();
        assert!(matches!(err, BuildError::Config { .. }));
    }

    #[test]
    fn test_unknown_privilege_policy_rejected() {
        let source = "[package]\nname = \"x\"\n[policy]\nprivilege = \"whatever\"\n";
        let err = parse(source).unwrap_err();
        assert!(matches!(err, BuildError::Config { .. }));
    }

    #[test]
    fn test_invalid_name_rejected() {
        assert!(parse("[package]\nname = \"two words\"\n").is_err());
        assert!(parse("[package]\nname = \"\"\n").is_err());
    }

    #[test]
    fn test_man_page_without_section_rejected() {
        let source = "[package]\nname = \"x\"\n[layout]\nman_pages = [\"x.txt\"]\n";
        let err = parse(source).unwrap_err();
        assert!(err.to_string().contains("x.txt"));
    }

    #[test]
    fn test_compiler_override() {
        let mut config = PackageConfig::with_defaults("redapid");
        config.apply_compiler_override(Some("  ".into()));
        assert_eq!(config.toolchain.compiler, "gcc");
        config.apply_compiler_override(Some("clang-17".into()));
        assert_eq!(config.toolchain.compiler, "clang-17");
    }

    #[test]
    fn test_man_section() {
        assert_eq!(man_section("redapid.8"), Some("8"));
        assert_eq!(man_section("redapid.conf.5"), Some("5"));
        assert_eq!(man_section("redapid"), None);
        assert_eq!(man_section("redapid.conf"), None);
    }
}
