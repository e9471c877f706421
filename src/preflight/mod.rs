//! Preflight checks run before the build touches anything.
//!
//! Validates the host platform, the privilege level against the configured
//! policy, and that every tool the pipeline invokes is installed. This
//! prevents a build from failing halfway with a cryptic spawn error.
//!
//! # Example
//!
//! ```rust
//! use pkg_assembler::preflight::{command_exists, check_required_tools};
//!
//! if !command_exists("dpkg-deb") {
//!     println!("dpkg not installed");
//! }
//!
//! let tools = &[("gzip", "gzip"), ("md5sum", "coreutils")];
//! if let Err(e) = check_required_tools(tools) {
//!     eprintln!("{}", e);
//! }
//! ```

use crate::config::{PackageConfig, PrivilegePolicy};
use crate::error::{BuildError, Result};

/// Check if a command exists on the host system.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Host tools every build needs, independent of configuration.
///
/// Each tuple is (command_name, package_name).
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("dpkg", "dpkg"),
    ("du", "coreutils"),
    ("md5sum", "coreutils"),
    ("chown", "coreutils"),
    ("rm", "coreutils"),
    ("gzip", "gzip"),
    ("objcopy", "binutils"),
];

/// Check that specific tools are available.
///
/// # Returns
///
/// * `Ok(())` if all tools are found
/// * `Err` listing every missing tool and the package that provides it
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<String> = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .map(|(tool, package)| format!("  {} (install: {})", tool, package))
        .collect();

    if !missing.is_empty() {
        return Err(BuildError::Precondition(format!(
            "missing required host tools:\n{}",
            missing.join("\n")
        )));
    }

    Ok(())
}

/// Reject anything but Linux.
pub fn check_platform(os: &str) -> Result<()> {
    if os != "linux" {
        return Err(BuildError::Precondition(format!(
            "unsupported platform: {os}"
        )));
    }
    Ok(())
}

/// Enforce the privilege policy for effective user id `euid`.
pub fn check_privilege(policy: PrivilegePolicy, euid: u32) -> Result<()> {
    match (policy, euid) {
        (PrivilegePolicy::RefuseRoot, 0) => Err(BuildError::Precondition(
            "must not be started as root (privilege policy: refuse-root)".to_string(),
        )),
        (PrivilegePolicy::RequireRoot, uid) if uid != 0 => Err(BuildError::Precondition(format!(
            "must be started as root, running as uid {uid} (privilege policy: require-root)"
        ))),
        _ => Ok(()),
    }
}

/// Tools named by the configuration, plus [`REQUIRED_TOOLS`].
pub fn configured_tools(config: &PackageConfig) -> Vec<(String, String)> {
    let mut tools: Vec<(String, String)> = REQUIRED_TOOLS
        .iter()
        .map(|(t, p)| (t.to_string(), p.to_string()))
        .collect();
    tools.push((config.toolchain.make.clone(), "make".to_string()));
    for tool in [&config.toolchain.compiler, &config.lint.tool] {
        tools.push((tool.clone(), tool.clone()));
    }
    if config.policy.privilege == PrivilegePolicy::RefuseRoot {
        if let Some(elevate) = config.policy.elevate.first() {
            tools.push((elevate.clone(), elevate.clone()));
        }
    }
    tools
}

/// Run every preflight check for this host, as effective user `euid`.
pub fn run_all(config: &PackageConfig, euid: u32) -> Result<()> {
    check_platform(std::env::consts::OS)?;
    check_privilege(config.policy.privilege, euid)?;

    let tools = configured_tools(config);
    let borrowed: Vec<(&str, &str)> = tools
        .iter()
        .map(|(t, p)| (t.as_str(), p.as_str()))
        .collect();
    check_required_tools(&borrowed)
}
