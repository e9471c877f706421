//! Build a Debian binary package from a C daemon source tree.
//!
//! The crate compiles the daemon with `make`, stages a static asset tree
//! (control files, maintainer scripts, init script, config, man pages),
//! specializes the `DEBIAN/control` template with the detected architecture,
//! version and installed size, then runs the usual Debian post-processing
//! (strip, compress docs, md5sums, file modes, root ownership) before calling
//! `dpkg -b` and verifying the result with a package linter.
//!
//! # Architecture
//!
//! ```text
//! pkg-assembler (binary)
//!     │
//!     ├── config      pkg-assembler.toml → PackageConfig
//!     ├── context     BuildContext: resolved paths, discovered facts
//!     └── pipeline    ordered Stages, stop at first failure
//!             │
//!             ├── preflight     platform, privilege, host tools
//!             ├── staging       clean, copy assets, install files
//!             ├── template      <<TOKEN>> specialization
//!             ├── manifest      version, installed size, md5sums
//!             ├── permissions   mode table
//!             └── process       every external tool, via CommandRunner
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use pkg_assembler::{BuildContext, PackageConfig, Pipeline, SystemRunner};
//!
//! let config = PackageConfig::load(Path::new("pkg-assembler.toml"))?;
//! let mut ctx = BuildContext::new(config, Path::new("."));
//! Pipeline::standard().run(&mut ctx, &SystemRunner)?;
//! # Ok::<(), pkg_assembler::BuildError>(())
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod layout;
pub mod manifest;
pub mod permissions;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod report;
pub mod staging;
pub mod template;

pub use config::{PackageConfig, PrivilegePolicy};
pub use context::{BuildContext, Owner};
pub use error::{BuildError, Result};
pub use layout::PackageLayout;
pub use pipeline::{Pipeline, Stage};
pub use process::{CommandRunner, CommandSpec, SystemRunner};
pub use report::BuildReport;
pub use template::{specialize, PlaceholderSet};
