//! Paths inside the staging tree and the file-mode table that covers them.

use std::path::PathBuf;

use crate::config::{man_section, PackageConfig};

/// Maintainer scripts dpkg runs around install/removal.
pub const MAINTAINER_SCRIPTS: &[&str] = &["preinst", "postinst", "prerm", "postrm"];

/// Mode for directories, binaries and scripts.
pub const MODE_EXECUTABLE: u32 = 0o755;
/// Mode for configuration, metadata and documentation.
pub const MODE_DATA: u32 = 0o644;

/// Staging-relative layout of one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageLayout {
    pub name: String,
    pub binary: String,
    pub cron_fragments: Vec<String>,
    pub man_pages: Vec<String>,
}

impl PackageLayout {
    pub fn from_config(config: &PackageConfig) -> Self {
        Self {
            name: config.name.clone(),
            binary: config.binary.clone(),
            cron_fragments: config.layout.cron_fragments.clone(),
            man_pages: config.layout.man_pages.clone(),
        }
    }

    pub fn control_dir(&self) -> PathBuf {
        PathBuf::from("DEBIAN")
    }

    pub fn control_file(&self) -> PathBuf {
        self.control_dir().join("control")
    }

    pub fn md5sums_file(&self) -> PathBuf {
        self.control_dir().join("md5sums")
    }

    pub fn bin_dir(&self) -> PathBuf {
        PathBuf::from("usr/bin")
    }

    pub fn installed_binary(&self) -> PathBuf {
        self.bin_dir().join(&self.binary)
    }

    /// Subtree whose files go into the checksum manifest.
    pub fn checksum_root(&self) -> PathBuf {
        PathBuf::from("usr")
    }

    pub fn doc_dir(&self) -> PathBuf {
        PathBuf::from("usr/share/doc").join(&self.name)
    }

    /// Changelog before compression.
    pub fn changelog(&self) -> PathBuf {
        self.doc_dir().join("changelog")
    }

    /// Uncompressed man pages as shipped in the asset tree.
    pub fn man_pages(&self) -> Vec<PathBuf> {
        self.man_pages
            .iter()
            .filter_map(|page| {
                let section = man_section(page)?;
                let dir = PathBuf::from(format!("usr/share/man/man{section}"));
                Some(dir.join(page))
            })
            .collect()
    }

    /// Files replaced by their `.gz` form during documentation processing.
    pub fn compressed_docs(&self) -> Vec<PathBuf> {
        let mut docs = vec![self.changelog()];
        docs.extend(self.man_pages());
        docs
    }

    /// Every staged file and the mode it must end up with.
    ///
    /// The table is exhaustive: a staged file missing here is reported as an error.
    pub fn permission_table(&self) -> Vec<(PathBuf, u32)> {
        let control = self.control_dir();
        let mut table = vec![
            (control.join("control"), MODE_DATA),
            (control.join("conffiles"), MODE_DATA),
            (control.join("md5sums"), MODE_DATA),
        ];
        for script in MAINTAINER_SCRIPTS {
            table.push((control.join(script), MODE_EXECUTABLE));
        }

        table.push((self.installed_binary(), MODE_EXECUTABLE));

        let etc = PathBuf::from("etc");
        table.push((etc.join(format!("{}.conf", self.name)), MODE_DATA));
        table.push((etc.join("init.d").join(&self.name), MODE_EXECUTABLE));
        for fragment in &self.cron_fragments {
            let fragment = format!("{}-{}", self.name, fragment);
            table.push((etc.join("cron.d").join(fragment), MODE_DATA));
        }
        table.push((etc.join("logrotate.d").join(&self.name), MODE_DATA));

        table.push((gz(&self.changelog()), MODE_DATA));
        table.push((self.doc_dir().join("copyright"), MODE_DATA));
        for page in self.man_pages() {
            table.push((gz(&page), MODE_DATA));
        }

        table
    }
}

/// `path` with `.gz` appended to the file name.
pub fn gz(path: &std::path::Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".gz");
    PathBuf::from(name)
}
