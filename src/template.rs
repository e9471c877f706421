//! Template specialization.
//!
//! Rewrites a file by replacing literal placeholder tokens (e.g. `<<VERSION>>`)
//! with values. The file is scanned as raw bytes, line by line, so any text
//! encoding passes through untouched. Every placeholder must match at least
//! once or the whole operation fails before anything is written.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::error::{BuildError, FsContext, Result};

/// Placeholder for the derived package version.
pub const VERSION_TOKEN: &str = "<<VERSION>>";
/// Placeholder for the detected target architecture.
pub const ARCHITECTURE_TOKEN: &str = "<<ARCHITECTURE>>";
/// Placeholder for the installed size in KiB.
pub const INSTALLED_SIZE_TOKEN: &str = "<<INSTALLED_SIZE>>";

/// Token → replacement mapping. Iteration order is the token order, so
/// specialization is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceholderSet {
    entries: BTreeMap<String, String>,
}

impl PlaceholderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, token: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(token, value);
        self
    }

    pub fn insert(&mut self, token: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(token.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Specialize `content` in memory.
///
/// Returns the rewritten bytes, or the sorted list of tokens that never matched.
pub fn specialize_bytes(
    content: &[u8],
    placeholders: &PlaceholderSet,
) -> std::result::Result<Vec<u8>, Vec<String>> {
    let mut output = Vec::with_capacity(content.len());
    let mut applied: BTreeSet<&str> = BTreeSet::new();

    for line in content.split_inclusive(|b| *b == b'\n') {
        let mut current = line.to_vec();
        for (token, value) in placeholders.iter() {
            if let Some(replaced) = replace_all(&current, token.as_bytes(), value.as_bytes()) {
                applied.insert(token);
                current = replaced;
            }
        }
        output.extend_from_slice(&current);
    }

    let missing: Vec<String> = placeholders
        .tokens()
        .filter(|token| !applied.contains(token))
        .map(str::to_string)
        .collect();

    if missing.is_empty() {
        Ok(output)
    } else {
        Err(missing)
    }
}

/// Specialize `template` into `destination`.
///
/// `destination` may be the same path as `template`. Completeness is checked
/// before writing, so a failed call leaves the destination untouched.
pub fn specialize(
    template: &Path,
    destination: &Path,
    placeholders: &PlaceholderSet,
) -> Result<()> {
    let content = fs::read(template).fs_context("reading template", template)?;

    let specialized = specialize_bytes(&content, placeholders).map_err(|missing| {
        BuildError::TemplateIncomplete {
            template: template.to_path_buf(),
            missing,
        }
    })?;

    fs::write(destination, specialized).fs_context("writing specialized file", destination)?;
    tracing::debug!(
        "specialized {} -> {} ({} placeholders)",
        template.display(),
        destination.display(),
        placeholders.len()
    );
    Ok(())
}

/// Literal replacement of every occurrence of `needle`.
/// `None` when there is no occurrence. An empty needle never matches.
fn replace_all(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> Option<Vec<u8>> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }

    let mut out = Vec::with_capacity(haystack.len());
    let mut matched = false;
    let mut i = 0;
    while i < haystack.len() {
        if haystack[i..].starts_with(needle) {
            out.extend_from_slice(replacement);
            i += needle.len();
            matched = true;
        } else {
            out.push(haystack[i]);
            i += 1;
        }
    }

    matched.then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn control_placeholders() -> PlaceholderSet {
        PlaceholderSet::new()
            .with(VERSION_TOKEN, "2.0.3")
            .with(ARCHITECTURE_TOKEN, "armhf")
            .with(INSTALLED_SIZE_TOKEN, "1234")
    }

    #[test]
    fn test_multiple_placeholders_on_one_line() {
        let placeholders = PlaceholderSet::new()
            .with("<<V>>", "1.2.3")
            .with("<<A>>", "amd64");

        let out = specialize_bytes(b"Version: <<V>> Arch: <<A>>", &placeholders).unwrap();
        assert_eq!(out, b"Version: 1.2.3 Arch: amd64");
    }

    #[test]
    fn test_repeated_token_replaced_everywhere() {
        let placeholders = PlaceholderSet::new().with("@N@", "redapid");
        let out = specialize_bytes(b"@N@ @N@\nx @N@\n", &placeholders).unwrap();
        assert_eq!(out, b"redapid redapid\nx redapid\n");
    }

    #[test]
    fn test_missing_tokens_are_all_reported() {
        let placeholders = control_placeholders();
        let err = specialize_bytes(b"Version: <<VERSION>>\n", &placeholders).unwrap_err();
        assert_eq!(err, vec![ARCHITECTURE_TOKEN, INSTALLED_SIZE_TOKEN]);
    }

    #[test]
    fn test_non_utf8_content_passes_through() {
        let placeholders = PlaceholderSet::new().with("<<V>>", "1.0");
        let input = b"\xff\xfe <<V>>\r\n\x00tail";
        let out = specialize_bytes(input, &placeholders).unwrap();
        assert_eq!(out, b"\xff\xfe 1.0\r\n\x00tail");
    }

    #[test]
    fn test_empty_token_never_matches() {
        let placeholders = PlaceholderSet::new().with("", "x");
        let err = specialize_bytes(b"anything", &placeholders).unwrap_err();
        assert_eq!(err, vec![String::new()]);
    }

    #[test]
    fn test_empty_set_is_a_verbatim_copy() {
        let out = specialize_bytes(b"a\nb", &PlaceholderSet::new()).unwrap();
        assert_eq!(out, b"a\nb");
    }

    #[test]
    fn test_specialize_in_place() {
        let temp = TempDir::new().unwrap();
        let control = temp.path().join("control");
        let template = concat!(
            "Package: redapid\n",
            "Version: <<VERSION>>\n",
            "Architecture: <<ARCHITECTURE>>\n",
            "Installed-Size: <<INSTALLED_SIZE>>\n",
        );
        fs::write(&control, template).unwrap();

        specialize(&control, &control, &control_placeholders()).unwrap();

        let written = fs::read_to_string(&control).unwrap();
        assert_eq!(
            written,
            "Package: redapid\nVersion: 2.0.3\nArchitecture: armhf\nInstalled-Size: 1234\n"
        );
        assert!(!written.contains("<<"));
    }

    #[test]
    fn test_incomplete_template_leaves_destination_untouched() {
        let temp = TempDir::new().unwrap();
        let template = temp.path().join("control.in");
        let destination = temp.path().join("control");
        fs::write(&template, "Version: <<VERSION>>\n").unwrap();
        fs::write(&destination, "previous\n").unwrap();

        let err = specialize(&template, &destination, &control_placeholders()).unwrap_err();

        match err {
            BuildError::TemplateIncomplete { template: t, missing } => {
                assert_eq!(t, template);
                assert_eq!(missing.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fs::read_to_string(&destination).unwrap(), "previous\n");
    }

    #[test]
    fn test_second_specialization_fails() {
        let temp = TempDir::new().unwrap();
        let control = temp.path().join("control");
        fs::write(&control, "Version: <<VERSION>>\n").unwrap();
        let placeholders = PlaceholderSet::new().with(VERSION_TOKEN, "1.0");

        specialize(&control, &control, &placeholders).unwrap();
        let err = specialize(&control, &control, &placeholders).unwrap_err();
        assert!(matches!(err, BuildError::TemplateIncomplete { .. }));
        assert_eq!(fs::read_to_string(&control).unwrap(), "Version: 1.0\n");
    }

    #[test]
    fn test_missing_template_is_filesystem_error() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope");
        let err = specialize(&missing, &missing, &PlaceholderSet::new()).unwrap_err();
        assert!(matches!(err, BuildError::Filesystem { .. }));
    }
}
