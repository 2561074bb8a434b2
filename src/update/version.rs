use anyhow::{anyhow, Context, Result};
use semver::Version;
use std::fs;
use std::path::{Path, PathBuf};

/// Marker file recording the installed release as `<tag> <commit>`
pub const MARKER_FILE: &str = "upkeep-version.txt";

/// Identity of the release currently installed in the local root
#[derive(Debug, Clone, PartialEq)]
pub struct InstalledVersion {
    pub tag: String,
    pub commit: String,
}

pub fn marker_path(root: &Path) -> PathBuf {
    root.join(MARKER_FILE)
}

/// Read the installed-release marker; absent or empty means no prior version
pub fn read_marker(root: &Path) -> Result<Option<InstalledVersion>> {
    let path = marker_path(root);
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read version marker {}", path.display()))?;

    let mut parts = content.split_whitespace();
    match parts.next() {
        Some(tag) => Ok(Some(InstalledVersion {
            tag: tag.to_string(),
            commit: parts.next().unwrap_or("").to_string(),
        })),
        None => Ok(None),
    }
}

/// Overwrite the marker with the newly installed release identity
pub fn write_marker(root: &Path, tag: &str, commit: &str) -> Result<()> {
    let path = marker_path(root);
    fs::write(&path, format!("{} {}", tag, commit))
        .with_context(|| format!("Failed to write version marker {}", path.display()))
}

/// Parse a release tag (optional 'v' prefix, 1-3 numeric components)
pub fn parse_tag(tag: &str) -> Result<Version> {
    let cleaned = tag.trim().trim_start_matches('v');

    // Tags like "2.3" predate full semver; pad the missing components
    let (core, rest) = match cleaned.find(|c| c == '-' || c == '+') {
        Some(i) => cleaned.split_at(i),
        None => (cleaned, ""),
    };
    let padded = match core.split('.').count() {
        1 => format!("{}.0.0{}", core, rest),
        2 => format!("{}.0{}", core, rest),
        _ => cleaned.to_string(),
    };

    Version::parse(&padded).map_err(|e| anyhow!("Invalid release tag '{}': {}", tag, e))
}

/// Compare tags, returns true if `remote` is strictly newer than `local`
pub fn is_newer(remote: &str, local: &str) -> Result<bool> {
    let remote_ver = parse_tag(remote)?;
    let local_ver = parse_tag(local)?;
    Ok(remote_ver > local_ver)
}
