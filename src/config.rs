use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

fn default_owner() -> String {
    "upkeep-sh".to_string()
}

fn default_repo() -> String {
    "upkeep".to_string()
}

#[derive(Debug, Deserialize)]
pub struct Config {
    /// GitHub owner the releases are published under
    #[serde(default = "default_owner")]
    pub owner: String,

    /// GitHub repository name
    #[serde(default = "default_repo")]
    pub repo: String,

    /// Release asset filename; defaults to `<repo>-release.zip`
    #[serde(default)]
    pub archive: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            repo: default_repo(),
            archive: None,
        }
    }
}

impl Config {
    /// Load config from the install root, then the home config dir, then defaults
    pub fn load(root: &Path) -> Result<Self> {
        for path in [root.join("upkeep.toml"), Self::home_config_path()] {
            if path.exists() {
                let content = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                let config: Config = toml::from_str(&content)
                    .with_context(|| format!("Invalid config {}", path.display()))?;
                return Ok(config);
            }
        }

        Ok(Self::default())
    }

    pub fn home_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("upkeep")
            .join("config.toml")
    }

    /// Fixed release archive filename the remote is expected to publish
    pub fn archive_name(&self) -> String {
        match &self.archive {
            Some(name) => name.clone(),
            None => format!("{}-release.zip", self.repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_no_file() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.owner, "upkeep-sh");
        assert_eq!(config.repo, "upkeep");
        assert_eq!(config.archive_name(), "upkeep-release.zip");
    }

    #[test]
    fn test_install_root_config_wins() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("upkeep.toml"),
            "owner = \"someone\"\nrepo = \"tool\"\narchive = \"tool-bundle.zip\"\n",
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.owner, "someone");
        assert_eq!(config.repo, "tool");
        assert_eq!(config.archive_name(), "tool-bundle.zip");
    }

    #[test]
    fn test_archive_name_follows_repo() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("upkeep.toml"), "repo = \"guide\"\n").unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.archive_name(), "guide-release.zip");
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("upkeep.toml"), "owner = [not toml").unwrap();
        assert!(Config::load(dir.path()).is_err());
    }
}
