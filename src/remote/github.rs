use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::io::Write;
use std::path::Path;

const GITHUB_API_URL: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("upkeep/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
pub struct Release {
    pub tag_name: String,
    pub name: Option<String>,
    pub body: Option<String>,
    /// Commit the release was cut from; recorded in the version marker
    pub target_commitish: String,
    pub assets: Vec<Asset>,
    pub html_url: String,
}

#[derive(Debug, Deserialize)]
pub struct Asset {
    pub name: String,
    pub browser_download_url: String,
    pub size: u64,
}

impl Release {
    /// Find the release asset carrying the configured archive name
    pub fn asset_named(&self, name: &str) -> Result<&Asset> {
        self.assets
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| anyhow!("Release {} has no asset named {}", self.tag_name, name))
    }
}

/// Blocking GitHub releases client for the configured repository
pub struct ReleaseClient {
    owner: String,
    repo: String,
    client: reqwest::blocking::Client,
}

impl ReleaseClient {
    pub fn new(owner: &str, repo: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            client,
        })
    }

    /// Fetch the latest release info from GitHub
    pub fn latest_release(&self) -> Result<Release> {
        let url = format!(
            "{}/repos/{}/{}/releases/latest",
            GITHUB_API_URL, self.owner, self.repo
        );

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .context("Failed to fetch releases from GitHub")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(anyhow!("No releases found for {}/{}", self.owner, self.repo));
        }

        if !response.status().is_success() {
            return Err(anyhow!(
                "GitHub API error: {} {}",
                response.status(),
                response.text().unwrap_or_default()
            ));
        }

        response
            .json::<Release>()
            .context("Failed to parse release JSON")
    }

    /// Download an asset to the destination path with a progress bar
    pub fn download_asset(&self, asset: &Asset, dest: &Path) -> Result<()> {
        let mut response = self
            .client
            .get(&asset.browser_download_url)
            .send()
            .context("Failed to download release archive")?;

        if !response.status().is_success() {
            return Err(anyhow!("Download failed: {}", response.status()));
        }

        let total_size = asset.size;
        let pb = ProgressBar::new(total_size);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                .unwrap()
                .progress_chars("#>-"),
        );

        let mut file = std::fs::File::create(dest)
            .with_context(|| format!("Failed to create {}", dest.display()))?;
        let mut downloaded: u64 = 0;
        let mut buffer = [0u8; 8192];

        loop {
            use std::io::Read;
            let bytes_read = response.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            file.write_all(&buffer[..bytes_read])?;
            downloaded += bytes_read as u64;
            pb.set_position(downloaded);
        }

        pb.finish_and_clear();
        Ok(())
    }

    /// Link to the commit range between two tags
    pub fn compare_url(&self, from_tag: &str, to_tag: &str) -> String {
        format!(
            "https://github.com/{}/{}/compare/{}...{}",
            self.owner, self.repo, from_tag, to_tag
        )
    }
}
