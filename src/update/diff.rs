use anyhow::{Context, Result};
use colored::Colorize;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    New,
    Changed,
}

/// A staged file that needs to land in the installation root
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// File name relative to both the staging dir and the install root
    pub name: PathBuf,
    pub kind: ChangeKind,
}

#[derive(Debug, Default)]
pub struct UpdatePlan {
    pub entries: Vec<FileEntry>,
}

impl UpdatePlan {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Compare staged release files against the installation root.
///
/// Release bundles are flat: only files directly under the staging
/// directory participate. Nested directories are reported and skipped.
/// A file whose comparison fails is skipped without failing the diff.
pub fn build_plan(staging: &Path, install_root: &Path) -> Result<UpdatePlan> {
    let mut plan = UpdatePlan::default();

    let entries =
        fs::read_dir(staging).with_context(|| format!("Failed to list {}", staging.display()))?;

    for entry in entries {
        let entry = entry?;
        let staged = entry.path();

        if staged.is_dir() {
            eprintln!(
                "{} ignoring directory {} in release bundle (only top-level files are reconciled)",
                "⚠".yellow(),
                entry.file_name().to_string_lossy()
            );
            continue;
        }

        let name = PathBuf::from(entry.file_name());
        let local = install_root.join(&name);

        if !local.exists() {
            tracing::debug!("{} is new", name.display());
            plan.entries.push(FileEntry {
                name,
                kind: ChangeKind::New,
            });
            continue;
        }

        match files_differ(&staged, &local) {
            Ok(true) => {
                tracing::debug!("{} changed", name.display());
                plan.entries.push(FileEntry {
                    name,
                    kind: ChangeKind::Changed,
                });
            }
            Ok(false) => tracing::debug!("{} is up to date", name.display()),
            Err(e) => {
                eprintln!(
                    "{} could not compare {}: {:#}",
                    "⚠".yellow(),
                    name.display(),
                    e
                );
            }
        }
    }

    Ok(plan)
}

fn files_differ(staged: &Path, local: &Path) -> Result<bool> {
    let staged_len = fs::metadata(staged)?.len();
    let local_len = fs::metadata(local)?.len();
    if staged_len != local_len {
        return Ok(true);
    }

    let mut staged_file = BufReader::new(File::open(staged)?);
    let mut local_file = BufReader::new(File::open(local)?);
    let mut staged_buf = [0u8; 8192];
    let mut local_buf = [0u8; 8192];

    loop {
        let n = staged_file.read(&mut staged_buf)?;
        if n == 0 {
            return Ok(false);
        }
        local_file.read_exact(&mut local_buf[..n])?;
        if staged_buf[..n] != local_buf[..n] {
            return Ok(true);
        }
    }
}
