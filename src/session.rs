use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::cleanup::Cleanup;

pub const LOG_FILE: &str = "upkeep.log";

/// Which side of the self-update handoff this process is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The installed binary the user invoked
    Original,
    /// The temporary copy relaunched with `--update-self`
    Continuation { parent_pid: u32 },
}

/// Everything an update run carries with it: the phase, the directory being
/// managed, the temp-path registry, and the audit log. One session per
/// process; nothing here outlives the run.
pub struct UpdateSession {
    pub phase: Phase,
    pub install_root: PathBuf,
    pub cleanup: Cleanup,
    log_path: PathBuf,
}

impl UpdateSession {
    pub fn new(phase: Phase, install_root: PathBuf) -> Self {
        let log_path = install_root.join(LOG_FILE);
        Self {
            phase,
            install_root,
            cleanup: Cleanup::new(),
            log_path,
        }
    }

    pub fn is_continuation(&self) -> bool {
        matches!(self.phase, Phase::Continuation { .. })
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Append a timestamped line to upkeep.log.
    /// The log is an audit trail; write failures never interrupt an update.
    pub fn log(&self, message: &str) {
        let line = format!("[{}] {}\n", Local::now().format("%Y-%m-%d %H:%M:%S"), message);
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .and_then(|mut f| f.write_all(line.as_bytes()));
        if let Err(e) = written {
            tracing::debug!("could not append to {}: {}", self.log_path.display(), e);
        }
    }
}
