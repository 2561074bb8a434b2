use anyhow::{Context, Result};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

#[cfg(windows)]
pub const UNINSTALL_SCRIPT: &str = "upkeep-uninstall.bat";
#[cfg(not(windows))]
pub const UNINSTALL_SCRIPT: &str = "upkeep-uninstall.sh";

/// Temporary paths created during an update session, removed at session end.
///
/// Registration order is preserved. Draining is terminal: directories are
/// deleted recursively on the spot, plain files are held back and removed
/// when the value drops, which is effectively process exit for a session
/// owned by `main` (a just-downloaded archive may still be held open).
#[derive(Debug, Default)]
pub struct Cleanup {
    entries: Vec<PathBuf>,
    deferred: Vec<PathBuf>,
    drained: bool,
}

impl Cleanup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a path for deletion at session end
    pub fn register(&mut self, path: &Path) {
        if self.drained {
            tracing::warn!("cleanup already drained, ignoring {}", path.display());
            return;
        }
        if !path.exists() {
            tracing::warn!("not registering missing temp path {}", path.display());
            return;
        }
        if self.entries.iter().any(|p| p == path) {
            tracing::debug!("temp path already registered: {}", path.display());
            return;
        }

        tracing::debug!("registering temp path {}", path.display());
        self.entries.push(path.to_path_buf());
    }

    /// Remove registered paths in registration order.
    /// A single failure is reported and does not stop the rest.
    pub fn drain(&mut self) {
        if self.drained {
            return;
        }
        self.drained = true;

        for entry in std::mem::take(&mut self.entries) {
            if !entry.exists() {
                continue;
            }
            if entry.is_dir() {
                tracing::debug!("removing temp directory {}", entry.display());
                if let Err(e) = fs::remove_dir_all(&entry) {
                    eprintln!("{} cleanup: {}: {}", "⚠".yellow(), entry.display(), e);
                }
            } else {
                tracing::debug!("deferring temp file {}", entry.display());
                self.deferred.push(entry);
            }
        }
    }

    pub fn is_drained(&self) -> bool {
        self.drained
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        for path in &self.deferred {
            if !path.exists() {
                continue;
            }
            if let Err(e) = fs::remove_file(path) {
                tracing::warn!("could not remove deferred file {}: {}", path.display(), e);
            }
        }
    }
}

/// POSIX uninstall script: wait for the updater process to exit, remove the
/// temporary updater copy, remove the script itself. The PID wait is the
/// whole unlock story here; nothing holds a lock on a running executable's
/// file the way Windows does.
pub fn shell_script(temp_exe: &Path, log: &Path, pid: u32) -> String {
    let exe = quote_single(&temp_exe.display().to_string());
    let log = quote_single(&log.display().to_string());

    format!(
        r#"#!/bin/sh
exe='{exe}'
log='{log}'
echo "uninstall: waiting for updater (pid {pid}) to exit" >> "$log"
while kill -0 {pid} 2>/dev/null; do sleep 1; done
if [ -e "$exe" ]; then
    echo "uninstall: removing temporary updater copy" >> "$log"
    rm -f "$exe"
else
    echo "uninstall: temporary updater copy already gone" >> "$log"
fi
echo "uninstall: removing uninstall script" >> "$log"
rm -f "$0"
"#
    )
}

/// Windows uninstall script: a rename of the locked copy onto itself fails
/// until the OS drops the file lock, so retry it once a second.
pub fn batch_script(temp_exe: &Path, log: &Path) -> String {
    let exe = temp_exe.display().to_string();
    let exe_name = temp_exe
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| exe.clone());
    let log = log.display().to_string();

    format!(
        "@echo off\r\n\
         set \"exe={exe}\"\r\n\
         set \"log={log}\"\r\n\
         echo uninstall: waiting for updater to exit >> \"%log%\"\r\n\
         :waitloop\r\n\
         timeout /t 1 /nobreak > nul\r\n\
         2>nul ren \"%exe%\" \"{exe_name}\" && goto unlocked || goto waitloop\r\n\
         :unlocked\r\n\
         if exist \"%exe%\" (\r\n\
         \techo uninstall: removing temporary updater copy >> \"%log%\"\r\n\
         \tdel \"%exe%\"\r\n\
         ) else (\r\n\
         \techo uninstall: temporary updater copy already gone >> \"%log%\"\r\n\
         )\r\n\
         echo uninstall: removing uninstall script >> \"%log%\"\r\n\
         del \"%~f0\"\r\n"
    )
}

/// Write the platform uninstall script into the installation root
pub fn write_uninstall_script(root: &Path, temp_exe: &Path, log: &Path) -> Result<PathBuf> {
    let script_path = root.join(UNINSTALL_SCRIPT);

    #[cfg(windows)]
    let contents = batch_script(temp_exe, log);
    #[cfg(not(windows))]
    let contents = shell_script(temp_exe, log, std::process::id());

    fs::write(&script_path, contents)
        .with_context(|| format!("Failed to write uninstall script {}", script_path.display()))?;
    make_executable(&script_path)?;

    Ok(script_path)
}

/// Launch the uninstall script detached; the session never waits for it
pub fn launch_uninstall_script(script: &Path) -> Result<()> {
    #[cfg(windows)]
    let mut command = {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(script);
        c
    };
    #[cfg(not(windows))]
    let mut command = {
        let mut c = Command::new("/bin/sh");
        c.arg(script);
        c
    };

    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("Failed to launch uninstall script {}", script.display()))?;

    Ok(())
}

fn quote_single(s: &str) -> String {
    s.replace('\'', "'\\''")
}

fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}
