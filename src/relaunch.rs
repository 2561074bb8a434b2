use anyhow::{Context, Result};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

const PARENT_WAIT_SECS: u64 = 60;

/// Temporary sibling path for the running executable.
/// `upkeep` becomes `upkeep.tmp`; on Windows the real extension stays last
/// so the copy remains launchable (`upkeep.exe` becomes `upkeep.tmp.exe`).
pub fn temp_copy_path(exe: &Path) -> PathBuf {
    let name = match (exe.file_stem(), exe.extension()) {
        (Some(stem), Some(ext)) => {
            format!("{}.tmp.{}", stem.to_string_lossy(), ext.to_string_lossy())
        }
        _ => format!(
            "{}.tmp",
            exe.file_name().unwrap_or_default().to_string_lossy()
        ),
    };
    exe.with_file_name(name)
}

/// Copy the running executable to its temp sibling and launch the copy in
/// continuation mode. The caller terminates this process right after; the
/// copy carries the update through on its own.
///
/// A copy or spawn failure is fatal: there is no fallback path once the
/// update has been approved.
pub fn spawn_continuation(install_root: &Path, verbosity: &str) -> Result<PathBuf> {
    let current_exe = std::env::current_exe().context("Failed to get current executable path")?;
    let temp_exe = temp_copy_path(&current_exe);

    fs::copy(&current_exe, &temp_exe).with_context(|| {
        format!(
            "Failed to copy executable to {} for self-update",
            temp_exe.display()
        )
    })?;

    Command::new(&temp_exe)
        .arg("--update-self")
        .arg(std::process::id().to_string())
        .arg(verbosity)
        .current_dir(install_root)
        .spawn()
        .with_context(|| format!("Failed to launch {}", temp_exe.display()))?;

    Ok(temp_exe)
}

/// True if a process with the given id is currently running
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(windows)]
    {
        let output = Command::new("tasklist")
            .args(["/FI", &format!("PID eq {}", pid), "/NH"])
            .stderr(Stdio::null())
            .output();
        match output {
            Ok(out) => String::from_utf8_lossy(&out.stdout).contains(&pid.to_string()),
            Err(e) => {
                tracing::debug!("could not probe pid {}: {}", pid, e);
                false
            }
        }
    }
    #[cfg(not(windows))]
    {
        let status = Command::new("kill")
            .args(["-0", &pid.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(s) => s.success(),
            Err(e) => {
                tracing::debug!("could not probe pid {}: {}", pid, e);
                false
            }
        }
    }
}

/// Poll until the parent process has exited, once a second for up to a
/// minute. The reconciler must not race a parent that still holds files
/// open; if the parent outlives the wait, proceed anyway and say so.
pub fn wait_for_parent_exit(pid: u32) {
    for _ in 0..PARENT_WAIT_SECS {
        if !is_process_alive(pid) {
            tracing::debug!("parent process {} has exited", pid);
            return;
        }
        std::thread::sleep(Duration::from_secs(1));
    }

    eprintln!(
        "{} original process (pid {}) still running after {}s, continuing anyway",
        "⚠".yellow(),
        pid,
        PARENT_WAIT_SECS
    );
}
