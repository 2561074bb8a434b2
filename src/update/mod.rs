pub mod archive;
pub mod diff;
pub mod reconcile;
pub mod version;

use anyhow::Result;
use colored::Colorize;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::cleanup;
use crate::config::Config;
use crate::relaunch;
use crate::remote::{Release, ReleaseClient};
use crate::session::{Phase, UpdateSession};
use crate::update::diff::ChangeKind;
use crate::update::version::InstalledVersion;

pub struct Options {
    pub check_only: bool,
    pub assume_yes: bool,
    pub verbosity: String,
}

/// Phase one, run by the installed binary: check the remote release against
/// the version marker, narrate what changed, and on approval hand the rest
/// of the work to a temporary copy of this executable.
pub fn run_original(install_root: PathBuf, options: &Options) -> Result<()> {
    let config = Config::load(&install_root)?;
    let client = ReleaseClient::new(&config.owner, &config.repo)?;

    println!("{}", "Checking for updates...".cyan());
    let release = client.latest_release()?;
    let installed = version::read_marker(&install_root)?;

    let baseline = match check_release(&release.tag_name, installed.as_ref())? {
        CheckOutcome::UpToDate(current) => {
            println!(
                "{} You're running the latest version ({})",
                "✓".green(),
                current.tag
            );
            return Ok(());
        }
        CheckOutcome::Update { baseline } => baseline,
    };

    announce_release(&client, baseline, &release);

    if options.check_only {
        println!("  Run `upkeep` to install");
        return Ok(());
    }

    if !options.assume_yes && !prompt_apply()? {
        println!("Update cancelled");
        return Ok(());
    }

    let session = UpdateSession::new(Phase::Original, install_root.clone());
    session.log(&format!(
        "handing off to temporary copy for update to {}",
        release.tag_name
    ));

    let temp_exe = relaunch::spawn_continuation(&install_root, &options.verbosity)?;
    println!(
        "{} Relaunching as {} to finish the update",
        "●".cyan(),
        temp_exe
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
    );

    // The copy owns everything from here and is already waiting for this
    // process to exit.
    std::process::exit(0);
}

/// Phase two, run by the temporary copy: wait out the parent, apply the
/// full update under our own identity, then leave behind a script that
/// removes this copy once we exit.
pub fn run_continuation(install_root: PathBuf, parent_pid: u32) -> Result<()> {
    let config = Config::load(&install_root)?;
    let client = ReleaseClient::new(&config.owner, &config.repo)?;

    let mut session = UpdateSession::new(Phase::Continuation { parent_pid }, install_root);
    session.log(&format!("continuation started (parent pid {})", parent_pid));

    println!("{} Waiting for original process to exit...", "●".cyan());
    relaunch::wait_for_parent_exit(parent_pid);

    let release = client.latest_release()?;
    apply_update(&mut session, &client, &release, &config.archive_name())?;

    finish_self_replacement(&session);
    session.log("update complete");

    Ok(())
}

/// Download, extract, diff, reconcile, then write the version marker.
/// Stage failures propagate; per-file trouble is handled further down.
fn apply_update(
    session: &mut UpdateSession,
    client: &ReleaseClient,
    release: &Release,
    archive_name: &str,
) -> Result<()> {
    let asset = release.asset_named(archive_name)?;

    println!("{} Downloading {}...", "●".cyan(), asset.name);
    let archive_path = session.install_root.join(&asset.name);
    client.download_asset(asset, &archive_path)?;
    session.cleanup.register(&archive_path);
    session.log(&format!("downloaded {}", asset.name));

    println!("{} Extracting...", "●".cyan());
    let staging = staging_dir(&archive_path);
    let count = archive::extract(&archive_path, &staging)?;
    session.cleanup.register(&staging);
    session.log(&format!("extracted {} files", count));

    let plan = diff::build_plan(&staging, &session.install_root)?;
    if plan.is_empty() {
        println!("{} All files already up to date", "✓".green());
    } else {
        let new = plan
            .entries
            .iter()
            .filter(|e| e.kind == ChangeKind::New)
            .count();
        println!(
            "{} Updating {} files ({} new, {} changed)",
            "●".cyan(),
            plan.len(),
            new,
            plan.len() - new
        );
        let applied = reconcile::apply_plan(&plan, &staging, &session.install_root);
        session.log(&format!("reconciled {} of {} files", applied, plan.len()));
    }

    version::write_marker(&session.install_root, &release.tag_name, &release.target_commitish)?;
    session.log(&format!(
        "version marker set to {} {}",
        release.tag_name, release.target_commitish
    ));

    println!("{} Cleaning up...", "●".cyan());
    session.cleanup.drain();

    println!(
        "{} Updated to {}",
        "✓".green(),
        release.tag_name.green()
    );
    Ok(())
}

enum CheckOutcome<'a> {
    UpToDate(&'a InstalledVersion),
    Update { baseline: Option<&'a InstalledVersion> },
}

/// Decide what to do about the latest release given the local marker.
/// The remote tag must parse on every path, fresh installs included; a
/// marker tag that does not parse only forfeits the comparison baseline.
fn check_release<'a>(
    remote_tag: &str,
    installed: Option<&'a InstalledVersion>,
) -> Result<CheckOutcome<'a>> {
    version::parse_tag(remote_tag)?;

    let Some(current) = installed else {
        return Ok(CheckOutcome::Update { baseline: None });
    };

    match version::is_newer(remote_tag, &current.tag) {
        Ok(false) => Ok(CheckOutcome::UpToDate(current)),
        Ok(true) => Ok(CheckOutcome::Update {
            baseline: Some(current),
        }),
        Err(e) => {
            // The remote tag parsed above, so the fault is the marker's
            eprintln!(
                "{} ignoring unreadable version marker ({:#}), updating anyway",
                "⚠".yellow(),
                e
            );
            Ok(CheckOutcome::Update { baseline: None })
        }
    }
}

fn announce_release(
    client: &ReleaseClient,
    installed: Option<&InstalledVersion>,
    release: &Release,
) {
    match installed {
        Some(v) => println!(
            "{} New version available: {} → {}",
            "↑".yellow(),
            v.tag.dimmed(),
            release.tag_name.green()
        ),
        None => println!(
            "{} New version available: {}",
            "↑".yellow(),
            release.tag_name.green()
        ),
    }

    if let Some(body) = &release.body {
        if !body.is_empty() {
            println!("\n{}", "Release notes:".cyan());
            println!("{}\n", body.dimmed());
        }
    }

    // The link needs a known base commit; a marker written without one
    // (or no marker at all) just means no link is shown.
    if let Some(v) = installed {
        if !v.commit.is_empty() {
            println!(
                "Full changes: {}",
                client
                    .compare_url(&v.commit, &release.target_commitish)
                    .dimmed()
            );
        }
    }
}

fn prompt_apply() -> Result<bool> {
    print!("{} Apply this update? [Y/n] ", "?".yellow());
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    let answer = input.trim().to_lowercase();

    Ok(answer.is_empty() || answer == "y" || answer == "yes")
}

/// Staging directory for an archive: its filename with the extension gone
fn staging_dir(archive_path: &Path) -> PathBuf {
    let name = archive_path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy();
    let stem = match name.strip_suffix(".tar.gz") {
        Some(s) => s.to_string(),
        None => Path::new(name.as_ref())
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string(),
    };
    archive_path.with_file_name(stem)
}

/// Write and launch the script that removes this temporary copy after exit.
/// The update itself already succeeded, so nothing here can fail the run.
fn finish_self_replacement(session: &UpdateSession) {
    if !session.is_continuation() {
        return;
    }

    let current_exe = match std::env::current_exe() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{} could not locate own executable: {}", "⚠".yellow(), e);
            return;
        }
    };

    match cleanup::write_uninstall_script(&session.install_root, &current_exe, session.log_path())
    {
        Ok(script) => match cleanup::launch_uninstall_script(&script) {
            Ok(()) => session.log("uninstall script launched"),
            Err(e) => eprintln!("{} {:#}", "⚠".yellow(), e),
        },
        Err(e) => eprintln!("{} {:#}", "⚠".yellow(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn installed(tag: &str) -> InstalledVersion {
        InstalledVersion {
            tag: tag.to_string(),
            commit: "abc1234".to_string(),
        }
    }

    #[test]
    fn test_check_release_rejects_bad_remote_tag_on_fresh_install() {
        assert!(check_release("not-a-version", None).is_err());
    }

    #[test]
    fn test_check_release_updates_fresh_install() {
        let outcome = check_release("v2.3", None).unwrap();
        assert!(matches!(outcome, CheckOutcome::Update { baseline: None }));
    }

    #[test]
    fn test_check_release_reports_up_to_date() {
        let current = installed("2.3");
        let outcome = check_release("v2.3", Some(&current)).unwrap();
        assert!(matches!(outcome, CheckOutcome::UpToDate(v) if v.tag == "2.3"));
    }

    #[test]
    fn test_check_release_prefers_newer_remote() {
        let current = installed("2.3");
        let outcome = check_release("v2.4", Some(&current)).unwrap();
        assert!(matches!(
            outcome,
            CheckOutcome::Update { baseline: Some(v) } if v.tag == "2.3"
        ));
    }

    #[test]
    fn test_check_release_tolerates_garbage_marker_tag() {
        let current = installed("garbage");
        let outcome = check_release("v2.4", Some(&current)).unwrap();
        assert!(matches!(outcome, CheckOutcome::Update { baseline: None }));
    }

    #[test]
    fn test_staging_dir_for_zip() {
        assert_eq!(
            staging_dir(Path::new("/install/upkeep-release.zip")),
            Path::new("/install/upkeep-release")
        );
    }

    #[test]
    fn test_staging_dir_for_tar_gz() {
        assert_eq!(
            staging_dir(Path::new("/install/upkeep-release.tar.gz")),
            Path::new("/install/upkeep-release")
        );
    }
}
