use colored::Colorize;
use std::fs;
use std::path::Path;

use crate::update::diff::UpdatePlan;

/// Copy every planned file from the staging directory over the install root.
///
/// Entries are re-checked against staging first; a vanished or uncopyable
/// file is reported and skipped, the rest of the plan still applies. There
/// is no rollback of files already copied. Returns the number applied.
pub fn apply_plan(plan: &UpdatePlan, staging: &Path, install_root: &Path) -> usize {
    let mut applied = 0;

    for entry in &plan.entries {
        let staged = staging.join(&entry.name);
        if !staged.is_file() {
            eprintln!(
                "{} {} missing from staging, skipping",
                "⚠".yellow(),
                entry.name.display()
            );
            continue;
        }

        let local = install_root.join(&entry.name);
        match fs::copy(&staged, &local) {
            Ok(_) => {
                println!("  {} {}", "↑".yellow(), entry.name.display());
                applied += 1;
            }
            Err(e) => {
                eprintln!(
                    "{} could not update {}: {}",
                    "⚠".yellow(),
                    entry.name.display(),
                    e
                );
            }
        }
    }

    applied
}
