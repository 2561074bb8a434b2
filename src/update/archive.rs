use anyhow::{anyhow, bail, Context, Result};
use std::fs::{self, File};
use std::path::{Component, Path};

/// Extract a release archive into the staging directory.
/// The staging directory is only created once the archive opens, so a
/// failed extraction leaves nothing behind. Returns the number of files
/// written.
pub fn extract(archive_path: &Path, staging: &Path) -> Result<usize> {
    let extension = archive_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    if archive_path.to_string_lossy().ends_with(".tar.gz") {
        extract_tar_gz(archive_path, staging)
    } else if extension == "zip" {
        extract_zip(archive_path, staging)
    } else {
        Err(anyhow!(
            "Unknown archive format: {}",
            archive_path.display()
        ))
    }
}

fn extract_zip(archive_path: &Path, staging: &Path) -> Result<usize> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open {}", archive_path.display()))?;
    let mut archive = zip::ZipArchive::new(file).context("Failed to read zip archive")?;
    fs::create_dir_all(staging)
        .with_context(|| format!("Failed to create {}", staging.display()))?;

    let mut count = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            bail!("Archive entry escapes staging directory: {}", entry.name());
        };
        let dest = staging.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&dest)?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out = File::create(&dest)
            .with_context(|| format!("Failed to create {}", dest.display()))?;
        std::io::copy(&mut entry, &mut out)
            .with_context(|| format!("Failed to extract {}", relative.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&dest, fs::Permissions::from_mode(mode))?;
            }
        }

        tracing::debug!("extracted {}", relative.display());
        count += 1;
    }

    Ok(count)
}

fn extract_tar_gz(archive_path: &Path, staging: &Path) -> Result<usize> {
    use flate2::read::GzDecoder;
    use std::io::BufReader;

    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open {}", archive_path.display()))?;
    let decoder = GzDecoder::new(BufReader::new(file));
    let mut archive = tar::Archive::new(decoder);
    fs::create_dir_all(staging)
        .with_context(|| format!("Failed to create {}", staging.display()))?;

    let mut count = 0;
    for entry in archive.entries().context("Failed to read tar.gz archive")? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        ensure_confined(&path)?;

        // unpack_in re-resolves the destination against the real staging
        // directory, so an earlier symlink entry cannot relay this write
        // outside of it.
        let is_file = entry.header().entry_type().is_file();
        let unpacked = entry
            .unpack_in(staging)
            .with_context(|| format!("Failed to extract {}", path.display()))?;

        tracing::debug!("extracted {}", path.display());
        if unpacked && is_file {
            count += 1;
        }
    }

    Ok(count)
}

fn ensure_confined(path: &Path) -> Result<()> {
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
    if escapes {
        bail!("Archive entry escapes staging directory: {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    fn write_tar_gz(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_extract_zip_into_staging() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("release.zip");
        write_zip(
            &archive,
            &[
                ("bin/app", b"#!new binary"),
                ("config/settings.toml", b"answer = 42"),
            ],
        );

        let staging = dir.path().join("staging");
        let count = extract(&archive, &staging).unwrap();

        assert_eq!(count, 2);
        assert_eq!(
            std::fs::read(staging.join("bin/app")).unwrap(),
            b"#!new binary"
        );
        assert!(staging.join("config/settings.toml").exists());
    }

    #[test]
    fn test_extract_tar_gz_into_staging() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("release.tar.gz");
        write_tar_gz(&archive, &[("notes/readme.txt", b"hello")]);

        let staging = dir.path().join("staging");
        let count = extract(&archive, &staging).unwrap();

        assert_eq!(count, 1);
        assert_eq!(
            std::fs::read_to_string(staging.join("notes/readme.txt")).unwrap(),
            "hello"
        );
    }

    #[test]
    fn test_zip_traversal_entry_aborts() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("evil.zip");
        write_zip(&archive, &[("../evil.txt", b"boom")]);

        let staging = dir.path().join("staging");
        let err = extract(&archive, &staging).unwrap_err();

        assert!(err.to_string().contains("escapes staging directory"));
        assert!(!dir.path().join("evil.txt").exists());
    }

    #[test]
    fn test_tar_traversal_entry_aborts() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("evil.tar.gz");

        // tar::Builder refuses to write `..` paths itself, so forge the
        // header name directly to get a hostile archive on disk.
        let data = b"boom";
        let file = File::create(&archive).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        let name = b"../evil.txt";
        header.as_gnu_mut().unwrap().name[..name.len()].copy_from_slice(name);
        header.set_cksum();
        builder.append(&header, &data[..]).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let staging = dir.path().join("staging");
        let err = extract(&archive, &staging).unwrap_err();

        assert!(err.to_string().contains("escapes staging directory"));
        assert!(!dir.path().join("evil.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_tar_symlink_cannot_relay_writes_outside_staging() {
        let dir = TempDir::new().unwrap();
        let outside = dir.path().join("outside");
        fs::create_dir(&outside).unwrap();

        // A symlink pointing out of staging, then a file whose path runs
        // through it. The file write must be refused.
        let archive = dir.path().join("evil.tar.gz");
        let file = File::create(&archive).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);

        let mut link = tar::Header::new_gnu();
        link.set_entry_type(tar::EntryType::Symlink);
        link.set_size(0);
        link.set_mode(0o777);
        link.set_link_name("../outside").unwrap();
        builder
            .append_data(&mut link, "link", std::io::empty())
            .unwrap();

        let data = b"payload";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, "link/pwned.txt", &data[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let staging = dir.path().join("staging");
        let err = extract(&archive, &staging).unwrap_err();

        assert!(err.to_string().contains("Failed to extract link"));
        assert!(!outside.join("pwned.txt").exists());
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("release.rar");
        std::fs::write(&archive, b"not really").unwrap();

        let err = extract(&archive, &dir.path().join("staging")).unwrap_err();
        assert!(err.to_string().contains("Unknown archive format"));
        assert!(!dir.path().join("staging").exists());
    }

    #[test]
    fn test_missing_archive_leaves_no_staging() {
        let dir = TempDir::new().unwrap();
        let staging = dir.path().join("staging");

        let err = extract(&dir.path().join("absent.zip"), &staging).unwrap_err();

        assert!(err.to_string().contains("Failed to open"));
        assert!(!staging.exists());
    }
}
