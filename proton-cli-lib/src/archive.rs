//! Compressed tarball extraction with path-traversal protection

use crate::error::{ProtonCliError, Result};
use flate2::read::GzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tar::Archive;
use tracing::{debug, info, warn};
use xz2::read::XzDecoder;

/// Supported archive compressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    TarXz,
}

impl ArchiveFormat {
    /// Guess the format from a file or asset name
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(ArchiveFormat::TarXz)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub extracted: usize,
    pub skipped: usize,
}

/// Whether a member name is absolute or contains `..` anywhere
pub fn is_unsafe_member(path: &Path) -> bool {
    let name = path.to_string_lossy();
    name.starts_with('/') || name.contains("..")
}

/// Extract `archive` into `dest`.
///
/// Everything is unpacked into a hidden staging directory inside `dest` first;
/// top-level entries are moved into place only once the whole archive has
/// been read. Unsafe members are skipped and never written.
pub fn extract_archive(
    archive: &Path,
    dest: &Path,
    format: ArchiveFormat,
    progress: bool,
) -> Result<ExtractSummary> {
    std::fs::create_dir_all(dest).map_err(|e| ProtonCliError::io_at(dest, e))?;
    let staging = tempfile::Builder::new()
        .prefix(".extract-")
        .tempdir_in(dest)
        .map_err(|e| ProtonCliError::io_at(dest, e))?;

    let file = File::open(archive).map_err(|e| ProtonCliError::io_at(archive, e))?;
    let len = file.metadata()?.len();

    let pb = if progress {
        let pb = ProgressBar::new(len);
        let style = ProgressStyle::default_bar()
            .template("{msg} [{bar:40.green/blue}] {percent}%")
            .map_err(|e| ProtonCliError::Archive(format!("Progress bar template error: {}", e)))?
            .progress_chars("=>-");
        pb.set_style(style);
        pb.set_message("Extracting");
        pb
    } else {
        ProgressBar::hidden()
    };

    let reader = pb.wrap_read(file);
    let summary = match format {
        ArchiveFormat::TarGz => unpack(GzDecoder::new(reader), staging.path())?,
        ArchiveFormat::TarXz => unpack(XzDecoder::new(reader), staging.path())?,
    };
    pb.finish_with_message("Extracted");

    for entry in std::fs::read_dir(staging.path())? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if target.exists() {
            return Err(ProtonCliError::AlreadyExists(target.display().to_string()));
        }
        std::fs::rename(entry.path(), &target).map_err(|e| ProtonCliError::io_at(&target, e))?;
        debug!("Moved {:?} into place", target);
    }

    info!(
        "Extracted {} entries from {:?} ({} skipped)",
        summary.extracted, archive, summary.skipped
    );
    Ok(summary)
}

fn unpack<R: Read>(reader: R, dest: &Path) -> Result<ExtractSummary> {
    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(true);

    let mut summary = ExtractSummary::default();
    let entries = archive
        .entries()
        .map_err(|e| ProtonCliError::Archive(e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| ProtonCliError::Archive(e.to_string()))?;
        let path = entry
            .path()
            .map_err(|e| ProtonCliError::Archive(e.to_string()))?
            .into_owned();

        if is_unsafe_member(&path) {
            warn!("Skipping unsafe archive member {:?}", path);
            summary.skipped += 1;
            continue;
        }

        let written = entry
            .unpack_in(dest)
            .map_err(|e| ProtonCliError::Archive(format!("{}: {}", path.display(), e)))?;
        if written {
            summary.extracted += 1;
        } else {
            summary.skipped += 1;
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tar::{Builder, EntryType, Header};
    use tempfile::TempDir;

    /// Append a file whose name is written straight into the header, bypassing
    /// the builder's own path checks.
    fn append_raw(builder: &mut Builder<impl std::io::Write>, name: &str, data: &[u8]) {
        let mut header = Header::new_old();
        let raw = &mut header.as_old_mut().name;
        raw[..name.len()].copy_from_slice(name.as_bytes());
        header.set_entry_type(EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, data).unwrap();
    }

    fn write_tar_gz(path: &Path, build: impl FnOnce(&mut Builder<GzEncoder<File>>)) {
        let file = File::create(path).unwrap();
        let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
        build(&mut builder);
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn format_is_detected_from_name() {
        assert_eq!(
            ArchiveFormat::from_name("GE-Proton9-1.tar.gz"),
            Some(ArchiveFormat::TarGz)
        );
        assert_eq!(ArchiveFormat::from_name("x.TGZ"), Some(ArchiveFormat::TarGz));
        assert_eq!(
            ArchiveFormat::from_name("SteamLinuxRuntime_sniper.tar.xz"),
            Some(ArchiveFormat::TarXz)
        );
        assert_eq!(ArchiveFormat::from_name("x.zip"), None);
    }

    #[test]
    fn unsafe_members_are_detected() {
        assert!(is_unsafe_member(Path::new("../evil")));
        assert!(is_unsafe_member(Path::new("a/../../evil")));
        assert!(is_unsafe_member(Path::new("/etc/passwd")));
        assert!(is_unsafe_member(Path::new("GE-Proton9-1/files/a..b")));
        assert!(is_unsafe_member(Path::new("GE-Proton9-1/..hidden")));
        assert!(!is_unsafe_member(Path::new("GE-Proton9-1/proton")));
        assert!(!is_unsafe_member(Path::new("./GE-Proton9-1/files")));
    }

    #[test]
    fn extracts_tree_and_skips_traversal() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("versions");
        let outside = dir.path().join("evil.txt");
        let archive = dir.path().join("release.tar.gz");

        write_tar_gz(&archive, |b| {
            append_raw(b, "GE-Proton9-1/proton", b"#!/bin/sh\n");
            append_raw(b, "GE-Proton9-1/files/version", b"9-1");
            append_raw(b, "../evil.txt", b"owned");
            append_raw(b, "/tmp/absolute-evil.txt", b"owned");
        });

        let summary = extract_archive(&archive, &dest, ArchiveFormat::TarGz, false).unwrap();
        assert_eq!(summary, ExtractSummary { extracted: 2, skipped: 2 });

        assert_eq!(
            std::fs::read(dest.join("GE-Proton9-1/proton")).unwrap(),
            b"#!/bin/sh\n"
        );
        assert_eq!(
            std::fs::read_to_string(dest.join("GE-Proton9-1/files/version")).unwrap(),
            "9-1"
        );
        assert!(!outside.exists());
        assert!(!dest.join("evil.txt").exists());
        assert!(!dest.join("tmp").exists());

        // Staging directory is gone
        let leftovers: Vec<_> = std::fs::read_dir(&dest)
            .unwrap()
            .flatten()
            .map(|e| e.file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("GE-Proton9-1")]);
    }

    #[test]
    fn names_containing_dot_dot_are_never_written() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("versions");
        let archive = dir.path().join("release.tar.gz");

        write_tar_gz(&archive, |b| {
            append_raw(b, "GE-Proton9-1/proton", b"#!/bin/sh\n");
            append_raw(b, "GE-Proton9-1/files/a..b", b"x");
        });

        let summary = extract_archive(&archive, &dest, ArchiveFormat::TarGz, false).unwrap();
        assert_eq!(summary, ExtractSummary { extracted: 1, skipped: 1 });
        assert!(dest.join("GE-Proton9-1/proton").is_file());
        assert!(!dest.join("GE-Proton9-1/files/a..b").exists());
    }

    #[test]
    fn xz_archives_are_supported() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("runtime.tar.xz");
        let file = File::create(&archive).unwrap();
        let mut builder = Builder::new(xz2::write::XzEncoder::new(file, 6));
        append_raw(&mut builder, "SteamLinuxRuntime_sniper/_v2-entry-point", b"#!/bin/sh\n");
        builder.into_inner().unwrap().finish().unwrap();

        let dest = dir.path().join("runtime");
        let summary = extract_archive(&archive, &dest, ArchiveFormat::TarXz, false).unwrap();
        assert_eq!(summary.extracted, 1);
        assert!(dest.join("SteamLinuxRuntime_sniper/_v2-entry-point").is_file());
    }

    #[test]
    fn corrupt_archive_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("broken.tar.gz");
        std::fs::write(&archive, b"definitely not gzip").unwrap();

        let dest = dir.path().join("versions");
        assert!(extract_archive(&archive, &dest, ArchiveFormat::TarGz, false).is_err());
        assert_eq!(std::fs::read_dir(&dest).unwrap().count(), 0);
    }

    #[test]
    fn existing_target_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("versions");
        std::fs::create_dir_all(dest.join("GE-Proton9-1")).unwrap();
        let archive = dir.path().join("release.tar.gz");
        write_tar_gz(&archive, |b| append_raw(b, "GE-Proton9-1/proton", b"x"));

        assert!(matches!(
            extract_archive(&archive, &dest, ArchiveFormat::TarGz, false),
            Err(ProtonCliError::AlreadyExists(_))
        ));
    }
}
