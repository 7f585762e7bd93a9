//! Packing downloaded repository trees into zip or tar archives

use crate::error::{Error, Result};
use crate::utils::partial_path;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Container used for a packed repository
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ArchiveFormat {
    Zip,
    Tar,
    TarGz,
}

impl ArchiveFormat {
    /// File extension, without the leading dot
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::TarGz => "tar.gz",
        }
    }
}

fn archive_error(path: &Path, reason: String) -> Error {
    Error::Archive {
        path: path.to_path_buf(),
        reason,
    }
}

/// Files under `dir` as (entry name, path), sorted by name
fn collect_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry =
            entry.map_err(|e| archive_error(dir, format!("failed to walk directory: {e}")))?;
        if entry.file_type().is_file() {
            files.push((entry_name(dir, entry.path())?, entry.path().to_path_buf()));
        }
    }
    Ok(files)
}

/// Pack every file under `dir` into an archive at `archive_path`
///
/// Entry names are paths relative to `dir` with `/` separators, written in
/// sorted order. The archive is assembled at `<archive>.tmp` and renamed once
/// complete. Returns the number of files packed.
pub(crate) fn pack_directory(
    dir: &Path,
    archive_path: &Path,
    format: ArchiveFormat,
) -> Result<usize> {
    debug!(?dir, ?archive_path, ?format, "packing directory");

    if let Some(parent) = archive_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let files = collect_files(dir)?;
    let tmp = partial_path(archive_path);
    let out = File::create(&tmp)?;

    match format {
        ArchiveFormat::Zip => write_zip(out, &files, archive_path)?,
        ArchiveFormat::Tar => {
            write_tar(out, &files)?;
        }
        ArchiveFormat::TarGz => {
            write_tar(GzEncoder::new(out, Compression::default()), &files)?.finish()?;
        }
    }
    std::fs::rename(&tmp, archive_path)?;

    Ok(files.len())
}

fn write_zip(out: File, files: &[(String, PathBuf)], archive_path: &Path) -> Result<()> {
    let mut writer = zip::ZipWriter::new(out);
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (name, path) in files {
        writer
            .start_file(name.as_str(), options)
            .map_err(|e| archive_error(archive_path, format!("failed to start entry: {e}")))?;
        let mut source = File::open(path)?;
        std::io::copy(&mut source, &mut writer)?;
    }
    writer
        .finish()
        .map_err(|e| archive_error(archive_path, format!("failed to finish archive: {e}")))?;
    Ok(())
}

fn write_tar<W: std::io::Write>(out: W, files: &[(String, PathBuf)]) -> Result<W> {
    let mut builder = tar::Builder::new(out);
    for (name, path) in files {
        builder.append_path_with_name(path, name)?;
    }
    Ok(builder.into_inner()?)
}

fn tar_reader(archive_path: &Path, format: ArchiveFormat) -> Result<tar::Archive<Box<dyn Read>>> {
    let file = BufReader::new(File::open(archive_path)?);
    let reader: Box<dyn Read> = match format {
        ArchiveFormat::TarGz => Box::new(GzDecoder::new(file)),
        _ => Box::new(file),
    };
    Ok(tar::Archive::new(reader))
}

/// Names of the file entries in an archive
pub(crate) fn list_entries(archive_path: &Path, format: ArchiveFormat) -> Result<BTreeSet<String>> {
    if format == ArchiveFormat::Zip {
        let zip = zip::ZipArchive::new(File::open(archive_path)?)
            .map_err(|e| archive_error(archive_path, format!("failed to open archive: {e}")))?;
        return Ok(zip
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(str::to_string)
            .collect());
    }

    let mut archive = tar_reader(archive_path, format)?;
    let mut names = BTreeSet::new();
    for entry in archive.entries()? {
        let entry = entry?;
        if entry.header().entry_type().is_file() {
            names.insert(entry_name(Path::new(""), &entry.path()?)?);
        }
    }
    Ok(names)
}

/// Extract the entries of `archive_path` that have no counterpart under `dir`
///
/// Files already on disk win over archived ones. Returns the number of
/// entries extracted.
pub(crate) fn unpack_missing(
    archive_path: &Path,
    dir: &Path,
    format: ArchiveFormat,
) -> Result<usize> {
    let mut extracted = 0;

    if format == ArchiveFormat::Zip {
        let mut zip = zip::ZipArchive::new(File::open(archive_path)?)
            .map_err(|e| archive_error(archive_path, format!("failed to open archive: {e}")))?;
        for index in 0..zip.len() {
            let mut entry = zip
                .by_index(index)
                .map_err(|e| archive_error(archive_path, format!("failed to read entry: {e}")))?;
            let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
                continue;
            };
            let target = dir.join(relative);
            if entry.is_dir() || target.exists() {
                continue;
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::io::copy(&mut entry, &mut File::create(&target)?)?;
            extracted += 1;
        }
        return Ok(extracted);
    }

    let mut archive = tar_reader(archive_path, format)?;
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() || dir.join(entry.path()?).exists() {
            continue;
        }
        if entry.unpack_in(dir)? {
            extracted += 1;
        }
    }
    Ok(extracted)
}

/// Entry names of an archive, read off the async runtime
pub(crate) async fn read_entries(
    archive_path: PathBuf,
    format: ArchiveFormat,
) -> Result<BTreeSet<String>> {
    tokio::task::spawn_blocking(move || list_entries(&archive_path, format))
        .await
        .map_err(|e| Error::Other(format!("archive task failed: {e}")))?
}

/// Pack a repository directory, then remove the directory
///
/// An existing archive at `archive_path` is merged in first, so files packed
/// by earlier requests are kept.
pub(crate) async fn pack_repository(
    repo_dir: PathBuf,
    archive_path: PathBuf,
    format: ArchiveFormat,
) -> Result<usize> {
    let packed = {
        let repo_dir = repo_dir.clone();
        let archive_path = archive_path.clone();
        tokio::task::spawn_blocking(move || {
            if archive_path.exists() {
                let merged = unpack_missing(&archive_path, &repo_dir, format)?;
                debug!(archive = %archive_path.display(), merged, "merged existing archive");
            }
            pack_directory(&repo_dir, &archive_path, format)
        })
        .await
        .map_err(|e| Error::Other(format!("archive task failed: {e}")))??
    };
    tokio::fs::remove_dir_all(&repo_dir).await?;

    info!(
        archive = %archive_path.display(),
        files = packed,
        "packed repository"
    );
    Ok(packed)
}

fn entry_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| archive_error(path, format!("entry outside of {}", root.display())))?;
    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FORMATS: [ArchiveFormat; 3] =
        [ArchiveFormat::Zip, ArchiveFormat::Tar, ArchiveFormat::TarGz];

    fn sample_repo(root: &Path) -> PathBuf {
        let repo = root.join("repo");
        std::fs::create_dir_all(repo.join("models/props")).unwrap();
        std::fs::write(repo.join("README.md"), "readme").unwrap();
        std::fs::write(repo.join("models/props/chair.obj"), "v 0 0 0").unwrap();
        repo
    }

    fn read_entry(archive: &Path, format: ArchiveFormat, name: &str) -> String {
        let scratch = TempDir::new().unwrap();
        unpack_missing(archive, scratch.path(), format).unwrap();
        std::fs::read_to_string(scratch.path().join(name)).unwrap()
    }

    #[test]
    fn packs_nested_files_with_relative_names() {
        for format in FORMATS {
            let temp_dir = TempDir::new().unwrap();
            let repo = sample_repo(temp_dir.path());

            let archive = temp_dir.path().join(format!("repo.{}", format.extension()));
            let packed = pack_directory(&repo, &archive, format).unwrap();

            assert_eq!(packed, 2, "{format:?}");
            assert_eq!(
                list_entries(&archive, format).unwrap(),
                BTreeSet::from(["README.md".to_string(), "models/props/chair.obj".to_string()]),
                "{format:?}"
            );
            assert_eq!(read_entry(&archive, format, "models/props/chair.obj"), "v 0 0 0");
            assert!(!partial_path(&archive).exists());
        }
    }

    #[test]
    fn tar_gz_is_gzip_compressed() {
        let temp_dir = TempDir::new().unwrap();
        let repo = sample_repo(temp_dir.path());
        let archive = temp_dir.path().join("repo.tar.gz");
        pack_directory(&repo, &archive, ArchiveFormat::TarGz).unwrap();

        let bytes = std::fs::read(&archive).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn unpack_keeps_files_already_on_disk() {
        for format in FORMATS {
            let temp_dir = TempDir::new().unwrap();
            let repo = sample_repo(temp_dir.path());
            let archive = temp_dir.path().join(format!("repo.{}", format.extension()));
            pack_directory(&repo, &archive, format).unwrap();

            let target = temp_dir.path().join("target");
            std::fs::create_dir_all(&target).unwrap();
            std::fs::write(target.join("README.md"), "newer").unwrap();

            assert_eq!(unpack_missing(&archive, &target, format).unwrap(), 1, "{format:?}");
            assert_eq!(std::fs::read_to_string(target.join("README.md")).unwrap(), "newer");
            assert_eq!(
                std::fs::read_to_string(target.join("models/props/chair.obj")).unwrap(),
                "v 0 0 0"
            );
        }
    }

    #[tokio::test]
    async fn pack_repository_merges_previous_archive_and_removes_tree() {
        for format in FORMATS {
            let temp_dir = TempDir::new().unwrap();
            let repo = temp_dir.path().join("org/repo");
            let archive = temp_dir.path().join(format!("org/repo.{}", format.extension()));

            std::fs::create_dir_all(&repo).unwrap();
            std::fs::write(repo.join("cube.stl"), "solid cube").unwrap();
            assert_eq!(pack_repository(repo.clone(), archive.clone(), format).await.unwrap(), 1);
            assert!(!repo.exists());

            std::fs::create_dir_all(&repo).unwrap();
            std::fs::write(repo.join("chair.obj"), "v 0 0 0").unwrap();
            assert_eq!(pack_repository(repo.clone(), archive.clone(), format).await.unwrap(), 2);

            assert_eq!(
                read_entries(archive.clone(), format).await.unwrap(),
                BTreeSet::from(["chair.obj".to_string(), "cube.stl".to_string()]),
                "{format:?}"
            );
            assert_eq!(read_entry(&archive, format, "cube.stl"), "solid cube");
        }
    }
}
