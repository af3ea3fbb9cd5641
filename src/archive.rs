use std::fs;
use std::io;
use std::path::Path;

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::info;

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandOutcome {
    Expanded { entries: usize },
    AlreadyExpanded,
}

/// Unpacks `archive_name` inside `snapshot_dir` when the archive is the only
/// entry there. Any other content means the snapshot was expanded before.
pub fn expand(snapshot_dir: &Path, archive_name: &str) -> Result<ExpandOutcome, SyncError> {
    let archive_path = snapshot_dir.join(archive_name);
    if !archive_path.is_file() {
        return Err(SyncError::Extraction {
            path: archive_path,
            message: "archive missing".to_string(),
        });
    }

    let names = fs::read_dir(snapshot_dir)
        .map_err(|err| SyncError::Filesystem(err.to_string()))?
        .map(|entry| entry.map(|entry| entry.file_name()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| SyncError::Filesystem(err.to_string()))?;
    if names.len() != 1 {
        info!("{} already expanded", snapshot_dir.display());
        return Ok(ExpandOutcome::AlreadyExpanded);
    }

    let entries = validate_tar_gz(&archive_path)?;
    info!("extracting {} ({entries} entries)", archive_path.display());
    extract_tar_gz(&archive_path, snapshot_dir)?;
    Ok(ExpandOutcome::Expanded { entries })
}

pub fn extract_tar_gz(archive_path: &Path, target_dir: &Path) -> Result<(), SyncError> {
    let extraction_error = |err: io::Error| SyncError::Extraction {
        path: archive_path.to_path_buf(),
        message: err.to_string(),
    };
    let file = fs::File::open(archive_path).map_err(extraction_error)?;
    let mut archive = Archive::new(GzDecoder::new(file));
    archive.unpack(target_dir).map_err(extraction_error)
}

/// Reads every entry through to the end so truncated or corrupt archives fail
/// before anything is written next to them.
pub fn validate_tar_gz(archive_path: &Path) -> Result<usize, SyncError> {
    let extraction_error = |err: io::Error| SyncError::Extraction {
        path: archive_path.to_path_buf(),
        message: err.to_string(),
    };
    let file = fs::File::open(archive_path).map_err(extraction_error)?;
    let mut archive = Archive::new(GzDecoder::new(file));
    let mut count = 0usize;
    for entry in archive.entries().map_err(extraction_error)? {
        let mut entry = entry.map_err(extraction_error)?;
        io::copy(&mut entry, &mut io::sink()).map_err(extraction_error)?;
        count += 1;
    }
    if count == 0 {
        return Err(SyncError::Extraction {
            path: archive_path.to_path_buf(),
            message: "archive has no entries".to_string(),
        });
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    fn write_archive(path: &Path, files: &[(&str, &[u8])]) {
        let file = fs::File::create(path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn expands_only_when_archive_is_alone() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("db.tar.gz");
        write_archive(&archive, &[("db.nsq", &b"ACGT"[..]), ("db.nin", &b"idx"[..])]);

        let outcome = expand(temp.path(), "db.tar.gz").unwrap();
        assert_eq!(outcome, ExpandOutcome::Expanded { entries: 2 });
        assert_eq!(fs::read(temp.path().join("db.nsq")).unwrap(), b"ACGT");

        let again = expand(temp.path(), "db.tar.gz").unwrap();
        assert_eq!(again, ExpandOutcome::AlreadyExpanded);
    }

    #[test]
    fn corrupt_archive_is_extraction_error() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("db.tar.gz"), b"definitely not gzip").unwrap();
        let err = expand(temp.path(), "db.tar.gz").unwrap_err();
        assert_matches!(err, SyncError::Extraction { .. });
    }

    #[test]
    fn missing_archive_is_extraction_error() {
        let temp = tempfile::tempdir().unwrap();
        let err = expand(temp.path(), "db.tar.gz").unwrap_err();
        assert_matches!(err, SyncError::Extraction { .. });
    }
}
