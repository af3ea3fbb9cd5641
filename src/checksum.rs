use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::domain::{ChecksumBackend, ChecksumRecord};
use crate::error::SyncError;
use crate::ncbi::NcbiClient;
use crate::tools;

pub trait LocalChecksum: Send + Sync {
    fn checksum(&self, path: &Path) -> Result<ChecksumRecord, SyncError>;
}

/// Streaming MD5 computed in-process.
#[derive(Debug, Clone, Copy, Default)]
pub struct Md5Hasher;

impl LocalChecksum for Md5Hasher {
    fn checksum(&self, path: &Path) -> Result<ChecksumRecord, SyncError> {
        let read_error = |err: std::io::Error| SyncError::ChecksumRead {
            path: path.to_path_buf(),
            message: err.to_string(),
        };
        let file = File::open(path).map_err(read_error)?;
        let mut reader = BufReader::new(file);
        let mut context = md5::Context::new();
        let mut buffer = [0u8; 64 * 1024];
        loop {
            let read = reader.read(&mut buffer).map_err(read_error)?;
            if read == 0 {
                break;
            }
            context.consume(&buffer[..read]);
        }
        ChecksumRecord::parse(&format!("{:x}", context.compute()))
    }
}

/// The system `md5sum` binary; its first output token is the digest.
#[derive(Debug, Clone)]
pub struct Md5sumTool {
    program: Option<PathBuf>,
}

impl Md5sumTool {
    pub fn new() -> Self {
        Self {
            program: tools::find_in_path("md5sum"),
        }
    }

    pub fn with_program(program: PathBuf) -> Self {
        Self {
            program: Some(program),
        }
    }
}

impl Default for Md5sumTool {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalChecksum for Md5sumTool {
    fn checksum(&self, path: &Path) -> Result<ChecksumRecord, SyncError> {
        let program = self
            .program
            .as_ref()
            .ok_or_else(|| SyncError::MissingTool("md5sum".to_string()))?;
        if !path.is_file() {
            return Err(SyncError::ChecksumRead {
                path: path.to_path_buf(),
                message: "file not found".to_string(),
            });
        }
        let output = tools::run_cmd(
            "md5sum",
            program,
            &[path.to_string_lossy().to_string()],
        )?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout.lines().last().unwrap_or_default();
        ChecksumRecord::parse(line)
    }
}

#[derive(Debug, Clone)]
pub enum LocalDigest {
    Builtin(Md5Hasher),
    Md5sum(Md5sumTool),
}

impl LocalDigest {
    pub fn for_backend(backend: ChecksumBackend) -> Self {
        match backend {
            ChecksumBackend::Builtin => LocalDigest::Builtin(Md5Hasher),
            ChecksumBackend::Md5sum => LocalDigest::Md5sum(Md5sumTool::new()),
        }
    }
}

impl LocalChecksum for LocalDigest {
    fn checksum(&self, path: &Path) -> Result<ChecksumRecord, SyncError> {
        match self {
            LocalDigest::Builtin(hasher) => hasher.checksum(path),
            LocalDigest::Md5sum(tool) => tool.checksum(path),
        }
    }
}

/// Compares local files against one upstream checksum. The remote value is
/// fetched once when the checker is built and reused for every comparison in
/// the run, so retries all verify against the same target.
#[derive(Debug, Clone)]
pub struct IntegrityChecker<H: LocalChecksum> {
    remote: ChecksumRecord,
    local: H,
}

impl<H: LocalChecksum> IntegrityChecker<H> {
    pub fn new(remote: ChecksumRecord, local: H) -> Self {
        Self { remote, local }
    }

    pub fn fetch<N: NcbiClient + ?Sized>(client: &N, local: H) -> Result<Self, SyncError> {
        let remote = client.fetch_checksum()?;
        info!("upstream md5 is {remote}");
        Ok(Self::new(remote, local))
    }

    pub fn remote(&self) -> &ChecksumRecord {
        &self.remote
    }

    pub fn compute_local(&self, path: &Path) -> Result<ChecksumRecord, SyncError> {
        self.local.checksum(path)
    }

    pub fn is_current(&self, path: &Path) -> Result<bool, SyncError> {
        let local = self.compute_local(path)?;
        let current = local == self.remote;
        if !current {
            warn!(
                "md5 mismatch for {}: local {local}, upstream {}",
                path.display(),
                self.remote
            );
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn builtin_md5_matches_known_digest() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("alphabet.txt");
        fs::write(&path, b"abcdefghijklmnopqrstuvwxyz").unwrap();
        let digest = Md5Hasher.checksum(&path).unwrap();
        assert_eq!(digest.as_str(), "c3fcd3d76192e4007dfb496cca67e13b");
    }

    #[test]
    fn builtin_md5_missing_file_is_read_error() {
        let temp = tempfile::tempdir().unwrap();
        let err = Md5Hasher.checksum(&temp.path().join("absent")).unwrap_err();
        assert_matches!(err, SyncError::ChecksumRead { .. });
    }

    #[test]
    fn missing_md5sum_binary_is_reported() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("file");
        fs::write(&path, b"x").unwrap();
        let tool = Md5sumTool { program: None };
        assert_matches!(tool.checksum(&path), Err(SyncError::MissingTool(_)));
    }

    #[test]
    fn md5sum_backend_agrees_with_builtin() {
        let Some(program) = tools::find_in_path("md5sum") else {
            return;
        };
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("archive name.tar.gz");
        fs::write(&path, vec![7u8; 200_000]).unwrap();

        let external = Md5sumTool::with_program(program).checksum(&path).unwrap();
        assert_eq!(external, Md5Hasher.checksum(&path).unwrap());
        assert_eq!(external.as_str().len(), 32);
    }

    #[test]
    fn is_current_compares_first_token_only() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("empty");
        fs::write(&path, b"").unwrap();

        let remote = ChecksumRecord::parse("d41d8cd98f00b204e9800998ecf8427e  16SMicrobial.tar.gz\n")
            .unwrap();
        let checker = IntegrityChecker::new(remote, Md5Hasher);
        assert!(checker.is_current(&path).unwrap());

        let stale = ChecksumRecord::parse("00000000000000000000000000000000 16SMicrobial.tar.gz")
            .unwrap();
        let checker = IntegrityChecker::new(stale, Md5Hasher);
        assert!(!checker.is_current(&path).unwrap());
    }
}
