use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::error::SyncError;
use crate::tools;

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub blastdbcmd: Option<String>,
}

pub trait DumpTool: Send + Sync {
    /// Writes every record of the BLAST database at `database` as FASTA to `output`.
    fn dump_fasta(&self, database: &Path, output: &Path) -> Result<(), SyncError>;
    fn tool_info(&self) -> ToolInfo;
}

#[derive(Clone)]
pub struct SystemBlastdbcmd {
    blastdbcmd: Option<PathBuf>,
}

impl SystemBlastdbcmd {
    pub fn new() -> Self {
        Self {
            blastdbcmd: tools::find_in_path("blastdbcmd"),
        }
    }

    pub fn with_program(program: PathBuf) -> Self {
        Self {
            blastdbcmd: Some(program),
        }
    }

    fn require_blastdbcmd(&self) -> Result<&PathBuf, SyncError> {
        self.blastdbcmd
            .as_ref()
            .ok_or_else(|| SyncError::MissingTool("blastdbcmd (BLAST+)".to_string()))
    }
}

impl Default for SystemBlastdbcmd {
    fn default() -> Self {
        Self::new()
    }
}

impl DumpTool for SystemBlastdbcmd {
    fn dump_fasta(&self, database: &Path, output: &Path) -> Result<(), SyncError> {
        let program = self.require_blastdbcmd()?;
        let args = dump_args(database, output);
        info!("dumping {} to {}", database.display(), output.display());
        tools::run_cmd("blastdbcmd", program, &args)?;
        ensure_dump_output(output)
    }

    fn tool_info(&self) -> ToolInfo {
        ToolInfo {
            blastdbcmd: self
                .blastdbcmd
                .as_ref()
                .and_then(|path| tools::tool_version(path, &["-version"])),
        }
    }
}

pub fn dump_args(database: &Path, output: &Path) -> Vec<String> {
    vec![
        "-db".to_string(),
        database.to_string_lossy().to_string(),
        "-entry".to_string(),
        "all".to_string(),
        "-outfmt".to_string(),
        "%f".to_string(),
        "-out".to_string(),
        output.to_string_lossy().to_string(),
    ]
}

/// A dump that exits cleanly but leaves nothing behind is still a failure.
pub fn ensure_dump_output(output: &Path) -> Result<(), SyncError> {
    let len = fs::metadata(output).map(|meta| meta.len()).unwrap_or(0);
    if len == 0 {
        return Err(SyncError::EmptyDump(output.to_path_buf()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn dump_arguments_select_all_records_as_fasta() {
        let args = dump_args(Path::new("/db/2024-01-01/16SMicrobial"), Path::new("/db/out.fasta"));
        assert_eq!(
            args,
            vec![
                "-db",
                "/db/2024-01-01/16SMicrobial",
                "-entry",
                "all",
                "-outfmt",
                "%f",
                "-out",
                "/db/out.fasta"
            ]
        );
    }

    #[test]
    fn empty_or_missing_output_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("out.fasta");
        assert_matches!(ensure_dump_output(&path), Err(SyncError::EmptyDump(_)));
        fs::write(&path, b"").unwrap();
        assert_matches!(ensure_dump_output(&path), Err(SyncError::EmptyDump(_)));
        fs::write(&path, b">a\nACGT\n").unwrap();
        assert!(ensure_dump_output(&path).is_ok());
    }

    #[test]
    fn missing_binary_is_reported() {
        let tool = SystemBlastdbcmd { blastdbcmd: None };
        let err = tool
            .dump_fasta(Path::new("/nowhere/db"), Path::new("/nowhere/out.fasta"))
            .unwrap_err();
        assert_matches!(err, SyncError::MissingTool(_));
    }
}
