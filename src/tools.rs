use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::debug;

use crate::error::SyncError;

pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.is_file() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.is_file() {
            return Some(plain);
        }
    }
    None
}

pub fn tool_version(path: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new(path).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    stdout.lines().next().map(|line| line.to_string())
}

/// Runs `program` to completion; a non-zero exit becomes `ExternalTool` carrying stderr.
pub fn run_cmd(tool: &str, program: &Path, args: &[String]) -> Result<Output, SyncError> {
    debug!("running {} {}", program.display(), args.join(" "));
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|err| SyncError::ExternalTool {
            tool: tool.to_string(),
            message: err.to_string(),
        })?;
    if output.status.success() {
        return Ok(output);
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let message = if stderr.is_empty() {
        format!("command failed with {}", output.status)
    } else {
        stderr
    };
    Err(SyncError::ExternalTool {
        tool: tool.to_string(),
        message,
    })
}
