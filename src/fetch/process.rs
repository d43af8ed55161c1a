use std::{
    path::{Path, PathBuf},
    process::{Command, Output, Stdio},
};

use log::debug;
use thiserror::Error;

/// An external program is missing or broken.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("cannot run {program}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: PathBuf,
        status: String,
        stderr: String,
    },
}

/// Runs `command` to completion with stdin detached, capturing its output.
pub(crate) fn run(program: &Path, command: &mut Command) -> Result<Output, ToolError> {
    debug!("running {command:?}");
    command
        .stdin(Stdio::null())
        .output()
        .map_err(|source| ToolError::Spawn {
            program: program.to_path_buf(),
            source,
        })
}

/// Runs `program <version_arg>` and returns the first line it prints.
pub(crate) fn version(program: &Path, version_arg: &str) -> Result<String, ToolError> {
    let output = run(program, Command::new(program).arg(version_arg))?;
    if !output.status.success() {
        return Err(ToolError::Failed {
            program: program.to_path_buf(),
            status: output.status.to_string(),
            stderr: stderr_tail(&output.stderr),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string())
}

const STDERR_TAIL_LINES: usize = 3;

/// Last few non-empty lines of a tool's stderr, joined on one line.
pub(crate) fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    let tail = lines[start..].join(" | ");
    if tail.is_empty() {
        "no error output".to_string()
    } else {
        tail
    }
}
