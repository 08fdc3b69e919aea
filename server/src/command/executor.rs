//! Command executor - runs the PulseBlaster command-line utility

use super::error::ProcessError;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, info};

/// File names of the SpinCore command-line interpreter
pub const TOOL_NAMES: [&str; 2] = ["spbicl.exe", "spbicl"];

/// File name of the scratch program handed to the tool on `load`
pub const SCRATCH_FILE: &str = "temp.pb";

/// A hardware action to perform
#[derive(Debug, Clone, PartialEq)]
pub enum HardwareCommand {
    Start,
    Stop,
    /// Program text and the clock argument, already validated as numeric
    Load { code: String, clock: String },
}

impl HardwareCommand {
    pub fn verb(&self) -> &'static str {
        match self {
            HardwareCommand::Start => "start",
            HardwareCommand::Stop => "stop",
            HardwareCommand::Load { .. } => "load",
        }
    }
}

impl fmt::Display for HardwareCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HardwareCommand::Load { code, clock } => {
                write!(f, "load ({} characters, clk {})", code.len(), clock)
            }
            other => f.write_str(other.verb()),
        }
    }
}

/// Something that can drive the pulse generator.
///
/// Each call runs to completion before returning; there is no cancellation.
#[async_trait]
pub trait HardwareExecutor: Send + Sync {
    /// Run one command and return its text output
    async fn run(&self, command: HardwareCommand) -> Result<String, ProcessError>;
}

/// Executes commands through the external `spbicl` utility
#[derive(Debug, Clone)]
pub struct ToolExecutor {
    program: PathBuf,
    scratch_file: PathBuf,
}

impl ToolExecutor {
    /// Create an executor for `program`, using `scratch_file` for `load`
    pub fn new(program: impl Into<PathBuf>, scratch_file: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            scratch_file: scratch_file.into(),
        }
    }

    async fn invoke(&self, args: &[&str]) -> Result<String, ProcessError> {
        debug!("Running {} {:?}", self.program.display(), args);

        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|source| ProcessError::Launch {
                program: self.program.display().to_string(),
                source,
            })?;

        if output.status.success() {
            Ok(strip_trailing_newline(&String::from_utf8_lossy(&output.stdout)).to_string())
        } else {
            Err(failure(&self.program, &output))
        }
    }
}

#[async_trait]
impl HardwareExecutor for ToolExecutor {
    async fn run(&self, command: HardwareCommand) -> Result<String, ProcessError> {
        match &command {
            HardwareCommand::Start | HardwareCommand::Stop => {
                self.invoke(&[command.verb()]).await
            }
            HardwareCommand::Load { code, clock } => {
                // Overwrites the program of any previous load
                tokio::fs::write(&self.scratch_file, code)
                    .await
                    .map_err(|source| ProcessError::ScratchFile {
                        path: self.scratch_file.display().to_string(),
                        source,
                    })?;

                let path = self.scratch_file.to_string_lossy();
                self.invoke(&["load", path.as_ref(), clock.as_str()]).await
            }
        }
    }
}

fn strip_trailing_newline(text: &str) -> &str {
    let text = text.strip_suffix('\n').unwrap_or(text);
    text.strip_suffix('\r').unwrap_or(text)
}

fn failure(program: &Path, output: &Output) -> ProcessError {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let mut text = [stdout.trim(), stderr.trim()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if text.is_empty() {
        text = format!("{} exited with {}", program.display(), output.status);
    }

    ProcessError::Failed {
        code: output.status.code(),
        output: text,
    }
}

/// Search `root` recursively for the SpinCore utility.
///
/// Symlinked directories are not descended into.
pub fn locate_tool(root: &Path) -> Option<PathBuf> {
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };

        let mut subdirs = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                subdirs.push(path);
            } else if file_type.is_symlink() && path.is_dir() {
                debug!("Skipping linked directory {}", path.display());
            } else if entry
                .file_name()
                .to_str()
                .is_some_and(|name| TOOL_NAMES.iter().any(|t| t.eq_ignore_ascii_case(name)))
            {
                info!("Found hardware tool at {}", path.display());
                return Some(path);
            }
        }

        // Visit in name order so discovery is deterministic
        subdirs.sort();
        pending.extend(subdirs.into_iter().rev());
    }

    None
}
