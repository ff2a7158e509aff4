//! Subprocess execution for pipeline collaborators.
//!
//! The runner executes one command and hands back what it saw. Deciding
//! whether that output is good enough belongs to the orchestrator.
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;
use thiserror::Error;

/// Pipeline stages, in execution order.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Encode,
    Preprocess,
    Solve,
    Reconstruct,
    Decode,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Encode => "encode",
            Stage::Preprocess => "preprocess",
            Stage::Solve => "solve",
            Stage::Reconstruct => "reconstruct",
            Stage::Decode => "decode",
        }
    }

    /// Banner title printed before the stage runs.
    pub fn title(self) -> &'static str {
        match self {
            Stage::Encode => "Encoding WCNF",
            Stage::Preprocess => "Preprocessing WCNF",
            Stage::Solve => "Solving MaxSAT",
            Stage::Reconstruct => "Undoing preprocessing",
            Stage::Decode => "Decoding MaxSAT model",
        }
    }

    /// Headline used when the stage fails.
    pub fn failure_reason(self) -> &'static str {
        match self {
            Stage::Encode => "Encoding failed",
            Stage::Preprocess => "Preprocessing failed",
            Stage::Solve => "MaxSAT failed",
            Stage::Reconstruct => "Failed to undo preprocessing",
            Stage::Decode => "Decoding failed",
        }
    }

    /// Whether a non-zero exit status fails the stage. Solvers signal their
    /// verdict through exit codes (10/20/30), so protocol-driven stages ignore it.
    pub fn requires_clean_exit(self) -> bool {
        matches!(self, Stage::Encode | Stage::Preprocess | Stage::Decode)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One collaborator call: program, argv and optional stdout redirection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub stage: Stage,
    pub program: String,
    pub args: Vec<String>,
    /// When set, stdout goes to this file instead of being captured.
    pub stdout_path: Option<PathBuf>,
}

impl Invocation {
    pub fn new(stage: Stage, program: impl Into<String>) -> Self {
        Self {
            stage,
            program: program.into(),
            args: Vec::new(),
            stdout_path: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.display().to_string())
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdout_to(mut self, path: &Path) -> Self {
        self.stdout_path = Some(path.to_path_buf());
        self
    }

    /// Shell-quoted rendering for transcripts and reports.
    pub fn command_line(&self) -> String {
        let mut words = Vec::with_capacity(self.args.len() + 1);
        words.push(self.program.as_str());
        words.extend(self.args.iter().map(String::as_str));
        let mut line = shell_words::join(words);
        if let Some(path) = &self.stdout_path {
            line.push_str(&format!(
                " > {}",
                shell_words::quote(&path.display().to_string())
            ));
        }
        line
    }
}

/// What a collaborator produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_ms: u128,
}

impl StageOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn exit_label(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("collaborator binary not found: {program}")]
    NotFound { program: String },
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot redirect output to {}: {source}", .path.display())]
    Redirect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Seam between the orchestrator and the outside world.
pub trait StageRunner {
    fn run(&mut self, invocation: &Invocation) -> Result<StageOutput, RunnerError>;
}

/// Runs collaborators as blocking child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner {
    echo: bool,
}

impl ProcessRunner {
    pub fn new(echo: bool) -> Self {
        Self { echo }
    }
}

impl StageRunner for ProcessRunner {
    fn run(&mut self, invocation: &Invocation) -> Result<StageOutput, RunnerError> {
        if self.echo {
            println!("{}", invocation.command_line());
        }
        let program = resolve_program(&invocation.program)?;
        tracing::debug!(
            stage = invocation.stage.name(),
            program = %program.display(),
            args = ?invocation.args,
            "spawn collaborator"
        );

        let mut command = Command::new(&program);
        command.args(&invocation.args).stdin(Stdio::null());
        if let Some(path) = &invocation.stdout_path {
            let file = File::create(path).map_err(|source| RunnerError::Redirect {
                path: path.clone(),
                source,
            })?;
            command.stdout(Stdio::from(file));
        } else {
            command.stdout(Stdio::piped());
        }
        command.stderr(Stdio::piped());

        let start = Instant::now();
        let output = command.output().map_err(|source| RunnerError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;
        let elapsed_ms = start.elapsed().as_millis();

        tracing::info!(
            stage = invocation.stage.name(),
            elapsed_ms,
            exit_code = output.status.code(),
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "collaborator finished"
        );

        Ok(StageOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            elapsed_ms,
        })
    }
}

/// Bare names go through `PATH`; anything with a separator must be a file.
fn resolve_program(program: &str) -> Result<PathBuf, RunnerError> {
    let not_found = || RunnerError::NotFound {
        program: program.to_string(),
    };
    let path = Path::new(program);
    if path.components().count() > 1 {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(not_found())
        };
    }
    which::which(program).map_err(|_| not_found())
}
