//! Failure taxonomy for a pipeline run.
//!
//! Every variant is terminal. Errors carry the stage they belong to so the
//! user-facing line can be prefixed with it.
use crate::artifacts::ArtifactKind;
use crate::protocol::SolverStatus;
use crate::runner::{RunnerError, Stage};
use std::path::PathBuf;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{label} file does not exist: {}", .path.display())]
    MissingInputFile { label: &'static str, path: PathBuf },
    #[error("{detail}")]
    StageExecution { stage: Stage, detail: String },
    #[error("cannot decode collaborator output: {detail}")]
    ProtocolDecode { stage: Stage, detail: String },
    #[error("solver reported {status}")]
    NonActionableOutcome { stage: Stage, status: SolverStatus },
    #[error("{kind} missing or empty after {stage}: {}", .path.display())]
    ArtifactMissing {
        stage: Stage,
        kind: ArtifactKind,
        path: PathBuf,
    },
    #[error("work directory unusable: {0:#}")]
    WorkDir(anyhow::Error),
}

impl PipelineError {
    pub fn runner(stage: Stage, err: RunnerError) -> Self {
        PipelineError::StageExecution {
            stage,
            detail: err.to_string(),
        }
    }

    /// Stage the failure is attributed to; `None` before any stage ran.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::MissingInputFile { .. } | PipelineError::WorkDir(_) => None,
            PipelineError::StageExecution { stage, .. }
            | PipelineError::ProtocolDecode { stage, .. }
            | PipelineError::NonActionableOutcome { stage, .. }
            | PipelineError::ArtifactMissing { stage, .. } => Some(*stage),
        }
    }

    /// Stage-level headline, e.g. "MaxSAT failed".
    pub fn reason(&self) -> &'static str {
        match self {
            PipelineError::MissingInputFile { .. } => "Missing input file",
            PipelineError::WorkDir(_) => "Cannot prepare work directory",
            _ => self
                .stage()
                .map(Stage::failure_reason)
                .unwrap_or("Pipeline failed"),
        }
    }

    /// Single line printed before exiting.
    pub fn user_message(&self) -> String {
        let label = self.stage().map(Stage::name).unwrap_or("setup");
        format!("[{label}] {}: {self}", self.reason())
    }
}
