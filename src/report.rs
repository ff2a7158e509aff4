//! Machine-readable summary of a pipeline run.
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::pipeline::{PipelineState, PlanningInstance};
use crate::protocol::SolverStatus;
use crate::runner::Stage;

#[derive(Serialize, Debug, Clone)]
pub struct StageRecord {
    pub stage: Stage,
    pub command_line: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub elapsed_ms: u128,
}

#[derive(Serialize, Debug, Clone)]
pub struct FailureRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    pub reason: String,
    pub detail: String,
}

impl From<&PipelineError> for FailureRecord {
    fn from(err: &PipelineError) -> Self {
        Self {
            stage: err.stage(),
            reason: err.reason().to_string(),
            detail: err.to_string(),
        }
    }
}

/// Everything a post-mortem needs without rereading the transcript.
#[derive(Serialize, Debug, Clone)]
pub struct RunReport {
    pub instance: PlanningInstance,
    pub encoder: String,
    pub work_dir: PathBuf,
    pub final_state: PipelineState,
    pub stages: Vec<StageRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solver_status: Option<SolverStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<u64>,
}

impl RunReport {
    pub fn new(instance: PlanningInstance, encoder: String, work_dir: PathBuf) -> Self {
        Self {
            instance,
            encoder,
            work_dir,
            final_state: PipelineState::Start,
            stages: Vec::new(),
            failure: None,
            solver_status: None,
            cost: None,
        }
    }
}

pub fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("serialize run report")?;
    fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
