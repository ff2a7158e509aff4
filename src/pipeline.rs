//! Five-stage optimisation pipeline.
//!
//! `START → ENCODED → PREPROCESSED → SOLVED → RECONSTRUCTED → DECODED`, with
//! `FAILED` reachable from every non-terminal state. Each transition builds a
//! collaborator invocation from artifact paths, runs it through a
//! [`StageRunner`] and checks its guard before the next stage may start.
//! Nothing is rolled back on failure; completed artifacts stay on disk.
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use crate::artifacts::{file_is_present, ArtifactKind, ArtifactStore};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::protocol::{
    declared_variable_count, parse_model_output, parse_solver_output, SolverOutcome,
};
use crate::report::{FailureRecord, RunReport, StageRecord};
use crate::runner::{Invocation, Stage, StageOutput, StageRunner};

const SEP: &str = "************************************************";

/// Status written in front of the solver model handed to the reconstructor.
/// The reconstructor only needs a model, so SATISFIABLE is reported as OPTIMUM too.
const RECONSTRUCT_STATUS_LINE: &str = "s OPTIMUM";

/// Domain, problem and plan files supplied by the caller.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PlanningInstance {
    pub domain: PathBuf,
    pub problem: PathBuf,
    pub plan: PathBuf,
}

impl PlanningInstance {
    pub fn new(domain: PathBuf, problem: PathBuf, plan: PathBuf) -> Self {
        Self {
            domain,
            problem,
            plan,
        }
    }

    /// All three files must exist before any collaborator runs.
    pub fn validate(&self) -> PipelineResult<()> {
        let inputs = [
            ("Domain", &self.domain),
            ("Problem", &self.problem),
            ("Plan", &self.plan),
        ];
        for (label, path) in inputs {
            if !path.is_file() {
                return Err(PipelineError::MissingInputFile {
                    label,
                    path: path.clone(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Start,
    Encoded,
    Preprocessed,
    Solved,
    Reconstructed,
    Decoded,
    Failed,
}

impl PipelineState {
    /// Stage that advances out of this state; `None` for terminal states.
    pub fn next_stage(self) -> Option<Stage> {
        match self {
            PipelineState::Start => Some(Stage::Encode),
            PipelineState::Encoded => Some(Stage::Preprocess),
            PipelineState::Preprocessed => Some(Stage::Solve),
            PipelineState::Solved => Some(Stage::Reconstruct),
            PipelineState::Reconstructed => Some(Stage::Decode),
            PipelineState::Decoded | PipelineState::Failed => None,
        }
    }
}

/// Per-run switches that are not collaborator configuration.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Encoding scheme identifier passed through to the encoder.
    pub encoder: String,
    /// Forwarded to the encoder/decoder as `--verbose`.
    pub verbose: bool,
    /// Print banners, command lines and collaborator output as the run goes.
    pub echo: bool,
}

pub struct Pipeline<R> {
    config: PipelineConfig,
    store: ArtifactStore,
    instance: PlanningInstance,
    options: RunOptions,
    runner: R,
    state: PipelineState,
    report: RunReport,
}

impl<R: StageRunner> Pipeline<R> {
    pub fn new(
        config: PipelineConfig,
        store: ArtifactStore,
        instance: PlanningInstance,
        options: RunOptions,
        runner: R,
    ) -> Self {
        let report = RunReport::new(
            instance.clone(),
            options.encoder.clone(),
            store.root().to_path_buf(),
        );
        Self {
            config,
            store,
            instance,
            options,
            runner,
            state: PipelineState::Start,
            report,
        }
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    /// Drive the state machine to a terminal state.
    ///
    /// Returns the optimized plan path on success. On failure the state is
    /// `Failed` and the report records the stage and reason.
    pub fn run(&mut self) -> PipelineResult<PathBuf> {
        match self.drive() {
            Ok(()) => Ok(self.store.path(ArtifactKind::OptimizedPlan)),
            Err(err) => {
                tracing::warn!(
                    stage = err.stage().map(Stage::name),
                    reason = err.reason(),
                    detail = %err,
                    "pipeline failed"
                );
                self.state = PipelineState::Failed;
                self.report.final_state = PipelineState::Failed;
                self.report.failure = Some(FailureRecord::from(&err));
                Err(err)
            }
        }
    }

    fn drive(&mut self) -> PipelineResult<()> {
        self.instance.validate()?;
        let created = self.store.prepare().map_err(PipelineError::WorkDir)?;
        if created && self.options.echo {
            println!("Making directory: {}", self.store.root().display());
        }

        while let Some(stage) = self.state.next_stage() {
            let next = self.step(stage)?;
            tracing::debug!(stage = stage.name(), state = ?next, "transition");
            self.state = next;
            self.report.final_state = next;
        }
        Ok(())
    }

    /// One transition out of the current state.
    pub fn step(&mut self, stage: Stage) -> PipelineResult<PipelineState> {
        match stage {
            Stage::Encode => self.encode(),
            Stage::Preprocess => self.preprocess(),
            Stage::Solve => self.solve(),
            Stage::Reconstruct => self.reconstruct(),
            Stage::Decode => self.decode(),
        }
    }

    fn encode(&mut self) -> PipelineResult<PipelineState> {
        let wcnf = self.store.path(ArtifactKind::EncodedFormula);
        let invocation = self
            .encoder_invocation(Stage::Encode)?
            .arg("--enc")
            .arg(self.options.encoder.clone())
            .arg("--wcnf")
            .path_arg(&wcnf)
            .arg("--action")
            .arg("ENCODE");
        let invocation = self.with_verbose(invocation);
        let output = self.execute(invocation)?;
        self.expect_artifact(Stage::Encode, ArtifactKind::EncodedFormula, &output)?;
        Ok(PipelineState::Encoded)
    }

    fn preprocess(&mut self) -> PipelineResult<PipelineState> {
        self.require_inputs(Stage::Preprocess, &[ArtifactKind::EncodedFormula])?;
        let wcnf = self.store.path(ArtifactKind::EncodedFormula);
        let preprocessed = self.store.path(ArtifactKind::PreprocessedFormula);
        let invocation = Invocation::new(
            Stage::Preprocess,
            self.config.preprocessor.program.clone(),
        )
        .path_arg(&wcnf)
        .arg("preprocess")
        .arg(self.mapfile_arg())
        .stdout_to(&preprocessed);
        let output = self.execute(invocation)?;
        self.expect_artifact(Stage::Preprocess, ArtifactKind::PreprocessedFormula, &output)?;
        Ok(PipelineState::Preprocessed)
    }

    fn solve(&mut self) -> PipelineResult<PipelineState> {
        self.require_inputs(Stage::Solve, &[ArtifactKind::PreprocessedFormula])?;
        let preprocessed = self.store.path(ArtifactKind::PreprocessedFormula);
        let invocation = Invocation::new(Stage::Solve, self.config.solver.program.clone())
            .arg(self.config.solver.model_flag.clone())
            .path_arg(&preprocessed);
        let output = self.execute(invocation)?;

        let variables = self.declared_variables(ArtifactKind::PreprocessedFormula);
        let outcome = parse_solver_output(&output.stdout, variables);
        let status = outcome.status();
        self.report.solver_status = Some(status);
        self.report.cost = outcome.model().and_then(|model| model.cost);
        if self.options.echo {
            println!("{status}");
        }

        match outcome {
            SolverOutcome::Satisfiable(model) | SolverOutcome::Optimal(model) => {
                tracing::info!(
                    %status,
                    variables = model.assignment.literals().len(),
                    cost = model.cost,
                    "solver produced a model"
                );
                let text = format!("{RECONSTRUCT_STATUS_LINE}\n{}\n", model.line());
                let path = self
                    .store
                    .write(ArtifactKind::PreprocessedModel, &text)
                    .map_err(|err| PipelineError::StageExecution {
                        stage: Stage::Solve,
                        detail: format!("{err:#}"),
                    })?;
                if self.options.echo {
                    println!("Model written to {}", path.display());
                }
                Ok(PipelineState::Solved)
            }
            SolverOutcome::ProtocolError(detail) => {
                tracing::warn!(%detail, "solver output could not be decoded");
                Err(self.failed(
                    &output,
                    PipelineError::ProtocolDecode {
                        stage: Stage::Solve,
                        detail,
                    },
                ))
            }
            other => {
                tracing::warn!(status = %other.status(), "solver returned no usable model");
                Err(self.failed(
                    &output,
                    PipelineError::NonActionableOutcome {
                        stage: Stage::Solve,
                        status: other.status(),
                    },
                ))
            }
        }
    }

    fn reconstruct(&mut self) -> PipelineResult<PipelineState> {
        self.require_inputs(
            Stage::Reconstruct,
            &[ArtifactKind::PreprocessedModel, ArtifactKind::VariableMap],
        )?;
        let model_path = self.store.path(ArtifactKind::PreprocessedModel);
        let invocation = Invocation::new(
            Stage::Reconstruct,
            self.config.preprocessor.program.clone(),
        )
        .path_arg(&model_path)
        .arg("reconstruct")
        .arg(self.mapfile_arg());
        let output = self.execute(invocation)?;

        let variables = self.declared_variables(ArtifactKind::EncodedFormula);
        let model = match parse_model_output(&output.stdout, variables) {
            Ok(model) => model,
            Err(detail) => {
                return Err(self.failed(
                    &output,
                    PipelineError::ProtocolDecode {
                        stage: Stage::Reconstruct,
                        detail,
                    },
                ))
            }
        };
        tracing::info!(variables = model.assignment.literals().len(), "model reconstructed");
        let path = self
            .store
            .write(ArtifactKind::ReconstructedModel, &format!("{}\n", model.line()))
            .map_err(|err| PipelineError::StageExecution {
                stage: Stage::Reconstruct,
                detail: format!("{err:#}"),
            })?;
        if self.options.echo {
            println!("Model written to {}", path.display());
        }
        Ok(PipelineState::Reconstructed)
    }

    fn decode(&mut self) -> PipelineResult<PipelineState> {
        self.require_inputs(
            Stage::Decode,
            &[ArtifactKind::EncodedFormula, ArtifactKind::ReconstructedModel],
        )?;
        let model = self.store.path(ArtifactKind::ReconstructedModel);
        let wcnf = self.store.path(ArtifactKind::EncodedFormula);
        let pop = self.store.path(ArtifactKind::OptimizedPlan);
        let invocation = self
            .encoder_invocation(Stage::Decode)?
            .arg("--action")
            .arg("DECODE")
            .arg("--model")
            .path_arg(&model)
            .arg("--wcnf")
            .path_arg(&wcnf)
            .arg("--pop")
            .path_arg(&pop);
        let invocation = self.with_verbose(invocation);
        let output = self.execute(invocation)?;
        self.expect_artifact(Stage::Decode, ArtifactKind::OptimizedPlan, &output)?;
        Ok(PipelineState::Decoded)
    }

    /// JVM launch prefix plus the planning instance, shared by ENCODE and DECODE.
    fn encoder_invocation(&self, stage: Stage) -> PipelineResult<Invocation> {
        let launch = self
            .config
            .encoder
            .launch_args()
            .map_err(|err| PipelineError::StageExecution {
                stage,
                detail: format!("{err:#}"),
            })?;
        Ok(Invocation::new(stage, self.config.encoder.program.clone())
            .args(launch)
            .arg("--domain")
            .path_arg(&self.instance.domain)
            .arg("--problem")
            .path_arg(&self.instance.problem)
            .arg("--plan")
            .path_arg(&self.instance.plan))
    }

    /// Variable count from a formula artifact's header, if it declares one.
    fn declared_variables(&self, kind: ArtifactKind) -> Option<usize> {
        let file = File::open(self.store.path(kind)).ok()?;
        declared_variable_count(BufReader::new(file).lines().map_while(Result::ok))
    }

    fn with_verbose(&self, invocation: Invocation) -> Invocation {
        if self.options.verbose {
            invocation.arg("--verbose")
        } else {
            invocation
        }
    }

    /// The single map path used by both preprocessing and reconstruction.
    fn mapfile_arg(&self) -> String {
        format!(
            "-mapfile={}",
            self.store.path(ArtifactKind::VariableMap).display()
        )
    }

    fn execute(&mut self, invocation: Invocation) -> PipelineResult<StageOutput> {
        let stage = invocation.stage;
        if self.options.echo {
            print_header(stage.title());
        }
        tracing::info!(stage = stage.name(), "stage start");
        let output = self
            .runner
            .run(&invocation)
            .map_err(|err| PipelineError::runner(stage, err))?;
        self.report.stages.push(StageRecord {
            stage,
            command_line: invocation.command_line(),
            exit_code: output.exit_code,
            elapsed_ms: output.elapsed_ms,
        });
        if self.options.echo {
            print_output(&output);
        }

        if stage.requires_clean_exit() && !output.success() {
            return Err(self.failed(
                &output,
                PipelineError::StageExecution {
                    stage,
                    detail: format!("{} returned {}", invocation.program, output.exit_label()),
                },
            ));
        }
        Ok(output)
    }

    fn require_inputs(&self, stage: Stage, kinds: &[ArtifactKind]) -> PipelineResult<()> {
        for &kind in kinds {
            if !self.store.exists(kind) {
                return Err(PipelineError::ArtifactMissing {
                    stage,
                    kind,
                    path: self.store.path(kind),
                });
            }
        }
        Ok(())
    }

    fn expect_artifact(
        &self,
        stage: Stage,
        kind: ArtifactKind,
        output: &StageOutput,
    ) -> PipelineResult<()> {
        let path = self.store.path(kind);
        if file_is_present(&path) {
            return Ok(());
        }
        Err(self.failed(output, PipelineError::ArtifactMissing { stage, kind, path }))
    }

    /// Echo raw collaborator output for post-mortem unless it was already shown.
    fn failed(&self, output: &StageOutput, err: PipelineError) -> PipelineError {
        if !self.options.echo {
            print_output(output);
        }
        err
    }
}

fn print_header(header: &str) {
    println!("\n{SEP}\n** {header}\n{SEP}");
}

fn print_output(output: &StageOutput) {
    if !output.stdout.is_empty() {
        print!("{}", output.stdout);
        if !output.stdout.ends_with('\n') {
            println!();
        }
    }
    if !output.stderr.is_empty() {
        eprint!("{}", output.stderr);
        if !output.stderr.ends_with('\n') {
            eprintln!();
        }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
