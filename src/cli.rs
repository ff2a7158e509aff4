//! CLI argument parsing for the plan optimisation pipeline.
use clap::Parser;
use std::path::PathBuf;

/// Default artifact directory, relative to the current directory.
pub const DEFAULT_WORK_DIR: &str = "out";

#[derive(Parser, Debug)]
#[command(
    name = "pop-opt",
    version,
    about = "Optimise a plan into a partial-order plan via MaxSAT",
    after_help = "Stages:\n  encode       encoder/decoder tool in ENCODE mode -> encoded.wcnf\n  preprocess   preprocessor -> preprocessed.wcnf + preprocessed.wcnf.map\n  solve        MaxSAT solver -> pp-model.dimacs\n  reconstruct  preprocessor in reconstruct mode -> model.dimacs\n  decode       encoder/decoder tool in DECODE mode -> optimised.pop\n\nencode, preprocess and decode fail on a non-zero exit status; solve and\nreconstruct are judged by their s/v output only.\n\nExample:\n  pop-opt --domain domain.pddl --problem p01.pddl --plan p01.plan --encoder uniform"
)]
pub struct Args {
    /// Domain file
    #[arg(long, value_name = "PATH")]
    pub domain: PathBuf,

    /// Problem file
    #[arg(long, value_name = "PATH")]
    pub problem: PathBuf,

    /// Plan file
    #[arg(long, value_name = "PATH")]
    pub plan: PathBuf,

    /// MaxSAT encoder identifier passed to the encoding tool
    #[arg(long, value_name = "ID")]
    pub encoder: String,

    /// Verbose mode: debug logging, forwarded to the encoder/decoder
    #[arg(long)]
    pub verbose: bool,

    /// Do not echo stage banners, commands and collaborator output
    #[arg(long)]
    pub quiet: bool,

    /// JSON file overriding collaborator paths and launch settings
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory for intermediate and final artifacts (cleared on every run)
    #[arg(long, value_name = "DIR", default_value = DEFAULT_WORK_DIR)]
    pub work_dir: PathBuf,

    /// Write a JSON run report to this path
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,
}
