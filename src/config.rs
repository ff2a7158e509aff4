//! Collaborator configuration.
//!
//! Binary paths, the JVM memory limit and the encoder classpath live in one
//! struct handed to the orchestrator at construction. Defaults match the
//! stock toolchain layout; a JSON file may override any subset.
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Full collaborator configuration for one pipeline.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub encoder: EncoderConfig,
    pub preprocessor: PreprocessorConfig,
    pub solver: SolverConfig,
}

/// JVM launch settings for the encoder/decoder tool.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct EncoderConfig {
    pub program: String,
    /// Passed as `-Xmx<limit>`; omitted when unset.
    pub memory_limit: Option<String>,
    pub classpath: Vec<String>,
    pub main_class: String,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            program: "java".to_string(),
            memory_limit: Some("4G".to_string()),
            classpath: vec![
                "./lib/mrr-0.0.1.jar".to_string(),
                "./lib/args4j-2.33.jar".to_string(),
                "./lib/pddl4j-3.5.0.jar".to_string(),
            ],
            main_class: "au.rmit.agtgrp.mrr.main.MrrMain".to_string(),
        }
    }
}

/// Preprocessor binary; also used in `reconstruct` mode.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PreprocessorConfig {
    pub program: String,
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self {
            program: "maxpre".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    pub program: String,
    /// Flag that makes the solver print its model line.
    pub model_flag: String,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            program: "loandra".to_string(),
            model_flag: "-print-model".to_string(),
        }
    }
}

impl EncoderConfig {
    /// Leading arguments shared by ENCODE and DECODE calls, after the program.
    pub fn launch_args(&self) -> Result<Vec<String>> {
        let mut args = Vec::new();
        if let Some(limit) = &self.memory_limit {
            args.push(format!("-Xmx{limit}"));
        }
        if !self.classpath.is_empty() {
            args.push("-cp".to_string());
            args.push(self.joined_classpath()?);
        }
        args.push(self.main_class.clone());
        Ok(args)
    }

    fn joined_classpath(&self) -> Result<String> {
        let joined = std::env::join_paths(&self.classpath).context("join encoder classpath")?;
        joined
            .into_string()
            .map_err(|_| anyhow!("encoder classpath is not valid UTF-8"))
    }
}

/// Load a config file; missing fields fall back to defaults.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: PipelineConfig =
        serde_json::from_slice(&bytes).context("parse pipeline config JSON")?;
    validate_config(&config)?;
    Ok(config)
}

/// Reject configs that could only fail later, mid-pipeline.
pub fn validate_config(config: &PipelineConfig) -> Result<()> {
    let programs = [
        ("encoder.program", &config.encoder.program),
        ("preprocessor.program", &config.preprocessor.program),
        ("solver.program", &config.solver.program),
    ];
    for (label, program) in programs {
        if program.trim().is_empty() {
            return Err(anyhow!("{label} must be non-empty"));
        }
    }
    if config.encoder.main_class.trim().is_empty() {
        return Err(anyhow!("encoder.main_class must be non-empty"));
    }
    if config.solver.model_flag.trim().is_empty() {
        return Err(anyhow!("solver.model_flag must be non-empty"));
    }
    if let Some(limit) = config.encoder.memory_limit.as_deref() {
        if !is_memory_limit(limit) {
            return Err(anyhow!(
                "encoder.memory_limit must look like 4G, 512m or 1048576 (got {limit:?})"
            ));
        }
    }
    config.encoder.joined_classpath()?;
    Ok(())
}

fn is_memory_limit(limit: &str) -> bool {
    let digits = limit
        .strip_suffix(['k', 'K', 'm', 'M', 'g', 'G'])
        .unwrap_or(limit);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}
