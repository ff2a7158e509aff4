//! Typed paths into the pipeline work directory.
//!
//! Every intermediate file of a run lives in one flat directory that is
//! cleared before the first stage. Path construction is centralized here so
//! the forward and reverse preprocessing steps always agree on the map file.
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// The six artifacts a run can produce.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    EncodedFormula,
    PreprocessedFormula,
    VariableMap,
    PreprocessedModel,
    ReconstructedModel,
    OptimizedPlan,
}

impl ArtifactKind {
    /// File name inside the work directory.
    pub fn file_name(self) -> &'static str {
        match self {
            ArtifactKind::EncodedFormula => "encoded.wcnf",
            ArtifactKind::PreprocessedFormula => "preprocessed.wcnf",
            ArtifactKind::VariableMap => "preprocessed.wcnf.map",
            ArtifactKind::PreprocessedModel => "pp-model.dimacs",
            ArtifactKind::ReconstructedModel => "model.dimacs",
            ArtifactKind::OptimizedPlan => "optimised.pop",
        }
    }

    fn label(self) -> &'static str {
        match self {
            ArtifactKind::EncodedFormula => "encoded formula",
            ArtifactKind::PreprocessedFormula => "preprocessed formula",
            ArtifactKind::VariableMap => "variable map",
            ArtifactKind::PreprocessedModel => "preprocessed-space model",
            ArtifactKind::ReconstructedModel => "original-space model",
            ArtifactKind::OptimizedPlan => "optimized plan",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Working directory holding the artifacts of a single run.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stable path for an artifact; the file may not exist yet.
    pub fn path(&self, kind: ArtifactKind) -> PathBuf {
        self.root.join(kind.file_name())
    }

    /// Delete everything inside the work directory.
    ///
    /// A missing directory is not an error; a path that exists but is not a
    /// directory is.
    pub fn reset(&self) -> Result<()> {
        if !self.root.exists() {
            tracing::debug!(root = %self.root.display(), "work dir absent, nothing to reset");
            return Ok(());
        }
        if !self.root.is_dir() {
            return Err(anyhow!("{} is not a directory", self.root.display()));
        }
        let mut removed = 0usize;
        for entry in
            fs::read_dir(&self.root).with_context(|| format!("read {}", self.root.display()))?
        {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)
                    .with_context(|| format!("remove {}", path.display()))?;
            } else {
                fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
            }
            removed += 1;
        }
        tracing::debug!(root = %self.root.display(), removed, "work dir reset");
        Ok(())
    }

    /// Reset the directory and make sure it exists afterwards.
    ///
    /// Returns `true` when the directory had to be created.
    pub fn prepare(&self) -> Result<bool> {
        self.reset()?;
        if self.root.is_dir() {
            return Ok(false);
        }
        fs::create_dir_all(&self.root)
            .with_context(|| format!("create {}", self.root.display()))?;
        Ok(true)
    }

    /// True when the artifact exists and is non-empty. No content checks.
    pub fn exists(&self, kind: ArtifactKind) -> bool {
        file_is_present(&self.path(kind))
    }

    pub fn write(&self, kind: ArtifactKind, text: &str) -> Result<PathBuf> {
        let path = self.path(kind);
        fs::write(&path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}

/// Existence plus non-zero size, the only health check the pipeline applies.
pub fn file_is_present(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_distinct_and_rooted() {
        let store = ArtifactStore::new(PathBuf::from("out"));
        let mut seen = Vec::new();
        let kinds = [
            ArtifactKind::EncodedFormula,
            ArtifactKind::PreprocessedFormula,
            ArtifactKind::VariableMap,
            ArtifactKind::PreprocessedModel,
            ArtifactKind::ReconstructedModel,
            ArtifactKind::OptimizedPlan,
        ];
        for kind in kinds {
            let path = store.path(kind);
            assert!(path.starts_with("out"));
            assert!(!seen.contains(&path), "duplicate path {}", path.display());
            seen.push(path);
        }
        assert_eq!(
            store.path(ArtifactKind::VariableMap),
            PathBuf::from("out/preprocessed.wcnf.map")
        );
    }

    #[test]
    fn reset_twice_leaves_directory_empty() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let store = ArtifactStore::new(temp.path().join("work"));
        std::fs::create_dir_all(store.root()).expect("create work dir");
        store
            .write(ArtifactKind::EncodedFormula, "p wcnf 1 1 2\n")
            .expect("write artifact");
        std::fs::create_dir_all(store.root().join("nested")).expect("create nested");

        store.reset().expect("first reset");
        assert_eq!(std::fs::read_dir(store.root()).expect("read").count(), 0);
        store.reset().expect("second reset");
        assert_eq!(std::fs::read_dir(store.root()).expect("read").count(), 0);
    }

    #[test]
    fn reset_of_absent_directory_is_ok() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let store = ArtifactStore::new(temp.path().join("missing"));
        store.reset().expect("reset absent");
        store.reset().expect("reset absent again");
        assert!(!store.root().exists());
    }

    #[test]
    fn reset_rejects_regular_file() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let file = temp.path().join("out");
        std::fs::write(&file, "not a dir").expect("write file");
        let store = ArtifactStore::new(file);
        let err = store.reset().expect_err("file must be rejected");
        assert!(err.to_string().contains("not a directory"));
        assert!(store.prepare().is_err());
    }

    #[test]
    fn prepare_creates_missing_directory() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let store = ArtifactStore::new(temp.path().join("a").join("b"));
        assert!(store.prepare().expect("prepare"));
        assert!(store.root().is_dir());
        assert!(!store.prepare().expect("prepare again"));
    }

    #[test]
    fn empty_files_do_not_count_as_present() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let store = ArtifactStore::new(temp.path().to_path_buf());
        assert!(!store.exists(ArtifactKind::OptimizedPlan));
        store
            .write(ArtifactKind::OptimizedPlan, "")
            .expect("write empty");
        assert!(!store.exists(ArtifactKind::OptimizedPlan));
        store
            .write(ArtifactKind::OptimizedPlan, "(plan)")
            .expect("write plan");
        assert!(store.exists(ArtifactKind::OptimizedPlan));
    }
}
