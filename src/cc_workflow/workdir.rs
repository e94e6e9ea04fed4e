use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::errors::WorkflowError;

/// Explicit handle on the directory a run writes into. Stages resolve
/// every relative output against this root, never against the process
/// working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    /// Creates `root` if needed and stores its absolute path.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        fs::create_dir_all(root.as_ref())
            .with_context(|| format!("creating working directory {:?}", root.as_ref()))?;
        let root = fs::canonicalize(root.as_ref())
            .with_context(|| format!("resolving working directory {:?}", root.as_ref()))?;
        Ok(WorkDir { root: root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn join<P: AsRef<Path>>(&self, rel: P) -> PathBuf {
        self.root.join(rel)
    }

    /// `<root>/<prefix><suffix>`
    pub fn output_filename(&self, prefix: &str, suffix: &str) -> PathBuf {
        self.root.join(format!("{}{}", prefix, suffix))
    }

    /// Fails with `OutputCollision` when `path` already exists.
    pub fn ensure_absent(&self, path: &Path) -> Result<()> {
        if path.exists() {
            Err(WorkflowError::OutputCollision(path.to_path_buf()).into())
        } else {
            Ok(())
        }
    }
}

/// Output prefixes name files directly inside the working directory,
/// so they may not be empty, contain separators, or start with a dot.
pub fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty()
        || prefix.starts_with('.')
        || prefix.contains(|ch: char| ch == '/' || ch == '\\' || ch.is_whitespace())
    {
        Err(WorkflowError::BadPrefix(prefix.to_string()).into())
    } else {
        Ok(())
    }
}

/// Fails with `MissingInput` unless `path` is an existing file.
pub fn require_input(what: &'static str, path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(WorkflowError::MissingInput {
            what: what,
            path: path.to_path_buf(),
        }
        .into())
    }
}

/// Fails with `MissingOutput` unless `path` is an existing file.
pub fn require_output(stage: &'static str, path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(WorkflowError::MissingOutput {
            stage: stage,
            path: path.to_path_buf(),
        }
        .into())
    }
}
