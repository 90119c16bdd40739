//! Proof-artifact collaborator used for access URL resolution.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::debug;

/// A named proof artifact (screenshot manifest, session log, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofArtifact {
    pub name: String,
    pub contents: String,
}

pub trait ProofSource {
    fn artifacts(&self) -> Result<Vec<ProofArtifact>>;
}

/// Reads regular files from a directory. Non-UTF-8 files are skipped.
#[derive(Debug, Clone)]
pub struct DirProofSource {
    pub dir: PathBuf,
}

impl ProofSource for DirProofSource {
    fn artifacts(&self) -> Result<Vec<ProofArtifact>> {
        if !self.dir.is_dir() {
            debug!(dir = %self.dir.display(), "no proofs directory");
            return Ok(Vec::new());
        }
        let mut artifacts = Vec::new();
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("read proofs dir {}", self.dir.display()))?;
        for entry in entries {
            let entry = entry.with_context(|| format!("read entry in {}", self.dir.display()))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Ok(contents) = fs::read_to_string(&path) else {
                debug!(path = %path.display(), "skipping non-text proof");
                continue;
            };
            artifacts.push(ProofArtifact {
                name: entry.file_name().to_string_lossy().into_owned(),
                contents,
            });
        }
        Ok(artifacts)
    }
}
