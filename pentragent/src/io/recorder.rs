//! Run records written under `--record DIR`.
//!
//! Each finished lead produces `lead-NNN.json`; the run ends with `run.json`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::digest::Digest;
use crate::core::frontier::AppliedUpdate;
use crate::core::lead::Lead;
use crate::core::transcript::Transcript;

/// Everything recorded about one finished lead.
#[derive(Debug, Clone, Serialize)]
pub struct LeadRecord<'a> {
    pub index: u32,
    pub transcript: &'a Transcript,
    pub digest: &'a Digest,
    /// Absent when the frontier update failed.
    pub update: Option<&'a AppliedUpdate>,
}

/// Final summary of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord<'a> {
    pub target: &'a str,
    pub leads_run: u32,
    pub lead_failures: u32,
    pub policy_violations: u32,
    /// Every lead ever admitted, in admission order.
    pub history: Vec<&'a Lead>,
}

/// Writes run records into one directory.
#[derive(Debug, Clone)]
pub struct Recorder {
    dir: PathBuf,
}

impl Recorder {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("create record dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn lead_path(&self, index: u32) -> PathBuf {
        self.dir.join(format!("lead-{index:03}.json"))
    }

    pub fn run_path(&self) -> PathBuf {
        self.dir.join("run.json")
    }

    pub fn write_lead(&self, record: &LeadRecord<'_>) -> Result<PathBuf> {
        let path = self.lead_path(record.index);
        write_json(&path, record)?;
        Ok(path)
    }

    pub fn write_run(&self, record: &RunRecord<'_>) -> Result<PathBuf> {
        let path = self.run_path();
        write_json(&path, record)?;
        Ok(path)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}
