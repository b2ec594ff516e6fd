//! Durable run checkpoints: one JSONL file per run, one line per node.
//!
//! The engine appends a checkpoint after every node (and on entry to the
//! action node), so the last line of a run file is always the most recent
//! surviving state. Recovery reads only that line.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::state::RunState;
use crate::core::topology::NodeName;

/// One durable engine step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub run_id: String,
    pub node: NodeName,
    pub sequence_no: u64,
    pub at: i64,
    pub state: RunState,
}

/// A checkpoint file whose tail cannot be decoded. Recovery must not guess
/// at state, so this aborts the run instead of consuming a retry.
#[derive(Debug, Error)]
#[error("checkpoint corruption in run '{run_id}': {message}")]
pub struct CheckpointCorruption {
    pub run_id: String,
    pub message: String,
}

pub trait CheckpointStore {
    /// Durably append one checkpoint. Sequence numbers must increase.
    fn append(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Latest checkpoint of a run, or `None` if the run has no file yet.
    fn latest(&self, run_id: &str) -> Result<Option<Checkpoint>>;

    /// Run ids whose latest checkpoint is not terminal, sorted. Corrupt run
    /// files are skipped with a warning; they are evidence, not work.
    fn open_runs(&self) -> Result<Vec<String>>;
}

pub struct JsonlCheckpointStore {
    dir: PathBuf,
}

impl JsonlCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn run_path(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{run_id}.jsonl"))
    }
}

impl CheckpointStore for JsonlCheckpointStore {
    #[instrument(skip_all, fields(run_id = checkpoint.run_id, node = %checkpoint.node, sequence_no = checkpoint.sequence_no))]
    fn append(&self, checkpoint: &Checkpoint) -> Result<()> {
        if let Some(last) = self.latest(&checkpoint.run_id)?
            && checkpoint.sequence_no <= last.sequence_no
        {
            return Err(anyhow!(
                "checkpoint sequence must increase: {} after {}",
                checkpoint.sequence_no,
                last.sequence_no
            ));
        }

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create checkpoint dir {}", self.dir.display()))?;
        let path = self.run_path(&checkpoint.run_id);
        let mut line = serde_json::to_string(checkpoint).context("serialize checkpoint")?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open {}", path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append {}", path.display()))?;
        file.sync_all()
            .with_context(|| format!("sync {}", path.display()))?;
        debug!("checkpoint appended");
        Ok(())
    }

    fn latest(&self, run_id: &str) -> Result<Option<Checkpoint>> {
        let path = self.run_path(run_id);
        if !path.exists() {
            return Ok(None);
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        let mut tail: Option<(usize, &str)> = None;
        for (idx, line) in contents.lines().enumerate() {
            if !line.trim().is_empty() {
                tail = Some((idx, line));
            }
        }
        let Some((line_no, line)) = tail else {
            return Ok(None);
        };

        let checkpoint: Checkpoint =
            serde_json::from_str(line).map_err(|err| CheckpointCorruption {
                run_id: run_id.to_string(),
                message: format!("line {}: {err}", line_no + 1),
            })?;
        if checkpoint.run_id != run_id {
            return Err(CheckpointCorruption {
                run_id: run_id.to_string(),
                message: format!("line {} belongs to run '{}'", line_no + 1, checkpoint.run_id),
            }
            .into());
        }
        Ok(Some(checkpoint))
    }

    fn open_runs(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("read checkpoint dir {}", self.dir.display()))?;

        let mut open = Vec::new();
        for entry in entries {
            let entry = entry.context("read checkpoint dir entry")?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("jsonl") {
                continue;
            }
            let Some(run_id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            match self.latest(run_id) {
                Ok(Some(checkpoint)) if !checkpoint.state.phase.is_terminal() => {
                    open.push(run_id.to_string());
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(run_id, err = %format!("{err:#}"), "skipping unreadable run file");
                }
            }
        }
        open.sort();
        Ok(open)
    }
}
