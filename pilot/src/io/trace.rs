//! Episode traces: append-only JSONL partitioned by UTC day.
//!
//! Traces are observability, not state. Recording never fails the run; a
//! sink that cannot write logs a warning and drops the event.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceEvent {
    pub at: i64,
    pub run_id: String,
    pub name: String,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl TraceEvent {
    pub fn new(at: i64, run_id: &str, name: &str) -> Self {
        Self {
            at,
            run_id: run_id.to_string(),
            name: name.to_string(),
            fields: BTreeMap::new(),
        }
    }

    pub fn field(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }
}

pub trait TraceSink {
    fn record(&self, event: &TraceEvent);
}

pub struct JsonlTraceSink {
    dir: PathBuf,
}

impl JsonlTraceSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl TraceSink for JsonlTraceSink {
    fn record(&self, event: &TraceEvent) {
        let Some(at) = DateTime::from_timestamp(event.at, 0) else {
            warn!(at = event.at, "trace event timestamp out of range");
            return;
        };
        let day_dir = self.dir.join(at.format("%Y%m%d").to_string());
        if let Err(err) = fs::create_dir_all(&day_dir) {
            warn!(dir = %day_dir.display(), err = %err, "cannot create trace dir");
            return;
        }
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(err) => {
                warn!(err = %err, "cannot serialize trace event");
                return;
            }
        };
        let path = day_dir.join("events.jsonl");
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| writeln!(file, "{line}"));
        if let Err(err) = result {
            warn!(path = %path.display(), err = %err, "cannot append trace event");
        }
    }
}
