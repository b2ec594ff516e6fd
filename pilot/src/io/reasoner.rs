//! External reasoner: prompt on stdin, one task envelope on stdout.
//!
//! The reasoner command is untrusted. Its output is schema-validated and
//! discarded on any failure, so a broken or hostile reasoner degrades the
//! run to the deterministic fallback instead of steering it.

use std::collections::BTreeMap;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use jsonschema::Draft;
use minijinja::{Environment, context};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::core::state::{RepoInfo, TaskEnvelope, WorkItem};
use crate::io::config::ReasonerConfig;
use crate::io::process::feed_and_collect;

const REASON_TEMPLATE: &str = include_str!("prompts/reason.md");
const ENVELOPE_SCHEMA: &str = include_str!("../../schemas/task_envelope.schema.json");

/// Run facts the reasoner may use besides the work items.
#[derive(Debug, Clone)]
pub struct ReasonContext {
    pub run_id: String,
    pub repos: BTreeMap<String, RepoInfo>,
    pub default_target: String,
}

/// Turns pending work into at most one task envelope.
pub trait Reasoner {
    /// `None` means this reasoner made no usable selection.
    fn select(&self, items: &[WorkItem], ctx: &ReasonContext) -> Option<TaskEnvelope>;
}

/// Reasoner backed by an external command.
pub struct CommandReasoner {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandReasoner {
    pub fn from_config(config: &ReasonerConfig) -> Self {
        Self {
            command: config.command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }

    fn run(&self, prompt: &str) -> Result<Value> {
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..]);
        let output = feed_and_collect(
            cmd,
            prompt.as_bytes().to_vec(),
            self.timeout,
            self.output_limit_bytes,
        )?;

        if output.timed_out {
            bail!("reasoner timed out after {}s", self.timeout.as_secs());
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "reasoner exited with {:?}: {}",
                output.status.code(),
                stderr.trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let value: Value =
            serde_json::from_str(stdout.trim()).context("parse reasoner stdout as json")?;
        validate_envelope(&value)?;
        Ok(value)
    }
}

impl Reasoner for CommandReasoner {
    #[instrument(skip_all, fields(items = items.len()))]
    fn select(&self, items: &[WorkItem], ctx: &ReasonContext) -> Option<TaskEnvelope> {
        if self.command.is_empty() {
            debug!("no reasoner command configured");
            return None;
        }

        let prompt = match render_prompt(items, ctx) {
            Ok(prompt) => prompt,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "cannot render reasoner prompt");
                return None;
            }
        };
        let value = match self.run(&prompt) {
            Ok(value) => value,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "reasoner output discarded");
                return None;
            }
        };
        match serde_json::from_value::<TaskEnvelope>(value) {
            Ok(envelope) => {
                debug!(intent = %envelope.intent, target = %envelope.target, "reasoner selected a task");
                Some(envelope)
            }
            Err(err) => {
                warn!(err = %err, "reasoner envelope does not decode");
                None
            }
        }
    }
}

fn render_prompt(items: &[WorkItem], ctx: &ReasonContext) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("reason", REASON_TEMPLATE)
        .expect("reason template should be valid");
    let template = env.get_template("reason")?;
    let rendered = template.render(context! {
        run_id => ctx.run_id,
        default_target => ctx.default_target,
        repos => ctx.repos,
        items => items,
    })?;
    Ok(rendered)
}

/// Validate a candidate envelope against the JSON Schema (Draft 2020-12).
fn validate_envelope(instance: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(ENVELOPE_SCHEMA).context("parse envelope schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile envelope schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("envelope validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}
