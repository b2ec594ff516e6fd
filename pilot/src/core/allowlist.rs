//! Allow-list policy for mutation targets.

use anyhow::{Context, Result};
use regex::Regex;

/// Compiled set of target patterns a mutation may address.
///
/// An empty list permits nothing: mutations are denied until the deployment
/// opts targets in.
#[derive(Debug, Clone)]
pub struct AllowList {
    patterns: Vec<Regex>,
}

impl AllowList {
    pub fn compile(patterns: &[String]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for raw in patterns {
            let regex =
                Regex::new(raw).with_context(|| format!("compile allow pattern '{raw}'"))?;
            compiled.push(regex);
        }
        Ok(Self { patterns: compiled })
    }

    pub fn permits(&self, target: &str) -> bool {
        self.patterns.iter().any(|regex| regex.is_match(target))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
