//! Policy layer between the orchestrator and a raw [`Transport`].
//!
//! Read operations are retried with exponential backoff; mutating operations
//! get exactly one attempt so an ambiguous outcome is never compounded by a
//! blind replay. A per-operation circuit breaker sheds calls after repeated
//! transport failures and probes with a single trial once its cooldown ends.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::adapter::{AdapterError, DesktopSurface, OpKind, Target, Transport};
use crate::core::backoff::{RETRY_BACKOFF_BASE, RETRY_BACKOFF_CAP, backoff_delay};
use crate::core::breaker::CircuitBreaker;

/// Knobs for one adapter call: timeout, retry schedule, breaker sizing.
#[derive(Debug, Clone, PartialEq)]
pub struct CallPolicy {
    pub call_timeout: Duration,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub breaker_threshold: u32,
    pub breaker_cooldown: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(3),
            max_attempts: 3,
            backoff_base: RETRY_BACKOFF_BASE,
            backoff_cap: RETRY_BACKOFF_CAP,
            breaker_threshold: 5,
            breaker_cooldown: Duration::from_secs(30),
        }
    }
}

pub struct AdapterClient<T: Transport> {
    transport: T,
    policy: CallPolicy,
    breakers: Mutex<BTreeMap<OpKind, CircuitBreaker>>,
}

impl<T: Transport> AdapterClient<T> {
    pub fn new(transport: T, policy: CallPolicy) -> Self {
        Self {
            transport,
            policy,
            breakers: Mutex::new(BTreeMap::new()),
        }
    }

    #[instrument(skip_all, fields(operation = %operation, mutating = operation.is_mutating()))]
    fn dispatch(&self, operation: OpKind, params: Value) -> Result<Value, AdapterError> {
        let attempts = if operation.is_mutating() {
            1
        } else {
            self.policy.max_attempts.max(1)
        };

        let mut attempt = 1;
        loop {
            if !self.breaker_allows(operation) {
                warn!(attempt, "circuit open, shedding call");
                return Err(AdapterError::CircuitOpen { operation });
            }

            match self
                .transport
                .call(operation, params.clone(), self.policy.call_timeout)
            {
                Ok(value) => {
                    self.record_outcome(operation, true);
                    return Ok(value);
                }
                Err(err) => {
                    // A decoded refusal proves the adapter is alive; only
                    // transport-level failures feed the breaker.
                    self.record_outcome(operation, !err.is_transient());
                    if !err.is_transient() || attempt >= attempts {
                        warn!(attempt, err = %err, "adapter call failed");
                        return Err(err);
                    }
                    let delay = backoff_delay(
                        attempt,
                        self.policy.backoff_base,
                        self.policy.backoff_cap,
                    );
                    debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying adapter call");
                    thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }

    fn breaker_allows(&self, operation: OpKind) -> bool {
        let mut breakers = match self.breakers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        breakers
            .entry(operation)
            .or_insert_with(|| {
                CircuitBreaker::new(self.policy.breaker_threshold, self.policy.breaker_cooldown)
            })
            .allow()
    }

    fn record_outcome(&self, operation: OpKind, success: bool) {
        let mut breakers = match self.breakers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(breaker) = breakers.get_mut(&operation) {
            if success {
                breaker.record_success();
            } else {
                breaker.record_failure();
            }
        }
    }
}

impl<T: Transport> DesktopSurface for AdapterClient<T> {
    fn enumerate_targets(&self) -> Result<Vec<Target>, AdapterError> {
        let operation = OpKind::EnumerateTargets;
        let value = self.dispatch(operation, json!({}))?;
        let targets = value
            .get("targets")
            .cloned()
            .ok_or_else(|| AdapterError::Malformed {
                operation,
                message: "result has no 'targets' field".to_string(),
            })?;
        serde_json::from_value(targets).map_err(|err| AdapterError::Malformed {
            operation,
            message: format!("decode targets: {err}"),
        })
    }

    fn focus(&self, target: &Target) -> Result<(), AdapterError> {
        self.dispatch(OpKind::Focus, json!({ "id": target.id }))?;
        Ok(())
    }

    fn capture_snapshot(&self, target: &Target) -> Result<String, AdapterError> {
        let operation = OpKind::CaptureSnapshot;
        let value = self.dispatch(operation, json!({ "id": target.id }))?;
        string_field(&value, "uri", operation)
    }

    fn send_keys(&self, target: &Target, keys: &str) -> Result<(), AdapterError> {
        self.dispatch(OpKind::SendKeys, json!({ "id": target.id, "keys": keys }))?;
        Ok(())
    }

    fn get_clipboard(&self) -> Result<String, AdapterError> {
        let operation = OpKind::GetClipboard;
        let value = self.dispatch(operation, json!({}))?;
        string_field(&value, "text", operation)
    }

    fn set_clipboard(&self, text: &str) -> Result<(), AdapterError> {
        self.dispatch(OpKind::SetClipboard, json!({ "text": text }))?;
        Ok(())
    }
}

fn string_field(value: &Value, field: &str, operation: OpKind) -> Result<String, AdapterError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AdapterError::Malformed {
            operation,
            message: format!("result has no '{field}' string field"),
        })
}
