//! Sequential, fail-fast execution of chained operations.
//!
//! A pipeline is an ordered list of [`PipelineStep`]s. Each step's
//! `mappedParams` may reference results of steps that ran before it
//! (`$.<stepId>.<path>`); references are checked, resolved, merged over the
//! step's `staticParams` and the result is sent through the
//! [`InvocationProxy`]. The first failure halts the run. The caller always
//! gets a [`PipelineRunReport`] listing every step that was attempted, unless
//! the pipeline is structurally invalid, in which case nothing runs at all.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::ExecutionContext;
use crate::error::{ErrorKind, RelayError};
use crate::proxy::InvocationProxy;
use crate::resolver;

pub const DEFAULT_MAX_STEPS: usize = 20;

// ── Steps ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStep {
    /// Label other steps use to reference this step's result. Unlabeled steps
    /// are addressed by their position (`"0"`, `"1"`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(alias = "operation", alias = "command")]
    pub operation_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_params: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapped_params: Option<Map<String, Value>>,
}

impl PipelineStep {
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            id: None,
            operation_name: operation_name.into(),
            static_params: None,
            mapped_params: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_static_params(mut self, params: Map<String, Value>) -> Self {
        self.static_params = Some(params);
        self
    }

    pub fn with_mapped_params(mut self, params: Map<String, Value>) -> Self {
        self.mapped_params = Some(params);
        self
    }

    fn effective_id(&self, position: usize) -> String {
        match self.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => position.to_string(),
        }
    }
}

// ── Report ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepFailure {
    pub code: ErrorKind,
    pub message: String,
}

impl From<&RelayError> for StepFailure {
    fn from(e: &RelayError) -> Self {
        Self {
            code: e.kind(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub id: String,
    pub operation: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepFailure>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRunReport {
    pub total_steps: usize,
    pub completed_steps: usize,
    pub success: bool,
    pub duration_ms: u64,
    pub steps: Vec<StepOutcome>,
}

impl PipelineRunReport {
    /// The step that halted the run, if any.
    pub fn failed_step(&self) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| !s.success)
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ── Runner ───────────────────────────────────────────────────────

pub struct PipelineRunner {
    proxy: Arc<InvocationProxy>,
    max_steps: usize,
}

impl PipelineRunner {
    pub fn new(proxy: Arc<InvocationProxy>) -> Self {
        Self {
            proxy,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Structural checks that apply to the pipeline as a whole. Returns the
    /// effective id of every step, in order.
    pub fn preflight(&self, steps: &[PipelineStep]) -> Result<Vec<String>, RelayError> {
        if steps.is_empty() {
            return Err(RelayError::validation("Pipeline has no steps"));
        }
        if steps.len() > self.max_steps {
            return Err(RelayError::validation(format!(
                "Pipeline has {} steps; at most {} are allowed",
                steps.len(),
                self.max_steps
            )));
        }

        let ids: Vec<String> = steps
            .iter()
            .enumerate()
            .map(|(i, step)| step.effective_id(i))
            .collect();

        // References name steps as `$.<id>.path`, so these would be unreachable.
        let unaddressable: Vec<String> = ids
            .iter()
            .filter(|id| id.contains(['.', '[', ']']))
            .cloned()
            .collect();
        if !unaddressable.is_empty() {
            return Err(RelayError::invalid_fields(
                format!(
                    "Step id(s) cannot contain '.', '[' or ']': {}",
                    unaddressable.join(", ")
                ),
                unaddressable,
            ));
        }

        let mut seen: HashMap<&str, usize> = HashMap::new();
        let mut duplicates = Vec::new();
        for id in &ids {
            let count = seen.entry(id.as_str()).or_default();
            *count += 1;
            if *count == 2 {
                duplicates.push(id.clone());
            }
        }
        if !duplicates.is_empty() {
            return Err(RelayError::invalid_fields(
                format!("Duplicate step id(s): {}", duplicates.join(", ")),
                duplicates,
            ));
        }

        Ok(ids)
    }

    /// Run `steps` in order, stopping at the first failure.
    ///
    /// Returns `Err` only for structural problems caught before any step runs.
    /// Step failures are reported inside the returned report.
    pub async fn run(&self, steps: Vec<PipelineStep>) -> Result<PipelineRunReport, RelayError> {
        let ids = self.preflight(&steps)?;
        let started = Instant::now();
        let total_steps = steps.len();

        let mut context = ExecutionContext::new();
        let mut known: HashSet<String> = HashSet::with_capacity(total_steps);
        let mut outcomes = Vec::with_capacity(total_steps);

        tracing::info!(steps = total_steps, "pipeline started");

        for (step, id) in steps.into_iter().zip(ids) {
            let step_started = Instant::now();
            tracing::debug!(step = %id, operation = %step.operation_name, "step started");

            let executed = self.execute_step(&step, &id, &known, &context).await;
            let outcome =
                executed.and_then(|result| context.record(&id, result.clone()).map(|()| result));
            let duration_ms = millis(step_started.elapsed());

            match outcome {
                Ok(result) => {
                    tracing::info!(step = %id, operation = %step.operation_name, elapsed_ms = duration_ms, "step completed");
                    known.insert(id.clone());
                    outcomes.push(StepOutcome {
                        id,
                        operation: step.operation_name,
                        success: true,
                        result: Some(result),
                        error: None,
                        duration_ms,
                    });
                }
                Err(e) => {
                    tracing::warn!(step = %id, operation = %step.operation_name, error = %e, "pipeline halted");
                    outcomes.push(StepOutcome {
                        id,
                        operation: step.operation_name,
                        success: false,
                        result: None,
                        error: Some(StepFailure::from(&e)),
                        duration_ms,
                    });
                    break;
                }
            }
        }

        let completed_steps = context.len();
        let report = PipelineRunReport {
            total_steps,
            completed_steps,
            success: completed_steps == total_steps,
            duration_ms: millis(started.elapsed()),
            steps: outcomes,
        };
        tracing::info!(
            completed = report.completed_steps,
            total = report.total_steps,
            elapsed_ms = report.duration_ms,
            "pipeline finished"
        );
        Ok(report)
    }

    async fn execute_step(
        &self,
        step: &PipelineStep,
        id: &str,
        known: &HashSet<String>,
        context: &ExecutionContext,
    ) -> Result<Value, RelayError> {
        let mut params = step.static_params.clone().unwrap_or_default();
        if let Some(mapped) = &step.mapped_params {
            let violations = resolver::validate(mapped, known);
            if !violations.is_empty() {
                return Err(resolver::violation_error(id, &violations));
            }
            params.extend(resolver::resolve(mapped, context)?);
        }
        self.proxy.invoke(&step.operation_name, Value::Object(params)).await
    }
}
