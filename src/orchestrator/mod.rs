//! The agent loop.
//!
//! One orchestrator drives one query to completion:
//!
//! ```text
//! ┌──────────┐   completion   ┌───────────┐   code    ┌─────────────┐
//! │   LLM    │ ─────────────▶ │ extractor │ ────────▶ │   sandbox   │
//! └──────────┘                └───────────┘           └─────────────┘
//!      ▲                            │ FINAL(x)               │ stdout/stderr
//!      │  observation               ▼                        ▼
//!      │                      ┌───────────┐   events   ┌─────────────┐
//!      └───────────────────── │  result   │ ◀───────── │ egress filt │
//!                             └───────────┘            └─────────────┘
//! ```
//!
//! Iterations are strictly sequential; the budget is checked before every
//! LLM request; every observation has passed the egress filter. Recoverable
//! sandbox outcomes (timeout, OOM, non-zero exit) become observations the
//! model can react to; everything else ends the run with a coded failure.

mod prompt;

pub use prompt::build_system_prompt;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;

use crate::budget::{BudgetManager, BudgetSummary, PricingTable};
use crate::context::ContextHandle;
use crate::egress::{EgressConfig, EgressFilter};
use crate::error::{Error, Result};
use crate::llm::{ChatMessage, CompletionResponse, LlmProvider, create_provider};
use crate::parse;
use crate::sandbox::{CodeRunner, DockerSupervisor, ExecutionResult, SandboxConfig};
use crate::settings::Settings;

/// Characters kept when summarizing step inputs/outputs.
const SUMMARY_CHARS: usize = 160;
/// Base delay before the single LLM retry.
const RETRY_BASE_MS: u64 = 500;
/// Random extra delay on top of the base.
const RETRY_JITTER_MS: u64 = 400;

const GUIDANCE_OBSERVATION: &str = "Your last reply contained no runnable code block and no \
final answer. Reply with a fenced ```python block to execute, or FINAL(answer) when you are done.";

/// Per-run options beyond the ambient settings.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    /// Abort the run when a non-truncation egress event fires.
    pub raise_on_leak: bool,
    /// Extra operator instructions appended to the system prompt.
    pub custom_instructions: Option<String>,
}

/// What one step of the loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    LlmRequest,
    CodeExec,
    Filter,
    Final,
}

impl StepAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepAction::LlmRequest => "llm_request",
            StepAction::CodeExec => "code_exec",
            StepAction::Filter => "filter",
            StepAction::Final => "final",
        }
    }
}

/// Append-only record of one loop step.
#[derive(Debug, Clone)]
pub struct AgentStep {
    pub iteration: u32,
    pub action: StepAction,
    pub input_summary: String,
    pub output_summary: String,
    pub error: Option<String>,
    pub cost_delta: Decimal,
    pub at: DateTime<Utc>,
}

/// Stable failure description carried in the run result.
#[derive(Debug, Clone)]
pub struct RunFailure {
    /// Machine-readable code, e.g. `security_violation`.
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

impl RunFailure {
    fn from_error(e: &Error) -> Self {
        Self {
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }

    fn max_iterations(limit: u32) -> Self {
        Self {
            code: "max_iterations".to_string(),
            message: format!("no final answer after {limit} iterations"),
        }
    }
}

/// Outcome of one orchestrated query.
#[derive(Debug, Clone)]
pub struct OrchestratorResult {
    pub final_answer: Option<String>,
    pub success: bool,
    /// Completed loop iterations.
    pub iterations: u32,
    pub steps: Vec<AgentStep>,
    pub budget: BudgetSummary,
    pub error: Option<RunFailure>,
}

/// Drives one query through the LLM ↔ sandbox loop.
///
/// Single-use: [`run`] consumes the orchestrator, so an instance can never
/// be re-entered with stale conversation state.
///
/// [`run`]: Orchestrator::run
pub struct Orchestrator {
    settings: Settings,
    config: OrchestratorConfig,
    provider: Arc<dyn LlmProvider>,
    runner: Arc<dyn CodeRunner>,
}

impl Orchestrator {
    pub fn new(
        settings: Settings,
        config: OrchestratorConfig,
        provider: Arc<dyn LlmProvider>,
        runner: Arc<dyn CodeRunner>,
    ) -> Self {
        Self {
            settings,
            config,
            provider,
            runner,
        }
    }

    /// Build with the configured provider and a Docker supervisor.
    pub async fn from_settings(settings: Settings, config: OrchestratorConfig) -> Result<Self> {
        let provider = create_provider(&settings)?;
        let supervisor =
            DockerSupervisor::connect(SandboxConfig::from_settings(&settings)).await?;
        Ok(Self::new(settings, config, provider, Arc::new(supervisor)))
    }

    /// Run one query to completion. Never panics the error upward: every
    /// failure class lands in the result with a stable code.
    pub async fn run(self, query: &str, context_path: Option<PathBuf>) -> OrchestratorResult {
        let mut state = RunState::new();

        let mut budget = match BudgetManager::from_settings(&self.settings) {
            Ok(b) => b,
            Err(e) => {
                return state.fail(
                    &e,
                    BudgetManager::new(self.settings.max_budget_dollars, PricingTable::builtin())
                        .summary(),
                );
            }
        };

        // The context handle lives for the whole run and is released on
        // every exit path when it drops.
        let context = match context_path {
            Some(path) => match ContextHandle::open(&path) {
                Ok(handle) => Some(handle),
                Err(e) => return state.fail(&e, budget.summary()),
            },
            None => None,
        };

        // Fail-closed before any model tokens are spent: if the sandbox
        // cannot satisfy the runtime policy there is nothing to iterate.
        if let Err(e) = self.runner.preflight().await {
            return state.fail(&Error::from(e), budget.summary());
        }

        let mut filter = EgressFilter::new(EgressConfig::from_settings(
            &self.settings,
            self.config.raise_on_leak,
        ));
        if let Some(handle) = &context {
            filter = filter.with_fingerprint(handle.fingerprint().clone());
        }
        let filter = Arc::new(filter);

        let system_prompt =
            build_system_prompt(context.is_some(), self.config.custom_instructions.as_deref());

        state.history.push(ChatMessage::user(query));

        match self
            .drive(&mut state, &mut budget, &filter, context.as_ref(), &system_prompt)
            .await
        {
            Ok(Some(answer)) => OrchestratorResult {
                final_answer: Some(answer),
                success: true,
                iterations: state.iterations,
                steps: state.steps,
                budget: budget.summary(),
                error: None,
            },
            Ok(None) => OrchestratorResult {
                final_answer: None,
                success: false,
                iterations: state.iterations,
                steps: state.steps,
                budget: budget.summary(),
                error: Some(RunFailure::max_iterations(self.settings.max_iterations)),
            },
            Err(e) => state.fail(&e, budget.summary()),
        }
    }

    /// Synchronous wrapper driving the same loop body on a local runtime.
    pub fn run_blocking(self, query: &str, context_path: Option<PathBuf>) -> OrchestratorResult {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                let limit = self.settings.max_budget_dollars;
                return RunState::new().fail(
                    &Error::Configuration {
                        reason: format!("cannot build local runtime: {e}"),
                    },
                    BudgetManager::new(limit, PricingTable::builtin()).summary(),
                );
            }
        };
        runtime.block_on(self.run(query, context_path))
    }

    /// One-off question: run and return the best available answer text.
    pub async fn chat(self, message: &str) -> String {
        let result = self.run(message, None).await;
        result
            .final_answer
            .or_else(|| result.steps.last().map(|s| s.output_summary.clone()))
            .unwrap_or_default()
    }

    /// The loop body — the single source of truth for iteration order.
    ///
    /// Returns `Ok(Some(answer))` on a final answer, `Ok(None)` when the
    /// iteration cap ran out, `Err` on any terminal failure.
    async fn drive(
        &self,
        state: &mut RunState,
        budget: &mut BudgetManager,
        filter: &Arc<EgressFilter>,
        context: Option<&ContextHandle>,
        system_prompt: &str,
    ) -> Result<Option<String>> {
        let mut actionless_streak = 0u32;

        for iteration in 0..self.settings.max_iterations {
            tracing::info!(
                iteration = iteration + 1,
                max = self.settings.max_iterations,
                "agent iteration"
            );

            // 1. Budget gate, strictly before the request.
            budget.ensure_available()?;

            // 2-3. Completion plus usage accounting.
            let response = self.call_llm(state, system_prompt).await?;
            let cost = budget.record(
                &response.model,
                response.usage.input_tokens,
                response.usage.output_tokens,
            )?;
            if let Some(step) = state.steps.last_mut() {
                step.cost_delta = cost;
            }

            // 4. Final answer in the response prose. Markers inside fenced
            // code do not count; that code still has to run.
            if let Some(answer) = parse::final_answer_outside_code(&response.content) {
                state.record(
                    iteration,
                    StepAction::Final,
                    &response.content,
                    &answer,
                    None,
                );
                state.iterations = iteration + 1;
                return Ok(Some(answer));
            }

            // 5. Code extraction.
            let code = match parse::extract_code(&response.content) {
                Some(code) => {
                    actionless_streak = 0;
                    code
                }
                None => {
                    actionless_streak += 1;
                    if actionless_streak >= 2 {
                        return Err(Error::ParseFailure);
                    }
                    state.history.push(ChatMessage::assistant(response.content.clone()));
                    state
                        .history
                        .push(ChatMessage::user(GUIDANCE_OBSERVATION));
                    state.iterations = iteration + 1;
                    continue;
                }
            };
            state.history.push(ChatMessage::assistant(response.content.clone()));

            // 6. Sandbox execution.
            let result = self
                .runner
                .run_code(&code, context.map(|c| c.path()))
                .await?;
            state.record(
                iteration,
                StepAction::CodeExec,
                &code,
                &result.stdout,
                (!result.success()).then(|| summarize(&result.stderr)),
            );

            // 7. Egress filtering and observation assembly.
            let observation = self
                .build_observation(state, filter, iteration, &result)
                .await?;

            // A final marker printed by the code counts, but only after
            // sanitization.
            if let Some(answer) = parse::extract_final_answer(&observation) {
                state.record(iteration, StepAction::Final, &observation, &answer, None);
                state.iterations = iteration + 1;
                return Ok(Some(answer));
            }

            // 8. Feed the observation back.
            state
                .history
                .push(ChatMessage::user(format!("Observation:\n{observation}")));
            state.iterations = iteration + 1;
        }

        Ok(None)
    }

    async fn call_llm(
        &self,
        state: &mut RunState,
        system_prompt: &str,
    ) -> Result<CompletionResponse> {
        let iteration = state.iterations;
        let input = state
            .history
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let response = match self
            .provider
            .complete(&state.history, Some(system_prompt))
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_transient() => {
                let jitter = rand::thread_rng().gen_range(0..RETRY_JITTER_MS);
                let delay = Duration::from_millis(RETRY_BASE_MS + jitter);
                tracing::warn!(error = %e, ?delay, "transient LLM failure; retrying once");
                tokio::time::sleep(delay).await;
                self.provider
                    .complete(&state.history, Some(system_prompt))
                    .await?
            }
            Err(e) => return Err(e.into()),
        };

        state.record(
            iteration,
            StepAction::LlmRequest,
            &input,
            &response.content,
            None,
        );
        Ok(response)
    }

    async fn build_observation(
        &self,
        state: &mut RunState,
        filter: &Arc<EgressFilter>,
        iteration: u32,
        result: &ExecutionResult,
    ) -> Result<String> {
        if result.oom_killed {
            return Ok("Error: Memory Limit Exceeded (OOMKilled)".to_string());
        }
        if result.timed_out {
            return Ok("Error: Execution Timeout".to_string());
        }

        let combined = if result.stderr.is_empty() {
            result.stdout.clone()
        } else {
            format!("{}\n--- stderr ---\n{}", result.stdout, result.stderr)
        };

        // The filter is CPU-bound over multi-KB buffers; keep it off the
        // scheduler threads that are driving I/O.
        let filter = Arc::clone(filter);
        let outcome = tokio::task::spawn_blocking(move || filter.filter(combined.as_bytes()))
            .await
            .map_err(|e| {
                Error::Sandbox(crate::error::SandboxError::internal(format!(
                    "egress filter task failed: {e}"
                )))
            })??;

        if !outcome.events.is_empty() {
            let description = outcome
                .events
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            tracing::warn!(events = %description, "egress filter fired");
            state.record(
                iteration,
                StepAction::Filter,
                "sandbox output",
                &description,
                None,
            );
        }

        if result.success() {
            Ok(outcome.text)
        } else {
            Ok(format!(
                "Error (exit {}):\n{}",
                result.exit_code, outcome.text
            ))
        }
    }
}

struct RunState {
    history: Vec<ChatMessage>,
    steps: Vec<AgentStep>,
    iterations: u32,
}

impl RunState {
    fn new() -> Self {
        Self {
            history: Vec::new(),
            steps: Vec::new(),
            iterations: 0,
        }
    }

    fn record(
        &mut self,
        iteration: u32,
        action: StepAction,
        input: &str,
        output: &str,
        error: Option<String>,
    ) {
        self.steps.push(AgentStep {
            iteration,
            action,
            input_summary: summarize(input),
            output_summary: summarize(output),
            error,
            cost_delta: Decimal::ZERO,
            at: Utc::now(),
        });
    }

    fn fail(self, error: &Error, budget: BudgetSummary) -> OrchestratorResult {
        tracing::error!(code = error.code(), %error, "run failed");
        OrchestratorResult {
            final_answer: None,
            success: false,
            iterations: self.iterations,
            steps: self.steps,
            budget,
            error: Some(RunFailure::from_error(error)),
        }
    }
}

fn summarize(text: &str) -> String {
    if text.chars().count() <= SUMMARY_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(SUMMARY_CHARS).collect();
    format!("{cut}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_respects_char_boundaries() {
        let long = "é".repeat(500);
        let summary = summarize(&long);
        assert!(summary.chars().count() <= SUMMARY_CHARS + 1);
        assert!(summary.ends_with('…'));
        assert_eq!(summarize("short"), "short");
    }

    #[test]
    fn step_action_names() {
        assert_eq!(StepAction::LlmRequest.as_str(), "llm_request");
        assert_eq!(StepAction::Final.as_str(), "final");
    }

    #[test]
    fn run_failure_from_error() {
        let failure = RunFailure::from_error(&Error::ParseFailure);
        assert_eq!(failure.code, "parse_failure");
    }
}
