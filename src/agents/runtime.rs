//! Agent Execution Loop
//!
//! [`AgentRuntime`] owns one conversation: it sends the transcript to the
//! gateway, dispatches requested tool calls against the agent's workspace and
//! loops until the model answers in plain text or the iteration cap is hit.
//!
//! ## State Machine
//!
//! ```text
//! idle ──run()──▶ running ──plain text / cap──▶ completed
//!                    │
//!                    └──gateway error──▶ failed (error re-raised)
//! ```
//!
//! Tool failures never leave the loop: they become error strings in the
//! transcript and failed entries in the audit trail.

use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use super::execution::{AgentInfo, ExecutionRecord, ToolCallRecord};
use super::tools::{ToolArgs, ToolRegistry};
use crate::ai::{ChatMessage, ModelGateway, ToolCallRequest};
use crate::config::Config;
use crate::constants::agent as agent_constants;
use crate::types::{Result, finding_id};

// =============================================================================
// Configuration
// =============================================================================

/// Fixed identity of an agent kind
#[derive(Debug, Clone, Copy)]
pub struct AgentProfile {
    pub id: &'static str,
    pub description: &'static str,
    pub system_prompt: &'static str,
    pub temperature: f32,
}

/// Per-instance overrides
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Falls back to the gateway's default model
    pub model: Option<String>,
    pub max_iterations: u32,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            model: None,
            max_iterations: agent_constants::DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl AgentOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.agents.model.clone(),
            max_iterations: config.agents.max_iterations.max(1),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }
}

/// Monotonic per-agent identifier source: `<prefix>_<n>_<timestamp>`
#[derive(Debug, Clone)]
pub struct IdSequence {
    prefix: &'static str,
    issued: usize,
}

impl IdSequence {
    pub const fn new(prefix: &'static str) -> Self {
        Self { prefix, issued: 0 }
    }

    pub fn next_id(&mut self) -> String {
        self.issued += 1;
        finding_id(self.prefix, self.issued)
    }

    pub fn issued(&self) -> usize {
        self.issued
    }
}

// =============================================================================
// Runtime
// =============================================================================

pub struct AgentRuntime<W> {
    profile: AgentProfile,
    options: AgentOptions,
    gateway: Arc<ModelGateway>,
    tools: ToolRegistry<W>,
    workspace: W,
    transcript: Vec<ChatMessage>,
    execution: ExecutionRecord,
    lifetime_cost: f64,
}

impl<W: Send + 'static> AgentRuntime<W> {
    pub fn new(
        profile: AgentProfile,
        gateway: Arc<ModelGateway>,
        tools: ToolRegistry<W>,
        workspace: W,
        options: AgentOptions,
    ) -> Self {
        Self {
            profile,
            options,
            gateway,
            tools,
            workspace,
            transcript: Vec::new(),
            execution: ExecutionRecord::default(),
            lifetime_cost: 0.0,
        }
    }

    pub fn id(&self) -> &'static str {
        self.profile.id
    }

    pub fn model(&self) -> &str {
        self.options
            .model
            .as_deref()
            .unwrap_or_else(|| self.gateway.default_model())
    }

    pub fn workspace(&self) -> &W {
        &self.workspace
    }

    pub fn workspace_mut(&mut self) -> &mut W {
        &mut self.workspace
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    /// Record of the most recent `run`
    pub fn execution(&self) -> &ExecutionRecord {
        &self.execution
    }

    /// Cost of the most recent `run`
    pub fn run_cost(&self) -> f64 {
        self.execution.total_cost
    }

    /// Cost across every `run` on this instance
    pub fn lifetime_cost(&self) -> f64 {
        self.lifetime_cost
    }

    pub fn info(&self) -> AgentInfo {
        AgentInfo {
            id: self.profile.id,
            description: self.profile.description,
            model: self.model().to_string(),
            temperature: self.profile.temperature,
            max_iterations: self.options.max_iterations,
            tools: self.tools.names(),
            status: self.execution.status,
        }
    }

    /// Run one conversation to completion.
    ///
    /// `context`, when present, is appended to the user message as a pretty
    /// JSON block. On a gateway failure the record is marked failed and the
    /// error is returned unchanged.
    #[instrument(skip_all, fields(agent = %self.profile.id))]
    pub async fn run(&mut self, user_message: &str, context: Option<&Value>) -> Result<String> {
        self.execution = ExecutionRecord::running();

        let mut message = user_message.to_string();
        if let Some(ctx) = context {
            let pretty = serde_json::to_string_pretty(ctx).unwrap_or_else(|_| ctx.to_string());
            message.push_str(&format!("\n\nContext:\n```json\n{}\n```", pretty));
        }
        self.transcript = vec![
            ChatMessage::system(self.profile.system_prompt),
            ChatMessage::user(message),
        ];

        match self.run_loop().await {
            Ok(text) => {
                self.execution.complete();
                info!(
                    iterations = self.execution.iterations,
                    tool_calls = self.execution.tool_calls.len(),
                    cost_usd = self.execution.total_cost,
                    "Agent run completed"
                );
                Ok(text)
            }
            Err(e) => {
                error!("Agent {} error: {}", self.profile.id, e);
                self.execution.fail(e.to_string());
                Err(e)
            }
        }
    }

    async fn run_loop(&mut self) -> Result<String> {
        let definitions = self.tools.definitions();
        let model = self.model().to_string();

        for iteration in 0..self.options.max_iterations {
            self.execution.iterations = iteration + 1;

            let completion = self
                .gateway
                .complete(
                    &self.transcript,
                    Some(&model),
                    Some(self.profile.temperature),
                    &definitions,
                )
                .await?;

            self.execution.total_cost += completion.cost_usd;
            self.execution.total_tokens += completion.usage.total() as u64;
            self.lifetime_cost += completion.cost_usd;

            if completion.tool_calls.is_empty() {
                self.transcript
                    .push(ChatMessage::assistant(completion.content.clone(), Vec::new()));
                return Ok(completion.content);
            }

            debug!(
                iteration = iteration + 1,
                calls = completion.tool_calls.len(),
                "Dispatching tool calls"
            );

            let mut results = Vec::with_capacity(completion.tool_calls.len());
            for call in &completion.tool_calls {
                let record = self.dispatch(call).await;
                results.push((call.id.clone(), record.transcript_text().to_string()));
                self.execution.tool_calls.push(record);
            }

            self.transcript
                .push(ChatMessage::assistant(completion.content, completion.tool_calls));
            for (call_id, text) in results {
                self.transcript.push(ChatMessage::tool_result(call_id, text));
            }
        }

        warn!(
            max_iterations = self.options.max_iterations,
            "Iteration cap reached without a final answer"
        );
        Ok(self
            .transcript
            .last()
            .map(|m| m.content.clone())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| agent_constants::MAX_ITERATIONS_FALLBACK.to_string()))
    }

    async fn dispatch(&mut self, call: &ToolCallRequest) -> ToolCallRecord {
        let args = ToolArgs::parse(&call.arguments);
        let start = Instant::now();

        let outcome = match self.tools.get(&call.name) {
            Some(tool) => match tool.invoke(&mut self.workspace, &args).await {
                Ok(output) => Ok(output.into_text()),
                Err(e) => {
                    error!(tool = %call.name, "Tool {} error: {}", call.name, e);
                    Err(format!("Tool error: {}", e))
                }
            },
            None => {
                warn!(tool = %call.name, "Model requested an unknown tool");
                Err(format!("Unknown tool: {}", call.name))
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let (result, error, success) = match outcome {
            Ok(text) => (Some(text), None, true),
            Err(text) => (None, Some(text), false),
        };

        ToolCallRecord {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: args.to_value(),
            result,
            error,
            success,
            duration_ms,
        }
    }
}
