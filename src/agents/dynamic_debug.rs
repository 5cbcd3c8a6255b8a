//! Dynamic Debug Agent
//!
//! Plans debugger sessions that confirm a finding at runtime: breakpoints,
//! inspection commands and a short strategy. Breakpoints and actions are
//! staged in the workspace until `submit_analysis` snapshots them into a
//! [`DebugSession`].

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

use super::SecurityAgent;
use super::runtime::{AgentOptions, AgentProfile, AgentRuntime, IdSequence};
use super::tools::{ParamSpec, ToolArgs, ToolOutput, ToolRegistry, ToolSpec};
use super::vuln_analyzer::Vulnerability;
use crate::ai::ModelGateway;
use crate::constants::agent::{DEBUG_CONTEXT_CHARS, DEBUG_PROMPT_CHARS};
use crate::types::{Result, truncate_chars, unix_timestamp_f64};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub bp_id: String,
    pub file_path: String,
    pub line_number: usize,
    pub condition: Option<String>,
    pub reason: String,
}

impl Breakpoint {
    /// gdb/lldb `break` line
    pub fn command(&self) -> String {
        match &self.condition {
            Some(cond) => format!("break {}:{} if {}", self.file_path, self.line_number, cond),
            None => format!("break {}:{}", self.file_path, self.line_number),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugAction {
    pub action_id: String,
    pub action_type: String,
    pub target: String,
    pub command: String,
    pub expected_result: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugSession {
    pub session_id: String,
    pub vulnerability: Value,
    pub breakpoints: Vec<Breakpoint>,
    pub actions: Vec<DebugAction>,
    pub analysis: String,
    pub created_at: f64,
}

// =============================================================================
// Workspace & Tools
// =============================================================================

pub struct DebugWorkspace {
    vulnerability: Value,
    default_file: String,
    source_code: String,
    breakpoints: Vec<Breakpoint>,
    actions: Vec<DebugAction>,
    sessions: Vec<DebugSession>,
    ids: IdSequence,
}

impl Default for DebugWorkspace {
    fn default() -> Self {
        Self {
            vulnerability: json!({}),
            default_file: String::new(),
            source_code: String::new(),
            breakpoints: Vec::new(),
            actions: Vec::new(),
            sessions: Vec::new(),
            ids: IdSequence::new("debug"),
        }
    }
}

impl DebugWorkspace {
    fn stage(&mut self, vuln: &Vulnerability, source_code: &str) -> Result<()> {
        self.vulnerability = serde_json::to_value(vuln)?;
        self.default_file = vuln.file_path.clone();
        self.source_code = source_code.to_string();
        self.breakpoints.clear();
        self.actions.clear();
        Ok(())
    }
}

fn get_debug_context(ws: &mut DebugWorkspace, _args: &ToolArgs) -> Result<ToolOutput> {
    Ok(ToolOutput::Json(json!({
        "vulnerability": ws.vulnerability,
        "source_code": truncate_chars(&ws.source_code, DEBUG_CONTEXT_CHARS),
    })))
}

fn set_breakpoint(ws: &mut DebugWorkspace, args: &ToolArgs) -> Result<ToolOutput> {
    let bp = Breakpoint {
        bp_id: format!("bp_{}", ws.breakpoints.len() + 1),
        file_path: args.str_or("file_path", &ws.default_file),
        line_number: args.usize_or("line_number", 0),
        condition: args.opt_non_empty("condition"),
        reason: args.str_or("reason", ""),
    };

    let when = bp
        .condition
        .as_ref()
        .map(|c| format!(" when {}", c))
        .unwrap_or_default();
    let message = format!("Breakpoint set: {}:{}{}", bp.file_path, bp.line_number, when);
    ws.breakpoints.push(bp);
    Ok(message.into())
}

fn add_debug_action(ws: &mut DebugWorkspace, args: &ToolArgs) -> Result<ToolOutput> {
    let action = DebugAction {
        action_id: format!("action_{}", ws.actions.len() + 1),
        action_type: args.str_or("action_type", "inspect"),
        target: args.str_or("target", ""),
        command: args.str_or("command", ""),
        expected_result: args.str_or("expected_result", ""),
    };

    let message = format!("Action added: {} on {}", action.action_type, action.target);
    ws.actions.push(action);
    Ok(message.into())
}

fn submit_analysis(ws: &mut DebugWorkspace, args: &ToolArgs) -> Result<ToolOutput> {
    let session = DebugSession {
        session_id: ws.ids.next_id(),
        vulnerability: ws.vulnerability.clone(),
        breakpoints: ws.breakpoints.clone(),
        actions: ws.actions.clone(),
        analysis: args.str_or("analysis", ""),
        created_at: unix_timestamp_f64(),
    };
    ws.sessions.push(session);

    Ok(format!(
        "Analysis submitted: {} breakpoints, {} actions",
        ws.breakpoints.len(),
        ws.actions.len()
    )
    .into())
}

fn registry() -> ToolRegistry<DebugWorkspace> {
    ToolRegistry::new()
        .with_fn(
            ToolSpec::new(
                "get_debug_context",
                "Get vulnerability and source code context",
                vec![],
            ),
            get_debug_context,
        )
        .with_fn(
            ToolSpec::new(
                "set_breakpoint",
                "Set a breakpoint for debugging",
                vec![
                    ParamSpec::string("file_path", "Source file path"),
                    ParamSpec::integer("line_number", "Line number for breakpoint"),
                    ParamSpec::string("condition", "Optional condition expression"),
                    ParamSpec::string("reason", "Why this breakpoint helps"),
                ],
            ),
            set_breakpoint,
        )
        .with_fn(
            ToolSpec::new(
                "add_debug_action",
                "Add a debug action to perform",
                vec![
                    ParamSpec::string("action_type", "Type: inspect, watch, step, evaluate, memory_dump"),
                    ParamSpec::string("target", "Variable or expression to act on"),
                    ParamSpec::string("command", "Debugger command (GDB/LLDB syntax)"),
                    ParamSpec::string("expected_result", "What to look for in the result"),
                ],
            ),
            add_debug_action,
        )
        .with_fn(
            ToolSpec::new(
                "submit_analysis",
                "Submit the debugging analysis",
                vec![ParamSpec::string("analysis", "Summary of debugging strategy")],
            ),
            submit_analysis,
        )
}

// =============================================================================
// Agent
// =============================================================================

const SYSTEM_PROMPT: &str = r#"<ROLE>
You are a debugging expert helping to dynamically analyze vulnerabilities.
</ROLE>

<OBJECTIVES>
1. Analyze vulnerabilities and source code
2. Design debugging strategies to confirm issues
3. Create breakpoints and debug commands
4. Plan runtime analysis steps
</OBJECTIVES>

## Strategies by Vulnerability Type
- Buffer overflow: set breakpoints before/after memcpy, watch buffer sizes
- Use-after-free: track allocation/deallocation, check pointer validity
- SQL injection: inspect query strings at execution points
- Race conditions: monitor lock acquisition and shared state

Generate GDB/LLDB/JDB commands appropriate for the language."#;

pub struct DynamicDebugAgent {
    runtime: AgentRuntime<DebugWorkspace>,
}

impl DynamicDebugAgent {
    pub const PROFILE: AgentProfile = AgentProfile {
        id: "dynamic_debug",
        description: "Plans debugger sessions that confirm findings at runtime",
        system_prompt: SYSTEM_PROMPT,
        temperature: 0.2,
    };

    pub fn new(gateway: Arc<ModelGateway>, options: AgentOptions) -> Self {
        Self {
            runtime: AgentRuntime::new(
                Self::PROFILE,
                gateway,
                registry(),
                DebugWorkspace::default(),
                options,
            ),
        }
    }

    /// The session submitted during this call, if the model submitted one
    pub async fn plan_debug_session(
        &mut self,
        vuln: &Vulnerability,
        source_code: &str,
    ) -> Result<Option<DebugSession>> {
        self.runtime.workspace_mut().stage(vuln, source_code)?;
        let before = self.runtime.workspace().sessions.len();

        let prompt = format!(
            r#"Plan a debugging session to confirm this vulnerability:

Vulnerability Type: {}
Severity: {}
Location: {}:{}
Description: {}

Source code:
```
{}
```

Instructions:
1. Use get_debug_context to review the details
2. Use set_breakpoint for key locations
3. Use add_debug_action for runtime inspections
4. Use submit_analysis with your debugging strategy"#,
            vuln.vuln_type,
            vuln.severity,
            vuln.file_path,
            vuln.line_number,
            if vuln.description.is_empty() {
                "No description"
            } else {
                vuln.description.as_str()
            },
            truncate_chars(source_code, DEBUG_PROMPT_CHARS)
        );
        self.runtime.run(&prompt, None).await?;

        let sessions = &self.runtime.workspace().sessions;
        if sessions.len() > before {
            Ok(sessions.last().cloned())
        } else {
            Ok(None)
        }
    }

    /// Debugger script built from the breakpoints and actions staged during
    /// this call: one `break` line per breakpoint, then each action command.
    pub async fn generate_debug_script(
        &mut self,
        vuln: &Vulnerability,
        debugger: &str,
    ) -> Result<String> {
        self.runtime.workspace_mut().stage(vuln, "")?;

        let prompt = format!(
            r#"Generate a {} script to debug this vulnerability:

{}

Use set_breakpoint and add_debug_action to build the script.
Then submit_analysis with instructions for running it."#,
            debugger.to_uppercase(),
            vuln.header_block()
        );
        self.runtime.run(&prompt, None).await?;

        let ws = self.runtime.workspace();
        let lines: Vec<String> = ws
            .breakpoints
            .iter()
            .map(Breakpoint::command)
            .chain(ws.actions.iter().map(|a| a.command.clone()))
            .collect();
        Ok(lines.join("\n"))
    }

    pub fn sessions(&self) -> &[DebugSession] {
        &self.runtime.workspace().sessions
    }
}

impl SecurityAgent for DynamicDebugAgent {
    type Workspace = DebugWorkspace;

    fn runtime(&self) -> &AgentRuntime<DebugWorkspace> {
        &self.runtime
    }

    fn results(&self) -> Value {
        let sessions = &self.runtime.workspace().sessions;
        json!({
            "sessions": sessions,
            "total_breakpoints": sessions.iter().map(|s| s.breakpoints.len()).sum::<usize>(),
            "total_actions": sessions.iter().map(|s| s.actions.len()).sum::<usize>(),
            "total": sessions.len(),
        })
    }
}
