//! Branch Flipper
//!
//! Crafts fuzzing inputs that drive an uncovered branch condition to its
//! other outcome.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

use super::SecurityAgent;
use super::runtime::{AgentOptions, AgentProfile, AgentRuntime, IdSequence};
use super::tools::{ParamSpec, ToolArgs, ToolOutput, ToolRegistry, ToolSpec};
use super::vuln_analyzer::Vulnerability;
use crate::ai::ModelGateway;
use crate::constants::agent::{FLIP_CONTEXT_CHARS, FLIP_PROMPT_CHARS, MAX_EXISTING_INPUTS};
use crate::types::{
    Result, clamp_confidence, decode_hex_or_raw, truncate_chars, unix_timestamp_f64,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchTarget {
    pub branch_id: String,
    pub file_path: String,
    pub line_number: usize,
    pub condition: String,
    pub current_value: bool,
    pub target_value: bool,
    /// Description of the finding that motivated this target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vulnerability: Option<String>,
}

/// Aim at the finding's own line: the vulnerable path is the branch to take
impl From<&Vulnerability> for BranchTarget {
    fn from(vuln: &Vulnerability) -> Self {
        Self {
            branch_id: vuln.vuln_id.clone(),
            file_path: vuln.file_path.clone(),
            line_number: vuln.line_number,
            condition: vuln.vuln_type.clone(),
            current_value: false,
            target_value: true,
            vulnerability: Some(vuln.description.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlipInput {
    pub input_id: String,
    pub branch_id: String,
    #[serde(rename = "input_hex", with = "hex_or_null")]
    pub input_bytes: Vec<u8>,
    pub input_description: String,
    pub strategy: String,
    pub constraints: Vec<String>,
    pub confidence: f64,
    pub created_at: f64,
}

/// Bytes as a hex string, empty as `null`
mod hex_or_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> std::result::Result<S::Ok, S::Error> {
        if bytes.is_empty() {
            s.serialize_none()
        } else {
            s.serialize_some(&hex::encode(bytes))
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<u8>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(s) => hex::decode(s).map_err(serde::de::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}

// =============================================================================
// Workspace & Tools
// =============================================================================

pub struct FlipWorkspace {
    branch: Option<BranchTarget>,
    source_code: String,
    inputs: Vec<FlipInput>,
    ids: IdSequence,
}

impl Default for FlipWorkspace {
    fn default() -> Self {
        Self {
            branch: None,
            source_code: String::new(),
            inputs: Vec::new(),
            ids: IdSequence::new("flip"),
        }
    }
}

fn get_branch_context(ws: &mut FlipWorkspace, _args: &ToolArgs) -> Result<ToolOutput> {
    let branch = match &ws.branch {
        Some(b) => serde_json::to_value(b)?,
        None => json!({}),
    };
    Ok(ToolOutput::Json(json!({
        "branch": branch,
        "source_code": truncate_chars(&ws.source_code, FLIP_CONTEXT_CHARS),
    })))
}

fn analyze_condition(_ws: &mut FlipWorkspace, args: &ToolArgs) -> Result<ToolOutput> {
    let need = if args.bool_or("target_value", true) {
        "true"
    } else {
        "false"
    };
    Ok(format!(
        "To make '{}' evaluate to {}, analyze the variables and operators involved.",
        args.str_or("condition", ""),
        need
    )
    .into())
}

fn submit_flip_input(ws: &mut FlipWorkspace, args: &ToolArgs) -> Result<ToolOutput> {
    let input = FlipInput {
        input_id: ws.ids.next_id(),
        branch_id: ws
            .branch
            .as_ref()
            .map(|b| b.branch_id.clone())
            .unwrap_or_else(|| "unknown".to_string()),
        input_bytes: decode_hex_or_raw(&args.str_or("input_hex", "")),
        input_description: args.str_or("input_description", ""),
        strategy: args.str_or("strategy", "unknown"),
        constraints: args.string_list("constraints"),
        confidence: clamp_confidence(args.f64_or("confidence", 0.5), 0.5),
        created_at: unix_timestamp_f64(),
    };

    let message = format!(
        "Input submitted: {} strategy, confidence {:.0}%",
        input.strategy,
        input.confidence * 100.0
    );
    ws.inputs.push(input);
    Ok(message.into())
}

fn suggest_mutation(_ws: &mut FlipWorkspace, args: &ToolArgs) -> Result<ToolOutput> {
    Ok(format!(
        "Mutation suggested: {} at offset {} - {}",
        args.str_or("mutation_type", "replace"),
        args.i64_or("offset", 0),
        args.str_or("reason", "")
    )
    .into())
}

fn registry() -> ToolRegistry<FlipWorkspace> {
    ToolRegistry::new()
        .with_fn(
            ToolSpec::new(
                "get_branch_context",
                "Get the branch and source code context",
                vec![],
            ),
            get_branch_context,
        )
        .with_fn(
            ToolSpec::new(
                "analyze_condition",
                "Analyze what's needed to satisfy a condition",
                vec![
                    ParamSpec::string("condition", "The condition expression"),
                    ParamSpec::boolean("target_value", "Whether condition should be true or false"),
                ],
            ),
            analyze_condition,
        )
        .with_fn(
            ToolSpec::new(
                "submit_flip_input",
                "Submit an input designed to flip the branch",
                vec![
                    ParamSpec::string("input_hex", "Hex-encoded input bytes"),
                    ParamSpec::string("input_description", "Human-readable description of the input"),
                    ParamSpec::string("strategy", "Strategy used: boundary, magic_value, null, overflow, etc."),
                    ParamSpec::string_array("constraints", "Constraints this input satisfies"),
                    ParamSpec::number("confidence", "Confidence score 0.0-1.0"),
                ],
            ),
            submit_flip_input,
        )
        .with_fn(
            ToolSpec::new(
                "suggest_mutation",
                "Suggest a mutation to an existing input",
                vec![
                    ParamSpec::string("base_input_hex", "Base input to mutate"),
                    ParamSpec::string("mutation_type", "Type: bit_flip, insert, delete, replace"),
                    ParamSpec::integer("offset", "Byte offset to mutate"),
                    ParamSpec::string("reason", "Why this mutation might help"),
                ],
            ),
            suggest_mutation,
        )
}

// =============================================================================
// Agent
// =============================================================================

const SYSTEM_PROMPT: &str = r#"<ROLE>
You are a fuzzing expert helping to achieve better code coverage.
</ROLE>

<OBJECTIVES>
1. Analyze uncovered code branches
2. Understand the conditions required to reach them
3. Generate specific inputs that will flip the branch
</OBJECTIVES>

## Strategies
- For numeric comparisons: calculate boundary values
- For string comparisons: craft matching strings
- For NULL checks: provide null or valid pointers
- For size checks: calculate exact sizes needed
- For magic values: identify and include them

Generate minimal, targeted inputs that specifically trigger the target branch."#;

pub struct BranchFlipper {
    runtime: AgentRuntime<FlipWorkspace>,
}

impl BranchFlipper {
    pub const PROFILE: AgentProfile = AgentProfile {
        id: "branch_flipper",
        description: "Generates inputs that flip uncovered branches",
        system_prompt: SYSTEM_PROMPT,
        temperature: 0.3,
    };

    pub fn new(gateway: Arc<ModelGateway>, options: AgentOptions) -> Self {
        Self {
            runtime: AgentRuntime::new(
                Self::PROFILE,
                gateway,
                registry(),
                FlipWorkspace::default(),
                options,
            ),
        }
    }

    /// Inputs submitted for `branch` during this call. At most the first
    /// few `existing_inputs` are shown to the model as seeds.
    pub async fn generate_flip_input(
        &mut self,
        branch: &BranchTarget,
        source_code: &str,
        existing_inputs: &[Vec<u8>],
    ) -> Result<Vec<FlipInput>> {
        let ws = self.runtime.workspace_mut();
        ws.branch = Some(branch.clone());
        ws.source_code = source_code.to_string();
        ws.inputs.clear();

        let mut existing = String::new();
        if !existing_inputs.is_empty() {
            existing.push_str("\n\nExisting corpus inputs (hex):\n");
            for (i, input) in existing_inputs.iter().take(MAX_EXISTING_INPUTS).enumerate() {
                existing.push_str(&format!("- Input {}: {}\n", i + 1, hex::encode(input)));
            }
        }

        let prompt = format!(
            r#"Generate an input to flip this uncovered branch:

Branch: Line {}
Condition: {}
Currently evaluates to: {}
Need it to evaluate to: {}

Source code context:
```
{}
```
{}

Instructions:
1. Use get_branch_context to review the details
2. Use analyze_condition to understand what's needed
3. Use submit_flip_input to provide your crafted input
4. Optionally use suggest_mutation to modify existing inputs"#,
            branch.line_number,
            branch.condition,
            branch.current_value,
            branch.target_value,
            truncate_chars(source_code, FLIP_PROMPT_CHARS),
            existing
        );
        self.runtime.run(&prompt, None).await?;

        Ok(self.runtime.workspace().inputs.clone())
    }

    pub fn inputs(&self) -> &[FlipInput] {
        &self.runtime.workspace().inputs
    }
}

impl SecurityAgent for BranchFlipper {
    type Workspace = FlipWorkspace;

    fn runtime(&self) -> &AgentRuntime<FlipWorkspace> {
        &self.runtime
    }

    fn results(&self) -> Value {
        let ws = self.runtime.workspace();
        json!({
            "branch_id": ws.branch.as_ref().map(|b| b.branch_id.as_str()),
            "inputs": ws.inputs,
            "total_generated": ws.inputs.len(),
        })
    }
}
