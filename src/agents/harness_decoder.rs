//! Harness Decoder
//!
//! Reverse-engineers the byte layout of fuzzing inputs. The model inspects
//! the raw bytes through `read_bytes`, stages fields with `define_field`, and
//! closes a layout with `submit_format`.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

use super::SecurityAgent;
use super::runtime::{AgentOptions, AgentProfile, AgentRuntime, IdSequence};
use super::tools::{ParamSpec, ToolArgs, ToolOutput, ToolRegistry, ToolSpec};
use crate::ai::ModelGateway;
use crate::constants::agent::{HARNESS_CONTEXT_CHARS, HARNESS_PROMPT_CHARS, MAX_INFER_SAMPLES};
use crate::types::{Result, truncate_chars, unix_timestamp_f64};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub offset: usize,
    pub size: usize,
    pub value: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputFormat {
    pub format_id: String,
    pub name: String,
    pub fields: Vec<DecodedField>,
    pub total_size: usize,
    pub description: String,
    pub created_at: f64,
}

// =============================================================================
// Byte Reading
// =============================================================================

/// Render `input[offset..offset + length]` in the requested encoding.
/// Integer encodings that do not have enough bytes fall back to hex.
pub fn read_bytes(input: &[u8], offset: usize, length: usize, format: &str) -> String {
    if offset >= input.len() {
        return format!(
            "Error: offset {} beyond input length {}",
            offset,
            input.len()
        );
    }

    let end = offset.saturating_add(length).min(input.len());
    let data = &input[offset..end];

    match format {
        "uint32_le" if data.len() >= 4 => {
            u32::from_le_bytes([data[0], data[1], data[2], data[3]]).to_string()
        }
        "uint16_le" if data.len() >= 2 => u16::from_le_bytes([data[0], data[1]]).to_string(),
        "int32_le" if data.len() >= 4 => {
            i32::from_le_bytes([data[0], data[1], data[2], data[3]]).to_string()
        }
        "string" => {
            let text = match data.iter().position(|&b| b == 0) {
                Some(nul) => &data[..nul],
                None => data,
            };
            String::from_utf8_lossy(text).into_owned()
        }
        _ => hex::encode(data),
    }
}

// =============================================================================
// Workspace & Tools
// =============================================================================

pub struct HarnessWorkspace {
    input: Vec<u8>,
    harness_code: String,
    pending: Vec<DecodedField>,
    formats: Vec<InputFormat>,
    ids: IdSequence,
}

impl Default for HarnessWorkspace {
    fn default() -> Self {
        Self {
            input: Vec::new(),
            harness_code: String::new(),
            pending: Vec::new(),
            formats: Vec::new(),
            ids: IdSequence::new("fmt"),
        }
    }
}

impl HarnessWorkspace {
    fn stage(&mut self, input: &[u8], harness_code: &str) {
        self.input = input.to_vec();
        self.harness_code = harness_code.to_string();
        self.pending.clear();
        self.formats.clear();
    }
}

fn get_input_context(ws: &mut HarnessWorkspace, _args: &ToolArgs) -> Result<ToolOutput> {
    let harness = if ws.harness_code.is_empty() {
        Value::Null
    } else {
        Value::from(truncate_chars(&ws.harness_code, HARNESS_CONTEXT_CHARS))
    };
    Ok(ToolOutput::Json(json!({
        "input_hex": hex::encode(&ws.input),
        "input_length": ws.input.len(),
        "harness_code": harness,
    })))
}

fn read_bytes_tool(ws: &mut HarnessWorkspace, args: &ToolArgs) -> Result<ToolOutput> {
    Ok(read_bytes(
        &ws.input,
        args.usize_or("offset", 0),
        args.usize_or("length", 4),
        &args.str_or("format", "hex"),
    )
    .into())
}

fn define_field(ws: &mut HarnessWorkspace, args: &ToolArgs) -> Result<ToolOutput> {
    let offset = args.usize_or("offset", 0);
    let size = args.usize_or("size", 0);
    let field = DecodedField {
        name: args.str_or("name", "field"),
        field_type: args.str_or("field_type", "bytes"),
        offset,
        size,
        value: read_bytes(&ws.input, offset, size, "hex"),
        description: args.str_or("description", ""),
    };

    let message = format!(
        "Field defined: {} ({}) at offset {}, size {}",
        field.name, field.field_type, offset, size
    );
    ws.pending.push(field);
    Ok(message.into())
}

fn submit_format(ws: &mut HarnessWorkspace, args: &ToolArgs) -> Result<ToolOutput> {
    let format = InputFormat {
        format_id: ws.ids.next_id(),
        name: args.str_or("name", "unnamed"),
        fields: std::mem::take(&mut ws.pending),
        total_size: ws.input.len(),
        description: args.str_or("description", ""),
        created_at: unix_timestamp_f64(),
    };

    let message = format!(
        "Format submitted: {} with {} fields",
        format.name,
        format.fields.len()
    );
    ws.formats.push(format);
    Ok(message.into())
}

fn registry() -> ToolRegistry<HarnessWorkspace> {
    ToolRegistry::new()
        .with_fn(
            ToolSpec::new("get_input_context", "Get the raw input and harness code", vec![]),
            get_input_context,
        )
        .with_fn(
            ToolSpec::new(
                "read_bytes",
                "Read bytes from the input at a specific offset",
                vec![
                    ParamSpec::integer("offset", "Byte offset to start reading"),
                    ParamSpec::integer("length", "Number of bytes to read"),
                    ParamSpec::string("format", "Format: hex, uint32_le, uint16_le, int32_le, string, raw"),
                ],
            ),
            read_bytes_tool,
        )
        .with_fn(
            ToolSpec::new(
                "define_field",
                "Define a field in the input format",
                vec![
                    ParamSpec::string("name", "Field name"),
                    ParamSpec::string("field_type", "Type: uint32, uint16, uint8, int32, string, bytes, array"),
                    ParamSpec::integer("offset", "Byte offset"),
                    ParamSpec::integer("size", "Size in bytes"),
                    ParamSpec::string("description", "What this field represents"),
                ],
            ),
            define_field,
        )
        .with_fn(
            ToolSpec::new(
                "submit_format",
                "Submit the complete format specification",
                vec![
                    ParamSpec::string("name", "Format name"),
                    ParamSpec::string("description", "Overall format description"),
                ],
            ),
            submit_format,
        )
}

// =============================================================================
// Agent
// =============================================================================

const SYSTEM_PROMPT: &str = r#"<ROLE>
You are an expert at reverse engineering input formats for fuzzing harnesses.
</ROLE>

<OBJECTIVES>
1. Analyze raw input bytes and harness code
2. Identify the structure and meaning of input fields
3. Create a human-readable format specification
</OBJECTIVES>

## Look For
- Length prefixes (often first 2-4 bytes)
- Magic numbers/signatures
- Null-terminated strings
- Fixed-size fields (int32, int64, floats)
- Nested structures
- Arrays with count prefixes

Use the tools to decode and document the format."#;

pub struct HarnessDecoder {
    runtime: AgentRuntime<HarnessWorkspace>,
}

impl HarnessDecoder {
    pub const PROFILE: AgentProfile = AgentProfile {
        id: "harness_decoder",
        description: "Decodes the structure of fuzzing inputs",
        system_prompt: SYSTEM_PROMPT,
        temperature: 0.1,
    };

    pub fn new(gateway: Arc<ModelGateway>, options: AgentOptions) -> Self {
        Self {
            runtime: AgentRuntime::new(
                Self::PROFILE,
                gateway,
                registry(),
                HarnessWorkspace::default(),
                options,
            ),
        }
    }

    /// Layout of a single input, optionally guided by the harness source
    pub async fn decode_input(
        &mut self,
        input: &[u8],
        harness_code: &str,
    ) -> Result<Option<InputFormat>> {
        self.runtime.workspace_mut().stage(input, harness_code);

        let (harness_label, harness_body) = if harness_code.is_empty() {
            ("", "No harness code provided")
        } else {
            ("Harness code:", truncate_chars(harness_code, HARNESS_PROMPT_CHARS))
        };
        let prompt = format!(
            r#"Decode this fuzzing input and identify its structure:

Input (hex): {}
Input length: {} bytes

{}
```
{}
```

Instructions:
1. Use get_input_context to see the full input
2. Use read_bytes to examine specific parts
3. Use define_field for each field you identify
4. Use submit_format when done with the specification"#,
            hex::encode(input),
            input.len(),
            harness_label,
            harness_body
        );
        self.runtime.run(&prompt, None).await?;

        Ok(self.runtime.workspace().formats.last().cloned())
    }

    /// Common layout across several samples; byte reads target the first
    pub async fn infer_format(&mut self, samples: &[Vec<u8>]) -> Result<Option<InputFormat>> {
        let first = samples.first().map(Vec::as_slice).unwrap_or_default();
        self.runtime.workspace_mut().stage(first, "");

        let listing: Vec<String> = samples
            .iter()
            .take(MAX_INFER_SAMPLES)
            .enumerate()
            .map(|(i, s)| format!("Sample {}: {}", i + 1, hex::encode(s)))
            .collect();
        let prompt = format!(
            r#"Analyze these input samples to infer the format:

{}

Instructions:
1. Compare the samples to find common patterns
2. Identify fixed fields vs variable fields
3. Use define_field for each identified field
4. Use submit_format with your findings"#,
            listing.join("\n")
        );
        self.runtime.run(&prompt, None).await?;

        Ok(self.runtime.workspace().formats.last().cloned())
    }

    pub fn formats(&self) -> &[InputFormat] {
        &self.runtime.workspace().formats
    }
}

impl SecurityAgent for HarnessDecoder {
    type Workspace = HarnessWorkspace;

    fn runtime(&self) -> &AgentRuntime<HarnessWorkspace> {
        &self.runtime
    }

    fn results(&self) -> Value {
        let formats = &self.runtime.workspace().formats;
        json!({
            "formats": formats,
            "total_decoded": formats.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::{ScriptedBackend, gateway_with, text, tool_call};

    const SAMPLE: &[u8] = &[0x10, 0x00, 0x00, 0x00, 0xff, 0xff, b'h', b'i', 0x00, b'x'];

    #[test]
    fn test_read_bytes_encodings() {
        assert_eq!(read_bytes(SAMPLE, 0, 4, "uint32_le"), "16");
        assert_eq!(read_bytes(SAMPLE, 4, 2, "uint16_le"), "65535");
        assert_eq!(read_bytes(SAMPLE, 2, 4, "int32_le"), "-65536");
        assert_eq!(read_bytes(SAMPLE, 6, 4, "string"), "hi");
        assert_eq!(read_bytes(SAMPLE, 6, 2, "raw"), "6869");
        assert_eq!(read_bytes(SAMPLE, 8, 100, "hex"), "0078");
    }

    #[test]
    fn test_read_bytes_short_integer_falls_back_to_hex() {
        assert_eq!(read_bytes(SAMPLE, 8, 4, "uint32_le"), "0078");
    }

    #[test]
    fn test_read_bytes_offset_past_end() {
        assert_eq!(
            read_bytes(SAMPLE, 10, 1, "hex"),
            "Error: offset 10 beyond input length 10"
        );
    }

    #[tokio::test]
    async fn test_decode_input_collects_defined_fields() {
        let backend = ScriptedBackend::new(vec![
            ScriptedBackend::tool_calls(vec![
                ("get_input_context", json!({})),
                ("read_bytes", json!({"offset": 0, "length": 4, "format": "uint32_le"})),
            ]),
            ScriptedBackend::tool_calls(vec![
                (
                    "define_field",
                    json!({"name": "length", "field_type": "uint32", "offset": 0, "size": 4}),
                ),
                ("define_field", json!({"offset": 6, "size": 3})),
            ]),
            tool_call("submit_format", json!({"name": "tlv", "description": "length prefixed"})),
            text("Done."),
        ]);
        let mut agent = HarnessDecoder::new(gateway_with(backend.clone()), AgentOptions::default());

        let format = agent.decode_input(SAMPLE, "").await.unwrap().unwrap();

        assert_eq!(format.name, "tlv");
        assert_eq!(format.total_size, SAMPLE.len());
        assert_eq!(format.fields.len(), 2);
        assert_eq!(format.fields[0].value, "10000000");
        assert_eq!(format.fields[1].name, "field");
        assert_eq!(format.fields[1].field_type, "bytes");
        assert_eq!(format.fields[1].value, "686900");

        let calls = &agent.execution().tool_calls;
        let context: Value = serde_json::from_str(calls[0].result.as_deref().unwrap()).unwrap();
        assert_eq!(context["input_length"], 10);
        assert!(context["harness_code"].is_null());
        assert_eq!(calls[1].result.as_deref(), Some("16"));
        assert_eq!(
            calls[2].result.as_deref(),
            Some("Field defined: length (uint32) at offset 0, size 4")
        );
        assert_eq!(
            calls[4].result.as_deref(),
            Some("Format submitted: tlv with 2 fields")
        );

        let prompt = &backend.requests()[0].messages[1].content;
        assert!(prompt.contains("No harness code provided"));

        let serialized = serde_json::to_value(&format).unwrap();
        assert_eq!(serialized["fields"][0]["type"], "uint32");
    }

    #[tokio::test]
    async fn test_infer_format_lists_at_most_five_samples() {
        let backend = ScriptedBackend::new(vec![text("no common structure")]);
        let mut agent = HarnessDecoder::new(gateway_with(backend.clone()), AgentOptions::default());
        let samples: Vec<Vec<u8>> = (0..7u8).map(|b| vec![b, b]).collect();

        let format = agent.infer_format(&samples).await.unwrap();

        assert!(format.is_none());
        assert_eq!(agent.results()["total_decoded"], 0);
        let prompt = &backend.requests()[0].messages[1].content;
        assert!(prompt.contains("Sample 5: 0404"));
        assert!(!prompt.contains("Sample 6"));
    }
}
