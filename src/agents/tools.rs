//! Tool Declarations and Dispatch Targets
//!
//! A tool is a named, schema-declared callback the model may request during a
//! run. Each agent owns a [`ToolRegistry`] built once at construction; tools
//! mutate the agent's workspace through `&mut W`.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use tracing::warn;

use crate::ai::ToolDefinition;
use crate::types::{Result, ScoutError};

// =============================================================================
// Declarations
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    StringArray,
}

impl ParamKind {
    fn schema(&self) -> Value {
        match self {
            ParamKind::String => json!({"type": "string"}),
            ParamKind::Integer => json!({"type": "integer"}),
            ParamKind::Number => json!({"type": "number"}),
            ParamKind::Boolean => json!({"type": "boolean"}),
            ParamKind::StringArray => json!({"type": "array", "items": {"type": "string"}}),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub description: &'static str,
}

impl ParamSpec {
    pub const fn string(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::String,
            description,
        }
    }

    pub const fn integer(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Integer,
            description,
        }
    }

    pub const fn number(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Number,
            description,
        }
    }

    pub const fn boolean(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Boolean,
            description,
        }
    }

    pub const fn string_array(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::StringArray,
            description,
        }
    }
}

/// Name, description and parameters of one tool. Every parameter is declared
/// as required; handlers still apply defaults when the model omits one.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
}

impl ToolSpec {
    pub fn new(name: &'static str, description: &'static str, params: Vec<ParamSpec>) -> Self {
        Self {
            name,
            description,
            params,
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        let mut properties = Map::new();
        for param in &self.params {
            let mut schema = param.kind.schema();
            if let Some(obj) = schema.as_object_mut() {
                obj.insert("description".into(), Value::from(param.description));
            }
            properties.insert(param.name.to_string(), schema);
        }
        let required: Vec<&str> = self.params.iter().map(|p| p.name).collect();

        ToolDefinition {
            name: self.name.to_string(),
            description: self.description.to_string(),
            parameters: json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }
}

// =============================================================================
// Arguments
// =============================================================================

/// Parsed tool arguments with lenient typed accessors.
///
/// Models are sloppy about JSON types: numbers arrive as strings and vice
/// versa. The `*_or` accessors coerce where unambiguous and fall back to the
/// given default otherwise. The `require_*` accessors fail the call instead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs(Map<String, Value>);

impl ToolArgs {
    /// Parse a raw argument payload. Anything that is not a JSON object
    /// becomes an empty argument set.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Self(map),
            Ok(other) => {
                warn!("Tool arguments are not an object ({}), using empty set", other);
                Self::default()
            }
            Err(e) => {
                warn!("Tool arguments are not valid JSON, using empty set: {}", e);
                Self::default()
            }
        }
    }

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn opt_str(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// `opt_str` with blank strings treated as absent
    pub fn opt_non_empty(&self, key: &str) -> Option<String> {
        self.opt_str(key).filter(|s| !s.trim().is_empty())
    }

    pub fn str_or(&self, key: &str, default: &str) -> String {
        self.opt_str(key).unwrap_or_else(|| default.to_string())
    }

    pub fn opt_i64(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn i64_or(&self, key: &str, default: i64) -> i64 {
        self.opt_i64(key).unwrap_or(default)
    }

    /// Non-negative integer; negative values clamp to zero
    pub fn usize_or(&self, key: &str, default: usize) -> usize {
        self.opt_i64(key)
            .map(|v| v.max(0) as usize)
            .unwrap_or(default)
    }

    pub fn opt_f64(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn f64_or(&self, key: &str, default: f64) -> f64 {
        self.opt_f64(key).unwrap_or(default)
    }

    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => true,
                "false" | "no" | "0" => false,
                _ => default,
            },
            Some(Value::Number(n)) => n.as_i64().map(|v| v != 0).unwrap_or(default),
            _ => default,
        }
    }

    /// String list; a bare string becomes a single-element list
    pub fn string_list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect(),
            Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    pub fn require_str(&self, key: &str) -> Result<String> {
        self.opt_str(key)
            .ok_or_else(|| ScoutError::tool(format!("missing required argument '{}'", key)))
    }

    pub fn require_i64(&self, key: &str) -> Result<i64> {
        self.opt_i64(key).ok_or_else(|| {
            ScoutError::tool(format!("missing or non-integer argument '{}'", key))
        })
    }
}

// =============================================================================
// Tool Trait
// =============================================================================

/// Tool result placed back into the transcript
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Text(String),
    Json(Value),
}

impl ToolOutput {
    pub fn text(s: impl Into<String>) -> Self {
        ToolOutput::Text(s.into())
    }

    pub fn into_text(self) -> String {
        match self {
            ToolOutput::Text(s) => s,
            ToolOutput::Json(v) => v.to_string(),
        }
    }
}

impl From<String> for ToolOutput {
    fn from(s: String) -> Self {
        ToolOutput::Text(s)
    }
}

impl From<&str> for ToolOutput {
    fn from(s: &str) -> Self {
        ToolOutput::Text(s.to_string())
    }
}

#[async_trait]
pub trait Tool<W: Send>: Send + Sync {
    fn spec(&self) -> &ToolSpec;

    async fn invoke(&self, workspace: &mut W, args: &ToolArgs) -> Result<ToolOutput>;
}

/// Synchronous tool backed by a plain function
pub struct FnTool<W> {
    spec: ToolSpec,
    func: fn(&mut W, &ToolArgs) -> Result<ToolOutput>,
}

impl<W> FnTool<W> {
    pub fn new(spec: ToolSpec, func: fn(&mut W, &ToolArgs) -> Result<ToolOutput>) -> Self {
        Self { spec, func }
    }
}

#[async_trait]
impl<W: Send> Tool<W> for FnTool<W> {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn invoke(&self, workspace: &mut W, args: &ToolArgs) -> Result<ToolOutput> {
        (self.func)(workspace, args)
    }
}

// =============================================================================
// Registry
// =============================================================================

pub struct ToolRegistry<W> {
    tools: Vec<Box<dyn Tool<W>>>,
    index: HashMap<&'static str, usize>,
}

impl<W: Send + 'static> ToolRegistry<W> {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a tool; a later tool with the same name replaces the earlier one
    pub fn register(&mut self, tool: impl Tool<W> + 'static) {
        let name = tool.spec().name;
        match self.index.get(name) {
            Some(&pos) => {
                warn!(tool = name, "Replacing previously registered tool");
                self.tools[pos] = Box::new(tool);
            }
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(Box::new(tool));
            }
        }
    }

    pub fn with(mut self, tool: impl Tool<W> + 'static) -> Self {
        self.register(tool);
        self
    }

    /// Shorthand for a synchronous function tool
    pub fn with_fn(
        self,
        spec: ToolSpec,
        func: fn(&mut W, &ToolArgs) -> Result<ToolOutput>,
    ) -> Self {
        self.with(FnTool::new(spec, func))
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool<W>> {
        self.index.get(name).map(|&pos| self.tools[pos].as_ref())
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.spec().definition()).collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.spec().name).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl<W: Send + 'static> Default for ToolRegistry<W> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_marks_all_params_required() {
        let spec = ToolSpec::new(
            "read_source",
            "Read lines",
            vec![
                ParamSpec::integer("start_line", "first line"),
                ParamSpec::integer("end_line", "last line"),
                ParamSpec::string_array("tags", "labels"),
            ],
        );
        let def = spec.definition();
        assert_eq!(def.name, "read_source");
        assert_eq!(
            def.parameters["required"],
            json!(["start_line", "end_line", "tags"])
        );
        assert_eq!(def.parameters["properties"]["start_line"]["type"], "integer");
        assert_eq!(def.parameters["properties"]["tags"]["items"]["type"], "string");
        assert_eq!(
            def.parameters["properties"]["end_line"]["description"],
            "last line"
        );
    }

    #[test]
    fn test_parse_bad_json_is_empty() {
        assert!(ToolArgs::parse("{not json").is_empty());
        assert!(ToolArgs::parse("[1, 2]").is_empty());
        assert!(ToolArgs::parse("").is_empty());
        assert!(!ToolArgs::parse("{\"a\": 1}").is_empty());
    }

    #[test]
    fn test_lenient_accessors() {
        let args = ToolArgs::parse(
            r#"{"line": "42", "score": 7, "flag": "yes", "name": 3, "list": "one", "nothing": null}"#,
        );
        assert_eq!(args.i64_or("line", 0), 42);
        assert_eq!(args.f64_or("score", 0.0), 7.0);
        assert!(args.bool_or("flag", false));
        assert_eq!(args.str_or("name", ""), "3");
        assert_eq!(args.string_list("list"), vec!["one"]);
        assert_eq!(args.str_or("nothing", "fallback"), "fallback");
        assert_eq!(args.usize_or("missing", 9), 9);
    }

    #[test]
    fn test_require_reports_missing_key() {
        let args = ToolArgs::default();
        let err = args.require_str("pattern").unwrap_err();
        assert_eq!(err.to_string(), "missing required argument 'pattern'");
        assert!(args.require_i64("offset").is_err());
    }

    #[tokio::test]
    async fn test_registry_dispatch() {
        fn bump(count: &mut u32, args: &ToolArgs) -> Result<ToolOutput> {
            *count += args.i64_or("by", 1) as u32;
            Ok(ToolOutput::text(format!("now {}", count)))
        }

        let registry = ToolRegistry::new().with_fn(
            ToolSpec::new("bump", "Increment", vec![ParamSpec::integer("by", "step")]),
            bump,
        );
        assert_eq!(registry.names(), vec!["bump"]);
        assert!(registry.get("missing").is_none());

        let mut count = 0u32;
        let tool = registry.get("bump").unwrap();
        let out = tool
            .invoke(&mut count, &ToolArgs::parse(r#"{"by": 2}"#))
            .await
            .unwrap();
        assert_eq!(out.into_text(), "now 2");
        assert_eq!(count, 2);
    }

    #[test]
    fn test_json_output_serializes() {
        let out = ToolOutput::Json(json!({"ok": true}));
        assert_eq!(out.into_text(), r#"{"ok":true}"#);
    }
}
