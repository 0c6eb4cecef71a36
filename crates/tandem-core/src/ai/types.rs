//! Unified chat types shared by every provider adapter
//!
//! Adapters translate vendor wire formats into [`ResponseEvent`]s and encode
//! [`ChatRequest`]s back out. Nothing in here is vendor specific.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ordered key/value argument mapping of a tool call
pub type Arguments = Map<String, Value>;

/// Opaque vendor pass-through data, round-tripped without interpretation
pub type Metadata = BTreeMap<String, String>;

/// Metadata key naming the tool that produced a result
pub const META_TOOL_NAME: &str = "toolName";
/// Metadata key for Gemini's continuation token
pub const META_THOUGHT_SIGNATURE: &str = "thoughtSignature";

pub const DEFAULT_MAX_TOKENS: u32 = 8192;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Message role in a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub arguments: Arguments,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

impl ToolCallRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Outcome of one tool call, fed back to the model
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolResultRecord {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

impl ToolResultRecord {
    /// Build a result for `call`, carrying its metadata plus the tool name
    pub fn for_call(call: &ToolCallRecord, content: impl Into<String>, is_error: bool) -> Self {
        let mut metadata = call.metadata.clone();
        metadata.insert(META_TOOL_NAME.to_string(), call.name.clone());
        Self {
            tool_call_id: call.id.clone(),
            content: content.into(),
            is_error,
            metadata,
        }
    }

    pub fn tool_name(&self) -> Option<&str> {
        self.metadata.get(META_TOOL_NAME).map(String::as_str)
    }
}

/// One entry of the conversation history.
///
/// Fields are private so the role invariants hold: a tool message always
/// carries exactly one result, and only assistant messages carry tool calls.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatMessage {
    role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ToolCallRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_result: Option<ToolResultRecord>,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self::text(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    /// Assistant turn with optional text and zero or more tool calls
    pub fn assistant(content: Option<String>, tool_calls: Vec<ToolCallRecord>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.filter(|c| !c.is_empty()),
            tool_calls,
            tool_result: None,
        }
    }

    pub fn tool(result: ToolResultRecord) -> Self {
        Self {
            role: Role::Tool,
            content: None,
            tool_calls: Vec::new(),
            tool_result: Some(result),
        }
    }

    fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(text.into()),
            tool_calls: Vec::new(),
            tool_result: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn tool_calls(&self) -> &[ToolCallRecord] {
        &self.tool_calls
    }

    pub fn tool_result(&self) -> Option<&ToolResultRecord> {
        self.tool_result.as_ref()
    }
}

/// A single provider call. Built once, never mutated by adapters.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub system_prompt: Option<String>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            system_prompt: None,
            tools: Vec::new(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            stream: true,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

/// Finish reasons for model generation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Other(String),
}

impl FinishReason {
    /// Map the vendor spellings onto one set of reasons
    pub fn parse(raw: &str) -> Self {
        match raw {
            "stop" | "end_turn" | "stop_sequence" | "STOP" => Self::Stop,
            "length" | "max_tokens" | "MAX_TOKENS" => Self::Length,
            "tool_calls" | "tool_use" | "function_call" => Self::ToolCalls,
            "content_filter" | "SAFETY" | "RECITATION" | "refusal" => Self::ContentFilter,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Events produced by every adapter, in wire order.
///
/// A stream ends with exactly one `Done` or one `Error`.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEvent {
    TextDelta {
        text: String,
        metadata: Metadata,
    },
    ToolCall(ToolCallRecord),
    Done {
        usage: Option<TokenUsage>,
        finish_reason: Option<FinishReason>,
    },
    Error {
        message: String,
        code: Option<String>,
        retryable: bool,
    },
}

impl ResponseEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta {
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn error(message: impl Into<String>, code: Option<&str>, retryable: bool) -> Self {
        Self::Error {
            message: message.into(),
            code: code.map(str::to_string),
            retryable,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

/// JSON-schema primitive types understood by all three vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    /// Case-insensitive; `None` for `null` and unknown names
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "array" => Some(Self::Array),
            "object" => Some(Self::Object),
            _ => None,
        }
    }
}

/// A named property of an object schema
#[derive(Debug, Clone, PartialEq)]
pub struct ToolParameter {
    pub name: String,
    pub schema: ParamSchema,
}

/// Schema of a single value: type, prose, and enum / array-item constraints
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSchema {
    pub kind: ParamType,
    pub description: Option<String>,
    pub enum_values: Vec<String>,
    pub default: Option<Value>,
    pub items: Option<Box<ParamSchema>>,
    pub properties: Vec<ToolParameter>,
    pub required: Vec<String>,
}

impl ParamSchema {
    fn of(kind: ParamType, description: Option<&str>) -> Self {
        Self {
            kind,
            description: description.map(str::to_string),
            enum_values: Vec::new(),
            default: None,
            items: None,
            properties: Vec::new(),
            required: Vec::new(),
        }
    }

    pub fn string(description: &str) -> Self {
        Self::of(ParamType::String, Some(description))
    }

    pub fn integer(description: &str) -> Self {
        Self::of(ParamType::Integer, Some(description))
    }

    pub fn number(description: &str) -> Self {
        Self::of(ParamType::Number, Some(description))
    }

    pub fn boolean(description: &str) -> Self {
        Self::of(ParamType::Boolean, Some(description))
    }

    pub fn array(description: &str, items: ParamSchema) -> Self {
        let mut schema = Self::of(ParamType::Array, Some(description));
        schema.items = Some(Box::new(items));
        schema
    }

    /// An object with no description, used for top-level tool inputs and array items
    pub fn object() -> Self {
        Self::of(ParamType::Object, None)
    }

    pub fn with_enum(mut self, values: &[&str]) -> Self {
        self.enum_values = values.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn property(mut self, name: &str, schema: ParamSchema, required: bool) -> Self {
        if required {
            self.required.push(name.to_string());
        }
        self.properties.push(ToolParameter {
            name: name.to_string(),
            schema,
        });
        self
    }

    /// Read a JSON-schema object, keeping only what the vendors understand.
    ///
    /// A missing or unknown `type` falls back to `string`, except that a schema
    /// with `properties` is an object. Union types such as `["string", "null"]`
    /// take their first non-null member.
    pub fn from_json_schema(value: &Value) -> Self {
        let has_properties = value.get("properties").is_some_and(Value::is_object);
        let kind = match value.get("type") {
            Some(Value::String(name)) => ParamType::parse(name),
            Some(Value::Array(names)) => names.iter().filter_map(Value::as_str).find_map(ParamType::parse),
            _ => None,
        }
        .unwrap_or(if has_properties {
            ParamType::Object
        } else {
            ParamType::String
        });

        let mut schema = Self::of(
            kind,
            value.get("description").and_then(Value::as_str),
        );
        if let Some(values) = value.get("enum").and_then(Value::as_array) {
            schema.enum_values = values
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
        }
        schema.default = value.get("default").cloned();
        if kind == ParamType::Array {
            let items = value
                .get("items")
                .map(Self::from_json_schema)
                .unwrap_or_else(|| Self::of(ParamType::String, None));
            schema.items = Some(Box::new(items));
        }
        if kind == ParamType::Object {
            if let Some(properties) = value.get("properties").and_then(Value::as_object) {
                schema.properties = properties
                    .iter()
                    .map(|(name, prop)| ToolParameter {
                        name: name.clone(),
                        schema: Self::from_json_schema(prop),
                    })
                    .collect();
            }
            if let Some(required) = value.get("required").and_then(Value::as_array) {
                schema.required = required
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|name| schema.properties.iter().any(|p| p.name == *name))
                    .map(str::to_string)
                    .collect();
            }
        }
        schema
    }

    /// Render as a JSON-schema object. Gemini wants uppercased type names.
    pub fn to_json(&self, uppercase_types: bool) -> Value {
        let mut out = Map::new();
        let kind = if uppercase_types {
            self.kind.as_str().to_uppercase()
        } else {
            self.kind.as_str().to_string()
        };
        out.insert("type".to_string(), Value::String(kind));
        if let Some(description) = &self.description {
            out.insert(
                "description".to_string(),
                Value::String(description.clone()),
            );
        }
        if !self.enum_values.is_empty() {
            out.insert(
                "enum".to_string(),
                Value::Array(
                    self.enum_values
                        .iter()
                        .cloned()
                        .map(Value::String)
                        .collect(),
                ),
            );
        }
        if let Some(default) = &self.default {
            out.insert("default".to_string(), default.clone());
        }
        if let Some(items) = &self.items {
            out.insert("items".to_string(), items.to_json(uppercase_types));
        }
        if self.kind == ParamType::Object {
            let properties: Map<String, Value> = self
                .properties
                .iter()
                .map(|p| (p.name.clone(), p.schema.to_json(uppercase_types)))
                .collect();
            out.insert("properties".to_string(), Value::Object(properties));
            if !self.required.is_empty() {
                out.insert(
                    "required".to_string(),
                    Value::Array(self.required.iter().cloned().map(Value::String).collect()),
                );
            }
        }
        Value::Object(out)
    }
}

/// Static description of a tool, used for vendor schemas and confirmation prompts
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: ParamSchema,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: ParamSchema::object(),
        }
    }

    pub fn required(mut self, name: &str, schema: ParamSchema) -> Self {
        self.parameters = self.parameters.property(name, schema, true);
        self
    }

    pub fn optional(mut self, name: &str, schema: ParamSchema) -> Self {
        self.parameters = self.parameters.property(name, schema, false);
        self
    }

    pub fn input_schema(&self) -> Value {
        self.parameters.to_json(false)
    }

    pub fn parameter(&self, name: &str) -> Option<&ParamSchema> {
        self.parameters
            .properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.schema)
    }
}
