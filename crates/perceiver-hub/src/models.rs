//! Data models for extraction and observation
use perception_core_types::{Locator, RequestId};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How page content is serialized for extraction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractStrategy {
    /// Viewport-sized DOM chunks, one model round per chunk
    #[default]
    DomChunks,

    /// Single pass over the page's reconstructed visual text layout
    TextLayout,
}

/// Options for one extract call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractOptions {
    /// Natural-language description of what to extract
    pub instruction: String,

    /// JSON schema the extracted data must follow
    pub schema: Value,

    /// Content extracted by an earlier call, refined rather than replaced
    #[serde(default)]
    pub prior: Option<Value>,

    #[serde(default)]
    pub strategy: ExtractStrategy,

    /// Restrict scanning/measuring to the subtree under this xpath
    #[serde(default)]
    pub root_xpath: Option<String>,

    /// Correlation token; generated when absent
    #[serde(default)]
    pub request_id: Option<RequestId>,
}

impl ExtractOptions {
    pub fn new(instruction: impl Into<String>, schema: Value) -> Self {
        Self {
            instruction: instruction.into(),
            schema,
            prior: None,
            strategy: ExtractStrategy::default(),
            root_xpath: None,
            request_id: None,
        }
    }

    pub fn with_strategy(mut self, strategy: ExtractStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_prior(mut self, prior: Value) -> Self {
        self.prior = Some(prior);
        self
    }

    pub fn with_root(mut self, xpath: impl Into<String>) -> Self {
        self.root_xpath = Some(xpath.into());
        self
    }

    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }
}

/// Outcome of an extract call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractResult {
    /// Schema-shaped data accumulated so far
    pub data: Value,

    /// The model considered the instruction satisfied
    pub completed: bool,

    /// Last progress note reported by the model
    pub progress: String,

    /// Chunks that went through a model round
    pub chunks_processed: usize,

    /// Chunks the scanner reported for the page
    pub chunks_total: usize,
}

impl ExtractResult {
    /// Result that hands prior content back untouched.
    pub fn passthrough(prior: Option<Value>) -> Self {
        Self {
            data: prior.unwrap_or(Value::Null),
            completed: false,
            progress: String::new(),
            chunks_processed: 0,
            chunks_total: 0,
        }
    }
}

/// Typed view of an extract call
#[derive(Debug, Clone)]
pub struct TypedExtract<T> {
    pub data: T,
    pub completed: bool,
    pub progress: String,
}

/// Options for one observe call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserveOptions {
    pub instruction: String,

    /// Ask for a method name and arguments per element
    #[serde(default)]
    pub want_action: bool,

    /// Serialize the accessibility tree instead of DOM-indexed text
    #[serde(default)]
    pub use_accessibility_tree: Option<bool>,

    #[serde(default)]
    pub root_xpath: Option<String>,

    #[serde(default)]
    pub request_id: Option<RequestId>,
}

impl ObserveOptions {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            want_action: false,
            use_accessibility_tree: None,
            root_xpath: None,
            request_id: None,
        }
    }

    pub fn with_action(mut self) -> Self {
        self.want_action = true;
        self
    }

    pub fn with_accessibility_tree(mut self, enabled: bool) -> Self {
        self.use_accessibility_tree = Some(enabled);
        self
    }

    pub fn with_root(mut self, xpath: impl Into<String>) -> Self {
        self.root_xpath = Some(xpath.into());
        self
    }

    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }
}

/// One grounded element returned by observe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationResult {
    /// Identifier the model chose (candidate index or accessibility node id)
    pub identifier: String,

    pub description: String,

    /// Where the element lives in the current page
    pub locator: Locator,

    /// Suggested interaction, only in action mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,
}

/// Validated `extract` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractOutput {
    pub data: Value,
    #[serde(default, alias = "progressNote", alias = "progress_note")]
    pub progress: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineOutput {
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionOutput {
    pub completed: bool,
    #[serde(default, alias = "progressNote", alias = "progress_note")]
    pub progress: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserveOutput {
    pub elements: Vec<ObservedElement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservedElement {
    #[serde(alias = "elementId", alias = "element_id", deserialize_with = "string_or_number")]
    pub identifier: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default, alias = "args")]
    pub arguments: Vec<Value>,
}

impl ObservedElement {
    /// Arguments rendered as strings; models sometimes emit numbers or booleans.
    pub fn argument_strings(&self) -> Vec<String> {
        self.arguments
            .iter()
            .map(|arg| match arg {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect()
    }
}

/// Structural checks serde cannot express.
pub trait ModelOutput {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

impl ModelOutput for ExtractOutput {
    fn validate(&self) -> Result<(), String> {
        if self.data.is_null() {
            return Err("missing `data`".to_string());
        }
        Ok(())
    }
}

impl ModelOutput for RefineOutput {
    fn validate(&self) -> Result<(), String> {
        if self.data.is_null() {
            return Err("missing `data`".to_string());
        }
        Ok(())
    }
}

impl ModelOutput for CompletionOutput {}

impl ModelOutput for ObserveOutput {
    fn validate(&self) -> Result<(), String> {
        if self
            .elements
            .iter()
            .any(|element| element.identifier.trim().is_empty())
        {
            return Err("element without identifier".to_string());
        }
        Ok(())
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(text.trim().to_string()),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(de::Error::custom(format!(
            "expected string or number identifier, got {other}"
        ))),
    }
}
