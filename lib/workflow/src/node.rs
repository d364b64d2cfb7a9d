//! Workflow node types and configurations.
//!
//! Nodes are the building blocks of workflows. Each node has:
//! - A unique ID within the workflow
//! - A kind (trigger or action) with kind-specific configuration
//! - An editor canvas position, carried but ignored by execution

use amber_relay_core::CredentialId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use ulid::Ulid;

/// A unique identifier for a node within a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Ulid);

impl NodeId {
    /// Creates a new random node ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Creates a node ID from a ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node_{}", self.0)
    }
}

/// The type tag of a node, used for executor registry lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// User-initiated trigger.
    ManualTrigger,
    /// Google Form submission trigger.
    GoogleFormTrigger,
    /// Stripe webhook trigger.
    StripeTrigger,
    /// Outbound HTTP request action.
    HttpRequest,
    /// Google Gemini completion action.
    Gemini,
    /// OpenAI completion action.
    OpenAi,
    /// Anthropic completion action.
    Anthropic,
}

impl NodeType {
    /// Every known node type, in registry order.
    pub const ALL: [NodeType; 7] = [
        NodeType::ManualTrigger,
        NodeType::GoogleFormTrigger,
        NodeType::StripeTrigger,
        NodeType::HttpRequest,
        NodeType::Gemini,
        NodeType::OpenAi,
        NodeType::Anthropic,
    ];

    /// Returns the stable string tag for this type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManualTrigger => "manual_trigger",
            Self::GoogleFormTrigger => "google_form_trigger",
            Self::StripeTrigger => "stripe_trigger",
            Self::HttpRequest => "http_request",
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }

    /// Returns true if this type is a trigger (workflow entry point).
    #[must_use]
    pub fn is_trigger(&self) -> bool {
        matches!(
            self,
            Self::ManualTrigger | Self::GoogleFormTrigger | Self::StripeTrigger
        )
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP method for request nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Returns true for methods that carry a request body.
    #[must_use]
    pub fn has_body(&self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }

    /// Returns the method name as sent on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Configuration for an HTTP request node.
///
/// `endpoint` and `body` are templates resolved against the execution
/// context before the request is made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequestConfig {
    /// The context key the response is stored under. Empty or absent
    /// falls back to the `httpRequest` default key.
    #[serde(default)]
    pub variable_name: Option<String>,
    /// The endpoint URL template.
    pub endpoint: String,
    /// The HTTP method.
    #[serde(default)]
    pub method: HttpMethod,
    /// The request body template, required to resolve to valid JSON for
    /// write methods.
    #[serde(default)]
    pub body: Option<String>,
    /// Extra request headers. Values are templates resolved against the
    /// execution context.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Configuration for an LLM completion node (any provider).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// The context key the response is stored under. Empty or absent
    /// falls back to the `aiResponse` default key.
    #[serde(default)]
    pub variable_name: Option<String>,
    /// The stored credential holding the provider API key.
    pub credential_id: CredentialId,
    /// The model identifier (e.g. "gemini-1.5-flash").
    pub model: String,
    /// Optional system prompt template.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// The user prompt template.
    pub user_prompt: String,
}

/// A node's kind and configuration.
///
/// This is a tagged union over node types: each variant carries its own
/// strongly-typed configuration, so an executor never has to guess at the
/// shape of a dynamic config map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    /// User-initiated trigger. Carries no configuration; the seed context
    /// arrives with the execute event.
    ManualTrigger,
    /// Google Form submission trigger. Form answers arrive as seed context.
    GoogleFormTrigger,
    /// Stripe webhook trigger. The event payload arrives as seed context.
    StripeTrigger,
    /// Outbound HTTP request.
    HttpRequest(HttpRequestConfig),
    /// Google Gemini completion.
    Gemini(LlmConfig),
    /// OpenAI completion.
    OpenAi(LlmConfig),
    /// Anthropic completion.
    Anthropic(LlmConfig),
}

impl NodeKind {
    /// Returns the type tag of this kind.
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::ManualTrigger => NodeType::ManualTrigger,
            Self::GoogleFormTrigger => NodeType::GoogleFormTrigger,
            Self::StripeTrigger => NodeType::StripeTrigger,
            Self::HttpRequest(_) => NodeType::HttpRequest,
            Self::Gemini(_) => NodeType::Gemini,
            Self::OpenAi(_) => NodeType::OpenAi,
            Self::Anthropic(_) => NodeType::Anthropic,
        }
    }

    /// Returns the default context key results are merged under when the
    /// node has no configured variable name. Triggers produce no result
    /// of their own.
    #[must_use]
    pub fn default_variable_key(&self) -> Option<&'static str> {
        match self {
            Self::ManualTrigger | Self::GoogleFormTrigger | Self::StripeTrigger => None,
            Self::HttpRequest(_) => Some("httpRequest"),
            Self::Gemini(_) | Self::OpenAi(_) | Self::Anthropic(_) => Some("aiResponse"),
        }
    }
}

/// A node's position on the editor canvas.
///
/// Irrelevant to execution; carried so graph snapshots round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A workflow node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier for this node within the workflow.
    pub id: NodeId,
    /// Human-readable name for this node.
    pub name: String,
    /// Node kind and configuration.
    pub kind: NodeKind,
    /// Editor canvas position.
    #[serde(default)]
    pub position: Position,
}

impl Node {
    /// Creates a new node with the given kind.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: NodeId::new(),
            name: name.into(),
            kind,
            position: Position::default(),
        }
    }

    /// Creates a new node with a specific ID.
    #[must_use]
    pub fn with_id(id: NodeId, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            position: Position::default(),
        }
    }

    /// Returns the node's type tag.
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }
}
