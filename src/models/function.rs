//! Dispatchable units of work and the values exchanged with remote workers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::constants::NAME_ATTRIBUTE;

/// A function ("keyword") that can be dispatched to a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub id: String,
    /// Selection attributes, at least `name`
    pub attributes: HashMap<String, String>,
    /// Key into the function type registry
    #[serde(default)]
    pub function_type: String,
    /// JSON schema of the expected input
    #[serde(default)]
    pub schema: Option<Value>,
    #[serde(default)]
    pub requires_local_execution: bool,
    /// Attribute name to value pattern; every entry is a mandatory routing criterion
    #[serde(default)]
    pub token_selection_criteria: HashMap<String, String>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        let mut attributes = HashMap::new();
        attributes.insert(NAME_ATTRIBUTE.to_string(), name.into());
        Self {
            id: Uuid::new_v4().to_string(),
            attributes,
            function_type: String::new(),
            schema: None,
            requires_local_execution: false,
            token_selection_criteria: HashMap::new(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.attributes.get(NAME_ATTRIBUTE).map(String::as_str)
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_local_execution(mut self) -> Self {
        self.requires_local_execution = true;
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_token_criterion(
        mut self,
        attribute: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Self {
        self.token_selection_criteria
            .insert(attribute.into(), pattern.into());
        self
    }
}

/// Lease handle to a worker, owned by the token broker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    /// In-process token
    pub local: bool,
    /// Advertised attributes used for affinity scoring
    pub attributes: HashMap<String, String>,
    pub agent_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Legitimate failure reported by the function, maps to FAILED
    Business,
    /// Infrastructure or unexpected failure, maps to TECHNICAL_ERROR
    Technical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Attachment produced by a function call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub name: String,
    pub begin: DateTime<Utc>,
    pub duration_ms: i64,
    #[serde(default)]
    pub data: HashMap<String, Value>,
}

/// Result of a remote call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Output {
    pub payload: Option<Value>,
    pub error: Option<FunctionError>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub measures: Vec<Measure>,
}

impl Output {
    pub fn passed(payload: Value) -> Self {
        Self {
            payload: Some(payload),
            ..Default::default()
        }
    }

    pub fn business_error(message: impl Into<String>) -> Self {
        Self {
            error: Some(FunctionError {
                kind: ErrorKind::Business,
                message: message.into(),
            }),
            ..Default::default()
        }
    }

    pub fn technical_error(message: impl Into<String>) -> Self {
        Self {
            error: Some(FunctionError {
                kind: ErrorKind::Technical,
                message: message.into(),
            }),
            ..Default::default()
        }
    }
}

/// Identifies who holds a token while it is leased
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenOwner {
    pub run_id: String,
    pub report_node_id: String,
    pub description: Option<String>,
}
