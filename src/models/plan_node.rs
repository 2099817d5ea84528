//! Plan nodes: the typed, user-authored execution tree.
//!
//! A plan node is immutable for the duration of a run. Fields that may depend
//! on run state are [`DynamicValue`]s resolved against the current bindings
//! through an [`ExpressionEvaluator`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::constants::{NAME_ATTRIBUTE, UNNAMED_NODE};
use crate::error::{Result, StepperError};
use crate::services::expression::{Bindings, ExpressionEvaluator};

/// Either a literal value or an expression evaluated at execution time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DynamicValue<T> {
    Expression { expression: String },
    Value(T),
}

impl<T> DynamicValue<T>
where
    T: DeserializeOwned + Clone,
{
    pub fn expression(expression: impl Into<String>) -> Self {
        Self::Expression {
            expression: expression.into(),
        }
    }

    pub fn resolve(&self, evaluator: &dyn ExpressionEvaluator, bindings: &Bindings) -> Result<T> {
        match self {
            Self::Value(value) => Ok(value.clone()),
            Self::Expression { expression } => {
                let value = evaluator.evaluate(expression, bindings)?;
                // Run variables arrive as strings, e.g. "true" or "10"
                let typed = serde_json::from_value(value.clone()).or_else(|e| match &value {
                    Value::String(raw) => serde_json::from_str(raw).map_err(|_| e),
                    _ => Err(e),
                });
                typed.map_err(|e| {
                    StepperError::expression(
                        expression.clone(),
                        format!("unexpected result {value}: {e}"),
                    )
                })
            }
        }
    }
}

impl<T> From<T> for DynamicValue<T> {
    fn from(value: T) -> Self {
        Self::Value(value)
    }
}

/// Resolve every `{"dynamic": true, "expression": "..."}` object nested in a JSON document
pub fn resolve_dynamic_json(
    value: &Value,
    evaluator: &dyn ExpressionEvaluator,
    bindings: &Bindings,
) -> Result<Value> {
    match value {
        Value::Object(map) => {
            let is_dynamic = map.get("dynamic").and_then(Value::as_bool).unwrap_or(false);
            if is_dynamic {
                if let Some(Value::String(expression)) = map.get("expression") {
                    return evaluator.evaluate(expression, bindings);
                }
            }
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (key, entry) in map {
                resolved.insert(key.clone(), resolve_dynamic_json(entry, evaluator, bindings)?);
            }
            Ok(Value::Object(resolved))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_dynamic_json(item, evaluator, bindings))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

/// Tag of a [`NodeKind`], used as the handler registry key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Sequence,
    ForLoop,
    Session,
    CallFunction,
    Echo,
    Set,
    Check,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequence => write!(f, "sequence"),
            Self::ForLoop => write!(f, "for_loop"),
            Self::Session => write!(f, "session"),
            Self::CallFunction => write!(f, "call_function"),
            Self::Echo => write!(f, "echo"),
            Self::Set => write!(f, "set"),
            Self::Check => write!(f, "check"),
        }
    }
}

/// Numeric loop: `start..=end` stepping by `increment`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForLoopSpec {
    pub start: DynamicValue<i64>,
    pub end: DynamicValue<i64>,
    #[serde(default = "default_increment")]
    pub increment: DynamicValue<i64>,
    #[serde(default = "default_counter_variable")]
    pub counter_variable: String,
    /// Stop iterating once this many iterations failed
    #[serde(default)]
    pub max_failed_loops: Option<DynamicValue<i64>>,
}

fn default_increment() -> DynamicValue<i64> {
    DynamicValue::Value(1)
}

fn default_counter_variable() -> String {
    "counter".to_string()
}

/// How a dispatch node finds the function to call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionReference {
    Id(String),
    Attributes(HashMap<String, DynamicValue<String>>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallFunctionSpec {
    pub function: FunctionReference,
    /// Call payload; nested dynamic objects are resolved before the call
    #[serde(default = "empty_object")]
    pub argument: Value,
    /// Call-site routing criteria, all mandatory
    #[serde(default)]
    pub routing_criteria: HashMap<String, DynamicValue<String>>,
    /// Run variable (map or data set) receiving the output payload
    #[serde(default)]
    pub result_variable: Option<String>,
    /// `false` forces execution on a local token
    #[serde(default = "default_remote")]
    pub remote: DynamicValue<bool>,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

fn default_remote() -> DynamicValue<bool> {
    DynamicValue::Value(true)
}

/// Node variants shipped with the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Sequence {
        #[serde(default)]
        continue_on_error: Option<DynamicValue<bool>>,
    },
    ForLoop(ForLoopSpec),
    /// Groups remote-worker token leases for its subtree
    Session {
        #[serde(default)]
        routing_criteria: HashMap<String, DynamicValue<String>>,
    },
    CallFunction(CallFunctionSpec),
    Echo {
        text: DynamicValue<Value>,
    },
    Set {
        key: String,
        value: DynamicValue<Value>,
    },
    Check {
        expression: DynamicValue<bool>,
    },
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Sequence { .. } => NodeType::Sequence,
            Self::ForLoop(_) => NodeType::ForLoop,
            Self::Session { .. } => NodeType::Session,
            Self::CallFunction(_) => NodeType::CallFunction,
            Self::Echo { .. } => NodeType::Echo,
            Self::Set { .. } => NodeType::Set,
            Self::Check { .. } => NodeType::Check,
        }
    }
}

/// A node of a plan tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanNode {
    /// Stable across runs
    #[serde(default = "new_node_id")]
    pub id: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(flatten)]
    pub kind: NodeKind,
    /// Order is significant for container kinds
    #[serde(default)]
    pub children: Vec<PlanNode>,
    #[serde(default)]
    pub create_skeleton: bool,
    #[serde(default = "default_true")]
    pub persist_node: bool,
    #[serde(default = "default_skip")]
    pub skip_node: DynamicValue<bool>,
    /// Overrides the container's continue-on-error policy after this node fails
    #[serde(default)]
    pub continue_parent_on_error: Option<DynamicValue<bool>>,
    /// Auxiliary configuration child, run around the body of its parent
    #[serde(default)]
    pub property: bool,
    #[serde(default)]
    pub attachments: Vec<PathBuf>,
}

fn new_node_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_true() -> bool {
    true
}

fn default_skip() -> DynamicValue<bool> {
    DynamicValue::Value(false)
}

impl PlanNode {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        let mut attributes = HashMap::new();
        attributes.insert(NAME_ATTRIBUTE.to_string(), name.into());
        Self {
            id: new_node_id(),
            attributes,
            kind,
            children: Vec::new(),
            create_skeleton: false,
            persist_node: true,
            skip_node: default_skip(),
            continue_parent_on_error: None,
            property: false,
            attachments: Vec::new(),
        }
    }

    pub fn sequence(name: impl Into<String>) -> Self {
        Self::new(
            name,
            NodeKind::Sequence {
                continue_on_error: None,
            },
        )
    }

    pub fn name(&self) -> &str {
        self.attributes
            .get(NAME_ATTRIBUTE)
            .map(String::as_str)
            .unwrap_or(UNNAMED_NODE)
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_child(mut self, child: PlanNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = PlanNode>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn with_create_skeleton(mut self, create_skeleton: bool) -> Self {
        self.create_skeleton = create_skeleton;
        self
    }

    pub fn with_persist_node(mut self, persist_node: bool) -> Self {
        self.persist_node = persist_node;
        self
    }

    pub fn with_skip_node(mut self, skip_node: DynamicValue<bool>) -> Self {
        self.skip_node = skip_node;
        self
    }

    pub fn with_continue_parent_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_parent_on_error = Some(DynamicValue::Value(continue_on_error));
        self
    }

    pub fn as_property(mut self) -> Self {
        self.property = true;
        self
    }

    pub fn with_attachment(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachments.push(path.into());
        self
    }

    /// Children executed as steps of the body
    pub fn step_children(&self) -> impl Iterator<Item = &PlanNode> {
        self.children.iter().filter(|c| !c.property)
    }

    pub fn property_children(&self) -> impl Iterator<Item = &PlanNode> {
        self.children.iter().filter(|c| c.property)
    }
}

/// A stored plan: a named root node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    pub root: PlanNode,
}

impl Plan {
    pub fn new(name: impl Into<String>, root: PlanNode) -> Self {
        let mut attributes = HashMap::new();
        attributes.insert(NAME_ATTRIBUTE.to_string(), name.into());
        Self {
            id: new_node_id(),
            attributes,
            root,
        }
    }

    pub fn name(&self) -> &str {
        self.attributes
            .get(NAME_ATTRIBUTE)
            .map(String::as_str)
            .unwrap_or(UNNAMED_NODE)
    }
}
