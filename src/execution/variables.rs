//! Scoped run variables.
//!
//! Every report node owns a scope. Lookups walk from a scope up through its
//! ancestors, so values set inside one subtree never leak into its siblings.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Result, StepperError};
use crate::routing::session::SessionContext;
use crate::services::expression::Bindings;

/// Tabular sink a function output can be drained into
pub trait DataSetSink: Send + Sync {
    fn add_row(&self, row: HashMap<String, String>) -> Result<()>;
}

/// Data set collecting rows in memory
#[derive(Debug, Default)]
pub struct InMemoryDataSet {
    rows: Mutex<Vec<HashMap<String, String>>>,
}

impl InMemoryDataSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<HashMap<String, String>> {
        self.rows.lock().clone()
    }
}

impl DataSetSink for InMemoryDataSet {
    fn add_row(&self, row: HashMap<String, String>) -> Result<()> {
        self.rows.lock().push(row);
        Ok(())
    }
}

/// Runtime value of a variable
#[derive(Clone)]
pub enum VariableValue {
    Json(Value),
    /// Open remote-worker session
    Session(Arc<SessionContext>),
    /// Mutable string map shared with the plan author
    Map(Arc<Mutex<HashMap<String, String>>>),
    DataSink(Arc<dyn DataSetSink>),
    File(PathBuf),
}

impl VariableValue {
    pub fn new_map() -> Self {
        Self::Map(Arc::new(Mutex::new(HashMap::new())))
    }

    /// Representation visible to expressions, if any
    pub fn to_json(&self) -> Option<Value> {
        match self {
            Self::Json(value) => Some(value.clone()),
            Self::File(path) => Some(Value::String(path.display().to_string())),
            Self::Map(map) => Some(Value::Object(
                map.lock()
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            )),
            Self::Session(_) | Self::DataSink(_) => None,
        }
    }
}

impl fmt::Debug for VariableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(value) => write!(f, "Json({value})"),
            Self::Session(_) => write!(f, "Session"),
            Self::Map(map) => write!(f, "Map({:?})", map.lock()),
            Self::DataSink(_) => write!(f, "DataSink"),
            Self::File(path) => write!(f, "File({})", path.display()),
        }
    }
}

impl From<Value> for VariableValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<&str> for VariableValue {
    fn from(value: &str) -> Self {
        Self::Json(Value::String(value.to_string()))
    }
}

impl From<String> for VariableValue {
    fn from(value: String) -> Self {
        Self::Json(Value::String(value))
    }
}

#[derive(Debug, Default)]
struct Scope {
    parent: Option<String>,
    variables: HashMap<String, VariableValue>,
}

#[derive(Debug, Default)]
pub struct VariablesManager {
    scopes: Mutex<HashMap<String, Scope>>,
}

impl VariablesManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a scope and its parent. Reopening keeps existing values.
    pub fn open_scope(&self, scope_id: &str, parent_id: Option<&str>) {
        let mut scopes = self.scopes.lock();
        let scope = scopes.entry(scope_id.to_string()).or_default();
        scope.parent = parent_id.map(str::to_string);
    }

    pub fn put(&self, scope_id: &str, key: impl Into<String>, value: impl Into<VariableValue>) {
        self.scopes
            .lock()
            .entry(scope_id.to_string())
            .or_default()
            .variables
            .insert(key.into(), value.into());
    }

    /// Nearest definition of `key` starting at `scope_id`
    pub fn get(&self, scope_id: &str, key: &str) -> Option<VariableValue> {
        let scopes = self.scopes.lock();
        let mut current = Some(scope_id);
        while let Some(id) = current {
            let scope = scopes.get(id)?;
            if let Some(value) = scope.variables.get(key) {
                return Some(value.clone());
            }
            current = scope.parent.as_deref();
        }
        None
    }

    pub fn get_as_string(&self, scope_id: &str, key: &str) -> Option<String> {
        self.get(scope_id, key).and_then(|value| match value {
            VariableValue::Json(Value::String(s)) => Some(s),
            other => other.to_json().map(|json| json.to_string()),
        })
    }

    pub fn get_as_bool(&self, scope_id: &str, key: &str, default: bool) -> Result<bool> {
        match self.get(scope_id, key) {
            None => Ok(default),
            Some(VariableValue::Json(Value::Bool(b))) => Ok(b),
            Some(VariableValue::Json(Value::String(s))) => s.trim().parse::<bool>().map_err(|_| {
                StepperError::Validation(format!("variable '{key}' is not a boolean: {s}"))
            }),
            Some(other) => Err(StepperError::Validation(format!(
                "variable '{key}' is not a boolean: {other:?}"
            ))),
        }
    }

    pub fn get_as_int(&self, scope_id: &str, key: &str, default: i64) -> Result<i64> {
        match self.get(scope_id, key) {
            None => Ok(default),
            Some(VariableValue::Json(Value::Number(n))) => n.as_i64().ok_or_else(|| {
                StepperError::Validation(format!("variable '{key}' is not an integer: {n}"))
            }),
            Some(VariableValue::Json(Value::String(s))) => s.trim().parse::<i64>().map_err(|_| {
                StepperError::Validation(format!("variable '{key}' is not an integer: {s}"))
            }),
            Some(other) => Err(StepperError::Validation(format!(
                "variable '{key}' is not an integer: {other:?}"
            ))),
        }
    }

    /// Replace the value in the scope that defines `key`. Returns false when undefined.
    pub fn update(&self, scope_id: &str, key: &str, value: impl Into<VariableValue>) -> bool {
        let mut scopes = self.scopes.lock();
        let mut current = Some(scope_id.to_string());
        while let Some(id) = current {
            let Some(scope) = scopes.get_mut(&id) else {
                return false;
            };
            if let Some(slot) = scope.variables.get_mut(key) {
                *slot = value.into();
                return true;
            }
            current = scope.parent.clone();
        }
        false
    }

    /// Remove `key` from this scope only
    pub fn remove(&self, scope_id: &str, key: &str) -> Option<VariableValue> {
        self.scopes
            .lock()
            .get_mut(scope_id)
            .and_then(|scope| scope.variables.remove(key))
    }

    pub fn release_scope(&self, scope_id: &str) {
        self.scopes.lock().remove(scope_id);
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.lock().len()
    }

    /// Expression bindings seen from `scope_id`, nearer scopes shadowing outer ones
    pub fn bindings(&self, scope_id: &str) -> Bindings {
        let scopes = self.scopes.lock();
        let mut chain = Vec::new();
        let mut current = Some(scope_id);
        while let Some(id) = current {
            let Some(scope) = scopes.get(id) else {
                break;
            };
            chain.push(scope);
            current = scope.parent.as_deref();
        }

        let mut bindings = Bindings::new();
        for scope in chain.into_iter().rev() {
            for (key, value) in &scope.variables {
                if let Some(json) = value.to_json() {
                    bindings.insert(key.clone(), json);
                }
            }
        }
        bindings
    }

    /// Variable names with the given prefix and their string values, as seen from `scope_id`
    pub fn with_prefix(&self, scope_id: &str, prefix: &str) -> Vec<(String, String)> {
        self.bindings(scope_id)
            .into_iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .filter_map(|(key, value)| match value {
                Value::Null => None,
                Value::String(s) => Some((key, s)),
                other => Some((key, other.to_string())),
            })
            .collect()
    }
}
