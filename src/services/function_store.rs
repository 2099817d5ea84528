use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;

use crate::error::Result;
use crate::models::Function;
use crate::routing::criteria::SelectionCriteria;

#[async_trait]
pub trait FunctionStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Function>>;

    /// Functions whose attributes contain every given attribute
    async fn find_by_attributes(&self, attributes: &HashMap<String, String>)
        -> Result<Vec<Function>>;
}

/// Function types can contribute their own routing criteria
pub trait FunctionTypeRegistry: Send + Sync {
    fn token_selection_criteria(&self, function: &Function) -> SelectionCriteria;
}

#[derive(Debug, Default)]
pub struct InMemoryFunctionStore {
    functions: DashMap<String, Function>,
}

impl InMemoryFunctionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&self, function: Function) {
        self.functions.insert(function.id.clone(), function);
    }
}

#[async_trait]
impl FunctionStore for InMemoryFunctionStore {
    async fn get(&self, id: &str) -> Result<Option<Function>> {
        Ok(self.functions.get(id).map(|entry| entry.value().clone()))
    }

    async fn find_by_attributes(
        &self,
        attributes: &HashMap<String, String>,
    ) -> Result<Vec<Function>> {
        let mut matches: Vec<Function> = self
            .functions
            .iter()
            .filter(|entry| {
                attributes
                    .iter()
                    .all(|(key, value)| entry.attributes.get(key) == Some(value))
            })
            .map(|entry| entry.value().clone())
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matches)
    }
}

/// Registry mapping a function type name to the criteria that type requires
#[derive(Debug, Default)]
pub struct StaticFunctionTypeRegistry {
    criteria: HashMap<String, SelectionCriteria>,
}

impl StaticFunctionTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, function_type: impl Into<String>, criteria: SelectionCriteria) {
        self.criteria.insert(function_type.into(), criteria);
    }
}

impl FunctionTypeRegistry for StaticFunctionTypeRegistry {
    fn token_selection_criteria(&self, function: &Function) -> SelectionCriteria {
        self.criteria
            .get(&function.function_type)
            .cloned()
            .unwrap_or_default()
    }
}
