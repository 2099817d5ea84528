use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use crate::error::{Result, StepperError};
use crate::models::Function;
use crate::services::FunctionStore;

/// Resolves dispatchable functions by identity or by selection attributes
pub struct FunctionLocator {
    store: Arc<dyn FunctionStore>,
    version_attribute: String,
}

impl FunctionLocator {
    pub fn new(store: Arc<dyn FunctionStore>, version_attribute: impl Into<String>) -> Self {
        Self {
            store,
            version_attribute: version_attribute.into(),
        }
    }

    pub async fn by_id(&self, id: &str) -> Result<Function> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| StepperError::FunctionNotFound(format!("no function with id {id}")))
    }

    /// Attribute lookup honoring the run's active versions.
    ///
    /// With active versions configured, a match whose version is listed wins,
    /// then a match without any version; otherwise the lookup fails.
    pub async fn by_attributes(
        &self,
        attributes: &HashMap<String, String>,
        active_versions: &[String],
    ) -> Result<Function> {
        let matches = self.store.find_by_attributes(attributes).await?;
        debug!(
            criteria = ?sorted(attributes),
            matches = matches.len(),
            "Function lookup"
        );

        if active_versions.is_empty() {
            return matches.into_iter().next().ok_or_else(|| {
                StepperError::FunctionNotFound(format!(
                    "no function matches {:?}",
                    sorted(attributes)
                ))
            });
        }

        let versioned = matches.iter().find(|f| {
            f.attributes
                .get(&self.version_attribute)
                .map(|v| active_versions.contains(v))
                .unwrap_or(false)
        });
        if let Some(function) = versioned {
            return Ok(function.clone());
        }

        matches
            .into_iter()
            .find(|f| !f.attributes.contains_key(&self.version_attribute))
            .ok_or_else(|| {
                StepperError::FunctionNotFound(format!(
                    "no function matches {:?} with {} in {:?} or without {}",
                    sorted(attributes),
                    self.version_attribute,
                    active_versions,
                    self.version_attribute
                ))
            })
    }
}

/// Parse a comma separated list of versions, ignoring blanks
pub fn parse_active_versions(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

fn sorted(attributes: &HashMap<String, String>) -> BTreeMap<&String, &String> {
    attributes.iter().collect()
}
