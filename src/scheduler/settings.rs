use std::sync::Arc;
use tracing::warn;

use crate::config::SchedulerConfig;
use crate::constants::settings;
use crate::error::Result;
use crate::services::SettingsStore;

/// Read-through view of the persisted scheduler settings
#[derive(Clone)]
pub struct SchedulerSettings {
    store: Arc<dyn SettingsStore>,
    default_enabled: bool,
}

impl SchedulerSettings {
    pub fn new(store: Arc<dyn SettingsStore>, config: &SchedulerConfig) -> Self {
        Self {
            store,
            default_enabled: config.default_enabled,
        }
    }

    /// Global scheduler switch, the configured default when never set
    pub async fn is_enabled(&self) -> Result<bool> {
        match self.store.get(settings::SCHEDULER_ENABLED).await? {
            None => Ok(self.default_enabled),
            Some(raw) => match raw.trim().parse::<bool>() {
                Ok(enabled) => Ok(enabled),
                Err(_) => {
                    warn!(value = %raw, "Invalid scheduler_enabled setting, using the default");
                    Ok(self.default_enabled)
                }
            },
        }
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.store
            .put(settings::SCHEDULER_ENABLED, &enabled.to_string())
            .await
    }

    /// User scheduled runs are executed as, if configured
    pub async fn execution_username(&self) -> Result<Option<String>> {
        Ok(self
            .store
            .get(settings::SCHEDULER_EXECUTION_USERNAME)
            .await?
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty()))
    }
}

impl std::fmt::Debug for SchedulerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerSettings")
            .field("default_enabled", &self.default_enabled)
            .finish()
    }
}
