use crate::errors::{ControllerError, ControllerResult};
use crate::merger::DuplicatePolicy;
use crate::models::SortSpec;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControllerConfig {
    /// Rows requested per page.
    pub batch_size: u32,
    pub duplicate_policy: DuplicatePolicy,
    pub hide_xxx: bool,
    pub event_capacity: usize,
    pub default_sort: SortSpec,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            duplicate_policy: DuplicatePolicy::default(),
            hide_xxx: true,
            event_capacity: 256,
            default_sort: SortSpec::default(),
        }
    }
}

impl ControllerConfig {
    pub fn from_yaml_str(raw: &str) -> ControllerResult<Self> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> ControllerResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn validate(&self) -> ControllerResult<()> {
        if self.batch_size < 2 {
            return Err(ControllerError::Config(format!(
                "batchSize must be at least 2, got {}",
                self.batch_size
            )));
        }
        if self.event_capacity == 0 {
            return Err(ControllerError::Config(
                "eventCapacity must be positive".to_string(),
            ));
        }
        if self.default_sort.column.trim().is_empty() {
            return Err(ControllerError::Config(
                "defaultSort.column cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
