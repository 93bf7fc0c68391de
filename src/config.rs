//! Tree configuration.

use serde::{Deserialize, Serialize};

use crate::error::{TriggerTreeResult, ValidationError};

/// Upper bound accepted for [`TriggerTreeConfig::max_expansion`].
pub const MAX_EXPANSION_LIMIT: usize = 65_536;

/// Settings for a [`crate::TriggerTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerTreeConfig {
    /// Maximum clauses one trigger may expand into, counting intermediate
    /// cross products and quantifier expansion.
    pub max_expansion: usize,
    /// Run [`crate::TriggerTree::verify_tree`] after every add and remove
    /// and log any violation.
    pub verify_on_mutation: bool,
}

impl Default for TriggerTreeConfig {
    fn default() -> Self {
        Self {
            max_expansion: 256,
            verify_on_mutation: false,
        }
    }
}

impl TriggerTreeConfig {
    /// Validate the configuration.
    ///
    /// Called by [`crate::TriggerTree::with_config`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_expansion == 0 || self.max_expansion > MAX_EXPANSION_LIMIT {
            return Err(ValidationError::InvalidMaxExpansion {
                value: self.max_expansion,
                max: MAX_EXPANSION_LIMIT,
            });
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration. Missing fields take their
    /// defaults.
    pub fn from_json(s: &str) -> TriggerTreeResult<Self> {
        let config: Self = serde_json::from_str(s).map_err(|e| ValidationError::MalformedConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }
}
