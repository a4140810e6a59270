//! JSON solver configuration.
//!
//! Every field is optional; missing ones take their `Default` values.
//!
//! ```json
//! {
//!   "solver": { "bound": 0.5, "method": "Lbfgs" },
//!   "augmented_lagrangian": { "constraint_tol": 1e-5 }
//! }
//! ```

use crate::types::{ALSettings, Result, SolverOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub solver: SolverOptions,
    pub augmented_lagrangian: ALSettings,
}

impl SolverConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
