use serde::{Deserialize, Serialize};

use crate::tool::Tool;
use crate::UTCP_VERSION;

/// A named collection of tools produced by registering one [`crate::CallTemplate`].
///
/// A manual is created only as the result of a successful `registerManual`;
/// deregistering a manual removes all its tools atomically (enforced by the
/// tool repository, not here).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manual {
    pub name: String,
    #[serde(default = "default_utcp_version")]
    pub utcp_version: String,
    #[serde(default)]
    pub manual_version: String,
    #[serde(default)]
    pub tools: Vec<Tool>,
}

fn default_utcp_version() -> String {
    UTCP_VERSION.to_string()
}

impl Manual {
    /// A well-formed, empty manual — what `registerManual` returns on
    /// failure alongside a non-empty `errors` list.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            utcp_version: UTCP_VERSION.to_string(),
            manual_version: "0.0.0".to_string(),
            tools: Vec::new(),
        }
    }
}
