use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::call_template::CallTemplate;
use crate::schema::JsonSchema;

/// A named, schema-typed invocable unit, always bound to a [`CallTemplate`]
/// for dispatch.
///
/// `name` never changes after registration; two tools with the same name
/// within one manual is a registration error (enforced by
/// `utcp-client::repository`, not here — this type is a plain value).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default = "JsonSchema::empty")]
    pub inputs: JsonSchema,
    #[serde(default = "JsonSchema::empty")]
    pub outputs: JsonSchema,
    pub tool_call_template: CallTemplate,
}
