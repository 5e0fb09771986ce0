use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An opaque JSON Schema document.
///
/// UTCP tools carry their `inputs`/`outputs` schemas as raw JSON rather than
/// a fully modeled schema AST — only the MCP `$defs` dereferencer and the
/// OpenAPI converter ever need to walk into the tree, and both do so directly
/// against the wrapped [`serde_json::Value`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct JsonSchema(pub Value);

impl JsonSchema {
    /// The empty schema `{}`, used whenever a more specific schema can't be
    /// derived (unknown OpenAPI constructs, tools with no declared output).
    pub fn empty() -> Self {
        Self(Value::Object(serde_json::Map::new()))
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for JsonSchema {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl std::ops::Deref for JsonSchema {
    type Target = Value;

    fn deref(&self) -> &Value {
        &self.0
    }
}

impl std::ops::DerefMut for JsonSchema {
    fn deref_mut(&mut self) -> &mut Value {
        &mut self.0
    }
}
