//! Provider configuration file — the typed `ClientConfig` struct an
//! embedder loads (or constructs programmatically) and hands to
//! [`crate::Client::new`].
//!
//! Follows a typed-config-struct-plus-`#[derive(Deserialize)]` convention
//! (compare `StreamableHttpClientConfig`, `ChildProcessConfig`) rather than
//! hand-parsing; `.yaml`/`.yml` vs. JSON is picked by extension, the same
//! rule the file/text transport uses for manuals.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ClientError, Result};

/// One entry of `load_variables_from`, tagged on `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VariableLoaderConfig {
    Dotenv {
        /// Resolved against `root_dir` if relative, like `file_path` on a
        /// call template.
        env_file_path: String,
    },
}

impl VariableLoaderConfig {
    /// The registry lookup key and the raw config value a
    /// `VariableLoaderFactory` expects.
    pub fn type_id_and_raw(&self) -> (&'static str, Value) {
        match self {
            Self::Dotenv { env_file_path } => {
                ("dotenv", serde_json::json!({ "env_file_path": env_file_path }))
            }
        }
    }
}

/// The provider configuration file: variables, a variable-loader chain, and
/// the manuals to register at startup.
///
/// `manual_call_templates` is kept as raw [`Value`]s rather than typed
/// `CallTemplate`s: the registration flow deserializes each one into a
/// typed template only *after* variable substitution, since a
/// template's `call_template_type` tag and its field values may themselves
/// contain `${...}` placeholders that must resolve before `serde` ever sees
/// a concrete variant.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub variables: HashMap<String, String>,
    #[serde(default)]
    pub load_variables_from: Vec<VariableLoaderConfig>,
    #[serde(default)]
    pub manual_call_templates: Vec<Value>,
}

impl ClientConfig {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads a provider configuration file, picking JSON or YAML by
    /// extension (`.yaml`/`.yml` → YAML, otherwise JSON).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ClientError::ConfigRead {
            path: path.display().to_string(),
            source: e,
        })?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
            Some("yaml") | Some("yml")
        );

        if is_yaml {
            serde_yaml::from_str(&contents).map_err(|e| ClientError::ConfigParse {
                path: path.display().to_string(),
                source: e.to_string(),
            })
        } else {
            serde_json::from_str(&contents).map_err(|e| ClientError::ConfigParse {
                path: path.display().to_string(),
                source: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_minimal_json_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("providers.json");
        std::fs::write(
            &path,
            r#"{"variables": {"A": "1"}, "manual_call_templates": [{"name":"m","call_template_type":"direct-call","callable_name":"c"}]}"#,
        )
        .unwrap();

        let config = ClientConfig::load_from_file(&path).unwrap();
        assert_eq!(config.variables.get("A").unwrap(), "1");
        assert_eq!(config.manual_call_templates.len(), 1);
    }

    #[test]
    fn loads_yaml_config_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("providers.yaml");
        std::fs::write(
            &path,
            "variables:\n  A: \"1\"\nload_variables_from:\n  - type: dotenv\n    env_file_path: \".env\"\n",
        )
        .unwrap();

        let config = ClientConfig::load_from_file(&path).unwrap();
        assert_eq!(config.variables.get("A").unwrap(), "1");
        assert_eq!(config.load_variables_from.len(), 1);
    }

    #[test]
    fn missing_file_is_a_config_read_error() {
        let err = ClientConfig::load_from_file(Path::new("/does/not/exist.json")).unwrap_err();
        assert!(matches!(err, ClientError::ConfigRead { .. }));
    }
}
