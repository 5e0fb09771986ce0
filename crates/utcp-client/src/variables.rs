//! Variable resolver.
//!
//! A pure, recursive walk over a `serde_json::Value` tree that substitutes
//! every `${KEY}` occurrence. Lookup tries, in order: (1) the client's
//! configured `variables` map, (2) the loader chain (first loader with a
//! hit wins), (3) the process environment — and within each source, the
//! namespaced key `<manual_name_safe>_<KEY>` is tried before the bare key,
//! so a manual-scoped override wins but an unnamespaced key still falls
//! back correctly.
//!
//! Operates over an arbitrary JSON tree rather than a fixed config struct,
//! since a `CallTemplate` carries placeholders at arbitrary depth.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use utcp_core::{Result as CoreResult, UtcpError};

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z0-9_]+)\}").expect("static regex"));

/// A source of variable values, tried as a chain — first loader with a hit
/// for a given key wins. Implementations do their own I/O (e.g. reading an
/// env file) and are free to re-read on every call; the resolver is pure
/// with respect to the template so a stale loader only affects which
/// values get substituted, not whether the tree is mutated in place.
pub trait VariableLoader: Send + Sync + std::fmt::Debug {
    fn load(&self) -> CoreResult<HashMap<String, String>>;
}

/// Loads `KEY=VALUE` pairs from a dotenv-style file. This is the minimal
/// `KEY=VALUE`/`#comment`/blank-line format every dotenv implementation
/// agrees on, which is all a variable loader needs.
#[derive(Debug, Clone)]
pub struct DotEnvLoader {
    path: PathBuf,
}

impl DotEnvLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl VariableLoader for DotEnvLoader {
    fn load(&self) -> CoreResult<HashMap<String, String>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "dotenv loader: file absent, contributing no variables");
                return Ok(HashMap::new());
            }
            Err(e) => return Err(UtcpError::Io(e)),
        };

        let mut vars = HashMap::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            vars.insert(key.trim().to_string(), value.to_string());
        }
        Ok(vars)
    }
}

/// The safe namespace prefix for a manual name: `-`, `.`, and whitespace
/// each become `__` (double underscore, per spec).
pub fn namespace_safe(manual_name: &str) -> String {
    let mut out = String::with_capacity(manual_name.len());
    for c in manual_name.chars() {
        if c == '-' || c == '.' || c.is_whitespace() {
            out.push_str("__");
        } else {
            out.push(c);
        }
    }
    out
}

/// Resolves `${KEY}` placeholders across a manual's template tree, applying
/// the scope and namespacing rules described above.
#[derive(Debug, Default)]
pub struct VariableResolver {
    config_variables: HashMap<String, String>,
    loaders: Vec<Box<dyn VariableLoader>>,
}

impl VariableResolver {
    pub fn new(config_variables: HashMap<String, String>, loaders: Vec<Box<dyn VariableLoader>>) -> Self {
        Self { config_variables, loaders }
    }

    fn lookup_in(&self, key: &str) -> Option<String> {
        if let Some(v) = self.config_variables.get(key) {
            return Some(v.clone());
        }
        for loader in &self.loaders {
            match loader.load() {
                Ok(vars) => {
                    if let Some(v) = vars.get(key) {
                        return Some(v.clone());
                    }
                }
                Err(e) => warn!(error = %e, "variable loader failed, skipping"),
            }
        }
        std::env::var(key).ok()
    }

    /// Looks up `key` for `manual_name`: the namespaced form across every
    /// source first, then the bare key across every source as a fallback.
    fn lookup(&self, manual_name: &str, key: &str) -> Option<String> {
        let namespaced = format!("{}_{key}", namespace_safe(manual_name));
        self.lookup_in(&namespaced).or_else(|| self.lookup_in(key))
    }

    /// Substitutes every `${KEY}` in `value`'s strings, recursively.
    /// Raises `VariableNotFound` on the first unresolved placeholder — no
    /// partial substitution.
    pub fn resolve(&self, manual_name: &str, value: &Value) -> CoreResult<Value> {
        match value {
            Value::String(s) => Ok(Value::String(self.substitute_string(manual_name, s)?)),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.resolve(manual_name, item)?);
                }
                Ok(Value::Array(out))
            }
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.resolve(manual_name, v)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn substitute_string(&self, manual_name: &str, s: &str) -> CoreResult<String> {
        if !s.contains("${") {
            return Ok(s.to_string());
        }
        let mut result = String::with_capacity(s.len());
        let mut last_end = 0;
        for caps in PLACEHOLDER_RE.captures_iter(s) {
            let whole = caps.get(0).expect("capture group 0 always present");
            let key = &caps[1];
            let value = self
                .lookup(manual_name, key)
                .ok_or_else(|| UtcpError::VariableNotFound { name: key.to_string() })?;
            result.push_str(&s[last_end..whole.start()]);
            result.push_str(&value);
            last_end = whole.end();
        }
        result.push_str(&s[last_end..]);
        Ok(result)
    }
}

/// Resolves a relative path (an `env_file_path`, or any other path on a
/// call template) against `root_dir`, matching the file/text transport's
/// own resolution rule.
pub fn resolve_against(root_dir: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root_dir.join(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_from_config_variables() {
        let resolver = VariableResolver::new(
            HashMap::from([("API_KEY".to_string(), "secret".to_string())]),
            Vec::new(),
        );
        let value = serde_json::json!({"api_key": "Bearer ${API_KEY}"});
        let resolved = resolver.resolve("m", &value).unwrap();
        assert_eq!(resolved["api_key"], "Bearer secret");
    }

    #[test]
    fn namespaced_key_wins_over_bare_key() {
        let resolver = VariableResolver::new(
            HashMap::from([
                ("TOKEN".to_string(), "bare".to_string()),
                ("m_TOKEN".to_string(), "namespaced".to_string()),
            ]),
            Vec::new(),
        );
        let resolved = resolver.resolve("m", &serde_json::json!("${TOKEN}")).unwrap();
        assert_eq!(resolved, "namespaced");
    }

    #[test]
    fn bare_key_is_a_fallback_when_unnamespaced() {
        let resolver =
            VariableResolver::new(HashMap::from([("TOKEN".to_string(), "bare".to_string())]), Vec::new());
        let resolved = resolver.resolve("m", &serde_json::json!("${TOKEN}")).unwrap();
        assert_eq!(resolved, "bare");
    }

    #[test]
    fn missing_variable_is_an_error() {
        let resolver = VariableResolver::default();
        let err = resolver.resolve("m", &serde_json::json!("${MISSING}")).unwrap_err();
        assert!(matches!(err, UtcpError::VariableNotFound { .. }));
    }

    #[test]
    fn resolving_twice_is_a_fixed_point() {
        let resolver = VariableResolver::new(
            HashMap::from([("HOST".to_string(), "example.com".to_string())]),
            Vec::new(),
        );
        let value = serde_json::json!({"url": "https://${HOST}/api"});
        let once = resolver.resolve("m", &value).unwrap();
        let twice = resolver.resolve("m", &once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn manual_name_with_dashes_and_dots_is_namespace_safe() {
        assert_eq!(namespace_safe("my-manual.v2 test"), "my__manual__v2__test");
    }

    #[test]
    fn dotenv_loader_parses_simple_key_value_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "# comment\nexport FOO=bar\nBAZ=\"quoted\"\n\n").unwrap();
        let loader = DotEnvLoader::new(path);
        let vars = loader.load().unwrap();
        assert_eq!(vars.get("FOO").unwrap(), "bar");
        assert_eq!(vars.get("BAZ").unwrap(), "quoted");
    }

    #[test]
    fn dotenv_loader_missing_file_yields_no_variables() {
        let loader = DotEnvLoader::new("/does/not/exist/.env");
        assert!(loader.load().unwrap().is_empty());
    }
}
