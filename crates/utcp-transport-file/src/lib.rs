//! File/text `CommunicationProtocol`.
//!
//! `register_manual` resolves `file_path` against the client's `root_dir` if
//! relative, reads it, and picks JSON or YAML by extension. The parsed value
//! is then classified: if it looks like an OpenAPI document (contains
//! `openapi`, `swagger`, or `paths`) it's handed to `utcp-openapi`; otherwise
//! it's validated as a native UTCP manual. `call_tool` just returns the raw
//! file contents — there is no per-tool dispatch for this transport.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use utcp_core::{ClientContext, CommunicationProtocol, Result, ToolCallStream, TransportErrorKind, UtcpError};
use utcp_openapi::{convert, parse_openapi, parse_value, looks_like_openapi, is_yaml_extension, ConversionContext};
use utcp_types::{CallTemplate, FileCallTemplate, Manual, RegisterManualResult, Tool};

/// Fields a native UTCP manual file carries; `name` is intentionally absent
/// here — the manual's name always comes from the registering call
/// template, never from the file itself, so a manual JSON file need not
/// (and conventionally does not) carry a top-level `name`.
#[derive(Debug, Deserialize)]
struct RawNativeManual {
    #[serde(default = "default_utcp_version")]
    utcp_version: String,
    #[serde(default)]
    manual_version: String,
    #[serde(default)]
    tools: Vec<Tool>,
}

fn default_utcp_version() -> String {
    utcp_types::UTCP_VERSION.to_string()
}

#[derive(Debug, Default)]
pub struct FileTransport;

impl FileTransport {
    pub fn new() -> Self {
        Self
    }

    fn resolve_path(root_dir: &Path, file_path: &str) -> PathBuf {
        let candidate = Path::new(file_path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            root_dir.join(candidate)
        }
    }

    async fn read_and_classify(
        root_dir: &Path,
        tmpl: &FileCallTemplate,
    ) -> std::result::Result<Value, String> {
        let path = Self::resolve_path(root_dir, &tmpl.file_path);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| format!("failed to read '{}': {e}", path.display()))?;
        let as_yaml = is_yaml_extension(&tmpl.file_path);
        parse_value(&contents, as_yaml).map_err(|e| format!("failed to parse '{}': {e}", path.display()))
    }
}

#[async_trait]
impl CommunicationProtocol for FileTransport {
    async fn register_manual(
        &self,
        client: &ClientContext,
        template: &CallTemplate,
    ) -> RegisterManualResult {
        let CallTemplate::File(tmpl) = template else {
            return RegisterManualResult::failure(
                template.clone(),
                vec!["file transport received a non-file call template".to_string()],
            );
        };

        let value = match Self::read_and_classify(&client.root_dir, tmpl).await {
            Ok(v) => v,
            Err(err) => return RegisterManualResult::failure(template.clone(), vec![err]),
        };

        if looks_like_openapi(&value) {
            debug!(manual = %tmpl.name, file = %tmpl.file_path, "detected OpenAPI document");
            let spec = match parse_openapi(value) {
                Ok(spec) => spec,
                Err(err) => {
                    return RegisterManualResult::failure(template.clone(), vec![err.to_string()])
                }
            };
            let ctx = ConversionContext {
                spec_url: Some(tmpl.file_path.clone()),
                call_template_name: tmpl.name.clone(),
                auth_tools: tmpl.auth_tools.clone(),
            };
            let manual = convert(&spec, &ctx);
            RegisterManualResult::success(template.clone(), manual)
        } else {
            debug!(manual = %tmpl.name, file = %tmpl.file_path, "treating file as native UTCP manual");
            match serde_json::from_value::<RawNativeManual>(value) {
                Ok(raw) => {
                    let manual = Manual {
                        name: tmpl.name.clone(),
                        utcp_version: raw.utcp_version,
                        manual_version: raw.manual_version,
                        tools: raw.tools,
                    };
                    RegisterManualResult::success(template.clone(), manual)
                }
                Err(err) => RegisterManualResult::failure(
                    template.clone(),
                    vec![format!("invalid native UTCP manual: {err}")],
                ),
            }
        }
    }

    async fn deregister_manual(&self, _client: &ClientContext, _template: &CallTemplate) -> Result<()> {
        Ok(())
    }

    async fn call_tool(
        &self,
        client: &ClientContext,
        _tool_name: &str,
        _args: Value,
        template: &CallTemplate,
    ) -> Result<Value> {
        let CallTemplate::File(tmpl) = template else {
            return Err(UtcpError::configuration(
                "file transport received a non-file call template",
            ));
        };
        let path = Self::resolve_path(&client.root_dir, &tmpl.file_path);
        let contents = tokio::fs::read_to_string(&path).await.map_err(|e| {
            warn!(path = %path.display(), error = %e, "file transport callTool: read failed");
            UtcpError::transport(TransportErrorKind::Read, e.to_string())
        })?;
        Ok(Value::String(contents))
    }

    async fn call_tool_streaming(
        &self,
        client: &ClientContext,
        tool_name: &str,
        args: Value,
        template: &CallTemplate,
    ) -> Result<ToolCallStream> {
        let result = self.call_tool(client, tool_name, args, template).await;
        Ok(Box::pin(futures::stream::once(async move { result })))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use utcp_types::Auth;

    fn ctx(dir: &Path) -> ClientContext {
        ClientContext::new(dir)
    }

    #[tokio::test]
    async fn registers_native_manual_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let manual_path = dir.path().join("m.json");
        let mut f = std::fs::File::create(&manual_path).unwrap();
        write!(
            f,
            r#"{{"utcp_version":"1.0.1","manual_version":"1.0.0","tools":[{{"name":"m.echo","description":"","tool_call_template":{{"name":"m","call_template_type":"file","file_path":"./m.json"}}}}]}}"#
        )
        .unwrap();

        let template = CallTemplate::File(FileCallTemplate {
            name: "m".to_string(),
            file_path: "m.json".to_string(),
            auth_tools: None,
            auth: None,
            allowed_communication_protocols: None,
        });

        let transport = FileTransport::new();
        let result = transport.register_manual(&ctx(dir.path()), &template).await;
        assert!(result.success, "errors: {:?}", result.errors);
        assert_eq!(result.manual.tools.len(), 1);
        assert_eq!(result.manual.tools[0].name, "m.echo");
    }

    #[tokio::test]
    async fn registers_openapi_yaml_as_manual() {
        let dir = tempfile::tempdir().unwrap();
        let spec_path = dir.path().join("petstore.yaml");
        std::fs::write(
            &spec_path,
            "openapi: \"3.0.0\"\ninfo:\n  title: t\n  version: \"1\"\npaths:\n  /test:\n    get:\n      operationId: getTest\n      responses:\n        \"200\":\n          description: OK\n",
        )
        .unwrap();

        let template = CallTemplate::File(FileCallTemplate {
            name: "petstore".to_string(),
            file_path: "petstore.yaml".to_string(),
            auth_tools: None,
            auth: None,
            allowed_communication_protocols: None,
        });

        let transport = FileTransport::new();
        let result = transport.register_manual(&ctx(dir.path()), &template).await;
        assert!(result.success, "errors: {:?}", result.errors);
        assert!(result.manual.tools.iter().any(|t| t.name.contains("getTest")));
    }

    #[tokio::test]
    async fn missing_file_populates_errors_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let template = CallTemplate::File(FileCallTemplate {
            name: "m".to_string(),
            file_path: "does-not-exist.json".to_string(),
            auth_tools: None,
            auth: None,
            allowed_communication_protocols: None,
        });

        let transport = FileTransport::new();
        let result = transport.register_manual(&ctx(dir.path()), &template).await;
        assert!(!result.success);
        assert!(!result.errors.is_empty());
        assert!(result.manual.tools.is_empty());
    }

    #[test]
    fn auth_tools_field_is_carried() {
        let tmpl = FileCallTemplate {
            name: "m".to_string(),
            file_path: "x.json".to_string(),
            auth_tools: Some(Auth::Basic {
                username: "u".to_string(),
                password: "p".to_string(),
            }),
            auth: None,
            allowed_communication_protocols: None,
        };
        assert!(tmpl.auth_tools.is_some());
    }
}
