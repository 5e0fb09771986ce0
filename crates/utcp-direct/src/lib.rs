//! Direct-call `CommunicationProtocol`.
//!
//! An in-process registry of `callableName → function`. `register_callable`
//! may be invoked before the transport is activated by the client's
//! `ensureCorePluginsInitialized` path; such calls are buffered in a pending
//! queue and drained on `activate()` rather than rejected outright, so
//! callers don't need to sequence registration after activation by hand.
//!
//! Arguments arrive as a JSON object and are delivered to the callable
//! *positionally*, in the declared-schema-property order supplied at
//! registration time (`param_order`) — the "spread-args" calling
//! convention.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use utcp_core::{ClientContext, CommunicationProtocol, Result, ToolCallStream, UtcpError};
use utcp_types::{CallTemplate, DirectCallTemplate, JsonSchema, Manual, RegisterManualResult, Tool};

/// A registered in-process callable: an async function taking its arguments
/// already ordered per `param_order`.
pub type DirectCallableFn = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

#[derive(Clone)]
struct CallableSpec {
    param_order: Vec<String>,
    func: DirectCallableFn,
}

/// Registry of in-process callables exposed as `direct-call` tools.
#[derive(Default)]
pub struct DirectTransport {
    active: AtomicBool,
    callables: Mutex<HashMap<String, CallableSpec>>,
    pending: Mutex<Vec<(String, Vec<String>, DirectCallableFn)>>,
}

impl std::fmt::Debug for DirectTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectTransport")
            .field("active", &self.active.load(Ordering::SeqCst))
            .field("callables", &self.callables.lock().unwrap().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DirectTransport {
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            callables: Mutex::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Register a callable. `param_order` is the declared order of the
    /// tool's input schema properties; arguments are spread into the
    /// callable positionally in that order.
    pub fn register_callable(&self, name: impl Into<String>, param_order: Vec<String>, func: DirectCallableFn) {
        let name = name.into();
        if self.active.load(Ordering::SeqCst) {
            debug!(callable = %name, "registering direct callable immediately");
            self.callables
                .lock()
                .unwrap()
                .insert(name, CallableSpec { param_order, func });
        } else {
            debug!(callable = %name, "buffering direct callable until activation");
            self.pending.lock().unwrap().push((name, param_order, func));
        }
    }

    /// Idempotently activate the transport, draining any callables that were
    /// registered before `ensureCorePluginsInitialized` ran.
    pub fn activate(&self) {
        if self.active.swap(true, Ordering::SeqCst) {
            return;
        }
        let pending = std::mem::take(&mut *self.pending.lock().unwrap());
        let mut callables = self.callables.lock().unwrap();
        for (name, param_order, func) in pending {
            callables.insert(name, CallableSpec { param_order, func });
        }
    }

    fn lookup(&self, name: &str) -> Option<CallableSpec> {
        self.callables.lock().unwrap().get(name).cloned()
    }
}

fn spread_args(param_order: &[String], args: &Value) -> Vec<Value> {
    let empty = Map::new();
    let map = args.as_object().unwrap_or(&empty);
    param_order
        .iter()
        .map(|p| map.get(p).cloned().unwrap_or(Value::Null))
        .collect()
}

#[async_trait]
impl CommunicationProtocol for DirectTransport {
    async fn register_manual(
        &self,
        _client: &ClientContext,
        template: &CallTemplate,
    ) -> RegisterManualResult {
        let CallTemplate::DirectCall(tmpl) = template else {
            return RegisterManualResult::failure(
                template.clone(),
                vec!["direct-call transport received a non-direct-call template".to_string()],
            );
        };

        let Some(spec) = self.lookup(&tmpl.callable_name) else {
            return RegisterManualResult::failure(
                template.clone(),
                vec![format!("unknown callable: {}", tmpl.callable_name)],
            );
        };

        let mut properties = Map::new();
        for param in &spec.param_order {
            properties.insert(param.clone(), serde_json::json!({}));
        }
        let inputs = JsonSchema(serde_json::json!({
            "type": "object",
            "properties": Value::Object(properties),
        }));

        let manual = Manual {
            name: tmpl.name.clone(),
            utcp_version: utcp_types::UTCP_VERSION.to_string(),
            manual_version: "1.0.0".to_string(),
            tools: vec![Tool {
                name: tmpl.name.clone(),
                description: String::new(),
                tags: Default::default(),
                inputs,
                outputs: JsonSchema::empty(),
                tool_call_template: template.clone(),
            }],
        };
        RegisterManualResult::success(template.clone(), manual)
    }

    async fn deregister_manual(&self, _client: &ClientContext, _template: &CallTemplate) -> Result<()> {
        Ok(())
    }

    async fn call_tool(
        &self,
        _client: &ClientContext,
        tool_name: &str,
        args: Value,
        template: &CallTemplate,
    ) -> Result<Value> {
        let CallTemplate::DirectCall(tmpl) = template else {
            return Err(UtcpError::configuration(
                "direct-call transport received a non-direct-call template",
            ));
        };

        let Some(spec) = self.lookup(&tmpl.callable_name) else {
            warn!(callable = %tmpl.callable_name, "call to unknown direct callable");
            return Err(UtcpError::UnknownCallable {
                callable_name: tmpl.callable_name.clone(),
            });
        };

        let positional = spread_args(&spec.param_order, &args);
        debug!(tool = tool_name, callable = %tmpl.callable_name, "direct callable invoked");
        (spec.func)(positional).await
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

    fn ctx() -> ClientContext {
        ClientContext::new(".")
    }

    fn echo_callable() -> DirectCallableFn {
        Arc::new(|args: Vec<Value>| {
            Box::pin(async move { Ok(args.into_iter().next().unwrap_or(Value::Null)) })
        })
    }

    #[tokio::test]
    async fn buffers_registration_before_activation_then_drains() {
        let transport = DirectTransport::new();
        transport.register_callable("echo", vec!["message".to_string()], echo_callable());
        assert!(transport.lookup("echo").is_none());

        transport.activate();
        assert!(transport.lookup("echo").is_some());
    }

    #[tokio::test]
    async fn spreads_object_args_in_declared_order() {
        let transport = DirectTransport::new();
        transport.activate();
        transport.register_callable(
            "concat",
            vec!["a".to_string(), "b".to_string()],
            Arc::new(|args: Vec<Value>| {
                Box::pin(async move {
                    let a = args[0].as_str().unwrap_or_default();
                    let b = args[1].as_str().unwrap_or_default();
                    Ok(Value::String(format!("{a}{b}")))
                })
            }),
        );

        let tmpl = CallTemplate::DirectCall(DirectCallTemplate {
            name: "m".to_string(),
            callable_name: "concat".to_string(),
            auth: None,
            allowed_communication_protocols: None,
        });

        let result = transport
            .call_tool(&ctx(), "concat", serde_json::json!({"b": "world", "a": "hello "}), &tmpl)
            .await
            .unwrap();
        assert_eq!(result, Value::String("hello world".to_string()));
    }

    #[tokio::test]
    async fn unknown_callable_is_an_error() {
        let transport = DirectTransport::new();
        transport.activate();
        let tmpl = CallTemplate::DirectCall(DirectCallTemplate {
            name: "m".to_string(),
            callable_name: "missing".to_string(),
            auth: None,
            allowed_communication_protocols: None,
        });
        let err = transport
            .call_tool(&ctx(), "missing", Value::Null, &tmpl)
            .await
            .unwrap_err();
        assert!(matches!(err, UtcpError::UnknownCallable { .. }));
    }
}
