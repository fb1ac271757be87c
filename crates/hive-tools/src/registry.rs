use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use hive_core::{ALL_BOTS, HiveError, ToolDescriptor, ToolHandler};

/// Where a tool's implementation lives.
///
/// `Local` handlers run in-process when the engine delegates a call.
/// `Remote` registrations carry only the descriptor and timeout; the
/// implementation stays with a detached caller, which watches the raw
/// response surface for `action_required` messages and submits the
/// `action_result` itself.
#[derive(Clone)]
pub enum ToolBinding {
    Local(Arc<dyn ToolHandler>),
    Remote,
}

impl std::fmt::Debug for ToolBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolBinding::Local(_) => f.write_str("Local(..)"),
            ToolBinding::Remote => f.write_str("Remote"),
        }
    }
}

impl ToolBinding {
    pub fn is_remote(&self) -> bool {
        matches!(self, ToolBinding::Remote)
    }
}

/// One registered tool: its descriptor, where its implementation lives,
/// and how long an invocation may run.
#[derive(Clone, Debug)]
pub struct ToolRegistration {
    pub descriptor: ToolDescriptor,
    pub binding: ToolBinding,
    pub timeout: Duration,
}

/// The tool registry — maps (scope, name) to handlers.
///
/// Scope is a bot_id or [`ALL_BOTS`]. Resolution checks the bot scope
/// first, then the global scope, so a bot-specific registration shadows a
/// global one of the same name. Unregistering from one scope never touches
/// the other.
#[derive(Default)]
pub struct ToolRegistry {
    entries: Mutex<HashMap<(String, String), ToolRegistration>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an in-process registration for `scope`.
    pub fn register(
        &self,
        scope: impl Into<String>,
        descriptor: ToolDescriptor,
        handler: Arc<dyn ToolHandler>,
        timeout: Duration,
    ) {
        self.insert(scope.into(), descriptor, ToolBinding::Local(handler), timeout);
    }

    /// Add or replace a registration whose implementation lives with a
    /// detached caller. Only the descriptor and timeout are recorded.
    pub fn register_remote(
        &self,
        scope: impl Into<String>,
        descriptor: ToolDescriptor,
        timeout: Duration,
    ) {
        self.insert(scope.into(), descriptor, ToolBinding::Remote, timeout);
    }

    fn insert(&self, scope: String, descriptor: ToolDescriptor, binding: ToolBinding, timeout: Duration) {
        debug!(
            %scope,
            tool = %descriptor.name,
            remote = binding.is_remote(),
            ?timeout,
            "registering tool"
        );
        let name = descriptor.name.clone();
        self.entries.lock().insert(
            (scope, name),
            ToolRegistration {
                descriptor,
                binding,
                timeout,
            },
        );
    }

    /// Remove `name` from exactly `scope`. Returns whether an entry was
    /// removed. Unregistering from [`ALL_BOTS`] leaves bot-specific
    /// registrations of the same name in place.
    pub fn unregister(&self, scope: &str, name: &str) -> bool {
        let removed = self
            .entries
            .lock()
            .remove(&(scope.to_string(), name.to_string()))
            .is_some();
        debug!(%scope, tool = %name, removed, "unregistering tool");
        removed
    }

    /// Resolve `name` for `bot_id`: bot scope first, then [`ALL_BOTS`].
    pub fn resolve(&self, bot_id: &str, name: &str) -> hive_core::Result<ToolRegistration> {
        let entries = self.entries.lock();
        entries
            .get(&(bot_id.to_string(), name.to_string()))
            .or_else(|| entries.get(&(ALL_BOTS.to_string(), name.to_string())))
            .cloned()
            .ok_or_else(|| HiveError::ToolResolution(name.to_string()))
    }

    /// Resolve and invoke under the registration's timeout. Handler errors
    /// and timeouts come back as typed errors for the caller to stringify.
    /// Remote registrations cannot be invoked here.
    pub async fn invoke(&self, bot_id: &str, name: &str, kwargs: Value) -> hive_core::Result<Value> {
        let registration = self.resolve(bot_id, name)?;
        let handler = match &registration.binding {
            ToolBinding::Local(handler) => Arc::clone(handler),
            ToolBinding::Remote => {
                return Err(HiveError::HandlerExecution {
                    tool: name.to_string(),
                    reason: "tool is registered remotely and has no in-process handler".to_string(),
                });
            }
        };
        match tokio::time::timeout(registration.timeout, handler.invoke(kwargs)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(HiveError::HandlerExecution {
                tool: name.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(HiveError::HandlerTimeout {
                tool: name.to_string(),
                timeout_secs: registration.timeout.as_secs(),
            }),
        }
    }

    /// Every tool visible to `bot_id`: its own registrations plus global
    /// ones it does not shadow, sorted by name.
    pub fn descriptors_for(&self, bot_id: &str) -> Vec<ToolDescriptor> {
        let entries = self.entries.lock();
        let mut visible: HashMap<&str, &ToolDescriptor> = HashMap::new();
        for ((scope, name), registration) in entries.iter() {
            if scope == ALL_BOTS {
                visible.insert(name, &registration.descriptor);
            }
        }
        for ((scope, name), registration) in entries.iter() {
            if scope == bot_id {
                visible.insert(name, &registration.descriptor);
            }
        }
        let mut descriptors: Vec<ToolDescriptor> = visible.into_values().cloned().collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_core::FnHandler;
    use serde_json::json;

    fn fixed(value: Value) -> Arc<dyn ToolHandler> {
        Arc::new(FnHandler(move |_kwargs| Ok(value.clone())))
    }

    fn register_fixed(registry: &ToolRegistry, scope: &str, name: &str, value: Value) {
        registry.register(
            scope,
            ToolDescriptor::new(name, ""),
            fixed(value),
            Duration::from_secs(30),
        );
    }

    #[tokio::test]
    async fn test_resolve_bot_scope() {
        let registry = ToolRegistry::new();
        register_fixed(&registry, "eve", "get_time", json!("12:00"));

        let result = registry.invoke("eve", "get_time", json!({})).await.unwrap();
        assert_eq!(result, json!("12:00"));
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_global() {
        let registry = ToolRegistry::new();
        register_fixed(&registry, ALL_BOTS, "get_time", json!("global"));

        let result = registry.invoke("eve", "get_time", json!({})).await.unwrap();
        assert_eq!(result, json!("global"));
    }

    #[tokio::test]
    async fn test_bot_scope_shadows_global() {
        let registry = ToolRegistry::new();
        register_fixed(&registry, ALL_BOTS, "get_time", json!("global"));
        register_fixed(&registry, "eve", "get_time", json!("eve's"));

        assert_eq!(
            registry.invoke("eve", "get_time", json!({})).await.unwrap(),
            json!("eve's")
        );
        assert_eq!(
            registry.invoke("zoe", "get_time", json!({})).await.unwrap(),
            json!("global")
        );
    }

    #[test]
    fn test_unregister_global_keeps_bot_entries() {
        let registry = ToolRegistry::new();
        register_fixed(&registry, ALL_BOTS, "get_time", json!("global"));
        register_fixed(&registry, "eve", "get_time", json!("eve's"));

        assert!(registry.unregister(ALL_BOTS, "get_time"));
        assert!(registry.resolve("eve", "get_time").is_ok());
        assert!(registry.resolve("zoe", "get_time").is_err());
    }

    #[test]
    fn test_unregister_bot_keeps_global() {
        let registry = ToolRegistry::new();
        register_fixed(&registry, ALL_BOTS, "get_time", json!("global"));
        register_fixed(&registry, "eve", "get_time", json!("eve's"));

        assert!(registry.unregister("eve", "get_time"));
        assert!(registry.resolve("eve", "get_time").is_ok());
        assert!(!registry.unregister("eve", "get_time"));
    }

    #[test]
    fn test_resolve_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.resolve("eve", "nope").unwrap_err();
        assert!(matches!(err, HiveError::ToolResolution(_)));
    }

    #[tokio::test]
    async fn test_register_replaces() {
        let registry = ToolRegistry::new();
        register_fixed(&registry, "eve", "get_time", json!("old"));
        register_fixed(&registry, "eve", "get_time", json!("new"));

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.invoke("eve", "get_time", json!({})).await.unwrap(),
            json!("new")
        );
    }

    #[test]
    fn test_descriptors_for_unions_and_shadows() {
        let registry = ToolRegistry::new();
        register_fixed(&registry, ALL_BOTS, "get_time", json!(1));
        register_fixed(&registry, ALL_BOTS, "send_mail", json!(1));
        register_fixed(&registry, "eve", "get_time", json!(1));
        register_fixed(&registry, "eve", "lookup", json!(1));

        let names: Vec<String> = registry
            .descriptors_for("eve")
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["get_time", "lookup", "send_mail"]);

        let names: Vec<String> = registry
            .descriptors_for("zoe")
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["get_time", "send_mail"]);
    }

    #[tokio::test]
    async fn test_invoke_handler_error() {
        let registry = ToolRegistry::new();
        registry.register(
            "eve",
            ToolDescriptor::new("broken", ""),
            Arc::new(FnHandler(|_| {
                Err(HiveError::Engine("clock missing".into()))
            })),
            Duration::from_secs(30),
        );

        let err = registry.invoke("eve", "broken", json!({})).await.unwrap_err();
        match err {
            HiveError::HandlerExecution { tool, reason } => {
                assert_eq!(tool, "broken");
                assert!(reason.contains("clock missing"));
            }
            other => panic!("wrong error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_remote_registration_resolves_but_does_not_invoke() {
        let registry = ToolRegistry::new();
        registry.register_remote(
            "eve",
            ToolDescriptor::new("client_clock", "local to the caller"),
            Duration::from_secs(60),
        );

        let registration = registry.resolve("eve", "client_clock").unwrap();
        assert!(registration.binding.is_remote());

        let err = registry
            .invoke("eve", "client_clock", json!({}))
            .await
            .unwrap_err();
        match err {
            HiveError::HandlerExecution { tool, reason } => {
                assert_eq!(tool, "client_clock");
                assert!(reason.contains("no in-process handler"));
            }
            other => panic!("wrong error: {other:?}"),
        }
    }

    #[test]
    fn test_remote_registration_is_advertised() {
        let registry = ToolRegistry::new();
        register_fixed(&registry, "eve", "get_time", json!(1));
        registry.register_remote(
            "eve",
            ToolDescriptor::new("client_clock", ""),
            Duration::from_secs(60),
        );

        let names: Vec<String> = registry
            .descriptors_for("eve")
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["client_clock", "get_time"]);
    }

    #[tokio::test]
    async fn test_invoke_timeout() {
        struct SlowHandler;

        #[async_trait::async_trait]
        impl ToolHandler for SlowHandler {
            async fn invoke(&self, _kwargs: Value) -> hive_core::Result<Value> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(json!("too late"))
            }
        }

        let registry = ToolRegistry::new();
        registry.register(
            "eve",
            ToolDescriptor::new("slow", ""),
            Arc::new(SlowHandler),
            Duration::from_millis(20),
        );

        let err = registry.invoke("eve", "slow", json!({})).await.unwrap_err();
        assert!(matches!(err, HiveError::HandlerTimeout { .. }));
    }
}
