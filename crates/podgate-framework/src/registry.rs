//! Plugin registry — maps plugin names to factories.
//!
//! The registry is owned by the host runtime. At startup the runtime asks it
//! to build each configured plugin, passing the plugin's opaque args and a
//! [`Handle`] to runtime services.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{FrameworkError, FrameworkResult};
use crate::handle::Handle;
use crate::plugin::Plugin;

/// Opaque, plugin-specific configuration.
pub type PluginArgs = serde_json::Value;

/// Builds one plugin instance from its registered name, args, and handle.
pub type PluginFactory = Box<
    dyn Fn(&str, &PluginArgs, Arc<dyn Handle>) -> FrameworkResult<Arc<dyn Plugin>> + Send + Sync,
>;

/// Name → factory table.
#[derive(Default)]
pub struct Registry {
    factories: BTreeMap<String, PluginFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`. Names must be unique.
    pub fn register(&mut self, name: &str, factory: PluginFactory) -> FrameworkResult<()> {
        if self.factories.contains_key(name) {
            return Err(FrameworkError::DuplicatePlugin(name.to_string()));
        }
        self.factories.insert(name.to_string(), factory);
        debug!(plugin = name, "plugin registered");
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> FrameworkResult<()> {
        self.factories
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| FrameworkError::UnknownPlugin(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Construct the plugin registered as `name`.
    pub fn build(
        &self,
        name: &str,
        args: &PluginArgs,
        handle: Arc<dyn Handle>,
    ) -> FrameworkResult<Arc<dyn Plugin>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| FrameworkError::UnknownPlugin(name.to_string()))?;
        factory(name, args, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, SystemClock};
    use crate::handle::ClusterClient;
    use crate::normalize::ScoreRange;
    use crate::snapshot::Snapshot;

    struct Named(String);

    impl Plugin for Named {
        fn name(&self) -> &str {
            &self.0
        }
    }

    struct BareHandle;

    impl Handle for BareHandle {
        fn snapshot(&self) -> Arc<Snapshot> {
            Arc::new(Snapshot::empty())
        }

        fn client(&self) -> Option<Arc<dyn ClusterClient>> {
            None
        }

        fn score_range(&self) -> ScoreRange {
            ScoreRange::default()
        }

        fn clock(&self) -> Arc<dyn Clock> {
            Arc::new(SystemClock)
        }
    }

    fn named_factory() -> PluginFactory {
        Box::new(|name: &str, _args: &PluginArgs, _handle: Arc<dyn Handle>| {
            Ok(Arc::new(Named(name.to_string())) as Arc<dyn Plugin>)
        })
    }

    #[test]
    fn builds_registered_plugin() {
        let mut registry = Registry::new();
        registry.register("named", named_factory()).unwrap();

        let plugin = registry
            .build("named", &PluginArgs::Null, Arc::new(BareHandle))
            .unwrap();
        assert_eq!(plugin.name(), "named");
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut registry = Registry::new();
        registry.register("named", named_factory()).unwrap();
        let err = registry.register("named", named_factory()).unwrap_err();
        assert!(matches!(err, FrameworkError::DuplicatePlugin(_)));
    }

    #[test]
    fn unknown_plugin_fails_to_build() {
        let registry = Registry::new();
        let err = registry
            .build("missing", &PluginArgs::Null, Arc::new(BareHandle))
            .err()
            .unwrap();
        assert!(matches!(err, FrameworkError::UnknownPlugin(_)));
    }

    #[test]
    fn factory_errors_propagate() {
        let mut registry = Registry::new();
        registry
            .register(
                "needs-client",
                Box::new(
                    |name: &str,
                     _: &PluginArgs,
                     handle: Arc<dyn Handle>|
                     -> FrameworkResult<Arc<dyn Plugin>> {
                        handle
                            .client()
                            .ok_or(FrameworkError::MissingService("cluster client"))?;
                        Ok(Arc::new(Named(name.to_string())))
                    },
                ),
            )
            .unwrap();

        let err = registry
            .build("needs-client", &PluginArgs::Null, Arc::new(BareHandle))
            .err()
            .unwrap();
        assert!(matches!(err, FrameworkError::MissingService("cluster client")));
    }

    #[test]
    fn unregister_and_names() {
        let mut registry = Registry::new();
        registry.register("b", named_factory()).unwrap();
        registry.register("a", named_factory()).unwrap();
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);

        registry.unregister("a").unwrap();
        assert!(!registry.contains("a"));
        assert!(registry.unregister("a").is_err());
    }
}
