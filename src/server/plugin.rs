//! Plugin registration.

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::server::error::BoxError;
use crate::server::handle::ServerHandle;

/// A unit of server extension, registered with [`ServerHandle::with_plugins`].
///
/// `register` may add routes, states or anything else the handle offers.
/// Its options are passed through untouched.
pub trait Plugin: Send + Sync + 'static {
    /// Unique plugin name. A name can only be registered once per server.
    fn name(&self) -> &str;

    fn register<'a>(
        &'a self,
        server: &'a mut ServerHandle,
        options: &'a Value,
    ) -> BoxFuture<'a, Result<(), BoxError>>;
}

/// A plugin paired with its registration options.
#[derive(Clone)]
pub struct PluginDescriptor {
    pub plugin: Arc<dyn Plugin>,
    pub options: Value,
}

impl PluginDescriptor {
    pub fn new(plugin: impl Plugin, options: Value) -> Self {
        Self {
            plugin: Arc::new(plugin),
            options,
        }
    }

    pub fn name(&self) -> &str {
        self.plugin.name()
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("plugin", &self.plugin.name())
            .field("options", &self.options)
            .finish()
    }
}
