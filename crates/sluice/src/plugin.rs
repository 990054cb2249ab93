//! Named application plugins.
//!
//! A plugin is installed once under a unique name. When a route is
//! registered, its handler is passed through every installed plugin's
//! [`Plugin::apply`], most recently installed first, so plugins can wrap
//! handlers with cross-cutting behaviour.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::app::Handler;

/// Errors raised by the plugin registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    /// A plugin with this name is already installed.
    AlreadyInstalled {
        /// The taken name.
        name: String,
    },
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInstalled { name } => {
                write!(f, "plugin {name:?} is already installed")
            }
        }
    }
}

impl std::error::Error for PluginError {}

/// An installable extension.
///
/// Plugins that only hold shared state can rely on the default `apply`,
/// which leaves handlers untouched.
pub trait Plugin: Send + Sync + 'static {
    /// Wrap a route handler at registration time.
    fn apply(&self, handler: Handler) -> Handler {
        handler
    }
}

struct Entry {
    name: String,
    plugin: Arc<dyn Plugin>,
    any: Arc<dyn Any + Send + Sync>,
}

/// Installed plugins, most recent first.
#[derive(Default)]
pub struct Plugins {
    entries: Vec<Entry>,
}

impl Plugins {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `plugin` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::AlreadyInstalled`] if `name` is taken; the
    /// registry is left unchanged.
    pub fn install<P: Plugin>(&mut self, name: impl Into<String>, plugin: P) -> Result<(), PluginError> {
        let name = name.into();
        if self.contains(&name) {
            return Err(PluginError::AlreadyInstalled { name });
        }
        let plugin = Arc::new(plugin);
        self.entries.insert(
            0,
            Entry {
                name,
                plugin: Arc::clone(&plugin) as Arc<dyn Plugin>,
                any: plugin,
            },
        );
        Ok(())
    }

    /// Returns true if a plugin is installed under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| entry.name == name)
    }

    /// Plugin installed under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Plugin>> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.plugin)
    }

    /// Plugin installed under `name`, if it has type `P`.
    #[must_use]
    pub fn get_as<P: Plugin>(&self, name: &str) -> Option<&P> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .and_then(|entry| entry.any.downcast_ref::<P>())
    }

    /// Names and plugins, most recently installed first.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Plugin>)> {
        self.entries
            .iter()
            .map(|entry| (entry.name.as_str(), &entry.plugin))
    }

    /// Number of installed plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fold `handler` through every plugin, most recent first.
    pub(crate) fn apply(&self, handler: Handler) -> Handler {
        self.entries
            .iter()
            .fold(handler, |handler, entry| entry.plugin.apply(handler))
    }
}

impl fmt::Debug for Plugins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|entry| &entry.name))
            .finish()
    }
}
