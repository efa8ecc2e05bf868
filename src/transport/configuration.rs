// src/transport/configuration.rs
//! Session configurations and their claimant handler lists

use crate::interception::registry::TransportRegistry;
use crate::transport::network::Transport;
use crate::transport::protocol::HandlerType;
use std::sync::Arc;

/// Which family a configuration belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationKind {
    Default,

    /// No persistent caches or cookies
    Ephemeral,

    /// Transfers run out of process; never intercepted
    Background { identifier: String },
}

impl ConfigurationKind {
    /// Whether an installed interceptor applies to this kind
    pub fn is_interceptable(&self) -> bool {
        !matches!(self, ConfigurationKind::Background { .. })
    }
}

/// Settings a [`Session`](crate::transport::Session) is created with.
///
/// Cloning is cheap and yields an independent copy of the handler list.
#[derive(Clone)]
pub struct SessionConfiguration {
    kind: ConfigurationKind,
    registry: Arc<TransportRegistry>,
    handlers: Vec<HandlerType>,
    excluded: Vec<&'static str>,
    transport: Arc<dyn Transport>,
}

impl SessionConfiguration {
    pub(crate) fn new(
        kind: ConfigurationKind,
        registry: Arc<TransportRegistry>,
        handlers: Vec<HandlerType>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            kind,
            registry,
            handlers,
            excluded: Vec::new(),
            transport,
        }
    }

    /// Fresh default configuration from the process-wide registry
    pub fn default_config() -> Self {
        TransportRegistry::global().default_configuration()
    }

    /// Fresh ephemeral configuration from the process-wide registry
    pub fn ephemeral() -> Self {
        TransportRegistry::global().ephemeral_configuration()
    }

    /// Fresh background configuration from the process-wide registry
    pub fn background(identifier: impl Into<String>) -> Self {
        TransportRegistry::global().background_configuration(identifier)
    }

    pub fn kind(&self) -> &ConfigurationKind {
        &self.kind
    }

    pub fn registry(&self) -> &Arc<TransportRegistry> {
        &self.registry
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Active claimants, in the order they are consulted.
    ///
    /// For interceptable kinds an installed interceptor is prepended unless the
    /// list already contains it. Explicitly removed handlers never appear.
    pub fn handlers(&self) -> Vec<HandlerType> {
        let mut handlers = self.handlers.clone();

        if self.kind.is_interceptable() {
            if let Some(interceptor) = self.registry.interceptor() {
                if !handlers.iter().any(|h| h.name() == interceptor.name()) {
                    handlers.insert(0, interceptor);
                }
            }
        }

        handlers.retain(|h| !self.excluded.contains(&h.name()));
        handlers
    }

    /// Replace this configuration's own handlers
    pub fn set_handlers(&mut self, handlers: Vec<HandlerType>) {
        self.handlers = handlers;
    }

    /// Drop a handler by name, including one the registry would prepend
    pub fn remove_handler(&mut self, name: &'static str) {
        self.handlers.retain(|h| h.name() != name);
        if !self.excluded.contains(&name) {
            self.excluded.push(name);
        }
    }
}

impl Default for SessionConfiguration {
    fn default() -> Self {
        Self::default_config()
    }
}

impl std::fmt::Debug for SessionConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.handlers().iter().map(|h| h.name()).collect();
        f.debug_struct("SessionConfiguration")
            .field("kind", &self.kind)
            .field("handlers", &names)
            .field("excluded", &self.excluded)
            .finish_non_exhaustive()
    }
}
