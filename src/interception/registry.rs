// src/interception/registry.rs
//! Transport registry hook
//!
//! Owns the process-wide registration state and hands out session
//! configurations. Once an interceptor is installed, every default and
//! ephemeral configuration reports it first in `handlers()`; background
//! configurations run out of process and are left alone.
//!
//! There is no uninstall: installation alters the behaviour of affected
//! configurations for the rest of the process.

use crate::transport::configuration::{ConfigurationKind, SessionConfiguration};
use crate::transport::network::{ReqwestTransport, Transport};
use crate::transport::protocol::HandlerType;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

static GLOBAL: Lazy<Arc<TransportRegistry>> =
    Lazy::new(|| TransportRegistry::builder().build());

#[derive(Default)]
struct RegistrationState {
    installed: bool,
    interceptor: Option<HandlerType>,
}

/// Registration state plus the templates for default configurations
pub struct TransportRegistry {
    /// Guards both the flag and the interceptor read by `handlers()`
    state: Mutex<RegistrationState>,
    default_handlers: Vec<HandlerType>,
    default_transport: Arc<dyn Transport>,
}

impl TransportRegistry {
    /// The registry behind [`SessionConfiguration::default_config`]
    pub fn global() -> &'static Arc<TransportRegistry> {
        &GLOBAL
    }

    pub fn builder() -> TransportRegistryBuilder {
        TransportRegistryBuilder::default()
    }

    /// Install `interceptor` ahead of all other handlers.
    ///
    /// Returns `true` for the call that performed the installation; every
    /// other call, concurrent or later, is a no-op returning `false`.
    pub fn try_install_once(&self, interceptor: HandlerType) -> bool {
        let mut state = self.state.lock();
        if state.installed {
            debug!(handler = interceptor.name(), "Interceptor already installed");
            return false;
        }

        info!(handler = interceptor.name(), "Installing interceptor ahead of default handlers");
        state.installed = true;
        state.interceptor = Some(interceptor);
        true
    }

    pub fn is_installed(&self) -> bool {
        self.state.lock().installed
    }

    /// The installed interceptor, if any
    pub fn interceptor(&self) -> Option<HandlerType> {
        self.state.lock().interceptor.clone()
    }

    pub fn default_configuration(self: &Arc<Self>) -> SessionConfiguration {
        self.configuration(ConfigurationKind::Default)
    }

    pub fn ephemeral_configuration(self: &Arc<Self>) -> SessionConfiguration {
        self.configuration(ConfigurationKind::Ephemeral)
    }

    pub fn background_configuration(
        self: &Arc<Self>,
        identifier: impl Into<String>,
    ) -> SessionConfiguration {
        self.configuration(ConfigurationKind::Background {
            identifier: identifier.into(),
        })
    }

    fn configuration(self: &Arc<Self>, kind: ConfigurationKind) -> SessionConfiguration {
        SessionConfiguration::new(
            kind,
            Arc::clone(self),
            self.default_handlers.clone(),
            Arc::clone(&self.default_transport),
        )
    }
}

impl std::fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TransportRegistry")
            .field("installed", &state.installed)
            .field("interceptor", &state.interceptor.as_ref().map(|h| h.name()))
            .field(
                "default_handlers",
                &self.default_handlers.iter().map(|h| h.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Builds a [`TransportRegistry`] with its own handlers and transport
#[derive(Default)]
pub struct TransportRegistryBuilder {
    handlers: Vec<HandlerType>,
    transport: Option<Arc<dyn Transport>>,
}

impl TransportRegistryBuilder {
    /// Append a handler to every configuration this registry creates
    pub fn handler(mut self, handler: HandlerType) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Arc<TransportRegistry> {
        Arc::new(TransportRegistry {
            state: Mutex::new(RegistrationState::default()),
            default_handlers: self.handlers,
            default_transport: self
                .transport
                .unwrap_or_else(|| Arc::new(ReqwestTransport::default())),
        })
    }
}
