//! Builder para `FlowEngine`.
//!
//! Dos estados:
//! - `EngineBuilderInit`: store y catálogo ya presentes; falta el
//!   `MessageSender`, sin el cual el engine no puede hablar con el contacto.
//! - `EngineBuilder`: configuración completa con defaults (handover sólo por
//!   log, registro de acciones vacío, `EngineConfig::default()`).
//!
//! ```ignore
//! let engine = FlowEngine::builder(InMemoryStateStore::new(), catalog)
//!     .sender(Arc::new(LogSender))
//!     .action(Arc::new(CreateOrderAction::new(book)))
//!     .config(EngineConfig::from_env())
//!     .build();
//! ```
use std::sync::Arc;

use log::warn;

use crate::action::{ActionRegistry, FlowAction};
use crate::config::EngineConfig;
use crate::definition::FlowCatalog;
use crate::engine::FlowEngine;
use crate::ports::{HandoverNotifier, LoggingHandover, MessageSender};
use crate::repo::ContactStateStore;

pub struct EngineBuilderInit<S: ContactStateStore> {
    store: S,
    catalog: Arc<FlowCatalog>,
}

impl<S: ContactStateStore> EngineBuilderInit<S> {
    pub(crate) fn new(store: S, catalog: Arc<FlowCatalog>) -> Self {
        Self { store, catalog }
    }

    /// Fija el canal de salida y pasa al builder completo.
    pub fn sender(self, sender: Arc<dyn MessageSender>) -> EngineBuilder<S> {
        EngineBuilder { store: self.store,
                        catalog: self.catalog,
                        sender,
                        handover: Arc::new(LoggingHandover),
                        actions: ActionRegistry::new(),
                        config: EngineConfig::default() }
    }
}

pub struct EngineBuilder<S: ContactStateStore> {
    store: S,
    catalog: Arc<FlowCatalog>,
    sender: Arc<dyn MessageSender>,
    handover: Arc<dyn HandoverNotifier>,
    actions: ActionRegistry,
    config: EngineConfig,
}

impl<S: ContactStateStore> EngineBuilder<S> {
    pub fn handover(mut self, handover: Arc<dyn HandoverNotifier>) -> Self {
        self.handover = handover;
        self
    }

    pub fn action(mut self, action: Arc<dyn FlowAction>) -> Self {
        self.actions.register(action);
        self
    }

    /// Agrega todas las acciones de `registry` (pisa nombres repetidos).
    pub fn actions(mut self, registry: ActionRegistry) -> Self {
        for name in registry.names() {
            if let Some(action) = registry.get(name) {
                self.actions.register(Arc::clone(action));
            }
        }
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Construye el engine. Las acciones referenciadas por el catálogo que no
    /// estén registradas sólo generan un aviso: en ejecución cuentan como
    /// fallo no fatal del step.
    pub fn build(self) -> FlowEngine<S> {
        for name in self.catalog.action_names() {
            if !self.actions.contains(name) {
                warn!("action '{name}' is referenced by the flow catalog but not registered");
            }
        }
        FlowEngine::from_parts(self.store,
                               self.catalog,
                               self.sender,
                               self.handover,
                               self.actions,
                               self.config)
    }
}
