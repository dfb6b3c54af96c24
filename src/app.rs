//! Ensamblado del engine con los adaptadores incorporados.
use std::sync::Arc;

use convo_adapters::actions::{default_registry, InMemoryNotificationQueue, InMemoryOrderBook};
use convo_adapters::{LogSender, NotificationHandover};
use convo_core::definition::FlowCatalog;
use convo_core::engine::FlowEngine;
use convo_core::ports::MessageSender;
use convo_core::repo::ContactStateStore;

use crate::config::AppConfig;

/// Engine listo para despachar más los colaboradores en memoria que usan
/// sus acciones (inspeccionables desde tests y demos).
pub struct App<S: ContactStateStore> {
    pub engine: Arc<FlowEngine<S>>,
    pub orders: Arc<InMemoryOrderBook>,
    pub notifications: Arc<InMemoryNotificationQueue>,
}

pub fn build_app<S>(store: S, catalog: FlowCatalog, cfg: &AppConfig) -> App<S>
    where S: ContactStateStore
{
    build_app_with_sender(store, catalog, cfg, Arc::new(LogSender))
}

pub fn build_app_with_sender<S>(store: S, catalog: FlowCatalog, cfg: &AppConfig, sender: Arc<dyn MessageSender>) -> App<S>
    where S: ContactStateStore
{
    let orders = Arc::new(InMemoryOrderBook::new());
    let notifications = Arc::new(InMemoryNotificationQueue::new());
    let handover = Arc::new(NotificationHandover::new(notifications.clone(), cfg.handover_recipient.clone()));
    let engine = FlowEngine::builder(store, catalog).sender(sender)
                                                    .handover(handover)
                                                    .actions(default_registry(orders.clone(), notifications.clone()))
                                                    .config(cfg.engine.clone())
                                                    .build();
    App { engine: Arc::new(engine),
          orders,
          notifications }
}
