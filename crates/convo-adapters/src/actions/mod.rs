//! Acciones de dominio invocables desde los flujos.

mod classify;
mod notifications;
mod orders;

use std::sync::Arc;

use convo_core::action::ActionRegistry;

pub use classify::{ClassifyIntentAction, IntentMatch, KeywordClassifier};
pub use notifications::{InMemoryNotificationQueue, Notification, NotificationQueue, QueueError, QueueNotificationAction};
pub use orders::{CreateOrderAction, InMemoryOrderBook, OrderBook, OrderError, OrderReceipt, OrderRequest};

/// Registro con las tres acciones incorporadas sobre los colaboradores dados.
pub fn default_registry(book: Arc<dyn OrderBook>, queue: Arc<dyn NotificationQueue>) -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    registry.register(Arc::new(CreateOrderAction::new(book)))
            .register(Arc::new(QueueNotificationAction::new(queue)))
            .register(Arc::new(ClassifyIntentAction::new(KeywordClassifier::default())));
    registry
}
