//! Implementaciones de `HandoverNotifier`.
use std::sync::{Arc, Mutex, MutexGuard};

use convo_core::engine::HandoverReason;
use convo_core::errors::SendError;
use convo_core::ports::HandoverNotifier;
use log::info;
use serde_json::json;

use crate::actions::{Notification, NotificationQueue};

/// Registra en memoria cada pedido de handover.
#[derive(Debug, Default)]
pub struct RecordingHandover {
    requests: Mutex<Vec<(String, HandoverReason)>>,
}

impl RecordingHandover {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Vec<(String, HandoverReason)>> {
        self.requests.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn requests(&self) -> Vec<(String, HandoverReason)> {
        self.guard().clone()
    }

    pub fn for_contact(&self, contact_id: &str) -> Vec<HandoverReason> {
        self.guard()
            .iter()
            .filter(|(c, _)| c == contact_id)
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }
}

impl HandoverNotifier for RecordingHandover {
    fn request_handover(&self, contact_id: &str, reason: &HandoverReason) -> Result<(), SendError> {
        self.guard().push((contact_id.to_string(), reason.clone()));
        Ok(())
    }
}

/// Encola una notificación `handover` para el equipo (canal `staff`).
pub struct NotificationHandover {
    queue: Arc<dyn NotificationQueue>,
    recipient: String,
}

impl NotificationHandover {
    pub fn new(queue: Arc<dyn NotificationQueue>, recipient: impl Into<String>) -> Self {
        Self { queue,
               recipient: recipient.into() }
    }
}

impl HandoverNotifier for NotificationHandover {
    fn request_handover(&self, contact_id: &str, reason: &HandoverReason) -> Result<(), SendError> {
        let notification = Notification::new("staff",
                                             self.recipient.as_str(),
                                             "handover",
                                             json!({ "contact_id": contact_id, "reason": reason, "summary": reason.to_string() }));
        let id = self.queue
                     .enqueue(notification)
                     .map_err(|e| SendError::Rejected(e.to_string()))?;
        info!("handover queued contact_id={contact_id} notification_id={id}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::InMemoryNotificationQueue;

    #[test]
    fn notification_handover_enqueues_for_staff() {
        let queue = Arc::new(InMemoryNotificationQueue::new());
        let handover = NotificationHandover::new(queue.clone(), "ventas@solar.example");
        let reason = HandoverReason::UnknownFlow { flow_id: "menu".into() };
        handover.request_handover("c1", &reason).expect("queued");
        let pending = queue.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].channel, "staff");
        assert_eq!(pending[0].recipient, "ventas@solar.example");
        assert_eq!(pending[0].data["contact_id"], "c1");
        assert_eq!(pending[0].data["reason"]["kind"], "unknown_flow");
    }
}
