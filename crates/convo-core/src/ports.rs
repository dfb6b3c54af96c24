//! Interfaces consumidas por el engine: envío de mensajes y aviso de
//! handover humano. El transporte real vive fuera del core.
use std::panic::{catch_unwind, AssertUnwindSafe};

use log::warn;

use crate::engine::HandoverReason;
use crate::errors::SendError;
use crate::model::Message;

/// Envío de un mensaje ya renderizado. Los fallos los registra el caller; el
/// engine no reintenta.
pub trait MessageSender: Send + Sync {
    fn send(&self, contact_id: &str, message: &Message) -> Result<(), SendError>;
}

/// Envía con `sender` y convierte un panic del adaptador en `SendError`.
pub fn send_contained(sender: &dyn MessageSender, contact_id: &str, message: &Message) -> Result<(), SendError> {
    catch_unwind(AssertUnwindSafe(|| sender.send(contact_id, message))).unwrap_or_else(|_| {
        Err(SendError::Transport("sender panicked".to_string()))
    })
}

/// Igual que `send_contained` para el aviso de handover.
pub fn request_handover_contained(notifier: &dyn HandoverNotifier,
                                  contact_id: &str,
                                  reason: &HandoverReason)
                                  -> Result<(), SendError> {
    catch_unwind(AssertUnwindSafe(|| notifier.request_handover(contact_id, reason))).unwrap_or_else(|_| {
        Err(SendError::Rejected("handover notifier panicked".to_string()))
    })
}

/// Señal de "un humano debe atender a este contacto". La entrega (email,
/// panel, cola) es responsabilidad del implementador.
pub trait HandoverNotifier: Send + Sync {
    fn request_handover(&self, contact_id: &str, reason: &HandoverReason) -> Result<(), SendError>;
}

/// Notifier por defecto: sólo deja constancia en el log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandover;

impl HandoverNotifier for LoggingHandover {
    fn request_handover(&self, contact_id: &str, reason: &HandoverReason) -> Result<(), SendError> {
        warn!("handover requested contact_id={contact_id} reason={reason}");
        Ok(())
    }
}
