//! Implementaciones de `MessageSender`.
use std::sync::{Mutex, MutexGuard};

use convo_core::errors::SendError;
use convo_core::model::Message;
use convo_core::ports::MessageSender;
use log::info;

/// Sender que sólo deja el mensaje renderizado en el log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSender;

impl MessageSender for LogSender {
    fn send(&self, contact_id: &str, message: &Message) -> Result<(), SendError> {
        info!("send contact_id={contact_id} body={:?} choices={:?}", message.body(), message.choices());
        Ok(())
    }
}

/// Guarda cada envío en memoria. Con `failing()` rechaza todo (simula caída
/// del transporte) y con `panicking()` entra en panic (adaptador roto); en
/// ambos casos igual registra el intento.
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(String, Message)>>,
    fail: bool,
    panic: bool,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self { fail: true,
               ..Self::default() }
    }

    pub fn panicking() -> Self {
        Self { panic: true,
               ..Self::default() }
    }

    fn guard(&self) -> MutexGuard<'_, Vec<(String, Message)>> {
        self.sent.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn sent(&self) -> Vec<(String, Message)> {
        self.guard().clone()
    }

    pub fn sent_to(&self, contact_id: &str) -> Vec<Message> {
        self.guard()
            .iter()
            .filter(|(c, _)| c == contact_id)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Cuerpos de texto enviados al contacto, en orden.
    pub fn bodies_to(&self, contact_id: &str) -> Vec<String> {
        self.sent_to(contact_id).iter().map(|m| m.body().to_string()).collect()
    }

    pub fn last_to(&self, contact_id: &str) -> Option<Message> {
        self.sent_to(contact_id).pop()
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    pub fn clear(&self) {
        self.guard().clear();
    }
}

impl MessageSender for RecordingSender {
    fn send(&self, contact_id: &str, message: &Message) -> Result<(), SendError> {
        self.guard().push((contact_id.to_string(), message.clone()));
        if self.panic {
            panic!("recording sender configured to panic");
        }
        if self.fail {
            return Err(SendError::Transport("recording sender configured to fail".to_string()));
        }
        Ok(())
    }
}
