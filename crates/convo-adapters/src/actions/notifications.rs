//! `queue_notification`: encola un aviso para el subsistema de despacho.
//!
//! El engine no entrega notificaciones; sólo las deja en la cola.
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use convo_core::action::{ActionContext, FlowAction};
use convo_core::errors::ActionError;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// `email`, `whatsapp`, `staff`...
    pub channel: String,
    pub recipient: String,
    pub template: String,
    pub data: Value,
    pub queued_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(channel: impl Into<String>, recipient: impl Into<String>, template: impl Into<String>, data: Value) -> Self {
        Self { channel: channel.into(),
               recipient: recipient.into(),
               template: template.into(),
               data,
               queued_at: Utc::now() }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue full ({0} pending)")]
    Full(usize),
    #[error("unsupported channel '{0}'")]
    UnsupportedChannel(String),
}

pub trait NotificationQueue: Send + Sync {
    /// Devuelve el id asignado a la notificación.
    fn enqueue(&self, notification: Notification) -> Result<u64, QueueError>;
}

#[derive(Debug)]
pub struct InMemoryNotificationQueue {
    items: Mutex<Vec<Notification>>,
    capacity: usize,
}

impl Default for InMemoryNotificationQueue {
    fn default() -> Self {
        Self::with_capacity(1024)
    }
}

impl InMemoryNotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { items: Mutex::new(Vec::new()),
               capacity }
    }

    fn guard(&self) -> MutexGuard<'_, Vec<Notification>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn pending(&self) -> Vec<Notification> {
        self.guard().clone()
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }
}

impl NotificationQueue for InMemoryNotificationQueue {
    fn enqueue(&self, notification: Notification) -> Result<u64, QueueError> {
        let mut items = self.guard();
        if items.len() >= self.capacity {
            return Err(QueueError::Full(items.len()));
        }
        items.push(notification);
        Ok(items.len() as u64)
    }
}

const CHANNELS: [&str; 3] = ["email", "whatsapp", "staff"];

pub struct QueueNotificationAction {
    queue: Arc<dyn NotificationQueue>,
}

impl QueueNotificationAction {
    pub const NAME: &'static str = "queue_notification";

    pub fn new(queue: Arc<dyn NotificationQueue>) -> Self {
        Self { queue }
    }
}

impl FlowAction for QueueNotificationAction {
    fn name(&self) -> &str {
        Self::NAME
    }

    /// Parámetros: `template` (obligatorio), `channel` (default `whatsapp`),
    /// `to` (default: el propio contacto) y `data` libre.
    fn run(&self, ctx: &ActionContext<'_>, params: &Value) -> Result<Value, ActionError> {
        let template = params.get("template")
                             .and_then(Value::as_str)
                             .filter(|t| !t.is_empty())
                             .ok_or_else(|| ActionError::Failed("missing template".to_string()))?;
        let channel = params.get("channel").and_then(Value::as_str).unwrap_or("whatsapp");
        if !CHANNELS.contains(&channel) {
            return Err(ActionError::Failed(QueueError::UnsupportedChannel(channel.to_string()).to_string()));
        }
        let recipient = params.get("to")
                              .and_then(Value::as_str)
                              .filter(|r| !r.is_empty())
                              .unwrap_or(ctx.contact_id);
        let data = params.get("data").cloned().unwrap_or(Value::Null);
        let id = self.queue
                     .enqueue(Notification::new(channel, recipient, template, data))
                     .map_err(|e| ActionError::Failed(e.to_string()))?;
        debug!("notification queued contact_id={} flow={} step={} id={id}", ctx.contact_id, ctx.flow_id, ctx.step_id);
        Ok(json!({ "notification_id": id }))
    }
}
