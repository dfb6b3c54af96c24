//! convo-adapters: implementaciones concretas de los puertos del core.
//!
//! Este crate provee:
//! - Senders: `LogSender` (sólo log) y `RecordingSender` (memoria, para
//!   pruebas y demos).
//! - Handover: `RecordingHandover` y `NotificationHandover` (encola un aviso
//!   para el equipo humano).
//! - Acciones de dominio: `create_order`, `queue_notification` y
//!   `classify_intent`, con colaboradores en memoria.
//!
//! El core sólo conoce nombres de acción y `serde_json::Value`; aquí vive la
//! forma concreta de los parámetros de cada acción.

pub mod actions;
pub mod handover;
pub mod senders;

pub use actions::{default_registry, ClassifyIntentAction, CreateOrderAction, QueueNotificationAction};
pub use handover::{NotificationHandover, RecordingHandover};
pub use senders::{LogSender, RecordingSender};
