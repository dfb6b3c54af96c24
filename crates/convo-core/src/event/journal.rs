//! Journal append-only de decisiones del engine.
//!
//! Cada entrada se escribe dentro de la misma transacción que el cambio de
//! `ContactFlowState` que la origina: si la transacción se revierte, la
//! entrada tampoco existe.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::definition::StepType;
use crate::engine::HandoverReason;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
pub enum JournalKind {
    /// Entrada a un flujo: fija versión y hash de la definición usada.
    FlowStarted {
        flow_id: String,
        flow_version: u32,
        definition_hash: String,
        engine_version: String,
    },
    StepEntered { step_id: String, step_type: StepType },
    ReplyAccepted { step_id: String, event_type: String },
    /// Evento que no responde a la pregunta pendiente; el estado no cambia.
    ReplyHeld { step_id: String, event_type: String },
    /// Un formulario ya aplicado volvió a llegar (reintento de webhook).
    ReplaySuppressed { step_id: String, submission_hash: String },
    TransitionMissed {
        step_id: String,
        guard_errors: Vec<String>,
        fallback: Option<String>,
    },
    ActionFailed { step_id: String, action: String, message: String },
    FlowCompleted { flow_id: String },
    FlowExited { flow_id: String },
    HandoverRequested { reason: HandoverReason },
}

impl JournalKind {
    /// Nombre estable en minúsculas (columna `entry_type`).
    pub fn entry_type(&self) -> &'static str {
        match self {
            JournalKind::FlowStarted { .. } => "flowstarted",
            JournalKind::StepEntered { .. } => "stepentered",
            JournalKind::ReplyAccepted { .. } => "replyaccepted",
            JournalKind::ReplyHeld { .. } => "replyheld",
            JournalKind::ReplaySuppressed { .. } => "replaysuppressed",
            JournalKind::TransitionMissed { .. } => "transitionmissed",
            JournalKind::ActionFailed { .. } => "actionfailed",
            JournalKind::FlowCompleted { .. } => "flowcompleted",
            JournalKind::FlowExited { .. } => "flowexited",
            JournalKind::HandoverRequested { .. } => "handoverrequested",
        }
    }

    /// Variante compacta de una letra, útil para aserciones de secuencia.
    pub fn code(&self) -> &'static str {
        match self {
            JournalKind::FlowStarted { .. } => "I",
            JournalKind::StepEntered { .. } => "S",
            JournalKind::ReplyAccepted { .. } => "A",
            JournalKind::ReplyHeld { .. } => "W",
            JournalKind::ReplaySuppressed { .. } => "R",
            JournalKind::TransitionMissed { .. } => "M",
            JournalKind::ActionFailed { .. } => "X",
            JournalKind::FlowCompleted { .. } => "C",
            JournalKind::FlowExited { .. } => "E",
            JournalKind::HandoverRequested { .. } => "H",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub seq: u64,
    pub contact_id: String,
    pub run_id: Option<Uuid>,
    pub kind: JournalKind,
    pub ts: DateTime<Utc>,
}
