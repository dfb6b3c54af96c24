//! Errores del core.
//!
//! Cada familia de error corresponde a un alcance de contención distinto: un
//! `GuardError` afecta a una sola transición, un `ActionError` a un solo step,
//! y sólo `StoreError` (infraestructura) puede escapar de `handle_event`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errores expuestos por el punto de entrada del engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("state store: {0}")]
    Store(#[from] StoreError),
}

/// Errores del almacenamiento de `ContactFlowState`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("conflicting concurrent update: {0}")]
    Conflict(String),
    #[error("corrupt state row: {0}")]
    Corrupt(String),
    #[error("internal: {0}")]
    Internal(String),
}

/// Errores de carga/validación de definiciones de flujo.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("invalid flow document: {0}")]
    Parse(String),
    #[error("duplicate flow id '{0}'")]
    DuplicateFlow(String),
    #[error("flow '{flow}': duplicate step id '{step}'")]
    DuplicateStep { flow: String, step: String },
    #[error("flow '{flow}': entry step '{step}' not found")]
    MissingEntry { flow: String, step: String },
    #[error("flow '{flow}': step '{step}' points to unknown step '{target}'")]
    UnknownTarget { flow: String, step: String, target: String },
    #[error("flow '{flow}': non-terminal step '{step}' has no outgoing transition")]
    DeadEnd { flow: String, step: String },
    #[error("flow '{flow}': step '{step}': {reason}")]
    InvalidMessage { flow: String, step: String, reason: String },
    #[error("io: {0}")]
    Io(String),
}

/// Error al evaluar una condición de guarda. Nunca aborta la evaluación de
/// las transiciones hermanas.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuardError {
    #[error("missing key '{0}'")]
    MissingKey(String),
    #[error("key '{key}' is not {expected}")]
    TypeMismatch { key: String, expected: String },
}

/// Resultado fallido de una acción externa.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionError {
    /// Fallo recuperable: se registra y el flujo continúa.
    #[error("action failed: {0}")]
    Failed(String),
    /// La acción señala explícitamente una condición fatal.
    #[error("fatal action failure: {0}")]
    Fatal(String),
}

/// Fallos del transporte de mensajes o del aviso de handover.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("rejected: {0}")]
    Rejected(String),
}
