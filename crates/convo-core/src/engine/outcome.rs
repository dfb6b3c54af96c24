use std::fmt;

use serde::{Deserialize, Serialize};

/// Motivo por el que el engine abandona el flujo y pide atención humana.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HandoverReason {
    /// El estado persistido apunta a un step que la definición no tiene.
    MissingStep { flow_id: String, step_id: String },
    /// El estado persistido apunta a un flujo que ya no está en el catálogo.
    UnknownFlow { flow_id: String },
    NoMatchingTransition { flow_id: String, step_id: String },
    ActionFatal { action: String, message: String },
    /// Demasiados steps automáticos para un solo evento (ciclo en la configuración).
    LoopLimit { limit: usize },
}

impl fmt::Display for HandoverReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandoverReason::MissingStep { flow_id, step_id } => write!(f, "missing step '{step_id}' in flow '{flow_id}'"),
            HandoverReason::UnknownFlow { flow_id } => write!(f, "unknown flow '{flow_id}'"),
            HandoverReason::NoMatchingTransition { flow_id, step_id } => {
                write!(f, "no matching transition from '{step_id}' in flow '{flow_id}'")
            }
            HandoverReason::ActionFatal { action, message } => write!(f, "action '{action}' failed fatally: {message}"),
            HandoverReason::LoopLimit { limit } => write!(f, "more than {limit} automatic steps in one event"),
        }
    }
}

/// Resultado observable de procesar un evento entrante.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HandleOutcome {
    /// Sin flujo activo y sin trigger que coincida: el evento se ignora.
    NoActiveFlow,
    AwaitingInput { flow_id: String, step_id: String },
    Completed { flow_id: String },
    /// Respuesta inválida para la pregunta pendiente; el estado no cambió.
    Held { step_id: String },
    /// Formulario ya aplicado; no se repiten efectos.
    Replayed { step_id: String },
    HandedOver { reason: HandoverReason },
    Exited { flow_id: String },
    /// El estado desapareció durante el loop (borrado concurrente).
    Aborted,
}

impl HandleOutcome {
    /// `true` si el contacto sigue dentro de un flujo tras el evento.
    pub fn keeps_flow(&self) -> bool {
        matches!(self, HandleOutcome::AwaitingInput { .. } | HandleOutcome::Held { .. } | HandleOutcome::Replayed { .. })
    }
}
