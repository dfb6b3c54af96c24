use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::FlowContext;

/// Qué debe hacer el engine después de ejecutar un step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Paso automático: evaluar la siguiente transición sin esperar al usuario.
    Continue,
    /// Pregunta enviada: suspender hasta el próximo evento entrante.
    AwaitInput,
    /// Step terminal: el flujo terminó y el estado debe borrarse.
    Complete,
}

/// Fallo no fatal de una acción; queda también en el contexto.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionFailure {
    pub action: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub outcome: StepOutcome,
    pub context: FlowContext,
    pub action_failure: Option<ActionFailure>,
}

impl ExecutionResult {
    pub fn should_continue(&self) -> bool {
        matches!(self.outcome, StepOutcome::Continue)
    }
}

/// Una acción señaló una condición fatal: el engine aplica la política de
/// handover.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("action '{action}' signalled a fatal condition: {message}")]
pub struct FatalStep {
    pub action: String,
    pub message: String,
}
