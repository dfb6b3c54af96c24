//! `ContactFlowState`: la única fila mutable del motor, una por contacto.
//!
//! Ciclo de vida:
//! - Se crea al entrar a un flujo (trigger).
//! - Se reescribe en cada step ejecutado, siempre dentro de la transacción
//!   que mantiene el lock del contacto.
//! - Se elimina al completar, salir, o ante un error fatal (handover).
//!
//! La ausencia de fila equivale a "sin flujo activo".
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::FlowContext;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactFlowState {
    pub contact_id: String,
    /// Identifica esta ejecución del flujo (una nueva por cada entrada).
    pub run_id: Uuid,
    pub flow_id: String,
    pub flow_version: u32,
    pub current_step: String,
    pub context: FlowContext,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContactFlowState {
    /// Estado inicial de un contacto que entra a `flow_id` por su step de entrada.
    pub fn enter(contact_id: &str, flow_id: &str, flow_version: u32, entry_step: &str) -> Self {
        let now = Utc::now();
        Self { contact_id: contact_id.to_string(),
               run_id: Uuid::new_v4(),
               flow_id: flow_id.to_string(),
               flow_version,
               current_step: entry_step.to_string(),
               context: FlowContext::new(),
               created_at: now,
               updated_at: now }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn status(&self) -> FlowStatus {
        if self.context.awaiting_reply() == Some(self.current_step.as_str()) {
            FlowStatus::AwaitingInput { flow_id: self.flow_id.clone(),
                                        step_id: self.current_step.clone() }
        } else {
            FlowStatus::InFlow { flow_id: self.flow_id.clone(),
                                 step_id: self.current_step.clone() }
        }
    }
}

/// Vista observable del estado de un contacto.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FlowStatus {
    NoActiveFlow,
    InFlow { flow_id: String, step_id: String },
    AwaitingInput { flow_id: String, step_id: String },
}

impl FlowStatus {
    pub fn of(state: Option<&ContactFlowState>) -> Self {
        state.map(ContactFlowState::status).unwrap_or(FlowStatus::NoActiveFlow)
    }
}
