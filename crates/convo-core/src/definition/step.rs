//! Steps y transiciones de un flujo.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Guard;
use crate::model::Message;

/// Tipo general del step (sin payload).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Message,
    Question,
    Action,
    Terminal,
}

/// Invocación de una acción registrada con parámetros plantilla.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCall {
    pub name: String,
    #[serde(default)]
    pub params: Value,
}

/// Payload específico de cada tipo de step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    Message {
        message: Message,
    },
    Question {
        prompt: Message,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        save_as: Option<String>,
        /// Se envía cuando la respuesta recibida no es válida para la pregunta.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        invalid_reply: Option<Message>,
    },
    Action {
        action: String,
        #[serde(default)]
        params: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        save_as: Option<String>,
    },
    Terminal {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<Message>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        action: Option<ActionCall>,
    },
}

/// Arista con guardas; todas deben pasar para que la transición aplique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub to: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub when: Vec<Guard>,
}

impl Transition {
    pub fn always(to: impl Into<String>) -> Self {
        Self { to: to.into(), when: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    #[serde(flatten)]
    pub kind: StepKind,
    /// Transiciones en orden de declaración (gana la primera que pasa).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<Transition>,
    /// Step alternativo cuando ninguna transición aplica.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

/// Tipo de respuesta que acepta una pregunta, derivado de su prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedInput<'a> {
    Text,
    Choice(Vec<(&'a str, &'a str)>),
    Form(&'a str),
}

impl Step {
    pub fn step_type(&self) -> StepType {
        match self.kind {
            StepKind::Message { .. } => StepType::Message,
            StepKind::Question { .. } => StepType::Question,
            StepKind::Action { .. } => StepType::Action,
            StepKind::Terminal { .. } => StepType::Terminal,
        }
    }

    pub fn is_question(&self) -> bool {
        matches!(self.kind, StepKind::Question { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, StepKind::Terminal { .. })
    }

    pub fn expected_input(&self) -> Option<ExpectedInput<'_>> {
        let StepKind::Question { prompt, .. } = &self.kind else {
            return None;
        };
        Some(match prompt {
                 Message::Text { .. } => ExpectedInput::Text,
                 Message::Buttons { .. } | Message::List { .. } => ExpectedInput::Choice(prompt.choices()),
                 Message::Form { form_id, .. } => ExpectedInput::Form(form_id.as_str()),
             })
    }

    /// Nombre de la acción invocada por el step (action o terminal con acción).
    pub fn action_name(&self) -> Option<&str> {
        match &self.kind {
            StepKind::Action { action, .. } => Some(action.as_str()),
            StepKind::Terminal { action: Some(call), .. } => Some(call.name.as_str()),
            _ => None,
        }
    }

    /// Mensajes declarados por el step (para validación de límites del canal).
    pub(crate) fn messages(&self) -> Vec<&Message> {
        match &self.kind {
            StepKind::Message { message } => vec![message],
            StepKind::Question { prompt, invalid_reply, .. } => std::iter::once(prompt).chain(invalid_reply.iter()).collect(),
            StepKind::Action { .. } => Vec::new(),
            StepKind::Terminal { message, .. } => message.iter().collect(),
        }
    }
}
