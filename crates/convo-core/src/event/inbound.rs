//! Evento entrante normalizado `{contact_id, type, payload}`.
//!
//! El transporte (webhook) ya entrega eventos con esta forma; el engine sólo
//! los consume por referencia y nunca los persiste tal cual.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::hashing::hash_value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub contact_id: String,
    /// Id del mensaje en el transporte (informativo; los reintentos del
    /// webhook pueden repetirlo o no).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Unión etiquetada de los tipos de evento soportados.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EventKind {
    Text { body: String },
    ButtonReply { id: String, title: String },
    ListReply { id: String, title: String },
    FormReply { form_id: String, response: Map<String, Value> },
    /// Sintetizado por el engine cuando un `FormReply` ya fue aplicado.
    InternalReplay { form_id: String, submission_hash: String },
}

impl InboundEvent {
    pub fn new(contact_id: impl Into<String>, kind: EventKind) -> Self {
        Self { contact_id: contact_id.into(),
               message_id: None,
               received_at: Utc::now(),
               kind }
    }

    pub fn text(contact_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(contact_id, EventKind::Text { body: body.into() })
    }

    pub fn button(contact_id: impl Into<String>, id: impl Into<String>, title: impl Into<String>) -> Self {
        Self::new(contact_id, EventKind::ButtonReply { id: id.into(), title: title.into() })
    }

    pub fn list(contact_id: impl Into<String>, id: impl Into<String>, title: impl Into<String>) -> Self {
        Self::new(contact_id, EventKind::ListReply { id: id.into(), title: title.into() })
    }

    pub fn form(contact_id: impl Into<String>, form_id: impl Into<String>, response: Value) -> Self {
        let response = match response {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(contact_id, EventKind::FormReply { form_id: form_id.into(), response })
    }

    /// Discriminante tal como viaja en el payload (`text`, `button_reply`, ...).
    pub fn event_type(&self) -> &'static str {
        match self.kind {
            EventKind::Text { .. } => "text",
            EventKind::ButtonReply { .. } => "button_reply",
            EventKind::ListReply { .. } => "list_reply",
            EventKind::FormReply { .. } => "form_reply",
            EventKind::InternalReplay { .. } => "internal_replay",
        }
    }

    pub fn text_body(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Text { body } => Some(body.as_str()),
            _ => None,
        }
    }

    /// `(id, title)` de una selección de botón o lista.
    pub fn choice(&self) -> Option<(&str, &str)> {
        match &self.kind {
            EventKind::ButtonReply { id, title } | EventKind::ListReply { id, title } => Some((id.as_str(), title.as_str())),
            _ => None,
        }
    }

    /// Hash estable de una respuesta de formulario: misma respuesta reentregada
    /// ⇒ mismo hash, sin importar el orden de los campos.
    pub fn submission_hash(&self) -> Option<String> {
        match &self.kind {
            EventKind::FormReply { form_id, response } => Some(hash_value(&json!({ "form_id": form_id, "response": response }))),
            EventKind::InternalReplay { submission_hash, .. } => Some(submission_hash.clone()),
            _ => None,
        }
    }

    /// Evento interno que reemplaza a un `FormReply` ya aplicado.
    pub fn as_replay(&self) -> Option<InboundEvent> {
        match &self.kind {
            EventKind::FormReply { form_id, .. } => {
                let submission_hash = self.submission_hash()?;
                Some(InboundEvent { contact_id: self.contact_id.clone(),
                                    message_id: self.message_id.clone(),
                                    received_at: self.received_at,
                                    kind: EventKind::InternalReplay { form_id: form_id.clone(),
                                                                      submission_hash } })
            }
            _ => None,
        }
    }

    /// Campos derivados del evento visibles para las guards bajo `event.*`.
    pub fn scope_value(&self) -> Value {
        let mut scope = json!({ "type": self.event_type() });
        let fields = match &self.kind {
            EventKind::Text { body } => json!({ "text": body.trim() }),
            EventKind::ButtonReply { id, title } | EventKind::ListReply { id, title } => {
                json!({ "choice_id": id, "choice_title": title })
            }
            EventKind::FormReply { form_id, response } => json!({ "form_id": form_id, "form": response }),
            EventKind::InternalReplay { form_id, .. } => json!({ "form_id": form_id }),
        };
        if let (Value::Object(dst), Value::Object(src)) = (&mut scope, fields) {
            dst.extend(src);
        }
        scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_normalized_webhook_shape() {
        let raw = r#"{"contact_id":"521555","type":"button_reply","payload":{"id":"buy","title":"Comprar"}}"#;
        let ev: InboundEvent = serde_json::from_str(raw).expect("parse");
        assert_eq!(ev.contact_id, "521555");
        assert_eq!(ev.choice(), Some(("buy", "Comprar")));
        assert_eq!(ev.event_type(), "button_reply");
    }

    #[test]
    fn submission_hash_ignores_field_order() {
        let a = InboundEvent::form("c1", "quote", json!({"kw": 5, "city": "Monterrey"}));
        let b = InboundEvent::form("c1", "quote", json!({"city": "Monterrey", "kw": 5}));
        assert_eq!(a.submission_hash(), b.submission_hash());
        let c = InboundEvent::form("c1", "quote", json!({"city": "Saltillo", "kw": 5}));
        assert_ne!(a.submission_hash(), c.submission_hash());
    }

    #[test]
    fn replay_keeps_hash_and_form() {
        let ev = InboundEvent::form("c1", "quote", json!({"kw": 5}));
        let replay = ev.as_replay().expect("replay");
        assert_eq!(replay.event_type(), "internal_replay");
        assert_eq!(replay.submission_hash(), ev.submission_hash());
        assert!(InboundEvent::text("c1", "hola").as_replay().is_none());
    }
}
