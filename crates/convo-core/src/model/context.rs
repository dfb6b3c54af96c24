//! Contexto acumulado de un contacto dentro de un flujo.
//!
//! Es un objeto JSON libre: guarda las respuestas recolectadas (`save_as`),
//! los resultados de acciones y las marcas internas del engine (claves que
//! empiezan con `__`, ver `constants`).
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::{CTX_APPLIED_FORMS, CTX_AWAITING_REPLY, MAX_APPLIED_FORMS};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowContext(Map<String, Value>);

impl FlowContext {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Construye desde un valor JSON; cualquier cosa que no sea objeto se
    /// descarta (la fila persistida debe ser siempre un objeto).
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            Value::Null => Some(Self::new()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Búsqueda por ruta con puntos (`customer.address.city`, `items.0`).
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let (head, rest) = match path.split_once('.') {
            Some((h, r)) => (h, Some(r)),
            None => (path, None),
        };
        let first = self.0.get(head)?;
        match rest {
            Some(r) => lookup_path(first, r),
            None => Some(first),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Merge superficial: las claves de `value` pisan las existentes. Devuelve
    /// `false` (sin cambios) si `value` no es un objeto.
    pub fn merge_object(&mut self, value: &Value) -> bool {
        match value {
            Value::Object(other) => {
                for (k, v) in other {
                    self.0.insert(k.clone(), v.clone());
                }
                true
            }
            _ => false,
        }
    }

    pub fn awaiting_reply(&self) -> Option<&str> {
        self.0.get(CTX_AWAITING_REPLY).and_then(Value::as_str)
    }

    pub fn mark_awaiting(&mut self, step_id: &str) {
        self.0.insert(CTX_AWAITING_REPLY.to_string(), Value::String(step_id.to_string()));
    }

    pub fn clear_awaiting(&mut self) {
        self.0.remove(CTX_AWAITING_REPLY);
    }

    /// `true` si `submission_hash` ya fue aplicado y la llegada actual es un
    /// reintento: mismo `message_id` del transporte, o la pregunta de ese
    /// formulario no se volvió a hacer desde que se aplicó.
    pub fn is_form_replay(&self, submission_hash: &str, message_id: Option<&str>) -> bool {
        self.applied_forms().iter().any(|f| {
            let same_message = matches!((f.message_id.as_deref(), message_id), (Some(a), Some(b)) if a == b);
            f.hash == submission_hash && (!f.reopened || same_message)
        })
    }

    pub fn mark_form_applied(&mut self, form_id: &str, submission_hash: &str, message_id: Option<&str>) {
        let mut forms = self.applied_forms();
        forms.retain(|f| f.hash != submission_hash);
        forms.push(AppliedForm { form_id: form_id.to_string(),
                                 hash: submission_hash.to_string(),
                                 message_id: message_id.map(str::to_string),
                                 reopened: false });
        if forms.len() > MAX_APPLIED_FORMS {
            forms.drain(..forms.len() - MAX_APPLIED_FORMS);
        }
        self.set_applied_forms(forms);
    }

    /// La pregunta de `form_id` se vuelve a hacer: un envío con el mismo
    /// contenido pasa a ser una respuesta nueva.
    pub fn reopen_form(&mut self, form_id: &str) {
        let mut forms = self.applied_forms();
        if !forms.iter().any(|f| f.form_id == form_id && !f.reopened) {
            return;
        }
        for f in forms.iter_mut().filter(|f| f.form_id == form_id) {
            f.reopened = true;
        }
        self.set_applied_forms(forms);
    }

    fn applied_forms(&self) -> Vec<AppliedForm> {
        self.0
            .get(CTX_APPLIED_FORMS)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    fn set_applied_forms(&mut self, forms: Vec<AppliedForm>) {
        if let Ok(value) = serde_json::to_value(forms) {
            self.0.insert(CTX_APPLIED_FORMS.to_string(), value);
        }
    }
}

/// Envío de formulario ya aplicado en la ejecución actual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct AppliedForm {
    form_id: String,
    hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,
    #[serde(default)]
    reopened: bool,
}

/// Navega `root` siguiendo `path` separado por puntos. Los segmentos
/// numéricos indexan arrays.
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }
    path.split('.').try_fold(root, |current, segment| match current {
                       Value::Object(map) => map.get(segment),
                       Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                       _ => None,
                   })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_follows_nested_paths() {
        let mut ctx = FlowContext::new();
        ctx.insert("customer", json!({"name": "Ana", "panels": [{"watts": 450}]}));
        assert_eq!(ctx.lookup("customer.name"), Some(&json!("Ana")));
        assert_eq!(ctx.lookup("customer.panels.0.watts"), Some(&json!(450)));
        assert_eq!(ctx.lookup("customer.phone"), None);
        assert_eq!(ctx.lookup("missing"), None);
    }

    #[test]
    fn applied_forms_are_recorded_once() {
        let mut ctx = FlowContext::new();
        assert!(!ctx.is_form_replay("abc", None));
        ctx.mark_form_applied("quote", "abc", Some("wamid.1"));
        ctx.mark_form_applied("quote", "abc", Some("wamid.1"));
        assert!(ctx.is_form_replay("abc", None));
        // Un reintento puede llegar con otro id mientras la pregunta no se repita.
        assert!(ctx.is_form_replay("abc", Some("wamid.2")));
        assert_eq!(ctx.get(CTX_APPLIED_FORMS).and_then(Value::as_array).map(Vec::len), Some(1));
    }

    #[test]
    fn reopened_form_accepts_same_content_again() {
        let mut ctx = FlowContext::new();
        ctx.mark_form_applied("reading", "h1", Some("wamid.A"));
        ctx.mark_form_applied("quote", "h2", None);
        ctx.reopen_form("reading");
        assert!(!ctx.is_form_replay("h1", Some("wamid.B")));
        assert!(!ctx.is_form_replay("h1", None));
        // Mismo mensaje reentregado sigue siendo reintento.
        assert!(ctx.is_form_replay("h1", Some("wamid.A")));
        // Otros formularios no se ven afectados.
        assert!(ctx.is_form_replay("h2", None));
    }

    #[test]
    fn awaiting_marker_roundtrip() {
        let mut ctx = FlowContext::new();
        ctx.mark_awaiting("ask_name");
        assert_eq!(ctx.awaiting_reply(), Some("ask_name"));
        ctx.clear_awaiting();
        assert_eq!(ctx.awaiting_reply(), None);
    }

    #[test]
    fn merge_ignores_non_objects() {
        let mut ctx = FlowContext::new();
        assert!(!ctx.merge_object(&json!([1, 2])));
        assert!(ctx.merge_object(&json!({"order_id": "o-1"})));
        assert_eq!(ctx.get("order_id"), Some(&json!("o-1")));
    }
}
