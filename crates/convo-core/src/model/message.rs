//! Mensajes salientes y su plantilla.
//!
//! Un mismo tipo sirve de plantilla (en la definición del flujo, con
//! placeholders `{{ruta}}`) y de mensaje ya renderizado que se entrega al
//! `MessageSender`.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::FlowContext;
use crate::constants::{MAX_LIST_ROWS, MAX_REPLY_BUTTONS};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyButton {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRow {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub rows: Vec<ListRow>,
}

/// Mensaje (o plantilla de mensaje) con las variantes interactivas soportadas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    Text { text: String },
    Buttons { text: String, buttons: Vec<ReplyButton> },
    List { text: String, button: String, sections: Vec<ListSection> },
    Form { text: String, form_id: String, cta: String },
}

impl Message {
    pub fn text(body: impl Into<String>) -> Self {
        Message::Text { text: body.into() }
    }

    pub fn body(&self) -> &str {
        match self {
            Message::Text { text } | Message::Buttons { text, .. } | Message::List { text, .. } | Message::Form { text, .. } => text,
        }
    }

    /// Opciones seleccionables `(id, title)` en orden de declaración.
    pub fn choices(&self) -> Vec<(&str, &str)> {
        match self {
            Message::Buttons { buttons, .. } => buttons.iter().map(|b| (b.id.as_str(), b.title.as_str())).collect(),
            Message::List { sections, .. } => sections.iter()
                                                      .flat_map(|s| s.rows.iter())
                                                      .map(|r| (r.id.as_str(), r.title.as_str()))
                                                      .collect(),
            _ => Vec::new(),
        }
    }

    /// Renderiza placeholders de textos y títulos contra el contexto. Los ids
    /// de opciones no se interpolan: son la clave estable de la respuesta.
    pub fn render(&self, ctx: &FlowContext) -> Message {
        match self {
            Message::Text { text } => Message::Text { text: interpolate(text, ctx) },
            Message::Buttons { text, buttons } => {
                Message::Buttons { text: interpolate(text, ctx),
                                   buttons: buttons.iter()
                                                   .map(|b| ReplyButton { id: b.id.clone(),
                                                                          title: interpolate(&b.title, ctx) })
                                                   .collect() }
            }
            Message::List { text, button, sections } => {
                Message::List { text: interpolate(text, ctx),
                                button: interpolate(button, ctx),
                                sections: sections.iter()
                                                  .map(|s| ListSection { title: s.title.as_ref().map(|t| interpolate(t, ctx)),
                                                                         rows: s.rows
                                                                                .iter()
                                                                                .map(|r| ListRow { id: r.id.clone(),
                                                                                                   title: interpolate(&r.title, ctx),
                                                                                                   description: r.description.as_ref().map(|d| interpolate(d, ctx)) })
                                                                                .collect() })
                                                  .collect() }
            }
            Message::Form { text, form_id, cta } => Message::Form { text: interpolate(text, ctx),
                                                                    form_id: form_id.clone(),
                                                                    cta: interpolate(cta, ctx) },
        }
    }

    /// Límites del canal: botones y filas acotados, ids únicos.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Message::Buttons { buttons, .. } => {
                if buttons.is_empty() || buttons.len() > MAX_REPLY_BUTTONS {
                    return Err(format!("buttons message needs 1..={MAX_REPLY_BUTTONS} buttons, got {}", buttons.len()));
                }
            }
            Message::List { sections, .. } => {
                let rows = sections.iter().map(|s| s.rows.len()).sum::<usize>();
                if rows == 0 || rows > MAX_LIST_ROWS {
                    return Err(format!("list message needs 1..={MAX_LIST_ROWS} rows, got {rows}"));
                }
            }
            Message::Form { form_id, .. } if form_id.trim().is_empty() => {
                return Err("form message without form_id".to_string());
            }
            _ => {}
        }
        let ids: Vec<&str> = self.choices().into_iter().map(|(id, _)| id).collect();
        for (i, id) in ids.iter().enumerate() {
            if ids[..i].contains(id) {
                return Err(format!("duplicate option id '{id}'"));
            }
        }
        Ok(())
    }
}

/// Sustituye `{{ruta}}` por el valor del contexto. Claves ausentes o `null`
/// se renderizan vacías; un `{{` sin cierre se deja tal cual.
pub fn interpolate(template: &str, ctx: &FlowContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        out.push_str(&rest[..start]);
        let path = rest[start + 2..start + 2 + len].trim();
        match ctx.lookup(path) {
            Some(Value::String(s)) => out.push_str(s),
            Some(Value::Null) | None => {}
            Some(other) => out.push_str(&other.to_string()),
        }
        rest = &rest[start + 2 + len + 2..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> FlowContext {
        let mut ctx = FlowContext::new();
        ctx.insert("name", json!("Luis"));
        ctx.insert("order", json!({"id": "ORD-7", "panels": 12}));
        ctx
    }

    #[test]
    fn interpolates_strings_numbers_and_missing_keys() {
        let out = interpolate("Hola {{ name }}, pedido {{order.id}} ({{order.panels}} paneles){{nope}}.", &ctx());
        assert_eq!(out, "Hola Luis, pedido ORD-7 (12 paneles).");
    }

    #[test]
    fn unterminated_placeholder_is_kept() {
        assert_eq!(interpolate("precio {{ total", &ctx()), "precio {{ total");
    }

    #[test]
    fn render_keeps_option_ids() {
        let tpl = Message::Buttons { text: "¿{{name}}, confirmas?".into(),
                                     buttons: vec![ReplyButton { id: "yes".into(), title: "Sí {{name}}".into() }] };
        let rendered = tpl.render(&ctx());
        assert_eq!(rendered.choices(), vec![("yes", "Sí Luis")]);
        assert_eq!(rendered.body(), "¿Luis, confirmas?");
    }

    #[test]
    fn validate_rejects_too_many_buttons_and_duplicates() {
        let b = |id: &str| ReplyButton { id: id.into(), title: id.into() };
        let many = Message::Buttons { text: "x".into(), buttons: vec![b("a"), b("b"), b("c"), b("d")] };
        assert!(many.validate().is_err());
        let dup = Message::Buttons { text: "x".into(), buttons: vec![b("a"), b("a")] };
        assert!(dup.validate().unwrap_err().contains("duplicate"));
        let ok = Message::Buttons { text: "x".into(), buttons: vec![b("a"), b("b")] };
        assert!(ok.validate().is_ok());
    }
}
