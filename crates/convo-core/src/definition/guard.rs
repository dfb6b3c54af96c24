//! Condiciones de guarda sobre contexto + campos derivados del evento.
//!
//! Las claves se resuelven con rutas con puntos. El prefijo `event.` apunta al
//! evento entrante (ver `InboundEvent::scope_value`); el resto, al contexto.
//! Una clave ausente en una comparación es un error de la guarda, no un
//! `false`: así una definición que depende de datos que nunca se recolectaron
//! se detecta como tal.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::GuardError;
use crate::event::InboundEvent;
use crate::model::{lookup_path, FlowContext};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Guard {
    Always,
    Equals { key: String, value: Value },
    NotEquals { key: String, value: Value },
    OneOf { key: String, values: Vec<Value> },
    Exists { key: String },
    Absent { key: String },
    /// Subcadena sin distinguir mayúsculas sobre un valor string.
    Contains { key: String, text: String },
    GreaterThan { key: String, value: f64 },
    LessThan { key: String, value: f64 },
    Not { guard: Box<Guard> },
    AnyOf { guards: Vec<Guard> },
}

/// Vista de sólo lectura sobre la que se evalúan las guardas.
pub struct GuardScope<'a> {
    context: &'a FlowContext,
    event: Option<Value>,
}

impl<'a> GuardScope<'a> {
    pub fn new(context: &'a FlowContext, event: Option<&InboundEvent>) -> Self {
        Self { context,
               event: event.map(InboundEvent::scope_value) }
    }

    pub fn lookup(&self, key: &str) -> Option<&Value> {
        if key == "event" {
            return self.event.as_ref();
        }
        match key.strip_prefix("event.") {
            Some(rest) => self.event.as_ref().and_then(|e| lookup_path(e, rest)),
            None => self.context.lookup(key),
        }
    }

    fn required(&self, key: &str) -> Result<&Value, GuardError> {
        self.lookup(key).ok_or_else(|| GuardError::MissingKey(key.to_string()))
    }
}

impl Guard {
    pub fn check(&self, scope: &GuardScope<'_>) -> Result<bool, GuardError> {
        match self {
            Guard::Always => Ok(true),
            Guard::Equals { key, value } => Ok(json_eq(scope.required(key)?, value)),
            Guard::NotEquals { key, value } => Ok(!json_eq(scope.required(key)?, value)),
            Guard::OneOf { key, values } => {
                let found = scope.required(key)?;
                Ok(values.iter().any(|v| json_eq(found, v)))
            }
            Guard::Exists { key } => Ok(scope.lookup(key).is_some_and(|v| !v.is_null())),
            Guard::Absent { key } => Ok(scope.lookup(key).map_or(true, Value::is_null)),
            Guard::Contains { key, text } => match scope.required(key)? {
                Value::String(s) => Ok(s.to_lowercase().contains(&text.to_lowercase())),
                _ => Err(GuardError::TypeMismatch { key: key.clone(),
                                                    expected: "a string".into() }),
            },
            Guard::GreaterThan { key, value } => Ok(as_number(key, scope.required(key)?)? > *value),
            Guard::LessThan { key, value } => Ok(as_number(key, scope.required(key)?)? < *value),
            Guard::Not { guard } => Ok(!guard.check(scope)?),
            Guard::AnyOf { guards } => {
                let mut first_error = None;
                for g in guards {
                    match g.check(scope) {
                        Ok(true) => return Ok(true),
                        Ok(false) => {}
                        Err(e) => {
                            first_error.get_or_insert(e);
                        }
                    }
                }
                first_error.map_or(Ok(false), Err)
            }
        }
    }
}

fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn as_number(key: &str, v: &Value) -> Result<f64, GuardError> {
    let parsed = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| GuardError::TypeMismatch { key: key.to_string(),
                                                    expected: "a number".into() })
}
