use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::errors::ActionError;
use crate::model::FlowContext;

/// Datos de solo lectura que recibe una acción.
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    pub contact_id: &'a str,
    pub run_id: Uuid,
    pub flow_id: &'a str,
    pub step_id: &'a str,
    pub context: &'a FlowContext,
}

/// Capacidad registrada bajo un nombre. Devuelve datos que se mezclan en el
/// contexto del contacto.
pub trait FlowAction: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, ctx: &ActionContext<'_>, params: &Value) -> Result<Value, ActionError>;
}

struct FnAction<F> {
    name: String,
    f: F,
}

impl<F> FlowAction for FnAction<F>
    where F: Fn(&ActionContext<'_>, &Value) -> Result<Value, ActionError> + Send + Sync
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &ActionContext<'_>, params: &Value) -> Result<Value, ActionError> {
        (self.f)(ctx, params)
    }
}

/// Mapa nombre → capacidad. Cerrado una vez construido el engine.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: BTreeMap<String, Arc<dyn FlowAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra una acción; si el nombre existía, la reemplaza.
    pub fn register(&mut self, action: Arc<dyn FlowAction>) -> &mut Self {
        self.actions.insert(action.name().to_string(), action);
        self
    }

    /// Atajo para registrar un closure.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
        where F: Fn(&ActionContext<'_>, &Value) -> Result<Value, ActionError> + Send + Sync + 'static
    {
        self.register(Arc::new(FnAction { name: name.into(), f }))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn FlowAction>> {
        self.actions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.actions.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registered_closure_is_callable_by_name() {
        let mut registry = ActionRegistry::new();
        registry.register_fn("echo", |_ctx, params| Ok(params.clone()));
        let ctx = FlowContext::new();
        let action_ctx = ActionContext { contact_id: "c1",
                                         run_id: Uuid::new_v4(),
                                         flow_id: "f",
                                         step_id: "s",
                                         context: &ctx };
        let out = registry.get("echo").expect("echo").run(&action_ctx, &json!({"a": 1})).expect("run");
        assert_eq!(out, json!({"a": 1}));
        assert!(!registry.contains("missing"));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["echo"]);
    }
}
