use std::panic::{catch_unwind, AssertUnwindSafe};

use log::{debug, warn};
use serde_json::{json, Map, Value};

use super::{ActionFailure, ExecutionResult, FatalStep, StepOutcome};
use crate::action::{ActionContext, ActionRegistry};
use crate::constants::CTX_ACTION_ERROR;
use crate::definition::{Step, StepKind};
use crate::errors::ActionError;
use crate::model::{interpolate, ContactFlowState, FlowContext, Message};
use crate::ports::{send_contained, MessageSender};

/// Ejecuta steps contra los adaptadores externos. No toca el store: devuelve
/// el contexto actualizado y el engine decide qué persistir.
pub struct StepExecutor<'a> {
    sender: &'a dyn MessageSender,
    actions: &'a ActionRegistry,
}

impl<'a> StepExecutor<'a> {
    pub fn new(sender: &'a dyn MessageSender, actions: &'a ActionRegistry) -> Self {
        Self { sender, actions }
    }

    /// `state` aporta identidad (contacto, ejecución, flujo) y el contexto de
    /// partida; no se modifica.
    pub fn execute(&self, state: &ContactFlowState, step: &Step) -> Result<ExecutionResult, FatalStep> {
        let mut context = state.context.clone();
        let mut action_failure = None;
        let outcome = match &step.kind {
            StepKind::Message { message } => {
                self.send(state, step, message, &context);
                StepOutcome::Continue
            }
            StepKind::Question { prompt, .. } => {
                if let Message::Form { form_id, .. } = prompt {
                    context.reopen_form(form_id);
                }
                self.send(state, step, prompt, &context);
                context.mark_awaiting(&step.id);
                StepOutcome::AwaitInput
            }
            StepKind::Action { action, params, save_as } => {
                action_failure = self.run_action(state, step, action, params, save_as.as_deref(), &mut context)?;
                StepOutcome::Continue
            }
            StepKind::Terminal { message, action } => {
                if let Some(call) = action {
                    action_failure = self.run_action(state, step, &call.name, &call.params, None, &mut context)?;
                }
                if let Some(message) = message {
                    self.send(state, step, message, &context);
                }
                StepOutcome::Complete
            }
        };
        Ok(ExecutionResult { outcome,
                             context,
                             action_failure })
    }

    fn send(&self, state: &ContactFlowState, step: &Step, template: &Message, context: &FlowContext) {
        let rendered = template.render(context);
        if let Err(e) = send_contained(self.sender, &state.contact_id, &rendered) {
            warn!("send failed contact_id={} flow={} step={} err={e}",
                  state.contact_id, state.flow_id, step.id);
        }
    }

    fn run_action(&self,
                  state: &ContactFlowState,
                  step: &Step,
                  name: &str,
                  params: &Value,
                  save_as: Option<&str>,
                  context: &mut FlowContext)
                  -> Result<Option<ActionFailure>, FatalStep> {
        let rendered = render_params(params, context);
        let result = match self.actions.get(name) {
            Some(action) => {
                let actx = ActionContext { contact_id: &state.contact_id,
                                           run_id: state.run_id,
                                           flow_id: &state.flow_id,
                                           step_id: &step.id,
                                           context };
                catch_unwind(AssertUnwindSafe(|| action.run(&actx, &rendered))).unwrap_or_else(|_| {
                    Err(ActionError::Failed("action panicked".to_string()))
                })
            }
            None => Err(ActionError::Failed(format!("unknown action '{name}'"))),
        };
        match result {
            Ok(data) => {
                debug!("action ok contact_id={} flow={} step={} action={name}", state.contact_id, state.flow_id, step.id);
                context.remove(CTX_ACTION_ERROR);
                match save_as {
                    Some(key) => context.insert(key, data),
                    None => {
                        if !data.is_null() && !context.merge_object(&data) {
                            debug!("action {name} returned a non-object without save_as; result dropped");
                        }
                    }
                }
                Ok(None)
            }
            Err(ActionError::Failed(message)) => {
                warn!("action failed contact_id={} flow={} step={} action={name} err={message}",
                      state.contact_id, state.flow_id, step.id);
                context.insert(CTX_ACTION_ERROR, json!({ "action": name, "message": message }));
                Ok(Some(ActionFailure { action: name.to_string(),
                                        message }))
            }
            Err(ActionError::Fatal(message)) => Err(FatalStep { action: name.to_string(),
                                                                message }),
        }
    }
}

/// Renderiza una plantilla de parámetros. Un string que es exactamente
/// `{{ruta}}` se reemplaza por el valor JSON del contexto (conservando su
/// tipo); el resto de los strings se interpola como texto.
pub fn render_params(params: &Value, context: &FlowContext) -> Value {
    match params {
        Value::String(s) => match whole_placeholder(s) {
            Some(path) => context.lookup(path).cloned().unwrap_or(Value::Null),
            None => Value::String(interpolate(s, context)),
        },
        Value::Array(items) => Value::Array(items.iter().map(|v| render_params(v, context)).collect()),
        Value::Object(map) => Value::Object(map.iter()
                                               .map(|(k, v)| (k.clone(), render_params(v, context)))
                                               .collect::<Map<String, Value>>()),
        other => other.clone(),
    }
}

fn whole_placeholder(s: &str) -> Option<&str> {
    let inner = s.trim().strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SendError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<Message>>);
    impl MessageSender for Collect {
        fn send(&self, _contact_id: &str, message: &Message) -> Result<(), SendError> {
            self.0.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    struct Broken;
    impl MessageSender for Broken {
        fn send(&self, _contact_id: &str, _message: &Message) -> Result<(), SendError> {
            Err(SendError::Transport("down".into()))
        }
    }

    fn state() -> ContactFlowState {
        let mut s = ContactFlowState::enter("c1", "sales", 1, "start");
        s.context.insert("name", json!("Rosa"));
        s.context.insert("qty", json!(3));
        s
    }

    fn step(v: Value) -> Step {
        serde_json::from_value(v).expect("step")
    }

    #[test]
    fn render_params_keeps_types_for_whole_placeholders() {
        let ctx = state().context;
        let out = render_params(&json!({"q": "{{qty}}", "note": "para {{name}}", "list": ["{{ name }}"], "n": 1}), &ctx);
        assert_eq!(out, json!({"q": 3, "note": "para Rosa", "list": ["Rosa"], "n": 1}));
        assert_eq!(render_params(&json!("{{missing}}"), &ctx), Value::Null);
    }

    #[test]
    fn message_continues_and_question_suspends() {
        let sender = Collect::default();
        let registry = ActionRegistry::new();
        let exec = StepExecutor::new(&sender, &registry);

        let msg = step(json!({"id": "m", "type": "message", "message": {"kind": "text", "text": "Hola {{name}}"}, "transitions": [{"to": "q"}]}));
        let res = exec.execute(&state(), &msg).expect("message");
        assert!(res.should_continue());

        let q = step(json!({"id": "q", "type": "question", "prompt": {"kind": "text", "text": "¿Ciudad?"}, "transitions": [{"to": "m"}]}));
        let res = exec.execute(&state(), &q).expect("question");
        assert_eq!(res.outcome, StepOutcome::AwaitInput);
        assert_eq!(res.context.awaiting_reply(), Some("q"));

        let sent = sender.0.lock().unwrap();
        assert_eq!(sent[0], Message::text("Hola Rosa"));
        assert_eq!(sent.len(), 2);
    }

    struct Panicking;
    impl MessageSender for Panicking {
        fn send(&self, _contact_id: &str, _message: &Message) -> Result<(), SendError> {
            panic!("transport bug")
        }
    }

    #[test]
    fn send_failure_does_not_stop_the_step() {
        let registry = ActionRegistry::new();
        let msg = step(json!({"id": "m", "type": "message", "message": {"kind": "text", "text": "x"}, "transitions": [{"to": "m"}]}));
        let exec = StepExecutor::new(&Broken, &registry);
        assert!(exec.execute(&state(), &msg).expect("message").should_continue());

        let exec = StepExecutor::new(&Panicking, &registry);
        assert!(exec.execute(&state(), &msg).expect("message").should_continue());
        let q = step(json!({"id": "q", "type": "question", "prompt": {"kind": "text", "text": "¿?"}, "transitions": [{"to": "m"}]}));
        let res = exec.execute(&state(), &q).expect("question");
        assert_eq!(res.context.awaiting_reply(), Some("q"));
    }

    #[test]
    fn action_result_is_saved_and_failures_are_contained() {
        let sender = Collect::default();
        let mut registry = ActionRegistry::new();
        registry.register_fn("quote", |_ctx, params| Ok(json!({"total": params["qty"].as_i64().unwrap_or(0) * 100})));
        registry.register_fn("flaky", |_ctx, _params| Err(ActionError::Failed("timeout".into())));
        registry.register_fn("panicky", |_ctx, _params| panic!("adapter bug"));
        registry.register_fn("blocked", |_ctx, _params| Err(ActionError::Fatal("contact blocked".into())));
        let exec = StepExecutor::new(&sender, &registry);

        let ok = step(json!({"id": "a", "type": "action", "action": "quote", "params": {"qty": "{{qty}}"}, "save_as": "quote", "transitions": [{"to": "a"}]}));
        let res = exec.execute(&state(), &ok).expect("ok");
        assert_eq!(res.context.get("quote"), Some(&json!({"total": 300})));
        assert!(res.action_failure.is_none());

        for name in ["flaky", "panicky", "missing"] {
            let s = step(json!({"id": "a", "type": "action", "action": name, "transitions": [{"to": "a"}]}));
            let res = exec.execute(&state(), &s).expect("non fatal");
            assert!(res.should_continue());
            assert_eq!(res.action_failure.as_ref().map(|f| f.action.as_str()), Some(name));
            assert_eq!(res.context.get(CTX_ACTION_ERROR).and_then(|e| e.get("action")), Some(&json!(name)));
        }

        let fatal = step(json!({"id": "a", "type": "action", "action": "blocked", "transitions": [{"to": "a"}]}));
        let err = exec.execute(&state(), &fatal).unwrap_err();
        assert_eq!(err.action, "blocked");
    }

    #[test]
    fn terminal_completes_after_final_message() {
        let sender = Collect::default();
        let registry = ActionRegistry::new();
        let exec = StepExecutor::new(&sender, &registry);
        let t = step(json!({"id": "t", "type": "terminal", "message": {"kind": "text", "text": "Gracias {{name}}"}}));
        let res = exec.execute(&state(), &t).expect("terminal");
        assert_eq!(res.outcome, StepOutcome::Complete);
        assert_eq!(sender.0.lock().unwrap()[0], Message::text("Gracias Rosa"));
    }
}
