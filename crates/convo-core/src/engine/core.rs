//! FlowEngine: driver de la máquina de estados por contacto.
//!
//! Cada evento entrante se procesa completo dentro de
//! `ContactStateStore::transaction`, con el lock del contacto tomado desde la
//! primera lectura hasta el commit. Dentro de ese límite:
//!
//! 1. relee el estado bajo lock (sin fila: intenta entrar por trigger);
//! 2. flujo o step inexistente: fatal, borra el estado y pide handover;
//! 3. palabra de salida: abandona el flujo;
//! 4. formulario ya aplicado: se convierte en replay y no se reevalúa;
//! 5. pregunta pendiente: sólo una respuesta válida avanza, el resto se retiene;
//! 6. evalúa transiciones; sin coincidencia usa el fallback o pide handover;
//! 7. ejecuta steps mientras sean automáticos, persistiendo tras cada uno.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde_json::{json, Value};

use super::{EngineBuilderInit, HandleOutcome, HandoverReason};
use crate::action::ActionRegistry;
use crate::config::EngineConfig;
use crate::constants::ENGINE_VERSION;
use crate::definition::{ExpectedInput, FlowCatalog, FlowDefinition, Step, StepKind};
use crate::errors::{EngineError, StoreError};
use crate::event::{EventKind, InboundEvent, JournalEntry, JournalKind};
use crate::model::{ContactFlowState, FlowStatus, Message};
use crate::ports::{request_handover_contained, send_contained, HandoverNotifier, MessageSender};
use crate::repo::{ContactStateStore, LockedState};
use crate::step::{StepExecutor, StepOutcome};
use crate::transition::{Evaluation, TransitionEvaluator};

pub struct FlowEngine<S: ContactStateStore> {
    store: S,
    catalog: Arc<FlowCatalog>,
    sender: Arc<dyn MessageSender>,
    handover: Arc<dyn HandoverNotifier>,
    actions: ActionRegistry,
    config: EngineConfig,
}

/// Respuesta aceptada para una pregunta: valor a guardar y evento con el que
/// se evalúan las guardas (un texto que nombra una opción se normaliza a
/// selección).
struct AcceptedReply {
    value: Value,
    event: InboundEvent,
}

impl<S: ContactStateStore> FlowEngine<S> {
    /// Punto de partida del builder: store y catálogo son obligatorios.
    pub fn builder(store: S, catalog: impl Into<Arc<FlowCatalog>>) -> EngineBuilderInit<S> {
        EngineBuilderInit::new(store, catalog.into())
    }

    pub(crate) fn from_parts(store: S,
                             catalog: Arc<FlowCatalog>,
                             sender: Arc<dyn MessageSender>,
                             handover: Arc<dyn HandoverNotifier>,
                             actions: ActionRegistry,
                             config: EngineConfig)
                             -> Self {
        Self { store,
               catalog,
               sender,
               handover,
               actions,
               config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> &FlowCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Único punto de entrada para eventos entrantes.
    ///
    /// Sólo los fallos del store escapan como `Err` (la transacción se
    /// revirtió y el caller puede reintentar la entrega). Cualquier otra
    /// condición termina en un `HandleOutcome`.
    pub fn handle_event(&self, event: &InboundEvent) -> Result<HandleOutcome, EngineError> {
        let outcome = self.store
                          .transaction(&event.contact_id, |tx| self.run_locked(tx, event))
                          .map_err(|e| {
                              warn!("transaction rolled back contact_id={} err={e}", event.contact_id);
                              e
                          })?;
        debug!("event handled contact_id={} type={} outcome={outcome:?}", event.contact_id, event.event_type());
        Ok(outcome)
    }

    /// Lectura sin lock del estado actual (inspección).
    pub fn state_of(&self, contact_id: &str) -> Result<Option<ContactFlowState>, EngineError> {
        Ok(self.store.load(contact_id)?)
    }

    pub fn status_of(&self, contact_id: &str) -> Result<FlowStatus, EngineError> {
        Ok(FlowStatus::of(self.state_of(contact_id)?.as_ref()))
    }

    /// Borra el estado del contacto bajo lock. Devuelve `true` si había flujo activo.
    pub fn reset(&self, contact_id: &str) -> Result<bool, EngineError> {
        let cleared = self.store.transaction(contact_id, |tx| {
                                    let Some(state) = tx.fetch()? else {
                                        return Ok(false);
                                    };
                                    tx.clear()?;
                                    tx.record(Some(state.run_id), JournalKind::FlowExited { flow_id: state.flow_id })?;
                                    Ok(true)
                                })?;
        if cleared {
            info!("state reset contact_id={contact_id}");
        }
        Ok(cleared)
    }

    pub fn journal(&self, contact_id: &str) -> Result<Vec<JournalEntry>, EngineError> {
        Ok(self.store.journal(contact_id)?)
    }

    /// Expira estados sin actividad desde `cutoff` (job externo de timeout).
    pub fn expire_stale(&self, cutoff: DateTime<Utc>) -> Result<usize, EngineError> {
        let expired = self.store.expire_stale(cutoff)?;
        info!("expired {expired} stale contact states (cutoff={cutoff})");
        Ok(expired)
    }

    fn run_locked(&self, tx: &mut dyn LockedState, event: &InboundEvent) -> Result<HandleOutcome, StoreError> {
        let Some(state) = tx.fetch()? else {
            return self.start_flow(tx, event);
        };
        let Some(flow) = self.catalog.get(&state.flow_id) else {
            let reason = HandoverReason::UnknownFlow { flow_id: state.flow_id.clone() };
            return self.hand_over(tx, &state, reason);
        };
        if flow.version != state.flow_version {
            warn!("contact_id={} flow={} started on version {} but catalog has {}",
                  state.contact_id, flow.id, state.flow_version, flow.version);
        }
        let Some(step) = flow.step(&state.current_step) else {
            let reason = HandoverReason::MissingStep { flow_id: state.flow_id.clone(),
                                                       step_id: state.current_step.clone() };
            return self.hand_over(tx, &state, reason);
        };

        if event.text_body().is_some_and(|text| self.config.is_exit_keyword(text)) {
            return self.exit(tx, &state);
        }

        if let Some(hash) = self.replayed_submission(&state, event) {
            info!("form already applied contact_id={} flow={} step={} hash={hash}",
                  state.contact_id, flow.id, step.id);
            tx.record(Some(state.run_id),
                      JournalKind::ReplaySuppressed { step_id: step.id.clone(),
                                                      submission_hash: hash })?;
            return Ok(HandleOutcome::Replayed { step_id: step.id.clone() });
        }

        if step.is_question() && state.context.awaiting_reply() == Some(step.id.as_str()) {
            return self.resume_question(tx, flow, step, state, event);
        }

        // Estado en un step que no espera respuesta: se reevalúa con el evento.
        let evaluation = TransitionEvaluator::evaluate_detailed(step, &state.context, Some(event));
        match self.resolve_next(tx, &state, step, &evaluation)? {
            Some(next) => self.drive(tx, flow, state, next, 0),
            None => self.no_match_handover(tx, &state, step),
        }
    }

    fn start_flow(&self, tx: &mut dyn LockedState, event: &InboundEvent) -> Result<HandleOutcome, StoreError> {
        if matches!(event.kind, EventKind::InternalReplay { .. }) {
            return Ok(HandleOutcome::NoActiveFlow);
        }
        let Some(flow) = self.catalog.match_trigger(event) else {
            debug!("no trigger matched contact_id={} type={}", event.contact_id, event.event_type());
            return Ok(HandleOutcome::NoActiveFlow);
        };
        let state = ContactFlowState::enter(&event.contact_id, &flow.id, flow.version, &flow.entry);
        info!("flow started contact_id={} flow={} version={} run_id={}",
              state.contact_id, flow.id, flow.version, state.run_id);
        tx.record(Some(state.run_id),
                  JournalKind::FlowStarted { flow_id: flow.id.clone(),
                                             flow_version: flow.version,
                                             definition_hash: flow.definition_hash.clone(),
                                             engine_version: ENGINE_VERSION.to_string() })?;
        let entry = flow.entry.clone();
        self.drive(tx, flow, state, entry, 0)
    }

    /// Hash del formulario si ya fue aplicado en esta ejecución (o si el
    /// evento ya llegó como replay interno).
    fn replayed_submission(&self, state: &ContactFlowState, event: &InboundEvent) -> Option<String> {
        match &event.kind {
            EventKind::InternalReplay { submission_hash, .. } => Some(submission_hash.clone()),
            EventKind::FormReply { .. } => {
                let replay = event.as_replay()?;
                let hash = replay.submission_hash()?;
                state.context
                     .is_form_replay(&hash, event.message_id.as_deref())
                     .then_some(hash)
            }
            _ => None,
        }
    }

    fn resume_question(&self,
                       tx: &mut dyn LockedState,
                       flow: &FlowDefinition,
                       step: &Step,
                       mut state: ContactFlowState,
                       event: &InboundEvent)
                       -> Result<HandleOutcome, StoreError> {
        let Some(reply) = accept_reply(step, event) else {
            debug!("reply held contact_id={} flow={} step={} type={}",
                   state.contact_id, flow.id, step.id, event.event_type());
            return self.hold(tx, &state, step, event);
        };

        let mut context = state.context.clone();
        if let StepKind::Question { save_as: Some(key), .. } = &step.kind {
            context.insert(key.as_str(), reply.value);
        }
        if let (EventKind::FormReply { form_id, .. }, Some(hash)) = (&event.kind, event.submission_hash()) {
            context.mark_form_applied(form_id, &hash, event.message_id.as_deref());
        }
        context.clear_awaiting();

        let evaluation = TransitionEvaluator::evaluate_detailed(step, &context, Some(&reply.event));
        if evaluation.matched.is_none() && !evaluation.had_errors() {
            // Guardas limpias pero ninguna aplica: la pregunta sigue abierta.
            return self.hold(tx, &state, step, event);
        }

        tx.record(Some(state.run_id),
                  JournalKind::ReplyAccepted { step_id: step.id.clone(),
                                               event_type: event.event_type().to_string() })?;
        state.context = context;
        match self.resolve_next(tx, &state, step, &evaluation)? {
            Some(next) => self.drive(tx, flow, state, next, 0),
            None => self.no_match_handover(tx, &state, step),
        }
    }

    fn hold(&self,
            tx: &mut dyn LockedState,
            state: &ContactFlowState,
            step: &Step,
            event: &InboundEvent)
            -> Result<HandleOutcome, StoreError> {
        tx.record(Some(state.run_id),
                  JournalKind::ReplyHeld { step_id: step.id.clone(),
                                           event_type: event.event_type().to_string() })?;
        if let StepKind::Question { invalid_reply: Some(template), .. } = &step.kind {
            self.send(&state.contact_id, &template.render(&state.context));
        }
        Ok(HandleOutcome::Held { step_id: step.id.clone() })
    }

    /// Loop de steps automáticos a partir de `next`.
    fn drive(&self,
             tx: &mut dyn LockedState,
             flow: &FlowDefinition,
             mut state: ContactFlowState,
             mut next: String,
             mut executed: usize)
             -> Result<HandleOutcome, StoreError> {
        let executor = StepExecutor::new(self.sender.as_ref(), &self.actions);
        loop {
            if executed >= self.config.max_auto_steps {
                let reason = HandoverReason::LoopLimit { limit: self.config.max_auto_steps };
                return self.hand_over(tx, &state, reason);
            }
            executed += 1;

            let Some(step) = flow.step(&next) else {
                let reason = HandoverReason::MissingStep { flow_id: flow.id.clone(),
                                                           step_id: next };
                return self.hand_over(tx, &state, reason);
            };
            state.current_step = step.id.clone();
            state.touch();
            tx.record(Some(state.run_id),
                      JournalKind::StepEntered { step_id: step.id.clone(),
                                                 step_type: step.step_type() })?;
            debug!("step entered contact_id={} flow={} step={}", state.contact_id, flow.id, step.id);

            let result = match executor.execute(&state, step) {
                Ok(result) => result,
                Err(fatal) => {
                    let reason = HandoverReason::ActionFatal { action: fatal.action,
                                                               message: fatal.message };
                    return self.hand_over(tx, &state, reason);
                }
            };
            if let Some(failure) = &result.action_failure {
                tx.record(Some(state.run_id),
                          JournalKind::ActionFailed { step_id: step.id.clone(),
                                                      action: failure.action.clone(),
                                                      message: failure.message.clone() })?;
            }
            state.context = result.context;

            match result.outcome {
                StepOutcome::AwaitInput => {
                    tx.save(&state)?;
                    return Ok(HandleOutcome::AwaitingInput { flow_id: flow.id.clone(),
                                                             step_id: step.id.clone() });
                }
                StepOutcome::Complete => {
                    tx.clear()?;
                    tx.record(Some(state.run_id), JournalKind::FlowCompleted { flow_id: flow.id.clone() })?;
                    info!("flow completed contact_id={} flow={}", state.contact_id, flow.id);
                    return Ok(HandleOutcome::Completed { flow_id: flow.id.clone() });
                }
                StepOutcome::Continue => {
                    tx.save(&state)?;
                    let Some(fresh) = tx.fetch()? else {
                        warn!("state vanished mid-loop contact_id={} flow={} step={}",
                              state.contact_id, flow.id, step.id);
                        return Ok(HandleOutcome::Aborted);
                    };
                    state = fresh;
                    let evaluation = TransitionEvaluator::evaluate_detailed(step, &state.context, None);
                    match self.resolve_next(tx, &state, step, &evaluation)? {
                        Some(to) => next = to,
                        None => return self.no_match_handover(tx, &state, step),
                    }
                }
            }
        }
    }

    /// Destino tras una evaluación: la transición elegida o, sin coincidencia,
    /// el fallback del step. `None` significa que no hay a dónde ir.
    fn resolve_next(&self,
                    tx: &mut dyn LockedState,
                    state: &ContactFlowState,
                    step: &Step,
                    evaluation: &Evaluation<'_>)
                    -> Result<Option<String>, StoreError> {
        for failure in &evaluation.failures {
            warn!("guard error contact_id={} flow={} step={} {}",
                  state.contact_id, state.flow_id, step.id, failure.describe());
        }
        if let Some(to) = evaluation.next_step() {
            return Ok(Some(to.to_string()));
        }
        warn!("no matching transition contact_id={} flow={} step={} fallback={:?}",
              state.contact_id, state.flow_id, step.id, step.fallback);
        tx.record(Some(state.run_id),
                  JournalKind::TransitionMissed { step_id: step.id.clone(),
                                                  guard_errors: evaluation.failures.iter().map(|f| f.describe()).collect(),
                                                  fallback: step.fallback.clone() })?;
        Ok(step.fallback.clone())
    }

    fn no_match_handover(&self,
                         tx: &mut dyn LockedState,
                         state: &ContactFlowState,
                         step: &Step)
                         -> Result<HandleOutcome, StoreError> {
        let reason = HandoverReason::NoMatchingTransition { flow_id: state.flow_id.clone(),
                                                            step_id: step.id.clone() };
        self.hand_over(tx, state, reason)
    }

    /// Ruta fatal: borra el estado, avisa al contacto y notifica a un humano.
    fn hand_over(&self,
                 tx: &mut dyn LockedState,
                 state: &ContactFlowState,
                 reason: HandoverReason)
                 -> Result<HandleOutcome, StoreError> {
        warn!("handover contact_id={} flow={} step={} reason={reason}",
              state.contact_id, state.flow_id, state.current_step);
        tx.clear()?;
        tx.record(Some(state.run_id), JournalKind::HandoverRequested { reason: reason.clone() })?;
        self.send(&state.contact_id, &Message::text(self.config.handover_message.as_str()));
        if let Err(e) = request_handover_contained(self.handover.as_ref(), &state.contact_id, &reason) {
            warn!("handover notification failed contact_id={} err={e}", state.contact_id);
        }
        Ok(HandleOutcome::HandedOver { reason })
    }

    fn exit(&self, tx: &mut dyn LockedState, state: &ContactFlowState) -> Result<HandleOutcome, StoreError> {
        info!("flow exited by contact contact_id={} flow={} step={}",
              state.contact_id, state.flow_id, state.current_step);
        tx.clear()?;
        tx.record(Some(state.run_id), JournalKind::FlowExited { flow_id: state.flow_id.clone() })?;
        self.send(&state.contact_id, &Message::text(self.config.exit_message.as_str()));
        Ok(HandleOutcome::Exited { flow_id: state.flow_id.clone() })
    }

    fn send(&self, contact_id: &str, message: &Message) {
        if let Err(e) = send_contained(self.sender.as_ref(), contact_id, message) {
            warn!("send failed contact_id={contact_id} err={e}");
        }
    }
}

/// Valida que `event` responda a la pregunta `step`.
fn accept_reply(step: &Step, event: &InboundEvent) -> Option<AcceptedReply> {
    let expected = step.expected_input()?;
    match expected {
        ExpectedInput::Text => {
            let text = event.text_body()?.trim();
            (!text.is_empty()).then(|| AcceptedReply { value: json!(text),
                                                       event: event.clone() })
        }
        ExpectedInput::Choice(options) => {
            if let Some((id, _)) = event.choice() {
                return options.iter()
                              .any(|(option, _)| *option == id)
                              .then(|| AcceptedReply { value: json!(id),
                                                       event: event.clone() });
            }
            let typed = event.text_body()?.trim().to_lowercase();
            let (id, title) = options.iter()
                                     .find(|(id, title)| id.to_lowercase() == typed || title.to_lowercase() == typed)?;
            let mut normalized = InboundEvent::button(event.contact_id.as_str(), *id, *title);
            normalized.message_id = event.message_id.clone();
            normalized.received_at = event.received_at;
            Some(AcceptedReply { value: json!(id),
                                 event: normalized })
        }
        ExpectedInput::Form(form_id) => match &event.kind {
            EventKind::FormReply { form_id: got, response } if got == form_id => {
                Some(AcceptedReply { value: Value::Object(response.clone()),
                                     event: event.clone() })
            }
            _ => None,
        },
    }
}
