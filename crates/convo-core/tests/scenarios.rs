//! Recorridos completos de conversación contra el store en memoria.

use convo_core::config::DEFAULT_EXIT_MESSAGE;
use convo_core::engine::{HandleOutcome, HandoverReason};
use convo_core::event::{InboundEvent, JournalKind};
use convo_core::model::FlowStatus;
use serde_json::json;
use test_support::{quote_form, Harness};

#[test]
fn trigger_runs_message_then_suspends_on_question() {
    let h = Harness::new();
    let out = h.text("521", "  Menu ");
    assert_eq!(out,
               HandleOutcome::AwaitingInput { flow_id: "sales".into(),
                                              step_id: "ask_need".into() });

    let state = h.engine.state_of("521").expect("load").expect("state created");
    assert_eq!(state.current_step, "ask_need");
    assert_eq!(state.flow_version, 3);
    assert_eq!(state.context.awaiting_reply(), Some("ask_need"));
    assert_eq!(h.sender.bodies_to("521"),
               vec!["¡Hola! Soy el asistente de Solar Norte.".to_string(), "¿En qué te ayudamos?".to_string()]);
    assert_eq!(h.codes("521"), vec!["I", "S", "S"]);
    assert!(matches!(h.engine.status_of("521").expect("status"), FlowStatus::AwaitingInput { .. }));
}

#[test]
fn flow_started_records_definition_hash() {
    let h = Harness::new();
    h.text("c", "hola");
    let journal = h.engine.journal("c").expect("journal");
    let JournalKind::FlowStarted { definition_hash, flow_version, .. } = &journal[0].kind else {
        panic!("first entry must be FlowStarted, got {:?}", journal[0].kind);
    };
    assert_eq!(*flow_version, 3);
    assert_eq!(definition_hash, &h.engine.catalog().get("sales").expect("sales").definition_hash);
}

#[test]
fn expected_text_answer_completes_flow() {
    let h = Harness::new();
    assert!(matches!(h.text("c", "encuesta"), HandleOutcome::AwaitingInput { .. }));
    let out = h.text("c", "5");
    assert_eq!(out, HandleOutcome::Completed { flow_id: "survey".into() });
    assert!(h.engine.state_of("c").expect("load").is_none());
    assert_eq!(h.last_body("c").as_deref(), Some("¡Gracias! Calificaste con 5."));
    assert_eq!(h.codes("c"), vec!["I", "S", "S", "A", "S", "C"]);
}

#[test]
fn clean_false_guards_hold_the_question() {
    let h = Harness::new();
    h.text("c", "encuesta");
    let before = h.engine.state_of("c").expect("load");
    let out = h.text("c", "10");
    assert_eq!(out, HandleOutcome::Held { step_id: "ask_rating".into() });
    assert_eq!(h.engine.state_of("c").expect("load"), before);
    assert_eq!(h.last_body("c").as_deref(), Some("Responde con un número del 1 al 5."));
    // Sigue esperando: una respuesta válida avanza.
    assert_eq!(h.text("c", "4"), HandleOutcome::Completed { flow_id: "survey".into() });
}

#[test]
fn unknown_button_is_held_without_state_change() {
    let h = Harness::new();
    h.text("c", "menu");
    let before = h.engine.state_of("c").expect("load");
    let out = h.button("c", "sell", "Vender");
    assert_eq!(out, HandleOutcome::Held { step_id: "ask_need".into() });
    assert_eq!(h.engine.state_of("c").expect("load"), before);
    assert_eq!(h.codes("c").last(), Some(&"W"));
    assert_eq!(h.last_body("c").as_deref(), Some("Elige una opción del menú."));

    // Un formulario tampoco responde a una pregunta de botones.
    let out = h.engine.handle_event(&quote_form("c")).expect("handle");
    assert_eq!(out, HandleOutcome::Held { step_id: "ask_need".into() });
}

#[test]
fn typed_option_title_counts_as_selection() {
    let h = Harness::new();
    h.text("c", "menu");
    let out = h.text("c", "comprar");
    assert_eq!(out,
               HandleOutcome::AwaitingInput { flow_id: "sales".into(),
                                              step_id: "ask_name".into() });
    let state = h.engine.state_of("c").expect("load").expect("state");
    assert_eq!(state.context.get("need"), Some(&json!("buy")));
}

#[test]
fn full_sales_flow_creates_order_and_notifies_installers() {
    let h = Harness::new();
    h.reach_quote_form("c");
    let out = h.engine.handle_event(&quote_form("c")).expect("form");
    assert_eq!(out,
               HandleOutcome::AwaitingInput { flow_id: "sales".into(),
                                              step_id: "ask_install".into() });
    assert!(h.sender.bodies_to("c").contains(&"Pedido ORD-00001 registrado.".to_string()));
    assert_eq!(h.book.count(), 1);
    let order = &h.book.orders_for("c")[0];
    assert_eq!(order.request.product, "kit-5kw");
    assert_eq!(order.request.quantity, 2);

    let state = h.engine.state_of("c").expect("load").expect("state");
    assert_eq!(state.context.get("name"), Some(&json!("Rosa")));
    assert_eq!(state.context.lookup("quote.product"), Some(&json!("kit-5kw")));

    let out = h.button("c", "yes", "Sí");
    assert_eq!(out, HandleOutcome::Completed { flow_id: "sales".into() });
    assert_eq!(h.last_body("c").as_deref(), Some("Un técnico te llamará, Rosa."));
    let pending = h.queue.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].recipient, "instalaciones");
    assert_eq!(pending[0].data, json!({ "order": "ORD-00001" }));
}

#[test]
fn non_fatal_action_failure_branches_on_action_error() {
    let h = Harness::new();
    h.reach_quote_form("c");
    let incomplete = InboundEvent::form("c", "quote", json!({ "quantity": 1 }));
    let out = h.engine.handle_event(&incomplete).expect("form");
    assert_eq!(out, HandleOutcome::Completed { flow_id: "sales".into() });
    assert_eq!(h.last_body("c").as_deref(), Some("No pudimos registrar tu pedido, Rosa. Te contactaremos."));
    assert!(h.codes("c").contains(&"X"));
    assert!(h.handover.is_empty());
    assert_eq!(h.book.count(), 0);
}

#[test]
fn guard_error_with_fallback_takes_fallback_step() {
    let h = Harness::new();
    h.text("c", "cotizar");
    let out = h.text("c", "12");
    assert_eq!(out, HandleOutcome::Completed { flow_id: "qualify".into() });
    assert_eq!(h.last_body("c").as_deref(), Some("Un asesor revisará tu caso."));
    assert!(h.handover.is_empty());

    let journal = h.engine.journal("c").expect("journal");
    let missed = journal.iter()
                        .find_map(|e| match &e.kind {
                            JournalKind::TransitionMissed { guard_errors, fallback, .. } => Some((guard_errors.clone(), fallback.clone())),
                            _ => None,
                        })
                        .expect("TransitionMissed entry");
    assert_eq!(missed.0.len(), 1);
    assert!(missed.0[0].contains("budget.max"));
    assert_eq!(missed.1.as_deref(), Some("manual"));
}

#[test]
fn guard_error_without_fallback_hands_over_and_clears() {
    let h = Harness::new();
    h.text("c", "estricto");
    let out = h.text("c", "123");
    assert_eq!(out,
               HandleOutcome::HandedOver { reason: HandoverReason::NoMatchingTransition { flow_id: "strict".into(),
                                                                                          step_id: "ask".into() } });
    assert!(h.engine.state_of("c").expect("load").is_none());
    assert_eq!(h.handover.for_contact("c").len(), 1);
    assert_eq!(h.last_body("c"), Some(h.engine.config().handover_message.clone()));
    assert_eq!(h.codes("c").last(), Some(&"H"));

    // El contacto puede volver a entrar desde cero.
    assert!(matches!(h.text("c", "estricto"), HandleOutcome::AwaitingInput { .. }));
}

#[test]
fn first_matching_transition_wins_after_action() {
    let h = Harness::new();
    h.text("a", "ayuda");
    // "buy" y "exists intent" pasan; gana la declarada primero.
    assert_eq!(h.text("a", "quiero cotizar paneles"), HandleOutcome::Completed { flow_id: "route".into() });
    assert_eq!(h.last_body("a").as_deref(), Some("Te paso con ventas."));

    h.text("b", "ayuda");
    assert_eq!(h.text("b", "tengo una duda"), HandleOutcome::Completed { flow_id: "route".into() });
    assert_eq!(h.last_body("b").as_deref(), Some("Te paso con un asesor."));
}

#[test]
fn exit_keyword_leaves_the_flow() {
    let h = Harness::new();
    h.text("c", "menu");
    assert_eq!(h.text("c", "SALIR"), HandleOutcome::Exited { flow_id: "sales".into() });
    assert!(h.engine.state_of("c").expect("load").is_none());
    assert_eq!(h.last_body("c").as_deref(), Some(DEFAULT_EXIT_MESSAGE));
    assert_eq!(h.codes("c").last(), Some(&"E"));
    assert!(matches!(h.text("c", "menu"), HandleOutcome::AwaitingInput { .. }));
}

#[test]
fn events_without_flow_or_trigger_are_ignored() {
    let h = Harness::new();
    assert_eq!(h.text("c", "buenas tardes"), HandleOutcome::NoActiveFlow);
    assert_eq!(h.button("c", "yes", "Sí"), HandleOutcome::NoActiveFlow);
    assert!(h.engine.state_of("c").expect("load").is_none());
    assert!(h.sender.is_empty());
    assert!(h.codes("c").is_empty());
}

#[test]
fn choice_trigger_runs_automatic_flow_to_completion() {
    let h = Harness::new();
    let out = h.button("c", "express_order", "Pedido exprés");
    assert_eq!(out, HandleOutcome::Completed { flow_id: "express".into() });
    assert_eq!(h.last_body("c").as_deref(), Some("Pedido ORD-00001 listo."));
    assert_eq!(h.codes("c"), vec!["I", "S", "S", "C"]);
}

#[test]
fn reset_and_expire_clear_active_flows() {
    let h = Harness::new();
    h.text("a", "menu");
    h.text("b", "menu");
    assert!(h.engine.reset("a").expect("reset"));
    assert!(!h.engine.reset("a").expect("reset again"));
    assert_eq!(h.engine.status_of("a").expect("status"), FlowStatus::NoActiveFlow);

    let cutoff = chrono::Utc::now() + chrono::Duration::seconds(1);
    assert_eq!(h.engine.expire_stale(cutoff).expect("expire"), 1);
    assert!(h.engine.state_of("b").expect("load").is_none());
}

#[test]
fn repeated_form_question_accepts_same_values_as_new_answer() {
    let h = Harness::new();
    assert!(matches!(h.text("c", "lectura"), HandleOutcome::AwaitingInput { .. }));
    let reading = |wamid: &str| {
        let mut ev = InboundEvent::form("c", "reading", json!({ "kwh": 10 }));
        ev.message_id = Some(wamid.to_string());
        ev
    };
    let awaiting = HandleOutcome::AwaitingInput { flow_id: "meter".into(),
                                                  step_id: "ask_reading".into() };

    assert_eq!(h.engine.handle_event(&reading("wamid.A")).expect("first"), awaiting);
    // Misma lectura en un mensaje nuevo: la pregunta se volvió a hacer.
    assert_eq!(h.engine.handle_event(&reading("wamid.B")).expect("second"), awaiting);
    let state = h.engine.state_of("c").expect("load").expect("state");
    assert_eq!(state.context.get("count"), Some(&json!(2)));

    // Reentrega del último mensaje: sigue siendo un reintento.
    assert_eq!(h.engine.handle_event(&reading("wamid.B")).expect("retry"),
               HandleOutcome::Replayed { step_id: "ask_reading".into() });
    let state = h.engine.state_of("c").expect("load").expect("state");
    assert_eq!(state.context.get("count"), Some(&json!(2)));
    assert_eq!(state.context.awaiting_reply(), Some("ask_reading"));
}

#[test]
fn repeated_form_question_without_message_ids_still_advances() {
    let h = Harness::new();
    h.text("c", "lectura");
    let reading = InboundEvent::form("c", "reading", json!({ "kwh": 10 }));
    h.engine.handle_event(&reading).expect("first");
    h.engine.handle_event(&reading).expect("second");
    let state = h.engine.state_of("c").expect("load").expect("state");
    assert_eq!(state.context.get("count"), Some(&json!(2)));
    assert_eq!(h.codes("c").iter().filter(|c| **c == "R").count(), 0);
}
