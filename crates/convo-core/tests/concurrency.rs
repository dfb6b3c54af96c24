//! Serialización por contacto y supresión de formularios duplicados.

use std::sync::Barrier;
use std::thread;

use convo_core::engine::HandleOutcome;
use convo_core::event::InboundEvent;
use serde_json::json;
use test_support::{quote_form, Harness};

#[test]
fn concurrent_events_for_one_contact_never_lose_updates() {
    let h = Harness::new();
    assert!(matches!(h.text("c", "contar"), HandleOutcome::AwaitingInput { .. }));

    const WORKERS: usize = 8;
    let barrier = Barrier::new(WORKERS);
    let outcomes: Vec<HandleOutcome> = thread::scope(|s| {
        let handles: Vec<_> = (0..WORKERS).map(|i| {
                                              let h = &h;
                                              let barrier = &barrier;
                                              s.spawn(move || {
                                                   barrier.wait();
                                                   h.text("c", &format!("evento {i}"))
                                               })
                                          })
                                          .collect();
        handles.into_iter().map(|t| t.join().expect("worker")).collect()
    });

    assert!(outcomes.iter().all(|o| matches!(o, HandleOutcome::AwaitingInput { step_id, .. } if step_id == "ask")));
    let state = h.engine.state_of("c").expect("load").expect("state");
    // Cada evento observó el contador que dejó el anterior.
    assert_eq!(state.context.get("count"), Some(&json!(WORKERS as u64)));
}

#[test]
fn duplicate_form_delivery_runs_side_effect_once() {
    let h = Harness::new();
    h.reach_quote_form("c");

    let barrier = Barrier::new(2);
    let outcomes: Vec<HandleOutcome> = thread::scope(|s| {
        let handles: Vec<_> = (0..2).map(|i| {
                                        let h = &h;
                                        let barrier = &barrier;
                                        s.spawn(move || {
                                             let mut ev = quote_form("c");
                                             ev.message_id = Some(format!("wamid.{i}"));
                                             barrier.wait();
                                             h.engine.handle_event(&ev).expect("handle")
                                         })
                                    })
                                    .collect();
        handles.into_iter().map(|t| t.join().expect("worker")).collect()
    });

    let advanced = outcomes.iter()
                           .filter(|o| matches!(o, HandleOutcome::AwaitingInput { step_id, .. } if step_id == "ask_install"))
                           .count();
    let replayed = outcomes.iter()
                           .filter(|o| matches!(o, HandleOutcome::Replayed { step_id } if step_id == "ask_install"))
                           .count();
    assert_eq!((advanced, replayed), (1, 1), "outcomes: {outcomes:?}");
    assert_eq!(h.book.calls(), 1);
    assert_eq!(h.book.count(), 1);
    assert_eq!(h.codes("c").iter().filter(|c| **c == "R").count(), 1);
}

#[test]
fn webhook_retry_after_commit_is_replayed() {
    let h = Harness::new();
    h.reach_quote_form("c");
    let first = h.engine.handle_event(&quote_form("c")).expect("first");
    assert!(matches!(first, HandleOutcome::AwaitingInput { .. }));
    let sent_before = h.sender.len();

    // Mismos campos en otro orden: mismo hash de envío.
    let retry = InboundEvent::form("c", "quote", json!({ "quantity": 2, "product": "kit-5kw" }));
    let second = h.engine.handle_event(&retry).expect("retry");
    assert_eq!(second, HandleOutcome::Replayed { step_id: "ask_install".into() });
    assert_eq!(h.book.calls(), 1);
    assert_eq!(h.sender.len(), sent_before);

    // Un replay interno explícito tampoco reevalúa transiciones.
    let hash = quote_form("c").submission_hash().expect("hash");
    let replay = InboundEvent::new("c",
                                   convo_core::event::EventKind::InternalReplay { form_id: "quote".into(),
                                                                                  submission_hash: hash });
    assert_eq!(h.engine.handle_event(&replay).expect("replay"),
               HandleOutcome::Replayed { step_id: "ask_install".into() });
}

#[test]
fn different_contacts_progress_independently() {
    let h = Harness::new();
    let contacts: Vec<String> = (0..12).map(|i| format!("52155500{i:02}")).collect();
    thread::scope(|s| {
        for contact in &contacts {
            let h = &h;
            s.spawn(move || {
                 assert!(matches!(h.text(contact, "encuesta"), HandleOutcome::AwaitingInput { .. }));
                 assert_eq!(h.text(contact, "3"), HandleOutcome::Completed { flow_id: "survey".into() });
             });
        }
    });
    for contact in &contacts {
        assert!(h.engine.state_of(contact).expect("load").is_none());
        assert_eq!(h.codes(contact), vec!["I", "S", "S", "A", "S", "C"]);
    }
}
