
use convo_persistence::PersistenceError;
use diesel::prelude::*;
use diesel::sql_types::{Jsonb, Text};
use serde_json::json;
use test_support::{contact, TEST_POOL};

#[test]
fn unknown_entry_type_is_rejected_by_check() {
    let Some(pool) = TEST_POOL.as_ref() else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
    let mut conn = pool.get().expect("conn");
    let res = diesel::sql_query("INSERT INTO flow_journal (contact_id, entry_type, payload) VALUES ($1, $2, $3)")
        .bind::<Text, _>(contact("check"))
        .bind::<Text, _>("FlowStarted")
        .bind::<Jsonb, _>(json!({}))
        .execute(&mut conn)
        .map_err(PersistenceError::from);
    assert!(matches!(res, Err(PersistenceError::CheckViolation(_))), "got {res:?}");
}

#[test]
fn non_object_context_is_rejected_by_check() {
    let Some(pool) = TEST_POOL.as_ref() else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
    let mut conn = pool.get().expect("conn");
    let res = diesel::sql_query("INSERT INTO contact_flow_states (contact_id, run_id, flow_id, flow_version, current_step, context) \
                                 VALUES ($1, gen_random_uuid(), 'survey', 1, 'intro', '[]'::jsonb)")
        .bind::<Text, _>(contact("ctx"))
        .execute(&mut conn)
        .map_err(PersistenceError::from);
    assert!(matches!(res, Err(PersistenceError::CheckViolation(_))), "got {res:?}");
}
