//! Esquema Diesel (mantenido a mano). Reemplazable con `diesel print-schema`.

diesel::table! {
    contact_flow_states (contact_id) {
        contact_id -> Text,
        run_id -> Uuid,
        flow_id -> Text,
        flow_version -> Int4,
        current_step -> Text,
        context -> Jsonb,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    flow_journal (seq) {
        seq -> BigInt,
        contact_id -> Text,
        run_id -> Nullable<Uuid>,
        ts -> Timestamptz,
        entry_type -> Text,
        payload -> Jsonb,
    }
}

diesel::allow_tables_to_appear_in_same_query!(contact_flow_states, flow_journal,);
