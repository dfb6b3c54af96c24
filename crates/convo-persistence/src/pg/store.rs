//! `PgStateStore`: implementación Postgres de `ContactStateStore`.
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use diesel::sql_types::Text;
use diesel::upsert::excluded;
use log::{debug, warn};
use serde_json::Value;
use uuid::Uuid;

use convo_core::errors::StoreError;
use convo_core::event::{JournalEntry, JournalKind};
use convo_core::model::{ContactFlowState, FlowContext};
use convo_core::repo::{ContactStateStore, LockedState};

use super::{with_retry, ConnectionProvider, PgPool, PoolProvider};
use crate::error::PersistenceError;
use crate::schema::{contact_flow_states, flow_journal};

#[derive(Queryable, Debug)]
struct StateRow {
    contact_id: String,
    run_id: Uuid,
    flow_id: String,
    flow_version: i32,
    current_step: String,
    context: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl StateRow {
    fn into_state(self) -> Result<ContactFlowState, StoreError> {
        let flow_version = u32::try_from(self.flow_version).map_err(|_| {
                                                                StoreError::Corrupt(format!("negative flow_version for '{}'",
                                                                                            self.contact_id))
                                                            })?;
        let context = FlowContext::from_value(self.context).ok_or_else(|| {
                                                               StoreError::Corrupt(format!("context of '{}' is not an object",
                                                                                           self.contact_id))
                                                           })?;
        Ok(ContactFlowState { contact_id: self.contact_id,
                              run_id: self.run_id,
                              flow_id: self.flow_id,
                              flow_version,
                              current_step: self.current_step,
                              context,
                              created_at: self.created_at,
                              updated_at: self.updated_at })
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = contact_flow_states)]
struct NewStateRow<'a> {
    contact_id: &'a str,
    run_id: &'a Uuid,
    flow_id: &'a str,
    flow_version: i32,
    current_step: &'a str,
    context: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Queryable, Debug)]
struct JournalRow {
    seq: i64,
    contact_id: String,
    run_id: Option<Uuid>,
    ts: DateTime<Utc>,
    entry_type: String,
    payload: Value,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = flow_journal)]
struct NewJournalRow<'a> {
    contact_id: &'a str,
    run_id: Option<&'a Uuid>,
    entry_type: &'a str,
    payload: &'a Value,
}

fn db(err: DieselError) -> StoreError {
    PersistenceError::from(err).into()
}

/// Vista `LockedState` sobre una conexión con la transacción abierta y el
/// advisory lock del contacto tomado.
struct PgTx<'c> {
    conn: &'c mut PgConnection,
    contact_id: &'c str,
}

impl LockedState for PgTx<'_> {
    fn fetch(&mut self) -> Result<Option<ContactFlowState>, StoreError> {
        let row = contact_flow_states::table.find(self.contact_id)
                                            .for_update()
                                            .first::<StateRow>(self.conn)
                                            .optional()
                                            .map_err(db)?;
        row.map(StateRow::into_state).transpose()
    }

    fn save(&mut self, state: &ContactFlowState) -> Result<(), StoreError> {
        if state.contact_id != self.contact_id {
            return Err(StoreError::Internal(format!("state for '{}' saved under lock of '{}'",
                                                    state.contact_id, self.contact_id)));
        }
        let flow_version = i32::try_from(state.flow_version)
            .map_err(|_| StoreError::Internal(format!("flow_version {} out of range", state.flow_version)))?;
        let row = NewStateRow { contact_id: &state.contact_id,
                                run_id: &state.run_id,
                                flow_id: &state.flow_id,
                                flow_version,
                                current_step: &state.current_step,
                                context: state.context.to_value(),
                                created_at: state.created_at,
                                updated_at: state.updated_at };
        use contact_flow_states::dsl as s;
        diesel::insert_into(contact_flow_states::table).values(&row)
                                                       .on_conflict(s::contact_id)
                                                       .do_update()
                                                       .set((s::run_id.eq(excluded(s::run_id)),
                                                             s::flow_id.eq(excluded(s::flow_id)),
                                                             s::flow_version.eq(excluded(s::flow_version)),
                                                             s::current_step.eq(excluded(s::current_step)),
                                                             s::context.eq(excluded(s::context)),
                                                             s::created_at.eq(excluded(s::created_at)),
                                                             s::updated_at.eq(excluded(s::updated_at))))
                                                       .execute(self.conn)
                                                       .map_err(db)?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        diesel::delete(contact_flow_states::table.find(self.contact_id)).execute(self.conn)
                                                                        .map_err(db)?;
        Ok(())
    }

    fn record(&mut self, run_id: Option<Uuid>, kind: JournalKind) -> Result<(), StoreError> {
        let payload = serde_json::to_value(&kind).map_err(|e| StoreError::Internal(format!("journal payload: {e}")))?;
        let row = NewJournalRow { contact_id: self.contact_id,
                                  run_id: run_id.as_ref(),
                                  entry_type: kind.entry_type(),
                                  payload: &payload };
        diesel::insert_into(flow_journal::table).values(&row)
                                                .execute(self.conn)
                                                .map_err(db)?;
        Ok(())
    }
}

/// Store durable: estado + journal en la misma transacción.
pub struct PgStateStore<P: ConnectionProvider> {
    provider: P,
}

impl<P: ConnectionProvider> PgStateStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl PgStateStore<PoolProvider> {
    pub fn from_pool(pool: PgPool) -> Self {
        Self::new(PoolProvider { pool })
    }
}

impl<P: ConnectionProvider> ContactStateStore for PgStateStore<P> {
    fn transaction<T, F>(&self, contact_id: &str, work: F) -> Result<T, StoreError>
        where F: FnOnce(&mut dyn LockedState) -> Result<T, StoreError>
    {
        let mut conn = with_retry(|| self.provider.connection())?;
        let result = conn.build_transaction()
                         .read_write()
                         .run(|tx_conn| -> Result<T, PersistenceError> {
                             diesel::sql_query("SELECT pg_advisory_xact_lock(hashtext($1))").bind::<Text, _>(contact_id)
                                                                                           .execute(tx_conn)?;
                             let mut tx = PgTx { conn: tx_conn, contact_id };
                             Ok(work(&mut tx)?)
                         });
        match &result {
            Ok(_) => debug!("pg tx committed contact_id={contact_id}"),
            Err(e) => debug!("pg tx rolled back contact_id={contact_id}: {e}"),
        }
        result.map_err(StoreError::from)
    }

    fn load(&self, contact_id: &str) -> Result<Option<ContactFlowState>, StoreError> {
        let row = with_retry(|| {
                      let mut conn = self.provider.connection()?;
                      contact_flow_states::table.find(contact_id)
                                                .first::<StateRow>(&mut conn)
                                                .optional()
                                                .map_err(PersistenceError::from)
                  })?;
        row.map(StateRow::into_state).transpose()
    }

    fn journal(&self, contact_id: &str) -> Result<Vec<JournalEntry>, StoreError> {
        let rows = with_retry(|| {
                       let mut conn = self.provider.connection()?;
                       flow_journal::table.filter(flow_journal::contact_id.eq(contact_id))
                                          .order(flow_journal::seq.asc())
                                          .load::<JournalRow>(&mut conn)
                                          .map_err(PersistenceError::from)
                   })?;
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_value::<JournalKind>(row.payload) {
                Ok(kind) => entries.push(JournalEntry { seq: row.seq.max(0) as u64,
                                                        contact_id: row.contact_id,
                                                        run_id: row.run_id,
                                                        kind,
                                                        ts: row.ts }),
                Err(e) => warn!("journal seq={} ({}) con payload ilegible: {e}", row.seq, row.entry_type),
            }
        }
        Ok(entries)
    }

    fn expire_stale(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut conn = with_retry(|| self.provider.connection())?;
        let n = diesel::delete(contact_flow_states::table.filter(contact_flow_states::updated_at.lt(cutoff)))
            .execute(&mut conn)
            .map_err(db)?;
        debug!("expired {n} contact states older than {cutoff}");
        Ok(n)
    }
}
