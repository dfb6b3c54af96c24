//! Store en memoria: un `Mutex` por contacto dentro de un `DashMap`.
//!
//! La transacción trabaja sobre una copia del estado y sólo la publica si el
//! closure termina en `Ok`; igual con las entradas del journal.
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::debug;
use uuid::Uuid;

use super::{ContactStateStore, LockedState};
use crate::errors::StoreError;
use crate::event::{JournalEntry, JournalKind};
use crate::model::ContactFlowState;

type Slot = Arc<Mutex<Option<ContactFlowState>>>;

#[derive(Default)]
pub struct InMemoryStateStore {
    rows: DashMap<String, Slot>,
    journal: Mutex<Vec<JournalEntry>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, contact_id: &str) -> Slot {
        self.rows.entry(contact_id.to_string()).or_default().clone()
    }

    // Un panic dentro de una transacción no deja datos a medias (nunca se
    // publicó la copia), así que el lock envenenado se puede recuperar.
    fn lock(slot: &Slot) -> MutexGuard<'_, Option<ContactFlowState>> {
        slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn journal_guard(&self) -> MutexGuard<'_, Vec<JournalEntry>> {
        self.journal.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn append_journal(&self, contact_id: &str, pending: Vec<(Option<Uuid>, JournalKind)>) {
        if pending.is_empty() {
            return;
        }
        let mut journal = self.journal_guard();
        let now = Utc::now();
        for (run_id, kind) in pending {
            let seq = journal.len() as u64;
            journal.push(JournalEntry { seq,
                                        contact_id: contact_id.to_string(),
                                        run_id,
                                        kind,
                                        ts: now });
        }
    }

    /// Quita la fila del contacto si quedó vacía y nadie más la tiene tomada.
    /// El predicado corre con el shard bloqueado, así que `slot()` no puede
    /// entregar la fila mientras se decide.
    fn reap(&self, contact_id: &str) {
        self.rows.remove_if(contact_id, |_, slot| Self::is_idle(slot));
    }

    fn is_idle(slot: &Slot) -> bool {
        Arc::strong_count(slot) == 1 && Self::lock(slot).is_none()
    }

    /// Cantidad de contactos con flujo activo.
    pub fn active_count(&self) -> usize {
        self.rows.iter().filter(|entry| Self::lock(entry.value()).is_some()).count()
    }
}

struct MemoryTx {
    contact_id: String,
    current: Option<ContactFlowState>,
    pending: Vec<(Option<Uuid>, JournalKind)>,
}

impl LockedState for MemoryTx {
    fn fetch(&mut self) -> Result<Option<ContactFlowState>, StoreError> {
        Ok(self.current.clone())
    }

    fn save(&mut self, state: &ContactFlowState) -> Result<(), StoreError> {
        if state.contact_id != self.contact_id {
            return Err(StoreError::Internal(format!("state for '{}' saved under lock of '{}'",
                                                    state.contact_id, self.contact_id)));
        }
        self.current = Some(state.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.current = None;
        Ok(())
    }

    fn record(&mut self, run_id: Option<Uuid>, kind: JournalKind) -> Result<(), StoreError> {
        self.pending.push((run_id, kind));
        Ok(())
    }
}

impl ContactStateStore for InMemoryStateStore {
    fn transaction<T, F>(&self, contact_id: &str, work: F) -> Result<T, StoreError>
        where F: FnOnce(&mut dyn LockedState) -> Result<T, StoreError>
    {
        let slot = self.slot(contact_id);
        let result = {
            let mut guard = Self::lock(&slot);
            let mut tx = MemoryTx { contact_id: contact_id.to_string(),
                                    current: guard.clone(),
                                    pending: Vec::new() };
            let result = work(&mut tx);
            if result.is_ok() {
                *guard = tx.current;
                self.append_journal(contact_id, tx.pending);
                debug!("memory tx committed contact_id={contact_id}");
            }
            result
        };
        drop(slot);
        self.reap(contact_id);
        result
    }

    fn load(&self, contact_id: &str) -> Result<Option<ContactFlowState>, StoreError> {
        let Some(slot) = self.rows.get(contact_id).map(|entry| entry.value().clone()) else {
            return Ok(None);
        };
        let state = Self::lock(&slot).clone();
        Ok(state)
    }

    fn journal(&self, contact_id: &str) -> Result<Vec<JournalEntry>, StoreError> {
        Ok(self.journal_guard()
               .iter()
               .filter(|e| e.contact_id == contact_id)
               .cloned()
               .collect())
    }

    fn expire_stale(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut expired = 0;
        for entry in self.rows.iter() {
            let mut guard = Self::lock(entry.value());
            if guard.as_ref().is_some_and(|s| s.updated_at < cutoff) {
                *guard = None;
                expired += 1;
            }
        }
        self.rows.retain(|_, slot| !Self::is_idle(slot));
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::StepType;

    fn state(contact: &str) -> ContactFlowState {
        ContactFlowState::enter(contact, "menu", 1, "welcome")
    }

    #[test]
    fn commit_publishes_state_and_journal() {
        let store = InMemoryStateStore::new();
        store.transaction("c1", |tx| {
                 assert!(tx.fetch()?.is_none());
                 let s = state("c1");
                 tx.save(&s)?;
                 tx.record(Some(s.run_id), JournalKind::StepEntered { step_id: "welcome".into(), step_type: StepType::Message })
             })
             .expect("tx");
        assert_eq!(store.load("c1").expect("load").map(|s| s.current_step), Some("welcome".to_string()));
        assert_eq!(store.journal("c1").expect("journal").len(), 1);
        assert_eq!(store.active_count(), 1);
    }

    #[test]
    fn error_rolls_back_state_and_journal() {
        let store = InMemoryStateStore::new();
        let res: Result<(), _> = store.transaction("c1", |tx| {
                                          tx.save(&state("c1"))?;
                                          tx.record(None, JournalKind::FlowCompleted { flow_id: "menu".into() })?;
                                          Err(StoreError::Internal("boom".into()))
                                      });
        assert!(res.is_err());
        assert!(store.load("c1").expect("load").is_none());
        assert!(store.journal("c1").expect("journal").is_empty());
    }

    #[test]
    fn save_under_foreign_lock_is_rejected() {
        let store = InMemoryStateStore::new();
        let res = store.transaction("c1", |tx| tx.save(&state("c2")));
        assert!(matches!(res, Err(StoreError::Internal(_))));
    }

    #[test]
    fn expire_stale_removes_old_rows_only() {
        let store = InMemoryStateStore::new();
        store.transaction("old", |tx| {
                 let mut s = state("old");
                 s.updated_at = Utc::now() - chrono::Duration::hours(48);
                 tx.save(&s)
             })
             .expect("old");
        store.transaction("new", |tx| tx.save(&state("new"))).expect("new");
        let cutoff = Utc::now() - chrono::Duration::hours(24);
        assert_eq!(store.expire_stale(cutoff).expect("expire"), 1);
        assert!(store.load("old").expect("load").is_none());
        assert!(store.load("new").expect("load").is_some());
    }

    #[test]
    fn empty_rows_are_dropped() {
        let store = InMemoryStateStore::new();
        store.transaction("gone", |tx| tx.save(&state("gone"))).expect("save");
        store.transaction("gone", |tx| tx.clear()).expect("clear");
        let _: Option<ContactFlowState> = store.transaction("peek", |tx| tx.fetch()).expect("peek");
        let res: Result<(), _> = store.transaction("failed", |_| Err(StoreError::Internal("boom".into())));
        assert!(res.is_err());
        assert_eq!(store.rows.len(), 0);

        store.transaction("old", |tx| {
                 let mut s = state("old");
                 s.updated_at = Utc::now() - chrono::Duration::hours(48);
                 tx.save(&s)
             })
             .expect("old");
        store.transaction("new", |tx| tx.save(&state("new"))).expect("new");
        assert_eq!(store.rows.len(), 2);
        store.expire_stale(Utc::now() - chrono::Duration::hours(24)).expect("expire");
        assert_eq!(store.rows.len(), 1);
        assert_eq!(store.active_count(), 1);
    }

    #[test]
    fn busy_row_survives_reap() {
        let store = InMemoryStateStore::new();
        let held = store.slot("c1");
        store.transaction("c1", |tx| tx.clear()).expect("clear");
        assert_eq!(store.rows.len(), 1);
        drop(held);
        store.expire_stale(Utc::now()).expect("expire");
        assert!(store.rows.is_empty());
    }
}
