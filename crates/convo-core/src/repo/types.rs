//! Contratos del store de estado por contacto.
//!
//! Toda mutación de un `ContactFlowState` ocurre dentro de
//! `ContactStateStore::transaction`, que:
//! - adquiere un lock exclusivo para el contacto (exista o no la fila);
//! - entrega una vista `LockedState` para leer/escribir/borrar la fila y
//!   registrar entradas del journal;
//! - confirma todo si el closure devuelve `Ok`, y descarta todo si devuelve
//!   `Err`.
//!
//! Un segundo evento del mismo contacto se bloquea hasta que el primero
//! confirme, y entonces relee el estado desde cero.
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::StoreError;
use crate::event::{JournalEntry, JournalKind};
use crate::model::ContactFlowState;

/// Vista transaccional sobre la fila de un contacto (lock ya adquirido).
pub trait LockedState {
    /// Relee la fila bajo el lock. `None`: el contacto no tiene flujo activo.
    fn fetch(&mut self) -> Result<Option<ContactFlowState>, StoreError>;

    /// Inserta o reemplaza la fila.
    fn save(&mut self, state: &ContactFlowState) -> Result<(), StoreError>;

    /// Elimina la fila (flujo completado, salida o handover).
    fn clear(&mut self) -> Result<(), StoreError>;

    /// Agrega una entrada al journal dentro de la misma transacción.
    fn record(&mut self, run_id: Option<Uuid>, kind: JournalKind) -> Result<(), StoreError>;
}

pub trait ContactStateStore: Send + Sync {
    /// Ejecuta `work` serializado por contacto y de forma atómica.
    fn transaction<T, F>(&self, contact_id: &str, work: F) -> Result<T, StoreError>
        where F: FnOnce(&mut dyn LockedState) -> Result<T, StoreError>;

    /// Lectura sin lock (inspección/operación; no usar para decidir transiciones).
    fn load(&self, contact_id: &str) -> Result<Option<ContactFlowState>, StoreError>;

    /// Entradas del journal de un contacto en orden de `seq`.
    fn journal(&self, contact_id: &str) -> Result<Vec<JournalEntry>, StoreError>;

    /// Elimina estados sin actividad desde `cutoff`. Devuelve cuántos borró.
    fn expire_stale(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;
}
