//! Almacenamiento de `ContactFlowState` con disciplina lock-then-transact.

mod memory;
mod types;

pub use memory::InMemoryStateStore;
pub use types::{ContactStateStore, LockedState};
