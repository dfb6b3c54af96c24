//! Eventos: entrantes (normalizados desde el transporte) y journal de
//! decisiones del engine.

mod inbound;
mod journal;

pub use inbound::{EventKind, InboundEvent};
pub use journal::{JournalEntry, JournalKind};
