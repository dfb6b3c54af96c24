//! Modelos neutrales del motor (contexto, estado por contacto, mensajes).

pub mod context;
pub mod message;
pub mod state;

pub use context::{lookup_path, FlowContext};
pub use message::{interpolate, ListRow, ListSection, Message, ReplyButton};
pub use state::{ContactFlowState, FlowStatus};
