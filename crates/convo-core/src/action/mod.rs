//! Registro de acciones externas invocables desde steps `action`/`terminal`.
//!
//! Los efectos de dominio (crear pedido, encolar notificación, clasificar
//! intención) viven detrás de este contrato; el engine sólo conoce nombres.

mod registry;

pub use registry::{ActionContext, ActionRegistry, FlowAction};
