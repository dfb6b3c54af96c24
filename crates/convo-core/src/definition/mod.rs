//! Flow Definition Store: grafo inmutable de steps y transiciones por flujo.
//!
//! Las definiciones se cargan desde configuración al arrancar, se validan una
//! sola vez y quedan de sólo lectura durante la ejecución.

mod catalog;
mod flow;
mod guard;
mod step;

pub use catalog::FlowCatalog;
pub use flow::{FlowConfig, FlowDefinition, Trigger};
pub use guard::{Guard, GuardScope};
pub use step::{ActionCall, ExpectedInput, Step, StepKind, StepType, Transition};
