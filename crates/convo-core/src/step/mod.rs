//! Step Executor: efectos secundarios de cada tipo de step.
//!
//! - `message`: renderiza, envía y continúa;
//! - `question`: renderiza, envía, marca "esperando respuesta" y suspende;
//! - `action`: invoca una acción registrada y mezcla su resultado;
//! - `terminal`: efectos finales y fin del flujo.

mod executor;
mod outcome;

pub use executor::{render_params, StepExecutor};
pub use outcome::{ActionFailure, ExecutionResult, FatalStep, StepOutcome};
