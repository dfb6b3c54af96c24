//! Flow Engine: orquestador, builder y resultados observables.

pub mod builder;
pub mod core;
mod outcome;

pub use builder::{EngineBuilder, EngineBuilderInit};
pub use core::FlowEngine;
pub use outcome::{HandleOutcome, HandoverReason};
