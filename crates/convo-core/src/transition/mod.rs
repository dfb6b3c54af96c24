//! Transition Evaluator: función pura (step, contexto, evento) → siguiente step.

mod evaluator;

pub use evaluator::{Evaluation, GuardFailure, TransitionEvaluator};
