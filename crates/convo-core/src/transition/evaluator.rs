//! Evaluación de transiciones en orden de declaración.
//!
//! Reglas:
//! - gana la primera transición cuyas guardas pasan todas (first-match-wins);
//! - una guarda que falla con error descarta sólo esa transición; la
//!   evaluación sigue con las siguientes;
//! - sin coincidencias el resultado es "no match" y decide el caller.
//!
//! No hay efectos secundarios: los errores se devuelven en `failures` para que
//! el engine los registre.
use log::warn;

use crate::definition::{GuardScope, Step, Transition};
use crate::errors::GuardError;
use crate::event::InboundEvent;
use crate::model::FlowContext;

#[derive(Debug, Clone, PartialEq)]
pub struct GuardFailure {
    /// Índice de la transición dentro del step.
    pub transition: usize,
    pub to: String,
    pub error: GuardError,
}

impl GuardFailure {
    pub fn describe(&self) -> String {
        format!("#{} -> {}: {}", self.transition, self.to, self.error)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation<'a> {
    pub matched: Option<&'a Transition>,
    pub failures: Vec<GuardFailure>,
}

impl<'a> Evaluation<'a> {
    pub fn next_step(&self) -> Option<&'a str> {
        self.matched.map(|t| t.to.as_str())
    }

    pub fn had_errors(&self) -> bool {
        !self.failures.is_empty()
    }
}

pub struct TransitionEvaluator;

impl TransitionEvaluator {
    /// Contrato mínimo: destino de la primera transición que aplica, o `None`.
    /// Los errores de guardas se registran en el log y cuentan como no-match.
    pub fn evaluate<'a>(step: &'a Step, context: &FlowContext, event: Option<&InboundEvent>) -> Option<&'a str> {
        let evaluation = Self::evaluate_detailed(step, context, event);
        for failure in &evaluation.failures {
            warn!("guard error step={} {}", step.id, failure.describe());
        }
        evaluation.next_step()
    }

    /// Igual que `evaluate` pero devuelve también las guardas que fallaron.
    pub fn evaluate_detailed<'a>(step: &'a Step, context: &FlowContext, event: Option<&InboundEvent>) -> Evaluation<'a> {
        let scope = GuardScope::new(context, event);
        let mut failures = Vec::new();
        for (index, transition) in step.transitions.iter().enumerate() {
            match Self::passes(transition, &scope) {
                Ok(true) => return Evaluation { matched: Some(transition), failures },
                Ok(false) => {}
                Err(error) => failures.push(GuardFailure { transition: index,
                                                           to: transition.to.clone(),
                                                           error }),
            }
        }
        Evaluation { matched: None, failures }
    }

    fn passes(transition: &Transition, scope: &GuardScope<'_>) -> Result<bool, GuardError> {
        for guard in &transition.when {
            if !guard.check(scope)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
