//! Ajustes del engine leídos del entorno (con defaults razonables).
use std::env;

use chrono::{DateTime, Duration, Utc};
use log::warn;

use crate::constants::DEFAULT_MAX_AUTO_STEPS;

pub const DEFAULT_HANDOVER_MESSAGE: &str = "Un asesor te contactará en breve para continuar.";
pub const DEFAULT_EXIT_MESSAGE: &str = "Listo, cancelamos la conversación. Escribe \"menu\" cuando quieras volver.";
pub const DEFAULT_EXIT_KEYWORDS: &str = "salir,cancelar,stop";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Máximo de steps ejecutados por un solo evento entrante.
    pub max_auto_steps: usize,
    pub handover_message: String,
    /// Palabras (normalizadas a minúsculas) que abandonan el flujo activo.
    pub exit_keywords: Vec<String>,
    pub exit_message: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_auto_steps: DEFAULT_MAX_AUTO_STEPS,
               handover_message: DEFAULT_HANDOVER_MESSAGE.to_string(),
               exit_keywords: parse_keywords(DEFAULT_EXIT_KEYWORDS),
               exit_message: DEFAULT_EXIT_MESSAGE.to_string() }
    }
}

/// Instante antes del cual un estado sin actividad se considera vencido.
/// `None` si `hours` no es positivo o el resultado sale del rango de `chrono`.
pub fn stale_cutoff(hours: i64) -> Option<DateTime<Utc>> {
    if hours <= 0 {
        return None;
    }
    Duration::try_hours(hours).and_then(|ttl| Utc::now().checked_sub_signed(ttl))
}

impl EngineConfig {
    /// `CONVO_MAX_AUTO_STEPS`, `CONVO_HANDOVER_MESSAGE`, `CONVO_EXIT_KEYWORDS`,
    /// `CONVO_EXIT_MESSAGE`. Valores ausentes o inválidos usan el default.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(raw) = env::var("CONVO_MAX_AUTO_STEPS") {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => cfg.max_auto_steps = n,
                _ => warn!("CONVO_MAX_AUTO_STEPS='{raw}' inválido; usando {}", cfg.max_auto_steps),
            }
        }
        if let Ok(msg) = env::var("CONVO_HANDOVER_MESSAGE") {
            cfg.handover_message = msg;
        }
        if let Ok(raw) = env::var("CONVO_EXIT_KEYWORDS") {
            cfg.exit_keywords = parse_keywords(&raw);
        }
        if let Ok(msg) = env::var("CONVO_EXIT_MESSAGE") {
            cfg.exit_message = msg;
        }
        cfg
    }

    pub fn with_max_auto_steps(mut self, n: usize) -> Self {
        self.max_auto_steps = n.max(1);
        self
    }

    pub fn is_exit_keyword(&self, text: &str) -> bool {
        let text = text.trim().to_lowercase();
        self.exit_keywords.iter().any(|k| *k == text)
    }
}

fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
       .map(|k| k.trim().to_lowercase())
       .filter(|k| !k.is_empty())
       .collect()
}
