//! Configuración central de la aplicación.
//! Carga variables de entorno (.env) una sola vez y expone `AppConfig`.
use std::env;
use std::path::PathBuf;

use convo_core::config::{stale_cutoff, EngineConfig};
use log::warn;
use once_cell::sync::Lazy;

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenvy::dotenv();
});

pub const DEFAULT_FLOWS_PATH: &str = "flows.json";
pub const DEFAULT_HANDOVER_RECIPIENT: &str = "soporte";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Documento de flujos (`CONVO_FLOWS_PATH`).
    pub flows_path: PathBuf,
    /// Destinatario del aviso de handover en el canal `staff`.
    pub handover_recipient: String,
    /// Si está definido, un job periódico expira estados sin actividad.
    pub state_ttl_hours: Option<i64>,
    /// Cada cuántos segundos corre el job de expiración.
    pub expiry_interval_secs: u64,
    pub engine: EngineConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Lazy::force(&DOTENV_LOADED);
        let flows_path = env::var("CONVO_FLOWS_PATH").map(PathBuf::from)
                                                     .unwrap_or_else(|_| PathBuf::from(DEFAULT_FLOWS_PATH));
        let handover_recipient =
            env::var("CONVO_HANDOVER_RECIPIENT").unwrap_or_else(|_| DEFAULT_HANDOVER_RECIPIENT.to_string());
        let state_ttl_hours = env::var("CONVO_STATE_TTL_HOURS").ok().and_then(|raw| {
            let hours = parse_ttl_hours(&raw);
            if hours.is_none() {
                warn!("CONVO_STATE_TTL_HOURS='{raw}' inválido; expiración desactivada");
            }
            hours
        });
        let expiry_interval_secs = env::var("CONVO_EXPIRY_INTERVAL_SECS").ok()
                                                                         .and_then(|v| v.parse().ok())
                                                                         .filter(|s| *s > 0)
                                                                         .unwrap_or(600);
        Self { flows_path,
               handover_recipient,
               state_ttl_hours,
               expiry_interval_secs,
               engine: EngineConfig::from_env() }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { flows_path: PathBuf::from(DEFAULT_FLOWS_PATH),
               handover_recipient: DEFAULT_HANDOVER_RECIPIENT.to_string(),
               state_ttl_hours: None,
               expiry_interval_secs: 600,
               engine: EngineConfig::default() }
    }
}

/// Horas positivas cuyo cutoff es representable; cualquier otra cosa desactiva el job.
fn parse_ttl_hours(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok().filter(|h| stale_cutoff(*h).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_hours_must_yield_a_valid_cutoff() {
        assert_eq!(parse_ttl_hours(" 72 "), Some(72));
        assert_eq!(parse_ttl_hours("0"), None);
        assert_eq!(parse_ttl_hours("-1"), None);
        assert_eq!(parse_ttl_hours("abc"), None);
        assert_eq!(parse_ttl_hours(&i64::MAX.to_string()), None);
    }
}
