//! CLI de operación del motor de flujos.
//!
//! ```text
//! convo-cli validate [--flows <PATH>]
//! convo-cli show <CONTACT_ID>
//! convo-cli journal <CONTACT_ID>
//! convo-cli reset <CONTACT_ID> [--flows <PATH>]
//! convo-cli expire --older-than-hours <N>
//! ```
//!
//! Salvo `validate`, todos los comandos operan contra Postgres y requieren
//! `DATABASE_URL`. Códigos de salida: 0 ok, 2 uso, 4 rechazo, 5 infraestructura.
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use convo_adapters::LogSender;
use convo_core::config::stale_cutoff;
use convo_core::definition::FlowCatalog;
use convo_core::engine::FlowEngine;
use convo_core::model::FlowStatus;
use convo_core::repo::ContactStateStore;
use convo_persistence::{build_dev_pool_from_env, DbConfig, PgStateStore, PoolProvider};
use serde_json::json;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "convo-cli", version, about = "Operación del motor de flujos conversacionales")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Carga y valida el documento de flujos; imprime un resumen por flujo.
    Validate {
        #[arg(long, env = "CONVO_FLOWS_PATH", default_value = "flows.json")]
        flows: PathBuf,
    },
    /// Estado actual del contacto (lectura sin lock).
    Show { contact_id: String },
    /// Journal completo del contacto en orden de `seq`.
    Journal { contact_id: String },
    /// Saca al contacto de su flujo activo.
    Reset {
        contact_id: String,
        #[arg(long, env = "CONVO_FLOWS_PATH", default_value = "flows.json")]
        flows: PathBuf,
    },
    /// Borra estados sin actividad en las últimas N horas.
    Expire {
        #[arg(long)]
        older_than_hours: i64,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    Infra(String),
}

impl CliError {
    fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Rejected(_) => ExitCode::from(4),
            CliError::Infra(_) => ExitCode::from(5),
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter)
                                  .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                                  .init();
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("[convo-cli] {e}");
            e.exit_code()
        }
    }
}

fn run(command: Command) -> Result<(), CliError> {
    match command {
        Command::Validate { flows } => validate(&flows),
        Command::Show { contact_id } => {
            let store = pg_store()?;
            let state = store.load(&contact_id).map_err(|e| CliError::Infra(e.to_string()))?;
            let status = FlowStatus::of(state.as_ref());
            print_json(&json!({ "status": status, "state": state }))
        }
        Command::Journal { contact_id } => {
            let store = pg_store()?;
            let entries = store.journal(&contact_id).map_err(|e| CliError::Infra(e.to_string()))?;
            for entry in entries {
                println!("{:>6} {} {:<18} {}",
                         entry.seq,
                         entry.ts.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                         entry.kind.entry_type(),
                         serde_json::to_string(&entry.kind).unwrap_or_default());
            }
            Ok(())
        }
        Command::Reset { contact_id, flows } => {
            let catalog = load_catalog(&flows)?;
            let engine = FlowEngine::builder(pg_store()?, catalog).sender(Arc::new(LogSender)).build();
            let cleared = engine.reset(&contact_id).map_err(|e| CliError::Infra(e.to_string()))?;
            if !cleared {
                return Err(CliError::Rejected(format!("contacto '{contact_id}' sin flujo activo")));
            }
            println!("reset: {contact_id}");
            Ok(())
        }
        Command::Expire { older_than_hours } => {
            let cutoff = expiry_cutoff(older_than_hours)?;
            let expired = pg_store()?.expire_stale(cutoff).map_err(|e| CliError::Infra(e.to_string()))?;
            println!("expirados: {expired} (cutoff={cutoff})");
            Ok(())
        }
    }
}

fn expiry_cutoff(older_than_hours: i64) -> Result<DateTime<Utc>, CliError> {
    stale_cutoff(older_than_hours).ok_or_else(|| {
        CliError::Rejected(format!("--older-than-hours={older_than_hours} fuera de rango (debe ser > 0)"))
    })
}

fn load_catalog(path: &PathBuf) -> Result<FlowCatalog, CliError> {
    FlowCatalog::from_path(path).map_err(|e| CliError::Rejected(format!("{}: {e}", path.display())))
}

fn validate(path: &PathBuf) -> Result<(), CliError> {
    let catalog = load_catalog(path)?;
    for flow in catalog.flows() {
        println!("{:<16} v{:<3} steps={:<3} entry={:<16} hash={}",
                 flow.id,
                 flow.version,
                 flow.len(),
                 flow.entry,
                 &flow.definition_hash[..flow.definition_hash.len().min(12)]);
    }
    let actions: Vec<&str> = catalog.action_names().into_iter().collect();
    println!("ok: {} flujos, acciones referenciadas: {}", catalog.len(), actions.join(", "));
    Ok(())
}

fn pg_store() -> Result<PgStateStore<PoolProvider>, CliError> {
    if !DbConfig::is_configured() {
        return Err(CliError::Rejected("requiere DATABASE_URL para operar contra backend persistente".into()));
    }
    let pool = build_dev_pool_from_env().map_err(|e| CliError::Infra(format!("pool error: {e}")))?;
    Ok(PgStateStore::from_pool(pool))
}

fn print_json(value: &serde_json::Value) -> Result<(), CliError> {
    let out = serde_json::to_string_pretty(value).map_err(|e| CliError::Infra(e.to_string()))?;
    println!("{out}");
    Ok(())
}
