//! Lee eventos normalizados (una línea JSON por evento) desde stdin, los
//! despacha al engine y escribe un resultado JSON por evento en stdout.
//!
//! Backend: Postgres si hay `DATABASE_URL`, memoria en caso contrario.
use std::process::ExitCode;
use std::time::Duration;

use convo_core::config::stale_cutoff;
use convo_core::definition::FlowCatalog;
use convo_core::event::InboundEvent;
use convo_core::repo::{ContactStateStore, InMemoryStateStore};
use convo_persistence::{build_dev_pool_from_env, DbConfig, PgStateStore};
use convoflow::{build_app, init_tracing, AppConfig, Dispatcher};
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> ExitCode {
    let cfg = AppConfig::from_env();
    init_tracing();
    let catalog = match FlowCatalog::from_path(&cfg.flows_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[convoflow] {}: {e}", cfg.flows_path.display());
            return ExitCode::from(4);
        }
    };
    info!("catalog loaded: {} flows from {}", catalog.len(), cfg.flows_path.display());

    let res = if DbConfig::is_configured() {
        let pool = match tokio::task::spawn_blocking(build_dev_pool_from_env).await {
            Ok(Ok(p)) => p,
            Ok(Err(e)) => {
                eprintln!("[convoflow] pool error: {e}");
                return ExitCode::from(5);
            }
            Err(e) => {
                eprintln!("[convoflow] pool init panicked: {e}");
                return ExitCode::from(5);
            }
        };
        info!("backend: postgres");
        serve(PgStateStore::from_pool(pool), catalog, &cfg).await
    } else {
        info!("backend: memoria (DATABASE_URL no definido)");
        serve(InMemoryStateStore::new(), catalog, &cfg).await
    };
    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("[convoflow] stdin: {e}");
            ExitCode::from(5)
        }
    }
}

async fn serve<S>(store: S, catalog: FlowCatalog, cfg: &AppConfig) -> std::io::Result<()>
    where S: ContactStateStore + 'static
{
    let app = build_app(store, catalog, cfg);
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(processed) = out_rx.recv().await {
            match serde_json::to_string(&processed) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!("unserializable result: {e}"),
            }
        }
    });

    let expiry = cfg.state_ttl_hours.map(|hours| {
        let engine = app.engine.clone();
        let every = Duration::from_secs(cfg.expiry_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let engine = engine.clone();
                let Some(cutoff) = stale_cutoff(hours) else {
                    warn!("expiry job: ttl de {hours}h fuera de rango; se omite");
                    continue;
                };
                match tokio::task::spawn_blocking(move || engine.expire_stale(cutoff)).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!("expiry job failed: {e}"),
                    Err(e) => warn!("expiry job panicked: {e}"),
                }
            }
        })
    });

    let mut dispatcher = Dispatcher::new(app.engine.clone(), out_tx);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<InboundEvent>(&line) {
            Ok(event) => {
                if let Err(e) = dispatcher.submit(event) {
                    warn!("line {line_no}: {e}");
                }
            }
            Err(e) => warn!("line {line_no}: evento inválido: {e}"),
        }
    }
    dispatcher.shutdown().await;
    if let Some(job) = expiry {
        job.abort();
    }
    let _ = printer.await;
    info!("stdin cerrado; órdenes creadas={} notificaciones pendientes={}",
          app.orders.count(),
          app.notifications.len());
    Ok(())
}
