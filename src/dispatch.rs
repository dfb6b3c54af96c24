//! Despacho concurrente de eventos entrantes.
//!
//! Cada contacto tiene su propio carril (tarea tokio + canal acotado): los
//! eventos de un mismo contacto se procesan en orden de llegada, los de
//! contactos distintos en paralelo. El engine es síncrono, así que cada
//! evento corre en `spawn_blocking`.
//!
//! Un carril sin eventos durante `idle` se cierra solo; el siguiente evento
//! del contacto abre uno nuevo que espera a que el anterior termine de
//! drenar. Un carril lleno rechaza el evento en vez de frenar la lectura.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use convo_core::engine::{FlowEngine, HandleOutcome};
use convo_core::event::InboundEvent;
use convo_core::repo::ContactStateStore;
use log::{debug, error, warn};
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;

const LANE_CAPACITY: usize = 64;
pub const DEFAULT_LANE_IDLE: Duration = Duration::from_secs(300);

/// Resultado de procesar un evento, tal como se reporta hacia afuera.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Processed {
    pub contact_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(flatten)]
    pub result: ProcessResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessResult {
    Ok(HandleOutcome),
    /// Falla de infraestructura o carril saturado: el estado no cambió y el
    /// evento puede reintentarse.
    Error(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("lane for contact '{0}' is closed")]
    LaneClosed(String),
    #[error("lane for contact '{0}' is full; event rejected")]
    LaneFull(String),
}

struct Lane {
    tx: mpsc::Sender<InboundEvent>,
    // Se resuelve (con error) cuando el worker del carril termina.
    finished: oneshot::Receiver<()>,
}

impl Lane {
    fn is_drained(&mut self) -> bool {
        self.tx.is_closed() && matches!(self.finished.try_recv(), Err(oneshot::error::TryRecvError::Closed))
    }
}

pub struct Dispatcher<S: ContactStateStore + 'static> {
    engine: Arc<FlowEngine<S>>,
    lanes: HashMap<String, Lane>,
    workers: JoinSet<()>,
    out: mpsc::UnboundedSender<Processed>,
    idle: Duration,
}

impl<S: ContactStateStore + 'static> Dispatcher<S> {
    pub fn new(engine: Arc<FlowEngine<S>>, out: mpsc::UnboundedSender<Processed>) -> Self {
        Self { engine,
               lanes: HashMap::new(),
               workers: JoinSet::new(),
               out,
               idle: DEFAULT_LANE_IDLE }
    }

    pub fn with_idle_timeout(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    /// Encola el evento en el carril de su contacto (lo crea si no existe o
    /// si el anterior se cerró por inactividad). Nunca espera: con el carril
    /// lleno el evento se reporta como `Error` y se devuelve `LaneFull`.
    pub fn submit(&mut self, event: InboundEvent) -> Result<(), DispatchError> {
        let contact_id = event.contact_id.clone();
        let event = match self.lanes.get(&contact_id) {
            Some(lane) => match lane.tx.try_send(event) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(event)) => {
                    self.report(event, ProcessResult::Error("lane full; retry later".into()));
                    return Err(DispatchError::LaneFull(contact_id));
                }
                Err(TrySendError::Closed(event)) => event,
            },
            None => event,
        };
        let tx = self.open_lane(&contact_id);
        tx.try_send(event).map_err(|_| DispatchError::LaneClosed(contact_id))
    }

    fn open_lane(&mut self, contact_id: &str) -> mpsc::Sender<InboundEvent> {
        let previous = self.lanes.remove(contact_id).map(|lane| lane.finished);
        if previous.is_none() {
            self.reap_idle();
        }
        let (tx, rx) = mpsc::channel(LANE_CAPACITY);
        let (done, finished) = oneshot::channel();
        let timing = LaneTiming { idle: self.idle,
                                  previous,
                                  done };
        self.workers.spawn(run_lane(self.engine.clone(), rx, self.out.clone(), timing));
        self.lanes.insert(contact_id.to_string(), Lane { tx: tx.clone(), finished });
        debug!("lane opened contact_id={contact_id}");
        tx
    }

    fn report(&self, event: InboundEvent, result: ProcessResult) {
        warn!("event rejected contact_id={} message_id={:?}", event.contact_id, event.message_id);
        if self.out
               .send(Processed { contact_id: event.contact_id,
                                 message_id: event.message_id,
                                 result })
               .is_err()
        {
            debug!("outcome receiver dropped; discarding result");
        }
    }

    /// Olvida los carriles que ya se cerraron por inactividad y terminaron.
    /// Devuelve cuántos quitó.
    pub fn reap_idle(&mut self) -> usize {
        let before = self.lanes.len();
        self.lanes.retain(|_, lane| !lane.is_drained());
        while let Some(res) = self.workers.try_join_next() {
            if let Err(e) = res {
                error!("lane worker failed: {e}");
            }
        }
        let reaped = before - self.lanes.len();
        if reaped > 0 {
            debug!("reaped {reaped} idle lanes");
        }
        reaped
    }

    /// Cantidad de carriles registrados.
    pub fn lanes(&self) -> usize {
        self.lanes.len()
    }

    /// Cierra los carriles y espera a que terminen los eventos en curso.
    pub async fn shutdown(mut self) {
        self.lanes.clear();
        while let Some(res) = self.workers.join_next().await {
            if let Err(e) = res {
                error!("lane worker failed: {e}");
            }
        }
    }
}

struct LaneTiming {
    idle: Duration,
    /// Carril anterior del mismo contacto, todavía drenando.
    previous: Option<oneshot::Receiver<()>>,
    done: oneshot::Sender<()>,
}

async fn run_lane<S>(engine: Arc<FlowEngine<S>>,
                     mut rx: mpsc::Receiver<InboundEvent>,
                     out: mpsc::UnboundedSender<Processed>,
                     timing: LaneTiming)
    where S: ContactStateStore + 'static
{
    let LaneTiming { idle, previous, done } = timing;
    if let Some(previous) = previous {
        let _ = previous.await;
    }
    loop {
        let event = match tokio::time::timeout(idle, rx.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(_) => {
                // Lo ya encolado se sigue procesando; recv() devuelve None al vaciarse.
                rx.close();
                continue;
            }
        };
        let contact_id = event.contact_id.clone();
        let message_id = event.message_id.clone();
        let engine = engine.clone();
        let result = match tokio::task::spawn_blocking(move || engine.handle_event(&event)).await {
            Ok(Ok(outcome)) => ProcessResult::Ok(outcome),
            Ok(Err(e)) => {
                warn!("event failed contact_id={contact_id}: {e}");
                ProcessResult::Error(e.to_string())
            }
            Err(join) => {
                error!("event worker panicked contact_id={contact_id}: {join}");
                ProcessResult::Error(format!("worker panicked: {join}"))
            }
        };
        if out.send(Processed { contact_id,
                                message_id,
                                result })
              .is_err()
        {
            debug!("outcome receiver dropped; discarding result");
        }
    }
    drop(done);
}
