//! `create_order`: alta de pedido idempotente.
//!
//! La clave de idempotencia es sha256 de `contact_id | run_id | params
//! canónicos`: la misma ejecución del flujo con los mismos datos nunca crea
//! dos pedidos, aunque la acción se invoque otra vez.
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use convo_core::action::{ActionContext, FlowAction};
use convo_core::errors::ActionError;
use convo_core::hashing::to_canonical_json;
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub product: String,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: String,
    pub idempotency_key: String,
    /// `false` si la clave ya existía y se devolvió el pedido previo.
    pub created: bool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// El contacto no puede operar (p.ej. bloqueado por fraude): fatal para el flujo.
    #[error("contact blocked: {0}")]
    Blocked(String),
    #[error("invalid order: {0}")]
    Invalid(String),
    #[error("order service unavailable: {0}")]
    Unavailable(String),
}

impl From<OrderError> for ActionError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::Blocked(_) => ActionError::Fatal(e.to_string()),
            OrderError::Invalid(_) | OrderError::Unavailable(_) => ActionError::Failed(e.to_string()),
        }
    }
}

/// Registro de pedidos (colaborador externo: CRM de órdenes).
pub trait OrderBook: Send + Sync {
    fn create(&self, idempotency_key: &str, contact_id: &str, request: &OrderRequest) -> Result<OrderReceipt, OrderError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredOrder {
    pub order_id: String,
    pub contact_id: String,
    pub request: OrderRequest,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct InMemoryOrderBook {
    orders: Mutex<BTreeMap<String, StoredOrder>>,
    blocked: Mutex<BTreeSet<String>>,
    calls: AtomicUsize,
}

impl InMemoryOrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn orders_guard(&self) -> MutexGuard<'_, BTreeMap<String, StoredOrder>> {
        self.orders.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn block(&self, contact_id: &str) {
        self.blocked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(contact_id.to_string());
    }

    /// Pedidos distintos creados.
    pub fn count(&self) -> usize {
        self.orders_guard().len()
    }

    /// Invocaciones de `create`, incluidas las que reusaron la clave.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn orders_for(&self, contact_id: &str) -> Vec<StoredOrder> {
        self.orders_guard()
            .values()
            .filter(|o| o.contact_id == contact_id)
            .cloned()
            .collect()
    }
}

impl OrderBook for InMemoryOrderBook {
    fn create(&self, idempotency_key: &str, contact_id: &str, request: &OrderRequest) -> Result<OrderReceipt, OrderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let is_blocked = self.blocked
                             .lock()
                             .unwrap_or_else(|poisoned| poisoned.into_inner())
                             .contains(contact_id);
        if is_blocked {
            return Err(OrderError::Blocked(contact_id.to_string()));
        }
        let mut orders = self.orders_guard();
        if let Some(existing) = orders.get(idempotency_key) {
            return Ok(OrderReceipt { order_id: existing.order_id.clone(),
                                     idempotency_key: idempotency_key.to_string(),
                                     created: false });
        }
        let order_id = format!("ORD-{:05}", orders.len() + 1);
        orders.insert(idempotency_key.to_string(),
                      StoredOrder { order_id: order_id.clone(),
                                    contact_id: contact_id.to_string(),
                                    request: request.clone(),
                                    created_at: Utc::now() });
        Ok(OrderReceipt { order_id,
                          idempotency_key: idempotency_key.to_string(),
                          created: true })
    }
}

pub struct CreateOrderAction {
    book: Arc<dyn OrderBook>,
}

impl CreateOrderAction {
    pub const NAME: &'static str = "create_order";

    pub fn new(book: Arc<dyn OrderBook>) -> Self {
        Self { book }
    }

    pub fn idempotency_key(ctx: &ActionContext<'_>, params: &Value) -> String {
        let mut hasher = Sha256::new();
        hasher.update(ctx.contact_id.as_bytes());
        hasher.update(b"|");
        hasher.update(ctx.run_id.as_bytes());
        hasher.update(b"|");
        hasher.update(to_canonical_json(params).as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl FlowAction for CreateOrderAction {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn run(&self, ctx: &ActionContext<'_>, params: &Value) -> Result<Value, ActionError> {
        let request = parse_request(params)?;
        let key = Self::idempotency_key(ctx, params);
        let receipt = self.book.create(&key, ctx.contact_id, &request)?;
        info!("order contact_id={} flow={} step={} order_id={} created={}",
              ctx.contact_id, ctx.flow_id, ctx.step_id, receipt.order_id, receipt.created);
        Ok(json!({ "order": { "id": receipt.order_id, "created": receipt.created } }))
    }
}

// La cantidad puede llegar como número o como texto (respuesta libre).
fn parse_request(params: &Value) -> Result<OrderRequest, OrderError> {
    let product = params.get("product")
                        .and_then(Value::as_str)
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .ok_or_else(|| OrderError::Invalid("missing product".to_string()))?;
    let quantity = match params.get("quantity") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        None => Some(1),
        _ => None,
    };
    let quantity = quantity.filter(|q| *q > 0 && *q <= u64::from(u32::MAX))
                           .ok_or_else(|| OrderError::Invalid("quantity must be a positive integer".to_string()))?;
    Ok(OrderRequest { product: product.to_string(),
                      quantity: quantity as u32,
                      notes: params.get("notes").and_then(Value::as_str).map(str::to_string),
                      details: params.get("details").cloned().unwrap_or(Value::Null) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use convo_core::model::{ContactFlowState, FlowContext};

    // Cada llamada es una ejecución nueva del flujo (run_id distinto).
    fn new_run() -> ContactFlowState {
        ContactFlowState::enter("c1", "sales", 1, "order")
    }

    fn ctx<'a>(state: &'a ContactFlowState, context: &'a FlowContext) -> ActionContext<'a> {
        ActionContext { contact_id: &state.contact_id,
                        run_id: state.run_id,
                        flow_id: &state.flow_id,
                        step_id: &state.current_step,
                        context }
    }

    #[test]
    fn same_run_and_params_create_one_order() {
        let book = Arc::new(InMemoryOrderBook::new());
        let action = CreateOrderAction::new(book.clone());
        let state = new_run();
        let context = FlowContext::new();
        let params = json!({"product": "kit-5kw", "quantity": "2"});
        let first = action.run(&ctx(&state, &context), &params).expect("first");
        let second = action.run(&ctx(&state, &context), &params).expect("second");
        assert_eq!(first["order"]["id"], second["order"]["id"]);
        assert_eq!(first["order"]["created"], true);
        assert_eq!(second["order"]["created"], false);
        assert_eq!(book.count(), 1);
        assert_eq!(book.calls(), 2);

        let other_run = new_run();
        action.run(&ctx(&other_run, &context), &params).expect("new run");
        assert_eq!(book.count(), 2);
    }

    #[test]
    fn invalid_params_fail_and_blocked_contact_is_fatal() {
        let book = Arc::new(InMemoryOrderBook::new());
        let action = CreateOrderAction::new(book.clone());
        let state = new_run();
        let context = FlowContext::new();
        let bad = action.run(&ctx(&state, &context), &json!({"quantity": 1}));
        assert!(matches!(bad, Err(ActionError::Failed(_))));
        let zero = action.run(&ctx(&state, &context), &json!({"product": "kit", "quantity": 0}));
        assert!(matches!(zero, Err(ActionError::Failed(_))));

        book.block("c1");
        let blocked = action.run(&ctx(&state, &context), &json!({"product": "kit"}));
        assert!(matches!(blocked, Err(ActionError::Fatal(_))));
        assert_eq!(book.count(), 0);
    }
}
