//! Constantes del motor conversacional.
//!
//! Agrupa valores estáticos compartidos por el engine, el executor y los
//! stores. Las claves reservadas del contexto empiezan con `__` y no deben
//! usarse desde la configuración de flujos.

/// Versión lógica del motor. Se registra en el journal al iniciar un flujo
/// junto con el `definition_hash`, para poder auditar con qué motor y con qué
/// definición avanzó cada contacto.
pub const ENGINE_VERSION: &str = "C1.0";

/// Límite por defecto de pasos ejecutados para un único evento entrante.
pub const DEFAULT_MAX_AUTO_STEPS: usize = 25;

/// Marca "esperando respuesta del paso X" (valor: id del step).
pub const CTX_AWAITING_REPLY: &str = "__awaiting_reply";

/// Hashes de formularios ya aplicados en la ejecución actual.
pub const CTX_APPLIED_FORMS: &str = "__applied_forms";

/// Envíos recordados por ejecución (los más antiguos se descartan).
pub const MAX_APPLIED_FORMS: usize = 32;

/// Último fallo no fatal de una acción (visible para guards).
pub const CTX_ACTION_ERROR: &str = "action_error";

/// Máximo de botones de respuesta por mensaje interactivo.
pub const MAX_REPLY_BUTTONS: usize = 3;

/// Máximo de filas (sumando secciones) en un mensaje de lista.
pub const MAX_LIST_ROWS: usize = 10;
