//! convoflow
//!
//! Binario de despacho del motor de flujos conversacionales:
//! - `config`: `AppConfig` desde variables de entorno (.env).
//! - `app`: ensamblado del engine con los adaptadores incorporados.
//! - `dispatch`: carriles por contacto sobre tokio.
//!
//! La lógica de flujos vive en `convo-core`; aquí sólo hay cableado.

pub mod app;
pub mod config;
pub mod dispatch;

pub use app::{build_app, build_app_with_sender, App};
pub use config::AppConfig;
pub use dispatch::{DispatchError, Dispatcher, ProcessResult, Processed};

/// Instala el subscriber de `tracing` (fmt a stderr + `EnvFilter` de
/// `RUST_LOG`, `info` por defecto). Los registros de `log` de las librerías
/// también pasan por aquí.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry().with(filter)
                                          .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                                          .try_init();
}
