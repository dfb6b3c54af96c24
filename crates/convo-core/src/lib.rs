//! convo-core: motor de flujos conversacionales por contacto.
pub mod action;
pub mod config;
pub mod constants;
pub mod definition;
pub mod engine;
pub mod errors;
pub mod event;
pub mod hashing;
pub mod model;
pub mod ports;
pub mod repo;
pub mod step;
pub mod transition;

pub use action::{ActionContext, ActionRegistry, FlowAction};
pub use config::EngineConfig;
pub use definition::{FlowCatalog, FlowDefinition, Guard, Step, StepKind, StepType, Transition, Trigger};
pub use engine::{EngineBuilder, EngineBuilderInit, FlowEngine, HandleOutcome, HandoverReason};
pub use errors::{ActionError, DefinitionError, EngineError, GuardError, SendError, StoreError};
pub use event::{EventKind, InboundEvent, JournalEntry, JournalKind};
pub use model::{ContactFlowState, FlowContext, FlowStatus, Message};
pub use ports::{HandoverNotifier, LoggingHandover, MessageSender};
pub use repo::{ContactStateStore, InMemoryStateStore, LockedState};
pub use step::{ExecutionResult, StepExecutor, StepOutcome};
pub use transition::TransitionEvaluator;
