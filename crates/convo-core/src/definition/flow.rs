//! `FlowDefinition`: flujo validado e inmutable.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::Step;
use crate::errors::DefinitionError;
use crate::event::InboundEvent;
use crate::hashing::hash_value;

/// Condición de entrada a un flujo para un contacto sin flujo activo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "on", rename_all = "snake_case")]
pub enum Trigger {
    /// Texto exacto (sin distinguir mayúsculas ni espacios extremos).
    Keyword { words: Vec<String> },
    /// Selección de botón/lista con alguno de estos ids.
    Choice { ids: Vec<String> },
    /// Cualquier texto (flujo por defecto).
    AnyText,
}

impl Trigger {
    pub fn matches(&self, event: &InboundEvent) -> bool {
        match self {
            Trigger::Keyword { words } => event.text_body()
                                               .map(normalize)
                                               .is_some_and(|body| words.iter().any(|w| normalize(w) == body)),
            Trigger::Choice { ids } => event.choice().is_some_and(|(id, _)| ids.iter().any(|i| i == id)),
            Trigger::AnyText => event.text_body().is_some_and(|b| !b.trim().is_empty()),
        }
    }
}

pub(crate) fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

fn default_version() -> u32 {
    1
}

/// Forma del flujo tal como viene en el documento de configuración.
#[derive(Debug, Clone, Deserialize)]
pub struct FlowConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    pub entry: String,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowDefinition {
    pub id: String,
    pub name: String,
    pub version: u32,
    pub triggers: Vec<Trigger>,
    pub entry: String,
    pub steps: IndexMap<String, Step>,
    /// Hash canónico de la definición (no forma parte de sí mismo).
    #[serde(skip)]
    pub definition_hash: String,
}

impl FlowDefinition {
    /// Valida la configuración y construye la definición.
    ///
    /// Reglas:
    /// - ids de step únicos y step de entrada existente;
    /// - toda transición y fallback apunta a un step existente;
    /// - todo step no terminal tiene al menos una transición;
    /// - los mensajes respetan los límites del canal.
    pub fn from_config(cfg: FlowConfig) -> Result<Self, DefinitionError> {
        let flow = cfg.id.clone();
        let mut steps: IndexMap<String, Step> = IndexMap::with_capacity(cfg.steps.len());
        for step in cfg.steps {
            if steps.contains_key(&step.id) {
                return Err(DefinitionError::DuplicateStep { flow, step: step.id });
            }
            steps.insert(step.id.clone(), step);
        }
        if !steps.contains_key(&cfg.entry) {
            return Err(DefinitionError::MissingEntry { flow, step: cfg.entry });
        }
        for step in steps.values() {
            let targets = step.transitions.iter().map(|t| &t.to).chain(step.fallback.iter());
            for target in targets {
                if !steps.contains_key(target) {
                    return Err(DefinitionError::UnknownTarget { flow,
                                                                step: step.id.clone(),
                                                                target: target.clone() });
                }
            }
            if !step.is_terminal() && step.transitions.is_empty() {
                return Err(DefinitionError::DeadEnd { flow, step: step.id.clone() });
            }
            for message in step.messages() {
                message.validate().map_err(|reason| DefinitionError::InvalidMessage { flow: flow.clone(),
                                                                                       step: step.id.clone(),
                                                                                       reason })?;
            }
        }
        let mut def = FlowDefinition { id: cfg.id,
                                       name: cfg.name,
                                       version: cfg.version,
                                       triggers: cfg.triggers,
                                       entry: cfg.entry,
                                       steps,
                                       definition_hash: String::new() };
        let as_json = serde_json::to_value(&def).map_err(|e| DefinitionError::Parse(e.to_string()))?;
        def.definition_hash = hash_value(&as_json);
        Ok(def)
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.get(id)
    }

    pub fn entry_step(&self) -> Option<&Step> {
        self.steps.get(&self.entry)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn matches_trigger(&self, event: &InboundEvent) -> bool {
        self.triggers.iter().any(|t| t.matches(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cfg(v: serde_json::Value) -> FlowConfig {
        serde_json::from_value(v).expect("flow config")
    }

    fn basic() -> serde_json::Value {
        json!({
            "id": "menu", "entry": "hi", "triggers": [{"on": "keyword", "words": ["Menu", "hola"]}],
            "steps": [
                {"id": "hi", "type": "message", "message": {"kind": "text", "text": "Hola"}, "transitions": [{"to": "bye"}]},
                {"id": "bye", "type": "terminal"}
            ]
        })
    }

    #[test]
    fn builds_and_hashes_deterministically() {
        let a = FlowDefinition::from_config(cfg(basic())).expect("a");
        let b = FlowDefinition::from_config(cfg(basic())).expect("b");
        assert_eq!(a.definition_hash.len(), 64);
        assert_eq!(a.definition_hash, b.definition_hash);
        assert_eq!(a.steps.keys().collect::<Vec<_>>(), vec!["hi", "bye"]);
    }

    #[test]
    fn keyword_trigger_is_case_insensitive() {
        let def = FlowDefinition::from_config(cfg(basic())).expect("def");
        assert!(def.matches_trigger(&InboundEvent::text("c", "  MENU ")));
        assert!(!def.matches_trigger(&InboundEvent::text("c", "menú del día")));
        assert!(!def.matches_trigger(&InboundEvent::button("c", "menu", "Menu")));
    }

    #[test]
    fn rejects_unknown_target_and_dead_end() {
        let mut v = basic();
        v["steps"][0]["transitions"] = json!([{"to": "ghost"}]);
        assert!(matches!(FlowDefinition::from_config(cfg(v)), Err(DefinitionError::UnknownTarget { .. })));

        let mut v = basic();
        v["steps"][0]["transitions"] = json!([]);
        assert!(matches!(FlowDefinition::from_config(cfg(v)), Err(DefinitionError::DeadEnd { .. })));
    }

    #[test]
    fn rejects_duplicate_steps_and_missing_entry() {
        let mut v = basic();
        v["steps"][1]["id"] = json!("hi");
        assert!(matches!(FlowDefinition::from_config(cfg(v)), Err(DefinitionError::DuplicateStep { .. })));

        let mut v = basic();
        v["entry"] = json!("nowhere");
        assert!(matches!(FlowDefinition::from_config(cfg(v)), Err(DefinitionError::MissingEntry { .. })));
    }
}
