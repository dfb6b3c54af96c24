//! Catálogo de flujos cargado desde configuración.
use std::collections::BTreeSet;
use std::path::Path;

use indexmap::IndexMap;
use log::{debug, info};
use serde::Deserialize;

use super::{FlowConfig, FlowDefinition};
use crate::errors::DefinitionError;
use crate::event::InboundEvent;

#[derive(Deserialize)]
struct CatalogDocument {
    flows: Vec<FlowConfig>,
}

/// Conjunto inmutable de flujos. El orden de declaración define la prioridad
/// de los triggers.
#[derive(Debug, Clone, Default)]
pub struct FlowCatalog {
    flows: IndexMap<String, FlowDefinition>,
}

impl FlowCatalog {
    pub fn new(definitions: Vec<FlowDefinition>) -> Result<Self, DefinitionError> {
        let mut flows = IndexMap::with_capacity(definitions.len());
        for def in definitions {
            if flows.contains_key(&def.id) {
                return Err(DefinitionError::DuplicateFlow(def.id));
            }
            flows.insert(def.id.clone(), def);
        }
        Ok(Self { flows })
    }

    /// Documento `{ "flows": [...] }`.
    pub fn from_json_str(raw: &str) -> Result<Self, DefinitionError> {
        let doc: CatalogDocument = serde_json::from_str(raw).map_err(|e| DefinitionError::Parse(e.to_string()))?;
        let definitions = doc.flows
                             .into_iter()
                             .map(FlowDefinition::from_config)
                             .collect::<Result<Vec<_>, _>>()?;
        let catalog = Self::new(definitions)?;
        for def in catalog.flows() {
            debug!("flow loaded id={} version={} steps={} hash={}", def.id, def.version, def.len(), def.definition_hash);
        }
        Ok(catalog)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DefinitionError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| DefinitionError::Io(format!("{}: {e}", path.display())))?;
        let catalog = Self::from_json_str(&raw)?;
        info!("flow catalog loaded path={} flows={}", path.display(), catalog.len());
        Ok(catalog)
    }

    pub fn get(&self, flow_id: &str) -> Option<&FlowDefinition> {
        self.flows.get(flow_id)
    }

    /// Primer flujo (en orden de declaración) cuyo trigger acepta el evento.
    pub fn match_trigger(&self, event: &InboundEvent) -> Option<&FlowDefinition> {
        self.flows.values().find(|f| f.matches_trigger(event))
    }

    pub fn flows(&self) -> impl Iterator<Item = &FlowDefinition> {
        self.flows.values()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Nombres de acción referenciados por algún step.
    pub fn action_names(&self) -> BTreeSet<&str> {
        self.flows
            .values()
            .flat_map(|f| f.steps.values())
            .filter_map(|s| s.action_name())
            .collect()
    }
}
