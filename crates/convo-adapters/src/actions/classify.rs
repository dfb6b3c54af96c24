//! `classify_intent`: clasificación por palabras clave.
//!
//! Ocupa el lugar del ruteo por IA: el engine sólo ve una acción más que
//! devuelve `{intent, confidence}` para que las guardas decidan.
use convo_core::action::{ActionContext, FlowAction};
use convo_core::errors::ActionError;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentMatch {
    pub intent: String,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    rules: Vec<(String, Vec<String>)>,
    fallback: String,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new("other").rule("buy", &["comprar", "precio", "cotizar", "cotizacion", "paneles", "kit"])
                          .rule("support", &["falla", "soporte", "garantia", "no funciona", "error"])
                          .rule("install", &["instalacion", "instalar", "visita", "tecnico"])
    }
}

impl KeywordClassifier {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self { rules: Vec::new(),
               fallback: fallback.into() }
    }

    pub fn rule(mut self, intent: &str, keywords: &[&str]) -> Self {
        self.rules
            .push((intent.to_string(), keywords.iter().map(|k| fold(k)).collect()));
        self
    }

    /// Intención con más palabras clave presentes; empate: la regla declarada
    /// primero. Sin coincidencias: `fallback` con confianza 0.
    pub fn classify(&self, text: &str) -> IntentMatch {
        let folded = fold(text);
        let mut best: Option<(&str, usize, usize)> = None;
        for (intent, keywords) in &self.rules {
            let hits = keywords.iter().filter(|k| folded.contains(k.as_str())).count();
            if hits > 0 && best.map_or(true, |(_, h, _)| hits > h) {
                best = Some((intent.as_str(), hits, keywords.len()));
            }
        }
        match best {
            Some((intent, hits, total)) => IntentMatch { intent: intent.to_string(),
                                                         confidence: (hits as f64 / total.max(1) as f64).min(1.0) },
            None => IntentMatch { intent: self.fallback.clone(),
                                  confidence: 0.0 },
        }
    }
}

// Minúsculas y sin tildes (los usuarios escriben "instalación" o "instalacion").
fn fold(s: &str) -> String {
    s.to_lowercase()
     .chars()
     .map(|c| match c {
         'á' | 'à' | 'ä' => 'a',
         'é' | 'è' | 'ë' => 'e',
         'í' | 'ì' | 'ï' => 'i',
         'ó' | 'ò' | 'ö' => 'o',
         'ú' | 'ù' | 'ü' => 'u',
         other => other,
     })
     .collect()
}

pub struct ClassifyIntentAction {
    classifier: KeywordClassifier,
}

impl ClassifyIntentAction {
    pub const NAME: &'static str = "classify_intent";

    pub fn new(classifier: KeywordClassifier) -> Self {
        Self { classifier }
    }
}

impl FlowAction for ClassifyIntentAction {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn run(&self, _ctx: &ActionContext<'_>, params: &Value) -> Result<Value, ActionError> {
        let text = params.get("text")
                         .and_then(Value::as_str)
                         .ok_or_else(|| ActionError::Failed("missing text".to_string()))?;
        let found = self.classifier.classify(text);
        Ok(json!({ "intent": found.intent, "confidence": found.confidence }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_keyword_hits_ignoring_accents() {
        let c = KeywordClassifier::default();
        assert_eq!(c.classify("Quiero COTIZAR paneles").intent, "buy");
        assert_eq!(c.classify("necesito una instalación").intent, "install");
        assert_eq!(c.classify("mi inversor tiene una falla, ¿garantía?").intent, "support");
        let none = c.classify("hola");
        assert_eq!(none.intent, "other");
        assert_eq!(none.confidence, 0.0);
    }
}
