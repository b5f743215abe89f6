//! Extraction through a language model.
//!
//! No client ships with the crate. Callers implement [`LlmBackend`] for
//! whatever service they use and hand it to [`LlmParser`]. The parser sends the
//! decoded fragment with a fixed system prompt and normalizes the answer into a
//! partial record; anything the model gets wrong is dropped rather than
//! guessed, and validation decides whether enough is left.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::html::{document_text, parse_html};
use super::text::decode_text;
use super::{BoxError, Parser, PartialRecord};
use crate::output::{Impact, Status};

/// System prompt sent with every question.
pub const SYSTEM_PROMPT: &str = "You are a parser of network circuit maintenance notifications. \
Answer with a single JSON object and nothing else, using these keys: \
\"account\" (customer account identifier), \
\"maintenance_id\" (the provider's reference for this maintenance), \
\"circuit_ids\" (list of affected circuit identifiers), \
\"impact\" (one of NO-IMPACT, REDUCED-REDUNDANCY, DEGRADED, OUTAGE), \
\"status\" (one of TENTATIVE, CONFIRMED, CANCELLED, IN-PROCESS, COMPLETED, RE-SCHEDULED), \
\"start\" and \"end\" (maintenance window as integer epoch seconds in UTC), \
\"summary\" (one sentence describing the work). Omit keys you cannot determine.";

/// A language model answering extraction questions.
pub trait LlmBackend: Send + Sync {
    /// Ask `question` under `system` instructions. `None` on any backend
    /// failure or unusable answer.
    fn ask(&self, system: &str, question: &str) -> Option<PartialRecord>;
}

/// Parser delegating extraction to an [`LlmBackend`].
#[derive(Clone)]
pub struct LlmParser {
    backend: Arc<dyn LlmBackend>,
}

impl LlmParser {
    pub const NAME: &'static str = "llm";

    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    fn question(content: &[u8], data_type: &str) -> String {
        if data_type.contains("html") {
            document_text(&parse_html(content))
        } else {
            decode_text(content)
        }
    }
}

impl fmt::Debug for LlmParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmParser").finish_non_exhaustive()
    }
}

impl Parser for LlmParser {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn data_types(&self) -> &[&str] {
        &["text/plain", "text/html", "html"]
    }

    fn uses_llm(&self) -> bool {
        true
    }

    fn parse_data(&self, content: &[u8], data_type: &str) -> Result<Vec<PartialRecord>, BoxError> {
        let question = Self::question(content, data_type);
        let answer = self
            .backend
            .ask(SYSTEM_PROMPT, &question)
            .ok_or("LLM backend returned no usable answer")?;

        tracing::debug!(answer = ?answer, "LLM answer received");
        Ok(vec![normalize_answer(&answer)])
    }
}

/// Keep what the model got right, in record form.
fn normalize_answer(answer: &PartialRecord) -> PartialRecord {
    let mut record = PartialRecord::new();

    for field in ["account", "maintenance_id", "summary"] {
        if let Some(value) = answer.get(field).and_then(as_text) {
            record.insert(field.into(), Value::String(value));
        }
    }

    for field in ["start", "end"] {
        if let Some(value) = answer.get(field).and_then(as_integer) {
            record.insert(field.into(), value.into());
        }
    }

    if let Some(status) = answer
        .get("status")
        .and_then(as_text)
        .and_then(|s| s.to_uppercase().replace('_', "-").parse::<Status>().ok())
        .filter(|s| *s != Status::NoChange)
    {
        record.insert("status".into(), status.as_str().into());
    }

    let impact = answer
        .get("impact")
        .and_then(as_text)
        .and_then(|s| s.to_uppercase().replace('_', "-").parse::<Impact>().ok());

    if let Some(Value::Array(ids)) = answer.get("circuit_ids") {
        let circuits: Vec<Value> = ids
            .iter()
            .filter_map(as_text)
            .map(|circuit_id| {
                let mut circuit = PartialRecord::new();
                circuit.insert("circuit_id".into(), Value::String(circuit_id));
                if let Some(impact) = impact {
                    circuit.insert("impact".into(), impact.as_str().into());
                }
                Value::Object(circuit)
            })
            .collect();
        if !circuits.is_empty() {
            record.insert("circuits".into(), Value::Array(circuits));
        }
    }

    record
}

fn as_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Some(text).filter(|s| !s.is_empty() && s != "None")
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
