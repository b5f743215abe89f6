//! Normalized maintenance records.
//!
//! The field set and the enum values follow the MAINTNOTE calendar extension
//! (draft-gunter-calext-maintenance-notifications). A [`Maintenance`] only
//! exists if every field check passed; there is no way to build or mutate one
//! into an invalid state.
//!
//! | Field | Required | Rule |
//! |-------|----------|------|
//! | `provider`, `account`, `maintenance_id`, `organizer` | yes | non-empty string, not `"None"` |
//! | `status` | yes | one of the declared [`Status`] values |
//! | `start`, `end`, `stamp` | yes | integer epoch seconds, `end > start` |
//! | `circuits` | yes | non-empty unless `CANCELLED` or `COMPLETED` |
//! | `uid` | no | string, default `"0"` |
//! | `sequence` | no | integer, default `1` |
//! | `summary` | no | string, default `""` |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::parsers::PartialRecord;

/// Every field name a record may carry.
pub const FIELDS: [&str; 12] = [
    "account",
    "circuits",
    "end",
    "maintenance_id",
    "organizer",
    "provider",
    "sequence",
    "stamp",
    "start",
    "status",
    "summary",
    "uid",
];

const DEFAULT_UID: &str = "0";
const DEFAULT_SEQUENCE: i64 = 1;

/// Overall status of a maintenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// The maintenance event is possible.
    #[serde(rename = "TENTATIVE")]
    Tentative,
    /// The maintenance event is definite.
    #[serde(rename = "CONFIRMED")]
    Confirmed,
    /// The maintenance event was cancelled.
    #[serde(rename = "CANCELLED")]
    Cancelled,
    /// The maintenance event is in process (open).
    #[serde(rename = "IN-PROCESS")]
    InProcess,
    /// The maintenance event completed (closed).
    #[serde(rename = "COMPLETED")]
    Completed,
    /// The maintenance event was re-scheduled.
    #[serde(rename = "RE-SCHEDULED")]
    ReScheduled,
    /// The notification states no status. Only meaningful while partial
    /// records are combined; a built [`Maintenance`] never holds it.
    #[serde(rename = "NO-CHANGE")]
    NoChange,
}

impl Status {
    pub const ALL: [Status; 7] = [
        Status::Tentative,
        Status::Confirmed,
        Status::Cancelled,
        Status::InProcess,
        Status::Completed,
        Status::ReScheduled,
        Status::NoChange,
    ];

    /// The declared string value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Tentative => "TENTATIVE",
            Status::Confirmed => "CONFIRMED",
            Status::Cancelled => "CANCELLED",
            Status::InProcess => "IN-PROCESS",
            Status::Completed => "COMPLETED",
            Status::ReScheduled => "RE-SCHEDULED",
            Status::NoChange => "NO-CHANGE",
        }
    }

    /// Whether a record in this status may list no circuits.
    pub fn allows_empty_circuits(&self) -> bool {
        matches!(self, Status::Cancelled | Status::Completed)
    }

    /// The status stored in a built record.
    fn resolved(self) -> Status {
        match self {
            Status::NoChange => Status::Confirmed,
            other => other,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Violation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Violation::UnknownVariant {
                value: s.to_string(),
                allowed: joined(Status::ALL.iter().map(Status::as_str)),
            })
    }
}

/// Expected impact of a maintenance on one circuit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Impact {
    /// No expected impact to the service.
    #[serde(rename = "NO-IMPACT")]
    NoImpact,
    /// The service keeps working without its usual redundancy.
    #[serde(rename = "REDUCED-REDUNDANCY")]
    ReducedRedundancy,
    /// Negative impact expected, short of a full outage.
    #[serde(rename = "DEGRADED")]
    Degraded,
    /// The service is expected to be completely out of service.
    #[default]
    #[serde(rename = "OUTAGE")]
    Outage,
}

impl Impact {
    pub const ALL: [Impact; 4] = [
        Impact::NoImpact,
        Impact::ReducedRedundancy,
        Impact::Degraded,
        Impact::Outage,
    ];

    /// The declared string value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Impact::NoImpact => "NO-IMPACT",
            Impact::ReducedRedundancy => "REDUCED-REDUNDANCY",
            Impact::Degraded => "DEGRADED",
            Impact::Outage => "OUTAGE",
        }
    }
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Impact {
    type Err = Violation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Impact::ALL
            .iter()
            .copied()
            .find(|impact| impact.as_str() == s)
            .ok_or_else(|| Violation::UnknownVariant {
                value: s.to_string(),
                allowed: joined(Impact::ALL.iter().map(Impact::as_str)),
            })
    }
}

/// What exactly is wrong with a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    Missing,
    WrongType { expected: &'static str },
    EmptyOrNone,
    UnknownVariant { value: String, allowed: String },
    EndNotAfterStart { start: i64, end: i64 },
    NoCircuits { status: Status },
    UnknownField,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Missing => write!(f, "field required"),
            Violation::WrongType { expected } => write!(f, "expected {}", expected),
            Violation::EmptyOrNone => write!(f, "string is empty or 'None'"),
            Violation::UnknownVariant { value, allowed } => {
                write!(f, "'{}' is not a valid value; permitted: {}", value, allowed)
            }
            Violation::EndNotAfterStart { start, end } => write!(
                f,
                "end time ({}) should happen later than start time ({})",
                end, start
            ),
            Violation::NoCircuits { status } => write!(
                f,
                "at least one circuit has to be included in a {} maintenance",
                status
            ),
            Violation::UnknownField => write!(f, "extra fields not permitted"),
        }
    }
}

/// A record field failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {violation}")]
pub struct ValidationError {
    /// Path of the offending field, e.g. `account` or `circuits[1].impact`
    pub field: String,

    /// The rule the field broke
    pub violation: Violation,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, violation: Violation) -> Self {
        Self {
            field: field.into(),
            violation,
        }
    }

    fn nested(self, prefix: &str) -> Self {
        Self {
            field: format!("{}.{}", prefix, self.field),
            violation: self.violation,
        }
    }
}

/// One affected circuit and its impact level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CircuitImpact {
    circuit_id: String,
    impact: Impact,
}

impl CircuitImpact {
    pub fn new(circuit_id: impl Into<String>, impact: Impact) -> Result<Self, ValidationError> {
        let circuit_id = circuit_id.into();
        if circuit_id.is_empty() {
            return Err(ValidationError::new("circuit_id", Violation::EmptyOrNone));
        }
        Ok(Self { circuit_id, impact })
    }

    /// A circuit with the default `OUTAGE` impact.
    pub fn outage(circuit_id: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(circuit_id, Impact::default())
    }

    pub fn circuit_id(&self) -> &str {
        &self.circuit_id
    }

    pub fn impact(&self) -> Impact {
        self.impact
    }

    /// Loosely-typed form, as parsers put it in a partial record.
    pub fn to_value(&self) -> Value {
        json!({
            "circuit_id": self.circuit_id,
            "impact": self.impact.as_str(),
        })
    }

    /// Validate a `{"circuit_id": ..., "impact": ...}` mapping.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let object = value
            .as_object()
            .ok_or_else(|| ValidationError::new("circuit", Violation::WrongType { expected: "a mapping" }))?;

        if let Some(key) = object
            .keys()
            .find(|key| key.as_str() != "circuit_id" && key.as_str() != "impact")
        {
            return Err(ValidationError::new(key.as_str(), Violation::UnknownField));
        }

        let circuit_id = match object.get("circuit_id") {
            None | Some(Value::Null) => {
                return Err(ValidationError::new("circuit_id", Violation::Missing))
            }
            Some(Value::String(id)) => id.clone(),
            Some(_) => {
                return Err(ValidationError::new(
                    "circuit_id",
                    Violation::WrongType { expected: "a string" },
                ))
            }
        };

        let impact = match object.get("impact") {
            None | Some(Value::Null) => Impact::default(),
            Some(Value::String(raw)) => raw
                .parse::<Impact>()
                .map_err(|violation| ValidationError::new("impact", violation))?,
            Some(_) => {
                return Err(ValidationError::new(
                    "impact",
                    Violation::WrongType { expected: "a string" },
                ))
            }
        };

        Self::new(circuit_id, impact)
    }
}

/// Where a record came from. Informational only; not validated and not
/// rendered by [`Maintenance::to_json`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Provider type that produced the record
    pub provider: String,

    /// Processor that built the record
    pub processor: String,

    /// Parsers whose output contributed, in contribution order
    pub parsers: Vec<String>,

    /// Whether an LLM-backed parser contributed
    pub generated_by_llm: bool,
}

/// A validated circuit maintenance.
///
/// Fields are declared alphabetically so the serialized form has sorted keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Maintenance {
    account: String,
    circuits: Vec<CircuitImpact>,
    end: i64,
    maintenance_id: String,
    organizer: String,
    provider: String,
    sequence: i64,
    stamp: i64,
    start: i64,
    status: Status,
    summary: String,
    uid: String,

    #[serde(skip)]
    metadata: Metadata,
}

impl Maintenance {
    /// Validate a fully merged record.
    ///
    /// Fails on the first field that breaks a rule; see the module table.
    pub fn from_record(record: &PartialRecord) -> Result<Self, ValidationError> {
        if let Some(key) = record.keys().find(|key| !FIELDS.contains(&key.as_str())) {
            return Err(ValidationError::new(key.as_str(), Violation::UnknownField));
        }

        let provider = identifier(record, "provider")?;
        let account = identifier(record, "account")?;
        let maintenance_id = identifier(record, "maintenance_id")?;
        let circuits = circuits(record)?;
        let status = status(record)?;
        let start = integer(record, "start")?;
        let end = integer(record, "end")?;
        if end <= start {
            return Err(ValidationError::new(
                "end",
                Violation::EndNotAfterStart { start, end },
            ));
        }
        let stamp = integer(record, "stamp")?;
        let organizer = identifier(record, "organizer")?;

        let uid = optional_string(record, "uid")?.unwrap_or_else(|| DEFAULT_UID.to_string());
        let sequence = optional_integer(record, "sequence")?.unwrap_or(DEFAULT_SEQUENCE);
        let summary = optional_string(record, "summary")?.unwrap_or_default();

        if circuits.is_empty() && !status.allows_empty_circuits() {
            return Err(ValidationError::new("circuits", Violation::NoCircuits { status }));
        }

        Ok(Self {
            account,
            circuits,
            end,
            maintenance_id,
            organizer,
            provider,
            sequence,
            stamp,
            start,
            status,
            summary,
            uid,
            metadata: Metadata::default(),
        })
    }

    /// Re-validate a rendering produced by [`Maintenance::to_json`].
    pub fn from_json(json: &str) -> Result<Self, MaintenanceJsonError> {
        let value: Value = serde_json::from_str(json)?;
        let record = value.as_object().ok_or(MaintenanceJsonError::NotAnObject)?;
        Ok(Self::from_record(record)?)
    }

    /// Attach provenance.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Sorted-key, two-space indented JSON of every field.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// First word of the provider, lowercased.
    pub fn slug(&self) -> String {
        self.provider
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_lowercase()
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn maintenance_id(&self) -> &str {
        &self.maintenance_id
    }

    pub fn circuits(&self) -> &[CircuitImpact] {
        &self.circuits
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    pub fn stamp(&self) -> i64 {
        self.stamp
    }

    pub fn organizer(&self) -> &str {
        &self.organizer
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn sequence(&self) -> i64 {
        self.sequence
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

/// Errors from [`Maintenance::from_json`].
#[derive(Error, Debug)]
pub enum MaintenanceJsonError {
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Maintenance JSON must be an object")]
    NotAnObject,

    #[error("Invalid maintenance: {0}")]
    Invalid(#[from] ValidationError),
}

fn present<'a>(record: &'a PartialRecord, field: &str) -> Option<&'a Value> {
    record.get(field).filter(|value| !value.is_null())
}

fn identifier(record: &PartialRecord, field: &str) -> Result<String, ValidationError> {
    match present(record, field) {
        None => Err(ValidationError::new(field, Violation::Missing)),
        Some(Value::String(s)) if s.is_empty() || s == "None" => {
            Err(ValidationError::new(field, Violation::EmptyOrNone))
        }
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ValidationError::new(
            field,
            Violation::WrongType { expected: "a string" },
        )),
    }
}

fn optional_string(record: &PartialRecord, field: &str) -> Result<Option<String>, ValidationError> {
    match present(record, field) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ValidationError::new(
            field,
            Violation::WrongType { expected: "a string" },
        )),
    }
}

fn as_strict_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => n.as_i64(),
        _ => None,
    }
}

fn integer(record: &PartialRecord, field: &str) -> Result<i64, ValidationError> {
    let value = present(record, field).ok_or_else(|| ValidationError::new(field, Violation::Missing))?;
    as_strict_i64(value).ok_or_else(|| {
        ValidationError::new(field, Violation::WrongType { expected: "an integer" })
    })
}

fn optional_integer(record: &PartialRecord, field: &str) -> Result<Option<i64>, ValidationError> {
    match present(record, field) {
        None => Ok(None),
        Some(value) => as_strict_i64(value).map(Some).ok_or_else(|| {
            ValidationError::new(field, Violation::WrongType { expected: "an integer" })
        }),
    }
}

fn status(record: &PartialRecord) -> Result<Status, ValidationError> {
    match present(record, "status") {
        None => Err(ValidationError::new("status", Violation::Missing)),
        Some(Value::String(raw)) => raw
            .parse::<Status>()
            .map(Status::resolved)
            .map_err(|violation| ValidationError::new("status", violation)),
        Some(_) => Err(ValidationError::new(
            "status",
            Violation::WrongType { expected: "a string" },
        )),
    }
}

fn circuits(record: &PartialRecord) -> Result<Vec<CircuitImpact>, ValidationError> {
    let entries = match present(record, "circuits") {
        None => return Err(ValidationError::new("circuits", Violation::Missing)),
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            return Err(ValidationError::new(
                "circuits",
                Violation::WrongType { expected: "a list" },
            ))
        }
    };

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            CircuitImpact::from_value(entry).map_err(|e| e.nested(&format!("circuits[{}]", index)))
        })
        .collect()
}

fn joined<'a>(values: impl Iterator<Item = &'a str>) -> String {
    values
        .map(|value| format!("'{}'", value))
        .collect::<Vec<_>>()
        .join(", ")
}
