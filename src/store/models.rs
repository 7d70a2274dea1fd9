use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{FieldNames, StoreConfig};
use crate::error::ProcessingError;

/// A raw row as returned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreRecord {
    pub id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Equals { field: String, value: String },
    NotEquals { field: String, value: String },
}

/// Conjunction of field predicates, shared by `query` and `count`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equals(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.predicates.push(Predicate::Equals {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn not_equals(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.predicates.push(Predicate::NotEquals {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Records that still need a certificate: pending status, names present,
    /// nothing attached yet.
    pub fn eligible(config: &StoreConfig) -> Self {
        let fields = &config.fields;
        Self::new()
            .equals(&fields.status, &config.pending_status)
            .not_equals(&fields.participant, "")
            .not_equals(&fields.achievement, "")
            .equals(&fields.attachment, "")
    }

    /// Airtable `filterByFormula` rendering.
    pub fn to_formula(&self) -> String {
        let clauses: Vec<String> = self
            .predicates
            .iter()
            .map(|p| match p {
                Predicate::Equals { field, value } => {
                    format!("{{{}}}='{}'", escape_field(field), escape_literal(value))
                }
                Predicate::NotEquals { field, value } => {
                    format!("{{{}}}!='{}'", escape_field(field), escape_literal(value))
                }
            })
            .collect();

        match clauses.len() {
            0 => "TRUE()".to_string(),
            1 => clauses.into_iter().next().unwrap_or_default(),
            _ => format!("AND({})", clauses.join(",")),
        }
    }

    /// Evaluate against a field map the way the store compares cell text.
    pub fn matches(&self, fields: &Map<String, Value>) -> bool {
        self.predicates.iter().all(|p| match p {
            Predicate::Equals { field, value } => cell_text(fields.get(field)) == *value,
            Predicate::NotEquals { field, value } => cell_text(fields.get(field)) != *value,
        })
    }
}

fn escape_field(field: &str) -> String {
    field.replace('\\', "\\\\").replace('}', "\\}")
}

fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Text rendering of a cell: missing, null and empty lists compare as "".
pub fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => if *b { "1" } else { "0" }.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Object(obj) => obj
                    .get("filename")
                    .or_else(|| obj.get("url"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                other => cell_text(Some(other)),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Some(Value::Object(obj)) => obj
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    }
}

/// One unit of work, extracted from a store row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibleRecord {
    /// Store-assigned id, used for write-back.
    pub store_id: String,
    /// Stable id for file naming: the configured id column, else `store_id`.
    pub id: String,
    pub participant_name: String,
    pub achievement_level: String,
    pub programme_name: String,
    pub certificate_image_ref: String,
}

impl EligibleRecord {
    pub fn from_store(record: &StoreRecord, fields: &FieldNames) -> Result<Self, ProcessingError> {
        let text = |name: &str| -> Result<String, ProcessingError> {
            first_text(record.fields.get(name))
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| ProcessingError::MissingField(name.to_string()))
        };

        let participant_name = text(&fields.participant)?;
        let achievement_level = text(&fields.achievement)?;
        let programme_name = text(&fields.programme)?;
        let certificate_image_ref = image_reference(record.fields.get(&fields.certificate_image))
            .ok_or_else(|| ProcessingError::MissingField(fields.certificate_image.clone()))?;

        let id = first_text(record.fields.get(&fields.record_id))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| record.id.clone());

        Ok(Self {
            store_id: record.id.clone(),
            id,
            participant_name,
            achievement_level,
            programme_name,
            certificate_image_ref,
        })
    }
}

/// A scalar, or the first element of a list.
fn first_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => first_text(items.first()),
        _ => None,
    }
}

/// Attachment list (first `url`), list of strings, or a plain string.
fn image_reference(value: Option<&Value>) -> Option<String> {
    let reference = match value? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => image_reference(items.first()),
        Value::Object(obj) => obj.get("url").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }?;
    let reference = reference.trim().to_string();
    (!reference.is_empty()).then_some(reference)
}
