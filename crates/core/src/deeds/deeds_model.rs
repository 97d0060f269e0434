//! Deed domain models.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::constants::INITIAL_EXTRA_FIELD_KEYS;
use crate::errors::{Error, ValidationError};

/// Whether the registered document is the original or a photocopy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeedNature {
    #[default]
    Original,
    Xerox,
}

impl DeedNature {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeedNature::Original => "Original",
            DeedNature::Xerox => "Xerox",
        }
    }
}

impl fmt::Display for DeedNature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeedNature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Original" => Ok(DeedNature::Original),
            "Xerox" => Ok(DeedNature::Xerox),
            other => Err(ValidationError::InvalidNature(other.to_string()).into()),
        }
    }
}

/// Free-form key/value fields attached to a deed.
///
/// Values are always strings. Rows written by older clients may carry numbers
/// or booleans in the JSON column; those are coerced to their JSON text on read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ExtraFields(BTreeMap<String, String>);

impl ExtraFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shape every freshly created deed starts with: all known keys, empty values.
    pub fn initial() -> Self {
        INITIAL_EXTRA_FIELD_KEYS
            .iter()
            .map(|key| (key.to_string(), String::new()))
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Case-insensitive lookup, used when resolving free placeholders.
    pub fn get_ignore_case(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ExtraFields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<'de> Deserialize<'de> for ExtraFields {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let Value::Object(map) = value else {
            // null, or a malformed column: treat as no extra fields
            return Ok(ExtraFields::default());
        };
        Ok(map
            .into_iter()
            .map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s,
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                (key, text)
            })
            .collect())
    }
}

/// Scalar deed columns a user can edit one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeedField {
    DeedType,
    ExecutedBy,
    InFavourOf,
    Date,
    DocumentNumber,
    Nature,
}

impl DeedField {
    pub const ALL: [DeedField; 6] = [
        DeedField::DeedType,
        DeedField::ExecutedBy,
        DeedField::InFavourOf,
        DeedField::Date,
        DeedField::DocumentNumber,
        DeedField::Nature,
    ];

    /// Column name in the remote table.
    pub fn column(&self) -> &'static str {
        match self {
            DeedField::DeedType => "deed_type",
            DeedField::ExecutedBy => "executed_by",
            DeedField::InFavourOf => "in_favour_of",
            DeedField::Date => "date",
            DeedField::DocumentNumber => "document_number",
            DeedField::Nature => "nature_of_doc",
        }
    }
}

impl fmt::Display for DeedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for DeedField {
    type Err = Error;

    /// Accepts the column name or its kebab-case form (`in-favour-of`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_").to_ascii_lowercase();
        DeedField::ALL
            .into_iter()
            .find(|field| field.column() == normalized)
            .or(match normalized.as_str() {
                "nature" => Some(DeedField::Nature),
                _ => None,
            })
            .ok_or_else(|| ValidationError::UnknownField(s.to_string()).into())
    }
}

/// Domain model representing a deed row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deed {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_id: String,
    #[serde(default)]
    pub table_type: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub deed_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub executed_by: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub in_favour_of: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub document_number: String,
    #[serde(default, deserialize_with = "lenient_nature")]
    pub nature_of_doc: DeedNature,
    #[serde(default)]
    pub custom_fields: ExtraFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Deed {
    /// A blank deed owned by `user_id` in `partition`, dated `date`.
    pub fn blank(
        id: impl Into<String>,
        user_id: impl Into<String>,
        partition: impl Into<String>,
        date: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            table_type: Some(partition.into()),
            deed_type: String::new(),
            executed_by: String::new(),
            in_favour_of: String::new(),
            date: date.into(),
            document_number: String::new(),
            nature_of_doc: DeedNature::default(),
            custom_fields: ExtraFields::initial(),
            created_at: None,
        }
    }

    /// Current text value of a scalar field.
    pub fn field(&self, field: DeedField) -> String {
        match field {
            DeedField::DeedType => self.deed_type.clone(),
            DeedField::ExecutedBy => self.executed_by.clone(),
            DeedField::InFavourOf => self.in_favour_of.clone(),
            DeedField::Date => self.date.clone(),
            DeedField::DocumentNumber => self.document_number.clone(),
            DeedField::Nature => self.nature_of_doc.to_string(),
        }
    }

    /// Sets a scalar field from user input. Only `Nature` can fail.
    pub fn set_field(&mut self, field: DeedField, value: &str) -> crate::Result<()> {
        match field {
            DeedField::DeedType => self.deed_type = value.to_string(),
            DeedField::ExecutedBy => self.executed_by = value.to_string(),
            DeedField::InFavourOf => self.in_favour_of = value.to_string(),
            DeedField::Date => self.date = value.to_string(),
            DeedField::DocumentNumber => self.document_number = value.to_string(),
            DeedField::Nature => self.nature_of_doc = value.parse()?,
        }
        Ok(())
    }

    /// Copies one scalar field from `other`, used to keep unsent local edits.
    pub fn copy_field_from(&mut self, other: &Deed, field: DeedField) {
        match field {
            DeedField::DeedType => self.deed_type.clone_from(&other.deed_type),
            DeedField::ExecutedBy => self.executed_by.clone_from(&other.executed_by),
            DeedField::InFavourOf => self.in_favour_of.clone_from(&other.in_favour_of),
            DeedField::Date => self.date.clone_from(&other.date),
            DeedField::DocumentNumber => self.document_number.clone_from(&other.document_number),
            DeedField::Nature => self.nature_of_doc = other.nature_of_doc,
        }
    }

    /// Clone into another partition/owner with a fresh id. Date and content are kept.
    pub fn clone_into_partition(
        &self,
        id: impl Into<String>,
        user_id: impl Into<String>,
        partition: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            table_type: Some(partition.into()),
            created_at: None,
            ..self.clone()
        }
    }
}

/// Partial update sent to the store for one deed.
#[derive(Debug, Clone, PartialEq)]
pub enum DeedPatch {
    Field { field: DeedField, value: String },
    ExtraFields(ExtraFields),
}

impl DeedPatch {
    /// JSON body with the backend's column names.
    pub fn to_json(&self) -> Value {
        let mut body = serde_json::Map::new();
        match self {
            DeedPatch::Field { field, value } => {
                body.insert(field.column().to_string(), Value::String(value.clone()));
            }
            DeedPatch::ExtraFields(fields) => {
                let object = fields
                    .iter()
                    .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                    .collect();
                body.insert("custom_fields".to_string(), Value::Object(object));
            }
        }
        Value::Object(body)
    }
}

/// Result of copying deeds from another partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    Copied(usize),
    SourceEmpty,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Reads the stored nature ignoring case. Blank or unrecognised values fall
/// back to `Original` so one bad row cannot fail a whole list response.
fn lenient_nature<'de, D>(deserializer: D) -> Result<DeedNature, D::Error>
where
    D: Deserializer<'de>,
{
    let text = match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => return Ok(DeedNature::default()),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(DeedNature::default());
    }
    if trimmed.eq_ignore_ascii_case(DeedNature::Xerox.as_str()) {
        return Ok(DeedNature::Xerox);
    }
    if !trimmed.eq_ignore_ascii_case(DeedNature::Original.as_str()) {
        warn!(
            "Unknown nature_of_doc '{}', reading it as {}",
            trimmed,
            DeedNature::default()
        );
    }
    Ok(DeedNature::default())
}
