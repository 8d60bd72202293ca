use crate::utils::{property, DEFAULT_SERVICE_USER};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PropertyError {
    #[error("Property {name} on {path} is not a date")]
    NotADate { path: String, name: String },
}

/// Value of a single item property.
///
/// Read from and written as plain JSON. Strings are kept verbatim even
/// when they look like dates; [`as_date`](Self::as_date) interprets them
/// on demand. Dates set by the daemon are written as RFC 3339 strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    Date(DateTime<Utc>),
    String(String),
    /// Multi-valued property
    Array(Vec<PropertyValue>),
    Object(Map<String, Value>),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            PropertyValue::Date(d) => Some(*d),
            PropertyValue::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|d| d.with_timezone(&Utc)),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }
}

impl From<Value> for PropertyValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => PropertyValue::Null,
            Value::Bool(b) => PropertyValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => PropertyValue::Long(i),
                None => PropertyValue::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => PropertyValue::String(s),
            Value::Array(values) => {
                PropertyValue::Array(values.into_iter().map(PropertyValue::from).collect())
            }
            Value::Object(map) => PropertyValue::Object(map),
        }
    }
}

impl From<PropertyValue> for Value {
    fn from(value: PropertyValue) -> Self {
        match value {
            PropertyValue::Null => Value::Null,
            PropertyValue::Bool(b) => Value::Bool(b),
            PropertyValue::Long(n) => Value::from(n),
            // non-finite doubles have no JSON form
            PropertyValue::Double(d) => Number::from_f64(d).map_or(Value::Null, Value::Number),
            PropertyValue::Date(d) => Value::String(d.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            PropertyValue::String(s) => Value::String(s),
            PropertyValue::Array(values) => {
                Value::Array(values.into_iter().map(Value::from).collect())
            }
            PropertyValue::Object(map) => Value::Object(map),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Null => Ok(()),
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Long(n) => write!(f, "{}", n),
            PropertyValue::Double(d) => write!(f, "{}", d),
            PropertyValue::Date(d) => f.write_str(&d.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            PropertyValue::String(s) => f.write_str(s),
            PropertyValue::Array(values) => {
                let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                f.write_str(&parts.join(", "))
            }
            PropertyValue::Object(map) => write!(f, "{}", Value::Object(map.clone())),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(value: DateTime<Utc>) -> Self {
        PropertyValue::Date(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Long(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Double(value)
    }
}

/// One node of the content tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub path: String,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl ContentItem {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style property setter
    pub fn with_property(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// True when the property is present and not null
    pub fn has_property(&self, name: &str) -> bool {
        self.get(name).map_or(false, |v| !v.is_null())
    }

    /// String form of a property, if present and not null
    pub fn string_property(&self, name: &str) -> Option<String> {
        self.get(name)
            .filter(|v| !v.is_null())
            .map(|v| v.to_string())
    }

    /// Date property, `Ok(None)` when absent or null, an error when present but not a date
    pub fn date_property(&self, name: &str) -> Result<Option<DateTime<Utc>>, PropertyError> {
        match self.get(name) {
            None | Some(PropertyValue::Null) => Ok(None),
            Some(value) => value.as_date().map(Some).ok_or_else(|| PropertyError::NotADate {
                path: self.path.clone(),
                name: name.to_string(),
            }),
        }
    }

    /// Published items carry the replication marker
    pub fn is_published(&self) -> bool {
        self.has_property(property::LAST_REPLICATED)
    }

    pub fn processed_at(&self) -> Result<Option<DateTime<Utc>>, PropertyError> {
        self.date_property(property::PROCESSED_AT)
    }
}

/// Identity a store session is opened for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub service_user: String,
}

impl ServiceIdentity {
    pub fn new(service_user: impl Into<String>) -> Self {
        Self {
            service_user: service_user.into(),
        }
    }
}

impl Default for ServiceIdentity {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_USER)
    }
}
