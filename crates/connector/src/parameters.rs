//! Named node parameters supplied by the host.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Amount, ConnectorError, Result};

/// Flat bag of named parameter values, keyed by field name.
///
/// Empty strings and `null` are treated as absent, the way an untouched
/// optional field arrives from a node form.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(Map<String, Value>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            other => Err(ConnectorError::invalid(
                "parameters",
                format!("expected an object, got {other}"),
            )),
        }
    }

    /// Builder-style insert, handy for tests and the CLI.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<Value>) {
        self.0.insert(name.to_string(), value.into());
    }

    /// Returns the raw value, skipping `null` and empty strings.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self.0.get(name) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(value) => Some(value),
        }
    }

    pub fn string(&self, name: &str) -> Result<String> {
        self.optional_string(name)?
            .ok_or_else(|| ConnectorError::MissingParameter(name.to_string()))
    }

    /// Reads a string as given; surrounding whitespace is kept.
    pub fn optional_string(&self, name: &str) -> Result<Option<String>> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(ConnectorError::invalid(
                name,
                format!("expected a string, got {other}"),
            )),
        }
    }

    pub fn optional_bool(&self, name: &str) -> Result<Option<bool>> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(Some(true)),
                "false" | "no" | "0" => Ok(Some(false)),
                _ => Err(ConnectorError::invalid(name, format!("\"{s}\" is not a boolean"))),
            },
            Some(other) => Err(ConnectorError::invalid(
                name,
                format!("expected a boolean, got {other}"),
            )),
        }
    }

    pub fn bool_or(&self, name: &str, default: bool) -> Result<bool> {
        Ok(self.optional_bool(name)?.unwrap_or(default))
    }

    /// Reads an integer, accepting integral JSON numbers and numeric strings.
    pub fn integer(&self, name: &str) -> Result<i64> {
        let value = self
            .get(name)
            .ok_or_else(|| ConnectorError::MissingParameter(name.to_string()))?;
        match value {
            Value::Number(n) => n.as_i64().or_else(|| integral(n.as_f64())).ok_or_else(|| {
                ConnectorError::invalid(name, format!("{n} is not an integer"))
            }),
            Value::String(s) => s
                .trim()
                .parse()
                .map_err(|_| ConnectorError::invalid(name, format!("\"{s}\" is not an integer"))),
            other => Err(ConnectorError::invalid(
                name,
                format!("expected an integer, got {other}"),
            )),
        }
    }

    /// Reads a decimal display amount and converts it to minor units.
    pub fn amount(&self, name: &str) -> Result<Amount> {
        self.optional_amount(name)?
            .ok_or_else(|| ConnectorError::MissingParameter(name.to_string()))
    }

    pub fn optional_amount(&self, name: &str) -> Result<Option<Amount>> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => amount_from_value(value)
                .map(Some)
                .map_err(|err| ConnectorError::invalid(name, err.to_string())),
        }
    }

    /// Reads a `YYYY-MM-DD` date.
    pub fn date(&self, name: &str) -> Result<NaiveDate> {
        self.optional_date(name)?
            .ok_or_else(|| ConnectorError::MissingParameter(name.to_string()))
    }

    pub fn optional_date(&self, name: &str) -> Result<Option<NaiveDate>> {
        self.optional_string(name)?
            .map(|raw| {
                let raw = raw.trim();
                NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|err| {
                    ConnectorError::invalid(name, format!("\"{raw}\" is not a YYYY-MM-DD date: {err}"))
                })
            })
            .transpose()
    }

    /// Reads a `YYYY-MM` budget month.
    pub fn month(&self, name: &str) -> Result<String> {
        let raw = self.string(name)?.trim().to_string();
        let valid = NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d").is_ok()
            && raw.len() == 7;
        if !valid {
            return Err(ConnectorError::invalid(
                name,
                format!("\"{raw}\" is not a YYYY-MM month"),
            ));
        }
        Ok(raw)
    }

    /// Reads a JSON array, accepting either an array value or a string
    /// holding JSON.
    pub fn array(&self, name: &str) -> Result<Vec<Value>> {
        let value = self
            .get(name)
            .ok_or_else(|| ConnectorError::MissingParameter(name.to_string()))?;
        let value = match value {
            Value::String(raw) => serde_json::from_str(raw)
                .map_err(|err| ConnectorError::invalid(name, format!("invalid JSON: {err}")))?,
            other => other.clone(),
        };
        match value {
            Value::Array(items) => Ok(items),
            other => Err(ConnectorError::invalid(
                name,
                format!("expected an array, got {other}"),
            )),
        }
    }
}

impl From<Map<String, Value>> for Parameters {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

fn integral(value: Option<f64>) -> Option<i64> {
    let value = value?;
    if value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}

pub(crate) fn amount_from_value(value: &Value) -> Result<Amount> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(whole) => whole
                .checked_mul(100)
                .map(Amount::new)
                .ok_or_else(|| ConnectorError::InvalidAmount("amount too large".to_string())),
            None => {
                let decimal = n
                    .as_f64()
                    .ok_or_else(|| ConnectorError::InvalidAmount(format!("{n} is not a number")))?;
                Amount::from_decimal(decimal)
            }
        },
        Value::String(s) => s.parse(),
        other => Err(ConnectorError::InvalidAmount(format!(
            "expected a number, got {other}"
        ))),
    }
}
