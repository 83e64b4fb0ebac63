use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::BuildError;

/// One `{threshold, color}` pair of a gradient ramp, as entered on a panel (`"0.5m"`, `"#9ecae1"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradientStop {
    pub threshold: String,
    pub color: String,
}

impl GradientStop {
    pub fn new(threshold: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            threshold: threshold.into(),
            color: color.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Number(f64),
    /// Free text and colors.
    Text(String),
    Stops(Vec<GradientStop>),
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        ConfigValue::Bool(v)
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        ConfigValue::Number(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        ConfigValue::Text(v.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        ConfigValue::Text(v)
    }
}

impl From<Vec<GradientStop>> for ConfigValue {
    fn from(v: Vec<GradientStop>) -> Self {
        ConfigValue::Stops(v)
    }
}

/// Panel-owned settings for one overlay. WOCE only reads them.
///
/// Omitted fields fall back to the defaults of the overlay's style; fields of the wrong
/// type are rejected rather than silently replaced.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverlayConfiguration(BTreeMap<String, ConfigValue>);

impl OverlayConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Numbers may also arrive as numeric text from form inputs.
    pub fn number_or(&self, key: &str, default: f64) -> Result<f64, BuildError> {
        let value = match self.0.get(key) {
            None => return Ok(default),
            Some(ConfigValue::Number(n)) => *n,
            Some(ConfigValue::Text(s)) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| BuildError::invalid_value(key, "a number"))?,
            Some(_) => return Err(BuildError::invalid_value(key, "a number")),
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(BuildError::invalid_value(key, "a finite number"))
        }
    }

    pub fn ranged_or(&self, key: &str, default: f64, min: f64, max: f64) -> Result<f64, BuildError> {
        let value = self.number_or(key, default)?;
        if (min..=max).contains(&value) {
            Ok(value)
        } else {
            Err(BuildError::invalid_value(
                key,
                format!("a number in [{min}, {max}]"),
            ))
        }
    }

    pub fn flag_or(&self, key: &str, default: bool) -> Result<bool, BuildError> {
        match self.0.get(key) {
            None => Ok(default),
            Some(ConfigValue::Bool(b)) => Ok(*b),
            Some(_) => Err(BuildError::invalid_value(key, "true or false")),
        }
    }

    pub fn text_or(&self, key: &str, default: &str) -> Result<String, BuildError> {
        match self.0.get(key) {
            None => Ok(default.to_string()),
            Some(ConfigValue::Text(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            Some(_) => Err(BuildError::invalid_value(key, "non-empty text")),
        }
    }

    pub fn stops_or(&self, key: &str, default: &[(&str, &str)]) -> Result<Vec<GradientStop>, BuildError> {
        match self.0.get(key) {
            None => Ok(default
                .iter()
                .map(|(t, c)| GradientStop::new(*t, *c))
                .collect()),
            Some(ConfigValue::Stops(stops)) => Ok(stops.clone()),
            Some(_) => Err(BuildError::invalid_value(key, "a list of {threshold, color}")),
        }
    }
}

impl<K: Into<String>, V: Into<ConfigValue>> FromIterator<(K, V)> for OverlayConfiguration {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
