use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// A single configuration value as supplied by a world description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// A 64-bit signed integer value.
    Integer(i64),
    /// A 64-bit floating-point value.
    Float(f64),
    /// A text value.
    String(String),
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "\"{s}\""),
        }
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<u32> for ConfigValue {
    fn from(v: u32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<usize> for ConfigValue {
    fn from(v: usize) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

/// A flat key-value configuration section for one model (or the world).
///
/// Readers take a default that is returned when the key is absent. Present
/// but uninterpretable values are reported as [`CoreError::MalformedValue`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelConfig {
    values: BTreeMap<String, ConfigValue>,
}

impl ModelConfig {
    /// Create an empty configuration section.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Insert or replace a value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        self.values.insert(key.into(), value.into());
    }

    /// Return the raw value for a key.
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    /// Return `true` if the key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Remove a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<ConfigValue> {
        self.values.remove(key)
    }

    /// Iterate over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Return `true` if the section holds no entries.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy every entry of `other` into this section, replacing duplicates.
    pub fn merge(&mut self, other: &ModelConfig) {
        for (k, v) in &other.values {
            self.values.insert(k.clone(), v.clone());
        }
    }

    /// Read a float. Integers are widened and numeric strings are parsed.
    pub fn read_float(&self, key: &str, default: f64) -> CoreResult<f64> {
        match self.values.get(key) {
            None => Ok(default),
            Some(ConfigValue::Float(v)) => Ok(*v),
            Some(ConfigValue::Integer(v)) => Ok(*v as f64),
            Some(ConfigValue::String(s)) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| malformed(key, s, "a number")),
        }
    }

    /// Read an integer. Floats with a fractional part are rejected.
    pub fn read_int(&self, key: &str, default: i64) -> CoreResult<i64> {
        match self.values.get(key) {
            None => Ok(default),
            Some(ConfigValue::Integer(v)) => Ok(*v),
            Some(ConfigValue::Float(v)) if v.fract() == 0.0 => Ok(*v as i64),
            Some(ConfigValue::Float(v)) => Err(malformed(key, &v.to_string(), "an integer")),
            Some(ConfigValue::String(s)) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| malformed(key, s, "an integer")),
        }
    }

    /// Read a non-negative count.
    pub fn read_count(&self, key: &str, default: usize) -> CoreResult<usize> {
        let v = self.read_int(key, default as i64)?;
        usize::try_from(v).map_err(|_| malformed(key, &v.to_string(), "a non-negative integer"))
    }

    /// Read a string. Numbers are rendered as text.
    pub fn read_string(&self, key: &str, default: &str) -> String {
        match self.values.get(key) {
            None => default.to_string(),
            Some(ConfigValue::String(s)) => s.clone(),
            Some(ConfigValue::Integer(v)) => v.to_string(),
            Some(ConfigValue::Float(v)) => v.to_string(),
        }
    }

    /// Read a 0/1 flag.
    pub fn read_bool(&self, key: &str, default: bool) -> CoreResult<bool> {
        match self.read_int(key, i64::from(default))? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(malformed(key, &other.to_string(), "0 or 1")),
        }
    }

    /// Read an angle configured in degrees, returning radians.
    pub fn read_angle(&self, key: &str, default_radians: f64) -> CoreResult<f64> {
        self.read_float(key, default_radians.to_degrees())
            .map(f64::to_radians)
    }

    /// Read a whitespace-separated tuple of exactly `N` numbers.
    pub fn read_tuple<const N: usize>(&self, key: &str) -> CoreResult<Option<[f64; N]>> {
        let Some(value) = self.values.get(key) else {
            return Ok(None);
        };
        let ConfigValue::String(s) = value else {
            return Err(malformed(key, &value.to_string(), "a quoted list of numbers"));
        };
        let parsed: Result<Vec<f64>, _> = s.split_whitespace().map(str::parse::<f64>).collect();
        match parsed {
            Ok(v) if v.len() == N => {
                let mut out = [0.0; N];
                out.copy_from_slice(&v);
                Ok(Some(out))
            }
            _ => Err(malformed(key, s, "a list of numbers of the right length")),
        }
    }
}

fn malformed(key: &str, value: &str, expected: &'static str) -> CoreError {
    CoreError::MalformedValue {
        key: key.to_string(),
        value: value.to_string(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let cfg = ModelConfig::new();
        assert_eq!(cfg.read_float("range_max", 8.0).unwrap(), 8.0);
        assert_eq!(cfg.read_int("samples", 180).unwrap(), 180);
        assert_eq!(cfg.read_string("color", "red"), "red");
        assert!(cfg.read_bool("obstacle_return", true).unwrap());
    }

    #[test]
    fn integers_widen_to_floats_and_strings_parse() {
        let cfg = ModelConfig::new()
            .with("a", 3_i64)
            .with("b", "2.5")
            .with("c", "  7 ");
        assert_eq!(cfg.read_float("a", 0.0).unwrap(), 3.0);
        assert_eq!(cfg.read_float("b", 0.0).unwrap(), 2.5);
        assert_eq!(cfg.read_int("c", 0).unwrap(), 7);
    }

    #[test]
    fn malformed_values_are_reported() {
        let cfg = ModelConfig::new()
            .with("range_max", "far")
            .with("samples", 2.5)
            .with("flag", 3_i64);
        assert!(matches!(
            cfg.read_float("range_max", 1.0),
            Err(CoreError::MalformedValue { .. })
        ));
        assert!(cfg.read_int("samples", 1).is_err());
        assert!(cfg.read_bool("flag", false).is_err());
        assert!(cfg.read_count("neg", 0).is_ok());
        assert!(ModelConfig::new().with("neg", -1_i64).read_count("neg", 0).is_err());
    }

    #[test]
    fn angles_are_degrees_in_config() {
        let cfg = ModelConfig::new().with("fov", 90.0);
        let fov = cfg.read_angle("fov", 0.0).unwrap();
        assert!((fov - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        let default = ModelConfig::new().read_angle("fov", 1.0).unwrap();
        assert!((default - 1.0).abs() < 1e-12);
    }

    #[test]
    fn tuples_parse_exact_length() {
        let cfg = ModelConfig::new()
            .with("spose[0]", "0.1 0.2 45")
            .with("spose[1]", "0.1 0.2");
        assert_eq!(
            cfg.read_tuple::<3>("spose[0]").unwrap(),
            Some([0.1, 0.2, 45.0])
        );
        assert!(cfg.read_tuple::<3>("spose[1]").is_err());
        assert_eq!(cfg.read_tuple::<3>("spose[9]").unwrap(), None);
    }

    #[test]
    fn json_values_deserialize_untagged() {
        let cfg: ModelConfig =
            serde_json::from_str(r#"{"samples": 5, "fov": 180.0, "color": "red"}"#).unwrap();
        assert_eq!(cfg.get("samples"), Some(&ConfigValue::Integer(5)));
        assert_eq!(cfg.get("fov"), Some(&ConfigValue::Float(180.0)));
        assert_eq!(cfg.get("color"), Some(&ConfigValue::from("red")));
    }
}
