//! Flat string key/value configuration map
//!
//! Values can come from code, from a `.properties` style file, or from
//! environment variables named after the property keys.

use std::collections::HashMap;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use crate::{env_var_name, ConfigError};

/// String-keyed property map with typed accessors
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Properties {
    values: HashMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse properties text.
    ///
    /// Accepts `key=value` and `key: value` lines. Lines starting with `#` or
    /// `!` are comments. A key without a separator maps to an empty value.
    pub fn parse(text: &str) -> Self {
        let mut properties = Self::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }

            let (key, value) = match line.find(['=', ':']) {
                Some(idx) => (&line[..idx], &line[idx + 1..]),
                None => (line, ""),
            };

            properties.insert(key.trim(), value.trim());
        }

        properties
    }

    /// Read and parse a properties file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.display().to_string(),
            details: e.to_string(),
        })?;

        Ok(Self::parse(&text))
    }

    /// Collect the given keys from environment variables.
    ///
    /// Each key is looked up under its [`env_var_name`]; unset variables are
    /// left out so defaults still apply.
    pub fn from_env<'a>(keys: impl IntoIterator<Item = &'a str>) -> Self {
        keys.into_iter()
            .filter_map(|key| {
                std::env::var(env_var_name(key))
                    .ok()
                    .map(|value| (key.to_string(), value))
            })
            .collect()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.values.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Non-empty value for `key`, trimmed
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    /// Parse the value for `key`, or return `default` when the key is absent
    ///
    /// # Arguments
    /// * `key` - Property key, e.g. `redis.max.active`
    /// * `default` - Value used when the key is not set
    ///
    /// # Returns
    /// * `Ok(T)` with the parsed value or `default`
    /// * `Err(ConfigError::ParseError)` naming the key and the offending text
    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let Some(raw) = self.get(key).map(str::trim) else {
            return Ok(default);
        };
        raw.parse().map_err(|e: T::Err| ConfigError::ParseError {
            key: key.to_string(),
            details: format!("'{}': {}", raw, e),
        })
    }

    /// Parse a boolean, accepting `true`/`false` in any case
    pub fn parse_bool_or(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key).map(str::trim) {
            None => Ok(default),
            Some(v) if v.eq_ignore_ascii_case("true") => Ok(true),
            Some(v) if v.eq_ignore_ascii_case("false") => Ok(false),
            Some(v) => Err(ConfigError::ParseError {
                key: key.to_string(),
                details: format!("'{}' is not a boolean", v),
            }),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for Properties
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl From<HashMap<String, String>> for Properties {
    fn from(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}
