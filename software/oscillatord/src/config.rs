//! Flat `key=value` configuration store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::Error;

/// Parsed configuration file.
///
/// Lines are `key=value` with surrounding whitespace trimmed. Blank lines
/// and lines starting with `#` are skipped, as are lines without `=`.
/// A key given twice keeps its last value.
#[derive(Clone, Debug, Default)]
pub struct Config {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl Config {
    /// Read and parse a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let text = std::fs::read_to_string(&path).map_err(|source| Error::ConfigRead {
            path: path.clone(),
            source,
        })?;
        let mut config = Self::parse(&text);
        config.path = path;
        Ok(config)
    }

    /// Parse configuration text that did not come from a file
    pub fn parse(text: &str) -> Self {
        let values = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.trim().to_owned(), v.trim().to_owned()))
            .collect();

        Self {
            path: PathBuf::new(),
            values,
        }
    }

    /// File this configuration was read from, empty if parsed from text
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_default<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Get a value that has no sensible default
    pub fn require(&self, key: &'static str) -> Result<&str, Error> {
        self.get(key).ok_or_else(|| Error::MissingKey {
            key,
            path: self.path.clone(),
        })
    }

    pub fn get_bool_default(&self, key: &str, default: bool) -> Result<bool, Error> {
        match self.get(key) {
            None => Ok(default),
            Some("true" | "yes" | "on" | "1") => Ok(true),
            Some("false" | "no" | "off" | "0") => Ok(false),
            Some(other) => Err(invalid(key, other)),
        }
    }

    pub fn get_u32_default(&self, key: &str, default: u32) -> Result<u32, Error> {
        self.get_parsed_default(key, default)
    }

    pub fn get_i64_default(&self, key: &str, default: i64) -> Result<i64, Error> {
        self.get_parsed_default(key, default)
    }

    pub fn get_f64_default(&self, key: &str, default: f64) -> Result<f64, Error> {
        self.get_parsed_default(key, default)
    }

    /// Comma-separated list, `None` if the key is absent
    pub fn get_list<T: FromStr>(&self, key: &str) -> Result<Option<Vec<T>>, Error> {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };
        raw.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| item.parse::<T>().map_err(|_| invalid(key, raw)))
            .collect::<Result<Vec<T>, Error>>()
            .map(Some)
    }

    fn get_parsed_default<T: FromStr>(&self, key: &str, default: T) -> Result<T, Error> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse::<T>().map_err(|_| invalid(key, raw)),
        }
    }
}

fn invalid(key: &str, value: &str) -> Error {
    Error::InvalidValue {
        key: key.to_owned(),
        value: value.to_owned(),
    }
}
