//! Normalization config
//!
//! An optional `abide.json` at the grouping root lists fields whose values
//! change from run to run (timestamps, generated ids, random headers) and
//! the fixed value to substitute for them:
//!
//! ```json
//! {
//!   "defaults": {
//!     "created_at": "2017-01-01T00:00:00Z",
//!     "request_id": "<request-id>"
//!   }
//! }
//! ```
//!
//! Every matching key is replaced at any depth, including inside arrays, so
//! the captured output is stable before it is stored or compared.

use crate::error::{AbideError, Result};
use crate::types::CONFIG_FILE;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::{debug, trace};

/// Parsed `abide.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Field name to replacement value
    #[serde(default)]
    pub defaults: Map<String, Value>,
}

impl Config {
    /// Load `abide.json` from the grouping root
    ///
    /// Returns `Ok(None)` when the file does not exist.
    ///
    /// # Errors
    ///
    /// - [`AbideError::ConfigParse`] if the file is not a valid config
    /// - [`AbideError::Io`] if it exists but cannot be read
    pub fn load(root: &Path) -> Result<Option<Self>> {
        Self::from_path(&root.join(CONFIG_FILE))
    }

    /// Load a config file from an explicit path
    pub fn from_path(path: &Path) -> Result<Option<Self>> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                trace!("No config at {:?}", path);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let config: Config = serde_json::from_slice(&data).map_err(|source| AbideError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;

        debug!("Loaded {} normalization fields from {:?}", config.defaults.len(), path);
        Ok(Some(config))
    }

    /// Build a config from field/replacement pairs
    pub fn with_defaults<I, K>(defaults: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            defaults: defaults.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Check if the config replaces nothing
    pub fn is_empty(&self) -> bool {
        self.defaults.is_empty()
    }

    /// Replace every configured field in `value`, at any depth
    ///
    /// Returns the number of replacements made. A replaced value is not
    /// walked any further.
    pub fn normalize(&self, value: &mut Value) -> usize {
        match value {
            Value::Object(map) => {
                let mut replaced = 0;
                for (key, field) in map.iter_mut() {
                    if let Some(replacement) = self.defaults.get(key) {
                        *field = replacement.clone();
                        replaced += 1;
                    } else {
                        replaced += self.normalize(field);
                    }
                }
                replaced
            }
            Value::Array(items) => items.iter_mut().map(|item| self.normalize(item)).sum(),
            _ => 0,
        }
    }

    /// Normalize a rendered value
    ///
    /// The whole text is tried as JSON first. Failing that, text shaped like
    /// an HTTP message has its body (everything after the first blank line)
    /// tried instead. Text is returned untouched when nothing was replaced.
    pub fn normalize_text(&self, text: &str) -> String {
        if self.is_empty() {
            return text.to_string();
        }

        if let Some(normalized) = self.normalize_json(text) {
            return normalized;
        }

        if let Some((head, sep, body)) = split_body(text) {
            if let Some(normalized) = self.normalize_json(body) {
                return format!("{}{}{}", head, sep, normalized);
            }
        }

        text.to_string()
    }

    fn normalize_json(&self, text: &str) -> Option<String> {
        let mut value: Value = serde_json::from_str(text.trim()).ok()?;
        if !(value.is_object() || value.is_array()) {
            return None;
        }
        if self.normalize(&mut value) == 0 {
            return None;
        }
        serde_json::to_string_pretty(&value).ok()
    }
}

/// Split on the first blank line, keeping the separator
fn split_body(text: &str) -> Option<(&str, &str, &str)> {
    for sep in ["\r\n\r\n", "\n\n"] {
        if let Some(idx) = text.find(sep) {
            let (head, rest) = text.split_at(idx);
            return Some((head, sep, &rest[sep.len()..]));
        }
    }
    None
}
