use std::collections::BTreeMap;
use std::fs;
use std::io;

use camino::Utf8PathBuf;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::CookieSettings;
use crate::error::RelayError;

/// Flat cookie name to value mapping, fixed once built.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CookieSet(BTreeMap<String, String>);

impl CookieSet {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl FromIterator<(String, String)> for CookieSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CookieBlob {
    List(Vec<CookieEntry>),
    Flat(BTreeMap<String, Value>),
}

#[derive(Deserialize)]
struct CookieEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    value: Option<Value>,
}

/// Loads cookies from an environment blob, falling back to a JSON file.
#[derive(Debug, Clone)]
pub struct CookieProvisioner {
    env_var: Option<String>,
    inline: Option<String>,
    file: Utf8PathBuf,
}

impl CookieProvisioner {
    pub fn from_settings(settings: &CookieSettings) -> Self {
        Self {
            env_var: Some(settings.env_var.clone()),
            inline: None,
            file: settings.file.clone(),
        }
    }

    pub fn from_file(file: impl Into<Utf8PathBuf>) -> Self {
        Self {
            env_var: None,
            inline: None,
            file: file.into(),
        }
    }

    /// Uses `blob` in place of the environment variable.
    pub fn with_blob(blob: impl Into<String>, file: impl Into<Utf8PathBuf>) -> Self {
        Self {
            env_var: None,
            inline: Some(blob.into()),
            file: file.into(),
        }
    }

    pub fn load(&self) -> Result<CookieSet, RelayError> {
        if let Some(blob) = self.blob() {
            debug!("loading cookies from environment blob");
            return parse_cookies(&blob, "environment");
        }

        debug!(file = %self.file, "loading cookies from file");
        let content = fs::read_to_string(self.file.as_std_path()).map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                RelayError::CookiesNotFound(format!("{} does not exist", self.file))
            } else {
                RelayError::CookiesNotFound(format!("failed to read {}: {err}", self.file))
            }
        })?;
        parse_cookies(&content, self.file.as_str())
    }

    fn blob(&self) -> Option<String> {
        self.inline
            .clone()
            .or_else(|| {
                self.env_var
                    .as_deref()
                    .and_then(|name| std::env::var(name).ok())
            })
            .filter(|blob| !blob.trim().is_empty())
    }
}

/// Normalizes either cookie shape into a flat mapping.
///
/// Accepts a browser export (`[{"name": .., "value": .., "domain": ..}]`),
/// where entries without a name are skipped, or an already flat object.
pub fn parse_cookie_blob(raw: &str) -> Result<CookieSet, RelayError> {
    let blob: CookieBlob = serde_json::from_str(raw).map_err(|err| RelayError::CookieParse {
        origin: "blob".to_string(),
        message: err.to_string(),
    })?;

    match blob {
        CookieBlob::List(entries) => entries
            .into_iter()
            .filter_map(|entry| {
                let name = entry.name?;
                Some(match entry.value {
                    Some(value) => Ok((name, value_text(value))),
                    None => Err(RelayError::CookieParse {
                        origin: "blob".to_string(),
                        message: format!("cookie {name} has no value"),
                    }),
                })
            })
            .collect(),
        CookieBlob::Flat(map) => Ok(map
            .into_iter()
            .map(|(name, value)| (name, value_text(value)))
            .collect()),
    }
}

fn parse_cookies(raw: &str, origin: &str) -> Result<CookieSet, RelayError> {
    let cookies = parse_cookie_blob(raw).map_err(|err| match err {
        RelayError::CookieParse { message, .. } => RelayError::CookieParse {
            origin: origin.to_string(),
            message,
        },
        other => other,
    })?;
    if cookies.is_empty() {
        return Err(RelayError::CookiesNotFound(format!(
            "cookie collection from {origin} is empty"
        )));
    }
    Ok(cookies)
}

fn value_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}
