//! Schema fetching interface
//!
//! The compiler performs no network I/O by itself. When a reference
//! points outside every indexed document, it asks a [`SchemaFetcher`]
//! for the raw text of the schema URI (fragment already stripped). The
//! host decides transport, caching policy and trust; this module only
//! defines the interface plus two self-contained implementations.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context};
use serde_json::Value;
use url::Url;
use walkdir::WalkDir;

/// Supplies raw schema text for a URI during compilation.
///
/// Invoked only while a schema compiles; validation never fetches.
pub trait SchemaFetcher {
    fn fetch(&self, uri: &Url) -> anyhow::Result<String>;
}

/// Default fetcher: always fails.
///
/// Compilation of self-contained schemas never invokes it.
pub struct NoNetworkFetcher;

impl SchemaFetcher for NoNetworkFetcher {
    fn fetch(&self, uri: &Url) -> anyhow::Result<String> {
        Err(anyhow!(
            "remote schema fetching is disabled; {uri} must be embedded or supplied by a fetcher"
        ))
    }
}

/// Serves fetches from a directory of `*.json` schema files.
///
/// Every file is registered under its declared `$id` (fragment stripped),
/// falling back to a `file://` URL of its path. Useful for validating
/// against local copies of remote schemas without touching the network.
pub struct DirFetcher {
    schemas: HashMap<Url, String>,
}

impl DirFetcher {
    pub fn new(root: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut schemas = HashMap::new();
        for entry in WalkDir::new(root.as_ref()) {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() || path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let json: Value = match serde_json::from_str(&content) {
                Ok(json) => json,
                Err(_) => continue,
            };
            let key = match json.get("$id").and_then(Value::as_str) {
                Some(id) => {
                    let mut url = Url::parse(id)
                        .with_context(|| format!("invalid $id '{}' in {}", id, path.display()))?;
                    url.set_fragment(None);
                    url
                }
                None => {
                    let canonical = path
                        .canonicalize()
                        .with_context(|| format!("failed to canonicalize {}", path.display()))?;
                    Url::from_file_path(&canonical)
                        .map_err(|_| anyhow!("cannot build file URL for {}", canonical.display()))?
                }
            };
            tracing::debug!(uri = %key, path = %path.display(), "registered local schema");
            schemas.insert(key, content);
        }
        Ok(Self { schemas })
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

impl SchemaFetcher for DirFetcher {
    fn fetch(&self, uri: &Url) -> anyhow::Result<String> {
        self.schemas
            .get(uri)
            .cloned()
            .ok_or_else(|| anyhow!("schema {uri} not found in local schema directory"))
    }
}

/// Blocking HTTP fetcher.
#[cfg(feature = "remote")]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "remote")]
impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
        }
    }
}

#[cfg(feature = "remote")]
impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "remote")]
impl SchemaFetcher for HttpFetcher {
    fn fetch(&self, uri: &Url) -> anyhow::Result<String> {
        let response = self.client.get(uri.clone()).send()?.error_for_status()?;
        Ok(response.text()?)
    }
}
