use serde::Deserialize;
use std::path::Path;
use url::Url;

use crate::error::{Error, Result};

/// Store credentials loaded once at startup. Immutable for the lifetime of
/// the manager.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
}

impl BridgeConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: BridgeConfig =
            serde_yaml::from_str(&contents).map_err(|source| Error::ConfigParse {
                path: path.display().to_string(),
                source,
            })?;

        Url::parse(&config.url).map_err(|source| Error::ConfigUrl {
            url: config.url.clone(),
            source,
        })?;
        // The client appends /api/v2/... paths itself.
        while config.url.ends_with('/') {
            config.url.pop();
        }
        Ok(config)
    }
}
