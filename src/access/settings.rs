//! Direct-connection settings patch

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Key of the direct-connection block inside the `ui` settings
pub const DIRECT_CONNECTIONS_KEY: &str = "directConnections";

/// Per-connection options the host UI understands
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ConnectionConfig {
    pub enable: bool,
    pub tags: Vec<String>,
    pub prefix_id: String,
    pub model_ids: Vec<String>,
    pub connection_type: String,
}

impl ConnectionConfig {
    /// A single enabled external connection with no filtering
    pub fn external() -> Self {
        Self {
            enable: true,
            tags: Vec::new(),
            prefix_id: String::new(),
            model_ids: Vec::new(),
            connection_type: "external".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DirectConnections {
    #[serde(rename = "OPENAI_API_BASE_URLS")]
    pub base_urls: Vec<String>,
    #[serde(rename = "OPENAI_API_KEYS")]
    pub api_keys: Vec<String>,
    /// Keyed by the stringified index into `base_urls`
    #[serde(rename = "OPENAI_API_CONFIGS")]
    pub configs: BTreeMap<String, ConnectionConfig>,
}

impl DirectConnections {
    /// One connection to `base_url` authenticated with `token`
    pub fn single(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_urls: vec![base_url.into()],
            api_keys: vec![token.into()],
            configs: BTreeMap::from([("0".to_string(), ConnectionConfig::external())]),
        }
    }
}

/// Top-level patch of the `ui` settings: every key present here replaces the old value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiSettingsPatch {
    #[serde(rename = "directConnections")]
    pub direct_connections: DirectConnections,
}

impl UiSettingsPatch {
    pub fn new(direct_connections: DirectConnections) -> Self {
        Self { direct_connections }
    }

    /// Merge into the previous `ui` settings, keeping keys the patch does not name
    pub fn apply(&self, previous: Option<&Map<String, Value>>) -> Result<Map<String, Value>, serde_json::Error> {
        let mut ui = previous.cloned().unwrap_or_default();
        if let Value::Object(patch) = serde_json::to_value(self)? {
            for (key, value) in patch {
                ui.insert(key, value);
            }
        }
        Ok(ui)
    }

    /// The settings update to hand the store: `{"ui": merged}`
    pub fn into_settings_update(
        self,
        previous: Option<&Map<String, Value>>,
    ) -> Result<Map<String, Value>, serde_json::Error> {
        let ui = self.apply(previous)?;
        let mut update = Map::new();
        update.insert("ui".to_string(), Value::Object(ui));
        Ok(update)
    }
}
