//! Host collaborators: user directory and settings store

mod file;
mod memory;

pub use file::FileUserStore;
pub use memory::MemoryUserStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A user record as the host serves it
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UserRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: String,
    /// `<provider>@<subject>` for users created through OAuth
    #[serde(default)]
    pub oauth_sub: Option<String>,
    #[serde(default)]
    pub settings: Option<Map<String, Value>>,
    #[serde(default)]
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl UserRecord {
    pub fn new(id: impl Into<String>, oauth_sub: Option<&str>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            email: String::new(),
            role: "user".to_string(),
            oauth_sub: oauth_sub.map(str::to_string),
            settings: None,
            updated_at: None,
        }
    }

    /// The `ui` section of the user's settings, if any
    pub fn ui_settings(&self) -> Option<&Map<String, Value>> {
        self.settings.as_ref()?.get("ui")?.as_object()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("User not found in store: {0}")]
    UserMissing(String),

    #[error("Failed to access user store {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to (de)serialize user store: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Read/write access to the host's users and their settings
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, id: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Merge `settings` into the user's settings at the top level and return the updated user
    async fn update_user_settings(
        &self,
        id: &str,
        settings: Map<String, Value>,
    ) -> Result<UserRecord, StoreError>;
}

/// Overwrite-by-key merge of `update` into `user.settings`
pub(crate) fn merge_settings(user: &mut UserRecord, update: Map<String, Value>) {
    let settings = user.settings.get_or_insert_with(Map::new);
    for (key, value) in update {
        settings.insert(key, value);
    }
    user.updated_at = Some(chrono::Utc::now());
}
