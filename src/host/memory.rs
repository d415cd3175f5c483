//! In-process [`UserStore`] for tests and local runs

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{merge_settings, StoreError, UserRecord, UserStore};

#[derive(Clone, Debug, Default)]
pub struct MemoryUserStore {
    users: Arc<RwLock<HashMap<String, UserRecord>>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = UserRecord>) -> Self {
        let map = users.into_iter().map(|u| (u.id.clone(), u)).collect();
        Self {
            users: Arc::new(RwLock::new(map)),
        }
    }

    pub async fn insert(&self, user: UserRecord) {
        self.users.write().await.insert(user.id.clone(), user);
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_user(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn update_user_settings(
        &self,
        id: &str,
        settings: Map<String, Value>,
    ) -> Result<UserRecord, StoreError> {
        let mut guard = self.users.write().await;
        let user = guard
            .get_mut(id)
            .ok_or_else(|| StoreError::UserMissing(id.to_string()))?;
        merge_settings(user, settings);
        Ok(user.clone())
    }
}
