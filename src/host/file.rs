//! JSON-file [`UserStore`], rewritten atomically after each mutation

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{merge_settings, StoreError, UserRecord, UserStore};

#[derive(Clone, Debug)]
pub struct FileUserStore {
    path: PathBuf,
    users: Arc<RwLock<BTreeMap<String, UserRecord>>>,
}

impl FileUserStore {
    /// Open the store at `path`, loading existing users; a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let users = Self::load(&path)?;
        tracing::debug!(path = %path.display(), users = users.len(), "Loaded user store");
        Ok(Self {
            path,
            users: Arc::new(RwLock::new(users)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Result<BTreeMap<String, UserRecord>, StoreError> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let bytes = std::fs::read(path).map_err(|e| io_error(path, e))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(BTreeMap::new());
        }

        let users: Vec<UserRecord> = serde_json::from_slice(&bytes)?;
        Ok(users.into_iter().map(|u| (u.id.clone(), u)).collect())
    }

    /// Serialize under the caller's lock, then write on the blocking pool
    async fn persist(&self, users: &BTreeMap<String, UserRecord>) -> Result<(), StoreError> {
        let snapshot: Vec<&UserRecord> = users.values().collect();
        let serialized = serde_json::to_vec_pretty(&snapshot)?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, &serialized))
            .await
            .map_err(|e| {
                io_error(
                    &self.path,
                    std::io::Error::new(std::io::ErrorKind::Other, e),
                )
            })?
    }
}

/// Replace `path` with `contents` via a synced temp file in the same directory
fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| io_error(dir, e))?;
    tmp.write_all(contents).map_err(|e| io_error(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| io_error(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| io_error(path, e.error))?;

    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
impl UserStore for FileUserStore {
    async fn get_user(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn update_user_settings(
        &self,
        id: &str,
        settings: Map<String, Value>,
    ) -> Result<UserRecord, StoreError> {
        let mut guard = self.users.write().await;

        // Persist a copy first so a failed write leaves the in-memory view untouched.
        let mut next = guard.clone();
        let user = next
            .get_mut(id)
            .ok_or_else(|| StoreError::UserMissing(id.to_string()))?;
        merge_settings(user, settings);
        let updated = user.clone();

        self.persist(&next).await?;
        *guard = next;

        tracing::debug!(user_id = %id, path = %self.path.display(), "Persisted user settings");
        Ok(updated)
    }
}
