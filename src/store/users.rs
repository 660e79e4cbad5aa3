//! File-backed user document store.
//!
//! One JSON document per process holds every user record, guarded by an
//! RwLock and persisted atomically (temp file + rename, 0o600). Reads hand
//! out clones; writes are read-then-write with last-write-wins semantics.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::records::{ApiKeyRecord, RateLimitOverrides, UserRecord};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("an API key with this name already exists")]
    DuplicateName,
    #[error("API key not found")]
    KeyNotFound,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Partial update applied to one key
#[derive(Debug, Default, Clone)]
pub struct KeyPatch {
    pub name: Option<String>,
    pub model: Option<String>,
    pub is_active: Option<bool>,
    pub rate_limit_overrides: Option<RateLimitOverrides>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct UsersFile {
    users: HashMap<String, UserRecord>,
}

pub struct UserStore {
    path: PathBuf,
    users: RwLock<HashMap<String, UserRecord>>,
}

impl UserStore {
    pub async fn new(path: PathBuf) -> Self {
        let users = if path.exists() {
            match fs::read_to_string(&path).await {
                Ok(content) => {
                    let file: UsersFile = serde_json::from_str(&content).unwrap_or_default();
                    file.users
                }
                Err(_) => HashMap::new(),
            }
        } else {
            HashMap::new()
        };

        Self {
            path,
            users: RwLock::new(users),
        }
    }

    pub async fn get(&self, user_id: &str) -> Option<UserRecord> {
        self.users.read().await.get(user_id).cloned()
    }

    /// Bootstrap the user document on first sight, refresh lastLogin after.
    /// Returns the record and whether it was newly created.
    pub async fn ensure_user(&self, user_id: &str) -> Result<(UserRecord, bool), StoreError> {
        let now = Utc::now();
        let (record, created) = {
            let mut guard = self.users.write().await;
            match guard.get_mut(user_id) {
                Some(user) => {
                    user.last_login = now;
                    (user.clone(), false)
                }
                None => {
                    let user = UserRecord::new(now);
                    guard.insert(user_id.to_string(), user.clone());
                    (user, true)
                }
            }
        };

        self.save().await?;
        Ok((record, created))
    }

    /// Register a key; the name must be unique within the user's key set.
    pub async fn add_key(&self, user_id: &str, key: ApiKeyRecord) -> Result<(), StoreError> {
        {
            let mut guard = self.users.write().await;
            let user = guard
                .entry(user_id.to_string())
                .or_insert_with(|| UserRecord::new(Utc::now()));

            if user.api_keys.iter().any(|k| k.name == key.name) {
                return Err(StoreError::DuplicateName);
            }
            user.api_keys.push(key);
        }

        self.save().await?;
        Ok(())
    }

    pub async fn update_key(
        &self,
        user_id: &str,
        key_id: &str,
        patch: KeyPatch,
    ) -> Result<ApiKeyRecord, StoreError> {
        let updated = {
            let mut guard = self.users.write().await;
            let user = guard.get_mut(user_id).ok_or(StoreError::KeyNotFound)?;

            if let Some(name) = &patch.name
                && user
                    .api_keys
                    .iter()
                    .any(|k| k.id != key_id && &k.name == name)
            {
                return Err(StoreError::DuplicateName);
            }

            let key = user
                .api_keys
                .iter_mut()
                .find(|k| k.id == key_id)
                .ok_or(StoreError::KeyNotFound)?;

            if let Some(name) = patch.name {
                key.name = name;
            }
            if let Some(model) = patch.model {
                key.model = model;
            }
            if let Some(is_active) = patch.is_active {
                key.is_active = is_active;
            }
            if let Some(overrides) = patch.rate_limit_overrides {
                key.rate_limit_overrides = overrides;
            }
            key.clone()
        };

        self.save().await?;
        Ok(updated)
    }

    pub async fn delete_key(&self, user_id: &str, key_id: &str) -> Result<bool, StoreError> {
        let deleted = {
            let mut guard = self.users.write().await;
            match guard.get_mut(user_id) {
                Some(user) => {
                    let len_before = user.api_keys.len();
                    user.api_keys.retain(|k| k.id != key_id);
                    user.api_keys.len() < len_before
                }
                None => false,
            }
        };

        if deleted {
            self.save().await?;
        }
        Ok(deleted)
    }

    /// Bump user aggregates and the key's own counters after an attempt.
    pub async fn record_usage(
        &self,
        user_id: &str,
        key_id: &str,
        tokens_used: u64,
        error_increment: u64,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        {
            let mut guard = self.users.write().await;
            let user = guard.get_mut(user_id).ok_or(StoreError::KeyNotFound)?;

            user.usage_stats.total_requests += 1;
            user.usage_stats.total_tokens += tokens_used;
            user.usage_stats.last_request = Some(now);

            if let Some(key) = user.api_keys.iter_mut().find(|k| k.id == key_id) {
                key.usage_stats.requests += 1;
                key.usage_stats.tokens += tokens_used;
                key.usage_stats.errors += error_increment;
                key.last_used = Some(now);
            }
        }

        self.save().await?;
        Ok(())
    }

    async fn save(&self) -> Result<(), std::io::Error> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let guard = self.users.read().await;
        let file = UsersFile {
            users: guard.clone(),
        };
        let content = serde_json::to_string_pretty(&file)?;
        drop(guard);

        // Write to a temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("tmp");

        let mut f = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&temp_path)
            .await?;

        f.write_all(content.as_bytes()).await?;
        f.sync_all().await?;

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}
