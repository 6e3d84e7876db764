use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("token store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("token store {path} is not valid JSON: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredTokens {
    access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

/// OAuth credentials keyed by user id, persisted as a JSON object.
pub struct TokenStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, StoredTokens>>,
}

impl TokenStore {
    /// Reads the store at `path`. A missing file is an empty store.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, TokenStoreError> {
        let path = path.into();

        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text).map_err(|source| TokenStoreError::Format {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no token store at {}, starting empty", path.display());
                BTreeMap::new()
            }
            Err(source) => return Err(TokenStoreError::Io { path, source }),
        };

        info!("loaded {} credential(s) from {}", entries.len(), path.display());
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn get(&self, user_id: &str) -> Option<Credential> {
        self.entries
            .read()
            .await
            .get(user_id)
            .map(|tokens| to_credential(user_id, tokens))
    }

    /// Credential for the first of `user_ids` that has one, otherwise any.
    pub async fn preferred(&self, user_ids: &[&str]) -> Option<Credential> {
        let entries = self.entries.read().await;

        user_ids
            .iter()
            .find_map(|id| entries.get_key_value(*id))
            .or_else(|| entries.iter().next())
            .map(|(id, tokens)| to_credential(id, tokens))
    }

    /// Inserts or replaces the credential for `user_id` and writes the store.
    pub async fn add(
        &self,
        user_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<(), TokenStoreError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            user_id.to_string(),
            StoredTokens {
                access_token: access_token.to_string(),
                refresh_token: refresh_token.map(str::to_string),
            },
        );
        self.persist(&entries).await?;

        debug!("stored credential for user {}", user_id);
        Ok(())
    }

    async fn persist(&self, entries: &BTreeMap<String, StoredTokens>) -> Result<(), TokenStoreError> {
        let json = serde_json::to_string_pretty(entries).map_err(|source| TokenStoreError::Format {
            path: self.path.clone(),
            source,
        })?;

        let tmp = self.path.with_extension("tmp");
        let io_err = |source| TokenStoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

fn to_credential(user_id: &str, tokens: &StoredTokens) -> Credential {
    Credential {
        user_id: user_id.to_string(),
        access_token: tokens.access_token.clone(),
        refresh_token: tokens.refresh_token.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::load(dir.path().join("tokens.json")).await.unwrap();

        assert!(store.is_empty().await);
        assert!(store.preferred(&["1"]).await.is_none());
    }

    #[tokio::test]
    async fn test_add_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tokens.json");

        let store = TokenStore::load(&path).await.unwrap();
        store.add("42", "access", Some("refresh")).await.unwrap();
        store.add("7", "other", None).await.unwrap();

        let reloaded = TokenStore::load(&path).await.unwrap();
        assert_eq!(reloaded.len().await, 2);
        assert_eq!(
            reloaded.get("42").await,
            Some(Credential {
                user_id: "42".to_string(),
                access_token: "access".to_string(),
                refresh_token: Some("refresh".to_string()),
            })
        );
        assert_eq!(reloaded.get("7").await.unwrap().refresh_token, None);
    }

    #[tokio::test]
    async fn test_add_replaces_existing_user() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::load(dir.path().join("tokens.json")).await.unwrap();

        store.add("42", "old", Some("r1")).await.unwrap();
        store.add("42", "new", Some("r2")).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("42").await.unwrap().access_token, "new");
    }

    #[tokio::test]
    async fn test_preferred_falls_back_to_any() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::load(dir.path().join("tokens.json")).await.unwrap();
        store.add("owner", "a", None).await.unwrap();
        store.add("bot", "b", None).await.unwrap();

        assert_eq!(store.preferred(&["bot", "owner"]).await.unwrap().user_id, "bot");
        assert_eq!(store.preferred(&["missing", "owner"]).await.unwrap().user_id, "owner");
        assert!(store.preferred(&["missing"]).await.is_some());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let err = TokenStore::load(&path).await.err().unwrap();
        assert!(matches!(err, TokenStoreError::Format { .. }));
    }
}
