use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub count: u32,
}

/// Per-user request counters persisted as a JSON object keyed by user id.
///
/// Not synchronized on its own; every access goes through the serial queue.
#[derive(Debug)]
pub struct UserStore {
    path: PathBuf,
    users: BTreeMap<String, UserRecord>,
}

impl UserStore {
    /// Loads the store at `path`, writing an empty one first if the file is missing.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if !path.exists() {
            let empty = Self {
                path: path.clone(),
                users: BTreeMap::new(),
            };
            if let Err(err) = empty.save().await {
                tracing::error!(error = %err, "failed to create user store");
            }
        }
        Self::load(path)
    }

    /// Reads the store; a missing or corrupt file yields an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let users = match read_users(&path) {
            Ok(users) => users,
            Err(err) => {
                tracing::error!(path = %path.display(), error = ?err, "failed to load user store");
                BTreeMap::new()
            }
        };
        Self { path, users }
    }

    /// Writes a snapshot beside the store, then renames it over the old file,
    /// so a failed save leaves the previous contents in place.
    pub async fn save(&self) -> Result<()> {
        let body = serde_json::to_string_pretty(&self.users)?;
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("writing user store snapshot {}", tmp.display()))?;
        if let Err(err) = tokio::fs::rename(&tmp, &self.path).await {
            // some platforms refuse to rename over an existing file
            let _ = tokio::fs::remove_file(&self.path).await;
            if let Err(retry) = tokio::fs::rename(&tmp, &self.path).await {
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(anyhow::Error::new(retry).context(format!(
                    "replacing user store {} (first attempt: {err})",
                    self.path.display()
                )));
            }
        }
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, user: &str) -> Option<UserRecord> {
        self.users.get(user).copied()
    }

    pub fn get_mut(&mut self, user: &str) -> Option<&mut UserRecord> {
        self.users.get_mut(user)
    }

    /// Returns the user's record, creating a zeroed one if absent.
    pub fn ensure(&mut self, user: &str) -> &mut UserRecord {
        self.users.entry(user.to_string()).or_default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }
}

fn read_users(path: &Path) -> Result<BTreeMap<String, UserRecord>> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}
