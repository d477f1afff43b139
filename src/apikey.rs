use std::{fs, io, path::PathBuf, time::SystemTime};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// File-backed API key store.
///
/// Keys live in a JSON file as `{ "keys": [ { key, name, ... } ] }`.
/// We keep a small in-memory snapshot and auto-reload when the file
/// mtime changes, so keys edited out-of-band are picked up without a
/// restart.
#[derive(Default)]
pub struct KeyStore {
    path: PathBuf,
    mtime: RwLock<Option<SystemTime>>,
    inner: RwLock<Vec<KeyInfo>>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeyInfo {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: String,
    pub active: bool,
}

/// Listing view: everything except the secret itself.
#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeyMeta {
    pub name: String,
    pub description: String,
    pub created_at: String,
    pub active: bool,
}

#[derive(Serialize, Deserialize, Default)]
struct KeyFile {
    keys: Vec<KeyInfo>,
}

impl KeyStore {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let this = Self {
            path: path.into(),
            mtime: RwLock::new(None),
            inner: RwLock::new(Vec::new()),
        };
        // best-effort preload; missing file means no keys yet
        this.refresh();
        this
    }

    fn refresh(&self) {
        let meta = match fs::metadata(&self.path) {
            Ok(m) => m,
            Err(_) => {
                *self.inner.write() = Vec::new();
                *self.mtime.write() = None;
                return;
            }
        };

        let mtime = meta.modified().ok();
        let prev = *self.mtime.read();
        if mtime.is_some() && mtime == prev {
            return;
        }

        if let Ok(text) = fs::read_to_string(&self.path) {
            if let Ok(file) = serde_json::from_str::<KeyFile>(&text) {
                *self.inner.write() = file.keys;
                *self.mtime.write() = mtime;
                return;
            }
        }

        // broken JSON: treat as empty rather than refusing all requests
        *self.inner.write() = Vec::new();
        *self.mtime.write() = mtime;
    }

    /// Active-key lookup used by the request guard.
    pub fn validate(&self, key: &str) -> Option<KeyInfo> {
        self.refresh();
        self.inner
            .read()
            .iter()
            .find(|k| k.key == key && k.active)
            .cloned()
    }

    pub fn create(&self, name: &str, description: &str) -> io::Result<KeyInfo> {
        self.refresh();
        let info = KeyInfo {
            key: format!("key-{}", Uuid::new_v4()),
            name: name.to_string(),
            description: description.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            active: true,
        };
        let mut keys = self.inner.write();
        keys.push(info.clone());
        self.save(&keys)?;
        Ok(info)
    }

    pub fn list(&self) -> Vec<KeyMeta> {
        self.refresh();
        self.inner
            .read()
            .iter()
            .map(|k| KeyMeta {
                name: k.name.clone(),
                description: k.description.clone(),
                created_at: k.created_at.clone(),
                active: k.active,
            })
            .collect()
    }

    /// Flip a key inactive. Returns false when the key is unknown.
    pub fn revoke(&self, key: &str) -> io::Result<bool> {
        self.refresh();
        let mut keys = self.inner.write();
        let Some(entry) = keys.iter_mut().find(|k| k.key == key) else {
            return Ok(false);
        };
        entry.active = false;
        self.save(&keys)?;
        Ok(true)
    }

    fn save(&self, keys: &[KeyInfo]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = KeyFile { keys: keys.to_vec() };
        let text = serde_json::to_string_pretty(&file)?;
        fs::write(&self.path, text)?;
        *self.mtime.write() = fs::metadata(&self.path).and_then(|m| m.modified()).ok();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, KeyStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::load(dir.path().join("api_keys.json"));
        (dir, store)
    }

    #[test]
    fn missing_file_means_no_keys() {
        let (_dir, store) = temp_store();
        assert!(store.validate("anything").is_none());
        assert!(store.list().is_empty());
    }

    #[test]
    fn create_validate_revoke_cycle() {
        let (_dir, store) = temp_store();
        let info = store.create("CI key", "for the pipeline").unwrap();
        assert!(info.key.starts_with("key-"));
        assert!(store.validate(&info.key).is_some());

        assert!(store.revoke(&info.key).unwrap());
        assert!(store.validate(&info.key).is_none(), "revoked key still valid");
        assert!(!store.revoke("key-unknown").unwrap());

        let listed = store.list();
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].active);
    }

    #[test]
    fn keys_survive_a_reload_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_keys.json");
        let store = KeyStore::load(&path);
        let info = store.create("persisted", "").unwrap();

        let reopened = KeyStore::load(&path);
        assert_eq!(reopened.validate(&info.key).unwrap().name, "persisted");
    }

    #[test]
    fn broken_json_is_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_keys.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = KeyStore::load(&path);
        assert!(store.validate("key-x").is_none());
    }

    #[test]
    fn inactive_keys_do_not_validate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_keys.json");
        std::fs::write(
            &path,
            r#"{"keys":[{"key":"key-old","name":"Old","createdAt":"2024-01-01T00:00:00Z","active":false}]}"#,
        )
        .unwrap();
        let store = KeyStore::load(&path);
        assert!(store.validate("key-old").is_none());
    }
}
