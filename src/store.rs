//! Filesystem-backed store for generated cards.
//!
//! Layout: `{dir}/{card_id}.png`. Cards are written once, read until an
//! age-based sweep removes them.

use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use tracing::{debug, warn};

pub struct CardStore {
    dir: PathBuf,
}

impl CardStore {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.png"))
    }

    /// Write the card under its id. The artifact only becomes visible
    /// once fully written (tmp file + rename).
    pub fn put(&self, id: &str, bytes: &[u8]) -> io::Result<()> {
        let tmp = self.dir.join(format!("{id}.png.tmp"));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, self.path_for(id))
    }

    pub fn get(&self, id: &str) -> Option<Vec<u8>> {
        fs::read(self.path_for(id)).ok()
    }

    /// Remove cards older than `max_age`; returns the number removed.
    pub fn delete_expired(&self, max_age: Duration) -> usize {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return 0;
        };
        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !is_expired(&path, now, max_age) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(file = %path.display(), "removed expired card");
                    removed += 1;
                }
                Err(e) => warn!(file = %path.display(), error = %e, "failed to remove expired card"),
            }
        }
        removed
    }
}

fn is_expired(path: &Path, now: SystemTime, max_age: Duration) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return false;
    };
    let Ok(mtime) = meta.modified() else {
        return false;
    };
    now.duration_since(mtime).map(|age| age > max_age).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CardStore::new(dir.path()).unwrap();
        store.put("abc", b"png bytes").unwrap();
        assert_eq!(store.get("abc").as_deref(), Some(&b"png bytes"[..]));
        assert!(store.get("missing").is_none());
        // no stray tmp file left behind
        assert!(!dir.path().join("abc.png.tmp").exists());
    }

    #[test]
    fn sweep_removes_only_old_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = CardStore::new(dir.path()).unwrap();
        store.put("old", b"x").unwrap();
        std::thread::sleep(Duration::from_millis(25));
        store.put("fresh", b"y").unwrap();

        let removed = store.delete_expired(Duration::from_millis(20));
        assert_eq!(removed, 1);
        assert!(store.get("old").is_none());
        assert!(store.get("fresh").is_some());
    }

    #[test]
    fn sweep_with_long_retention_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = CardStore::new(dir.path()).unwrap();
        store.put("keep", b"x").unwrap();
        assert_eq!(store.delete_expired(Duration::from_secs(60 * 60)), 0);
        assert!(store.get("keep").is_some());
    }
}
