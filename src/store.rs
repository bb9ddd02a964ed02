use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// One generated image held for the lifetime of a session.
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub filename: String,
    pub data: Vec<u8>,
    pub mime_type: String,
    pub product_name: String,
    pub color_name: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Session {
    id: Uuid,
    images: BTreeMap<String, StoredImage>,
}

/// Session-scoped filename -> image mapping.
///
/// A generation run opens a fresh session and writes under that session's
/// id; inserts carrying a superseded id are dropped, so an older run that
/// is still finishing cannot clobber the authoritative one. Downloads
/// always read the current session.
#[derive(Clone)]
pub struct ImageStore {
    inner: Arc<Mutex<Session>>,
}

impl Default for ImageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Session {
                id: Uuid::new_v4(),
                images: BTreeMap::new(),
            })),
        }
    }

    /// Discards the current session and starts a new empty one, returning
    /// the id the caller must present on subsequent inserts.
    pub async fn begin_session(&self) -> Uuid {
        let mut guard = self.inner.lock().await;
        guard.id = Uuid::new_v4();
        guard.images.clear();
        guard.id
    }

    /// Records an image under `session`. Returns false (and stores
    /// nothing) when the session has been superseded.
    pub async fn insert(&self, session: Uuid, image: StoredImage) -> bool {
        let mut guard = self.inner.lock().await;
        if guard.id != session {
            return false;
        }
        guard.images.insert(image.filename.clone(), image);
        true
    }

    /// Writes into the current session unconditionally; used by
    /// single-image regeneration, which replaces whatever run produced
    /// the previous take.
    pub async fn put(&self, image: StoredImage) {
        let mut guard = self.inner.lock().await;
        guard.images.insert(image.filename.clone(), image);
    }

    pub async fn get(&self, filename: &str) -> Option<StoredImage> {
        let guard = self.inner.lock().await;
        guard.images.get(filename).cloned()
    }

    /// Images of the current session in filename order.
    pub async fn snapshot(&self) -> Vec<StoredImage> {
        let guard = self.inner.lock().await;
        guard.images.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        let guard = self.inner.lock().await;
        guard.images.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(filename: &str) -> StoredImage {
        StoredImage {
            filename: filename.to_string(),
            data: vec![1, 2, 3],
            mime_type: "image/jpeg".to_string(),
            product_name: "Jacket".to_string(),
            color_name: "Black".to_string(),
            generated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn begin_session_clears_previous_images() {
        let store = ImageStore::new();
        let session = store.begin_session().await;
        assert!(store.insert(session, image("A")).await);
        assert_eq!(store.len().await, 1);

        store.begin_session().await;
        assert_eq!(store.len().await, 0);
        assert!(store.get("A").await.is_none());
    }

    #[tokio::test]
    async fn stale_session_cannot_write() {
        let store = ImageStore::new();
        let old = store.begin_session().await;
        let _new = store.begin_session().await;
        assert!(!store.insert(old, image("A")).await);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn snapshot_is_filename_ordered() {
        let store = ImageStore::new();
        let session = store.begin_session().await;
        store.insert(session, image("B")).await;
        store.insert(session, image("A")).await;
        let names: Vec<String> = store
            .snapshot()
            .await
            .into_iter()
            .map(|img| img.filename)
            .collect();
        assert_eq!(names, vec!["A".to_string(), "B".to_string()]);
    }
}
