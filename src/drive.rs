//! The drive page: listing, uploading and deleting objects of the bucket.

use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::backend::{progress_percent, ObjectStore, UploadOptions};
use crate::models::file::{FileItem, StoredObject};
use crate::sanitize::{is_sanitized, sanitize_file_name};

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Human readable size, base 1024, at most two decimals.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let fixed = format!("{value:.2}");
    let fixed = fixed.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", fixed, SIZE_UNITS[unit])
}

/// A file picked for upload: the name the client gave it and its bytes.
pub struct SelectedFile {
    pub name: String,
    pub data: Bytes,
}

/// Upload progress per user, polled by the drive page.
#[derive(Default)]
pub struct ProgressBoard {
    uploads: Mutex<HashMap<String, u8>>,
}

impl ProgressBoard {
    pub fn get(&self, user_id: &str) -> u8 {
        self.uploads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn set(&self, user_id: &str, percent: u8) {
        self.uploads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id.to_string(), percent);
    }

    pub fn reset(&self, user_id: &str) {
        self.uploads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(user_id);
    }
}

/// The bucket as seen by one caller.
pub struct Drive<'a> {
    pub store: &'a dyn ObjectStore,
    pub token: Option<&'a str>,
    pub cache_control: String,
}

/// What the drive page shows. Built per request.
#[derive(Debug, Default, Serialize)]
pub struct DriveView {
    pub files: Vec<FileItem>,
    pub error: Option<String>,
}

impl Drive<'_> {
    fn to_item(&self, object: StoredObject) -> FileItem {
        if !is_sanitized(&object.name) {
            log::warn!("bucket holds a key the drive would not produce: {:?}", object.name);
        }
        let size = object.size();
        FileItem {
            id: object.id.clone().unwrap_or_else(|| object.name.clone()),
            url: self.store.public_url(&object.name),
            size,
            size_label: format_file_size(size),
            created_at: object.created_at.unwrap_or_else(Utc::now),
            name: object.name,
        }
    }
}

impl DriveView {
    /// Replaces the listing with the bucket's current contents.
    pub async fn refresh(&mut self, drive: &Drive<'_>) {
        match drive.store.list(drive.token).await {
            Ok(objects) => {
                self.files = objects.into_iter().map(|o| drive.to_item(o)).collect();
            }
            Err(e) => {
                log::error!("error fetching files: {e:?}");
                self.files.clear();
                self.error = Some(format!("Failed to fetch file list: {e}"));
            }
        }
    }

    /// Stores `file` under its sanitized name, overwriting any object with
    /// the same key, then lists the bucket again.
    pub async fn upload(
        &mut self,
        drive: &Drive<'_>,
        file: SelectedFile,
        board: &Arc<ProgressBoard>,
        user_id: &str,
    ) {
        let key = sanitize_file_name(&file.name);
        log::info!("uploading {:?} as {key} ({} bytes)", file.name, file.data.len());

        board.set(user_id, 0);
        let progress_board = board.clone();
        let progress_user = user_id.to_string();
        let opts = UploadOptions {
            upsert: true,
            cache_control: drive.cache_control.clone(),
            content_type: infer::get(&file.data).map(|t| t.mime_type().to_string()),
            progress: Some(Arc::new(move |sent: u64, total: u64| {
                progress_board.set(&progress_user, progress_percent(sent, total));
            })),
        };

        let result = drive.store.upload(drive.token, &key, file.data, opts).await;
        board.reset(user_id);

        match result {
            Ok(()) => self.refresh(drive).await,
            Err(e) => {
                log::error!("error uploading file: {e:?}");
                self.error = Some(format!("File upload failed: {e}"));
            }
        }
    }

    /// Removes `name` from the bucket and, once that succeeded, from the
    /// listing.
    pub async fn delete(&mut self, drive: &Drive<'_>, name: &str) {
        match drive.store.remove(drive.token, &[name.to_string()]).await {
            Ok(()) => self.files.retain(|f| f.name != name),
            Err(e) => {
                log::error!("error deleting file: {e:?}");
                self.error = Some(format!("File deletion failed: {e}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, MemoryBackend, Result};
    use async_trait::async_trait;

    struct BrokenStore;

    #[async_trait]
    impl ObjectStore for BrokenStore {
        async fn list(&self, _: Option<&str>) -> Result<Vec<StoredObject>> {
            Err(BackendError::Api { status: 400, message: "Bucket not found".into() })
        }
        async fn upload(&self, _: Option<&str>, _: &str, _: Bytes, opts: UploadOptions) -> Result<()> {
            if let Some(report) = opts.progress {
                report(5, 10);
            }
            Err(BackendError::Network("connection reset".into()))
        }
        async fn remove(&self, _: Option<&str>, _: &[String]) -> Result<()> {
            Err(BackendError::NotFound("Object not found".into()))
        }
        fn public_url(&self, key: &str) -> String {
            format!("broken://{key}")
        }
    }

    fn drive(store: &dyn ObjectStore) -> Drive<'_> {
        Drive { store, token: None, cache_control: "max-age=3600".into() }
    }

    fn item(name: &str) -> FileItem {
        FileItem {
            id: name.into(),
            name: name.into(),
            size: 1,
            size_label: "1 B".into(),
            url: format!("broken://{name}"),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1_234_567), "1.18 MB");
        assert_eq!(format_file_size(5 * 1024 * 1024 * 1024), "5 GB");
        assert_eq!(format_file_size(3 * 1024u64.pow(5)), "3072 TB");
    }

    #[actix_web::test]
    async fn upload_then_list_shows_sanitized_entry() {
        let store = MemoryBackend::new("s", "temp_1");
        let board = Arc::new(ProgressBoard::default());
        let d = drive(&store);
        let mut view = DriveView::default();
        let data = Bytes::from(vec![1u8; 4321]);

        view.upload(&d, SelectedFile { name: "My Résumé (final).pdf".into(), data }, &board, "u1")
            .await;

        assert!(view.error.is_none());
        assert_eq!(view.files.len(), 1);
        let f = &view.files[0];
        assert!(is_sanitized(&f.name));
        assert_eq!(f.name, "My-R-sum-final-.pdf");
        assert_eq!(f.size, 4321);
        assert_eq!(f.url, "memory://temp_1/My-R-sum-final-.pdf");
        assert_eq!(board.get("u1"), 0);
    }

    #[actix_web::test]
    async fn same_sanitized_name_overwrites() {
        let store = MemoryBackend::new("s", "temp_1");
        let board = Arc::new(ProgressBoard::default());
        let d = drive(&store);
        let mut view = DriveView::default();
        for (name, len) in [("a b.txt", 3usize), ("a?b.txt", 9)] {
            let file = SelectedFile { name: name.into(), data: Bytes::from(vec![0u8; len]) };
            view.upload(&d, file, &board, "u1").await;
        }
        assert_eq!(view.files.len(), 1);
        assert_eq!(view.files[0].size, 9);
    }

    #[actix_web::test]
    async fn list_failure_leaves_empty_list() {
        let d = drive(&BrokenStore);
        let mut view = DriveView { files: vec![item("old.txt")], error: None };
        view.refresh(&d).await;
        assert!(view.files.is_empty());
        assert_eq!(view.error.as_deref(), Some("Failed to fetch file list: Bucket not found"));
    }

    #[actix_web::test]
    async fn upload_failure_resets_progress() {
        let d = drive(&BrokenStore);
        let board = Arc::new(ProgressBoard::default());
        let mut view = DriveView { files: vec![item("keep.txt")], error: None };
        let file = SelectedFile { name: "x.txt".into(), data: Bytes::from_static(b"0123456789") };
        view.upload(&d, file, &board, "u1").await;
        assert_eq!(board.get("u1"), 0);
        assert_eq!(view.files.len(), 1);
        assert!(view.error.unwrap().starts_with("File upload failed: network error"));
    }

    #[actix_web::test]
    async fn delete_removes_only_matching_entry() {
        let store = MemoryBackend::new("s", "temp_1");
        let board = Arc::new(ProgressBoard::default());
        let d = drive(&store);
        let mut view = DriveView::default();
        for name in ["one.txt", "two.txt"] {
            let file = SelectedFile { name: name.into(), data: Bytes::from_static(b"x") };
            view.upload(&d, file, &board, "u1").await;
        }
        view.delete(&d, "one.txt").await;
        let names: Vec<_> = view.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["two.txt"]);

        view.delete(&d, "missing.txt").await;
        assert_eq!(view.files.len(), 1);
        assert!(view.error.is_none());
    }

    #[actix_web::test]
    async fn failed_delete_keeps_local_list() {
        let d = drive(&BrokenStore);
        let mut view = DriveView { files: vec![item("a.txt")], error: None };
        view.delete(&d, "not-there.txt").await;
        view.delete(&d, "a.txt").await;
        assert_eq!(view.files.len(), 1);
        assert_eq!(view.error.as_deref(), Some("File deletion failed: Object not found"));
    }

    #[test]
    fn board_tracks_users_separately() {
        let board = ProgressBoard::default();
        board.set("a", 40);
        assert_eq!(board.get("a"), 40);
        assert_eq!(board.get("b"), 0);
        board.reset("a");
        assert_eq!(board.get("a"), 0);
    }
}
