//! # NoteWave Store
//!
//! Local note storage for the NoteWave notes app.
//!
//! ## Features
//!
//! - **LocalStorage**: string key/value store with JSON snapshots per key
//! - **NoteStore**: note CRUD over the single `notes` key
//!
//! Notes live as one JSON array under one key; every mutation rewrites the
//! whole array. That keeps the snapshot readable by any other page instance
//! sharing the storage, at the cost of O(n) writes, which is fine at
//! note-list scale.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, trace};

/// Storage key holding the note array.
pub const NOTES_KEY: &str = "notes";

// ==================== Errors ====================

/// Note storage errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("No note at index {0}")]
    NoSuchNote(usize),

    #[error("Corrupt snapshot under key {key}: {source}")]
    CorruptSnapshot {
        key: String,
        source: serde_json::Error,
    },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ==================== Note ====================

/// One saved note.
///
/// Field names match the stored JSON (`createdAt` / `updatedAt`); timestamps
/// are RFC 3339 instants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    fn new(title: String, content: String) -> Self {
        let now = Utc::now();
        Self {
            title,
            content,
            created_at: now,
            updated_at: now,
        }
    }
}

// ==================== Local Storage ====================

/// String key/value store with one JSON snapshot per key (the
/// `localStorage` capability).
///
/// Clones are cheap and observe the same data, the way every page instance
/// under an origin shares one storage area.
#[derive(Debug, Clone, Default)]
pub struct LocalStorage {
    items: Arc<RwLock<HashMap<String, String>>>,
}

impl LocalStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// The raw string stored under a key, if any.
    pub async fn get_item(&self, key: &str) -> Option<String> {
        self.items.read().await.get(key).cloned()
    }

    /// Store a raw string under a key, replacing any previous value.
    pub async fn set_item(&self, key: &str, value: impl Into<String>) {
        trace!(key, "Storage item set");
        self.items.write().await.insert(key.to_string(), value.into());
    }

    /// Remove a key. Returns whether it existed.
    pub async fn remove_item(&self, key: &str) -> bool {
        self.items.write().await.remove(key).is_some()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

// ==================== Note Store ====================

/// Note CRUD over the `notes` storage key.
#[derive(Debug, Clone)]
pub struct NoteStore {
    storage: LocalStorage,
}

impl NoteStore {
    pub fn new(storage: LocalStorage) -> Self {
        Self { storage }
    }

    /// All saved notes, oldest first. A missing snapshot is an empty list.
    pub async fn list(&self) -> Result<Vec<Note>, StoreError> {
        match self.storage.get_item(NOTES_KEY).await {
            Some(raw) => {
                serde_json::from_str(&raw).map_err(|source| StoreError::CorruptSnapshot {
                    key: NOTES_KEY.to_string(),
                    source,
                })
            }
            None => Ok(Vec::new()),
        }
    }

    /// Save a new note. Whitespace is trimmed off both fields; a note that
    /// is empty after trimming is not added. Returns whether a note was
    /// saved.
    pub async fn add(&self, title: &str, content: &str) -> Result<bool, StoreError> {
        let title = title.trim();
        let content = content.trim();
        if title.is_empty() && content.is_empty() {
            return Ok(false);
        }

        let mut notes = self.list().await?;
        notes.push(Note::new(title.to_string(), content.to_string()));
        self.save(&notes).await?;
        debug!(count = notes.len(), "Note added");
        Ok(true)
    }

    /// Edit the note at `index` in place. `createdAt` is preserved,
    /// `updatedAt` is bumped. An edit that empties both fields is dropped,
    /// leaving the note as it was; returns whether the edit was saved.
    pub async fn update(&self, index: usize, title: &str, content: &str) -> Result<bool, StoreError> {
        let title = title.trim();
        let content = content.trim();
        if title.is_empty() && content.is_empty() {
            return Ok(false);
        }

        let mut notes = self.list().await?;
        let note = notes.get_mut(index).ok_or(StoreError::NoSuchNote(index))?;
        note.title = title.to_string();
        note.content = content.to_string();
        note.updated_at = Utc::now();
        self.save(&notes).await?;
        debug!(index, "Note updated");
        Ok(true)
    }

    /// Delete the note at `index`.
    pub async fn delete(&self, index: usize) -> Result<(), StoreError> {
        let mut notes = self.list().await?;
        if index >= notes.len() {
            return Err(StoreError::NoSuchNote(index));
        }
        notes.remove(index);
        self.save(&notes).await?;
        debug!(index, remaining = notes.len(), "Note deleted");
        Ok(())
    }

    async fn save(&self, notes: &[Note]) -> Result<(), StoreError> {
        let raw = serde_json::to_string(notes)?;
        self.storage.set_item(NOTES_KEY, raw).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> NoteStore {
        NoteStore::new(LocalStorage::new())
    }

    #[tokio::test]
    async fn test_empty_storage_lists_no_notes() {
        let store = store();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_and_list() {
        let store = store();

        assert!(store.add("Groceries", "milk, eggs").await.unwrap());
        assert!(store.add("", "just content").await.unwrap());

        let notes = store.list().await.unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].title, "Groceries");
        assert_eq!(notes[0].content, "milk, eggs");
        assert_eq!(notes[0].created_at, notes[0].updated_at);
        assert_eq!(notes[1].title, "");
    }

    #[tokio::test]
    async fn test_empty_note_is_not_added() {
        let store = store();

        assert!(!store.add("", "").await.unwrap());
        assert!(!store.add("   ", "\n\t").await.unwrap());

        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fields_are_trimmed() {
        let store = store();

        store.add("  Title  ", "  body  ").await.unwrap();

        let notes = store.list().await.unwrap();
        assert_eq!(notes[0].title, "Title");
        assert_eq!(notes[0].content, "body");
    }

    #[tokio::test]
    async fn test_update_bumps_updated_at_and_keeps_created_at() {
        let store = store();
        store.add("Draft", "v1").await.unwrap();
        let before = store.list().await.unwrap()[0].clone();

        assert!(store.update(0, "Draft", "v2").await.unwrap());

        let after = store.list().await.unwrap()[0].clone();
        assert_eq!(after.content, "v2");
        assert_eq!(after.created_at, before.created_at);
        assert!(after.updated_at >= before.updated_at);
    }

    #[tokio::test]
    async fn test_update_to_empty_is_dropped() {
        let store = store();
        store.add("Keep", "me").await.unwrap();

        assert!(!store.update(0, " ", "").await.unwrap());

        let notes = store.list().await.unwrap();
        assert_eq!(notes[0].title, "Keep");
    }

    #[tokio::test]
    async fn test_update_out_of_range() {
        let store = store();
        assert!(matches!(
            store.update(3, "x", "y").await,
            Err(StoreError::NoSuchNote(3))
        ));
    }

    #[tokio::test]
    async fn test_delete_by_index() {
        let store = store();
        store.add("first", "1").await.unwrap();
        store.add("second", "2").await.unwrap();

        store.delete(0).await.unwrap();

        let notes = store.list().await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "second");

        assert!(matches!(
            store.delete(5).await,
            Err(StoreError::NoSuchNote(5))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_is_camel_case_json_under_one_key() {
        let storage = LocalStorage::new();
        let store = NoteStore::new(storage.clone());
        store.add("Title", "body").await.unwrap();

        assert_eq!(storage.len().await, 1);
        let raw = storage.get_item(NOTES_KEY).await.unwrap();
        assert!(raw.starts_with('['));
        assert!(raw.contains(r#""createdAt":"#));
        assert!(raw.contains(r#""updatedAt":"#));
    }

    #[tokio::test]
    async fn test_storage_clones_share_notes() {
        let storage = LocalStorage::new();
        let writer = NoteStore::new(storage.clone());
        let reader = NoteStore::new(storage);

        writer.add("shared", "note").await.unwrap();

        assert_eq!(reader.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_an_error() {
        let storage = LocalStorage::new();
        storage.set_item(NOTES_KEY, "not json").await;
        let store = NoteStore::new(storage);

        assert!(matches!(
            store.list().await,
            Err(StoreError::CorruptSnapshot { .. })
        ));
    }
}
