//! # Ingest Queue
//!
//! Holds files that passed validation and are waiting for an upload batch.
//!
//! Names are unique within the queue: when the same name is selected twice
//! the first occurrence is kept and later ones are reported as duplicates.
//! Queue order is selection order.

use serde::{Deserialize, Serialize};

use crate::types::PendingFile;

/// What a call to [`IngestQueue::enqueue`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueState {
    /// Names newly added, in order
    pub accepted: Vec<String>,
    /// Names dropped because the queue already held them
    pub duplicates: Vec<String>,
    /// Queue length after the call
    pub len: usize,
}

#[derive(Debug, Clone, Default)]
pub struct IngestQueue {
    files: Vec<PendingFile>,
}

impl IngestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append validated files, skipping names already queued.
    pub fn enqueue(&mut self, files: impl IntoIterator<Item = PendingFile>) -> QueueState {
        let mut state = QueueState::default();
        for file in files {
            if self.contains(&file.name) {
                tracing::debug!(file = %file.name, "Skipping duplicate queued file");
                state.duplicates.push(file.name);
            } else {
                state.accepted.push(file.name.clone());
                self.files.push(file);
            }
        }
        state.len = self.files.len();
        state
    }

    /// Remove a single file by name.
    pub fn remove(&mut self, name: &str) -> Option<PendingFile> {
        let index = self.files.iter().position(|file| file.name == name)?;
        Some(self.files.remove(index))
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn files(&self) -> &[PendingFile] {
        &self.files
    }

    pub fn names(&self) -> Vec<String> {
        self.files.iter().map(|file| file.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.iter().any(|file| file.name == name)
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|file| file.size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, len: usize) -> PendingFile {
        PendingFile::new(name, vec![7u8; len], None)
    }

    #[test]
    fn test_enqueue_keeps_first_occurrence() {
        let mut queue = IngestQueue::new();
        let state = queue.enqueue(vec![file("a.png", 1), file("b.png", 2), file("a.png", 3)]);

        assert_eq!(state.accepted, vec!["a.png", "b.png"]);
        assert_eq!(state.duplicates, vec!["a.png"]);
        assert_eq!(state.len, 2);
        assert_eq!(queue.files()[0].size, 1);

        let state = queue.enqueue(vec![file("b.png", 9), file("c.pdf", 4)]);
        assert_eq!(state.accepted, vec!["c.pdf"]);
        assert_eq!(state.duplicates, vec!["b.png"]);
        assert_eq!(queue.names(), vec!["a.png", "b.png", "c.pdf"]);
        assert_eq!(queue.total_bytes(), 7);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut queue = IngestQueue::new();
        queue.enqueue(vec![file("a.png", 1), file("b.png", 1)]);

        assert_eq!(queue.remove("a.png").map(|f| f.name), Some("a.png".to_string()));
        assert!(queue.remove("a.png").is_none());
        assert!(!queue.contains("a.png"));
        assert_eq!(queue.len(), 1);

        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.total_bytes(), 0);
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let mut queue = IngestQueue::new();
        let state = queue.enqueue(vec![file("Cat.png", 1), file("cat.png", 1)]);
        assert_eq!(state.len, 2);
        assert!(state.duplicates.is_empty());
    }
}
