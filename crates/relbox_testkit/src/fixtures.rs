//! Test fixtures and store helpers.
//!
//! Provides convenience functions for setting up test stores
//! and common test scenarios.

use crate::counting::CountingBackend;
use relbox_core::{Store, StoreConfig};
use relbox_store::StoreBackend;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: Store,
    /// Set when the store sits on a [`CountingBackend`].
    pub counter: Option<Arc<CountingBackend>>,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates a new in-memory test store.
    pub fn memory() -> Self {
        Self {
            store: Store::in_memory(),
            counter: None,
            temp_dir: None,
        }
    }

    /// Creates a store backed by a snapshot file in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("test.rbx");
        let store =
            Store::open(StoreConfig::new().snapshot_path(path)).expect("Failed to open file store");
        Self {
            store,
            counter: None,
            temp_dir: Some(temp_dir),
        }
    }

    /// Creates a store whose backend counts every call.
    pub fn counting() -> Self {
        let counter = Arc::new(CountingBackend::new());
        let backend: Arc<dyn StoreBackend> = Arc::clone(&counter) as Arc<dyn StoreBackend>;
        let store = Store::with_backend(backend, StoreConfig::default());
        Self {
            store,
            counter: Some(counter),
            temp_dir: None,
        }
    }

    /// Returns the snapshot path if file-based, None otherwise.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join("test.rbx"))
    }

    /// Returns the call counter. Panics unless created with [`counting`](Self::counting).
    pub fn calls(&self) -> &CountingBackend {
        self.counter
            .as_deref()
            .expect("Test store was not created with TestStore::counting")
    }

    /// Closes the store and opens the snapshot file again.
    pub fn reopen(self) -> Self {
        let path = self.path().expect("Only file stores can be reopened");
        self.store.close().expect("Failed to close store");
        let store =
            Store::open(StoreConfig::new().snapshot_path(path)).expect("Failed to reopen store");
        Self { store, ..self }
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs a test with a temporary in-memory store.
///
/// # Example
///
/// ```rust
/// use relbox_testkit::{with_temp_store, Author};
///
/// with_temp_store(|store| {
///     let id = store.box_for::<Author>().put(&Author::new("Ada")).unwrap();
///     assert_eq!(id.value(), 1);
/// });
/// ```
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&Store) -> R,
{
    let test_store = TestStore::memory();
    f(&test_store.store)
}

/// Runs a test with a temporary file-based store.
pub fn with_file_store<F, R>(f: F) -> R
where
    F: FnOnce(&Store, &std::path::Path) -> R,
{
    let test_store = TestStore::file();
    let path = test_store.path().expect("File store should have a path");
    f(&test_store.store, &path)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use crate::entities::{Author, Note, Student, Teacher};
    use relbox_core::EntityId;

    /// Creates a store with `authors` authors, each owning `notes_each` notes.
    pub fn populated_authors(authors: usize, notes_each: usize) -> (TestStore, Vec<EntityId<Author>>) {
        let test_store = TestStore::memory();
        let author_box = test_store.box_for::<Author>();
        let mut ids = Vec::with_capacity(authors);

        for a in 0..authors {
            let author = Author::new(&format!("author {a}"));
            author
                .notes
                .extend((0..notes_each).map(|n| Arc::new(Note::new(&format!("note {a}.{n}")))))
                .expect("Failed to stage notes");
            ids.push(author_box.put(&author).expect("Failed to put author"));
        }

        (test_store, ids)
    }

    /// Creates a store where every teacher teaches every student.
    pub fn full_classroom(teachers: usize, students: usize) -> TestStore {
        let test_store = TestStore::memory();
        let student_list: Vec<_> = (0..students)
            .map(|s| Arc::new(Student::new(&format!("student {s}"))))
            .collect();

        let teacher_box = test_store.box_for::<Teacher>();
        for t in 0..teachers {
            let teacher = Teacher::new(&format!("teacher {t}"));
            teacher
                .students
                .extend(student_list.iter().cloned())
                .expect("Failed to stage students");
            teacher_box.put(&teacher).expect("Failed to put teacher");
        }

        test_store
    }
}
