//! Cross-crate integration test helpers.
//!
//! Provides checks that tie the relation layer to what the backend
//! actually stores, plus the end-to-end relation scenarios.

use crate::entities::{Author, Note, Student, Teacher};
use relbox_core::{Entity, EntityId, Store};

/// Asserts that every stored note of `author` points back at it and that
/// the author's backlink lists exactly those notes.
pub fn assert_backlinks_consistent(store: &Store, author: EntityId<Author>) {
    let stored = store
        .box_for::<Author>()
        .get(author)
        .expect("Failed to read author")
        .expect("Author does not exist");
    let mut listed: Vec<u64> = stored
        .notes
        .to_vec()
        .expect("Failed to load notes")
        .iter()
        .map(|n| n.entity_id())
        .collect();
    listed.sort_unstable();

    let mut pointing: Vec<u64> = store
        .box_for::<Note>()
        .all()
        .expect("Failed to read notes")
        .iter()
        .filter(|n| n.author.target_id() == Some(author))
        .map(|n| n.entity_id())
        .collect();
    pointing.sort_unstable();

    assert_eq!(listed, pointing, "backlink of author {author} out of sync");
}

/// Asserts that `teacher` and its students see the same links from both
/// sides of the standalone relation.
pub fn assert_links_symmetric(store: &Store, teacher: EntityId<Teacher>) {
    let stored = store
        .box_for::<Teacher>()
        .get(teacher)
        .expect("Failed to read teacher")
        .expect("Teacher does not exist");
    for student in stored.students.to_vec().expect("Failed to load students") {
        let reloaded = store
            .box_for::<Student>()
            .get(EntityId::new(student.entity_id()))
            .expect("Failed to read student")
            .expect("Linked student does not exist");
        let teachers = reloaded.teachers.to_vec().expect("Failed to load teachers");
        assert!(
            teachers.iter().any(|t| t.entity_id() == teacher.value()),
            "student {} does not link back to teacher {teacher}",
            student.entity_id()
        );
    }
}
