//! Property-based test generators using proptest.
//!
//! Provides strategies for fixture entities and for edit sequences on
//! to-many relations.

use crate::entities::Sample;
use proptest::prelude::*;
use relbox_core::IdCell;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Strategy for dates with millisecond precision, before and after the epoch.
pub fn millis_date_strategy() -> impl Strategy<Value = SystemTime> {
    (-4_000_000_000_000i64..4_000_000_000_000).prop_map(|millis| {
        let magnitude = Duration::from_millis(millis.unsigned_abs());
        if millis >= 0 {
            UNIX_EPOCH + magnitude
        } else {
            UNIX_EPOCH - magnitude
        }
    })
}

/// Strategy for dates with nanosecond precision inside the `i64` range.
pub fn nanos_date_strategy() -> impl Strategy<Value = SystemTime> {
    (0i64..i64::MAX).prop_map(|nanos| UNIX_EPOCH + Duration::from_nanos(nanos.unsigned_abs()))
}

/// Strategy for unsaved [`Sample`]s covering every stored type.
pub fn sample_strategy() -> impl Strategy<Value = Sample> {
    let scalars = (
        any::<bool>(),
        any::<i8>(),
        any::<i16>(),
        any::<i32>(),
        any::<i64>(),
        any::<u32>(),
        any::<f32>().prop_filter("NaN never compares equal", |v| !v.is_nan()),
        any::<f64>().prop_filter("NaN never compares equal", |v| !v.is_nan()),
    );
    let payloads = (
        ".{0,32}",
        proptest::option::of(".{0,32}"),
        prop::collection::vec(any::<u8>(), 0..64),
        proptest::option::of(prop::collection::vec(any::<u8>(), 0..64)),
        proptest::option::of(any::<i32>()),
    );
    let dates = (
        millis_date_strategy(),
        proptest::option::of(millis_date_strategy()),
        nanos_date_strategy(),
    );

    (scalars, payloads, dates).prop_map(
        |(
            (flag, tiny, small, int, long, unsigned, float, double),
            (text, label, blob, attachment, rank),
            (date, due, precise),
        )| Sample {
            id: IdCell::default(),
            flag,
            tiny,
            small,
            int,
            long,
            unsigned,
            float,
            double,
            text,
            label,
            blob,
            attachment,
            rank,
            date,
            due,
            precise,
        },
    )
}

/// One edit on a to-many relation.
///
/// Indexes are taken modulo the list length when applied, so every
/// generated sequence is valid for any list.
#[derive(Debug, Clone)]
pub enum ListEdit {
    /// Append a new, unsaved target.
    PushNew,
    /// Append a target from the shared pool.
    PushExisting(usize),
    /// Remove the element at this index.
    Remove(usize),
    /// Replace `len` elements starting at `start` with pool targets.
    Replace {
        /// Start index.
        start: usize,
        /// Number of replaced elements.
        len: usize,
        /// Pool indexes of the inserted targets.
        with: Vec<usize>,
    },
    /// Remove everything.
    Clear,
}

/// Strategy for a single [`ListEdit`].
pub fn list_edit_strategy() -> impl Strategy<Value = ListEdit> {
    prop_oneof![
        3 => Just(ListEdit::PushNew),
        3 => any::<usize>().prop_map(ListEdit::PushExisting),
        3 => any::<usize>().prop_map(ListEdit::Remove),
        2 => (any::<usize>(), 0usize..3, prop::collection::vec(any::<usize>(), 0..3))
            .prop_map(|(start, len, with)| ListEdit::Replace { start, len, with }),
        1 => Just(ListEdit::Clear),
    ]
}

/// Strategy for a sequence of edits.
pub fn list_edits_strategy(max_len: usize) -> impl Strategy<Value = Vec<ListEdit>> {
    prop::collection::vec(list_edit_strategy(), 0..max_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Author, Note};
    use relbox_core::{Entity, Store};
    use std::sync::Arc;

    fn apply_edit(author: &Author, pool: &[Arc<Note>], edit: &ListEdit, counter: &mut usize) {
        let len = author.notes.len().unwrap();
        match edit {
            ListEdit::PushNew => {
                *counter += 1;
                author
                    .notes
                    .push(Arc::new(Note::new(&format!("new {counter}"))))
                    .unwrap();
            }
            ListEdit::PushExisting(i) => {
                let target = &pool[i % pool.len()];
                // a target appears at most once in a backlink
                if !author.notes.contains(target).unwrap() {
                    author.notes.push(Arc::clone(target)).unwrap();
                }
            }
            ListEdit::Remove(i) if len > 0 => {
                author.notes.remove(i % len).unwrap();
            }
            ListEdit::Remove(_) => {}
            ListEdit::Replace { start, len: count, with } => {
                let start = if len == 0 { 0 } else { start % (len + 1) };
                let end = (start + count).min(len);
                let mut incoming: Vec<Arc<Note>> = Vec::new();
                for i in with {
                    let target = &pool[i % pool.len()];
                    let kept = author.notes.to_vec().unwrap();
                    let elsewhere = kept[..start]
                        .iter()
                        .chain(&kept[end..])
                        .any(|t| t.entity_id() == target.entity_id());
                    if !elsewhere && !incoming.iter().any(|t| Arc::ptr_eq(t, target)) {
                        incoming.push(Arc::clone(target));
                    }
                }
                author.notes.replace_subrange(start..end, incoming).unwrap();
            }
            ListEdit::Clear => author.notes.clear().unwrap(),
        }
    }

    fn ids_of(notes: &[Arc<Note>]) -> Vec<u64> {
        let mut ids: Vec<u64> = notes.iter().map(|n| n.entity_id()).collect();
        ids.sort_unstable();
        ids
    }

    proptest! {
        #[test]
        fn samples_survive_a_put(sample in sample_strategy()) {
            let store = Store::in_memory();
            let samples = store.box_for::<Sample>();
            let id = samples.put(&sample).unwrap();
            prop_assert_eq!(samples.get(id).unwrap().unwrap(), sample);
        }

        #[test]
        fn applied_edits_match_the_in_memory_view(edits in list_edits_strategy(24)) {
            let store = Store::in_memory();
            let pool: Vec<Arc<Note>> = (0..4)
                .map(|i| Arc::new(Note::new(&format!("pool {i}"))))
                .collect();
            store.box_for::<Note>().put_many(pool.iter().map(|n| &**n)).unwrap();

            let author = Author::new("editor");
            let id = store.box_for::<Author>().put(&author).unwrap();

            // apply in rounds so later edits also remove stored targets
            let mut counter = 0;
            for round in edits.chunks(6) {
                for edit in round {
                    apply_edit(&author, &pool, edit, &mut counter);
                    let added = author.notes.pending_additions();
                    let removed = author.notes.pending_removals();
                    for a in &added {
                        prop_assert!(!removed.iter().any(|r| Arc::ptr_eq(a, r)));
                    }
                }
                author.notes.apply_to_db().unwrap();
                prop_assert!(!author.notes.has_pending_db_changes());
            }

            let expected = author.notes.to_vec().unwrap();

            let read = store.box_for::<Author>().get(id).unwrap().unwrap();
            prop_assert_eq!(ids_of(&read.notes.to_vec().unwrap()), ids_of(&expected));
        }
    }
}
