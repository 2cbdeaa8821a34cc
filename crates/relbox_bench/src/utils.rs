//! Benchmark utilities.

use rand::distributions::Alphanumeric;
use rand::Rng;
use relbox_testkit::{Author, Note, Sample};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

/// Generate random bytes of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate a random alphanumeric string of the specified length.
pub fn random_text(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate an unsaved sample whose text and blob have `payload_size` bytes.
pub fn random_sample(payload_size: usize) -> Sample {
    let mut rng = rand::thread_rng();
    Sample {
        flag: rng.gen(),
        int: rng.gen(),
        long: rng.gen(),
        double: rng.gen(),
        text: random_text(payload_size),
        label: Some(random_text(16)),
        blob: random_data(payload_size),
        rank: Some(rng.gen()),
        date: UNIX_EPOCH + Duration::from_millis(rng.gen_range(0..4_000_000_000_000)),
        ..Sample::default()
    }
}

/// Generate unsaved notes with random text.
pub fn generate_notes(count: usize) -> Vec<Arc<Note>> {
    (0..count)
        .map(|_| Arc::new(Note::new(&random_text(32))))
        .collect()
}

/// Generate an unsaved author that owns `notes` new notes.
pub fn author_with_notes(notes: usize) -> Author {
    let author = Author::new(&random_text(12));
    author
        .notes
        .extend(generate_notes(notes))
        .expect("Unbound relations accept edits");
    author
}
