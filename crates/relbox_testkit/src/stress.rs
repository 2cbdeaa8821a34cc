//! Stress tests for relbox.
//!
//! These tests drive relations under heavy load and concurrent access.

use crate::entities::{Author, Note, Student, Teacher};
use relbox_core::{CoreError, Entity, Store, ToOne};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations to perform.
    pub operations: usize,
    /// Number of concurrent threads (for concurrent tests).
    pub threads: usize,
    /// Targets staged per relation change.
    pub batch_size: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 1_000,
            threads: 4,
            batch_size: 8,
        }
    }
}

fn tally(successful: &AtomicUsize, failed: &AtomicUsize, ok: bool) {
    if ok {
        successful.fetch_add(1, Ordering::Relaxed);
    } else {
        failed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Puts authors that each own a batch of new notes.
pub fn stress_sequential_puts(store: &Store, config: &StressConfig) -> StressTestResult {
    let authors = store.box_for::<Author>();
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        let author = Author::new(&format!("author {i}"));
        let staged = author.notes.extend(
            (0..config.batch_size).map(|n| Arc::new(Note::new(&format!("note {i}.{n}")))),
        );
        match staged.and_then(|()| authors.put(&author)) {
            Ok(_) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Runs `op(thread, i)` `ops_per_thread` times on each of `threads` scoped
/// threads. `op` reports success.
fn run_concurrent(
    threads: usize,
    ops_per_thread: usize,
    op: impl Fn(usize, usize) -> bool + Sync,
) -> StressTestResult {
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let start = Instant::now();

    thread::scope(|scope| {
        for t in 0..threads {
            let (op, successful, failed) = (&op, &successful, &failed);
            scope.spawn(move || {
                for i in 0..ops_per_thread {
                    tally(successful, failed, op(t, i));
                }
            });
        }
    });

    StressTestResult::new(successful.into_inner(), failed.into_inner(), start.elapsed())
}

/// Resolves one shared lazy to-one from many threads at once.
///
/// Every call counts as successful when the target comes back.
pub fn stress_concurrent_resolves(store: &Store, config: &StressConfig) -> StressTestResult {
    let target = match store.box_for::<Author>().put(&Author::new("shared")) {
        Ok(id) => id,
        Err(_) => return StressTestResult::new(0, config.operations, Duration::ZERO),
    };
    let relation = ToOne::<Author>::lazy(store, target.value());

    run_concurrent(config.threads, config.operations / config.threads, |_, _| {
        relation.target().is_some()
    })
}

/// Appends new notes to one shared author from many threads, applying
/// after every append.
pub fn stress_concurrent_appends(store: &Store, config: &StressConfig) -> StressTestResult {
    let author = Author::new("busy");
    if store.box_for::<Author>().put(&author).is_err() {
        return StressTestResult::new(0, config.operations, Duration::ZERO);
    }

    run_concurrent(config.threads, config.operations / config.threads, |t, i| {
        let note = Arc::new(Note::new(&format!("note {t}.{i}")));
        author
            .notes
            .push(note)
            .and_then(|()| author.notes.apply_to_db())
            .is_ok()
    })
}

/// Adds and removes the same student link over and over.
pub fn stress_link_churn(store: &Store, config: &StressConfig) -> StressTestResult {
    let teacher = Teacher::new("churn");
    let student = Arc::new(Student::new("churned"));
    let setup = store
        .box_for::<Teacher>()
        .put(&teacher)
        .and_then(|_| store.box_for::<Student>().put(&student));
    if setup.is_err() {
        return StressTestResult::new(0, config.operations, Duration::ZERO);
    }

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        let result = if i % 2 == 0 {
            teacher.students.push(Arc::clone(&student))
        } else {
            teacher.students.clear()
        };
        match result.and_then(|()| teacher.students.apply_to_db()) {
            Ok(()) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Runs puts where every other transaction aborts after the relation writes.
pub fn stress_transaction_aborts(store: &Store, config: &StressConfig) -> StressTestResult {
    let authors = store.box_for::<Author>();
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        // Every other transaction will fail intentionally
        let should_fail = i % 2 == 0;

        let result = store.run_in_transaction(|| {
            let author = Author::new(&format!("author {i}"));
            author.notes.push(Arc::new(Note::new("note")))?;
            authors.put(&author)?;
            if should_fail {
                Err(CoreError::illegal_state("intentional"))
            } else {
                Ok(author.entity_id())
            }
        });

        match result {
            Ok(_) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}
