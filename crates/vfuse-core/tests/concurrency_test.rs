//! Many kernel worker threads driving one decorated filesystem.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use libc::c_int;
use vfuse_core::testing::RecordingSink;
use vfuse_core::{DiagnosticKind, FileInfo, Filesystem, LoggedFilesystem};

const THREADS: usize = 8;
const CALLS: usize = 200;

/// Writes succeed; every seventh write panics.
#[derive(Default)]
struct Flaky {
    writes: AtomicU64,
}

impl Filesystem for Flaky {
    fn write(&self, _path: &str, data: &[u8], _offset: u64, _info: &FileInfo) -> c_int {
        let n = self.writes.fetch_add(1, Ordering::SeqCst);
        if n % 7 == 6 {
            panic!("write {n} failed");
        }
        data.len() as c_int
    }
}

#[test]
fn test_concurrent_calls_pair_entry_with_outcome() {
    let sink = Arc::new(RecordingSink::new());
    let fs = Arc::new(LoggedFilesystem::new(Flaky::default()).with_sink(sink.clone()));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let fs = fs.clone();
            thread::spawn(move || {
                let mut results = Vec::with_capacity(CALLS);
                for i in 0..CALLS {
                    let data = vec![0u8; i % 16 + 1];
                    let written = fs.write("/log", &data, 0, &FileInfo::default());
                    results.push((data.len() as c_int, written));
                }
                results
            })
        })
        .collect();

    let mut faults = 0;
    for handle in handles {
        for (expected, actual) in handle.join().unwrap() {
            if actual == -libc::EIO {
                faults += 1;
            } else {
                assert_eq!(actual, expected);
            }
        }
    }

    let total = THREADS * CALLS;
    assert_eq!(faults, total / 7);

    // Per thread, events alternate enter / outcome
    let mut per_thread: HashMap<_, Vec<DiagnosticKind>> = HashMap::new();
    for event in sink.events() {
        per_thread.entry(event.thread).or_default().push(event.kind);
    }
    assert_eq!(per_thread.len(), THREADS);
    for kinds in per_thread.values() {
        assert_eq!(kinds.len(), CALLS * 2);
        for pair in kinds.chunks(2) {
            assert_eq!(pair[0], DiagnosticKind::Enter);
            assert!(matches!(pair[1], DiagnosticKind::Exit | DiagnosticKind::Fault));
        }
    }

    let fault_events = sink
        .events()
        .iter()
        .filter(|e| e.kind == DiagnosticKind::Fault)
        .count();
    assert_eq!(fault_events, faults);
}
