//! Dispatch decorator behaviour seen through the public contract.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use libc::c_int;
use vfuse_core::diagnostics::{DiagnosticSink, Fault};
use vfuse_core::testing::{invoke, FaultingFilesystem, Invocation, RecordingSink};
use vfuse_core::{
    DiagnosticKind, DirectoryFiller, DirectoryListing, FileInfo, Filesystem, LoggedFilesystem,
    Operation, Stat,
};

/// Small read-only filesystem with one 128-byte file.
struct Fixed;

impl Filesystem for Fixed {
    fn getattr(&self, path: &str, stat: &mut Stat) -> c_int {
        if path != "/a" {
            return -libc::ENOENT;
        }
        stat.size = 128;
        0
    }

    fn read(&self, _path: &str, buffer: &mut [u8], _offset: u64, _info: &FileInfo) -> c_int {
        let n = buffer.len().min(128);
        buffer[..n].fill(b'a');
        n as c_int
    }

    fn readdir(&self, _path: &str, filler: &mut dyn DirectoryFiller) -> c_int {
        for name in [".", "..", "a"] {
            if !filler.add(name, None) {
                break;
            }
        }
        0
    }

    fn get_name(&self) -> Option<String> {
        Some("fixed".to_string())
    }
}

fn recorded(fs: impl Filesystem + 'static) -> (LoggedFilesystem, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let logged = LoggedFilesystem::new(fs)
        .with_label("test-fs")
        .with_sink(sink.clone());
    (logged, sink)
}

#[test]
fn test_read_result_is_returned_and_logged() {
    let (fs, sink) = recorded(Fixed);
    let mut buffer = vec![0u8; 128];

    let n = fs.read("/a", &mut buffer, 0, &FileInfo::default());
    assert_eq!(n, 128);
    assert!(buffer.iter().all(|b| *b == b'a'));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, DiagnosticKind::Enter);
    assert_eq!(events[0].method, "read");
    assert_eq!(events[0].filesystem, "test-fs");
    let args = events[0].detail.clone().unwrap_or_default();
    assert!(args.starts_with(r#""/a", [128 bytes], 0, FileInfo"#), "{args}");

    assert_eq!(events[1].kind, DiagnosticKind::Exit);
    assert_eq!(events[1].detail.as_deref(), Some("128"));
}

#[test]
fn test_getattr_fault_returns_neutral_value() {
    let (fs, sink) = recorded(FaultingFilesystem);
    let mut stat = Stat::default();

    assert_eq!(fs.getattr("/a", &mut stat), -libc::EIO);

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].kind, DiagnosticKind::Fault);
    assert_eq!(events[1].method, "getattr");
    assert_eq!(events[1].detail.as_deref(), Some("getattr exploded"));
}

#[test]
fn test_every_operation_contains_faults() {
    let (fs, sink) = recorded(FaultingFilesystem);

    for op in Operation::ALL.iter().copied() {
        assert_eq!(invoke(&fs, op), Invocation::neutral(op), "{op}");
    }

    let kinds = sink.kinds();
    assert_eq!(kinds.len(), Operation::ALL.len() * 2);
    for (pair, op) in kinds.chunks(2).zip(Operation::ALL) {
        assert_eq!(pair[0], (DiagnosticKind::Enter, op.name().to_string()));
        assert_eq!(pair[1], (DiagnosticKind::Fault, op.name().to_string()));
    }
}

#[test]
fn test_results_pass_through_unchanged() {
    let (fs, _sink) = recorded(Fixed);
    let mut stat = Stat::default();

    assert_eq!(fs.getattr("/missing", &mut stat), -libc::ENOENT);
    assert_eq!(fs.getattr("/a", &mut stat), 0);
    assert_eq!(stat.size, 128);
    assert_eq!(fs.get_name().as_deref(), Some("fixed"));
    assert_eq!(fs.get_options(), None);
    assert_eq!(fs.unlink("/a"), vfuse_core::NOT_IMPLEMENTED);
}

#[test]
fn test_filler_output_reaches_caller() {
    let (fs, sink) = recorded(Fixed);
    let mut listing = DirectoryListing::new();

    assert_eq!(fs.readdir("/", &mut listing), 0);
    assert_eq!(listing.names(), vec![".", "..", "a"]);

    let entry = sink.events_for("readdir")[0].detail.clone();
    assert_eq!(entry.as_deref(), Some(r#""/", <DirectoryFiller>"#));
}

#[test]
fn test_nothing_of_interest_is_elided() {
    let (fs, sink) = recorded(Fixed);
    fs.init();
    fs.get_options();
    fs.get_name();

    let exits: Vec<_> = sink
        .events()
        .into_iter()
        .filter(|e| e.kind == DiagnosticKind::Exit)
        .map(|e| (e.method, e.detail))
        .collect();
    assert_eq!(
        exits,
        vec![
            ("init".to_string(), None),
            ("get_options".to_string(), None),
            ("get_name".to_string(), Some(r#""fixed""#.to_string())),
        ]
    );
}

struct CountingArg(Arc<AtomicUsize>);

impl fmt::Debug for CountingArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fetch_add(1, Ordering::SeqCst);
        f.write_str("counted")
    }
}

#[test]
fn test_arguments_not_rendered_when_entry_disabled() {
    let (fs, sink) = recorded(Fixed);
    let renders = Arc::new(AtomicUsize::new(0));
    let arg = CountingArg(renders.clone());

    sink.set_enabled(DiagnosticKind::Enter, false);
    let result = fs.dispatch(Operation::Access, -libc::EIO, &[&arg], || 0);
    assert_eq!(result, 0);
    assert_eq!(renders.load(Ordering::SeqCst), 0);
    assert_eq!(sink.kinds(), vec![(DiagnosticKind::Exit, "access".to_string())]);

    sink.set_enabled(DiagnosticKind::Enter, true);
    fs.dispatch(Operation::Access, -libc::EIO, &[&arg], || 0);
    assert_eq!(renders.load(Ordering::SeqCst), 1);
}

#[test]
fn test_fault_contained_even_when_diagnostics_disabled() {
    let (fs, sink) = recorded(FaultingFilesystem);
    for kind in [DiagnosticKind::Enter, DiagnosticKind::Exit, DiagnosticKind::Fault] {
        sink.set_enabled(kind, false);
    }

    assert_eq!(fs.truncate("/a", 0), -libc::EIO);
    fs.destroy();
    assert!(sink.events().is_empty());
    assert!(sink.enabled_checks() >= 2);
}

/// Panics on every event, and on the level check for faults.
struct ExplodingSink;

impl DiagnosticSink for ExplodingSink {
    fn enabled(&self, kind: DiagnosticKind) -> bool {
        if kind == DiagnosticKind::Fault {
            panic!("level check exploded");
        }
        true
    }

    fn method_enter(&self, _: &str, _: &str, _: Option<&str>) {
        panic!("enter exploded")
    }

    fn method_exit(&self, _: &str, _: &str, _: Option<&str>) {
        panic!("exit exploded")
    }

    fn method_fault(&self, _: &str, _: &str, _: &Fault) {
        panic!("fault exploded")
    }
}

#[test]
fn test_panicking_sink_does_not_mask_results() {
    let fs = LoggedFilesystem::new(Fixed).with_sink(Arc::new(ExplodingSink));
    let mut stat = Stat::default();
    assert_eq!(fs.getattr("/a", &mut stat), 0);
    assert_eq!(stat.size, 128);

    let faulting = LoggedFilesystem::new(FaultingFilesystem).with_sink(Arc::new(ExplodingSink));
    assert_eq!(faulting.getattr("/a", &mut stat), -libc::EIO);
}

#[test]
fn test_unsupported_operations_stay_unimplemented() {
    let (fs, sink) = recorded(Fixed);
    assert_eq!(fs.mkdir("/d", vfuse_core::Mode::directory(0o755)), -libc::ENOSYS);

    let expected = (-libc::ENOSYS).to_string();
    assert_eq!(
        sink.events_for("mkdir")[1].detail.as_deref(),
        Some(expected.as_str())
    );
}
