//! Session lifecycle: open, teardown, release.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use vfuse_config::TraceConfig;
use vfuse_core::testing::{FaultingFilesystem, RecordingSink};
use vfuse_core::{DiagnosticKind, Filesystem, SessionBuilder, SessionError, SessionRegistry};
use vfuse_platform::{MetadataType, Platform, PlatformError};

/// Records lifecycle hooks in call order.
#[derive(Default)]
struct Lifecycle {
    calls: Arc<Mutex<Vec<String>>>,
}

impl Filesystem for Lifecycle {
    fn before_mount(&self, mount_point: &Path) {
        self.push(format!("before_mount {}", mount_point.display()));
    }

    fn init(&self) {
        self.push("init".to_string());
    }

    fn destroy(&self) {
        self.push("destroy".to_string());
    }

    fn after_unmount(&self, mount_point: &Path) {
        self.push(format!("after_unmount {}", mount_point.display()));
    }
}

impl Lifecycle {
    fn push(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn counter() -> (Arc<AtomicUsize>, impl FnOnce(&Path) + Send + 'static) {
    let releases = Arc::new(AtomicUsize::new(0));
    let hook = {
        let releases = releases.clone();
        move |_: &Path| {
            releases.fetch_add(1, Ordering::SeqCst);
        }
    };
    (releases, hook)
}

fn supported() -> bool {
    vfuse_platform::resolved_table().ensure_complete().is_ok()
}

#[test]
fn test_session_lifecycle_order() -> anyhow::Result<()> {
    if !supported() {
        return Ok(());
    }
    let registry = SessionRegistry::new();
    let fs = Lifecycle::default();
    let calls = fs.calls.clone();

    let session = SessionBuilder::new(fs, "/mnt/life")
        .trace(TraceConfig::default())
        .open(&registry)?;
    assert_eq!(session.mount_point(), Path::new("/mnt/life"));
    assert!(registry.is_mounted(Path::new("/mnt/life")));
    assert!(session.filesystem().label().ends_with("Lifecycle"));

    session.filesystem().init();
    session.close();

    assert!(registry.is_empty());
    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            "before_mount /mnt/life".to_string(),
            "init".to_string(),
            "destroy".to_string(),
            "after_unmount /mnt/life".to_string(),
        ]
    );
    Ok(())
}

#[test]
fn test_release_once_when_destroy_faults() -> anyhow::Result<()> {
    if !supported() {
        return Ok(());
    }
    let registry = SessionRegistry::new();
    let sink = Arc::new(RecordingSink::new());
    let (releases, hook) = counter();

    let session = SessionBuilder::new(FaultingFilesystem, "/mnt/faulty")
        .trace(TraceConfig::default())
        .sink(sink.clone())
        .on_release(hook)
        .open(&registry)?;

    let fs = session.filesystem().clone();
    fs.destroy();
    assert_eq!(releases.load(Ordering::SeqCst), 1);
    assert!(!registry.is_mounted(Path::new("/mnt/faulty")));
    assert!(!fs.holds_session());

    fs.destroy();
    session.close();
    assert_eq!(releases.load(Ordering::SeqCst), 1);

    let destroy_faults = sink
        .events_for("destroy")
        .into_iter()
        .filter(|e| e.kind == DiagnosticKind::Fault)
        .count();
    assert_eq!(destroy_faults, 3);
    Ok(())
}

#[test]
fn test_release_once_when_destroy_succeeds() -> anyhow::Result<()> {
    if !supported() {
        return Ok(());
    }
    let registry = SessionRegistry::new();
    let (releases, hook) = counter();

    let session = SessionBuilder::new(Lifecycle::default(), "/mnt/clean")
        .on_release(hook)
        .open(&registry)?;
    let fs = session.filesystem().clone();
    session.close();
    fs.destroy();

    assert_eq!(releases.load(Ordering::SeqCst), 1);
    assert!(registry.is_empty());
    Ok(())
}

#[test]
fn test_dropping_session_releases_mount_point() -> anyhow::Result<()> {
    if !supported() {
        return Ok(());
    }
    let registry = SessionRegistry::new();
    let (releases, hook) = counter();
    let session = SessionBuilder::new(Lifecycle::default(), "/mnt/dropped")
        .on_release(hook)
        .open(&registry)?;
    drop(session);

    assert_eq!(releases.load(Ordering::SeqCst), 1);
    assert!(registry.is_empty());
    Ok(())
}

#[test]
fn test_occupied_mount_point_is_rejected() -> anyhow::Result<()> {
    if !supported() {
        return Ok(());
    }
    let registry = SessionRegistry::new();
    let _first = SessionBuilder::new(Lifecycle::default(), "/mnt/shared").open(&registry)?;

    let (releases, hook) = counter();
    let second = SessionBuilder::new(Lifecycle::default(), "/mnt/shared")
        .on_release(hook)
        .open(&registry);
    assert!(matches!(
        second,
        Err(SessionError::AlreadyMounted(ref p)) if p == &PathBuf::from("/mnt/shared")
    ));
    assert_eq!(releases.load(Ordering::SeqCst), 0);
    assert_eq!(registry.len(), 1);
    Ok(())
}

#[test]
fn test_unsupported_platform_fails_before_registration() {
    let registry = SessionRegistry::new();
    let riscv = Platform::from_target("linux", "riscv64", 8);

    let err = SessionBuilder::new(Lifecycle::default(), "/mnt/riscv")
        .platform(riscv)
        .open(&registry)
        .unwrap_err();

    assert!(matches!(
        err,
        SessionError::Platform(PlatformError::Unsupported {
            kind: MetadataType::BlkCnt,
            ..
        })
    ));
    assert!(err.to_string().contains("blkcnt_t"));
    assert!(registry.is_empty());
}

#[test]
fn test_disabled_trace_ignores_sink_but_contains_faults() -> anyhow::Result<()> {
    let registry = SessionRegistry::new();
    let sink = Arc::new(RecordingSink::new());
    let trace = TraceConfig {
        enabled: false,
        ..TraceConfig::default()
    };

    let session = SessionBuilder::new(FaultingFilesystem, "/mnt/quiet")
        .platform(Platform::from_target("linux", "x86_64", 8))
        .trace(trace)
        .sink(sink.clone())
        .open(&registry)?;

    assert_eq!(session.filesystem().unlink("/a"), -libc::EIO);
    session.close();
    assert!(sink.events().is_empty());
    assert!(registry.is_empty());
    Ok(())
}

#[test]
fn test_custom_label_reaches_diagnostics() -> anyhow::Result<()> {
    let registry = SessionRegistry::new();
    let sink = Arc::new(RecordingSink::new());
    let session = SessionBuilder::new(Lifecycle::default(), "/mnt/labelled")
        .platform(Platform::from_target("macos", "aarch64", 8))
        .label("memfs")
        .trace(TraceConfig::default())
        .sink(sink.clone())
        .open(&registry)?;

    assert_eq!(registry.label_of(Path::new("/mnt/labelled")).as_deref(), Some("memfs"));
    let events = sink.events_for("before_mount");
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.filesystem == "memfs"));
    session.close();
    Ok(())
}

#[test]
fn test_trace_settings_from_config_file() -> anyhow::Result<()> {
    let env = vfuse_config::testing::TestEnvironment::new()?;
    env.write_project_config("[trace]\nrender_arguments = false\n")?;
    let config = env.load()?;

    let registry = SessionRegistry::new();
    let sink = Arc::new(RecordingSink::new());
    let session = SessionBuilder::new(Lifecycle::default(), &env.mount_point)
        .platform(Platform::from_target("freebsd", "x86_64", 8))
        .trace(config.trace)
        .sink(sink.clone())
        .open(&registry)?;

    assert!(registry.is_mounted(&env.mount_point));
    let events = sink.events_for("before_mount");
    let entry = &events[0];
    assert_eq!(entry.kind, DiagnosticKind::Enter);
    assert_eq!(entry.detail, None);

    session.close();
    assert!(registry.is_empty());
    Ok(())
}
