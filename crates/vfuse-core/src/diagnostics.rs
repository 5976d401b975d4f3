//! Diagnostics emitted around every dispatched operation.
//!
//! A [`DiagnosticSink`] receives method-entry, method-exit and fault events. Each kind is
//! gated by [`DiagnosticSink::enabled`] so argument and result rendering only happens
//! when someone is listening.

use std::any::Any;
use std::cell::Cell;
use std::fmt::{self, Write as _};
use std::panic::{self, AssertUnwindSafe};

use libc::c_int;
use once_cell::sync::Lazy;
use tracing::Level;
use vfuse_config::{Component, TraceConfig};

/// Target used by [`TracingSink`] events
pub const DISPATCH_TARGET: &str = "vfuse::dispatch";

/// Placeholder for an argument whose `Debug` impl failed or panicked
pub const UNRENDERABLE: &str = "<unrenderable>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    Enter,
    Exit,
    Fault,
}

/// A panic caught at the dispatch boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    detail: String,
}

impl Fault {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }

    /// Extract a readable message from a panic payload
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let detail = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => (*message).to_string(),
                Err(_) => "non-string panic payload".to_string(),
            },
        };
        Self { detail }
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.detail)
    }
}

thread_local! {
    static CONTAINING: Cell<u32> = const { Cell::new(0) };
}

/// Wraps the process panic hook once. Panics raised under [`contain`] on this thread skip
/// the hook; they are reported through a [`DiagnosticSink`] instead.
static QUIET_HOOK: Lazy<()> = Lazy::new(|| {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let contained = CONTAINING.try_with(|depth| depth.get() > 0).unwrap_or(false);
        if !contained {
            previous(info);
        }
    }));
});

struct ContainGuard;

impl ContainGuard {
    fn enter() -> Self {
        Lazy::force(&QUIET_HOOK);
        CONTAINING.with(|depth| depth.set(depth.get() + 1));
        ContainGuard
    }
}

impl Drop for ContainGuard {
    fn drop(&mut self) {
        CONTAINING.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Run `call`, turning a panic into a [`Fault`]. A contained panic never reaches the
/// panic hook, so nothing is written to stderr.
pub fn contain<T>(call: impl FnOnce() -> T) -> Result<T, Fault> {
    let _guard = ContainGuard::enter();
    panic::catch_unwind(AssertUnwindSafe(call)).map_err(Fault::from_panic)
}

/// Receiver for dispatch diagnostics. Must tolerate concurrent calls.
pub trait DiagnosticSink: Send + Sync {
    fn enabled(&self, kind: DiagnosticKind) -> bool;

    /// `arguments` is `None` when argument rendering is turned off
    fn method_enter(&self, filesystem: &str, method: &str, arguments: Option<&str>);

    /// `result` is `None` for operations with nothing to report
    fn method_exit(&self, filesystem: &str, method: &str, result: Option<&str>);

    fn method_fault(&self, filesystem: &str, method: &str, fault: &Fault);
}

/// Sink writing to `tracing`: entry and exit at DEBUG, faults at WARN.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn enabled(&self, kind: DiagnosticKind) -> bool {
        match kind {
            DiagnosticKind::Enter | DiagnosticKind::Exit => {
                tracing::enabled!(target: DISPATCH_TARGET, Level::DEBUG)
            }
            DiagnosticKind::Fault => tracing::enabled!(target: DISPATCH_TARGET, Level::WARN),
        }
    }

    fn method_enter(&self, filesystem: &str, method: &str, arguments: Option<&str>) {
        match arguments {
            Some(arguments) => tracing::debug!(
                target: DISPATCH_TARGET,
                component = Component::DISPATCH,
                fs = filesystem,
                "Entering method '{}' with params ({})",
                method,
                arguments
            ),
            None => tracing::debug!(
                target: DISPATCH_TARGET,
                component = Component::DISPATCH,
                fs = filesystem,
                "Entering method '{}'",
                method
            ),
        }
    }

    fn method_exit(&self, filesystem: &str, method: &str, result: Option<&str>) {
        match result {
            Some(result) => tracing::debug!(
                target: DISPATCH_TARGET,
                component = Component::DISPATCH,
                fs = filesystem,
                "Exiting method '{}'. Result = {}",
                method,
                result
            ),
            None => tracing::debug!(
                target: DISPATCH_TARGET,
                component = Component::DISPATCH,
                fs = filesystem,
                "Exiting method '{}'",
                method
            ),
        }
    }

    fn method_fault(&self, filesystem: &str, method: &str, fault: &Fault) {
        tracing::warn!(
            target: DISPATCH_TARGET,
            component = Component::DISPATCH,
            fs = filesystem,
            "Method '{}' failed: {}",
            method,
            fault
        );
    }
}

/// Sink that is never enabled
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn enabled(&self, _kind: DiagnosticKind) -> bool {
        false
    }

    fn method_enter(&self, _filesystem: &str, _method: &str, _arguments: Option<&str>) {}

    fn method_exit(&self, _filesystem: &str, _method: &str, _result: Option<&str>) {}

    fn method_fault(&self, _filesystem: &str, _method: &str, _fault: &Fault) {}
}

/// Operation results as they appear in exit diagnostics.
/// `None` means there is nothing worth reporting.
pub trait Reportable {
    fn report(&self) -> Option<String>;
}

impl Reportable for c_int {
    fn report(&self) -> Option<String> {
        Some(self.to_string())
    }
}

impl Reportable for () {
    fn report(&self) -> Option<String> {
        None
    }
}

impl Reportable for Option<String> {
    fn report(&self) -> Option<String> {
        self.as_ref().map(|name| format!("{name:?}"))
    }
}

impl Reportable for Option<Vec<String>> {
    fn report(&self) -> Option<String> {
        self.as_ref().map(|options| format!("{options:?}"))
    }
}

/// Renders as `<Name>` in place of a value that should not be formatted
#[derive(Clone, Copy)]
pub struct Opaque(pub &'static str);

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

/// Renders a byte buffer by its length
#[derive(Clone, Copy)]
pub struct ByteCount(pub usize);

impl fmt::Debug for ByteCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} bytes]", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Render arguments into entry diagnostics at all
    pub arguments: bool,
    /// Per-argument limit in characters, 0 for none
    pub max_len: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions::from(&TraceConfig::default())
    }
}

impl From<&TraceConfig> for RenderOptions {
    fn from(trace: &TraceConfig) -> Self {
        Self {
            arguments: trace.render_arguments,
            max_len: trace.max_argument_len,
        }
    }
}

/// Comma-separated `Debug` rendering of `args`. Never panics.
pub fn render_arguments(args: &[&dyn fmt::Debug], max_len: usize) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&render_one(*arg, max_len));
    }
    out
}

fn render_one(arg: &dyn fmt::Debug, max_len: usize) -> String {
    let rendered = contain(|| {
        let mut s = String::new();
        write!(s, "{arg:?}").map(|_| s)
    });
    match rendered {
        Ok(Ok(s)) => truncate(s, max_len),
        _ => UNRENDERABLE.to_string(),
    }
}

fn truncate(s: String, max_len: usize) -> String {
    if max_len == 0 {
        return s;
    }
    match s.char_indices().nth(max_len) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s,
    }
}
