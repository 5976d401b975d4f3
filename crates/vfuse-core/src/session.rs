//! Mount sessions.
//!
//! A [`SessionRegistry`] knows which mount points are live. [`SessionBuilder::open`]
//! checks the platform, claims the mount point and wraps the filesystem in a
//! [`LoggedFilesystem`] that owns the claim until `destroy`.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use vfuse_config::{log_session_debug, log_session_info, log_session_warn, TraceConfig};
use vfuse_platform::{resolved_table, Platform, PlatformError, WidthTable};

use crate::contract::Filesystem;
use crate::diagnostics::{contain, DiagnosticSink, NullSink, RenderOptions, TracingSink};
use crate::logged::LoggedFilesystem;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("mount point {} is already in use", .0.display())]
    AlreadyMounted(PathBuf),

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

pub type Result<T> = std::result::Result<T, SessionError>;

type ReleaseHook = Box<dyn FnOnce(&Path) + Send>;

/// Live sessions keyed by mount point. Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<PathBuf, String>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `mount_point` for the filesystem called `label`.
    pub fn register(
        &self,
        mount_point: impl Into<PathBuf>,
        label: impl Into<String>,
    ) -> Result<SessionGuard> {
        let mount_point = mount_point.into();
        let label = label.into();
        {
            let mut sessions = self.lock();
            if sessions.contains_key(&mount_point) {
                return Err(SessionError::AlreadyMounted(mount_point));
            }
            sessions.insert(mount_point.clone(), label.clone());
        }
        log_session_debug!(
            "Mount point registered",
            mount_point = tracing::field::display(mount_point.display()),
            fs = label.as_str(),
        );
        Ok(SessionGuard {
            registry: self.clone(),
            mount_point,
            on_release: None,
        })
    }

    pub fn is_mounted(&self, mount_point: &Path) -> bool {
        self.lock().contains_key(mount_point)
    }

    /// Label of the filesystem mounted at `mount_point`
    pub fn label_of(&self, mount_point: &Path) -> Option<String> {
        self.lock().get(mount_point).cloned()
    }

    pub fn mounted(&self) -> Vec<PathBuf> {
        let mut mounts: Vec<_> = self.lock().keys().cloned().collect();
        mounts.sort();
        mounts
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, String>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A claimed mount point. Dropping it unregisters the mount point and runs the release
/// hook, once.
pub struct SessionGuard {
    registry: SessionRegistry,
    mount_point: PathBuf,
    on_release: Option<ReleaseHook>,
}

impl SessionGuard {
    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    pub fn on_release(mut self, hook: impl FnOnce(&Path) + Send + 'static) -> Self {
        self.on_release = Some(Box::new(hook));
        self
    }

    fn with_hook(mut self, hook: Option<ReleaseHook>) -> Self {
        self.on_release = hook;
        self
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.mount_point);
        log_session_info!(
            "Session released",
            mount_point = tracing::field::display(self.mount_point.display()),
        );

        if let Some(hook) = self.on_release.take() {
            let mount_point = self.mount_point.as_path();
            if let Err(fault) = contain(|| hook(mount_point)) {
                log_session_warn!(
                    "Release hook failed",
                    mount_point = tracing::field::display(mount_point.display()),
                    error = tracing::field::display(&fault),
                );
            }
        }
    }
}

impl fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGuard")
            .field("mount_point", &self.mount_point)
            .field("on_release", &self.on_release.is_some())
            .finish()
    }
}

/// Configures and opens a [`Session`].
pub struct SessionBuilder {
    inner: Arc<dyn Filesystem>,
    label: String,
    mount_point: PathBuf,
    trace: TraceConfig,
    sink: Option<Arc<dyn DiagnosticSink>>,
    on_release: Option<ReleaseHook>,
    platform: Option<Platform>,
}

impl SessionBuilder {
    /// Tracing settings come from the global config until overridden with
    /// [`SessionBuilder::trace`].
    pub fn new<F: Filesystem + 'static>(fs: F, mount_point: impl Into<PathBuf>) -> Self {
        Self::from_arc(Arc::new(fs), std::any::type_name::<F>(), mount_point)
    }

    pub fn from_arc(
        inner: Arc<dyn Filesystem>,
        label: impl Into<String>,
        mount_point: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inner,
            label: label.into(),
            mount_point: mount_point.into(),
            trace: vfuse_config::config().trace.clone(),
            sink: None,
            on_release: None,
            platform: None,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn trace(mut self, trace: TraceConfig) -> Self {
        self.trace = trace;
        self
    }

    /// Replace the default [`TracingSink`]. Ignored when tracing is disabled.
    pub fn sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Run `hook` when the session is released.
    pub fn on_release(mut self, hook: impl FnOnce(&Path) + Send + 'static) -> Self {
        self.on_release = Some(Box::new(hook));
        self
    }

    /// Check widths against `platform` instead of the running one.
    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn open(self, registry: &SessionRegistry) -> Result<Session> {
        match self.platform {
            Some(platform) => WidthTable::build(platform).ensure_complete()?,
            None => resolved_table().ensure_complete()?,
        }

        let guard = registry
            .register(&self.mount_point, &self.label)?
            .with_hook(self.on_release);

        let sink: Arc<dyn DiagnosticSink> = if self.trace.enabled {
            self.sink.unwrap_or_else(|| Arc::new(TracingSink))
        } else {
            Arc::new(NullSink)
        };

        let filesystem = Arc::new(
            LoggedFilesystem::wrap(self.inner, self.label)
                .with_sink(sink)
                .with_render_options(RenderOptions::from(&self.trace))
                .with_session(guard),
        );
        filesystem.before_mount(&self.mount_point);

        log_session_info!(
            "Session opened",
            mount_point = tracing::field::display(self.mount_point.display()),
            fs = filesystem.label(),
        );
        Ok(Session {
            mount_point: self.mount_point,
            filesystem,
        })
    }
}

/// An open session. The kernel layer drives [`Session::filesystem`].
#[derive(Debug)]
pub struct Session {
    mount_point: PathBuf,
    filesystem: Arc<LoggedFilesystem>,
}

impl Session {
    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    pub fn filesystem(&self) -> &Arc<LoggedFilesystem> {
        &self.filesystem
    }

    /// Tear down: `destroy`, which releases the mount point, then `after_unmount`.
    pub fn close(self) {
        self.filesystem.destroy();
        self.filesystem.after_unmount(&self.mount_point);
    }
}
