use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::backend::{Backend, Capture, PprofBackend};
use crate::hook::ShutdownHook;
use crate::report::{ReportArtifact, ReportRenderer};
use crate::snapshot::{SnapshotArtifact, SnapshotWriter};
use crate::{CpuProfError, ProfilerConfig};

/// The files written by one [`ProfilingSession::stop`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileArtifacts {
    pub snapshot: SnapshotArtifact,
    /// Only set if [`ProfilerConfig::generate_html`] is enabled.
    pub report: Option<ReportArtifact>,
}

/// A CPU profiling session of the running process.
///
/// The session is either idle or running. Starting a running session and
/// stopping an idle one are no-ops, which makes it safe to call
/// [`stop`](Self::stop) from both the application and a signal hook.
///
/// The profiler is a process wide resource, do not run two sessions at the
/// same time. The pprof backend refuses to start a second capture while one
/// is running.
pub struct ProfilingSession<B: Backend = PprofBackend> {
    backend: B,
    config: ProfilerConfig,
    capture: Mutex<Option<B::Capture>>,
}

impl ProfilingSession {
    /// Create an idle session sampling the process with pprof.
    pub fn new(config: ProfilerConfig) -> Self {
        Self::with_backend(PprofBackend::from_config(&config), config)
    }
}

impl<B: Backend> ProfilingSession<B> {
    pub fn with_backend(backend: B, config: ProfilerConfig) -> Self {
        Self {
            backend,
            config,
            capture: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    /// Share the session and, if [`ProfilerConfig::auto_hooks`] is enabled,
    /// bind the configured termination signals to it.
    ///
    /// Must be called from within a tokio runtime when hooks are enabled.
    pub fn install(self) -> Result<Arc<Self>, CpuProfError> {
        let hook = ShutdownHook::from_config(&self.config);
        self.install_with(hook)
    }

    /// Like [`install`](Self::install), binding `hook` instead of the hook
    /// built from the config.
    pub fn install_with(self, hook: ShutdownHook) -> Result<Arc<Self>, CpuProfError> {
        let session = Arc::new(self);

        if session.config.auto_hooks {
            hook.install(session.clone())?;
        }

        Ok(session)
    }

    /// Hold the session state, blocking every start and stop until released.
    #[cfg(test)]
    pub(crate) async fn lock(&self) -> tokio::sync::MutexGuard<'_, Option<B::Capture>> {
        self.capture.lock().await
    }

    pub async fn is_running(&self) -> bool {
        self.capture.lock().await.is_some()
    }

    /// Start capturing.
    ///
    /// Does nothing if a capture is already running.
    pub async fn start(&self) -> Result<(), CpuProfError> {
        let mut capture = self.capture.lock().await;
        if capture.is_some() {
            tracing::debug!("cpu profiler is already running");
            return Ok(());
        }

        *capture = Some(self.backend.begin()?);

        tracing::info!(frequency = self.config.frequency, "cpu profiler started");

        Ok(())
    }

    /// Stop capturing and write the profile out.
    ///
    /// Returns `None` if no capture was running. The snapshot is always
    /// written before the report is rendered, so a report error means the
    /// snapshot is already on disk. Once the capture has stopped the session
    /// is idle, even if writing the artifacts fails.
    pub async fn stop(&self) -> Result<Option<ProfileArtifacts>, CpuProfError> {
        let mut state = self.capture.lock().await;

        let Some(mut capture) = state.take() else {
            tracing::debug!("cpu profiler is not running");
            return Ok(None);
        };

        let snapshot = match capture.stop() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                *state = Some(capture);
                return Err(err);
            }
        };

        let snapshot_artifact = SnapshotWriter::new(&self.config.output, &self.config.filename)
            .write(&snapshot)
            .await?;

        let report = if self.config.generate_html {
            Some(ReportRenderer::new(&self.config.output).render(&snapshot, &snapshot_artifact).await?)
        } else {
            None
        };

        drop(capture);

        tracing::info!(
            snapshot = %snapshot_artifact.path.display(),
            report = ?report.as_ref().map(|r| r.path.display().to_string()),
            "cpu profiler stopped"
        );

        Ok(Some(ProfileArtifacts {
            snapshot: snapshot_artifact,
            report,
        }))
    }

    /// Capture a profile for the given duration.
    ///
    /// If a capture is already running it is extended until `duration` has
    /// elapsed and then stopped.
    pub async fn capture_for(&self, duration: Duration) -> Result<Option<ProfileArtifacts>, CpuProfError> {
        self.start().await?;
        tokio::time::sleep(duration).await;
        self.stop().await
    }
}

impl<B: Backend + std::fmt::Debug> std::fmt::Debug for ProfilingSession<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfilingSession")
            .field("backend", &self.backend)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
