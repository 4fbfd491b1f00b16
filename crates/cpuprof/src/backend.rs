use crate::{CpuProfError, ProfilerConfig, Snapshot};

/// The profiling capability of the process.
///
/// Starting a capture is expected to connect to, enable and start the
/// underlying profiler. The capability is process wide, only one capture may
/// be alive at a time.
pub trait Backend: Send + Sync + 'static {
    type Capture: Capture;

    fn begin(&self) -> Result<Self::Capture, CpuProfError>;
}

/// A running capture.
///
/// Dropping the capture releases the profiler.
pub trait Capture: Send + 'static {
    /// Stop sampling and return the collected profile.
    ///
    /// On error the capture must still be usable so that the caller can
    /// retry.
    fn stop(&mut self) -> Result<Snapshot, CpuProfError>;
}

/// A [`Backend`] sampling the process with [`pprof`].
#[derive(Clone)]
pub struct PprofBackend(pprof::ProfilerGuardBuilder);

impl PprofBackend {
    /// Create a new pprof backend.
    ///
    /// - `frequency` is the sampling frequency in Hz.
    /// - `blocklist` is a list of shared objects to exclude from the profile.
    pub fn new<S: AsRef<str>>(frequency: i32, blocklist: &[S]) -> Self {
        Self(
            pprof::ProfilerGuardBuilder::default()
                .frequency(frequency)
                .blocklist(blocklist),
        )
    }

    pub fn from_config(config: &ProfilerConfig) -> Self {
        Self::new(config.frequency, &config.blocklist)
    }
}

impl std::fmt::Debug for PprofBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PprofBackend").finish_non_exhaustive()
    }
}

impl Backend for PprofBackend {
    type Capture = PprofCapture;

    fn begin(&self) -> Result<Self::Capture, CpuProfError> {
        let guard = self.0.clone().build()?;
        Ok(PprofCapture(Some(guard)))
    }
}

/// A running pprof capture.
pub struct PprofCapture(Option<pprof::ProfilerGuard<'static>>);

impl Capture for PprofCapture {
    fn stop(&mut self) -> Result<Snapshot, CpuProfError> {
        let guard = self.0.as_ref().ok_or_else(|| CpuProfError::capability("capture already stopped"))?;

        let report = guard.report().build()?;
        let profile = report.pprof()?;

        // Dropping the guard stops the sampling timer.
        self.0 = None;

        Ok(Snapshot::new(profile))
    }
}
