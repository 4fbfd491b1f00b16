#![doc = include_str!("../README.md")]
#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]

use std::path::{Path, PathBuf};

mod backend;
mod hook;
mod report;
mod session;
mod settings;
mod signal;
mod snapshot;

#[cfg(test)]
mod testing;

pub use backend::{Backend, Capture, PprofBackend, PprofCapture};
pub use hook::ShutdownHook;
pub use report::{fold_stacks, ReportArtifact, ReportRenderer, REPORT_DIR};
pub use session::{ProfileArtifacts, ProfilingSession};
pub use settings::{ProfilerConfig, DEFAULT_OUTPUT_DIR, ENV_PREFIX};
pub use signal::{SignalListener, TerminationSignal};
pub use snapshot::{read_snapshot, Snapshot, SnapshotArtifact, SnapshotWriter, SNAPSHOT_EXTENSION};

#[derive(Debug, thiserror::Error)]
pub enum CpuProfError {
    /// The profiler could not be started or stopped.
    #[error("profiler: {0}")]
    Capability(Box<dyn std::error::Error + Send + Sync>),
    #[error("{}: {source}", .path.display())]
    Io { path: PathBuf, source: std::io::Error },
    /// The report page could not be rendered from the snapshot.
    #[error("report: {0}")]
    Report(Box<dyn std::error::Error + Send + Sync>),
    #[error("signal: {0}")]
    Signal(std::io::Error),
    #[error(transparent)]
    Config(#[from] ::config::ConfigError),
}

impl CpuProfError {
    pub(crate) fn capability(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Capability(err.into())
    }

    pub(crate) fn report(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Report(err.into())
    }

    pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<pprof::Error> for CpuProfError {
    fn from(err: pprof::Error) -> Self {
        Self::capability(err)
    }
}
