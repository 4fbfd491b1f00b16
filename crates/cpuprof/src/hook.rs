use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::backend::Backend;
use crate::session::ProfilingSession;
use crate::signal::{SignalListener, TerminationSignal};
use crate::{CpuProfError, ProfilerConfig};

type ExitFn = Box<dyn FnOnce(i32) + Send + 'static>;

/// Stops a [`ProfilingSession`] and exits the process when a termination
/// signal is received.
///
/// On the first signal the session is stopped, which writes the snapshot and
/// the report if enabled, and the process exits with status `0`. The process
/// exits with status `1` instead if stopping fails or does not finish within
/// the timeout. Signals received while stopping are ignored.
pub struct ShutdownHook {
    signals: Vec<TerminationSignal>,
    timeout: Option<Duration>,
    exit: ExitFn,
}

impl std::fmt::Debug for ShutdownHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHook")
            .field("signals", &self.signals)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ShutdownHook {
    pub fn new(signals: impl IntoIterator<Item = TerminationSignal>) -> Self {
        Self {
            signals: signals.into_iter().collect(),
            timeout: None,
            exit: Box::new(|code| std::process::exit(code)),
        }
    }

    pub fn from_config(config: &ProfilerConfig) -> Self {
        Self::new(config.signals.iter().copied()).with_timeout(config.shutdown_timeout())
    }

    /// Bound how long the session may take to stop.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace [`std::process::exit`] with `exit`.
    pub fn with_exit(mut self, exit: impl FnOnce(i32) + Send + 'static) -> Self {
        self.exit = Box::new(exit);
        self
    }

    /// Bind the signals and spawn the task waiting for them.
    ///
    /// The signal handlers are registered before this returns. Returns `None`
    /// if there are no signals to bind.
    pub fn install<B: Backend>(self, session: Arc<ProfilingSession<B>>) -> Result<Option<JoinHandle<()>>, CpuProfError> {
        let listener = SignalListener::new(self.signals).map_err(CpuProfError::Signal)?;
        if listener.is_empty() {
            return Ok(None);
        }

        tracing::debug!(signals = ?listener.signals().collect::<Vec<_>>(), "installed cpu profiler shutdown hook");

        Ok(Some(tokio::spawn(run(session, listener, self.timeout, self.exit))))
    }
}

async fn run<B: Backend>(session: Arc<ProfilingSession<B>>, mut listener: SignalListener, timeout: Option<Duration>, exit: ExitFn) {
    let signal = listener.recv().await;
    tracing::info!(%signal, "received signal, stopping cpu profiler");

    // The listener stays bound until exit so repeated signals do not
    // terminate the process mid write.
    let result = match timeout {
        Some(timeout) => tokio::time::timeout(timeout, session.stop()).await.ok(),
        None => Some(session.stop().await),
    };

    let code = match result {
        Some(Ok(_)) => 0,
        Some(Err(err)) => {
            tracing::error!(%err, "failed to write cpu profile");
            1
        }
        None => {
            tracing::error!("timed out writing cpu profile, exiting");
            1
        }
    };

    drop(listener);
    exit(code);
}
