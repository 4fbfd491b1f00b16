use std::fmt;
use std::task::{Context, Poll};

use tokio::signal::unix::{Signal, SignalKind};

/// A process termination request the profiler can react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde_derive::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminationSignal {
    #[serde(alias = "sigint", alias = "int")]
    Interrupt,
    #[serde(alias = "sigterm", alias = "term")]
    Terminate,
    #[serde(alias = "sigquit")]
    Quit,
    #[serde(alias = "sighup", alias = "hup")]
    Hangup,
    #[serde(alias = "sigusr1", alias = "usr1")]
    User1,
    #[serde(alias = "sigusr2", alias = "usr2")]
    User2,
}

impl TerminationSignal {
    /// The signals bound when none are configured.
    pub const DEFAULTS: [TerminationSignal; 3] = [Self::Interrupt, Self::Terminate, Self::Quit];

    pub fn kind(self) -> SignalKind {
        match self {
            Self::Interrupt => SignalKind::interrupt(),
            Self::Terminate => SignalKind::terminate(),
            Self::Quit => SignalKind::quit(),
            Self::Hangup => SignalKind::hangup(),
            Self::User1 => SignalKind::user_defined1(),
            Self::User2 => SignalKind::user_defined2(),
        }
    }
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Quit => "SIGQUIT",
            Self::Hangup => "SIGHUP",
            Self::User1 => "SIGUSR1",
            Self::User2 => "SIGUSR2",
        };

        f.write_str(name)
    }
}

/// Listens to several termination signals at once.
///
/// The signal handlers are registered when the listener is created, so a
/// signal delivered after [`SignalListener::new`] returns is never lost, even
/// if nobody is awaiting [`SignalListener::recv`] yet. Dropping the listener
/// cancels the subscriptions.
#[derive(Debug)]
#[must_use = "signal listeners must be awaited to observe signals"]
pub struct SignalListener {
    signals: Vec<(TerminationSignal, Signal)>,
}

impl SignalListener {
    /// Register a handler for every signal in `signals`.
    ///
    /// Duplicates are only registered once.
    pub fn new(signals: impl IntoIterator<Item = TerminationSignal>) -> std::io::Result<Self> {
        let mut listener = Self { signals: Vec::new() };

        for signal in signals {
            if listener.signals.iter().any(|(s, _)| *s == signal) {
                continue;
            }

            let handle = tokio::signal::unix::signal(signal.kind())?;
            listener.signals.push((signal, handle));
        }

        Ok(listener)
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn signals(&self) -> impl Iterator<Item = TerminationSignal> + '_ {
        self.signals.iter().map(|(s, _)| *s)
    }

    /// Wait for the next signal. Never completes if the listener is empty.
    pub async fn recv(&mut self) -> TerminationSignal {
        std::future::poll_fn(|cx| self.poll_recv(cx)).await
    }

    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<TerminationSignal> {
        for (signal, handle) in self.signals.iter_mut() {
            if handle.poll_recv(cx).is_ready() {
                return Poll::Ready(*signal);
            }
        }

        Poll::Pending
    }
}
