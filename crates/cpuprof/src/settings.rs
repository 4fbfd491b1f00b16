use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::signal::TerminationSignal;
use crate::CpuProfError;

/// The directory artifacts are written to when none is configured.
pub const DEFAULT_OUTPUT_DIR: &str = "cpu-profiling";

/// Prefix of the environment variables read by [`ProfilerConfig::load`].
pub const ENV_PREFIX: &str = "CPUPROF";

/// Configuration of a [`ProfilingSession`](crate::ProfilingSession).
#[derive(Debug, Clone, PartialEq, serde_derive::Deserialize, smart_default::SmartDefault)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Base name of the written artifacts.
    #[default = "cpu-profile"]
    pub filename: String,
    /// Directory the snapshot is written to. Reports go into its `html`
    /// subdirectory.
    #[default(PathBuf::from(DEFAULT_OUTPUT_DIR))]
    pub output: PathBuf,
    /// Render an HTML flamegraph report next to every snapshot.
    pub generate_html: bool,
    /// Bind [`signals`](Self::signals) when the session is installed.
    #[default = true]
    pub auto_hooks: bool,
    #[default(TerminationSignal::DEFAULTS.to_vec())]
    pub signals: Vec<TerminationSignal>,
    /// Sampling frequency in Hz.
    #[default = 100]
    pub frequency: i32,
    /// Shared objects to skip while walking the stack.
    #[default(vec!["libc".into(), "libgcc".into(), "pthread".into(), "vdso".into()])]
    pub blocklist: Vec<String>,
    /// How long the signal hook waits for the profile to be written before
    /// giving up and exiting anyway.
    #[default(Some(30))]
    pub shutdown_timeout_secs: Option<u64>,
}

impl ProfilerConfig {
    /// Load the configuration from an optional file, overridden by `CPUPROF_*`
    /// environment variables.
    ///
    /// `CPUPROF_SIGNALS` and `CPUPROF_BLOCKLIST` take comma separated lists.
    pub fn load(file: Option<&Path>) -> Result<Self, CpuProfError> {
        Self::load_with_prefix(file, ENV_PREFIX)
    }

    /// Like [`load`](Self::load), reading `<env_prefix>_*` variables.
    pub fn load_with_prefix(file: Option<&Path>, env_prefix: &str) -> Result<Self, CpuProfError> {
        let mut builder = ::config::Config::builder();

        if let Some(file) = file {
            builder = builder.add_source(::config::File::from(file));
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix(env_prefix)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("signals")
                .with_list_parse_key("blocklist"),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn shutdown_timeout(&self) -> Option<Duration> {
        self.shutdown_timeout_secs.map(Duration::from_secs)
    }
}
