use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use pprof::protos::{Message, Profile};

use crate::CpuProfError;

/// Extension of the written snapshot files.
pub const SNAPSHOT_EXTENSION: &str = "cpuprofile";

/// The profile produced by one start/stop cycle.
#[derive(Debug, Clone)]
pub struct Snapshot(Profile);

impl Snapshot {
    pub fn new(profile: Profile) -> Self {
        Self(profile)
    }

    pub fn profile(&self) -> &Profile {
        &self.0
    }

    pub fn into_profile(self) -> Profile {
        self.0
    }

    /// Encode the profile as a gzip compressed pprof protobuf.
    pub fn encode(&self) -> std::io::Result<Vec<u8>> {
        let mut gz = GzEncoder::new(Vec::new(), Compression::default());
        gz.write_all(&self.0.encode_to_vec())?;
        gz.finish()
    }

    /// Decode a profile written by [`Snapshot::encode`].
    pub fn decode(bytes: &[u8]) -> std::io::Result<Self> {
        let mut buf = Vec::new();
        GzDecoder::new(bytes).read_to_end(&mut buf)?;

        let profile =
            Profile::decode(buf.as_slice()).map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;

        Ok(Self(profile))
    }
}

/// Read a snapshot back from disk.
pub async fn read_snapshot(path: impl AsRef<Path>) -> Result<Snapshot, CpuProfError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|err| CpuProfError::io(path, err))?;
    Snapshot::decode(&bytes).map_err(|err| CpuProfError::io(path, err))
}

/// A snapshot written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotArtifact {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// File name, `<stem>.cpuprofile`.
    pub name: String,
    /// `<filename>-<timestamp_ms>`, shared with the report.
    pub stem: String,
    /// Wall clock time the snapshot was written at, in milliseconds since the
    /// Unix epoch.
    pub timestamp_ms: u64,
}

/// Writes snapshots into an output directory.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    output: PathBuf,
    filename: String,
}

impl SnapshotWriter {
    pub fn new(output: impl Into<PathBuf>, filename: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            filename: filename.into(),
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Write `snapshot` as `<output>/<filename>-<now>.cpuprofile`.
    ///
    /// The output directory is created if it is missing. An existing file with
    /// the same name is overwritten.
    pub async fn write(&self, snapshot: &Snapshot) -> Result<SnapshotArtifact, CpuProfError> {
        self.write_at(snapshot, unix_millis()).await
    }

    pub(crate) async fn write_at(&self, snapshot: &Snapshot, timestamp_ms: u64) -> Result<SnapshotArtifact, CpuProfError> {
        tokio::fs::create_dir_all(&self.output)
            .await
            .map_err(|err| CpuProfError::io(&self.output, err))?;

        let stem = format!("{}-{timestamp_ms}", self.filename);
        let name = format!("{stem}.{SNAPSHOT_EXTENSION}");
        let path = std::path::absolute(self.output.join(&name)).map_err(|err| CpuProfError::io(&self.output, err))?;

        let bytes = snapshot.encode().map_err(|err| CpuProfError::io(&path, err))?;
        tokio::fs::write(&path, bytes).await.map_err(|err| CpuProfError::io(&path, err))?;

        tracing::debug!(path = %path.display(), "wrote cpu profile snapshot");

        Ok(SnapshotArtifact {
            path,
            name,
            stem,
            timestamp_ms,
        })
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
