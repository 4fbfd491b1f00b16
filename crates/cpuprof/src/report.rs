use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use pprof::protos::Profile;

use crate::{CpuProfError, Snapshot, SnapshotArtifact};

/// Subdirectory of the output directory reports are written to.
pub const REPORT_DIR: &str = "html";

const TEMPLATE_NAME: &str = "report.html";

const TEMPLATE: &str = include_str!("report.html");

/// A report written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportArtifact {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// File name, `<stem>.html`.
    pub name: String,
    /// Relative path from the report to its snapshot.
    pub profile_src: String,
}

/// Renders HTML flamegraph reports for written snapshots.
#[derive(Debug, Clone)]
pub struct ReportRenderer {
    output: PathBuf,
}

impl ReportRenderer {
    /// `output` is the directory the snapshots are written to.
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self { output: output.into() }
    }

    pub fn dir(&self) -> PathBuf {
        self.output.join(REPORT_DIR)
    }

    /// Render `snapshot` into `<output>/html/<stem>.html`.
    ///
    /// The report is titled after the snapshot stem and links to the
    /// snapshot file through `../<snapshot name>`.
    pub async fn render(&self, snapshot: &Snapshot, artifact: &SnapshotArtifact) -> Result<ReportArtifact, CpuProfError> {
        let lines = fold_stacks(snapshot.profile());
        let flamegraph = if lines.is_empty() {
            tracing::warn!(snapshot = %artifact.name, "cpu profile has no samples, writing an empty report");
            None
        } else {
            Some(render_flamegraph(&lines, &artifact.stem)?)
        };

        let profile_src = format!("../{}", artifact.name);
        let html = render_page(&artifact.stem, &profile_src, flamegraph.as_deref().map(svg_element))?;

        let dir = self.dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|err| CpuProfError::io(&dir, err))?;

        let name = format!("{}.html", artifact.stem);
        let path = std::path::absolute(dir.join(&name)).map_err(|err| CpuProfError::io(&dir, err))?;
        tokio::fs::write(&path, html).await.map_err(|err| CpuProfError::io(&path, err))?;

        tracing::debug!(path = %path.display(), "wrote cpu profile report");

        Ok(ReportArtifact { path, name, profile_src })
    }
}

/// Render the report page. Without a flamegraph the page states that no
/// samples were collected.
fn render_page(title: &str, profile_src: &str, flamegraph: Option<&str>) -> Result<String, CpuProfError> {
    // The `.html` name enables html auto escaping.
    let mut env = minijinja::Environment::new();
    env.add_template(TEMPLATE_NAME, TEMPLATE).map_err(CpuProfError::report)?;

    env.get_template(TEMPLATE_NAME)
        .and_then(|template| {
            template.render(minijinja::context! {
                title => title,
                profile_src => profile_src,
                flamegraph => flamegraph,
            })
        })
        .map_err(CpuProfError::report)
}

/// Strip the XML prolog so the svg can be inlined into the page.
fn svg_element(svg: &str) -> &str {
    svg.find("<svg").map_or(svg, |start| &svg[start..])
}

fn render_flamegraph(lines: &[String], title: &str) -> Result<String, CpuProfError> {
    let mut options = pprof::flamegraph::Options::default();
    options.title = title.to_owned();

    let mut svg = Vec::new();
    pprof::flamegraph::from_lines(&mut options, lines.iter().map(String::as_str), &mut svg).map_err(CpuProfError::report)?;

    String::from_utf8(svg).map_err(CpuProfError::report)
}

/// Fold the samples of `profile` into `root;...;leaf count` lines.
///
/// Identical stacks are merged, samples without a positive count or without
/// any resolvable frame are skipped. Inlined frames are expanded in place.
pub fn fold_stacks(profile: &Profile) -> Vec<String> {
    let string = |idx: i64| {
        usize::try_from(idx)
            .ok()
            .and_then(|idx| profile.string_table.get(idx))
            .map_or("", String::as_str)
    };

    let functions: HashMap<u64, &str> = profile.function.iter().map(|f| (f.id, string(f.name))).collect();
    let locations: HashMap<u64, _> = profile.location.iter().map(|l| (l.id, l)).collect();

    let mut folded = BTreeMap::<String, i64>::new();

    for sample in &profile.sample {
        let count = sample.value.first().copied().unwrap_or_default();
        if count <= 0 {
            continue;
        }

        // Locations are stored leaf first, and within a location the caller
        // comes last.
        let frames: Vec<&str> = sample
            .location_id
            .iter()
            .rev()
            .filter_map(|id| locations.get(id))
            .flat_map(|location| location.line.iter().rev())
            .filter_map(|line| functions.get(&line.function_id).copied())
            .filter(|name| !name.is_empty())
            .collect();

        if frames.is_empty() {
            continue;
        }

        *folded.entry(frames.join(";")).or_default() += count;
    }

    folded.into_iter().map(|(stack, count)| format!("{stack} {count}")).collect()
}

#[cfg(test)]
#[cfg_attr(all(coverage_nightly, test), coverage(off))]
mod tests {
    use pprof::protos::{Line, Location, Sample};

    use super::*;
    use crate::testing::{escaped, sample_profile};
    use crate::SnapshotWriter;

    #[test]
    fn fold() {
        assert_eq!(fold_stacks(&sample_profile()), vec!["main;idle 1", "main;work;hash 3"]);
    }

    #[test]
    fn fold_merges_and_skips() {
        let mut profile = sample_profile();
        profile.sample.push(Sample {
            location_id: vec![3, 2, 1],
            value: vec![2],
            ..Default::default()
        });
        profile.sample.push(Sample {
            location_id: vec![4, 1],
            value: vec![0],
            ..Default::default()
        });
        profile.sample.push(Sample {
            location_id: vec![99],
            value: vec![5],
            ..Default::default()
        });

        assert_eq!(fold_stacks(&profile), vec!["main;idle 1", "main;work;hash 5"]);
    }

    #[test]
    fn fold_inlined() {
        let mut profile = sample_profile();
        // `hash` inlined into `work` at a single address.
        profile.location.push(Location {
            id: 5,
            line: vec![
                Line {
                    function_id: 3,
                    ..Default::default()
                },
                Line {
                    function_id: 2,
                    ..Default::default()
                },
            ],
            ..Default::default()
        });
        profile.sample = vec![Sample {
            location_id: vec![5, 1],
            value: vec![7],
            ..Default::default()
        }];

        assert_eq!(fold_stacks(&profile), vec!["main;work;hash 7"]);
    }

    #[test]
    fn page() {
        let html = render_page("cpu-profile-1", "../cpu-profile-1.cpuprofile", Some("<svg></svg>")).unwrap();

        assert!(html.contains("<title>cpu-profile-1</title>"));
        assert!(html.contains("<h1>cpu-profile-1</h1>"));
        assert!(html.contains(&format!("href=\"{}\"", escaped("../cpu-profile-1.cpuprofile"))));
        assert!(html.contains("<main>\n<svg></svg>\n</main>"));
        assert!(!html.contains("No samples"));
    }

    #[test]
    fn page_escapes() {
        let html = render_page("<a&b>", "../\"a\".cpuprofile", None).unwrap();

        assert!(html.contains("<title>&lt;a&amp;b&gt;</title>"));
        assert!(!html.contains("<a&b>"));
        assert!(!html.contains("\"a\""));
        assert!(html.contains(&format!("data-profile-src=\"{}\"", escaped("../\"a\".cpuprofile"))));
    }

    #[tokio::test]
    async fn render() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = Snapshot::new(sample_profile());
        let artifact = SnapshotWriter::new(dir.path(), "load-test")
            .write_at(&snapshot, 1234)
            .await
            .unwrap();

        let report = ReportRenderer::new(dir.path()).render(&snapshot, &artifact).await.unwrap();

        assert_eq!(report.name, "load-test-1234.html");
        assert_eq!(report.path, dir.path().join("html").join("load-test-1234.html"));
        assert_eq!(report.profile_src, "../load-test-1234.cpuprofile");

        let html = std::fs::read_to_string(&report.path).unwrap();
        assert!(html.contains("<title>load-test-1234</title>"));
        assert!(html.contains(&format!("href=\"{}\"", escaped(&report.profile_src))));
        assert!(html.contains("<svg"));
        assert!(!html.contains("<?xml"));

        // The link resolves to the snapshot.
        let linked = report.path.parent().unwrap().join(&report.profile_src);
        assert_eq!(std::fs::canonicalize(linked).unwrap(), std::fs::canonicalize(&artifact.path).unwrap());
    }

    #[tokio::test]
    async fn render_empty_profile() {
        let dir = tempfile::tempdir().unwrap();
        let mut profile = sample_profile();
        profile.sample.clear();
        let snapshot = Snapshot::new(profile);
        let artifact = SnapshotWriter::new(dir.path(), "idle").write_at(&snapshot, 1).await.unwrap();

        let report = ReportRenderer::new(dir.path()).render(&snapshot, &artifact).await.unwrap();

        assert_eq!(report.path, dir.path().join("html").join("idle-1.html"));
        assert_eq!(report.profile_src, "../idle-1.cpuprofile");

        let html = std::fs::read_to_string(&report.path).unwrap();
        assert!(html.contains("<title>idle-1</title>"));
        assert!(html.contains(&format!("href=\"{}\"", escaped("../idle-1.cpuprofile"))));
        assert!(html.contains("No samples were collected"));
        assert!(!html.contains("<svg"));
    }

    #[tokio::test]
    async fn render_into_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = Snapshot::new(sample_profile());
        let artifact = SnapshotWriter::new(dir.path(), "blocked").write_at(&snapshot, 1).await.unwrap();
        std::fs::write(dir.path().join(REPORT_DIR), b"").unwrap();

        let err = ReportRenderer::new(dir.path()).render(&snapshot, &artifact).await.unwrap_err();

        assert!(matches!(err, CpuProfError::Io { .. }), "{err:?}");
        assert!(artifact.path.exists());
    }
}
