//! Parsing of third-party tool diagnostics.
//!
//! ffmpeg, ffprobe and yt-dlp do not publish a schema for their stderr, so
//! everything here is pattern based and pinned by tests to literal samples.
//! Stages only see the functions below; the patterns can change freely.

use regex::{Regex, RegexSet};
use std::sync::LazyLock;

static SCENE_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pts_time:\s*([0-9]+(?:\.[0-9]+)?)").expect("valid regex"));

static SILENCE_EVENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"silence_(start|end):\s*(-?[0-9]+(?:\.[0-9]+)?(?:e-?[0-9]+)?)").expect("valid regex")
});

static SEEK_FAILURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)does not contain any stream|invalid argument").expect("valid regex")
});

/// Classifies output lines as progress signals for the idle watchdog.
#[derive(Debug, Clone)]
pub struct ProgressMatcher {
    patterns: RegexSet,
}

impl Default for ProgressMatcher {
    fn default() -> Self {
        let patterns = RegexSet::new([
            // ffmpeg stats line: "frame=  240 fps= 60 ... time=00:00:08.00 ..."
            r"frame=\s*\d+",
            r"\btime=\d+:\d{2}:\d{2}",
            // ffmpeg -progress key/value output
            r"^out_time(_ms|_us)?=",
            r"^progress=(continue|end)$",
            // analysis filters
            r"pts_time:",
            r"silence_(start|end):",
            // yt-dlp
            r"^\[download\]\s+\d+(\.\d+)?%",
            r"^\[download\] Destination:",
            r"^\[(Merger|VideoConvertor|VideoRemuxer|FixupM3u8|ffmpeg)\]",
            r"^\[(hlsnative|dashsegments)\]",
            r"(?i)downloading .*fragment",
        ])
        .expect("valid progress patterns");
        Self { patterns }
    }
}

impl ProgressMatcher {
    pub fn is_progress(&self, line: &str) -> bool {
        self.patterns.is_match(line.trim())
    }
}

/// Frame timestamps emitted by `select='gt(scene,T)',showinfo`.
pub fn parse_scene_times(stderr: &str) -> Vec<f64> {
    let mut times: Vec<f64> = SCENE_TIME
        .captures_iter(stderr)
        .filter_map(|c| c[1].parse::<f64>().ok())
        .filter(|t| t.is_finite())
        .collect();
    times.sort_by(f64::total_cmp);
    times.dedup();
    times
}

/// `(start, end)` silence intervals from `silencedetect`.
///
/// Events are paired in order of appearance. A start with no matching end
/// (silence running into EOF) is closed at `duration`.
pub fn parse_silence(stderr: &str, duration: f64) -> Vec<(f64, f64)> {
    let mut intervals = Vec::new();
    let mut open: Option<f64> = None;

    for cap in SILENCE_EVENT.captures_iter(stderr) {
        let Ok(value) = cap[2].parse::<f64>() else {
            continue;
        };
        match &cap[1] {
            "start" => open = Some(value.max(0.0)),
            _ => {
                if let Some(start) = open.take() {
                    let end = value.min(duration);
                    if end > start {
                        intervals.push((start, end));
                    }
                }
            }
        }
    }

    if let Some(start) = open {
        if duration > start {
            intervals.push((start, duration));
        }
    }

    intervals
}

/// Duration printed by `ffprobe -show_entries format=duration -of default=nw=1:nk=1`.
pub fn parse_duration(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .and_then(|l| l.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
}

/// Near-end-of-stream seek failures reported by ffmpeg when cutting.
pub fn is_seek_failure(diagnostics: &str) -> bool {
    SEEK_FAILURE.is_match(diagnostics)
}
