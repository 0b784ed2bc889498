//! Highlight detection from audio activity and scene cuts.
//!
//! A window's score is the number of seconds of audio activity it covers plus
//! a down-weighted count of the scene cuts inside it. Candidate windows start
//! at zero and at every scene cut; the best non-overlapping ones are kept.

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::HighlightConfig;
use crate::error::Result;
use crate::media::MediaProcessorTrait;
use crate::model::{HighlightWindow, MIN_CLIP_LENGTH_SECS, MIN_SEGMENT_SECS};

pub struct HighlightDetector {
    media: Arc<dyn MediaProcessorTrait>,
    settings: HighlightConfig,
}

impl HighlightDetector {
    pub fn new(media: Arc<dyn MediaProcessorTrait>, settings: HighlightConfig) -> Self {
        Self { media, settings }
    }

    /// Up to `max_clips` windows sorted by start. Empty when the duration
    /// cannot be probed or is under one second. A failed or stalled analysis
    /// pass is an error.
    pub async fn detect(
        &self,
        path: &Path,
        clip_length: f64,
        max_clips: usize,
    ) -> Result<Vec<HighlightWindow>> {
        let window_len = clip_length.max(MIN_CLIP_LENGTH_SECS);
        let max_clips = max_clips.max(1);

        let duration = match self.media.probe_duration(path).await {
            Ok(d) if d >= 1.0 => d,
            Ok(d) => {
                info!("Duration {:.3}s too short for highlight detection", d);
                return Ok(Vec::new());
            }
            Err(e) => {
                warn!("Skipping highlight detection: {}", e);
                return Ok(Vec::new());
            }
        };

        let (scenes, silences) = tokio::join!(
            self.media.detect_scenes(path, self.settings.scene_threshold),
            self.media.detect_silence(
                path,
                self.settings.silence_noise_db,
                self.settings.silence_min_secs,
                duration
            ),
        );
        let scenes = scenes?;
        let silences = silences?;

        let activity = activity_intervals(&silences, duration);
        let candidates: Vec<HighlightWindow> = candidate_starts(&scenes, duration, window_len)
            .into_iter()
            .map(|start| {
                let end = duration.min(start + window_len);
                HighlightWindow {
                    start,
                    duration: end - start,
                    score: window_score(start, end, &activity, &scenes, self.settings.scene_weight),
                }
            })
            .collect();
        debug!(
            "{} candidate windows from {} scene cuts and {} silences",
            candidates.len(),
            scenes.len(),
            silences.len()
        );

        let picked = select_windows(candidates, max_clips);
        if picked.is_empty() {
            info!("No highlight candidates, using an even grid");
            return Ok(uniform_windows(duration, window_len, max_clips));
        }
        Ok(picked)
    }
}

/// Complement of `silences` over `[0, duration]`.
pub fn activity_intervals(silences: &[(f64, f64)], duration: f64) -> Vec<(f64, f64)> {
    let mut sorted: Vec<(f64, f64)> = silences.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut activity = Vec::new();
    let mut cursor = 0.0_f64;
    for (start, end) in sorted {
        let start = start.max(0.0);
        let end = end.min(duration);
        if start > cursor {
            activity.push((cursor, start.min(duration)));
        }
        cursor = cursor.max(end);
    }
    if cursor < duration {
        activity.push((cursor, duration));
    }
    activity
}

/// Zero plus each scene cut, keeping starts with `start < duration - window_len + 0.5`.
pub fn candidate_starts(scenes: &[f64], duration: f64, window_len: f64) -> Vec<f64> {
    let limit = duration - window_len + MIN_SEGMENT_SECS;
    let mut starts: Vec<f64> = std::iter::once(0.0)
        .chain(scenes.iter().copied())
        .filter(|s| *s >= 0.0 && *s < limit)
        .collect();
    starts.sort_by(f64::total_cmp);
    starts.dedup_by(|a, b| (*a - *b).abs() < 1e-6);
    starts
}

/// Active seconds inside `[start, end)` plus `scene_weight` per scene cut inside it.
pub fn window_score(
    start: f64,
    end: f64,
    activity: &[(f64, f64)],
    scenes: &[f64],
    scene_weight: f64,
) -> f64 {
    let active: f64 = activity
        .iter()
        .map(|(a, b)| (end.min(*b) - start.max(*a)).max(0.0))
        .sum();
    let cuts = scenes.iter().filter(|t| **t >= start && **t < end).count();
    active + scene_weight * cuts as f64
}

/// Greedy pick by descending score (earlier start on ties), rejecting overlaps.
pub fn select_windows(mut candidates: Vec<HighlightWindow>, max_clips: usize) -> Vec<HighlightWindow> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.start.total_cmp(&b.start)));

    let mut picked: Vec<HighlightWindow> = Vec::new();
    for window in candidates {
        if picked.len() >= max_clips {
            break;
        }
        if picked.iter().any(|p| p.overlaps(&window)) {
            continue;
        }
        picked.push(window);
    }
    picked.sort_by(|a, b| a.start.total_cmp(&b.start));
    picked
}

/// `min(max_clips, floor(duration / window_len))` back-to-back windows with score zero.
pub fn uniform_windows(duration: f64, window_len: f64, max_clips: usize) -> Vec<HighlightWindow> {
    let count = ((duration / window_len).floor() as usize).min(max_clips);
    (0..count)
        .map(|i| i as f64 * window_len)
        .take_while(|start| *start <= duration - MIN_SEGMENT_SECS)
        .map(|start| HighlightWindow {
            start,
            duration: window_len.min(duration - start),
            score: 0.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::CutterError;
    use crate::media::MockMediaProcessorTrait;

    fn detector(media: MockMediaProcessorTrait) -> HighlightDetector {
        HighlightDetector::new(Arc::new(media), Config::default().highlight)
    }

    #[test]
    fn activity_is_complement_of_silence() {
        let activity = activity_intervals(&[(2.0, 4.0), (10.0, 11.0)], 20.0);
        assert_eq!(activity, vec![(0.0, 2.0), (4.0, 10.0), (11.0, 20.0)]);
    }

    #[test]
    fn leading_and_trailing_silence_leave_no_edges() {
        let activity = activity_intervals(&[(0.0, 3.0), (15.0, 20.0)], 20.0);
        assert_eq!(activity, vec![(3.0, 15.0)]);
        assert!(activity_intervals(&[(0.0, 20.0)], 20.0).is_empty());
    }

    #[test]
    fn candidate_boundary_keeps_start_just_inside_limit() {
        // limit = 20 - 8 + 0.5 = 12.5
        assert_eq!(candidate_starts(&[0.0, 5.0, 12.0], 20.0, 8.0), vec![0.0, 5.0, 12.0]);
        assert_eq!(candidate_starts(&[0.0, 5.0, 12.5, 13.0], 20.0, 8.0), vec![0.0, 5.0]);
    }

    #[test]
    fn scoring_counts_activity_and_weighted_cuts() {
        let activity = vec![(0.0, 2.0), (4.0, 10.0), (11.0, 20.0)];
        let scenes = vec![0.0, 5.0, 12.0];
        // [0, 8): 2 + 4 active seconds, cuts at 0 and 5
        assert_eq!(window_score(0.0, 8.0, &activity, &scenes, 0.75), 7.5);
        // [12, 20): 8 active seconds, cut at 12
        assert_eq!(window_score(12.0, 20.0, &activity, &scenes, 0.75), 8.75);
    }

    #[test]
    fn selection_rejects_overlaps_and_sorts_by_start() {
        let w = |start: f64, score: f64| HighlightWindow { start, duration: 8.0, score };

        let picked = select_windows(vec![w(0.0, 7.5), w(5.0, 9.0), w(12.0, 8.75)], 2);
        assert_eq!(picked, vec![w(5.0, 9.0)]);

        let picked = select_windows(vec![w(0.0, 1.0), w(10.0, 2.0), w(20.0, 3.0)], 2);
        assert_eq!(picked, vec![w(10.0, 2.0), w(20.0, 3.0)]);
        assert!(!picked[0].overlaps(&picked[1]));
    }

    #[test]
    fn uniform_grid_is_bounded_by_max_clips() {
        let windows = uniform_windows(65.0, 30.0, 5);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].start, 30.0);
        assert_eq!(uniform_windows(65.0, 10.0, 3).len(), 3);
        assert!(uniform_windows(4.0, 5.0, 3).is_empty());
    }

    #[tokio::test]
    async fn detect_picks_scored_windows() {
        let mut media = MockMediaProcessorTrait::new();
        media.expect_probe_duration().returning(|_| Ok(20.0));
        media
            .expect_detect_scenes()
            .returning(|_, _| Ok(vec![0.0, 5.0, 12.0]));
        media
            .expect_detect_silence()
            .returning(|_, _, _, _| Ok(vec![(2.0, 4.0), (10.0, 11.0)]));

        let windows = detector(media)
            .detect(Path::new("in.mp4"), 8.0, 2)
            .await
            .unwrap();

        // 12 -> 8.75 wins, 5 -> 8.5 overlaps it, 0 -> 7.5 fits
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].start, 0.0);
        assert_eq!(windows[1].start, 12.0);
        assert!(windows.iter().all(|w| w.end() <= 20.0));
    }

    #[tokio::test]
    async fn short_or_unprobeable_files_yield_nothing() {
        let mut media = MockMediaProcessorTrait::new();
        media.expect_probe_duration().returning(|_| Ok(0.4));
        media.expect_detect_scenes().times(0);
        assert!(detector(media).detect(Path::new("a.mp4"), 30.0, 5).await.unwrap().is_empty());

        let mut media = MockMediaProcessorTrait::new();
        media
            .expect_probe_duration()
            .returning(|_| Err(CutterError::ProbeFailure("bad".to_string())));
        assert!(detector(media).detect(Path::new("a.mp4"), 30.0, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stalled_analysis_is_an_error() {
        let mut media = MockMediaProcessorTrait::new();
        media.expect_probe_duration().returning(|_| Ok(40.0));
        media.expect_detect_scenes().returning(|_, _| {
            Err(CutterError::Stall {
                tool: "ffmpeg".to_string(),
                idle_secs: 180,
            })
        });
        media
            .expect_detect_silence()
            .returning(|_, _, _, _| Ok(Vec::new()));

        let err = detector(media)
            .detect(Path::new("in.mp4"), 10.0, 3)
            .await
            .unwrap_err();
        assert!(err.is_stall());
    }
}
