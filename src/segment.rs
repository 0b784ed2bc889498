use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{CutterError, Result};
use crate::media::MediaProcessorTrait;
use crate::model::{Clip, HighlightWindow, MIN_CLIP_LENGTH_SECS, MIN_SEGMENT_SECS, NewClip};
use crate::store::Store;

/// One cut to perform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentPlan {
    pub index: usize,
    pub start: f64,
    pub duration: f64,
    pub score: Option<f64>,
}

/// Fixed-length tiles over `[0, duration)`; the tail tile is kept when it is
/// at least half a second long.
pub fn uniform_plan(duration: f64, clip_length: f64) -> Vec<SegmentPlan> {
    let tile = clip_length.max(MIN_CLIP_LENGTH_SECS);
    let count = (duration / tile).ceil().max(1.0) as usize;

    let mut plan = Vec::with_capacity(count);
    for i in 0..count {
        let start = i as f64 * tile;
        if start > duration - MIN_SEGMENT_SECS {
            break;
        }
        let length = tile.min(duration - start);
        if length < MIN_SEGMENT_SECS {
            continue;
        }
        plan.push(SegmentPlan {
            index: i,
            start,
            duration: length,
            score: None,
        });
    }
    plan
}

/// One plan entry per window; index is the window's position.
pub fn window_plan(windows: &[HighlightWindow]) -> Vec<SegmentPlan> {
    windows
        .iter()
        .enumerate()
        .filter(|(_, w)| w.duration >= MIN_SEGMENT_SECS)
        .map(|(index, w)| SegmentPlan {
            index,
            start: w.start,
            duration: w.duration,
            score: Some(w.score),
        })
        .collect()
}

/// Thumbnail offset inside a clip: half its length, kept within 0.5-1.0s.
pub fn thumbnail_offset(duration: f64) -> f64 {
    (duration / 2.0).clamp(0.5, 1.0)
}

pub struct Segmenter {
    media: Arc<dyn MediaProcessorTrait>,
    store: Arc<dyn Store>,
    clips_dir: PathBuf,
}

impl Segmenter {
    pub fn new(media: Arc<dyn MediaProcessorTrait>, store: Arc<dyn Store>, clips_dir: PathBuf) -> Self {
        Self {
            media,
            store,
            clips_dir,
        }
    }

    pub async fn segment_windows(
        &self,
        source: &Path,
        windows: &[HighlightWindow],
        job_id: &str,
    ) -> Result<Vec<Clip>> {
        let plan = window_plan(windows);
        if plan.len() < windows.len() {
            info!("Skipping {} window(s) shorter than {}s", windows.len() - plan.len(), MIN_SEGMENT_SECS);
        }
        self.execute(source, &plan, job_id).await
    }

    pub async fn segment_uniform(&self, source: &Path, clip_length: f64, job_id: &str) -> Result<Vec<Clip>> {
        let duration = self.media.probe_duration(source).await?;
        if duration < 1.0 {
            return Err(CutterError::ProbeFailure(
                "Input video duration is 0. Check download step or source URL.".to_string(),
            ));
        }

        let plan = uniform_plan(duration, clip_length);
        info!(
            "Cutting {:.1}s into {} uniform segment(s) of {:.1}s",
            duration,
            plan.len(),
            clip_length.max(MIN_CLIP_LENGTH_SECS)
        );
        self.execute(source, &plan, job_id).await
    }

    async fn execute(&self, source: &Path, plan: &[SegmentPlan], job_id: &str) -> Result<Vec<Clip>> {
        tokio::fs::create_dir_all(&self.clips_dir).await?;

        let mut clips = Vec::with_capacity(plan.len());
        for segment in plan {
            let base = format!("{}_{}", job_id, segment.index);
            let clip_path = self.clips_dir.join(format!("{}.mp4", base));
            let thumb_path = self.clips_dir.join(format!("{}.jpg", base));

            match self
                .media
                .cut_segment(source, segment.start, segment.duration, &clip_path)
                .await
            {
                Ok(()) => {}
                Err(CutterError::UnsupportedSeek { start, detail }) => {
                    warn!("Skipping segment {} at {:.3}s: {}", segment.index, start, detail);
                    continue;
                }
                Err(e) => return Err(e),
            }

            self.media
                .extract_thumbnail(&clip_path, thumbnail_offset(segment.duration), &thumb_path)
                .await?;

            let clip = self
                .store
                .create_clip(NewClip {
                    job_id: job_id.to_string(),
                    index: segment.index,
                    start_sec: segment.start,
                    duration_sec: segment.duration,
                    score: segment.score,
                    file_path: clip_path,
                    thumb_path,
                })
                .await?;
            clips.push(clip);
        }

        info!("Persisted {} clip(s) for job {}", clips.len(), job_id);
        Ok(clips)
    }
}
