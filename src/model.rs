//! Job and clip records shared by the pipeline stages and the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Segments shorter than this are never persisted.
pub const MIN_SEGMENT_SECS: f64 = 0.5;

/// Shortest clip length accepted from callers.
pub const MIN_CLIP_LENGTH_SECS: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Done,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }

    /// Status only moves forward: pending -> processing -> done | error.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Done)
                | (JobStatus::Processing, JobStatus::Error)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub source_url: String,
    pub status: JobStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new<S: Into<String>>(source_url: S) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            source_url: source_url.into(),
            status: JobStatus::Processing,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipStatus {
    Ready,
    Uploaded,
    Error,
}

/// Identifier and publish time assigned by the video platform after upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteUpload {
    pub id: String,
    pub published_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clip {
    pub id: String,
    pub job_id: String,
    pub index: usize,
    pub start_sec: f64,
    pub duration_sec: f64,
    pub score: Option<f64>,
    pub file_path: PathBuf,
    pub thumb_path: PathBuf,
    pub title: String,
    pub description: String,
    pub hashtags: Vec<String>,
    pub status: ClipStatus,
    pub remote: Option<RemoteUpload>,
    pub created_at: DateTime<Utc>,
}

/// Fields provided by segmentation when a clip is first persisted.
#[derive(Debug, Clone)]
pub struct NewClip {
    pub job_id: String,
    pub index: usize,
    pub start_sec: f64,
    pub duration_sec: f64,
    pub score: Option<f64>,
    pub file_path: PathBuf,
    pub thumb_path: PathBuf,
}

impl NewClip {
    pub fn into_clip(self) -> Clip {
        let ordinal = self.index + 1;
        Clip {
            id: uuid::Uuid::new_v4().simple().to_string(),
            job_id: self.job_id,
            index: self.index,
            start_sec: self.start_sec,
            duration_sec: self.duration_sec,
            score: self.score,
            file_path: self.file_path,
            thumb_path: self.thumb_path,
            title: format!("Clip {}", ordinal),
            description: format!("Auto-generated clip {}", ordinal),
            hashtags: vec!["#Shorts".to_string(), "#stream".to_string()],
            status: ClipStatus::Ready,
            remote: None,
            created_at: Utc::now(),
        }
    }
}

/// A scored candidate interval; lives only between detection and segmentation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HighlightWindow {
    pub start: f64,
    pub duration: f64,
    pub score: f64,
}

impl HighlightWindow {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Half-open interval overlap.
    pub fn overlaps(&self, other: &HighlightWindow) -> bool {
        !(self.end() <= other.start || other.end() <= self.start)
    }
}

/// Work item handed to the dispatcher; also the queue payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub job_id: String,
    pub source_url: String,
    pub clip_length_sec: f64,
}
