//! Job and clip persistence.
//!
//! Every operation touches a single record. [`JsonStore`] keeps one JSON file
//! per record under `<storage>/db`; [`MemoryStore`] backs tests and one-shot
//! runs.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::{CutterError, Result};
use crate::model::{Clip, ClipStatus, Job, JobStatus, NewClip, RemoteUpload};

#[async_trait]
pub trait Store: Send + Sync {
    async fn create_job(&self, job: Job) -> Result<Job>;

    async fn get_job(&self, id: &str) -> Result<Job>;

    /// Move a job forward; backwards or out-of-terminal moves are rejected.
    async fn set_job_status(&self, id: &str, status: JobStatus, error: Option<String>) -> Result<Job>;

    async fn create_clip(&self, clip: NewClip) -> Result<Clip>;

    async fn update_clip(&self, clip: &Clip) -> Result<()>;

    async fn get_clip(&self, id: &str) -> Result<Clip>;

    /// Clips of one job ordered by index.
    async fn list_clips(&self, job_id: &str) -> Result<Vec<Clip>>;

    /// Upload write-back from the publishing integration.
    async fn mark_uploaded(&self, clip_id: &str, remote: RemoteUpload) -> Result<Clip>;
}

fn apply_status(job: &mut Job, status: JobStatus, error: Option<String>) -> Result<()> {
    if !job.status.can_transition_to(status) {
        return Err(CutterError::InvalidTransition {
            from: job.status.to_string(),
            to: status.to_string(),
        });
    }
    job.status = status;
    job.error = error;
    job.updated_at = Utc::now();
    Ok(())
}

fn apply_upload(clip: &mut Clip, remote: RemoteUpload) {
    clip.status = ClipStatus::Uploaded;
    clip.remote = Some(remote);
}

#[derive(Default)]
pub struct MemoryStore {
    jobs: RwLock<HashMap<String, Job>>,
    clips: RwLock<HashMap<String, Clip>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_job(&self, job: Job) -> Result<Job> {
        self.jobs.write().await.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: &str) -> Result<Job> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| CutterError::NotFound(format!("job {}", id)))
    }

    async fn set_job_status(&self, id: &str, status: JobStatus, error: Option<String>) -> Result<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| CutterError::NotFound(format!("job {}", id)))?;
        apply_status(job, status, error)?;
        Ok(job.clone())
    }

    async fn create_clip(&self, clip: NewClip) -> Result<Clip> {
        let clip = clip.into_clip();
        self.clips.write().await.insert(clip.id.clone(), clip.clone());
        Ok(clip)
    }

    async fn update_clip(&self, clip: &Clip) -> Result<()> {
        let mut clips = self.clips.write().await;
        if !clips.contains_key(&clip.id) {
            return Err(CutterError::NotFound(format!("clip {}", clip.id)));
        }
        clips.insert(clip.id.clone(), clip.clone());
        Ok(())
    }

    async fn get_clip(&self, id: &str) -> Result<Clip> {
        self.clips
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| CutterError::NotFound(format!("clip {}", id)))
    }

    async fn list_clips(&self, job_id: &str) -> Result<Vec<Clip>> {
        let mut clips: Vec<Clip> = self
            .clips
            .read()
            .await
            .values()
            .filter(|c| c.job_id == job_id)
            .cloned()
            .collect();
        clips.sort_by_key(|c| c.index);
        Ok(clips)
    }

    async fn mark_uploaded(&self, clip_id: &str, remote: RemoteUpload) -> Result<Clip> {
        let mut clips = self.clips.write().await;
        let clip = clips
            .get_mut(clip_id)
            .ok_or_else(|| CutterError::NotFound(format!("clip {}", clip_id)))?;
        apply_upload(clip, remote);
        Ok(clip.clone())
    }
}

/// One pretty-printed JSON document per record, replaced atomically on write.
pub struct JsonStore {
    jobs_dir: PathBuf,
    clips_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonStore {
    pub fn open<P: AsRef<Path>>(db_dir: P) -> Result<Self> {
        let jobs_dir = db_dir.as_ref().join("jobs");
        let clips_dir = db_dir.as_ref().join("clips");
        std::fs::create_dir_all(&jobs_dir)?;
        std::fs::create_dir_all(&clips_dir)?;
        Ok(Self {
            jobs_dir,
            clips_dir,
            write_lock: Mutex::new(()),
        })
    }

    fn job_path(&self, id: &str) -> PathBuf {
        self.jobs_dir.join(format!("{}.json", id))
    }

    fn clip_path(&self, id: &str) -> PathBuf {
        self.clips_dir.join(format!("{}.json", id))
    }
}

fn read_record<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CutterError::NotFound(what.to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_str(&content)?)
}

fn write_record<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| CutterError::Config(format!("no parent directory for {}", path.display())))?;
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut temp, record)?;
    temp.flush()?;
    temp.persist(path).map_err(|e| CutterError::Io(e.error))?;
    debug!("Wrote {}", path.display());
    Ok(())
}

#[async_trait]
impl Store for JsonStore {
    async fn create_job(&self, job: Job) -> Result<Job> {
        let _guard = self.write_lock.lock().await;
        write_record(&self.job_path(&job.id), &job)?;
        Ok(job)
    }

    async fn get_job(&self, id: &str) -> Result<Job> {
        read_record(&self.job_path(id), &format!("job {}", id))
    }

    async fn set_job_status(&self, id: &str, status: JobStatus, error: Option<String>) -> Result<Job> {
        let _guard = self.write_lock.lock().await;
        let path = self.job_path(id);
        let mut job: Job = read_record(&path, &format!("job {}", id))?;
        apply_status(&mut job, status, error)?;
        write_record(&path, &job)?;
        Ok(job)
    }

    async fn create_clip(&self, clip: NewClip) -> Result<Clip> {
        let clip = clip.into_clip();
        let _guard = self.write_lock.lock().await;
        write_record(&self.clip_path(&clip.id), &clip)?;
        Ok(clip)
    }

    async fn update_clip(&self, clip: &Clip) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.clip_path(&clip.id);
        if !path.exists() {
            return Err(CutterError::NotFound(format!("clip {}", clip.id)));
        }
        write_record(&path, clip)
    }

    async fn get_clip(&self, id: &str) -> Result<Clip> {
        read_record(&self.clip_path(id), &format!("clip {}", id))
    }

    async fn list_clips(&self, job_id: &str) -> Result<Vec<Clip>> {
        let mut clips = Vec::new();
        for entry in std::fs::read_dir(&self.clips_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let clip: Clip = read_record(&path, "clip")?;
            if clip.job_id == job_id {
                clips.push(clip);
            }
        }
        clips.sort_by_key(|c| c.index);
        Ok(clips)
    }

    async fn mark_uploaded(&self, clip_id: &str, remote: RemoteUpload) -> Result<Clip> {
        let _guard = self.write_lock.lock().await;
        let path = self.clip_path(clip_id);
        let mut clip: Clip = read_record(&path, &format!("clip {}", clip_id))?;
        apply_upload(&mut clip, remote);
        write_record(&path, &clip)?;
        Ok(clip)
    }
}
