use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::acquire::Acquirer;
use crate::config::Config;
use crate::dispatch::{Dispatcher, JobProcessor};
use crate::error::{CutterError, Result};
use crate::highlight::HighlightDetector;
use crate::media::{MediaProcessorFactory, MediaProcessorTrait};
use crate::metadata::MetadataEnricher;
use crate::model::{Clip, IngestRequest, Job, JobStatus};
use crate::segment::Segmenter;
use crate::setup::SetupManager;
use crate::store::Store;

/// The stages of one job, run strictly in order.
pub struct Pipeline {
    store: Arc<dyn Store>,
    acquirer: Acquirer,
    highlights: HighlightDetector,
    segmenter: Segmenter,
    enricher: MetadataEnricher,
    highlight_enabled: bool,
    max_clips: usize,
}

impl Pipeline {
    pub fn new(
        config: &Config,
        store: Arc<dyn Store>,
        media: Arc<dyn MediaProcessorTrait>,
        acquirer: Acquirer,
    ) -> Self {
        Self {
            acquirer,
            highlights: HighlightDetector::new(media.clone(), config.highlight.clone()),
            segmenter: Segmenter::new(media, store.clone(), config.clips_dir()),
            enricher: MetadataEnricher::new(store.clone()),
            store,
            highlight_enabled: config.highlight.enabled,
            max_clips: config.highlight.max_clips,
        }
    }

    /// Run every stage for `request` and record exactly one terminal status.
    pub async fn run(&self, request: &IngestRequest) -> Result<Vec<Clip>> {
        info!("Starting job {} for {}", request.job_id, request.source_url);

        match self.run_stages(request).await {
            Ok(clips) => {
                self.finish(&request.job_id, JobStatus::Done, None).await;
                info!("Job {} done with {} clip(s)", request.job_id, clips.len());
                Ok(clips)
            }
            Err(e) => {
                error!("Job {} failed: {}", request.job_id, e);
                self.finish(&request.job_id, JobStatus::Error, Some(e.to_string()))
                    .await;
                Err(e)
            }
        }
    }

    async fn run_stages(&self, request: &IngestRequest) -> Result<Vec<Clip>> {
        let job_id = request.job_id.as_str();

        // Step 1: Acquire
        let source = self.acquirer.acquire(&request.source_url, job_id).await?;
        info!("Acquired {}", source.display());

        // Step 2: Highlights
        let windows = if self.highlight_enabled {
            self.highlights
                .detect(&source, request.clip_length_sec, self.max_clips)
                .await?
        } else {
            Vec::new()
        };

        // Step 3: Segment
        let mut clips = if windows.is_empty() {
            info!("No highlights, segmenting uniformly");
            self.segmenter
                .segment_uniform(&source, request.clip_length_sec, job_id)
                .await?
        } else {
            info!("Segmenting {} highlight window(s)", windows.len());
            self.segmenter
                .segment_windows(&source, &windows, job_id)
                .await?
        };

        // Step 4: Metadata
        self.enricher
            .enrich(&mut clips, &request.source_url)
            .await?;

        Ok(clips)
    }

    async fn finish(&self, job_id: &str, status: JobStatus, message: Option<String>) {
        if let Err(e) = self.store.set_job_status(job_id, status, message).await {
            error!("Could not record {} for job {}: {}", status, job_id, e);
        }
    }
}

#[async_trait]
impl JobProcessor for Pipeline {
    async fn process(&self, request: IngestRequest) -> Result<()> {
        self.run(&request).await.map(|_| ())
    }
}

/// Entry point used by the CLI: creates jobs and hands them to the dispatcher.
pub struct Workflow {
    store: Arc<dyn Store>,
    media: Arc<dyn MediaProcessorTrait>,
    pipeline: Arc<Pipeline>,
    dispatcher: Dispatcher,
}

impl Workflow {
    pub fn new(config: &Config, store: Arc<dyn Store>) -> Result<Self> {
        let media = MediaProcessorFactory::create_processor(config);
        let setup = Arc::new(SetupManager::new(config)?);
        let acquirer = Acquirer::new(config, setup, media.clone())?;
        let pipeline = Arc::new(Pipeline::new(config, store.clone(), media.clone(), acquirer));
        let dispatcher = Dispatcher::from_config(&config.queue)?;

        Ok(Self::from_parts(store, media, pipeline, dispatcher))
    }

    pub fn from_parts(
        store: Arc<dyn Store>,
        media: Arc<dyn MediaProcessorTrait>,
        pipeline: Arc<Pipeline>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            store,
            media,
            pipeline,
            dispatcher,
        }
    }

    /// Verify ffmpeg/ffprobe before accepting work.
    pub async fn check_tools(&self) -> Result<()> {
        self.media.check_availability().await
    }

    /// Create a job in `processing` and start its pipeline.
    pub async fn ingest_project(&self, source_url: &str, clip_length_sec: f64) -> Result<Job> {
        let source_url = source_url.trim();
        if source_url.is_empty() {
            return Err(CutterError::stage("ingest", "source URL is empty"));
        }
        if !clip_length_sec.is_finite() || clip_length_sec <= 0.0 {
            return Err(CutterError::stage(
                "ingest",
                format!("clip length must be positive, got {}", clip_length_sec),
            ));
        }

        let job = self.store.create_job(Job::new(source_url)).await?;
        info!("Created job {} for {}", job.id, job.source_url);

        let request = IngestRequest {
            job_id: job.id.clone(),
            source_url: job.source_url.clone(),
            clip_length_sec,
        };
        if let Err(e) = self.dispatcher.dispatch(self.pipeline.clone(), request).await {
            warn!("Dispatch failed for job {}: {}", job.id, e);
            if let Err(status_err) = self
                .store
                .set_job_status(&job.id, JobStatus::Error, Some(e.to_string()))
                .await
            {
                error!("Could not record dispatch failure for {}: {}", job.id, status_err);
            }
            return Err(e);
        }

        Ok(job)
    }

    /// Wait for in-process jobs started by this workflow.
    pub async fn wait(&self) {
        self.dispatcher.wait().await;
    }

    pub fn pipeline(&self) -> Arc<Pipeline> {
        self.pipeline.clone()
    }

    pub fn store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }
}
