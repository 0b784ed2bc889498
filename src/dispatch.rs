//! Handing ingest requests to whatever runs the pipeline.
//!
//! Without a queue, each request becomes a task in a supervised
//! [`TaskGroup`]. With `queue.redis_url` set, requests are pushed onto a Redis
//! list and a [`Worker`] process pops and runs them one at a time.

use async_trait::async_trait;
use redis::AsyncCommands;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::QueueConfig;
use crate::error::Result;
use crate::model::IngestRequest;

/// Seconds a worker blocks on an empty queue before checking for shutdown.
const POP_TIMEOUT_SECS: f64 = 5.0;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Runs one ingest request to completion.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, request: IngestRequest) -> Result<()>;
}

/// In-process jobs with unbounded concurrency; the group owns every task it
/// starts and reports failures and panics when they finish.
#[derive(Default)]
pub struct TaskGroup {
    tasks: Mutex<JoinSet<()>>,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn spawn(&self, processor: Arc<dyn JobProcessor>, request: IngestRequest) {
        let mut tasks = self.tasks.lock().await;
        while let Some(finished) = tasks.try_join_next() {
            report(finished);
        }

        tasks.spawn(async move {
            let job_id = request.job_id.clone();
            if let Err(e) = processor.process(request).await {
                warn!("Job {} failed: {}", job_id, e);
            }
        });
    }

    /// Number of tasks not yet reaped.
    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Wait for every running job.
    pub async fn wait(&self) {
        let mut tasks = self.tasks.lock().await;
        while let Some(finished) = tasks.join_next().await {
            report(finished);
        }
    }
}

fn report(finished: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = finished {
        if e.is_panic() {
            error!("Job task panicked: {}", e);
        } else {
            warn!("Job task cancelled: {}", e);
        }
    }
}

/// Redis list used as a durable ingest queue.
pub struct RedisQueue {
    client: redis::Client,
    name: String,
}

impl RedisQueue {
    pub fn open(redis_url: &str, name: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn enqueue(&self, request: &IngestRequest) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(request)?;
        let depth: i64 = conn.rpush(&self.name, payload).await?;
        info!("Queued job {} on {} (depth {})", request.job_id, self.name, depth);
        Ok(())
    }

    async fn pop(&self, conn: &mut redis::aio::MultiplexedConnection) -> Result<Option<IngestRequest>> {
        let popped: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(&self.name)
            .arg(POP_TIMEOUT_SECS)
            .query_async(conn)
            .await?;

        match popped {
            Some((_, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }
}

/// Single-consumer loop over a [`RedisQueue`]; one job at a time.
pub struct Worker {
    queue: RedisQueue,
    processor: Arc<dyn JobProcessor>,
    stopping: Arc<AtomicBool>,
}

impl Worker {
    pub fn new(queue: RedisQueue, processor: Arc<dyn JobProcessor>) -> Self {
        Self {
            queue,
            processor,
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked between pops; setting it stops the worker once the
    /// current pop and job finish.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stopping.clone()
    }

    /// Consume until ctrl-c. A pop already sent to Redis is never abandoned,
    /// so a popped job is always processed before the worker exits.
    pub async fn run(&self) -> Result<()> {
        info!("Worker listening on {}", self.queue.name());
        let stopping = self.stopping.clone();
        let listener = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested, stopping after the current pop");
                stopping.store(true, Ordering::SeqCst);
            }
        });

        let mut conn: Option<redis::aio::MultiplexedConnection> = None;
        while !self.stopping.load(Ordering::SeqCst) {
            if conn.is_none() {
                match self.queue.client.get_multiplexed_async_connection().await {
                    Ok(fresh) => conn = Some(fresh),
                    Err(e) => {
                        warn!("Queue connection failed: {}", e);
                        tokio::time::sleep(RECONNECT_DELAY).await;
                        continue;
                    }
                }
            }
            let Some(active) = conn.as_mut() else {
                continue;
            };

            let popped = self.queue.pop(active).await;
            match popped {
                Ok(Some(request)) => self.handle(request).await,
                Ok(None) => {}
                Err(e) => {
                    warn!("Queue read failed: {}", e);
                    conn = None;
                }
            }
        }

        listener.abort();
        info!("Worker stopped");
        Ok(())
    }

    async fn handle(&self, request: IngestRequest) {
        let job_id = request.job_id.clone();
        info!("Processing job {} from queue", job_id);
        match self.processor.process(request).await {
            Ok(()) => info!("Job {} completed", job_id),
            Err(e) => warn!("Job {} failed: {}", job_id, e),
        }
    }
}

/// Where `ingest` sends new work.
pub enum Dispatcher {
    InProcess(TaskGroup),
    Queue(RedisQueue),
}

impl Dispatcher {
    pub fn from_config(config: &QueueConfig) -> Result<Self> {
        match &config.redis_url {
            Some(url) => Ok(Dispatcher::Queue(RedisQueue::open(url, &config.name)?)),
            None => Ok(Dispatcher::InProcess(TaskGroup::new())),
        }
    }

    pub async fn dispatch(&self, processor: Arc<dyn JobProcessor>, request: IngestRequest) -> Result<()> {
        match self {
            Dispatcher::InProcess(group) => {
                group.spawn(processor, request).await;
                Ok(())
            }
            Dispatcher::Queue(queue) => queue.enqueue(&request).await,
        }
    }

    /// Wait for in-process work; queued work belongs to the worker.
    pub async fn wait(&self) {
        if let Dispatcher::InProcess(group) = self {
            group.wait().await;
        }
    }
}
