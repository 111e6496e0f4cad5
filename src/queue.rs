//! Single-worker bounded job queue.
//!
//! One bounded mpsc channel and one consuming task. Submission never waits:
//! a full channel is reported back to the submitter as
//! [`PipelineError::QueueFull`]. Each job runs in its own task so that a panic
//! is caught at the join point, logged and discarded without stopping the
//! worker.

use std::fmt;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{PipelineError, PipelineResult};

/// Work performed by the queue's worker for each job.
#[async_trait::async_trait]
pub trait JobHandler<J>: Send + Sync + 'static {
    async fn handle(&self, job: J) -> PipelineResult<()>;
}

pub struct ProcessingQueue<J> {
    sender: RwLock<Option<mpsc::Sender<J>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    capacity: usize,
}

impl<J> ProcessingQueue<J>
where
    J: fmt::Debug + Send + 'static,
{
    /// Spawn the worker. `capacity` bounds jobs waiting behind the running one.
    pub fn start<H>(handler: Arc<H>, capacity: usize) -> Self
    where
        H: JobHandler<J>,
    {
        let (sender, mut receiver) = mpsc::channel::<J>(capacity.max(1));

        let worker = tokio::spawn(async move {
            info!("Processing queue worker started (capacity {})", capacity);
            while let Some(job) = receiver.recv().await {
                let label = format!("{:?}", job);
                debug!("Worker picked up {}", label);

                let handler = handler.clone();
                match tokio::spawn(async move { handler.handle(job).await }).await {
                    Ok(Ok(())) => debug!("Job {} finished", label),
                    Ok(Err(e)) => error!("Job {} failed: {}", label, e),
                    Err(e) if e.is_panic() => error!("Job {} panicked and was discarded", label),
                    Err(e) => error!("Job {} was cancelled: {}", label, e),
                }
            }
            info!("Processing queue worker stopped");
        });

        Self {
            sender: RwLock::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            capacity: capacity.max(1),
        }
    }

    /// Enqueue without waiting. Fails with `QueueFull` at capacity.
    pub fn submit(&self, job: J) -> PipelineResult<()> {
        let guard = self.sender.read().map_err(|_| PipelineError::QueueClosed)?;
        let sender = guard.as_ref().ok_or(PipelineError::QueueClosed)?;

        match sender.try_send(job) {
            Ok(()) => {
                debug!("Job accepted, {} pending", self.pending_in(sender));
                Ok(())
            }
            Err(TrySendError::Full(job)) => {
                warn!("Queue full ({} pending), rejecting {:?}", self.capacity, job);
                Err(PipelineError::QueueFull {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Closed(_)) => Err(PipelineError::QueueClosed),
        }
    }

    /// Jobs accepted but not yet picked up by the worker.
    pub fn pending(&self) -> usize {
        match self.sender.read() {
            Ok(guard) => guard.as_ref().map_or(0, |s| self.pending_in(s)),
            Err(_) => 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn pending_in(&self, sender: &mpsc::Sender<J>) -> usize {
        sender.max_capacity() - sender.capacity()
    }

    /// Stop accepting jobs, let the worker drain what is queued, and wait for it.
    pub async fn shutdown(&self) {
        if let Ok(mut guard) = self.sender.write() {
            guard.take();
        }
        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(e) = worker.await {
                error!("Processing queue worker ended abnormally: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::{mpsc::UnboundedSender, Semaphore};

    struct GatedHandler {
        gate: Arc<Semaphore>,
        started: UnboundedSender<u32>,
        done: Mutex<Vec<u32>>,
    }

    #[async_trait::async_trait]
    impl JobHandler<u32> for GatedHandler {
        async fn handle(&self, job: u32) -> PipelineResult<()> {
            let _ = self.started.send(job);
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| PipelineError::QueueClosed)?;
            permit.forget();
            if job == 13 {
                panic!("job 13 is cursed");
            }
            if job == 7 {
                return Err(PipelineError::Storage("disk on fire".to_string()));
            }
            self.done.lock().await.push(job);
            Ok(())
        }
    }

    fn gated() -> (Arc<GatedHandler>, Arc<Semaphore>, mpsc::UnboundedReceiver<u32>) {
        let gate = Arc::new(Semaphore::new(0));
        let (started, started_rx) = mpsc::unbounded_channel();
        let handler = Arc::new(GatedHandler {
            gate: gate.clone(),
            started,
            done: Mutex::new(Vec::new()),
        });
        (handler, gate, started_rx)
    }

    #[tokio::test]
    async fn test_rejects_when_full_and_keeps_queued_jobs() {
        let (handler, gate, mut started) = gated();
        let queue = ProcessingQueue::start(handler.clone(), 100);

        queue.submit(0).unwrap();
        assert_eq!(started.recv().await, Some(0));

        for job in 100..200 {
            queue.submit(job).unwrap();
        }
        assert_eq!(queue.pending(), 100);

        let err = queue.submit(999).unwrap_err();
        assert!(matches!(err, PipelineError::QueueFull { capacity: 100 }));
        assert_eq!(queue.pending(), 100);

        gate.add_permits(101);
        queue.shutdown().await;

        let done = handler.done.lock().await.clone();
        let expected: Vec<u32> = std::iter::once(0).chain(100..200).collect();
        assert_eq!(done, expected);
    }

    #[tokio::test]
    async fn test_failing_and_panicking_jobs_do_not_stop_worker() {
        let (handler, gate, _started) = gated();
        let queue = ProcessingQueue::start(handler.clone(), 10);

        for job in [1, 13, 7, 2] {
            queue.submit(job).unwrap();
        }
        gate.add_permits(4);
        queue.shutdown().await;

        assert_eq!(*handler.done.lock().await, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_closed() {
        let (handler, _gate, _started) = gated();
        let queue = ProcessingQueue::start(handler, 1);
        queue.shutdown().await;

        assert!(matches!(queue.submit(1), Err(PipelineError::QueueClosed)));
        assert_eq!(queue.pending(), 0);
        assert_eq!(queue.capacity(), 1);
    }
}
