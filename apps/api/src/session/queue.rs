//! Bounded worker pool for session runs.
//!
//! Session ids go through a bounded mpsc channel to one dispatcher task, which
//! spawns each run under a semaphore permit. At most `max_concurrent` sessions run
//! at once, so the number of simultaneous scoring calls is bounded by the pool
//! size (each session scores sequentially).
//!
//! A session is never queued twice. Enqueuing a session that is already queued or
//! running marks it for one more run after the current one, which picks up
//! targets added or resets made in the meantime.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::runner::AnalysisPipeline;

#[derive(Debug, Error)]
#[error("Analysis queue is shut down")]
pub struct QueueClosed;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// Already queued or running; another run will follow the current one.
    RerunScheduled,
}

/// `session id → rerun requested`
type Inflight = Arc<Mutex<HashMap<Uuid, bool>>>;

#[derive(Clone)]
pub struct AnalysisQueue {
    sender: mpsc::Sender<Uuid>,
    inflight: Inflight,
}

impl AnalysisQueue {
    /// Spawns the dispatcher. Must be called from within a tokio runtime.
    pub fn start(pipeline: AnalysisPipeline, max_concurrent: usize, capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<Uuid>(capacity.max(1));
        let inflight: Inflight = Arc::default();
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));

        let dispatcher_inflight = Arc::clone(&inflight);
        tokio::spawn(async move {
            while let Some(session_id) = receiver.recv().await {
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                let pipeline = pipeline.clone();
                let inflight = Arc::clone(&dispatcher_inflight);

                tokio::spawn(async move {
                    loop {
                        let outcome = pipeline.run_session(session_id).await;
                        debug!("Session {session_id} worker outcome: {outcome:?}");

                        let mut guard = inflight.lock().unwrap_or_else(|p| p.into_inner());
                        match guard.get_mut(&session_id) {
                            Some(rerun) if *rerun => {
                                *rerun = false;
                                info!("Session {session_id} changed during its run; running again");
                            }
                            _ => {
                                guard.remove(&session_id);
                                break;
                            }
                        }
                    }
                    drop(permit);
                });
            }
            info!("Analysis queue dispatcher stopped");
        });

        Self { sender, inflight }
    }

    pub async fn enqueue(&self, session_id: Uuid) -> Result<EnqueueOutcome, QueueClosed> {
        {
            let mut guard = self.inflight.lock().unwrap_or_else(|p| p.into_inner());
            if let Some(rerun) = guard.get_mut(&session_id) {
                *rerun = true;
                return Ok(EnqueueOutcome::RerunScheduled);
            }
            guard.insert(session_id, false);
        }

        if self.sender.send(session_id).await.is_err() {
            warn!("Dropping session {session_id}: analysis queue is closed");
            self.inflight
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .remove(&session_id);
            return Err(QueueClosed);
        }
        Ok(EnqueueOutcome::Queued)
    }

    /// Whether `session_id` is queued or running.
    pub fn is_active(&self, session_id: Uuid) -> bool {
        self.inflight
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains_key(&session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::chunker::Chunker;
    use crate::pipeline::embedding::HashingEmbedder;
    use crate::pipeline::index::IndexRegistry;
    use crate::pipeline::ranker::CandidateRanker;
    use crate::pipeline::scorer::{CandidateScorer, Degradation, ScoreResult};
    use crate::session::models::{NewSession, NewTarget, SessionStatus};
    use crate::session::store::{MemorySessionStore, SessionStore};
    use crate::storage::{MemoryObjectStore, ObjectStore};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Tracks the peak number of concurrent scoring calls.
    #[derive(Default)]
    struct SlowScorer {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl CandidateScorer for SlowScorer {
        async fn score(&self, _jd: &str, _summary: &str) -> ScoreResult {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            ScoreResult {
                skill_match: 50,
                project_relevance: 50,
                problem_solving: 50,
                tools: 50,
                overall_fit: 50,
                summary: "Scored.".into(),
                degradation: Degradation::None,
            }
        }
    }

    async fn setup(
        sessions: usize,
        max_concurrent: usize,
    ) -> (AnalysisQueue, Arc<MemorySessionStore>, Arc<SlowScorer>, Vec<Uuid>) {
        let store = Arc::new(MemorySessionStore::new());
        let objects = Arc::new(MemoryObjectStore::new());
        let scorer = Arc::new(SlowScorer::default());

        let mut ids = Vec::new();
        for i in 0..sessions {
            let key = format!("resumes/{i}.txt");
            objects
                .put(&key, Bytes::from(format!("Candidate {i}\nPython developer")), "text/plain")
                .await
                .unwrap();
            let session = store
                .create_session(NewSession {
                    owner: "recruiter".into(),
                    name: format!("batch {i}"),
                    job_description: "Python".into(),
                    targets: vec![NewTarget {
                        document_id: Uuid::new_v4(),
                        filename: format!("{i}.txt"),
                        media_type: "text/plain".into(),
                        storage_key: key,
                        content_hash: format!("hash-{i}"),
                    }],
                })
                .await
                .unwrap();
            ids.push(session.id);
        }

        let pipeline = AnalysisPipeline::new(
            store.clone(),
            objects,
            Arc::new(HashingEmbedder::default()),
            scorer.clone(),
            Arc::new(IndexRegistry::new()),
            Chunker::default(),
            CandidateRanker::default(),
        );
        (
            AnalysisQueue::start(pipeline, max_concurrent, 16),
            store,
            scorer,
            ids,
        )
    }

    async fn wait_idle(queue: &AnalysisQueue, ids: &[Uuid]) {
        for _ in 0..500 {
            if ids.iter().all(|id| !queue.is_active(*id)) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("queue did not drain");
    }

    #[tokio::test]
    async fn test_queued_sessions_complete() {
        let (queue, store, _, ids) = setup(3, 2).await;
        for id in &ids {
            assert_eq!(queue.enqueue(*id).await.unwrap(), EnqueueOutcome::Queued);
        }
        wait_idle(&queue, &ids).await;

        for id in ids {
            let session = store.get_session(id).await.unwrap();
            assert_eq!(session.status, SessionStatus::Completed);
            assert_eq!(session.processed_count, 1);
        }
    }

    #[tokio::test]
    async fn test_concurrency_cap_is_respected() {
        let (queue, _, scorer, ids) = setup(4, 1).await;
        for id in &ids {
            queue.enqueue(*id).await.unwrap();
        }
        wait_idle(&queue, &ids).await;
        assert_eq!(scorer.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_double_enqueue_schedules_rerun_instead() {
        let (queue, store, _, ids) = setup(1, 1).await;
        assert_eq!(queue.enqueue(ids[0]).await.unwrap(), EnqueueOutcome::Queued);
        assert_eq!(
            queue.enqueue(ids[0]).await.unwrap(),
            EnqueueOutcome::RerunScheduled
        );
        assert!(queue.is_active(ids[0]));
        wait_idle(&queue, &ids).await;

        let session = store.get_session(ids[0]).await.unwrap();
        assert_eq!(session.processed_count, 1);
        assert_eq!(session.status, SessionStatus::Completed);
    }
}
