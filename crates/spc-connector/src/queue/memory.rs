use super::{FailOutcome, Job, JobQueue, RetryPolicy};
use crate::clients::SyncItem;
use crate::error::QueueError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// A job whose attempts ran out
#[derive(Debug, Clone, PartialEq)]
pub struct FailedJob {
    pub id: Uuid,
    pub item: SyncItem,
    pub attempts: u32,
    pub last_error: String,
}

struct Entry {
    id: Uuid,
    key: String,
    item: SyncItem,
    attempts: u32,
    available_at: Instant,
    claimed_at: Option<Instant>,
    last_error: Option<String>,
}

#[derive(Default)]
struct State {
    ready: VecDeque<Entry>,
    active: HashMap<Uuid, Entry>,
    /// Diff keys of every ready or active entry
    pending: HashSet<String>,
    failed: VecDeque<FailedJob>,
}

impl State {
    fn bury(&mut self, entry: Entry, retention: usize) {
        self.pending.remove(&entry.key);
        self.failed.push_back(FailedJob {
            id: entry.id,
            item: entry.item,
            attempts: entry.attempts,
            last_error: entry.last_error.unwrap_or_default(),
        });
        while self.failed.len() > retention {
            self.failed.pop_front();
        }
    }
}

/// In-process queue, for tests and single-instance deployments
pub struct MemoryJobQueue {
    policy: RetryPolicy,
    visibility_timeout: Duration,
    failed_retention: usize,
    state: Mutex<State>,
}

impl MemoryJobQueue {
    pub fn new(policy: RetryPolicy, visibility_timeout: Duration, failed_retention: usize) -> Self {
        Self {
            policy,
            visibility_timeout,
            failed_retention,
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        // A panic while holding the lock leaves the state consistent
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Failed jobs, oldest first
    pub fn failed_jobs(&self) -> Vec<FailedJob> {
        self.state().failed.iter().cloned().collect()
    }

    pub fn active_count(&self) -> usize {
        self.state().active.len()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, item: SyncItem) -> Result<Option<Uuid>, QueueError> {
        let mut state = self.state();
        let key = item.diff_key();
        if !state.pending.insert(key.clone()) {
            return Ok(None);
        }

        let id = Uuid::new_v4();
        state.ready.push_back(Entry {
            id,
            key,
            item,
            attempts: 0,
            available_at: Instant::now(),
            claimed_at: None,
            last_error: None,
        });
        Ok(Some(id))
    }

    async fn claim(&self, _worker_id: &str) -> Result<Option<Job>, QueueError> {
        let mut state = self.state();
        let now = Instant::now();

        let Some(position) = state.ready.iter().position(|e| e.available_at <= now) else {
            return Ok(None);
        };
        let Some(mut entry) = state.ready.remove(position) else {
            return Ok(None);
        };

        entry.attempts += 1;
        entry.claimed_at = Some(now);
        let job = Job {
            id: entry.id,
            item: entry.item.clone(),
            attempts: entry.attempts,
            max_attempts: self.policy.max_attempts,
        };
        state.active.insert(entry.id, entry);
        Ok(Some(job))
    }

    async fn complete(&self, job: &Job) -> Result<(), QueueError> {
        let mut state = self.state();
        let entry = state
            .active
            .remove(&job.id)
            .ok_or(QueueError::NotFound(job.id))?;
        state.pending.remove(&entry.key);
        Ok(())
    }

    async fn fail(&self, job: &Job, error: &str) -> Result<FailOutcome, QueueError> {
        let mut state = self.state();
        let mut entry = state
            .active
            .remove(&job.id)
            .ok_or(QueueError::NotFound(job.id))?;
        entry.claimed_at = None;
        entry.last_error = Some(error.to_string());

        if entry.attempts >= self.policy.max_attempts {
            state.bury(entry, self.failed_retention);
            return Ok(FailOutcome::Dead);
        }

        let delay = self.policy.delay_for(entry.attempts);
        entry.available_at = Instant::now() + delay;
        state.ready.push_back(entry);
        Ok(FailOutcome::Retrying { delay })
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        Ok(self.state().ready.len() as u64)
    }

    async fn reclaim_expired(&self) -> Result<u64, QueueError> {
        let mut state = self.state();
        let now = Instant::now();

        let expired: Vec<Uuid> = state
            .active
            .values()
            .filter(|e| e.claimed_at.is_some_and(|at| now.duration_since(at) >= self.visibility_timeout))
            .map(|e| e.id)
            .collect();

        for id in &expired {
            if let Some(mut entry) = state.active.remove(id) {
                entry.claimed_at = None;
                entry.last_error = Some("Visibility timeout expired".to_string());
                if entry.attempts >= self.policy.max_attempts {
                    state.bury(entry, self.failed_retention);
                } else {
                    entry.available_at = now;
                    state.ready.push_back(entry);
                }
            }
        }
        Ok(expired.len() as u64)
    }
}
