//! Per-job publish/subscribe hub.
//!
//! [`EventBus`] keeps one topic per job id with its own subscriber list
//! behind its own lock; the topic map is only locked to look up, create, or
//! drop a topic. Every published event is first proposed to the
//! [`JobStore`], which decides whether it is a valid transition. Only
//! accepted events reach subscribers, so observers and the store never
//! disagree about a job's outcome.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use buildhub_core::{CoreError, JobId, JobStore, TransitionOutcome};
use tokio::sync::mpsc;

use crate::event::ProgressEvent;

/// Delay between delivering a terminal event and closing the job's
/// subscribers, so transports can flush the last message.
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_millis(100);

/// Delivery end of a subscription. Dropping it closes the subscriber's
/// stream.
pub type EventSink = mpsc::UnboundedSender<ProgressEvent>;

/// Identifies one subscription so it can be removed again.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    job_id: JobId,
    id: u64,
}

impl SubscriptionHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }
}

/// A subscription together with the receiving end of its sink.
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub receiver: mpsc::UnboundedReceiver<ProgressEvent>,
}

#[derive(Default)]
struct Topic {
    /// Sinks in subscription order.
    sinks: Vec<(u64, EventSink)>,
    /// Set once a terminal event went out; the topic is torn down after the
    /// grace period.
    closing: bool,
}

type TopicCell = Arc<Mutex<Topic>>;
type TopicMap = RwLock<HashMap<JobId, TopicCell>>;

/// In-process fan-out of [`ProgressEvent`]s keyed by job id.
///
/// Designed to be shared as `Arc<EventBus>`.
pub struct EventBus {
    jobs: Arc<JobStore>,
    topics: Arc<TopicMap>,
    next_id: AtomicU64,
    close_grace: Duration,
}

impl EventBus {
    /// Create a bus over `jobs` with the default close grace period.
    pub fn new(jobs: Arc<JobStore>) -> Self {
        Self::with_close_grace(jobs, DEFAULT_CLOSE_GRACE)
    }

    pub fn with_close_grace(jobs: Arc<JobStore>, close_grace: Duration) -> Self {
        Self {
            jobs,
            topics: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            close_grace,
        }
    }

    pub fn jobs(&self) -> &Arc<JobStore> {
        &self.jobs
    }

    /// Attach `sink` to the events of `job_id`.
    ///
    /// Unknown jobs are an error. If the job is already terminal the sink is
    /// dropped immediately, so the subscriber sees its stream end without
    /// any events; late subscribers never receive a replay.
    pub fn subscribe(&self, job_id: &str, sink: EventSink) -> Result<SubscriptionHandle, CoreError> {
        let status = self
            .jobs
            .status(job_id)
            .ok_or_else(|| CoreError::job_not_found(job_id))?;

        let handle = SubscriptionHandle {
            job_id: job_id.to_string(),
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        if status.is_terminal() {
            tracing::debug!(job_id, %status, "Subscriber attached to finished job, closing");
            return Ok(handle);
        }

        let topic = Arc::clone(write(&self.topics).entry(job_id.to_string()).or_default());
        let mut guard = lock(&topic);

        // Re-check under the topic lock: a terminal event may have been
        // published while the topic was being created.
        let finished = self.jobs.status(job_id).map_or(true, |s| s.is_terminal());
        if guard.closing || finished {
            drop(guard);
            self.prune_if_idle(job_id, &topic);
            tracing::debug!(job_id, "Subscriber attached to finished job, closing");
            return Ok(handle);
        }

        guard.sinks.push((handle.id, sink));
        tracing::debug!(
            job_id,
            subscription = handle.id,
            subscribers = guard.sinks.len(),
            "Subscriber attached",
        );
        Ok(handle)
    }

    /// [`subscribe`](Self::subscribe) with a fresh unbounded channel.
    pub fn subscribe_channel(&self, job_id: &str) -> Result<Subscription, CoreError> {
        let (sink, receiver) = mpsc::unbounded_channel();
        let handle = self.subscribe(job_id, sink)?;
        Ok(Subscription { handle, receiver })
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    ///
    /// The job itself is unaffected.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let mut topics = write(&self.topics);
        let Some(topic) = topics.get(&handle.job_id).cloned() else {
            return false;
        };

        let mut guard = lock(&topic);
        let before = guard.sinks.len();
        guard.sinks.retain(|(id, _)| *id != handle.id);
        let removed = guard.sinks.len() != before;

        if guard.sinks.is_empty() && !guard.closing {
            drop(guard);
            topics.remove(&handle.job_id);
        }

        if removed {
            tracing::debug!(job_id = %handle.job_id, subscription = handle.id, "Subscriber detached");
        }
        removed
    }

    /// Propose `event` to the job store and deliver it to the job's
    /// subscribers if accepted.
    ///
    /// Delivery is synchronous and in subscription order. With no
    /// subscribers the event is dropped after the store has seen it.
    /// Rejected and duplicate events (see [`TransitionOutcome`]) are never
    /// delivered. A delivered terminal event schedules the job's
    /// subscribers to be closed after the grace period.
    pub fn publish(&self, event: ProgressEvent) -> Result<TransitionOutcome, CoreError> {
        let topic = {
            let topics = read(&self.topics);
            match topics.get(&event.job_id) {
                Some(topic) => Arc::clone(topic),
                // Holding the read lock keeps a subscriber from slipping in
                // between the transition and this early return.
                None => return self.apply(&event),
            }
        };

        let mut guard = lock(&topic);
        let outcome = self.apply(&event)?;
        if !outcome.is_deliverable() {
            tracing::debug!(
                job_id = %event.job_id,
                status = %event.status,
                ?outcome,
                "Event not delivered",
            );
            return Ok(outcome);
        }

        guard.sinks.retain(|(_, sink)| sink.send(event.clone()).is_ok());

        if event.is_terminal() && !guard.closing {
            guard.closing = true;
            tracing::debug!(
                job_id = %event.job_id,
                subscribers = guard.sinks.len(),
                grace_ms = self.close_grace.as_millis() as u64,
                "Terminal event delivered",
            );
            drop(guard);
            self.schedule_close(event.job_id, topic);
        }

        Ok(outcome)
    }

    /// Number of live subscribers for `job_id`.
    pub fn subscriber_count(&self, job_id: &str) -> usize {
        read(&self.topics)
            .get(job_id)
            .map(|topic| lock(topic).sinks.len())
            .unwrap_or(0)
    }

    fn apply(&self, event: &ProgressEvent) -> Result<TransitionOutcome, CoreError> {
        self.jobs
            .transition(&event.job_id, event.status, event.diagnostic.clone())
    }

    /// Close and forget `topic` after the grace period.
    ///
    /// Outside a Tokio runtime there is nothing to wait on, so the topic is
    /// closed right away.
    fn schedule_close(&self, job_id: JobId, topic: TopicCell) {
        let topics = Arc::clone(&self.topics);
        let close = move || {
            {
                let mut map = write(&topics);
                if map.get(&job_id).is_some_and(|current| Arc::ptr_eq(current, &topic)) {
                    map.remove(&job_id);
                }
            }
            let closed = std::mem::take(&mut lock(&topic).sinks).len();
            tracing::debug!(job_id = %job_id, closed, "Subscribers closed");
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let grace = self.close_grace;
                runtime.spawn(async move {
                    tokio::time::sleep(grace).await;
                    close();
                });
            }
            Err(_) => close(),
        }
    }

    /// Drop `topic` from the map if it is still the current topic for
    /// `job_id` and nobody is subscribed.
    fn prune_if_idle(&self, job_id: &str, topic: &TopicCell) {
        let mut topics = write(&self.topics);
        let idle = topics.get(job_id).is_some_and(|current| {
            if !Arc::ptr_eq(current, topic) {
                return false;
            }
            let guard = lock(current);
            guard.sinks.is_empty() && !guard.closing
        });
        if idle {
            topics.remove(job_id);
        }
    }
}

fn lock(topic: &Mutex<Topic>) -> MutexGuard<'_, Topic> {
    topic.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read(topics: &TopicMap) -> RwLockReadGuard<'_, HashMap<JobId, TopicCell>> {
    topics.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(topics: &TopicMap) -> RwLockWriteGuard<'_, HashMap<JobId, TopicCell>> {
    topics.write().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
