//! Priority queue of jobs keyed by scheduling instant
//!
//! Each job appears at most once: scheduling an already scheduled job moves
//! it. Jobs at the same instant keep the order they were scheduled in.

use crate::job::SchedulingInstant;
use kairos_core::Duration;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// Jobs released together at one scheduling instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<J> {
    /// The instant's time, or the requested maximum if nothing was ready
    pub offset: Duration,
    /// Ready jobs in scheduling order
    pub jobs: Vec<J>,
}

impl<J> Batch<J> {
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Queue of pending jobs
#[derive(Debug, Clone)]
pub struct JobSchedule<J> {
    queue: BTreeMap<(SchedulingInstant, u64), J>,
    scheduled: HashMap<J, (SchedulingInstant, u64)>,
    next_seq: u64,
}

impl<J> Default for JobSchedule<J> {
    fn default() -> Self {
        Self {
            queue: BTreeMap::new(),
            scheduled: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl<J: Clone + Eq + Hash> JobSchedule<J> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `job` at `instant`, replacing any previous entry for it
    pub fn schedule(&mut self, job: J, instant: SchedulingInstant) {
        self.unschedule(&job);
        let key = (instant, self.next_seq);
        self.next_seq += 1;
        self.queue.insert(key, job.clone());
        self.scheduled.insert(job, key);
    }

    /// Remove `job` if it is scheduled; returns whether it was
    pub fn unschedule(&mut self, job: &J) -> bool {
        match self.scheduled.remove(job) {
            Some(key) => {
                self.queue.remove(&key);
                true
            }
            None => false,
        }
    }

    /// When `job` is scheduled, if it is
    pub fn instant_of(&self, job: &J) -> Option<SchedulingInstant> {
        self.scheduled.get(job).map(|(instant, _)| *instant)
    }

    /// The earliest pending instant
    pub fn peek_instant(&self) -> Option<SchedulingInstant> {
        self.queue.keys().next().map(|(instant, _)| *instant)
    }

    /// Remove and return every job at the earliest pending instant, unless that
    /// instant is after `max_time`
    ///
    /// An empty batch reports `max_time` as its offset.
    pub fn extract_next_jobs(&mut self, max_time: Duration) -> Batch<J> {
        let instant = match self.peek_instant() {
            Some(instant) if instant.time <= max_time => instant,
            _ => {
                return Batch {
                    offset: max_time,
                    jobs: Vec::new(),
                }
            }
        };

        let mut jobs = Vec::new();
        while let Some(entry) = self.queue.first_entry() {
            if entry.key().0 != instant {
                break;
            }
            let job = entry.remove();
            self.scheduled.remove(&job);
            jobs.push(job);
        }

        Batch {
            offset: instant.time,
            jobs,
        }
    }

    pub fn len(&self) -> usize {
        self.scheduled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scheduled.is_empty()
    }
}
