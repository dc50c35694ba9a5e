//! Bounded two-lane job queue.
//!
//! Producers never block: a full lane rejects the job immediately. Consumers
//! poll with [`JobQueue::try_pop`], which always serves the urgent lane first.
//! Within a lane jobs come out in submission order; callers that want nearer
//! chunks first submit them nearest-first.

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};
use thiserror::Error;

/// Pipeline stage a queue feeds, for error messages and logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Load,
    Mesh,
    Save,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Load => "load",
            Stage::Mesh => "mesh",
            Stage::Save => "save",
        })
    }
}

/// Why a job was not accepted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("{stage} queue is full ({capacity} jobs)")]
    Full { stage: Stage, capacity: usize },
    #[error("{0} queue is closed")]
    Closed(Stage),
}

/// A job handed back by [`JobQueue::try_push`].
#[derive(Debug)]
pub struct Rejected<T> {
    pub job: T,
    pub error: EnqueueError,
}

struct Lane<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    capacity: usize,
}

impl<T> Clone for Lane<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            capacity: self.capacity,
        }
    }
}

impl<T> Lane<T> {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self { tx, rx, capacity }
    }
}

/// A cloneable handle to one stage's queue. All clones share the same lanes.
pub struct JobQueue<T> {
    stage: Stage,
    urgent: Lane<T>,
    normal: Lane<T>,
}

impl<T> Clone for JobQueue<T> {
    fn clone(&self) -> Self {
        Self {
            stage: self.stage,
            urgent: self.urgent.clone(),
            normal: self.normal.clone(),
        }
    }
}

impl<T> JobQueue<T> {
    /// Creates a queue with `capacity` normal slots and `urgent_capacity`
    /// urgent slots. Zero capacities are raised to one.
    pub fn new(stage: Stage, capacity: usize, urgent_capacity: usize) -> Self {
        Self {
            stage,
            urgent: Lane::new(urgent_capacity),
            normal: Lane::new(capacity),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Enqueues without blocking. A rejected job is returned to the caller.
    pub fn try_push(&self, job: T, urgent: bool) -> Result<(), Rejected<T>> {
        let lane = if urgent { &self.urgent } else { &self.normal };
        lane.tx.try_send(job).map_err(|e| match e {
            TrySendError::Full(job) => Rejected {
                job,
                error: EnqueueError::Full {
                    stage: self.stage,
                    capacity: lane.capacity,
                },
            },
            TrySendError::Disconnected(job) => Rejected {
                job,
                error: EnqueueError::Closed(self.stage),
            },
        })
    }

    /// Dequeues without blocking, urgent lane first. Each lane is FIFO.
    pub fn try_pop(&self) -> Option<T> {
        match self.urgent.rx.try_recv() {
            Ok(job) => Some(job),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => self.normal.rx.try_recv().ok(),
        }
    }

    /// Jobs waiting in both lanes.
    pub fn len(&self) -> usize {
        self.urgent.rx.len() + self.normal.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
