//! Background job bookkeeping and the once-per-prompt reaper.

use crate::status::ExitStatus;
use nix::errno::Errno;
use nix::sys::wait::{WaitPidFlag, waitpid};
use nix::unistd::Pid;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::{debug, warn};

/// A background process that has been spawned but not yet reaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Job {
    pub pid: Pid,
    pub slot: usize,
}

/// Growable registry of background jobs.
///
/// Jobs live in numbered slots. Removing a job frees its slot without moving
/// the others, and the lowest free slot is handed out on the next insert.
/// A pid index keeps lookups O(1) and rejects duplicates.
#[derive(Debug, Default)]
pub struct JobTable {
    slots: Vec<Option<Pid>>,
    free: BTreeSet<usize>,
    index: HashMap<Pid, usize>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job. Returns `None` if `pid` is already tracked.
    pub fn insert(&mut self, pid: Pid) -> Option<Job> {
        if self.index.contains_key(&pid) {
            return None;
        }
        let slot = match self.free.pop_first() {
            Some(slot) => {
                self.slots[slot] = Some(pid);
                slot
            }
            None => {
                self.slots.push(Some(pid));
                self.slots.len() - 1
            }
        };
        self.index.insert(pid, slot);
        Some(Job { pid, slot })
    }

    pub fn remove(&mut self, pid: Pid) -> Option<Job> {
        let slot = self.index.remove(&pid)?;
        self.slots[slot] = None;
        self.free.insert(slot);
        Some(Job { pid, slot })
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.index.contains_key(&pid)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Occupied slots in slot order.
    pub fn iter(&self) -> impl Iterator<Item = Job> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, pid)| pid.map(|pid| Job { pid, slot }))
    }
}

/// A background job observed in a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub job: Job,
    pub status: ExitStatus,
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "background pid {} is done: {}", self.job.pid, self.status)
    }
}

/// Outcome of one reaper pass.
#[derive(Debug, Default)]
pub struct Reaped {
    /// Jobs seen in a terminal state, in slot order.
    pub done: Vec<Completion>,
    /// Jobs whose pid could no longer be waited for. They are gone from the
    /// table but never produced a status.
    pub lost: Vec<Job>,
}

/// Poll every tracked job once without blocking.
///
/// Finished and untrackable jobs are removed from the table; running ones are
/// left for the next call.
pub fn reap(jobs: &mut JobTable) -> Reaped {
    let mut reaped = Reaped::default();

    for job in jobs.iter() {
        match waitpid(job.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(status) => {
                if let Some(status) = ExitStatus::from_wait(status) {
                    debug!(pid = job.pid.as_raw(), slot = job.slot, %status, "reaped background job");
                    reaped.done.push(Completion { job, status });
                }
            }
            Err(Errno::EINTR) => {}
            Err(e) => {
                warn!(pid = job.pid.as_raw(), error = %e, "dropping untrackable background job");
                reaped.lost.push(job);
            }
        }
    }

    for completion in &reaped.done {
        jobs.remove(completion.job.pid);
    }
    for job in &reaped.lost {
        jobs.remove(job.pid);
    }
    reaped
}
