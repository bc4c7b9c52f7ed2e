//! Fixed-size worker pool for independent per-point work.
//!
//! Units never depend on each other. Every unit is paired with its
//! submission index and results land in the slot for that index, whatever
//! order the workers finish in.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// What a unit of work spends its time on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Workload {
    /// Field and curve arithmetic: one worker per core.
    CpuBound,
    /// Waiting on an external program: oversubscribe to overlap latency.
    ProcessBound,
}

const PROCESS_OVERSUBSCRIPTION: usize = 4;

impl Workload {
    pub fn default_workers(self) -> usize {
        let cores = thread::available_parallelism().map_or(1, |n| n.get());
        match self {
            Workload::CpuBound => cores,
            Workload::ProcessBound => cores * PROCESS_OVERSUBSCRIPTION,
        }
    }
}

/// Shared flag that stops a batch from starting further units.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct WorkerPool {
    pool: ThreadPool,
    workload: Workload,
}

impl WorkerPool {
    pub fn new(workload: Workload, workers: Option<usize>) -> Result<Self> {
        let threads = workers.unwrap_or_else(|| workload.default_workers()).max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(move |i| format!("lootbox-{workload:?}-{i}"))
            .build()
            .map_err(|e| Error::Backend(format!("failed to start worker pool: {e}")))?;
        Ok(Self { pool, workload })
    }

    pub fn workload(&self) -> Workload {
        self.workload
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs `f` over every item and returns the results in submission order.
    ///
    /// The first error by index wins. Units not yet started when `cancel`
    /// fires report [`Error::Cancelled`]; completed results are dropped with
    /// the batch rather than returned partially.
    pub fn run_indexed<T, R, F>(&self, items: &[T], cancel: &CancelToken, f: F) -> Result<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(usize, &T) -> Result<R> + Sync + Send,
    {
        debug!(units = items.len(), workers = self.workers(), workload = ?self.workload, "dispatching batch");
        let completed: Vec<(usize, Result<R>)> = self.pool.install(|| {
            items
                .par_iter()
                .enumerate()
                .map(|(i, item)| {
                    if cancel.is_cancelled() {
                        return (i, Err(Error::Cancelled));
                    }
                    (i, f(i, item))
                })
                .collect()
        });

        let mut slots: Vec<Option<R>> = Vec::with_capacity(items.len());
        slots.resize_with(items.len(), || None);
        let mut first_error: Option<(usize, Error)> = None;
        for (i, result) in completed {
            match result {
                Ok(r) => slots[i] = Some(r),
                Err(e) => {
                    if first_error.as_ref().is_none_or(|(j, _)| i < *j) {
                        first_error = Some((i, e));
                    }
                }
            }
        }
        if let Some((_, e)) = first_error {
            return Err(e);
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| slot.ok_or_else(|| Error::Backend(format!("unit {i} produced no result"))))
            .collect()
    }
}
