//! Per-job execution frame
//!
//! A job runs against the cell states at the start of the current instant plus
//! its own effects so far. Every job signalled from inside a frame (a spawned
//! task, a woken waiter) runs as a concurrent branch that starts from the
//! parent's state at the moment it was signalled. Running a job therefore
//! yields an [`EventGraph`]:
//!
//! ```text
//! seg0 ; (job1 | (seg1 ; (job2 | seg2)))
//! ```
//!
//! where `segN` are the events the job emitted between signals.

use crate::error::Result;
use crate::job::JobId;
use kairos_core::{Cell, CellId, Event, EventGraph, LiveCells};
use std::collections::BTreeMap;

/// Local copies of the cells touched by events in this branch
#[derive(Debug, Clone, Default)]
struct Overlay {
    cells: BTreeMap<CellId, Cell>,
}

struct Branch {
    segment: Vec<Event>,
    overlay: Overlay,
    job: JobId,
}

/// Execution context for one job and everything it signals
pub struct TaskFrame<'a> {
    base: &'a LiveCells,
    overlay: Overlay,
    segment: Vec<Event>,
    branches: Vec<Branch>,
}

impl<'a> TaskFrame<'a> {
    /// Run `job` with `executor`, then every job it signalled, and return the
    /// resulting event graph
    pub fn run<F>(job: JobId, cells: &'a LiveCells, executor: &mut F) -> Result<EventGraph<Event>>
    where
        F: FnMut(JobId, &mut TaskFrame<'a>) -> Result<()>,
    {
        Self::run_from(job, cells, Overlay::default(), executor)
    }

    fn run_from<F>(
        job: JobId,
        base: &'a LiveCells,
        overlay: Overlay,
        executor: &mut F,
    ) -> Result<EventGraph<Event>>
    where
        F: FnMut(JobId, &mut TaskFrame<'a>) -> Result<()>,
    {
        let mut frame = TaskFrame {
            base,
            overlay,
            segment: Vec::new(),
            branches: Vec::new(),
        };
        executor(job, &mut frame)?;

        let TaskFrame {
            segment, branches, ..
        } = frame;
        let mut tip = EventGraph::sequence(segment);
        for branch in branches.into_iter().rev() {
            let child = Self::run_from(branch.job, base, branch.overlay, executor)?;
            tip = EventGraph::sequentially(
                EventGraph::sequence(branch.segment),
                EventGraph::concurrently(tip, child),
            );
        }
        Ok(tip)
    }

    /// Read a cell as this branch sees it
    pub fn cell(&self, id: CellId) -> kairos_core::Result<&Cell> {
        self.overlay
            .cells
            .get(&id)
            .or_else(|| self.base.get(id))
            .ok_or(kairos_core::Error::CellNotFound(id))
    }

    /// Record an event and apply it to this branch's view of the cells
    pub fn emit(&mut self, event: Event) {
        let base = self.base;
        for id in base.store().cells_for(event.topic()) {
            let Some(original) = base.get(*id) else {
                continue;
            };
            self.overlay
                .cells
                .entry(*id)
                .or_insert_with(|| original.clone())
                .apply(&event);
        }
        self.segment.push(event);
    }

    /// Run `job` as a branch concurrent with the rest of this frame
    pub fn signal(&mut self, job: JobId) {
        self.branches.push(Branch {
            segment: std::mem::take(&mut self.segment),
            overlay: self.overlay.clone(),
            job,
        });
    }
}
