//! Conflict detection for concurrent branches of an event graph
//!
//! Branches of a `Concurrently` node have no order between them, so every cell
//! observing both must reach the same state whichever side is applied first.
//! Cells declare this through [`CellModel::commutes`](kairos_core::CellModel::commutes).
//! This module finds topics written on both sides of a concurrent node, by
//! different tasks, and observed by at least one non-commuting cell.
//!
//! # Algorithm
//!
//! The graph is evaluated bottom-up into a footprint (topic -> writing tasks):
//! 1. `sequentially` merges footprints
//! 2. `concurrently` first intersects the two footprints, reporting shared
//!    sensitive topics, then merges them
//!
//! Multiple writes from the *same* task are not conflicts; the task orders them.

use kairos_core::{CellStore, EffectTrait, Event, EventGraph, TaskId, TopicId};
use std::collections::{BTreeMap, BTreeSet};

/// A topic written concurrently by more than one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub topic: TopicId,
    /// All distinct writers (sorted for deterministic output)
    pub tasks: Vec<TaskId>,
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Concurrent writes to {} from ", self.topic)?;
        for (i, task) in self.tasks.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", task)?;
        }
        Ok(())
    }
}

/// Result of conflict detection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConflictReport {
    /// All detected conflicts
    pub conflicts: Vec<Conflict>,
}

impl ConflictReport {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Conflict> {
        self.conflicts.iter()
    }
}

#[derive(Default)]
struct Footprint {
    writers: BTreeMap<TopicId, BTreeSet<TaskId>>,
    conflicts: Vec<Conflict>,
}

impl Footprint {
    fn merge(mut self, other: Footprint) -> Footprint {
        for (topic, tasks) in other.writers {
            self.writers.entry(topic).or_default().extend(tasks);
        }
        self.conflicts.extend(other.conflicts);
        self
    }
}

struct ConflictAlgebra<F> {
    is_sensitive: F,
}

impl<F: Fn(TopicId) -> bool> EffectTrait<Footprint> for ConflictAlgebra<F> {
    fn empty(&self) -> Footprint {
        Footprint::default()
    }

    fn sequentially(&self, prefix: Footprint, suffix: Footprint) -> Footprint {
        prefix.merge(suffix)
    }

    fn concurrently(&self, left: Footprint, right: Footprint) -> Footprint {
        let mut found = Vec::new();
        for (topic, left_tasks) in &left.writers {
            let Some(right_tasks) = right.writers.get(topic) else {
                continue;
            };
            if !(self.is_sensitive)(*topic) {
                continue;
            }
            let tasks: BTreeSet<TaskId> = left_tasks.union(right_tasks).copied().collect();
            if tasks.len() > 1 {
                found.push(Conflict {
                    topic: *topic,
                    tasks: tasks.into_iter().collect(),
                });
            }
        }
        let mut merged = left.merge(right);
        merged.conflicts.extend(found);
        merged
    }
}

/// Detect concurrent writes to topics observed by non-commuting cells
pub fn detect_conflicts(graph: &EventGraph<Event>, cells: &CellStore) -> ConflictReport {
    detect_conflicts_filtered(graph, |topic| {
        !cells.cells_for(topic).is_empty() && !cells.topic_commutes(topic)
    })
}

/// Detect concurrent writes to every topic accepted by `filter`
pub fn detect_conflicts_filtered<F>(graph: &EventGraph<Event>, filter: F) -> ConflictReport
where
    F: Fn(TopicId) -> bool,
{
    let algebra = ConflictAlgebra {
        is_sensitive: filter,
    };
    let footprint = graph.evaluate(&algebra, &|event: &Event| {
        let mut footprint = Footprint::default();
        footprint
            .writers
            .entry(event.topic())
            .or_default()
            .insert(event.provenance());
        footprint
    });
    ConflictReport {
        conflicts: footprint.conflicts,
    }
}
