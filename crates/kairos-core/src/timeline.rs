//! The append-only simulation timeline
//!
//! The timeline is the only record of what happened during a run: a sequence
//! of time advances and committed event graphs. Cell states and results are
//! both derived by replaying it.

use crate::graph::EventGraph;
use crate::time::Duration;
use crate::topic::Event;
use serde::{Deserialize, Serialize};

/// One entry of the timeline
#[derive(Debug, Clone)]
pub enum TimePoint {
    /// Simulation time advanced with no events
    Delta(Duration),
    /// The events of one batch, all at the current instant
    Commit(EventGraph<Event>),
}

/// Append-only log of time advances and commits
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    points: Vec<TimePoint>,
    elapsed: Duration,
}

/// Summary counters for a timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimelineStats {
    pub commits: usize,
    pub deltas: usize,
    pub events: usize,
    pub elapsed: Duration,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that time advanced; non-positive advances are not recorded
    pub fn add_delta(&mut self, delta: Duration) {
        if !delta.is_positive() {
            return;
        }
        self.elapsed += delta;
        self.points.push(TimePoint::Delta(delta));
    }

    /// Record a batch's events; empty graphs are not recorded
    pub fn add_commit(&mut self, graph: EventGraph<Event>) {
        if graph.is_empty() {
            return;
        }
        self.points.push(TimePoint::Commit(graph));
    }

    pub fn points(&self) -> &[TimePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Total time recorded so far
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Every commit with the instant it happened at, in order
    pub fn commits(&self) -> impl Iterator<Item = (Duration, &EventGraph<Event>)> {
        let mut now = Duration::ZERO;
        self.points.iter().filter_map(move |point| match point {
            TimePoint::Delta(delta) => {
                now += *delta;
                None
            }
            TimePoint::Commit(graph) => Some((now, graph)),
        })
    }

    pub fn stats(&self) -> TimelineStats {
        let mut stats = TimelineStats {
            elapsed: self.elapsed,
            ..TimelineStats::default()
        };
        for point in &self.points {
            match point {
                TimePoint::Delta(_) => stats.deltas += 1,
                TimePoint::Commit(graph) => {
                    stats.commits += 1;
                    stats.events += graph.len();
                }
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::TaskId;
    use crate::topic::TopicRegistry;

    #[test]
    fn test_commits_carry_their_instant() {
        let mut topics = TopicRegistry::new();
        let topic = topics.create::<u8>();
        let mut timeline = Timeline::new();

        timeline.add_commit(EventGraph::atom(Event::new(&topic, 1, TaskId::new(0))));
        timeline.add_delta(Duration::SECOND);
        timeline.add_delta(Duration::ZERO);
        timeline.add_commit(EventGraph::empty());
        timeline.add_commit(EventGraph::sequence([
            Event::new(&topic, 2, TaskId::new(0)),
            Event::new(&topic, 3, TaskId::new(1)),
        ]));

        let instants: Vec<_> = timeline.commits().map(|(t, g)| (t, g.len())).collect();
        assert_eq!(instants, vec![(Duration::ZERO, 1), (Duration::SECOND, 2)]);

        let stats = timeline.stats();
        assert_eq!(stats.commits, 2);
        assert_eq!(stats.deltas, 1);
        assert_eq!(stats.events, 3);
        assert_eq!(stats.elapsed, Duration::SECOND);
    }
}
