//! Simulation results
//!
//! After a run, the timeline is replayed once to attribute activity events to
//! the tasks that emitted them. Activity tasks announce themselves by emitting
//! on topics whose registered names carry [`INPUT_TOPIC_PREFIX`] or
//! [`OUTPUT_TOPIC_PREFIX`]; root activities also emit their directive id on
//! the activity topic.

use crate::engine::SimulationEngine;
use crate::profile::ProfileSegment;
use crate::state::ExecutionState;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use kairos_core::{
    DirectiveId, Duration, EventGraph, ResourceKind, TaskId, Timeline, Topic, TopicId,
    TopicRegistry, Value, ValueMap,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Registered-name prefix of topics carrying an activity's arguments
pub const INPUT_TOPIC_PREFIX: &str = "ActivityType.Input.";

/// Registered-name prefix of topics carrying an activity's computed output
pub const OUTPUT_TOPIC_PREFIX: &str = "ActivityType.Output.";

/// Identity of an activity instance in the results
///
/// Activities started from a directive reuse the directive's number; others
/// are numbered after the largest directive id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityInstanceId(pub u64);

impl fmt::Display for ActivityInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "activity:{}", self.0)
    }
}

/// An activity that finished, along with all its children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedActivity {
    pub activity_type: String,
    pub arguments: ValueMap,
    pub start: DateTime<Utc>,
    pub duration: Duration,
    pub parent: Option<ActivityInstanceId>,
    pub children: Vec<ActivityInstanceId>,
    pub directive: Option<DirectiveId>,
    pub computed_attributes: Value,
}

/// An activity still running when the simulation stopped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnfinishedActivity {
    pub activity_type: String,
    pub arguments: ValueMap,
    pub start: DateTime<Utc>,
    pub parent: Option<ActivityInstanceId>,
    pub children: Vec<ActivityInstanceId>,
    pub directive: Option<DirectiveId>,
}

/// A serialized event in the results' event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedEvent {
    pub topic: TopicId,
    pub value: Value,
}

/// Everything a run produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResults {
    pub start_time: DateTime<Utc>,
    pub duration: Duration,
    pub real_profiles: IndexMap<String, Vec<ProfileSegment>>,
    pub discrete_profiles: IndexMap<String, Vec<ProfileSegment>>,
    pub simulated_activities: BTreeMap<ActivityInstanceId, SimulatedActivity>,
    pub unfinished_activities: BTreeMap<ActivityInstanceId, UnfinishedActivity>,
    /// Serializable topics as `(id, name)`
    pub topics: Vec<(TopicId, String)>,
    /// Serialized events of each commit, by the instant they happened at
    pub events: Vec<(Duration, EventGraph<SerializedEvent>)>,
}

impl SimulationResults {
    /// Look up an activity by the directive that started it
    pub fn activity_for_directive(&self, directive: DirectiveId) -> Option<&SimulatedActivity> {
        self.simulated_activities
            .get(&ActivityInstanceId(directive.raw()))
            .filter(|activity| activity.directive == Some(directive))
    }
}

/// What the timeline says about one activity task
#[derive(Default)]
struct ActivityRecord {
    directive: Option<DirectiveId>,
    activity_type: Option<String>,
    arguments: ValueMap,
    output: Option<Value>,
}

/// Build results from the final engine state and its timeline
pub fn compute_results(
    engine: &SimulationEngine,
    start_time: DateTime<Utc>,
    elapsed: Duration,
    timeline: &Timeline,
    topics: &TopicRegistry,
    activity_topic: &Topic<DirectiveId>,
) -> SimulationResults {
    let mut records: BTreeMap<TaskId, ActivityRecord> = BTreeMap::new();
    let mut events = Vec::new();

    for (instant, graph) in timeline.commits() {
        graph.for_each(|event| {
            if let Some(directive) = event.extract(activity_topic) {
                records.entry(event.provenance()).or_default().directive = Some(*directive);
                return;
            }
            let Some(topic) = topics.get(event.topic()) else {
                return;
            };
            if let Some(activity_type) = topic.name().strip_prefix(INPUT_TOPIC_PREFIX) {
                let record = records.entry(event.provenance()).or_default();
                record.activity_type = Some(activity_type.to_string());
                record.arguments = topic.serialize(event).map(into_arguments).unwrap_or_default();
            } else if topic.name().starts_with(OUTPUT_TOPIC_PREFIX) {
                records.entry(event.provenance()).or_default().output = topic.serialize(event);
            }
        });

        let serialized = graph.filter_map(|event| {
            let topic = topics.get(event.topic())?;
            Some(SerializedEvent {
                topic: topic.id(),
                value: topic.serialize(event)?,
            })
        });
        if !serialized.is_empty() {
            events.push((instant, serialized));
        }
    }

    // Only tasks that declared an activity type are activities.
    records.retain(|_, record| record.activity_type.is_some());
    let ids = assign_ids(&records);

    let parent_of = |task: TaskId| {
        let mut current = engine.task_parent(task);
        while let Some(ancestor) = current {
            if let Some(id) = ids.get(&ancestor) {
                return Some(*id);
            }
            current = engine.task_parent(ancestor);
        }
        None
    };

    let mut children: BTreeMap<ActivityInstanceId, Vec<ActivityInstanceId>> = BTreeMap::new();
    let mut parents = BTreeMap::new();
    for task in records.keys() {
        let parent = parent_of(*task);
        if let Some(parent) = parent {
            children.entry(parent).or_default().push(ids[task]);
        }
        parents.insert(*task, parent);
    }

    let mut simulated_activities = BTreeMap::new();
    let mut unfinished_activities = BTreeMap::new();
    for (task, record) in records {
        let Some(state) = engine.task_state(task) else {
            continue;
        };
        let id = ids[&task];
        let start = start_time + state.start_offset().to_chrono();
        let parent = parents.get(&task).copied().flatten();
        let activity_children = children.remove(&id).unwrap_or_default();
        let activity_type = record.activity_type.unwrap_or_default();

        match state {
            ExecutionState::Terminated(done) => {
                simulated_activities.insert(
                    id,
                    SimulatedActivity {
                        activity_type,
                        arguments: record.arguments,
                        start,
                        duration: done.duration(),
                        parent,
                        children: activity_children,
                        directive: record.directive,
                        computed_attributes: record.output.unwrap_or(Value::Null),
                    },
                );
            }
            _ => {
                unfinished_activities.insert(
                    id,
                    UnfinishedActivity {
                        activity_type,
                        arguments: record.arguments,
                        start,
                        parent,
                        children: activity_children,
                        directive: record.directive,
                    },
                );
            }
        }
    }

    let mut real_profiles = IndexMap::new();
    let mut discrete_profiles = IndexMap::new();
    for (name, state) in engine.resources() {
        let segments = state.profile().segments(elapsed);
        match state.kind() {
            ResourceKind::Real => real_profiles.insert(name.to_string(), segments),
            ResourceKind::Discrete => discrete_profiles.insert(name.to_string(), segments),
        };
    }

    SimulationResults {
        start_time,
        duration: elapsed,
        real_profiles,
        discrete_profiles,
        simulated_activities,
        unfinished_activities,
        topics: topics
            .serializable()
            .iter()
            .map(|topic| (topic.id(), topic.name().to_string()))
            .collect(),
        events,
    }
}

fn assign_ids(records: &BTreeMap<TaskId, ActivityRecord>) -> BTreeMap<TaskId, ActivityInstanceId> {
    let mut next = records
        .values()
        .filter_map(|record| record.directive)
        .map(|directive| directive.raw() + 1)
        .max()
        .unwrap_or(0);

    records
        .iter()
        .map(|(task, record)| {
            let id = match record.directive {
                Some(directive) => ActivityInstanceId(directive.raw()),
                None => {
                    next += 1;
                    ActivityInstanceId(next - 1)
                }
            };
            (*task, id)
        })
        .collect()
}

fn into_arguments(value: Value) -> ValueMap {
    match value {
        Value::Map(map) => map,
        Value::Null => ValueMap::new(),
        other => {
            let mut map = ValueMap::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}
