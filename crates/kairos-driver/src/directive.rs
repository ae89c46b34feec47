//! Activity directives and anchor resolution
//!
//! A directive places one activity in a plan. Its start is an offset either
//! from the plan start or from another directive's start or end. Start anchors
//! are folded away before the run; end anchors can only be honored while
//! simulating, by starting the dependent once its anchor has finished.

use crate::error::{Result, SimulationError};
use indexmap::IndexMap;
use kairos_core::{DirectiveId, Duration, Value, ValueMap};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Where a directive's offset is measured from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub directive: DirectiveId,
    pub anchored_to_start: bool,
}

impl Anchor {
    pub fn start_of(directive: DirectiveId) -> Self {
        Self {
            directive,
            anchored_to_start: true,
        }
    }

    pub fn end_of(directive: DirectiveId) -> Self {
        Self {
            directive,
            anchored_to_start: false,
        }
    }
}

/// One scheduled activity in a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityDirective {
    pub directive_type: String,
    #[serde(default)]
    pub arguments: ValueMap,
    pub start_offset: Duration,
    /// Plan-rooted when absent
    #[serde(default)]
    pub anchor: Option<Anchor>,
}

impl ActivityDirective {
    pub fn new(directive_type: impl Into<String>, start_offset: Duration) -> Self {
        Self {
            directive_type: directive_type.into(),
            arguments: ValueMap::new(),
            start_offset,
            anchor: None,
        }
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    pub fn anchored(mut self, anchor: Anchor) -> Self {
        self.anchor = Some(anchor);
        self
    }
}

/// A plan's directives by id, in plan order
pub type Schedule = IndexMap<DirectiveId, ActivityDirective>;

/// Directive start times, ready for scheduling
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSchedule {
    /// Directives started directly, with their offset from simulation start
    pub roots: Vec<(DirectiveId, Duration)>,
    /// Directives started once another directive ends, with the offset from
    /// that end
    pub dependents: BTreeMap<DirectiveId, Vec<(DirectiveId, Duration)>>,
}

impl ResolvedSchedule {
    pub fn dependents_of(&self, directive: DirectiveId) -> &[(DirectiveId, Duration)] {
        self.dependents
            .get(&directive)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Resolve every directive's start
///
/// `plan_offset` is the plan start relative to the simulation start; it shifts
/// the plan-rooted directives. Those that would start before the simulation
/// are dropped, along with everything waiting on their end.
pub fn resolve(schedule: &Schedule, plan_offset: Duration) -> Result<ResolvedSchedule> {
    check_anchors(schedule)?;

    let mut memo: BTreeMap<DirectiveId, (Option<DirectiveId>, Duration)> = BTreeMap::new();
    let mut resolved = ResolvedSchedule::default();
    for id in schedule.keys() {
        let (waits_on, offset) = resolve_one(*id, schedule, &mut memo);
        match waits_on {
            None => {
                let offset = offset + plan_offset;
                if offset.is_negative() {
                    debug!(directive = %id, %offset, "directive starts before the simulation; dropped");
                    continue;
                }
                resolved.roots.push((*id, offset));
            }
            Some(anchor) => {
                if offset.is_negative() {
                    return Err(SimulationError::NegativeAnchorOffset(*id));
                }
                resolved
                    .dependents
                    .entry(anchor)
                    .or_default()
                    .push((*id, offset));
            }
        }
    }
    Ok(resolved)
}

/// Reject unknown anchors and anchor cycles
fn check_anchors(schedule: &Schedule) -> Result<()> {
    for (id, directive) in schedule {
        let mut seen = BTreeSet::from([*id]);
        let mut current = directive;
        while let Some(anchor) = current.anchor {
            current = schedule
                .get(&anchor.directive)
                .ok_or(SimulationError::UnknownAnchor {
                    directive: *id,
                    anchor: anchor.directive,
                })?;
            if !seen.insert(anchor.directive) {
                return Err(SimulationError::AnchorCycle(*id));
            }
        }
    }
    Ok(())
}

/// The directive `id` waits on (none for the plan start) and its offset from
/// that point
fn resolve_one(
    id: DirectiveId,
    schedule: &Schedule,
    memo: &mut BTreeMap<DirectiveId, (Option<DirectiveId>, Duration)>,
) -> (Option<DirectiveId>, Duration) {
    if let Some(known) = memo.get(&id) {
        return *known;
    }
    let Some(directive) = schedule.get(&id) else {
        return (None, Duration::ZERO);
    };
    let result = match directive.anchor {
        None => (None, directive.start_offset),
        Some(anchor) if anchor.anchored_to_start => {
            let (waits_on, offset) = resolve_one(anchor.directive, schedule, memo);
            (waits_on, offset + directive.start_offset)
        }
        Some(anchor) => (Some(anchor.directive), directive.start_offset),
    };
    memo.insert(id, result);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: i64) -> Duration {
        Duration::of(n, Duration::SECOND)
    }

    fn id(n: u64) -> DirectiveId {
        DirectiveId::new(n)
    }

    #[test]
    fn test_start_anchors_fold_into_offsets() {
        let mut schedule = Schedule::new();
        schedule.insert(id(1), ActivityDirective::new("A", secs(10)));
        schedule.insert(
            id(2),
            ActivityDirective::new("B", secs(5)).anchored(Anchor::start_of(id(1))),
        );
        schedule.insert(
            id(3),
            ActivityDirective::new("C", secs(2)).anchored(Anchor::start_of(id(2))),
        );

        let resolved = resolve(&schedule, Duration::ZERO).unwrap();
        assert_eq!(
            resolved.roots,
            vec![(id(1), secs(10)), (id(2), secs(15)), (id(3), secs(17))]
        );
        assert!(resolved.dependents.is_empty());
    }

    #[test]
    fn test_end_anchors_become_dependents() {
        let mut schedule = Schedule::new();
        schedule.insert(id(1), ActivityDirective::new("A", secs(0)));
        schedule.insert(
            id(2),
            ActivityDirective::new("B", secs(3)).anchored(Anchor::end_of(id(1))),
        );
        schedule.insert(
            id(3),
            ActivityDirective::new("C", secs(1)).anchored(Anchor::start_of(id(2))),
        );

        let resolved = resolve(&schedule, Duration::ZERO).unwrap();
        assert_eq!(resolved.roots, vec![(id(1), secs(0))]);
        assert_eq!(
            resolved.dependents_of(id(1)),
            &[(id(2), secs(3)), (id(3), secs(4))]
        );
    }

    #[test]
    fn test_plan_offset_shifts_and_drops_early_directives() {
        let mut schedule = Schedule::new();
        schedule.insert(id(1), ActivityDirective::new("A", secs(2)));
        schedule.insert(id(2), ActivityDirective::new("B", secs(20)));

        let resolved = resolve(&schedule, -secs(5)).unwrap();
        assert_eq!(resolved.roots, vec![(id(2), secs(15))]);
    }

    #[test]
    fn test_unknown_anchor_and_cycles_are_rejected() {
        let mut schedule = Schedule::new();
        schedule.insert(
            id(1),
            ActivityDirective::new("A", secs(0)).anchored(Anchor::start_of(id(9))),
        );
        assert!(matches!(
            resolve(&schedule, Duration::ZERO),
            Err(SimulationError::UnknownAnchor { anchor, .. }) if anchor == id(9)
        ));

        let mut schedule = Schedule::new();
        schedule.insert(
            id(1),
            ActivityDirective::new("A", secs(0)).anchored(Anchor::end_of(id(2))),
        );
        schedule.insert(
            id(2),
            ActivityDirective::new("B", secs(0)).anchored(Anchor::start_of(id(1))),
        );
        assert!(matches!(
            resolve(&schedule, Duration::ZERO),
            Err(SimulationError::AnchorCycle(_))
        ));
    }

    #[test]
    fn test_negative_offset_from_an_end_is_rejected() {
        let mut schedule = Schedule::new();
        schedule.insert(id(1), ActivityDirective::new("A", secs(0)));
        schedule.insert(
            id(2),
            ActivityDirective::new("B", -secs(1)).anchored(Anchor::end_of(id(1))),
        );
        assert!(matches!(
            resolve(&schedule, Duration::ZERO),
            Err(SimulationError::NegativeAnchorOffset(d)) if d == id(2)
        ));
    }

    #[test]
    fn test_directives_load_from_ron() {
        let text = r#"(
            directive_type: "Heat",
            arguments: {"target": Float(30.0)},
            start_offset: 5000000,
            anchor: Some((directive: 1, anchored_to_start: false)),
        )"#;
        let directive: ActivityDirective = ron::from_str(text).unwrap();
        assert_eq!(directive.start_offset, secs(5));
        assert_eq!(directive.anchor, Some(Anchor::end_of(id(1))));
        assert_eq!(
            directive.arguments.get("target"),
            Some(&Value::Float(30.0))
        );
    }
}
