//! The simulation engine
//!
//! The engine owns every table of a run: pending jobs, tasks and their
//! lifecycle states, registered conditions, tracked resources, the
//! parent/child relation, and the three subscription indexes (tasks waiting on
//! signals, conditions and resources waiting on topics).
//!
//! It does not own time or cells. A driver extracts the next batch, brings the
//! cells up to the batch's instant, asks the engine to perform the batch, and
//! commits the returned event graph to its timeline.

use crate::config::{ConflictPolicy, EngineConfig};
use crate::conflict::detect_conflicts;
use crate::error::{Error, Result};
use crate::frame::TaskFrame;
use crate::job::{JobId, SchedulingInstant, SignalId, SubInstant};
use crate::profile::ProfilingState;
use crate::schedule::{Batch, JobSchedule};
use crate::state::{AwaitingChildren, ExecutionState, InProgress};
use crate::subscriptions::Subscriptions;
use indexmap::IndexMap;
use kairos_core::{
    Cell, CellId, Condition, ConditionId, Duration, Event, EventGraph, LiveCells, Payload,
    Querier, Resource, ResourceId, Scheduler, Task, TaskId, TaskStatus, TopicId,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace, warn};

/// Discrete-event simulation engine
pub struct SimulationEngine {
    config: EngineConfig,
    scheduled_jobs: JobSchedule<JobId>,
    waiting_tasks: Subscriptions<SignalId, TaskId>,
    waiting_conditions: Subscriptions<TopicId, ConditionId>,
    waiting_resources: Subscriptions<TopicId, ResourceId>,
    tasks: BTreeMap<TaskId, ExecutionState>,
    conditions: BTreeMap<ConditionId, Box<dyn Condition>>,
    resources: IndexMap<ResourceId, ProfilingState>,
    task_parent: BTreeMap<TaskId, TaskId>,
    task_children: BTreeMap<TaskId, Vec<TaskId>>,
    next_task: u64,
    next_condition: u64,
}

impl Default for SimulationEngine {
    fn default() -> Self {
        Self::with_config(EngineConfig::default())
    }
}

impl SimulationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            scheduled_jobs: JobSchedule::new(),
            waiting_tasks: Subscriptions::new(),
            waiting_conditions: Subscriptions::new(),
            waiting_resources: Subscriptions::new(),
            tasks: BTreeMap::new(),
            conditions: BTreeMap::new(),
            resources: IndexMap::new(),
            task_parent: BTreeMap::new(),
            task_children: BTreeMap::new(),
            next_task: 0,
            next_condition: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Schedule a new top-level task to start at `start`
    pub fn schedule_task(&mut self, start: Duration, task: Box<dyn Task>) -> TaskId {
        let id = self.allocate_task();
        self.tasks.insert(
            id,
            ExecutionState::InProgress(InProgress::new(start, task)),
        );
        self.scheduled_jobs
            .schedule(JobId::Task(id), SubInstant::Tasks.at(start));
        id
    }

    /// Start profiling a resource, with its first sample at `now`
    pub fn track_resource(
        &mut self,
        name: impl Into<ResourceId>,
        resource: Box<dyn Resource>,
        now: Duration,
    ) {
        let id = name.into();
        self.resources
            .insert(id.clone(), ProfilingState::new(resource));
        self.scheduled_jobs
            .schedule(JobId::Resource(id), SubInstant::Resources.at(now));
    }

    /// Re-evaluate everything that depends on `topic` at `now`
    ///
    /// A condition whose signal was pending loses it: it must be evaluated
    /// again against the new state before it may fire.
    pub fn invalidate_topic(&mut self, topic: TopicId, now: Duration) {
        for resource in self.waiting_resources.invalidate_topic(&topic) {
            self.scheduled_jobs
                .schedule(JobId::Resource(resource), SubInstant::Resources.at(now));
        }
        for condition in self.waiting_conditions.invalidate_topic(&topic) {
            self.scheduled_jobs
                .unschedule(&JobId::Signal(SignalId::Condition(condition)));
            self.scheduled_jobs
                .schedule(JobId::Condition(condition), SubInstant::Conditions.at(now));
        }
    }

    /// Remove the next batch of jobs, no later than `max_time`
    ///
    /// Conditions whose signal is in the batch are retired here, before any
    /// job of the batch runs, so nothing in the batch can re-arm them.
    pub fn extract_next_jobs(&mut self, max_time: Duration) -> Batch<JobId> {
        let batch = self.scheduled_jobs.extract_next_jobs(max_time);
        for job in &batch.jobs {
            if let JobId::Signal(SignalId::Condition(condition)) = job {
                self.conditions.remove(condition);
                self.waiting_conditions.unsubscribe_query(condition);
            }
        }
        trace!(offset = %batch.offset, jobs = batch.jobs.len(), "extracted batch");
        batch
    }

    /// Run a batch of jobs at `now` and return the events they produced
    ///
    /// Jobs of one batch run as concurrent branches against the same cell
    /// states, so their effects must commute.
    pub fn perform_jobs(
        &mut self,
        jobs: &[JobId],
        cells: &LiveCells,
        now: Duration,
        horizon: Duration,
    ) -> Result<EventGraph<Event>> {
        let mut graph = EventGraph::empty();
        for job in jobs {
            let branch = TaskFrame::run(
                job.clone(),
                cells,
                &mut |job: JobId, frame: &mut TaskFrame<'_>| {
                    self.perform_job(job, frame, now, horizon)
                },
            )?;
            graph = EventGraph::concurrently(graph, branch);
        }
        self.check_conflicts(&graph, cells)?;
        Ok(graph)
    }

    fn perform_job(
        &mut self,
        job: JobId,
        frame: &mut TaskFrame<'_>,
        now: Duration,
        horizon: Duration,
    ) -> Result<()> {
        match job {
            JobId::Task(task) => self.step_task(task, frame, now),
            JobId::Signal(signal) => {
                self.step_signalled_tasks(signal, frame);
                Ok(())
            }
            JobId::Condition(condition) => self.update_condition(condition, frame, now, horizon),
            JobId::Resource(resource) => self.update_resource(resource, frame, now),
        }
    }

    fn step_task(&mut self, task: TaskId, frame: &mut TaskFrame<'_>, now: Duration) -> Result<()> {
        let state = self.tasks.remove(&task).ok_or(Error::UnknownTask(task))?;
        match state {
            ExecutionState::InProgress(progress) => {
                self.step_effect_model(task, progress, frame, now)
            }
            ExecutionState::AwaitingChildren(awaiting) => {
                self.step_waiting_task(task, awaiting, frame, now);
                Ok(())
            }
            ExecutionState::Terminated(done) => {
                warn!(%task, "step requested for a terminated task; ignoring");
                self.tasks.insert(task, ExecutionState::Terminated(done));
                Ok(())
            }
        }
    }

    fn step_effect_model(
        &mut self,
        task: TaskId,
        progress: InProgress,
        frame: &mut TaskFrame<'_>,
        now: Duration,
    ) -> Result<()> {
        let InProgress {
            start_offset,
            continuation,
        } = progress;

        let status = {
            let mut scheduler = EngineScheduler {
                engine: self,
                frame,
                now,
                task,
            };
            continuation
                .step(&mut scheduler)
                .map_err(|source| Error::TaskFailed { task, source })?
        };

        match status {
            TaskStatus::Completed(value) => {
                let children = self.task_children.get(&task).cloned().unwrap_or_default();
                let awaiting = InProgress::completed_at(start_offset, now, value, children);
                self.tasks
                    .insert(task, ExecutionState::AwaitingChildren(awaiting));
                self.scheduled_jobs
                    .schedule(JobId::Task(task), SubInstant::Tasks.at(now));
            }
            TaskStatus::Delayed {
                delay,
                continuation,
            } => {
                if delay.is_negative() {
                    return Err(Error::TaskFailed {
                        task,
                        source: kairos_core::Error::InvalidArgument(format!(
                            "negative delay {}",
                            delay
                        )),
                    });
                }
                self.tasks.insert(
                    task,
                    ExecutionState::InProgress(InProgress::new(start_offset, continuation)),
                );
                self.scheduled_jobs
                    .schedule(JobId::Task(task), SubInstant::Tasks.at(now + delay));
            }
            TaskStatus::AwaitingTask {
                target,
                continuation,
            } => {
                self.tasks.insert(
                    task,
                    ExecutionState::InProgress(InProgress::new(start_offset, continuation)),
                );
                match self.tasks.get(&target) {
                    Some(ExecutionState::Terminated(_)) => {
                        self.scheduled_jobs
                            .schedule(JobId::Task(task), SubInstant::Tasks.at(now));
                    }
                    Some(_) => {
                        self.waiting_tasks
                            .subscribe_query(task, [SignalId::Task(target)]);
                    }
                    None => {
                        // Not subscribed: the id may later be handed to an unrelated task.
                        warn!(%task, %target, "awaiting a task that was never scheduled; it will not resume");
                    }
                }
            }
            TaskStatus::AwaitingCondition {
                condition,
                continuation,
            } => {
                let id = self.allocate_condition();
                self.conditions.insert(id, condition);
                self.scheduled_jobs
                    .schedule(JobId::Condition(id), SubInstant::Conditions.at(now));
                self.tasks.insert(
                    task,
                    ExecutionState::InProgress(InProgress::new(start_offset, continuation)),
                );
                self.waiting_tasks
                    .subscribe_query(task, [SignalId::Condition(id)]);
            }
        }
        Ok(())
    }

    fn step_waiting_task(
        &mut self,
        task: TaskId,
        mut awaiting: AwaitingChildren,
        frame: &mut TaskFrame<'_>,
        now: Duration,
    ) {
        while let Some(child) = awaiting.remaining_children.front().copied() {
            let finished = self
                .tasks
                .get(&child)
                .is_some_and(ExecutionState::is_terminated);
            if !finished {
                self.tasks
                    .insert(task, ExecutionState::AwaitingChildren(awaiting));
                self.waiting_tasks
                    .subscribe_query(task, [SignalId::Task(child)]);
                return;
            }
            awaiting.remaining_children.pop_front();
        }

        debug!(%task, at = %now, "task terminated");
        self.tasks
            .insert(task, ExecutionState::Terminated(awaiting.joined_at(now)));
        frame.signal(JobId::Signal(SignalId::Task(task)));
    }

    fn step_signalled_tasks(&mut self, signal: SignalId, frame: &mut TaskFrame<'_>) {
        for task in self.waiting_tasks.invalidate_topic(&signal) {
            frame.signal(JobId::Task(task));
        }
    }

    fn update_condition(
        &mut self,
        condition: ConditionId,
        frame: &mut TaskFrame<'_>,
        now: Duration,
        horizon: Duration,
    ) -> Result<()> {
        let predicate = self
            .conditions
            .get(&condition)
            .ok_or(Error::UnknownCondition(condition))?;

        let mut querier = EngineQuerier::new(frame);
        let prediction = predicate
            .next_satisfied(&mut querier, (horizon - now).max(Duration::ZERO))
            .map_err(|source| Error::ConditionFailed { condition, source })?;
        let EngineQuerier {
            referenced_topics,
            expiry,
            ..
        } = querier;

        self.waiting_conditions
            .subscribe_query(condition, referenced_topics);

        let expiry = expiry.map(|offset| now + offset);
        match prediction.map(|offset| now + offset.max(Duration::ZERO)) {
            Some(at) if expiry.map_or(true, |expiry| at <= expiry) => {
                self.scheduled_jobs.schedule(
                    JobId::Signal(SignalId::Condition(condition)),
                    SubInstant::Tasks.at(at),
                );
            }
            _ => {
                let next = expiry.unwrap_or(horizon).max(now + Duration::EPSILON);
                self.scheduled_jobs
                    .schedule(JobId::Condition(condition), SubInstant::Conditions.at(next));
            }
        }
        Ok(())
    }

    fn update_resource(
        &mut self,
        resource: ResourceId,
        frame: &mut TaskFrame<'_>,
        now: Duration,
    ) -> Result<()> {
        let state = self
            .resources
            .get_mut(&resource)
            .ok_or_else(|| Error::UnknownResource(resource.clone()))?;

        let mut querier = EngineQuerier::new(frame);
        if let Err(source) = state.append(now, &mut querier) {
            return Err(Error::ResourceFailed { resource, source });
        }
        let EngineQuerier {
            referenced_topics,
            expiry,
            ..
        } = querier;

        self.waiting_resources
            .subscribe_query(resource.clone(), referenced_topics);
        if let Some(expiry) = expiry {
            let next = (now + expiry).max(now + Duration::EPSILON);
            self.scheduled_jobs
                .schedule(JobId::Resource(resource), SubInstant::Resources.at(next));
        }
        Ok(())
    }

    fn check_conflicts(&self, graph: &EventGraph<Event>, cells: &LiveCells) -> Result<()> {
        let policy = self.config.conflict_policy();
        if policy == ConflictPolicy::Ignore {
            return Ok(());
        }
        let report = detect_conflicts(graph, cells.store());
        if report.is_empty() {
            return Ok(());
        }
        if policy == ConflictPolicy::Abort {
            return Err(Error::unresolved_conflicts(report));
        }
        for conflict in report.iter() {
            warn!(%conflict, "concurrent writes to a non-commuting cell");
        }
        Ok(())
    }

    fn allocate_task(&mut self) -> TaskId {
        let id = TaskId::new(self.next_task);
        self.next_task += 1;
        id
    }

    fn allocate_condition(&mut self) -> ConditionId {
        let id = ConditionId::new(self.next_condition);
        self.next_condition += 1;
        id
    }

    /// Whether `task` and all of its children have finished
    pub fn is_task_complete(&self, task: TaskId) -> bool {
        self.tasks
            .get(&task)
            .is_some_and(ExecutionState::is_terminated)
    }

    /// Time from a terminated task's start until its last child finished
    pub fn task_duration(&self, task: TaskId) -> Option<Duration> {
        self.tasks
            .get(&task)
            .and_then(ExecutionState::as_terminated)
            .map(|done| done.duration())
    }

    pub fn task_state(&self, task: TaskId) -> Option<&ExecutionState> {
        self.tasks.get(&task)
    }

    /// Every known task in id order
    pub fn tasks(&self) -> impl Iterator<Item = (TaskId, &ExecutionState)> {
        self.tasks.iter().map(|(id, state)| (*id, state))
    }

    pub fn task_parent(&self, task: TaskId) -> Option<TaskId> {
        self.task_parent.get(&task).copied()
    }

    pub fn task_children(&self, task: TaskId) -> &[TaskId] {
        self.task_children
            .get(&task)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Tracked resources in the order they were registered
    pub fn resources(&self) -> impl Iterator<Item = (&ResourceId, &ProfilingState)> {
        self.resources.iter()
    }

    pub fn resource(&self, id: &ResourceId) -> Option<&ProfilingState> {
        self.resources.get(id)
    }

    /// Whether `condition` is still registered (not yet fired)
    pub fn has_condition(&self, condition: ConditionId) -> bool {
        self.conditions.contains_key(&condition)
    }

    /// Whether `condition` currently depends on any topic
    pub fn is_condition_subscribed(&self, condition: ConditionId) -> bool {
        self.waiting_conditions.is_subscribed(&condition)
    }

    pub fn scheduled_instant(&self, job: &JobId) -> Option<SchedulingInstant> {
        self.scheduled_jobs.instant_of(job)
    }

    pub fn has_pending_jobs(&self) -> bool {
        !self.scheduled_jobs.is_empty()
    }
}

/// The capability a stepping task receives
struct EngineScheduler<'e, 'f, 'a> {
    engine: &'e mut SimulationEngine,
    frame: &'f mut TaskFrame<'a>,
    now: Duration,
    task: TaskId,
}

impl Scheduler for EngineScheduler<'_, '_, '_> {
    fn now(&self) -> Duration {
        self.now
    }

    fn active_task(&self) -> TaskId {
        self.task
    }

    fn read(&mut self, cell: CellId) -> kairos_core::Result<&Cell> {
        self.frame.cell(cell)
    }

    fn emit_erased(&mut self, topic: TopicId, payload: Payload) {
        self.frame.emit(Event::erased(topic, payload, self.task));
        self.engine.invalidate_topic(topic, self.now);
    }

    fn spawn(&mut self, task: Box<dyn Task>) -> TaskId {
        let engine = &mut *self.engine;
        let child = engine.allocate_task();
        engine.tasks.insert(
            child,
            ExecutionState::InProgress(InProgress::new(self.now, task)),
        );
        engine.task_parent.insert(child, self.task);
        engine.task_children.entry(self.task).or_default().push(child);
        self.frame.signal(JobId::Task(child));
        child
    }
}

/// The capability conditions and resources receive
struct EngineQuerier<'f, 'a> {
    frame: &'f TaskFrame<'a>,
    referenced_topics: BTreeSet<TopicId>,
    expiry: Option<Duration>,
}

impl<'f, 'a> EngineQuerier<'f, 'a> {
    fn new(frame: &'f TaskFrame<'a>) -> Self {
        Self {
            frame,
            referenced_topics: BTreeSet::new(),
            expiry: None,
        }
    }
}

impl Querier for EngineQuerier<'_, '_> {
    fn read(&mut self, id: CellId) -> kairos_core::Result<&Cell> {
        let cell = self.frame.cell(id)?;
        self.referenced_topics.insert(cell.topic());
        if let Some(expiry) = cell.expiry() {
            self.expiry = Some(self.expiry.map_or(expiry, |current| current.min(expiry)));
        }
        Ok(cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairos_core::condition;
    use kairos_core::resource;
    use kairos_core::task::{self, TaskStatus};
    use kairos_core::{
        CellModel, CellStore, Query, QuerierExt, SchedulerExt, Timeline, Topic, TopicRegistry,
        Value,
    };
    use std::sync::{Arc, Mutex};

    fn secs(n: i64) -> Duration {
        Duration::of(n, Duration::SECOND)
    }

    type Log = Arc<Mutex<Vec<(&'static str, Duration)>>>;

    fn log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn entries(log: &Log) -> Vec<(&'static str, Duration)> {
        log.lock().unwrap().clone()
    }

    /// Minimal driver loop around an engine
    struct Harness {
        engine: SimulationEngine,
        cells: LiveCells,
        timeline: Timeline,
        elapsed: Duration,
    }

    impl Harness {
        fn new(store: CellStore) -> Self {
            Self::with_engine(SimulationEngine::new(), store)
        }

        fn with_engine(engine: SimulationEngine, store: CellStore) -> Self {
            Self {
                engine,
                cells: LiveCells::new(store),
                timeline: Timeline::new(),
                elapsed: Duration::ZERO,
            }
        }

        /// Run one batch; `None` once nothing is left before the horizon
        fn step(&mut self, horizon: Duration) -> Result<Option<Batch<JobId>>> {
            let batch = self.engine.extract_next_jobs(horizon);
            if batch.is_empty() {
                return Ok(None);
            }
            self.perform(batch, horizon).map(Some)
        }

        fn perform(&mut self, batch: Batch<JobId>, horizon: Duration) -> Result<Batch<JobId>> {
            self.timeline.add_delta(batch.offset - self.elapsed);
            self.elapsed = batch.offset;
            self.cells.catch_up(&self.timeline);
            let graph = self
                .engine
                .perform_jobs(&batch.jobs, &self.cells, batch.offset, horizon)?;
            self.timeline.add_commit(graph);
            self.cells.catch_up(&self.timeline);
            Ok(batch)
        }

        fn run(&mut self, horizon: Duration) -> Result<()> {
            while self.step(horizon)?.is_some() {}
            Ok(())
        }
    }

    struct Counter;

    impl CellModel for Counter {
        type State = i64;
        type Event = i64;

        fn apply(&self, state: &mut i64, delta: &i64) {
            *state += delta;
        }

        fn commutes(&self) -> bool {
            true
        }
    }

    struct Register;

    impl CellModel for Register {
        type State = i64;
        type Event = i64;

        fn apply(&self, state: &mut i64, value: &i64) {
            *state = *value;
        }
    }

    /// A quantity rising at a constant rate per second; events add to it
    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Level {
        value: f64,
        rate: f64,
    }

    struct Linear;

    impl CellModel for Linear {
        type State = Level;
        type Event = f64;

        fn apply(&self, state: &mut Level, delta: &f64) {
            state.value += delta;
        }

        fn step(&self, state: &mut Level, elapsed: Duration) {
            state.value += state.rate * elapsed.as_secs_f64();
        }

        fn commutes(&self) -> bool {
            true
        }
    }

    /// Never-resolved state that is only valid for an instant
    struct Stale;

    impl CellModel for Stale {
        type State = ();
        type Event = ();

        fn apply(&self, _state: &mut (), _event: &()) {}

        fn expiry(&self, _state: &()) -> Option<Duration> {
            Some(Duration::ZERO)
        }
    }

    fn counter_store() -> (CellStore, Topic<i64>, Query<i64>) {
        let mut topics = TopicRegistry::new();
        let topic = topics.create::<i64>();
        let mut store = CellStore::new();
        let query = store.allocate(Counter, 0, &topic);
        (store, topic, query)
    }

    fn recording(log: &Log, label: &'static str) -> impl Task {
        let log = Arc::clone(log);
        task::from_fn(move |scheduler| {
            log.lock().unwrap().push((label, scheduler.now()));
            Ok(TaskStatus::completed(()))
        })
    }

    fn delayed(log: &Log, label: &'static str, delay: Duration) -> Box<dyn Task> {
        let log = Arc::clone(log);
        Box::new(task::from_fn(move |_| {
            Ok(TaskStatus::delayed(delay, recording(&log, label)))
        }))
    }

    #[test]
    fn test_delayed_task_resumes_exactly_after_delay() {
        let (store, _, _) = counter_store();
        let mut harness = Harness::new(store);
        let log = log();
        let id = harness
            .engine
            .schedule_task(secs(1), delayed(&log, "resumed", secs(5)));

        let mut offsets = Vec::new();
        while let Some(batch) = harness.step(secs(100)).unwrap() {
            offsets.push(batch.offset);
            if batch.offset < secs(6) {
                assert!(entries(&log).is_empty());
            }
        }

        assert_eq!(entries(&log), vec![("resumed", secs(6))]);
        assert_eq!(offsets.first(), Some(&secs(1)));
        assert!(harness.engine.is_task_complete(id));
        assert_eq!(harness.engine.task_duration(id), Some(secs(5)));
    }

    #[test]
    fn test_parent_terminates_only_after_both_children() {
        let (store, _, _) = counter_store();
        let mut harness = Harness::new(store);
        let log = log();

        let (slow, fast) = (delayed(&log, "slow", secs(7)), delayed(&log, "fast", secs(3)));
        let children = Arc::new(Mutex::new(Vec::new()));
        let spawned = Arc::clone(&children);
        let parent = harness.engine.schedule_task(
            Duration::ZERO,
            Box::new(task::from_fn(move |scheduler| {
                let mut spawned = spawned.lock().unwrap();
                spawned.push(scheduler.spawn(slow));
                spawned.push(scheduler.spawn(fast));
                Ok(TaskStatus::completed(()))
            })),
        );

        while harness.step(secs(100)).unwrap().is_some() {
            let children = children.lock().unwrap();
            if harness.engine.is_task_complete(parent) {
                assert!(children.iter().all(|c| harness.engine.is_task_complete(*c)));
            }
            for child in children.iter() {
                assert_eq!(harness.engine.task_parent(*child), Some(parent));
            }
        }

        let state = harness.engine.task_state(parent).unwrap();
        let done = state.as_terminated().unwrap();
        assert_eq!(done.end_offset, Duration::ZERO);
        assert_eq!(done.join_offset, secs(7));
        assert_eq!(harness.engine.task_children(parent).len(), 2);
        assert_eq!(entries(&log), vec![("fast", secs(3)), ("slow", secs(7))]);
    }

    #[test]
    fn test_explicit_await_of_children_in_reverse_finish_order() {
        let (store, _, _) = counter_store();
        let mut harness = Harness::new(store);
        let log = log();

        let (slow, fast) = (delayed(&log, "slow", secs(4)), delayed(&log, "fast", secs(2)));
        let parent_log = Arc::clone(&log);
        let parent = harness.engine.schedule_task(
            Duration::ZERO,
            Box::new(task::from_fn(move |scheduler| {
                let fast = scheduler.spawn(fast);
                let slow = scheduler.spawn(slow);
                Ok(TaskStatus::awaiting_task(
                    slow,
                    task::from_fn(move |_| {
                        Ok(TaskStatus::awaiting_task(
                            fast,
                            recording(&parent_log, "parent"),
                        ))
                    }),
                ))
            })),
        );

        harness.run(secs(100)).unwrap();
        assert_eq!(
            entries(&log),
            vec![("fast", secs(2)), ("slow", secs(4)), ("parent", secs(4))]
        );
        assert_eq!(harness.engine.task_duration(parent), Some(secs(4)));
    }

    fn level_condition(level: Query<Level>, threshold: f64, evaluations: Log) -> impl Condition {
        condition::from_fn(move |querier, horizon| {
            evaluations.lock().unwrap().push(("evaluated", horizon));
            let state = querier.get_state(&level)?;
            if state.value >= threshold {
                return Ok(Some(Duration::ZERO));
            }
            if state.rate <= 0.0 {
                return Ok(None);
            }
            let seconds = (threshold - state.value) / state.rate;
            let offset = Duration::from_micros((seconds * 1e6).ceil() as i64);
            Ok((offset <= horizon).then_some(offset))
        })
    }

    #[test]
    fn test_condition_reevaluated_when_its_topic_changes() {
        let mut topics = TopicRegistry::new();
        let bumps = topics.create::<f64>();
        let mut store = CellStore::new();
        let level = store.allocate(
            Linear,
            Level {
                value: 0.0,
                rate: 1.0,
            },
            &bumps,
        );
        let mut harness = Harness::new(store);
        let horizon = secs(100);
        let evaluations = log();
        let log = log();

        let condition = level_condition(level, 10.0, Arc::clone(&evaluations));
        let waiter_log = Arc::clone(&log);
        harness.engine.schedule_task(
            Duration::ZERO,
            Box::new(task::from_fn(move |_| {
                Ok(TaskStatus::awaiting_condition(
                    condition,
                    recording(&waiter_log, "satisfied"),
                ))
            })),
        );
        harness.engine.schedule_task(
            Duration::ZERO,
            Box::new(task::from_fn(move |_| {
                Ok(TaskStatus::delayed(
                    secs(3),
                    task::emitting(bumps, 5.0),
                ))
            })),
        );

        harness.run(horizon).unwrap();

        // Evaluated at 0 (predicting +10), then again at 3 when the level jumped.
        let remaining: Vec<Duration> = entries(&evaluations).into_iter().map(|(_, h)| h).collect();
        assert_eq!(remaining, vec![horizon, horizon - secs(3)]);
        assert_eq!(entries(&log), vec![("satisfied", secs(5))]);
    }

    #[test]
    fn test_fired_condition_is_retired_before_its_batch_runs() {
        let mut topics = TopicRegistry::new();
        let topic = topics.create::<i64>();
        let mut store = CellStore::new();
        let counter = store.allocate(Counter, 0, &topic);
        let mut harness = Harness::new(store);
        let log = log();

        let waiter_log = Arc::clone(&log);
        harness.engine.schedule_task(
            Duration::ZERO,
            Box::new(task::from_fn(move |_| {
                Ok(TaskStatus::awaiting_condition(
                    condition::when(counter, |n: &i64| *n > 0),
                    recording(&waiter_log, "woken"),
                ))
            })),
        );
        harness.engine.schedule_task(
            secs(2),
            Box::new(task::emitting(topic, 1i64)),
        );

        let condition = ConditionId::new(0);
        loop {
            let batch = harness.engine.extract_next_jobs(secs(10));
            if batch.is_empty() {
                break;
            }
            if batch
                .jobs
                .contains(&JobId::Signal(SignalId::Condition(condition)))
            {
                assert!(!harness.engine.has_condition(condition));
                assert!(!harness.engine.is_condition_subscribed(condition));
            }
            harness.perform(batch, secs(10)).unwrap();
        }

        assert_eq!(entries(&log), vec![("woken", secs(2))]);
        assert!(!harness.engine.has_condition(condition));
    }

    #[test]
    fn test_unresolved_condition_always_moves_forward() {
        let mut topics = TopicRegistry::new();
        let topic = topics.create::<()>();
        let mut store = CellStore::new();
        let stale = store.allocate(Stale, (), &topic);
        let mut harness = Harness::new(store);

        harness.engine.schedule_task(
            secs(1),
            Box::new(task::from_fn(move |_| {
                Ok(TaskStatus::awaiting_condition(
                    condition::from_fn(move |querier, _| {
                        querier.get_state(&stale)?;
                        Ok(None)
                    }),
                    task::from_fn(|_| Ok(TaskStatus::completed(()))),
                ))
            })),
        );

        // The task step, then the first evaluation.
        harness.step(secs(10)).unwrap();
        let batch = harness.step(secs(10)).unwrap().unwrap();
        assert_eq!(batch.jobs, vec![JobId::Condition(ConditionId::new(0))]);

        let next = harness
            .engine
            .scheduled_instant(&JobId::Condition(ConditionId::new(0)))
            .unwrap();
        assert_eq!(next.time, secs(1) + Duration::EPSILON);
        assert_eq!(next.sub, SubInstant::Conditions);
    }

    #[test]
    fn test_condition_without_expiry_waits_until_horizon() {
        let (store, _, _) = counter_store();
        let mut harness = Harness::new(store);
        harness.engine.schedule_task(
            Duration::ZERO,
            Box::new(task::from_fn(|_| {
                Ok(TaskStatus::awaiting_condition(
                    condition::from_fn(|_, _| Ok(None)),
                    task::from_fn(|_| Ok(TaskStatus::completed(()))),
                ))
            })),
        );
        harness.step(secs(50)).unwrap();
        harness.step(secs(50)).unwrap();
        let next = harness
            .engine
            .scheduled_instant(&JobId::Condition(ConditionId::new(0)))
            .unwrap();
        assert_eq!(next.time, secs(50));
    }

    #[test]
    fn test_independent_resources_sampled_at_the_same_instant() {
        let mut topics = TopicRegistry::new();
        let power = topics.create::<i64>();
        let heat = topics.create::<i64>();
        let mut store = CellStore::new();
        let power_cell = store.allocate(Register, 1, &power);
        let heat_cell = store.allocate(Register, 10, &heat);
        let mut harness = Harness::new(store);

        harness.engine.track_resource(
            "power",
            Box::new(resource::discrete(power_cell, |n: &i64| Value::Int(*n))),
            Duration::ZERO,
        );
        harness.engine.track_resource(
            "heat",
            Box::new(resource::discrete(heat_cell, |n: &i64| Value::Int(*n))),
            Duration::ZERO,
        );
        harness
            .engine
            .schedule_task(secs(2), Box::new(task::emitting(power, 2i64)));
        harness
            .engine
            .schedule_task(secs(2), Box::new(task::emitting(heat, 20i64)));

        harness.run(secs(10)).unwrap();

        let samples = |name: &str| -> Vec<(Duration, Value)> {
            harness
                .engine
                .resource(&ResourceId::from(name))
                .unwrap()
                .profile()
                .samples()
                .iter()
                .map(|s| (s.time, s.dynamics.clone()))
                .collect()
        };
        assert_eq!(
            samples("power"),
            vec![(Duration::ZERO, Value::Int(1)), (secs(2), Value::Int(2))]
        );
        assert_eq!(
            samples("heat"),
            vec![(Duration::ZERO, Value::Int(10)), (secs(2), Value::Int(20))]
        );
    }

    #[test]
    fn test_awaiting_unknown_task_never_resumes() {
        let (store, _, _) = counter_store();
        let mut harness = Harness::new(store);
        let log = log();
        let waiter_log = Arc::clone(&log);
        let waiter = harness.engine.schedule_task(
            Duration::ZERO,
            Box::new(task::from_fn(move |_| {
                Ok(TaskStatus::awaiting_task(
                    TaskId::new(999),
                    recording(&waiter_log, "resumed"),
                ))
            })),
        );

        harness.run(secs(100)).unwrap();

        assert!(entries(&log).is_empty());
        assert!(matches!(
            harness.engine.task_state(waiter),
            Some(ExecutionState::InProgress(_))
        ));
        assert!(!harness.engine.has_pending_jobs());
    }

    #[test]
    fn test_await_on_a_future_task_id_stays_dangling() {
        let (store, _, _) = counter_store();
        let mut harness = Harness::new(store);
        let log = log();
        let waiter_log = Arc::clone(&log);
        // Ids are handed out in order, so the next scheduled task gets `waiter + 1`.
        let waiter = harness.engine.schedule_task(
            Duration::ZERO,
            Box::new(task::from_fn(move |scheduler| {
                let next = TaskId::new(scheduler.active_task().raw() + 1);
                Ok(TaskStatus::awaiting_task(next, recording(&waiter_log, "resumed")))
            })),
        );
        harness.run(secs(100)).unwrap();

        let later = harness
            .engine
            .schedule_task(secs(5), Box::new(recording(&log, "unrelated")));
        assert_eq!(later, TaskId::new(waiter.raw() + 1));
        harness.run(secs(100)).unwrap();

        assert_eq!(entries(&log), vec![("unrelated", secs(5))]);
        assert!(harness.engine.is_task_complete(later));
        assert!(matches!(
            harness.engine.task_state(waiter),
            Some(ExecutionState::InProgress(_))
        ));
    }

    #[test]
    fn test_awaiting_terminated_task_resumes_immediately() {
        let (store, _, _) = counter_store();
        let mut harness = Harness::new(store);
        let log = log();
        let first = harness
            .engine
            .schedule_task(Duration::ZERO, Box::new(recording(&log, "first")));
        let waiter_log = Arc::clone(&log);
        harness.engine.schedule_task(
            secs(1),
            Box::new(task::from_fn(move |_| {
                Ok(TaskStatus::awaiting_task(first, recording(&waiter_log, "second")))
            })),
        );

        harness.run(secs(10)).unwrap();
        assert_eq!(
            entries(&log),
            vec![("first", Duration::ZERO), ("second", secs(1))]
        );
    }

    fn run_scenario(reverse_batches: bool) -> (i64, Vec<EventGraph<(TopicId, TaskId)>>) {
        let (store, topic, counter) = counter_store();
        let mut harness = Harness::new(store);
        for (i, delta) in [3i64, 5, 7].into_iter().enumerate() {
            harness
                .engine
                .schedule_task(secs(i as i64 % 2), Box::new(task::emitting(topic, delta)));
        }
        harness.engine.schedule_task(
            Duration::ZERO,
            Box::new(task::from_fn(move |scheduler| {
                let seen = scheduler.get(&counter)?;
                scheduler.emit(&topic, seen * 100);
                Ok(TaskStatus::completed(()))
            })),
        );

        loop {
            let mut batch = harness.engine.extract_next_jobs(secs(10));
            if batch.is_empty() {
                break;
            }
            if reverse_batches {
                batch.jobs.reverse();
            }
            harness.perform(batch, secs(10)).unwrap();
        }

        let graphs = harness
            .timeline
            .commits()
            .map(|(_, graph)| graph.map(|event| (event.topic(), event.provenance())))
            .collect();
        (*harness.cells.state(&counter).unwrap(), graphs)
    }

    #[test]
    fn test_repeated_runs_are_identical() {
        assert_eq!(run_scenario(false), run_scenario(false));
    }

    #[test]
    fn test_reordering_a_batch_yields_the_same_state() {
        let (forward, _) = run_scenario(false);
        let (reversed, _) = run_scenario(true);
        assert_eq!(forward, reversed);
        // Every task at zero saw the counter before any of them emitted.
        assert_eq!(forward, 3 + 5 + 7);
    }

    #[test]
    fn test_task_error_carries_task_identity() {
        let (store, _, _) = counter_store();
        let mut harness = Harness::new(store);
        let failing = harness.engine.schedule_task(
            secs(1),
            Box::new(task::from_fn(|_| Err(kairos_core::Error::model("boom")))),
        );
        let err = harness.run(secs(10)).unwrap_err();
        assert_eq!(err.task(), Some(failing));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_negative_delay_is_rejected() {
        let (store, _, _) = counter_store();
        let mut harness = Harness::new(store);
        harness
            .engine
            .schedule_task(Duration::ZERO, delayed(&log(), "never", -secs(1)));
        assert!(matches!(
            harness.run(secs(10)),
            Err(Error::TaskFailed { .. })
        ));
    }

    /// Two tasks at zero write 1 and 2 to a register; returns the outcome
    /// with the batch optionally reversed
    fn register_race(config: EngineConfig, reverse_batches: bool) -> Result<i64> {
        let mut topics = TopicRegistry::new();
        let topic = topics.create::<i64>();
        let mut store = CellStore::new();
        let register = store.allocate(Register, 0, &topic);
        let mut harness = Harness::with_engine(SimulationEngine::with_config(config), store);
        harness
            .engine
            .schedule_task(Duration::ZERO, Box::new(task::emitting(topic, 1i64)));
        harness
            .engine
            .schedule_task(Duration::ZERO, Box::new(task::emitting(topic, 2i64)));

        loop {
            let mut batch = harness.engine.extract_next_jobs(secs(10));
            if batch.is_empty() {
                break;
            }
            if reverse_batches {
                batch.jobs.reverse();
            }
            harness.perform(batch, secs(10))?;
        }
        Ok(*harness.cells.state(&register).unwrap())
    }

    #[test]
    fn test_conflicting_writes_abort_by_default() {
        for reverse_batches in [false, true] {
            let err = register_race(EngineConfig::default(), reverse_batches).unwrap_err();
            assert_eq!(err.conflict_report().map(|r| r.len()), Some(1));
        }
    }

    #[test]
    fn test_warn_policy_leaves_conflicting_writes_in_batch_order() {
        let config = EngineConfig::with_conflict_policy(ConflictPolicy::Warn);
        assert_eq!(register_race(config.clone(), false).unwrap(), 2);
        assert_eq!(register_race(config, true).unwrap(), 1);
    }

    #[test]
    fn test_spawned_child_runs_in_the_same_instant() {
        let (store, topic, counter) = counter_store();
        let mut harness = Harness::new(store);
        harness.engine.schedule_task(
            secs(1),
            Box::new(task::from_fn(move |scheduler| {
                scheduler.emit(&topic, 1);
                scheduler.spawn_task(task::from_fn(move |scheduler| {
                    // The child sees its parent's earlier emission.
                    let seen = scheduler.get(&counter)?;
                    scheduler.emit(&topic, seen * 10);
                    Ok(TaskStatus::completed(()))
                }));
                Ok(TaskStatus::completed(()))
            })),
        );

        let batch = harness.step(secs(10)).unwrap().unwrap();
        assert_eq!(batch.offset, secs(1));
        assert_eq!(harness.cells.state(&counter), Some(&11));
    }
}
