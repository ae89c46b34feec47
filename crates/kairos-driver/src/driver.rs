//! The simulation driver
//!
//! Owns time for one run: it seeds the engine from a mission model, starts
//! the daemon, schedules every directive of a plan, and then alternates
//! between extracting the next batch, bringing the cells up to its instant,
//! and committing what the batch produced.

use crate::config::SimulationConfig;
use crate::directive::{resolve, ResolvedSchedule, Schedule};
use crate::error::{Result, SimulationError};
use crate::model::MissionModel;
use kairos_core::task::{self, TaskStatus};
use kairos_core::{DirectiveId, Duration, LiveCells, Task, TaskId, Timeline, Topic};
use kairos_engine::{compute_results, Batch, EngineConfig, JobId, SimulationEngine, SimulationResults};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Shared flag that stops a running simulation between batches
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
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

/// Which directive each task was started for
#[derive(Debug, Clone, Default)]
struct DirectiveLedger(Arc<Mutex<BTreeMap<TaskId, DirectiveId>>>);

impl DirectiveLedger {
    fn record(&self, task: TaskId, directive: DirectiveId) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task, directive);
    }

    /// The directive of `task` or of its closest recorded ancestor
    fn attribute(&self, task: TaskId, engine: &SimulationEngine) -> Option<DirectiveId> {
        let ledger = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let mut current = Some(task);
        while let Some(task) = current {
            if let Some(directive) = ledger.get(&task) {
                return Some(*directive);
            }
            current = engine.task_parent(task);
        }
        None
    }
}

/// One run's engine, timeline and cells
struct Session<'m> {
    model: &'m MissionModel,
    engine: SimulationEngine,
    timeline: Timeline,
    cells: LiveCells,
    elapsed: Duration,
}

impl<'m> Session<'m> {
    /// Track the model's resources and run the daemon's first step
    fn start(model: &'m MissionModel, config: EngineConfig) -> kairos_engine::Result<Self> {
        let mut session = Session {
            model,
            engine: SimulationEngine::with_config(config),
            timeline: Timeline::new(),
            cells: LiveCells::new(model.initial_cells().clone()),
            elapsed: Duration::ZERO,
        };
        for (name, resource) in model.resources() {
            session
                .engine
                .track_resource(name.clone(), Box::new(Arc::clone(resource)), Duration::ZERO);
        }

        session.engine.schedule_task(Duration::ZERO, model.daemon());
        let batch = session.engine.extract_next_jobs(Duration::MAX);
        session.perform(&batch, Duration::MAX)?;
        Ok(session)
    }

    /// Take the next batch and move time up to it
    fn advance(&mut self, horizon: Duration) -> Batch<JobId> {
        let batch = self.engine.extract_next_jobs(horizon);
        self.timeline.add_delta(batch.offset - self.elapsed);
        self.elapsed = batch.offset;
        batch
    }

    fn perform(&mut self, batch: &Batch<JobId>, horizon: Duration) -> kairos_engine::Result<()> {
        self.cells.catch_up(&self.timeline);
        let graph = self
            .engine
            .perform_jobs(&batch.jobs, &self.cells, self.elapsed, horizon)?;
        self.timeline.add_commit(graph);
        Ok(())
    }

    fn results(&self, start_time: chrono::DateTime<chrono::Utc>) -> SimulationResults {
        compute_results(
            &self.engine,
            start_time,
            self.elapsed,
            &self.timeline,
            self.model.topics(),
            &self.model.activity_topic(),
        )
    }
}

/// Runs plans against a mission model
///
/// ```
/// use kairos_core::Duration;
/// use kairos_driver::{MissionModelBuilder, Schedule, SimulationConfig, Simulator};
///
/// let model = MissionModelBuilder::new().build();
/// let config = SimulationConfig::new(Default::default(), Duration::HOUR);
/// let results = Simulator::new(&model, config).run(&Schedule::new()).unwrap();
/// assert_eq!(results.duration, Duration::HOUR);
/// ```
pub struct Simulator<'m> {
    model: &'m MissionModel,
    config: SimulationConfig,
    cancel: CancelFlag,
    on_extent: Option<Box<dyn FnMut(Duration) + 'm>>,
}

impl<'m> Simulator<'m> {
    pub fn new(model: &'m MissionModel, config: SimulationConfig) -> Self {
        Self {
            model,
            config,
            cancel: CancelFlag::new(),
            on_extent: None,
        }
    }

    /// Stop the run once `flag` is cancelled
    pub fn cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = flag;
        self
    }

    /// Report simulation time reached after every batch
    pub fn on_extent(mut self, callback: impl FnMut(Duration) + 'm) -> Self {
        self.on_extent = Some(Box::new(callback));
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Simulate `schedule` until the configured duration or cancellation
    pub fn run(&mut self, schedule: &Schedule) -> Result<SimulationResults> {
        let start_time = self.config.simulation_start;
        let horizon = self.config.simulation_duration;

        let resolved = resolve(schedule, self.config.plan_offset())?;
        let mut activities = self.instantiate(schedule)?;

        info!(%start_time, %horizon, directives = schedule.len(), "starting simulation");
        self.report_extent(Duration::ZERO);

        let mut session = Session::start(self.model, self.config.engine.clone())
            .map_err(|source| self.failure(source, None, Duration::ZERO))?;

        let ledger = DirectiveLedger::default();
        let activity_topic = self.model.activity_topic();
        for (directive, offset) in &resolved.roots {
            if let Some(task) =
                directive_task(*directive, &mut activities, &resolved, activity_topic, &ledger)
            {
                session.engine.schedule_task(*offset, task);
            }
        }

        while !self.cancel.is_cancelled() {
            let batch = session.advance(horizon);
            self.report_extent(session.elapsed);

            if self.cancel.is_cancelled() || (batch.is_empty() && batch.offset == horizon) {
                break;
            }
            if let Err(source) = session.perform(&batch, horizon) {
                let context = Some((&ledger, &session.engine));
                return Err(self.failure(source, context, session.elapsed));
            }
        }

        if self.cancel.is_cancelled() {
            info!(elapsed = %session.elapsed, "simulation cancelled");
        }
        info!(elapsed = %session.elapsed, "simulation finished");
        Ok(session.results(start_time))
    }

    /// Build every directive's task before anything runs
    fn instantiate(&self, schedule: &Schedule) -> Result<BTreeMap<DirectiveId, Box<dyn Task>>> {
        let mut activities = BTreeMap::new();
        for (id, directive) in schedule {
            let task = match self
                .model
                .instantiate(&directive.directive_type, &directive.arguments)
            {
                Some(Ok(task)) => task,
                Some(Err(source)) => {
                    return Err(SimulationError::Instantiation {
                        directive: *id,
                        source,
                    })
                }
                None => {
                    return Err(SimulationError::UnknownDirectiveType {
                        directive: *id,
                        directive_type: directive.directive_type.clone(),
                    })
                }
            };
            activities.insert(*id, task);
        }
        Ok(activities)
    }

    fn report_extent(&mut self, elapsed: Duration) {
        if let Some(callback) = self.on_extent.as_mut() {
            callback(elapsed);
        }
    }

    fn failure(
        &self,
        source: kairos_engine::Error,
        context: Option<(&DirectiveLedger, &SimulationEngine)>,
        elapsed: Duration,
    ) -> SimulationError {
        let start_time = self.config.simulation_start;
        let directive = context.and_then(|(ledger, engine)| {
            source.task().and_then(|task| ledger.attribute(task, engine))
        });
        match directive {
            Some(directive) => {
                warn!(%directive, %elapsed, error = %source, "directive failed");
                SimulationError::Directive {
                    directive,
                    elapsed,
                    start_time,
                    source,
                }
            }
            None => {
                warn!(%elapsed, error = %source, "simulation failed");
                SimulationError::Failed {
                    elapsed,
                    start_time,
                    source,
                }
            }
        }
    }
}

/// Simulate `schedule` against `model` with `config`
pub fn simulate(
    model: &MissionModel,
    schedule: &Schedule,
    config: &SimulationConfig,
) -> Result<SimulationResults> {
    Simulator::new(model, config.clone()).run(schedule)
}

/// Run `task` against `model` until it and its children finish
///
/// Mainly useful for testing activities in isolation. The results cover the
/// run up to the task's completion.
pub fn simulate_task(model: &MissionModel, task: Box<dyn Task>) -> Result<SimulationResults> {
    let start_time = chrono::DateTime::<chrono::Utc>::default();
    let failed = |elapsed, source| SimulationError::Failed {
        elapsed,
        start_time,
        source,
    };

    let mut session = Session::start(model, EngineConfig::default())
        .map_err(|source| failed(Duration::ZERO, source))?;
    let id = session.engine.schedule_task(session.elapsed, task);

    while !session.engine.is_task_complete(id) {
        let batch = session.advance(Duration::MAX);
        if batch.is_empty() {
            return Err(SimulationError::Stalled(session.elapsed));
        }
        session
            .perform(&batch, Duration::MAX)
            .map_err(|source| failed(session.elapsed, source))?;
    }
    debug!(task = %id, elapsed = %session.elapsed, "task finished");
    Ok(session.results(start_time))
}

/// The task that runs one directive: it starts the activity, waits for it to
/// finish, then starts each directive anchored to its end after that
/// directive's offset
fn directive_task(
    directive: DirectiveId,
    activities: &mut BTreeMap<DirectiveId, Box<dyn Task>>,
    resolved: &ResolvedSchedule,
    activity_topic: Topic<DirectiveId>,
    ledger: &DirectiveLedger,
) -> Option<Box<dyn Task>> {
    let activity = activities.remove(&directive)?;
    let dependents: Vec<(Duration, Box<dyn Task>)> = resolved
        .dependents_of(directive)
        .iter()
        .filter_map(|(dependent, offset)| {
            directive_task(*dependent, activities, resolved, activity_topic, ledger)
                .map(|task| (*offset, task))
        })
        .collect();
    let ledger = ledger.clone();

    Some(Box::new(task::from_fn(move |scheduler| {
        ledger.record(scheduler.active_task(), directive);
        let announced = task::and_then(task::emitting(activity_topic, directive), activity);
        let child = scheduler.spawn(Box::new(announced));
        ledger.record(child, directive);

        let dependents = dependents
            .into_iter()
            .map(|(offset, task)| {
                Box::new(task::and_then(task::delaying(offset), task)) as Box<dyn Task>
            })
            .collect();
        Ok(TaskStatus::awaiting_task(child, task::spawning(dependents)))
    })))
}
