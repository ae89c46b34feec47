//! Mission models
//!
//! A mission model bundles what a simulation needs from the outside world:
//! topics, initial cells, tracked resources, a daemon, and the directive types
//! a plan may instantiate. Models are built once with [`MissionModelBuilder`]
//! and can then be simulated any number of times.

use indexmap::IndexMap;
use kairos_core::task::{self, TaskStatus};
use kairos_core::{
    CellModel, CellStore, DirectiveId, Query, Resource, ResourceId, Scheduler, SchedulerExt,
    Task, Topic, TopicRegistry, Value, ValueMap,
};
use kairos_engine::results::{INPUT_TOPIC_PREFIX, OUTPUT_TOPIC_PREFIX};
use std::sync::Arc;

/// A kind of activity that plans can schedule
///
/// Instantiation validates the arguments and builds the task that performs
/// the activity. It runs before anything is scheduled, so a bad argument
/// fails the whole run up front.
pub trait DirectiveType: Send + Sync {
    fn instantiate(&self, arguments: &ValueMap) -> kairos_core::Result<Box<dyn Task>>;
}

impl<F> DirectiveType for F
where
    F: Fn(&ValueMap) -> kairos_core::Result<Box<dyn Task>> + Send + Sync,
{
    fn instantiate(&self, arguments: &ValueMap) -> kairos_core::Result<Box<dyn Task>> {
        self(arguments)
    }
}

type DaemonFactory = Arc<dyn Fn() -> Box<dyn Task> + Send + Sync>;

struct RegisteredType {
    factory: Arc<dyn DirectiveType>,
    input: Topic<ValueMap>,
    output: Topic<Value>,
}

/// Builder for [`MissionModel`]
///
/// # Example
///
/// ```
/// use kairos_core::task;
/// use kairos_core::{Duration, Task, ValueMap};
/// use kairos_driver::MissionModelBuilder;
///
/// let mut builder = MissionModelBuilder::new();
/// builder.directive_type("Wait", |_: &ValueMap| -> kairos_core::Result<Box<dyn Task>> {
///     Ok(Box::new(task::delaying(Duration::SECOND)))
/// });
/// let model = builder.build();
/// assert!(model.has_directive_type("Wait"));
/// ```
pub struct MissionModelBuilder {
    topics: TopicRegistry,
    cells: CellStore,
    resources: Vec<(ResourceId, Arc<dyn Resource>)>,
    daemon: Option<DaemonFactory>,
    directive_types: IndexMap<String, RegisteredType>,
    activity_topic: Topic<DirectiveId>,
}

impl Default for MissionModelBuilder {
    fn default() -> Self {
        let mut topics = TopicRegistry::new();
        let activity_topic = topics.create();
        Self {
            topics,
            cells: CellStore::new(),
            resources: Vec::new(),
            daemon: None,
            directive_types: IndexMap::new(),
            activity_topic,
        }
    }
}

impl MissionModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A topic whose events stay out of the results
    pub fn topic<T>(&mut self) -> Topic<T> {
        self.topics.create()
    }

    /// A topic whose events are serialized into the results
    pub fn register_topic<T, F>(&mut self, name: impl Into<String>, serialize: F) -> Topic<T>
    where
        T: 'static,
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        self.topics.register(name, serialize)
    }

    pub fn allocate<M: CellModel>(
        &mut self,
        model: M,
        initial: M::State,
        topic: &Topic<M::Event>,
    ) -> Query<M::State> {
        self.cells.allocate(model, initial, topic)
    }

    /// Track `resource` from the start of every simulation
    pub fn resource(&mut self, name: impl Into<ResourceId>, resource: impl Resource + 'static) {
        let resource: Arc<dyn Resource> = Arc::new(resource);
        self.resources.push((name.into(), resource));
    }

    /// Set the task started at time zero, before any directive
    pub fn daemon<F>(&mut self, factory: F)
    where
        F: Fn() -> Box<dyn Task> + Send + Sync + 'static,
    {
        self.daemon = Some(Arc::new(factory));
    }

    /// Define a directive type; its input and output topics are registered
    /// alongside it
    pub fn directive_type(&mut self, name: impl Into<String>, factory: impl DirectiveType + 'static) {
        let name = name.into();
        let input = self.topics.register(
            format!("{INPUT_TOPIC_PREFIX}{name}"),
            |arguments: &ValueMap| Value::Map(arguments.clone()),
        );
        let output = self
            .topics
            .register(format!("{OUTPUT_TOPIC_PREFIX}{name}"), |value: &Value| {
                value.clone()
            });
        self.directive_types.insert(
            name,
            RegisteredType {
                factory: Arc::new(factory),
                input,
                output,
            },
        );
    }

    pub fn build(self) -> MissionModel {
        MissionModel {
            topics: self.topics,
            cells: self.cells,
            resources: self.resources,
            daemon: self.daemon,
            directive_types: self.directive_types,
            activity_topic: self.activity_topic,
        }
    }
}

/// Everything a simulation needs from the model being simulated
pub struct MissionModel {
    topics: TopicRegistry,
    cells: CellStore,
    resources: Vec<(ResourceId, Arc<dyn Resource>)>,
    daemon: Option<DaemonFactory>,
    directive_types: IndexMap<String, RegisteredType>,
    activity_topic: Topic<DirectiveId>,
}

impl MissionModel {
    pub fn topics(&self) -> &TopicRegistry {
        &self.topics
    }

    pub fn initial_cells(&self) -> &CellStore {
        &self.cells
    }

    /// Resources in registration order
    pub fn resources(&self) -> impl Iterator<Item = (&ResourceId, &Arc<dyn Resource>)> {
        self.resources.iter().map(|(name, resource)| (name, resource))
    }

    /// Topic on which each directive's activity announces its directive id
    pub fn activity_topic(&self) -> Topic<DirectiveId> {
        self.activity_topic
    }

    /// A fresh daemon task; a model without one gets a task that finishes at once
    pub fn daemon(&self) -> Box<dyn Task> {
        match &self.daemon {
            Some(factory) => factory(),
            None => Box::new(task::from_fn(|_| Ok(TaskStatus::completed(())))),
        }
    }

    pub fn has_directive_type(&self, name: &str) -> bool {
        self.directive_types.contains_key(name)
    }

    pub fn directive_types(&self) -> impl Iterator<Item = &str> {
        self.directive_types.keys().map(String::as_str)
    }

    /// Build the task for one activity, or `None` for an unknown type
    ///
    /// The task emits its arguments on the type's input topic, runs the
    /// activity, and emits the activity's return value on the output topic.
    pub fn instantiate(
        &self,
        directive_type: &str,
        arguments: &ValueMap,
    ) -> Option<kairos_core::Result<Box<dyn Task>>> {
        let registered = self.directive_types.get(directive_type)?;
        Some(registered.factory.instantiate(arguments).map(|activity| {
            let input = registered.input;
            let arguments = arguments.clone();
            let announce = task::from_fn(move |scheduler: &mut dyn Scheduler| {
                scheduler.emit(&input, arguments);
                Ok(TaskStatus::completed(()))
            });
            let body: Box<dyn Task> = Box::new(task::and_then(
                announce,
                ReportingOutput {
                    inner: activity,
                    output: registered.output,
                },
            ));
            body
        }))
    }
}

/// Emits the wrapped task's return value once it completes
struct ReportingOutput {
    inner: Box<dyn Task>,
    output: Topic<Value>,
}

impl Task for ReportingOutput {
    fn step(self: Box<Self>, scheduler: &mut dyn Scheduler) -> kairos_core::Result<TaskStatus> {
        let ReportingOutput { inner, output } = *self;
        match inner.step(scheduler)? {
            TaskStatus::Completed(value) => {
                scheduler.emit(&output, value.clone());
                Ok(TaskStatus::Completed(value))
            }
            status => Ok(status.map_continuation(|rest| {
                Box::new(ReportingOutput {
                    inner: rest,
                    output,
                })
            })),
        }
    }
}
