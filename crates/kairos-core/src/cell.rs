//! Cells: the state of a mission model
//!
//! A cell is a piece of model state that evolves only by reacting to the events
//! on its topic and by stepping forward through time. Cells live in an arena
//! ([`CellStore`]) and are addressed through typed [`Query`] handles.
//!
//! [`LiveCells`] holds the cell states as of the end of a [`Timeline`]. It is
//! brought up to date by replaying only the part of the timeline it has not
//! seen yet.

use crate::error::{Error, Result};
use crate::graph::EventGraph;
use crate::identity::{CellId, TopicId};
use crate::time::Duration;
use crate::timeline::{TimePoint, Timeline};
use crate::topic::{Event, Topic};
use indexmap::IndexMap;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Behavior of one kind of cell
///
/// # Example
///
/// ```
/// use kairos_core::{CellModel, CellStore, TopicRegistry};
///
/// struct Counter;
///
/// impl CellModel for Counter {
///     type State = i64;
///     type Event = i64;
///
///     fn apply(&self, state: &mut i64, delta: &i64) {
///         *state += delta;
///     }
///
///     fn commutes(&self) -> bool {
///         true
///     }
/// }
///
/// let mut topics = TopicRegistry::new();
/// let topic = topics.create::<i64>();
/// let mut cells = CellStore::new();
/// let query = cells.allocate(Counter, 10, &topic);
/// assert_eq!(cells.state(&query), Some(&10));
/// ```
pub trait CellModel: Send + Sync + 'static {
    type State: Clone + Send + Sync + 'static;
    type Event: Send + Sync + 'static;

    /// React to one event on the cell's topic
    fn apply(&self, state: &mut Self::State, event: &Self::Event);

    /// Advance the state through `elapsed` time with no events
    fn step(&self, state: &mut Self::State, elapsed: Duration) {
        let _ = (state, elapsed);
    }

    /// How long until the current state stops being a valid basis for
    /// decisions, or `None` if it stays valid until the next event
    fn expiry(&self, state: &Self::State) -> Option<Duration> {
        let _ = state;
        None
    }

    /// Whether applying concurrent events in either order yields the same state
    fn commutes(&self) -> bool {
        false
    }
}

trait ErasedCell: Send + Sync {
    fn topic(&self) -> TopicId;
    fn apply(&mut self, event: &Event);
    fn step(&mut self, elapsed: Duration);
    fn expiry(&self) -> Option<Duration>;
    fn commutes(&self) -> bool;
    fn state(&self) -> &dyn Any;
    fn state_type(&self) -> &'static str;
    fn box_clone(&self) -> Box<dyn ErasedCell>;
}

struct Slot<M: CellModel> {
    model: Arc<M>,
    topic: Topic<M::Event>,
    state: M::State,
}

impl<M: CellModel> ErasedCell for Slot<M> {
    fn topic(&self) -> TopicId {
        self.topic.id()
    }

    fn apply(&mut self, event: &Event) {
        if let Some(payload) = event.extract(&self.topic) {
            self.model.apply(&mut self.state, payload);
        }
    }

    fn step(&mut self, elapsed: Duration) {
        self.model.step(&mut self.state, elapsed);
    }

    fn expiry(&self) -> Option<Duration> {
        self.model.expiry(&self.state)
    }

    fn commutes(&self) -> bool {
        self.model.commutes()
    }

    fn state(&self) -> &dyn Any {
        &self.state
    }

    fn state_type(&self) -> &'static str {
        std::any::type_name::<M::State>()
    }

    fn box_clone(&self) -> Box<dyn ErasedCell> {
        Box::new(Slot {
            model: Arc::clone(&self.model),
            topic: self.topic,
            state: self.state.clone(),
        })
    }
}

/// A type-erased cell: its model, its topic and its current state
pub struct Cell {
    inner: Box<dyn ErasedCell>,
}

impl Cell {
    pub fn topic(&self) -> TopicId {
        self.inner.topic()
    }

    /// Apply an event; events on other topics are ignored
    pub fn apply(&mut self, event: &Event) {
        self.inner.apply(event);
    }

    /// Apply every event of a graph that concerns this cell, in visiting order
    pub fn apply_graph(&mut self, graph: &EventGraph<Event>) {
        let topic = self.topic();
        graph.for_each(|event| {
            if event.topic() == topic {
                self.inner.apply(event);
            }
        });
    }

    pub fn step(&mut self, elapsed: Duration) {
        self.inner.step(elapsed);
    }

    pub fn expiry(&self) -> Option<Duration> {
        self.inner.expiry()
    }

    pub fn commutes(&self) -> bool {
        self.inner.commutes()
    }

    pub fn state(&self) -> &dyn Any {
        self.inner.state()
    }

    /// Borrow the state with its concrete type
    pub fn downcast<S: 'static>(&self, id: CellId) -> Result<&S> {
        self.inner
            .state()
            .downcast_ref::<S>()
            .ok_or(Error::StateTypeMismatch {
                cell: id,
                expected: std::any::type_name::<S>(),
            })
    }
}

impl Clone for Cell {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.box_clone(),
        }
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("topic", &self.topic())
            .field("state", &self.inner.state_type())
            .finish()
    }
}

/// Typed handle to a cell
pub struct Query<S> {
    cell: CellId,
    _marker: PhantomData<fn() -> S>,
}

impl<S> Query<S> {
    pub fn cell(&self) -> CellId {
        self.cell
    }
}

impl<S> Clone for Query<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for Query<S> {}

impl<S> fmt::Debug for Query<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Query({})", self.cell)
    }
}

/// Arena of cells, indexed by [`CellId`]
#[derive(Debug, Clone, Default)]
pub struct CellStore {
    cells: Vec<Cell>,
    by_topic: IndexMap<TopicId, Vec<CellId>>,
}

impl CellStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cell listening to `topic`
    pub fn allocate<M: CellModel>(
        &mut self,
        model: M,
        initial: M::State,
        topic: &Topic<M::Event>,
    ) -> Query<M::State> {
        let id = CellId(self.cells.len());
        self.cells.push(Cell {
            inner: Box::new(Slot {
                model: Arc::new(model),
                topic: *topic,
                state: initial,
            }),
        });
        self.by_topic.entry(topic.id()).or_default().push(id);
        Query {
            cell: id,
            _marker: PhantomData,
        }
    }

    pub fn get(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(id.0)
    }

    pub fn get_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        self.cells.get_mut(id.0)
    }

    /// Typed read of a cell's state
    pub fn state<S: 'static>(&self, query: &Query<S>) -> Option<&S> {
        self.get(query.cell)?.state().downcast_ref::<S>()
    }

    /// Cells listening to `topic`, in allocation order
    pub fn cells_for(&self, topic: TopicId) -> &[CellId] {
        self.by_topic.get(&topic).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True if every cell listening to `topic` commutes (vacuously true)
    pub fn topic_commutes(&self, topic: TopicId) -> bool {
        self.cells_for(topic)
            .iter()
            .filter_map(|id| self.get(*id))
            .all(Cell::commutes)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CellId, &Cell)> {
        self.cells.iter().enumerate().map(|(i, cell)| (CellId(i), cell))
    }

    fn step_all(&mut self, elapsed: Duration) {
        for cell in &mut self.cells {
            cell.step(elapsed);
        }
    }

    fn apply_graph(&mut self, graph: &EventGraph<Event>) {
        let Self { cells, by_topic } = self;
        graph.for_each(|event| {
            if let Some(ids) = by_topic.get(&event.topic()) {
                for id in ids {
                    cells[id.0].apply(event);
                }
            }
        });
    }
}

/// Cell states as of some position in a [`Timeline`]
#[derive(Debug, Clone)]
pub struct LiveCells {
    cells: CellStore,
    position: usize,
}

impl LiveCells {
    /// Start from the initial cell states, at the beginning of the timeline
    pub fn new(initial: CellStore) -> Self {
        Self {
            cells: initial,
            position: 0,
        }
    }

    /// Rebuild cell states from scratch by replaying a whole timeline
    pub fn replay(initial: &CellStore, timeline: &Timeline) -> Self {
        let mut cells = Self::new(initial.clone());
        cells.catch_up(timeline);
        cells
    }

    /// Replay the points of `timeline` not yet seen
    pub fn catch_up(&mut self, timeline: &Timeline) {
        let points = timeline.points();
        for point in points.iter().skip(self.position) {
            match point {
                TimePoint::Delta(elapsed) => self.cells.step_all(*elapsed),
                TimePoint::Commit(graph) => self.cells.apply_graph(graph),
            }
        }
        self.position = points.len();
    }

    /// Number of timeline points already replayed
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn get(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(id)
    }

    pub fn state<S: 'static>(&self, query: &Query<S>) -> Option<&S> {
        self.cells.state(query)
    }

    pub fn store(&self) -> &CellStore {
        &self.cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::TaskId;
    use crate::topic::TopicRegistry;

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

    /// Remaining time on a countdown; expires when it reaches zero
    struct Countdown;

    impl CellModel for Countdown {
        type State = Duration;
        type Event = Duration;

        fn apply(&self, state: &mut Duration, reset: &Duration) {
            *state = *reset;
        }

        fn step(&self, state: &mut Duration, elapsed: Duration) {
            *state = (*state - elapsed).max(Duration::ZERO);
        }

        fn expiry(&self, state: &Duration) -> Option<Duration> {
            Some(*state)
        }
    }

    #[test]
    fn test_allocate_and_read() {
        let mut topics = TopicRegistry::new();
        let topic = topics.create::<i64>();
        let mut store = CellStore::new();
        let a = store.allocate(Counter, 1, &topic);
        let b = store.allocate(Counter, 2, &topic);

        assert_eq!(store.len(), 2);
        assert_eq!(store.state(&a), Some(&1));
        assert_eq!(store.state(&b), Some(&2));
        assert_eq!(store.cells_for(topic.id()), &[a.cell(), b.cell()]);
        assert!(store.topic_commutes(topic.id()));
    }

    #[test]
    fn test_downcast_mismatch_is_an_error() {
        let mut topics = TopicRegistry::new();
        let topic = topics.create::<i64>();
        let mut store = CellStore::new();
        let q = store.allocate(Counter, 1, &topic);
        let cell = store.get(q.cell()).unwrap();
        assert!(matches!(
            cell.downcast::<String>(q.cell()),
            Err(Error::StateTypeMismatch { .. })
        ));
        assert_eq!(cell.downcast::<i64>(q.cell()).unwrap(), &1);
    }

    #[test]
    fn test_live_cells_catch_up_incrementally() {
        let mut topics = TopicRegistry::new();
        let add = topics.create::<i64>();
        let reset = topics.create::<Duration>();
        let mut store = CellStore::new();
        let counter = store.allocate(Counter, 0, &add);
        let countdown = store.allocate(Countdown, Duration::of(10, Duration::SECOND), &reset);

        let mut timeline = Timeline::new();
        let mut live = LiveCells::new(store.clone());

        timeline.add_commit(EventGraph::sequence([
            Event::new(&add, 2, TaskId::new(0)),
            Event::new(&add, 3, TaskId::new(0)),
        ]));
        timeline.add_delta(Duration::of(4, Duration::SECOND));
        live.catch_up(&timeline);
        assert_eq!(live.state(&counter), Some(&5));
        assert_eq!(live.state(&countdown), Some(&Duration::of(6, Duration::SECOND)));
        assert_eq!(
            live.get(countdown.cell()).unwrap().expiry(),
            Some(Duration::of(6, Duration::SECOND))
        );

        timeline.add_commit(EventGraph::atom(Event::new(&add, -1, TaskId::new(1))));
        live.catch_up(&timeline);
        assert_eq!(live.state(&counter), Some(&4));
        assert_eq!(live.position(), timeline.len());

        let rebuilt = LiveCells::replay(&store, &timeline);
        assert_eq!(rebuilt.state(&counter), Some(&4));
        assert_eq!(store.state(&counter), Some(&0));
    }
}
