//! Topics, events and the topic registry
//!
//! A [`Topic`] is a typed event channel. Tasks emit payloads on topics; cells
//! listen to exactly one topic. An [`Event`] is a type-erased payload tagged with
//! its topic and with the task that emitted it (its provenance).

use crate::identity::{TaskId, TopicId};
use crate::value::Value;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A typed event channel
pub struct Topic<T> {
    id: TopicId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Topic<T> {
    pub(crate) fn new(id: TopicId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> TopicId {
        self.id
    }
}

impl<T> Clone for Topic<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Topic<T> {}

impl<T> PartialEq for Topic<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Topic<T> {}

impl<T> fmt::Debug for Topic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Topic({})", self.id.0)
    }
}

/// Type-erased event payload
pub type Payload = Arc<dyn Any + Send + Sync>;

/// A single emitted event
#[derive(Clone)]
pub struct Event {
    topic: TopicId,
    payload: Payload,
    provenance: TaskId,
}

impl Event {
    /// Create a typed event
    pub fn new<T: Send + Sync + 'static>(topic: &Topic<T>, value: T, provenance: TaskId) -> Self {
        Self {
            topic: topic.id,
            payload: Arc::new(value),
            provenance,
        }
    }

    /// Create an event from an already erased payload
    pub fn erased(topic: TopicId, payload: Payload, provenance: TaskId) -> Self {
        Self {
            topic,
            payload,
            provenance,
        }
    }

    pub fn topic(&self) -> TopicId {
        self.topic
    }

    /// The task that emitted this event
    pub fn provenance(&self) -> TaskId {
        self.provenance
    }

    /// Read the payload if this event was emitted on `topic`
    pub fn extract<T: 'static>(&self, topic: &Topic<T>) -> Option<&T> {
        if self.topic != topic.id {
            return None;
        }
        self.payload.downcast_ref::<T>()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("topic", &self.topic)
            .field("provenance", &self.provenance)
            .finish()
    }
}

type Serializer = Arc<dyn Fn(&Event) -> Option<Value> + Send + Sync>;

/// A named topic whose events can be written into results
#[derive(Clone)]
pub struct SerializableTopic {
    name: String,
    id: TopicId,
    serializer: Serializer,
}

impl SerializableTopic {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> TopicId {
        self.id
    }

    /// Serialize `event`, or `None` if it was not emitted on this topic
    pub fn serialize(&self, event: &Event) -> Option<Value> {
        if event.topic() != self.id {
            return None;
        }
        (self.serializer)(event)
    }
}

impl fmt::Debug for SerializableTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializableTopic")
            .field("name", &self.name)
            .field("id", &self.id)
            .finish()
    }
}

/// Issues topic ids and remembers which topics are serializable
///
/// # Example
///
/// ```
/// use kairos_core::{TopicRegistry, Value};
///
/// let mut topics = TopicRegistry::new();
/// let hidden = topics.create::<u32>();
/// let power = topics.register::<f64, _>("power", |watts| Value::Float(*watts));
/// assert_ne!(hidden.id(), power.id());
/// assert_eq!(topics.serializable().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TopicRegistry {
    next_id: u64,
    serializable: Vec<SerializableTopic>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an anonymous topic whose events never appear in results
    pub fn create<T>(&mut self) -> Topic<T> {
        let id = TopicId(self.next_id);
        self.next_id += 1;
        Topic::new(id)
    }

    /// Create a named topic with a serializer for results
    pub fn register<T, F>(&mut self, name: impl Into<String>, serialize: F) -> Topic<T>
    where
        T: 'static,
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        let topic = self.create::<T>();
        let serializer: Serializer =
            Arc::new(move |event: &Event| event.extract(&topic).map(&serialize));
        self.serializable.push(SerializableTopic {
            name: name.into(),
            id: topic.id(),
            serializer,
        });
        topic
    }

    /// All serializable topics, in registration order
    pub fn serializable(&self) -> &[SerializableTopic] {
        &self.serializable
    }

    pub fn find(&self, name: &str) -> Option<&SerializableTopic> {
        self.serializable.iter().find(|topic| topic.name == name)
    }

    pub fn get(&self, id: TopicId) -> Option<&SerializableTopic> {
        self.serializable.iter().find(|topic| topic.id == id)
    }
}
