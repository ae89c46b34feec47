//! Bidirectional index between waiters and the topics they depend on
//!
//! Subscriptions are one-shot: invalidating a topic removes every waiter
//! subscribed to it (from all of its topics) and hands them back. A waiter that
//! wants to keep listening must subscribe again.

use std::collections::{BTreeMap, BTreeSet};

/// Index of `Waiter -> {Topic}` and `Topic -> {Waiter}`
#[derive(Debug, Clone)]
pub struct Subscriptions<Topic, Waiter> {
    topics_by_waiter: BTreeMap<Waiter, BTreeSet<Topic>>,
    waiters_by_topic: BTreeMap<Topic, BTreeSet<Waiter>>,
}

impl<Topic, Waiter> Default for Subscriptions<Topic, Waiter> {
    fn default() -> Self {
        Self {
            topics_by_waiter: BTreeMap::new(),
            waiters_by_topic: BTreeMap::new(),
        }
    }
}

impl<Topic: Ord + Clone, Waiter: Ord + Clone> Subscriptions<Topic, Waiter> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `waiter` depend on exactly `topics`, replacing what it depended on
    pub fn subscribe_query(&mut self, waiter: Waiter, topics: impl IntoIterator<Item = Topic>) {
        self.unsubscribe_query(&waiter);
        let topics: BTreeSet<Topic> = topics.into_iter().collect();
        for topic in &topics {
            self.waiters_by_topic
                .entry(topic.clone())
                .or_default()
                .insert(waiter.clone());
        }
        self.topics_by_waiter.insert(waiter, topics);
    }

    /// Remove every subscription of `waiter`
    pub fn unsubscribe_query(&mut self, waiter: &Waiter) {
        let Some(topics) = self.topics_by_waiter.remove(waiter) else {
            return;
        };
        for topic in topics {
            if let Some(waiters) = self.waiters_by_topic.get_mut(&topic) {
                waiters.remove(waiter);
                if waiters.is_empty() {
                    self.waiters_by_topic.remove(&topic);
                }
            }
        }
    }

    /// Remove and return every waiter subscribed to `topic`, in order
    ///
    /// Each returned waiter loses all of its subscriptions, not just this one.
    pub fn invalidate_topic(&mut self, topic: &Topic) -> Vec<Waiter> {
        let Some(waiters) = self.waiters_by_topic.remove(topic) else {
            return Vec::new();
        };
        for waiter in &waiters {
            self.unsubscribe_query(waiter);
        }
        waiters.into_iter().collect()
    }

    /// Topics `waiter` currently depends on
    pub fn topics_of(&self, waiter: &Waiter) -> Option<&BTreeSet<Topic>> {
        self.topics_by_waiter.get(waiter)
    }

    pub fn is_subscribed(&self, waiter: &Waiter) -> bool {
        self.topics_by_waiter.contains_key(waiter)
    }

    /// Number of subscribed waiters
    pub fn len(&self) -> usize {
        self.topics_by_waiter.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics_by_waiter.is_empty()
    }
}
