//! Event graphs
//!
//! An [`EventGraph`] records the causal structure of the events emitted during
//! one simulation instant. Events in a `Sequentially` node are ordered; the two
//! sides of a `Concurrently` node happened at the same instant with no ordering
//! between them, and any cell observing both must treat them as commuting.
//!
//! The smart constructors collapse empty subgraphs so a graph is only ever
//! `Empty` at the root.

use serde::{Deserialize, Serialize};

/// A series-parallel graph of events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventGraph<E> {
    Empty,
    Atom(E),
    Sequentially(Box<EventGraph<E>>, Box<EventGraph<E>>),
    Concurrently(Box<EventGraph<E>>, Box<EventGraph<E>>),
}

/// An algebra that event graphs can be evaluated into
///
/// `sequentially` should be associative with `empty` as identity, and
/// `concurrently` should additionally be commutative.
pub trait EffectTrait<T> {
    fn empty(&self) -> T;
    fn sequentially(&self, prefix: T, suffix: T) -> T;
    fn concurrently(&self, left: T, right: T) -> T;
}

impl<E> Default for EventGraph<E> {
    fn default() -> Self {
        EventGraph::Empty
    }
}

impl<E> EventGraph<E> {
    pub fn empty() -> Self {
        EventGraph::Empty
    }

    pub fn atom(event: E) -> Self {
        EventGraph::Atom(event)
    }

    /// `prefix` happens before `suffix`
    pub fn sequentially(prefix: Self, suffix: Self) -> Self {
        match (prefix, suffix) {
            (EventGraph::Empty, suffix) => suffix,
            (prefix, EventGraph::Empty) => prefix,
            (prefix, suffix) => EventGraph::Sequentially(Box::new(prefix), Box::new(suffix)),
        }
    }

    /// `left` and `right` happen at the same instant, unordered
    pub fn concurrently(left: Self, right: Self) -> Self {
        match (left, right) {
            (EventGraph::Empty, right) => right,
            (left, EventGraph::Empty) => left,
            (left, right) => EventGraph::Concurrently(Box::new(left), Box::new(right)),
        }
    }

    /// Build an ordered sequence of atoms
    ///
    /// The resulting tree is balanced so that long sequences stay shallow.
    pub fn sequence(events: impl IntoIterator<Item = E>) -> Self {
        let mut atoms: Vec<Self> = events.into_iter().map(EventGraph::Atom).collect();
        while atoms.len() > 1 {
            let mut paired = Vec::with_capacity(atoms.len().div_ceil(2));
            let mut iter = atoms.into_iter();
            while let Some(first) = iter.next() {
                match iter.next() {
                    Some(second) => paired.push(Self::sequentially(first, second)),
                    None => paired.push(first),
                }
            }
            atoms = paired;
        }
        atoms.pop().unwrap_or(EventGraph::Empty)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, EventGraph::Empty)
    }

    /// Number of atoms in the graph
    pub fn len(&self) -> usize {
        match self {
            EventGraph::Empty => 0,
            EventGraph::Atom(_) => 1,
            EventGraph::Sequentially(a, b) | EventGraph::Concurrently(a, b) => a.len() + b.len(),
        }
    }

    /// Fold the graph into an effect algebra
    pub fn evaluate<T, A, F>(&self, algebra: &A, substitution: &F) -> T
    where
        A: EffectTrait<T>,
        F: Fn(&E) -> T,
    {
        match self {
            EventGraph::Empty => algebra.empty(),
            EventGraph::Atom(event) => substitution(event),
            EventGraph::Sequentially(prefix, suffix) => {
                let prefix = prefix.evaluate(algebra, substitution);
                let suffix = suffix.evaluate(algebra, substitution);
                algebra.sequentially(prefix, suffix)
            }
            EventGraph::Concurrently(left, right) => {
                let left = left.evaluate(algebra, substitution);
                let right = right.evaluate(algebra, substitution);
                algebra.concurrently(left, right)
            }
        }
    }

    /// Visit every atom, left to right
    ///
    /// Sequential atoms are visited in order. Concurrent branches are visited
    /// left branch first, which is only meaningful for commuting observers.
    pub fn for_each<F: FnMut(&E)>(&self, mut f: F) {
        self.visit(&mut f);
    }

    fn visit<F: FnMut(&E)>(&self, f: &mut F) {
        match self {
            EventGraph::Empty => {}
            EventGraph::Atom(event) => f(event),
            EventGraph::Sequentially(a, b) | EventGraph::Concurrently(a, b) => {
                a.visit(f);
                b.visit(f);
            }
        }
    }

    /// All atoms in visiting order
    pub fn atoms(&self) -> Vec<&E> {
        let mut atoms = Vec::with_capacity(self.len());
        self.collect_atoms(&mut atoms);
        atoms
    }

    fn collect_atoms<'a>(&'a self, out: &mut Vec<&'a E>) {
        match self {
            EventGraph::Empty => {}
            EventGraph::Atom(event) => out.push(event),
            EventGraph::Sequentially(a, b) | EventGraph::Concurrently(a, b) => {
                a.collect_atoms(out);
                b.collect_atoms(out);
            }
        }
    }

    pub fn map<F, G: Fn(&E) -> F>(&self, f: G) -> EventGraph<F> {
        self.filter_map(|event| Some(f(event)))
    }

    /// Map atoms, dropping those for which `f` returns `None`
    pub fn filter_map<F, G: Fn(&E) -> Option<F>>(&self, f: G) -> EventGraph<F> {
        self.filter_map_ref(&f)
    }

    fn filter_map_ref<F, G: Fn(&E) -> Option<F>>(&self, f: &G) -> EventGraph<F> {
        match self {
            EventGraph::Empty => EventGraph::Empty,
            EventGraph::Atom(event) => f(event).map_or(EventGraph::Empty, EventGraph::Atom),
            EventGraph::Sequentially(a, b) => {
                EventGraph::sequentially(a.filter_map_ref(f), b.filter_map_ref(f))
            }
            EventGraph::Concurrently(a, b) => {
                EventGraph::concurrently(a.filter_map_ref(f), b.filter_map_ref(f))
            }
        }
    }
}
