//! Conditions that tasks can wait on

use crate::capability::{Querier, QuerierExt};
use crate::cell::Query;
use crate::error::Result;
use crate::time::Duration;

/// A predicate over cell state that a task can block on
pub trait Condition: Send {
    /// The earliest offset from now, within `[0, horizon]`, at which the
    /// condition holds, or `None` if it does not hold within the horizon
    ///
    /// Every cell read through `querier` becomes a dependency: an event on
    /// its topic causes the condition to be evaluated again.
    fn next_satisfied(
        &self,
        querier: &mut dyn Querier,
        horizon: Duration,
    ) -> Result<Option<Duration>>;
}

/// A condition backed by a closure
pub struct FnCondition<F> {
    predicate: F,
}

pub fn from_fn<F>(predicate: F) -> FnCondition<F>
where
    F: Fn(&mut dyn Querier, Duration) -> Result<Option<Duration>> + Send,
{
    FnCondition { predicate }
}

impl<F> Condition for FnCondition<F>
where
    F: Fn(&mut dyn Querier, Duration) -> Result<Option<Duration>> + Send,
{
    fn next_satisfied(
        &self,
        querier: &mut dyn Querier,
        horizon: Duration,
    ) -> Result<Option<Duration>> {
        (self.predicate)(querier, horizon)
    }
}

/// Holds as soon as `predicate` holds for the current state of `query`
///
/// Suitable for cells whose state only changes through events.
pub fn when<S, P>(query: Query<S>, predicate: P) -> impl Condition
where
    S: Clone + 'static,
    P: Fn(&S) -> bool + Send,
{
    from_fn(move |querier: &mut dyn Querier, _horizon| {
        let state = querier.get_state(&query)?;
        Ok(predicate(&state).then_some(Duration::ZERO))
    })
}
