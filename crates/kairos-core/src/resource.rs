//! Resources: observable quantities sampled into profiles

use crate::capability::{Querier, QuerierExt};
use crate::cell::Query;
use crate::error::Result;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How a resource's dynamics should be interpreted in results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Piecewise-constant values
    Discrete,
    /// Piecewise-linear values, sampled as [`RealDynamics`]
    Real,
}

/// A named quantity derived from cell state
pub trait Resource: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Sample the current dynamics; cells read become dependencies
    fn dynamics(&self, querier: &mut dyn Querier) -> Result<Value>;
}

impl<R: Resource + ?Sized> Resource for Arc<R> {
    fn kind(&self) -> ResourceKind {
        (**self).kind()
    }

    fn dynamics(&self, querier: &mut dyn Querier) -> Result<Value> {
        (**self).dynamics(querier)
    }
}

/// A linear segment: `initial + rate * t`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RealDynamics {
    pub initial: f64,
    /// Change per second
    pub rate: f64,
}

impl RealDynamics {
    pub fn constant(value: f64) -> Self {
        Self {
            initial: value,
            rate: 0.0,
        }
    }

    pub fn linear(initial: f64, rate: f64) -> Self {
        Self { initial, rate }
    }
}

impl From<RealDynamics> for Value {
    fn from(dynamics: RealDynamics) -> Self {
        Value::map([
            ("initial", Value::Float(dynamics.initial)),
            ("rate", Value::Float(dynamics.rate)),
        ])
    }
}

/// A resource backed by a closure
pub struct FnResource<F> {
    kind: ResourceKind,
    sample: F,
}

pub fn from_fn<F>(kind: ResourceKind, sample: F) -> FnResource<F>
where
    F: Fn(&mut dyn Querier) -> Result<Value> + Send + Sync,
{
    FnResource { kind, sample }
}

impl<F> Resource for FnResource<F>
where
    F: Fn(&mut dyn Querier) -> Result<Value> + Send + Sync,
{
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn dynamics(&self, querier: &mut dyn Querier) -> Result<Value> {
        (self.sample)(querier)
    }
}

/// A discrete resource that reports one cell's state
pub fn discrete<S, F>(query: Query<S>, to_value: F) -> impl Resource
where
    S: Clone + 'static,
    F: Fn(&S) -> Value + Send + Sync,
{
    from_fn(ResourceKind::Discrete, move |querier: &mut dyn Querier| {
        Ok(to_value(&querier.get_state(&query)?))
    })
}

/// A real resource computed from one cell's state
pub fn real<S, F>(query: Query<S>, to_dynamics: F) -> impl Resource
where
    S: Clone + 'static,
    F: Fn(&S) -> RealDynamics + Send + Sync,
{
    from_fn(ResourceKind::Real, move |querier: &mut dyn Querier| {
        Ok(to_dynamics(&querier.get_state(&query)?).into())
    })
}
