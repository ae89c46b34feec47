//! Resource profiles

use kairos_core::{Duration, Querier, Resource, ResourceKind, Value};
use serde::{Deserialize, Serialize};

/// Dynamics observed at an instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: Duration,
    pub dynamics: Value,
}

/// Dynamics that held for `extent`, starting where the previous segment ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSegment {
    pub extent: Duration,
    pub dynamics: Value,
}

/// Time-ordered samples of one resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    samples: Vec<Sample>,
}

impl Profile {
    /// Append a sample; a second sample at the same time replaces the first
    pub fn append(&mut self, time: Duration, dynamics: Value) {
        if let Some(last) = self.samples.last_mut() {
            if last.time == time {
                last.dynamics = dynamics;
                return;
            }
        }
        self.samples.push(Sample { time, dynamics });
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Convert samples into consecutive segments ending at `end`
    pub fn segments(&self, end: Duration) -> Vec<ProfileSegment> {
        self.samples
            .iter()
            .enumerate()
            .map(|(i, sample)| {
                let until = self.samples.get(i + 1).map_or(end, |next| next.time);
                ProfileSegment {
                    extent: (until - sample.time).max(Duration::ZERO),
                    dynamics: sample.dynamics.clone(),
                }
            })
            .collect()
    }
}

/// A tracked resource and the profile recorded for it so far
pub struct ProfilingState {
    resource: Box<dyn Resource>,
    profile: Profile,
}

impl ProfilingState {
    pub fn new(resource: Box<dyn Resource>) -> Self {
        Self {
            resource,
            profile: Profile::default(),
        }
    }

    /// Sample the resource at `time`
    pub fn append(&mut self, time: Duration, querier: &mut dyn Querier) -> kairos_core::Result<()> {
        let dynamics = self.resource.dynamics(querier)?;
        self.profile.append(time, dynamics);
        Ok(())
    }

    pub fn kind(&self) -> ResourceKind {
        self.resource.kind()
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: i64) -> Duration {
        Duration::of(n, Duration::SECOND)
    }

    #[test]
    fn test_segments_cover_until_end() {
        let mut profile = Profile::default();
        profile.append(secs(0), Value::Int(1));
        profile.append(secs(2), Value::Int(5));
        profile.append(secs(2), Value::Int(6));

        assert_eq!(profile.samples().len(), 2);
        assert_eq!(
            profile.segments(secs(10)),
            vec![
                ProfileSegment {
                    extent: secs(2),
                    dynamics: Value::Int(1)
                },
                ProfileSegment {
                    extent: secs(8),
                    dynamics: Value::Int(6)
                },
            ]
        );
    }
}
