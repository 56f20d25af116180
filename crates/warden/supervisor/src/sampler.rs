//! Fixed-rate sampling inside a supervised task

use crate::cancel::CancelToken;
use crate::error::TaskError;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Something that can be sampled repeatedly, e.g. the host's main thread.
pub trait Probe: Send + 'static {
    type Sample: Send + 'static;

    /// Take one sample; `None` skips this tick.
    fn sample(&mut self) -> Option<Self::Sample>;
}

/// Samples collected by a finished [`Sampler`] run
#[derive(Debug, Clone, PartialEq)]
pub struct SampleReport<S> {
    pub samples: Vec<S>,
    pub ticks: u64,
    pub elapsed: Duration,
    pub interval: Duration,
}

impl<S: Ord + Clone> SampleReport<S> {
    /// How often each distinct sample was seen.
    pub fn histogram(&self) -> BTreeMap<S, usize> {
        let mut counts = BTreeMap::new();
        for sample in &self.samples {
            *counts.entry(sample.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// Runs a probe every `interval` until `duration` elapses
#[derive(Debug)]
pub struct Sampler<P> {
    probe: P,
    interval: Duration,
    duration: Duration,
}

impl<P: Probe> Sampler<P> {
    pub fn new(probe: P, interval: Duration, duration: Duration) -> Self {
        Self {
            probe,
            interval: interval.max(Duration::from_millis(1)),
            duration,
        }
    }

    /// Sample until the duration is up. Stops with `Cancelled` if the token
    /// fires first.
    pub async fn run(mut self, cancel: CancelToken) -> Result<SampleReport<P::Sample>, TaskError> {
        let started = Instant::now();
        let deadline = started + self.duration;
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut samples = Vec::new();
        let mut ticks = 0u64;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(ticks, "Sampler cancelled");
                    return Err(TaskError::Cancelled);
                }
                _ = tokio::time::sleep_until(deadline) => break,
                _ = ticker.tick() => {
                    ticks += 1;
                    if let Some(sample) = self.probe.sample() {
                        samples.push(sample);
                    }
                }
            }
        }
        Ok(SampleReport {
            samples,
            ticks,
            elapsed: started.elapsed(),
            interval: self.interval,
        })
    }
}
