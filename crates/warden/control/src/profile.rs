//! Sampling profiler runs
//!
//! At most one profile runs per container. It is an ordinary supervised
//! task, so it shows up in task listings and can be cancelled like any
//! other; [`RegionContainer::stop_profile`] is a shortcut for that.

use crate::container::RegionContainer;
use crate::error::{ControlError, Result};
use std::time::Duration;
use tracing::info;
use warden_supervisor::{Probe, SampleReport, Sampler, SubmitOptions, TaskHandle, TaskId};

pub const MIN_PROFILE_DURATION: Duration = Duration::from_secs(60);
pub const MAX_PROFILE_DURATION: Duration = Duration::from_secs(10 * 60);
pub const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(1);
pub const MAX_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// How long to sample and how often
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileRequest {
    duration: Duration,
    interval: Duration,
}

impl ProfileRequest {
    pub fn new(duration: Duration, interval: Duration) -> Result<Self> {
        if !(MIN_PROFILE_DURATION..=MAX_PROFILE_DURATION).contains(&duration) {
            return Err(ControlError::InvalidArgument(format!(
                "profile duration must be between 1 and 10 minutes, got {}s",
                duration.as_secs()
            )));
        }
        if !(MIN_SAMPLE_INTERVAL..=MAX_SAMPLE_INTERVAL).contains(&interval) {
            return Err(ControlError::InvalidArgument(format!(
                "sample interval must be between 1 and 100 ms, got {}ms",
                interval.as_millis()
            )));
        }
        Ok(Self { duration, interval })
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for ProfileRequest {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(5 * 60),
            interval: Duration::from_millis(20),
        }
    }
}

impl RegionContainer {
    /// Start sampling `probe`. Fails with `AlreadyRunning` while another
    /// profile is in progress.
    pub fn profile<P: Probe>(
        &self,
        owner: &str,
        probe: P,
        request: ProfileRequest,
    ) -> Result<TaskHandle<SampleReport<P::Sample>>> {
        let slot = &self.shared.profiler;
        let guard = slot.enter()?;
        let generation = guard.generation();
        let handle = self.supervisor.submit(
            "Profiling",
            owner,
            SubmitOptions::on("profiler"),
            move |cancel| async move {
                let _guard = guard;
                Sampler::new(probe, request.interval, request.duration)
                    .run(cancel)
                    .await
            },
        )?;
        slot.annotate(generation, handle.id());
        info!(task_id = %handle.id(), duration_secs = request.duration.as_secs(), "Profile started");
        Ok(handle)
    }

    /// Cancel the running profile; returns its task id.
    pub fn stop_profile(&self) -> Result<TaskId> {
        let id = self
            .shared
            .profiler
            .current()
            .ok_or(ControlError::NoActiveProfile)?;
        self.supervisor.cancel(id)?;
        Ok(id)
    }
}
