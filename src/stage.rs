//! Stage scheduling — the declared concurrency ramp as a pure function of time.
//!
//! A list of [`Stage`]s defines a piecewise-linear target-VU curve over
//! cumulative elapsed time. Within each stage the target is interpolated
//! linearly from the previous stage's target (0 for the first stage of a
//! ramp schedule) to the stage's own target. [`StageSchedule::target_at`]
//! has no hidden state, which keeps pool reconciliation deterministic and
//! easy to test.

use std::time::Duration;

use crate::error::Error;

/// A stage defines a target VU count and how long to ramp to that target.
///
/// Use `Stage::new(Duration::from_secs(10), 100)` to ramp to 100 VUs over 10s.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    /// Concurrent virtual users to reach by the end of the stage.
    pub target: u64,
}

impl Stage {
    pub fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }
}

/// Whether a point in the schedule sits on a ramp or a hold. Informative
/// only; the engine reconciles both the same way.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Ramp,
    Hold,
}

/// An ordered stage list compiled into a target-concurrency curve.
#[derive(Clone, Debug)]
pub struct StageSchedule {
    start_target: u64,
    stages: Vec<Stage>,
    total: Duration,
}

impl StageSchedule {
    /// Build a schedule that ramps from zero through the given stages.
    ///
    /// Rejects empty stage lists and zero-duration stages before the test
    /// starts.
    pub fn new(stages: Vec<Stage>) -> Result<Self, Error> {
        Self::with_start(0, stages)
    }

    /// Simple mode: a fixed VU count held for a fixed duration, no ramp.
    ///
    /// The full count is active from the first tick, so
    /// `target_at(Duration::ZERO)` is `vus` rather than 0.
    pub fn constant(vus: u64, duration: Duration) -> Result<Self, Error> {
        Self::with_start(vus, vec![Stage::new(duration, vus)])
    }

    fn with_start(start_target: u64, stages: Vec<Stage>) -> Result<Self, Error> {
        if stages.is_empty() {
            return Err(Error::EmptyStages);
        }
        for (index, stage) in stages.iter().enumerate() {
            if stage.duration.is_zero() {
                return Err(Error::ZeroDurationStage { index });
            }
        }
        let total = stages.iter().map(|s| s.duration).sum();
        Ok(Self {
            start_target,
            stages,
            total,
        })
    }

    /// Sum of all stage durations. The run drains once elapsed time passes it.
    pub fn total_duration(&self) -> Duration {
        self.total
    }

    /// Target concurrency at `elapsed` since test start.
    ///
    /// Locates the stage whose cumulative window contains `elapsed` and
    /// interpolates linearly through it. Returns 0 once the schedule is
    /// exhausted.
    pub fn target_at(&self, elapsed: Duration) -> u64 {
        let mut prev = self.start_target;
        let mut offset = Duration::ZERO;
        for stage in &self.stages {
            if elapsed < offset + stage.duration {
                let t = (elapsed - offset).as_secs_f64() / stage.duration.as_secs_f64();
                let from = prev as f64;
                let to = stage.target as f64;
                return (from + (to - from) * t).round() as u64;
            }
            offset += stage.duration;
            prev = stage.target;
        }
        0
    }

    /// Classify `elapsed` as ramping or holding; `None` once the schedule is
    /// exhausted.
    pub fn phase_at(&self, elapsed: Duration) -> Option<Phase> {
        let mut prev = self.start_target;
        let mut offset = Duration::ZERO;
        for stage in &self.stages {
            if elapsed < offset + stage.duration {
                return Some(if stage.target == prev {
                    Phase::Hold
                } else {
                    Phase::Ramp
                });
            }
            offset += stage.duration;
            prev = stage.target;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn reference() -> StageSchedule {
        StageSchedule::new(vec![
            Stage::new(secs(10), 10),
            Stage::new(secs(10), 10),
            Stage::new(secs(10), 100),
        ])
        .unwrap()
    }

    #[test]
    fn ramp_interpolates_between_targets() {
        let schedule = reference();
        assert_eq!(schedule.target_at(secs(0)), 0);
        assert_eq!(schedule.target_at(secs(5)), 5);
        assert_eq!(schedule.target_at(secs(10)), 10);
        assert_eq!(schedule.target_at(secs(15)), 10);
        assert_eq!(schedule.target_at(secs(25)), 55);
    }

    #[test]
    fn exhausted_schedule_targets_zero() {
        let schedule = reference();
        assert_eq!(schedule.total_duration(), secs(30));
        assert_eq!(schedule.target_at(secs(30)), 0);
        assert_eq!(schedule.target_at(secs(1000)), 0);
        assert_eq!(schedule.phase_at(secs(30)), None);
    }

    #[test]
    fn target_is_monotonic_within_a_ramp() {
        let schedule = reference();
        let mut last = 0;
        for ms in (0..=10_000).step_by(250) {
            let target = schedule.target_at(Duration::from_millis(ms));
            assert!(target >= last, "target dipped at {ms}ms");
            last = target;
        }
        assert_eq!(last, 10);
    }

    #[test]
    fn constant_schedule_starts_at_full_count() {
        let schedule = StageSchedule::constant(7, secs(30)).unwrap();
        assert_eq!(schedule.target_at(secs(0)), 7);
        assert_eq!(schedule.target_at(secs(29)), 7);
        assert_eq!(schedule.target_at(secs(30)), 0);
        assert_eq!(schedule.phase_at(secs(5)), Some(Phase::Hold));
    }

    #[test]
    fn phases_distinguish_ramp_from_hold() {
        let schedule = reference();
        assert_eq!(schedule.phase_at(secs(5)), Some(Phase::Ramp));
        assert_eq!(schedule.phase_at(secs(15)), Some(Phase::Hold));
        assert_eq!(schedule.phase_at(secs(25)), Some(Phase::Ramp));
    }

    #[test]
    fn invalid_configurations_are_rejected() {
        assert!(matches!(StageSchedule::new(vec![]), Err(Error::EmptyStages)));
        let err = StageSchedule::new(vec![
            Stage::new(secs(10), 10),
            Stage::new(Duration::ZERO, 20),
        ]);
        assert!(matches!(err, Err(Error::ZeroDurationStage { index: 1 })));
    }
}
