//! Per-stage-class retry policy with exponential backoff.
//!
//! Transient I/O stages (downloads, uploads) are retried a bounded number
//! of times before the job fails. Expensive stateful stages (training,
//! separation, conversion) are never auto-retried: silent retries double
//! resource cost and can mask nondeterministic corruption.

use std::time::Duration;

use rand::Rng;

use crate::pipeline::StageName;

/// Resource class of a stage, which decides its retry and timeout policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageClass {
    /// Network/storage bound. Failures are assumed transient and retried.
    TransientIo,
    /// GPU/CPU bound inference or training. Never auto-retried.
    Compute,
}

impl StageClass {
    pub fn of(stage: StageName) -> StageClass {
        match stage {
            StageName::Downloading | StageName::Uploading => StageClass::TransientIo,
            _ => StageClass::Compute,
        }
    }
}

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts for a transient stage, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Upper bound on the random jitter added to each delay.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `attempt` failures of a
    /// stage in `class`.
    pub fn allows_retry(&self, class: StageClass, attempt: u32) -> bool {
        class == StageClass::TransientIo && attempt < self.max_attempts
    }

    /// Calculate the next backoff delay from the current delay.
    ///
    /// The result is clamped to [`RetryPolicy::max_delay`].
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.multiplier) as u64;
        Duration::from_millis(next_ms).min(self.max_delay)
    }

    /// The deterministic delay plus a uniformly random jitter component.
    pub fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter.is_zero() {
            return delay;
        }
        let jitter_ms = rand::rng().random_range(0..=self.jitter.as_millis() as u64);
        delay + Duration::from_millis(jitter_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_stages_are_transient() {
        assert_eq!(StageClass::of(StageName::Downloading), StageClass::TransientIo);
        assert_eq!(StageClass::of(StageName::Uploading), StageClass::TransientIo);
    }

    #[test]
    fn training_stages_are_compute() {
        assert_eq!(StageClass::of(StageName::ModelTraining), StageClass::Compute);
        assert_eq!(
            StageClass::of(StageName::TrainingChatterbox),
            StageClass::Compute
        );
        assert_eq!(StageClass::of(StageName::Separating), StageClass::Compute);
    }

    #[test]
    fn compute_never_retries() {
        let policy = RetryPolicy::default();
        assert!(!policy.allows_retry(StageClass::Compute, 1));
    }

    #[test]
    fn io_retries_up_to_max_attempts() {
        let policy = RetryPolicy::default();
        assert!(policy.allows_retry(StageClass::TransientIo, 1));
        assert!(policy.allows_retry(StageClass::TransientIo, 2));
        assert!(!policy.allows_retry(StageClass::TransientIo, 3));
    }

    #[test]
    fn next_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.next_delay(Duration::from_secs(2)),
            Duration::from_secs(4)
        );
    }

    #[test]
    fn next_delay_clamps_at_max() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(10),
            ..Default::default()
        };
        assert_eq!(
            policy.next_delay(Duration::from_secs(8)),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn full_backoff_sequence() {
        let policy = RetryPolicy::default();
        let mut delay = policy.initial_delay;
        let expected = [2, 4, 8, 16, 32, 60, 60];

        for &secs in &expected {
            assert_eq!(delay.as_secs(), secs);
            delay = policy.next_delay(delay);
        }
    }

    #[test]
    fn jitter_stays_within_bound() {
        let policy = RetryPolicy {
            jitter: Duration::from_millis(100),
            ..Default::default()
        };
        let base = Duration::from_secs(1);
        for _ in 0..20 {
            let jittered = policy.jittered(base);
            assert!(jittered >= base);
            assert!(jittered <= base + Duration::from_millis(100));
        }
    }

    #[test]
    fn zero_jitter_is_identity() {
        let policy = RetryPolicy {
            jitter: Duration::ZERO,
            ..Default::default()
        };
        let base = Duration::from_secs(3);
        assert_eq!(policy.jittered(base), base);
    }
}
