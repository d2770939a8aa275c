//! Outbound request pacing.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum interval between consecutive calls.
///
/// The first call goes out immediately; later calls sleep until the interval
/// since the previous call has passed.
#[derive(Debug)]
pub struct Pacer {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Pacer {
    /// Pacer with a fixed interval.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Pacer allowing at most `rate` calls per second.
    #[must_use]
    pub fn per_second(rate: f64) -> Self {
        let interval = if rate.is_finite() && rate > 0.0 {
            Duration::from_secs_f64(1.0 / rate)
        } else {
            Duration::ZERO
        };
        Self::new(interval)
    }

    /// Configured interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait for the next call slot.
    pub async fn wait(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(last) = *last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_second_interval() {
        assert_eq!(Pacer::per_second(5.0).interval(), Duration::from_millis(200));
        assert_eq!(Pacer::per_second(0.0).interval(), Duration::ZERO);
        assert_eq!(Pacer::per_second(f64::NAN).interval(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacer_spaces_calls() {
        let pacer = Pacer::new(Duration::from_secs(1));
        let start = Instant::now();

        pacer.wait().await;
        assert!(start.elapsed() < Duration::from_millis(10));

        pacer.wait().await;
        pacer.wait().await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
