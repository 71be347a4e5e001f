//! Redelivery policy: exponential backoff up to a maximum number of
//! attempts, after which a message is poison-acked (testable property 8:
//! redelivery monotonicity — successive computed delays never decrease
//! until the cap is hit).

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RedeliveryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub use_exponential_backoff: bool,
    pub maximum_redeliveries: u32,
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 5.0,
            use_exponential_backoff: false,
            maximum_redeliveries: 6,
        }
    }
}

impl RedeliveryPolicy {
    /// Delay before the `redelivery_count`th redelivery attempt
    /// (`redelivery_count` is 1 for the first redelivery).
    #[must_use]
    pub fn delay_for(&self, redelivery_count: u32) -> Duration {
        if !self.use_exponential_backoff || redelivery_count <= 1 {
            return self.initial_delay.min(self.max_delay);
        }
        #[allow(clippy::cast_precision_loss, reason = "redelivery counts are small in practice")]
        let factor = self.backoff_multiplier.powi((redelivery_count - 1) as i32);
        let scaled_millis = (self.initial_delay.as_millis() as f64 * factor) as u64;
        Duration::from_millis(scaled_millis).min(self.max_delay)
    }

    /// Whether `redelivery_count` has exceeded the policy's cap and the
    /// message should be poison-acked instead of redelivered again.
    #[must_use]
    pub const fn is_poison(&self, redelivery_count: u32) -> bool {
        redelivery_count > self.maximum_redeliveries
    }
}
