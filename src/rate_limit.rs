use crate::models::ProviderTier;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Fixed-delay pacing of provider calls, one clock per tier
pub struct RateLimiter {
    last_call: HashMap<ProviderTier, Instant>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            last_call: HashMap::new(),
        }
    }

    /// Wait until the tier's minimum interval has passed since its previous call
    pub async fn wait_for(&mut self, tier: ProviderTier) {
        let mut last_call = self.last_call.get(&tier).copied();
        enforce_min_interval(&mut last_call, tier.min_interval()).await;
        if let Some(now) = last_call {
            self.last_call.insert(tier, now);
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Sleep out the remainder of `min_interval` and stamp the new call time
async fn enforce_min_interval(last_request: &mut Option<Instant>, min_interval: Duration) {
    if let Some(last_time) = *last_request {
        let elapsed = last_time.elapsed();
        if elapsed < min_interval {
            sleep(min_interval - elapsed).await;
        }
    }

    *last_request = Some(Instant::now());
}
