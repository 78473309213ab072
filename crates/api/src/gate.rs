//! Request-level admission control: a token bucket per client address.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use cardrail_domain::config::GateConfig;
use metrics::counter;
use tracing::warn;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Seconds a rejected caller should wait before retrying, for the
/// `Retry-After` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAfter(pub u64);

pub struct RequestGate {
    config: GateConfig,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RequestGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Admits or rejects one request from `key`.
    pub fn admit(&self, key: &str) -> Result<(), RetryAfter> {
        let rate = f64::from(self.config.requests_per_second());
        let burst = f64::from(self.config.burst());
        let now = Instant::now();

        let mut guard = self.buckets.lock().expect("mutex poisoned");
        let bucket = guard.entry(key.to_owned()).or_insert_with(|| Bucket {
            tokens: burst,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * rate).min(burst);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Ok(());
        }

        let deficit = 1.0 - bucket.tokens;
        let wait = (deficit / rate).ceil().max(1.0) as u64;
        counter!("gate_rejections_total").increment(1);
        warn!(client = key, "request rate limit exceeded");
        Err(RetryAfter(wait))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_the_burst_then_rejects() {
        let gate = RequestGate::new(GateConfig::new(1, 2));
        assert!(gate.admit("10.0.0.1").is_ok());
        assert!(gate.admit("10.0.0.1").is_ok());

        let retry = gate.admit("10.0.0.1").unwrap_err();
        assert!(retry.0 >= 1);
    }

    #[test]
    fn buckets_are_per_client() {
        let gate = RequestGate::new(GateConfig::new(1, 1));
        assert!(gate.admit("10.0.0.1").is_ok());
        assert!(gate.admit("10.0.0.2").is_ok());
        assert!(gate.admit("10.0.0.1").is_err());
    }

    #[test]
    fn tokens_refill_over_time() {
        let gate = RequestGate::new(GateConfig::new(1000, 1));
        assert!(gate.admit("10.0.0.1").is_ok());
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(gate.admit("10.0.0.1").is_ok());
    }
}
