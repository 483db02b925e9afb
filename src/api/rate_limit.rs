//! Per-address rate limiting for WebSocket upgrades

use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{clock::DefaultClock, state::keyed::DefaultKeyedStateStore, Quota, RateLimiter};

/// Upgrade limiter keyed by client address
pub type SharedLimiter = Arc<RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>>;

/// Create a limiter with the given upgrades-per-minute quota per address
#[must_use]
pub fn create_limiter(upgrades_per_minute: u32) -> SharedLimiter {
    let rpm = NonZeroU32::new(upgrades_per_minute).unwrap_or(NonZeroU32::MIN);
    let quota = Quota::per_minute(rpm);
    Arc::new(RateLimiter::keyed(quota))
}

/// Check whether the address may open another session
#[must_use]
pub fn allow(limiter: &SharedLimiter, addr: IpAddr) -> bool {
    limiter.check_key(&addr).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_is_enforced_per_address() {
        let limiter = create_limiter(2);
        let caller: IpAddr = "203.0.113.7".parse().unwrap();
        let other: IpAddr = "203.0.113.8".parse().unwrap();

        assert!(allow(&limiter, caller));
        assert!(allow(&limiter, caller));
        assert!(!allow(&limiter, caller));

        // A different address has its own budget.
        assert!(allow(&limiter, other));
    }

    #[test]
    fn zero_quota_clamps_to_minimum() {
        let limiter = create_limiter(0);
        let caller: IpAddr = "203.0.113.9".parse().unwrap();
        assert!(allow(&limiter, caller));
        assert!(!allow(&limiter, caller));
    }
}
