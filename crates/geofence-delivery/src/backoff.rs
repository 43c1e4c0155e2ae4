use std::time::Duration;

/// Exponential retry delay for C7 (§4.5): `base_ms · 2^attempt`, capped.
///
/// A pure function rather than a polling loop — grounded in the shape of the
/// cloud-driver long-running-operation poll backoff (escalating delay,
/// capped, logged by the caller), adapted to this spec's exact formula.
pub fn backoff(attempt: u32, base_ms: u64, cap_ms: u64) -> Duration {
    let scaled = base_ms.saturating_mul(1u64 << attempt.min(63));
    Duration::from_millis(scaled.min(cap_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_per_attempt() {
        assert_eq!(backoff(0, 2000, 300_000), Duration::from_millis(2000));
        assert_eq!(backoff(1, 2000, 300_000), Duration::from_millis(4000));
        assert_eq!(backoff(2, 2000, 300_000), Duration::from_millis(8000));
    }

    #[test]
    fn caps_at_ceiling() {
        assert_eq!(backoff(20, 2000, 300_000), Duration::from_millis(300_000));
    }

    #[test]
    fn never_overflows_on_large_attempt() {
        let d = backoff(u32::MAX, 2000, 300_000);
        assert_eq!(d, Duration::from_millis(300_000));
    }
}
