use rand::Rng;
use std::time::Duration;

/// Delays never grow past this, whatever the attempt count says.
const MAX_DELAY: Duration = Duration::from_secs(120);

/// Exponent is clamped so the multiplier cannot overflow.
const MAX_EXPONENT: u32 = 10;

/// Fraction of the computed delay added as random jitter, to stop parked
/// articles from hammering an upstream in lockstep.
const JITTER_FRACTION: f64 = 0.25;

/// Exponential backoff: `base * 2^attempt`, capped. Attempt 0 is the first
/// retry.
pub fn delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.pow(attempt.min(MAX_EXPONENT));
    base.saturating_mul(factor).min(MAX_DELAY)
}

/// `delay` plus up to 25% random jitter.
pub fn delay_jittered(base: Duration, attempt: u32) -> Duration {
    let d = delay(base, attempt);
    let jitter = d.mul_f64(rand::rng().random_range(0.0..JITTER_FRACTION));
    (d + jitter).min(MAX_DELAY)
}

/// Backoff for a rate-limited call. A server-provided hint wins over the
/// computed schedule when it is longer.
pub fn rate_limit_delay(hint: Option<Duration>, base: Duration, attempt: u32) -> Duration {
    let computed = delay(base, attempt);
    match hint {
        Some(h) => h.max(computed).min(MAX_DELAY),
        None => computed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_per_attempt() {
        let base = Duration::from_secs(2);
        assert_eq!(delay(base, 0), Duration::from_secs(2));
        assert_eq!(delay(base, 1), Duration::from_secs(4));
        assert_eq!(delay(base, 2), Duration::from_secs(8));
        assert_eq!(delay(base, 3), Duration::from_secs(16));
    }

    #[test]
    fn caps_at_max() {
        let base = Duration::from_secs(2);
        assert_eq!(delay(base, 30), MAX_DELAY);
        assert_eq!(delay(base, u32::MAX), MAX_DELAY);
    }

    #[test]
    fn jitter_stays_in_bounds() {
        let base = Duration::from_secs(2);
        for attempt in 0..5 {
            let plain = delay(base, attempt);
            for _ in 0..50 {
                let jittered = delay_jittered(base, attempt);
                assert!(jittered >= plain);
                assert!(jittered <= plain.mul_f64(1.0 + JITTER_FRACTION));
            }
        }
    }

    #[test]
    fn server_hint_wins_when_longer() {
        let base = Duration::from_secs(2);
        let hint = Some(Duration::from_secs(45));
        assert_eq!(rate_limit_delay(hint, base, 0), Duration::from_secs(45));
        // computed schedule wins once it passes the hint
        assert_eq!(rate_limit_delay(hint, base, 5), Duration::from_secs(64));
    }

    #[test]
    fn no_hint_falls_back_to_schedule() {
        let base = Duration::from_secs(10);
        assert_eq!(rate_limit_delay(None, base, 1), Duration::from_secs(20));
    }
}
