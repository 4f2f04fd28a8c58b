use std::time::Duration;

/// Converts a duration expressed in `timescale` units per second into a [`Duration`]
pub fn unscaled_duration(duration: u64, timescale: u64) -> Duration {
    const NANOS_PER_SECOND: u128 = 1_000_000_000;
    if timescale == 0 {
        return Duration::ZERO;
    }
    let nanos = u128::from(duration) * NANOS_PER_SECOND / u128::from(timescale);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}
