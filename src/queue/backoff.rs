use std::time::Duration;

pub const DEFAULT_RETRY_DELAYS_MS: [u64; 5] = [1_000, 2_000, 5_000, 10_000, 30_000];

pub fn default_delays() -> Vec<Duration> {
    DEFAULT_RETRY_DELAYS_MS
        .iter()
        .map(|ms| Duration::from_millis(*ms))
        .collect()
}

/// Delay before the next attempt. Past the end of the table the last entry repeats.
pub fn delay_for(delays: &[Duration], retry_count: i32) -> Duration {
    let Some(last) = delays.len().checked_sub(1) else {
        return Duration::ZERO;
    };
    let index = usize::try_from(retry_count).unwrap_or(0).min(last);
    delays[index]
}
