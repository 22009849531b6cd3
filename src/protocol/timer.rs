use rand::Rng;
use std::time::Duration;

/// Draws a duration uniformly from `min_ms..=max_ms`.
///
/// Used both for re-arming a node's resource-request timer and for picking
/// how long a node holds the shared resource.
pub fn random_interval(min_ms: u64, max_ms: u64) -> Duration {
    let mut rng = rand::thread_rng();
    let ms = rng.gen_range(min_ms..=max_ms);
    Duration::from_millis(ms)
}

/// Initial clock offset for a freshly created node, in `-max_ms..=max_ms`.
pub fn random_skew_ms(max_ms: i64) -> i64 {
    if max_ms <= 0 {
        return 0;
    }
    rand::thread_rng().gen_range(-max_ms..=max_ms)
}
