use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Spawn a task that runs `tick` every `period` until `stop` is cancelled.
///
/// The first run happens one full period after spawning. Each run completes
/// before the next tick is awaited, so a slow run delays rather than stacks.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    stop: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.cancelled() => {
                    tracing::debug!(ticker = name, "Ticker stopped");
                    break;
                }
                _ = interval.tick() => {
                    tick().await;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn ticks_until_cancelled() {
        let count = Arc::new(AtomicUsize::new(0));
        let stop = CancellationToken::new();

        let counter = count.clone();
        let handle = spawn_periodic("test", Duration::from_millis(10), stop.clone(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(75)).await;
        stop.cancel();
        handle.await.unwrap();

        let ticks = count.load(Ordering::SeqCst);
        assert!(ticks >= 2, "expected several ticks, got {ticks}");

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), ticks);
    }

    #[tokio::test]
    async fn first_tick_waits_a_full_period() {
        let count = Arc::new(AtomicUsize::new(0));
        let stop = CancellationToken::new();

        let counter = count.clone();
        let _handle = spawn_periodic("slow", Duration::from_secs(60), stop.clone(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        stop.cancel();
    }
}
