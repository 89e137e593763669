//! Periodic window rotation shared by every summary with the same window.
//!
//! One background thread per distinct window duration ticks every `window / 2`, but at most once
//! per millisecond, and rotates all summaries registered for that duration. Summaries are held
//! weakly, so a dropped summary simply falls out of its group on the next tick.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, error};

use super::Summary;

// Rotations never run more often than this.
const MIN_SWAP_PERIOD: Duration = Duration::from_millis(1);

static SCHEDULER: Lazy<SwapScheduler> = Lazy::new(SwapScheduler::default);

pub(crate) fn scheduler() -> &'static SwapScheduler {
    &SCHEDULER
}

#[derive(Default)]
pub(crate) struct SwapScheduler {
    groups: Mutex<HashMap<Duration, Arc<SwapGroup>>>,
}

#[derive(Default)]
struct SwapGroup {
    members: Mutex<Vec<Weak<Summary>>>,
}

impl SwapGroup {
    fn swap_all(&self) {
        self.members.lock().retain(|member| match member.upgrade() {
            Some(summary) => {
                summary.swap();
                true
            }
            None => false,
        });
    }
}

impl SwapScheduler {
    pub(crate) fn register(&self, summary: &Arc<Summary>) {
        let window = summary.window();
        let group = {
            let mut groups = self.groups.lock();
            Arc::clone(groups.entry(window).or_insert_with(|| {
                let group = Arc::new(SwapGroup::default());
                spawn_swap_thread(window, Arc::clone(&group));
                group
            }))
        };
        group.members.lock().push(Arc::downgrade(summary));
    }

    pub(crate) fn unregister(&self, summary: &Arc<Summary>) {
        let group = self.groups.lock().get(&summary.window()).cloned();
        if let Some(group) = group {
            let target = Arc::downgrade(summary);
            group.members.lock().retain(|member| !member.ptr_eq(&target));
        }
    }

    #[cfg(test)]
    fn members(&self, window: Duration) -> usize {
        self.groups.lock().get(&window).map_or(0, |group| group.members.lock().len())
    }
}

fn swap_period(window: Duration) -> Duration {
    (window / 2).max(MIN_SWAP_PERIOD)
}

fn spawn_swap_thread(window: Duration, group: Arc<SwapGroup>) {
    let period = swap_period(window);
    let result = thread::Builder::new()
        .name(format!("vmetrics-summary-swap-{}ms", window.as_millis()))
        .spawn(move || {
            debug!(?window, "starting summary window rotation");
            let ticker = crossbeam_channel::tick(period);
            for _ in ticker.iter() {
                group.swap_all();
            }
        });

    if let Err(e) = result {
        error!(
            ?window,
            error = %e,
            "failed to spawn summary rotation thread; windows will not slide"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::{scheduler, swap_period};
    use crate::summary::Summary;

    #[test]
    fn test_register_and_unregister() {
        let window = Duration::from_secs(3601);
        let a = Arc::new(Summary::new(window, &[0.5]));
        let b = Arc::new(Summary::new(window, &[0.5]));

        scheduler().register(&a);
        scheduler().register(&b);
        assert_eq!(scheduler().members(window), 2);

        scheduler().unregister(&a);
        assert_eq!(scheduler().members(window), 1);

        scheduler().unregister(&b);
        assert_eq!(scheduler().members(window), 0);
    }

    #[test]
    fn test_swap_period() {
        let cases = &[
            (Duration::from_secs(300), Duration::from_secs(150)),
            (Duration::from_millis(3), Duration::from_micros(1500)),
            (Duration::from_millis(2), Duration::from_millis(1)),
            (Duration::from_micros(10), Duration::from_millis(1)),
            (Duration::from_nanos(1), Duration::from_millis(1)),
        ];

        for (window, expected) in cases {
            assert_eq!(swap_period(*window), *expected, "{window:?}");
        }
    }

    #[test]
    fn test_tiny_windows_still_rotate() {
        let window = Duration::from_nanos(1);
        let summary = Arc::new(Summary::new(window, &[1.0]));
        scheduler().register(&summary);
        summary.update(5.0);

        // Two rotations discard the observation from both reservoirs.
        std::thread::sleep(Duration::from_millis(50));
        assert!(summary.quantile_values()[0].is_nan());
        assert_eq!(summary.count(), 1);
        scheduler().unregister(&summary);
    }

    #[test]
    fn test_dropped_summaries_leave_the_group() {
        let window = Duration::from_millis(23);
        let summary = Arc::new(Summary::new(window, &[0.5]));
        scheduler().register(&summary);
        drop(summary);

        std::thread::sleep(window * 3);
        assert_eq!(scheduler().members(window), 0);
    }
}
