//! Interval timers that follow config reloads.

use std::time::Duration;

use tokio::time::{self, Interval, MissedTickBehavior};

/// An interval whose first tick fires one `period` from now.
pub fn delayed_interval(period: Duration) -> Interval {
    let mut ticker = time::interval_at(time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Restart `ticker` at `period` if its current period differs.
///
/// Returns true when the ticker was replaced.
pub fn retune(ticker: &mut Interval, period: Duration, task: &'static str) -> bool {
    if ticker.period() == period {
        return false;
    }
    tracing::info!(
        task,
        old_secs = ticker.period().as_secs(),
        new_secs = period.as_secs(),
        "Interval changed by reload"
    );
    *ticker = delayed_interval(period);
    true
}
