//! Window planning: turns "now" into the ordered list of target instants.

use chrono::{DateTime, Utc};
use sunlapse_config::WindowConfig;
use sunlapse_model::{TargetInstant, instant::quantize};

/// Last interval boundary at or before `now - safe_delay`.
pub fn window_end(now: DateTime<Utc>, window: &WindowConfig) -> DateTime<Utc> {
    quantize(now - window.safe_delay(), window.interval_minutes)
}

/// Oldest instant of the window, inclusive.
pub fn window_start(
    now: DateTime<Utc>,
    window: &WindowConfig,
) -> DateTime<Utc> {
    window_end(now, window)
        - window.interval() * (window.frame_count() as i32 - 1)
}

/// The full rolling window, oldest first. Both bounds are included and the
/// length is exactly `total_days * frames_per_day`. Quantization makes the
/// instants (and therefore the manifest keys) idempotent across runs within
/// the same interval slot.
pub fn plan_window(
    now: DateTime<Utc>,
    window: &WindowConfig,
) -> Vec<TargetInstant> {
    let start = window_start(now, window);
    let interval = window.interval();
    (0..window.frame_count())
        .map(|index| TargetInstant::new(index, start + interval * index as i32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config(days: u32) -> WindowConfig {
        WindowConfig {
            safe_delay_days: 2,
            total_days: days,
            interval_minutes: 15,
        }
    }

    #[test]
    fn window_length_is_exact() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 10, 7, 23).unwrap();
        let plan = plan_window(now, &config(2));
        assert_eq!(plan.len(), 192);
    }

    #[test]
    fn bounds_are_inclusive_and_quantized() {
        let now = Utc.with_ymd_and_hms(2026, 6, 3, 10, 7, 23).unwrap();
        let window = config(2);
        let plan = plan_window(now, &window);

        let expected_end =
            Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0).unwrap();
        assert_eq!(plan.last().unwrap().time, expected_end);
        assert_eq!(
            plan.first().unwrap().time,
            expected_end - chrono::Duration::minutes(15 * 191)
        );
        assert_eq!(plan.first().unwrap().index, 0);
        assert_eq!(plan.last().unwrap().index, 191);
    }

    #[test]
    fn exact_boundary_now_keeps_the_boundary() {
        // now - safe_delay already on the grid: the window ends right there.
        let now = Utc.with_ymd_and_hms(2026, 6, 3, 12, 15, 0).unwrap();
        let plan = plan_window(now, &config(1));
        assert_eq!(
            plan.last().unwrap().time,
            Utc.with_ymd_and_hms(2026, 6, 1, 12, 15, 0).unwrap()
        );
    }

    #[test]
    fn instants_are_interval_spaced_and_ascending() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 1).unwrap();
        let plan = plan_window(now, &config(1));
        for pair in plan.windows(2) {
            assert_eq!(pair[1].time - pair[0].time, chrono::Duration::minutes(15));
            assert_eq!(pair[1].index, pair[0].index + 1);
        }
    }
}
