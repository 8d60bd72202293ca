use chrono::{DateTime, Utc};
use std::time::Duration;

/// Decide whether an item is due for (re)processing.
///
/// Items never processed are always due. Otherwise the item is due once
/// at least `window` has elapsed since `processed_at`; the boundary itself
/// counts as elapsed. A `processed_at` later than `now` is not due.
pub fn should_process(
    processed_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window: Duration,
) -> bool {
    let Some(processed_at) = processed_at else {
        return true;
    };

    match now.signed_duration_since(processed_at).to_std() {
        Ok(elapsed) => elapsed >= window,
        // negative: stamped in the future relative to `now`
        Err(_) => false,
    }
}
