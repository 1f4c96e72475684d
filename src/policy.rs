//! Send-time policies: quiet hours and materiality.

use chrono::{DateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

use crate::models::event::TriggerEvent;

/// Smallest change, in currency units, that warrants a change notification.
/// Tenants may override it through their settings.
pub const DEFAULT_MATERIALITY_THRESHOLD: f64 = 1.0;

/// Whether `now_local` falls inside the `[start, end)` window.
///
/// `start > end` wraps midnight. `start == end` is an empty window.
pub fn is_quiet(now_local: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start == end {
        return false;
    }

    if start < end {
        now_local >= start && now_local < end
    } else {
        now_local >= start || now_local < end
    }
}

/// When quiet at `now`, the UTC instant the window next closes in `tz`.
pub fn quiet_until(
    now: DateTime<Utc>,
    start: NaiveTime,
    end: NaiveTime,
    tz: Tz,
) -> Option<DateTime<Utc>> {
    let local = now.with_timezone(&tz);

    if !is_quiet(local.time(), start, end) {
        return None;
    }

    let mut date = local.date_naive();
    if local.time() >= end {
        date = date.succ_opt()?;
    }

    let naive = date.and_time(end);

    // A window ending inside a DST gap closes an hour later.
    let release = tz
        .from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + TimeDelta::hours(1))).earliest())
        .map(|at| at.with_timezone(&Utc))
        .unwrap_or(now + TimeDelta::hours(1));

    Some(release)
}

pub fn is_material(delta: f64, threshold: f64) -> bool {
    delta.abs() >= threshold
}

/// True when a change-magnitude event moved less than `threshold`.
/// Events without a recorded amount are never suppressed.
pub fn below_materiality(event: &TriggerEvent, threshold: f64) -> bool {
    if !event.trigger_type.is_change_magnitude() {
        return false;
    }

    match event.change_amount {
        Some(delta) => !is_material(delta, threshold),
        None => false,
    }
}
