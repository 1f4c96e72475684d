use chrono::{NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use notification_dispatch::{
    models::event::{TriggerEvent, TriggerType},
    policy::{DEFAULT_MATERIALITY_THRESHOLD, below_materiality, is_material, is_quiet, quiet_until},
};

fn at(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).expect("valid time")
}

fn event(trigger: TriggerType) -> TriggerEvent {
    TriggerEvent::new("evt-1", "t1", "c1", "+212600000001", "Karim", trigger)
}

/// Test: A window crossing midnight covers both sides of it
#[test]
fn test_quiet_hours_wrap_midnight() {
    let (start, end) = (at(22, 0), at(6, 0));

    assert!(is_quiet(at(23, 30), start, end));
    assert!(is_quiet(at(0, 0), start, end));
    assert!(is_quiet(at(5, 59), start, end));
    assert!(!is_quiet(at(6, 5), start, end));
    assert!(!is_quiet(at(12, 0), start, end));
    assert!(is_quiet(at(22, 0), start, end));
    assert!(!is_quiet(at(6, 0), start, end));
}

/// Test: A same-day window is half open
#[test]
fn test_quiet_hours_same_day() {
    let (start, end) = (at(13, 0), at(14, 0));

    assert!(is_quiet(at(13, 30), start, end));
    assert!(!is_quiet(at(14, 0), start, end));
    assert!(!is_quiet(at(12, 59), start, end));
}

/// Test: Equal start and end means no quiet window
#[test]
fn test_quiet_hours_empty_window() {
    assert!(!is_quiet(at(3, 0), at(3, 0), at(3, 0)));
    assert!(!is_quiet(at(9, 0), at(3, 0), at(3, 0)));
}

/// Test: Release is the next end of the window, in the tenant zone
#[test]
fn test_quiet_until_rolls_to_next_morning() {
    let now = Utc.with_ymd_and_hms(2026, 3, 10, 23, 30, 0).single().expect("time");
    let release = quiet_until(now, at(22, 0), at(6, 0), Tz::UTC).expect("quiet");

    assert_eq!(release, Utc.with_ymd_and_hms(2026, 3, 11, 6, 0, 0).single().expect("time"));

    let early = Utc.with_ymd_and_hms(2026, 3, 11, 2, 0, 0).single().expect("time");
    let release = quiet_until(early, at(22, 0), at(6, 0), Tz::UTC).expect("quiet");
    assert_eq!(release, Utc.with_ymd_and_hms(2026, 3, 11, 6, 0, 0).single().expect("time"));

    let day = Utc.with_ymd_and_hms(2026, 3, 11, 12, 0, 0).single().expect("time");
    assert!(quiet_until(day, at(22, 0), at(6, 0), Tz::UTC).is_none());
}

/// Test: Quiet hours follow the tenant's local time, not UTC
#[test]
fn test_quiet_until_uses_tenant_timezone() {
    // 21:30 UTC is 23:30 in Paris (UTC+2 in summer).
    let now = Utc.with_ymd_and_hms(2026, 7, 1, 21, 30, 0).single().expect("time");
    let release = quiet_until(now, at(22, 0), at(6, 0), Tz::Europe__Paris).expect("quiet");

    assert_eq!(release, Utc.with_ymd_and_hms(2026, 7, 2, 4, 0, 0).single().expect("time"));
    assert!(quiet_until(now, at(22, 0), at(6, 0), Tz::UTC).is_none());
}

/// Test: Materiality compares the absolute change to the threshold
#[test]
fn test_materiality_threshold() {
    assert!(!is_material(0.5, DEFAULT_MATERIALITY_THRESHOLD));
    assert!(!is_material(-0.99, DEFAULT_MATERIALITY_THRESHOLD));
    assert!(is_material(1.0, DEFAULT_MATERIALITY_THRESHOLD));
    assert!(is_material(-250.0, DEFAULT_MATERIALITY_THRESHOLD));
}

/// Test: Only change-magnitude triggers with a small recorded change are suppressed
#[test]
fn test_below_materiality_scope() {
    let small = event(TriggerType::ReceivablesChange).with_change_amount(0.5);
    assert!(below_materiality(&small, 1.0));

    let large = event(TriggerType::ReceivablesChange).with_change_amount(12.0);
    assert!(!below_materiality(&large, 1.0));

    let unknown = event(TriggerType::ReceivablesChange);
    assert!(!below_materiality(&unknown, 1.0));

    let payment = event(TriggerType::PaymentReceived).with_change_amount(0.1);
    assert!(!below_materiality(&payment, 1.0));
}
