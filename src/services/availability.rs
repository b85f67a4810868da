use std::collections::HashSet;
use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use regex::Regex;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::SlotTime;

fn date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid date regex"))
}

/// Parses a `YYYY-MM-DD` date, rejecting anything that does not match the
/// pattern or is not a real calendar date.
pub fn parse_date(raw: &str) -> Result<NaiveDate, AppError> {
    if !date_pattern().is_match(raw) {
        return Err(AppError::InvalidInput(
            "invalid date format, use YYYY-MM-DD".to_string(),
        ));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::InvalidInput(format!("invalid date: {raw}")))
}

/// The daily grid minus `booked`. When `date` is the same day as `now`,
/// slots must also satisfy `slot_hhmm > now_hhmm + lead_hhmm`.
///
/// The comparison is on `HHMM` integers, so a lead of `100` is roughly
/// one hour: at 10:45 the first open slot is 12:00, not 11:45.
pub fn free_slots(
    date: NaiveDate,
    booked: &[SlotTime],
    now: NaiveDateTime,
    lead_hhmm: u32,
) -> Vec<SlotTime> {
    let booked: HashSet<SlotTime> = booked.iter().copied().collect();
    let cutoff = (date == now.date()).then(|| now.hour() * 100 + now.minute() + lead_hhmm);

    SlotTime::daily_grid()
        .into_iter()
        .filter(|slot| !booked.contains(slot))
        .filter(|slot| cutoff.map_or(true, |c| slot.as_hhmm() > c))
        .collect()
}

pub fn compute_available_slots(
    conn: &Connection,
    date: NaiveDate,
    now: NaiveDateTime,
    lead_hhmm: u32,
) -> Result<Vec<SlotTime>, AppError> {
    let booked: Vec<SlotTime> = queries::get_confirmed_by_date(conn, date)?
        .into_iter()
        .map(|a| a.time)
        .collect();

    Ok(free_slots(date, &booked, now, lead_hhmm))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::NewAppointment;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn slot(s: &str) -> SlotTime {
        s.parse().unwrap()
    }

    fn labels(slots: &[SlotTime]) -> Vec<String> {
        slots.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("2025-03-10").unwrap(), day("2025-03-10"));
        assert!(matches!(parse_date("2025-3-10"), Err(AppError::InvalidInput(_))));
        assert!(matches!(parse_date("10/03/2025"), Err(AppError::InvalidInput(_))));
        assert!(matches!(parse_date("2025-02-30"), Err(AppError::InvalidInput(_))));
        assert!(matches!(parse_date(" 2025-03-10"), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_full_grid_for_future_date() {
        let slots = free_slots(day("2025-03-10"), &[], dt("2025-03-01 12:00"), 100);
        assert_eq!(slots, SlotTime::daily_grid());
    }

    #[test]
    fn test_booked_slots_removed() {
        let booked = [slot("10:00"), slot("17:30"), slot("09:00")];
        let slots = free_slots(day("2025-03-10"), &booked, dt("2025-03-01 12:00"), 100);
        assert_eq!(slots.len(), 15);
        assert!(!slots.contains(&slot("10:00")));
        assert!(!slots.contains(&slot("17:30")));
        assert!(!slots.contains(&slot("09:00")));
        assert!(slots.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_past_date_not_filtered() {
        let slots = free_slots(day("2025-01-01"), &[], dt("2025-03-01 15:00"), 100);
        assert_eq!(slots.len(), 18);
    }

    #[test]
    fn test_same_day_lead_buffer() {
        let slots = free_slots(day("2025-03-10"), &[], dt("2025-03-10 10:00"), 100);
        assert_eq!(labels(&slots)[0], "11:30");
        assert!(slots.iter().all(|s| s.as_hhmm() > 1000 + 100));
    }

    #[test]
    fn test_same_day_hhmm_comparison_across_hour() {
        // 10:45 -> 1045 + 100 = 1145, so 11:30 is excluded and 12:00 is first.
        let slots = free_slots(day("2025-03-10"), &[], dt("2025-03-10 10:45"), 100);
        assert_eq!(labels(&slots)[0], "12:00");
    }

    #[test]
    fn test_same_day_late_evening_is_empty() {
        let slots = free_slots(day("2025-03-10"), &[], dt("2025-03-10 17:00"), 100);
        assert!(slots.is_empty());
    }

    #[test]
    fn test_same_day_combined_with_bookings() {
        let booked = [slot("14:00")];
        let slots = free_slots(day("2025-03-10"), &booked, dt("2025-03-10 12:29"), 100);
        assert_eq!(
            labels(&slots),
            vec!["13:30", "14:30", "15:00", "15:30", "16:00", "16:30", "17:00", "17:30"]
        );
    }

    #[test]
    fn test_compute_available_slots_reads_store() {
        let conn = db::init_db(":memory:").unwrap();
        let new = NewAppointment {
            name: "Ana Silva".to_string(),
            phone: "11999998888".to_string(),
            email: None,
            service: None,
            notes: None,
            date: day("2025-03-10"),
            time: slot("10:00"),
        };
        let created = queries::create_appointment(&conn, &new, dt("2025-03-01 12:00"))
            .unwrap()
            .unwrap();

        let slots = compute_available_slots(&conn, day("2025-03-10"), dt("2025-03-01 12:00"), 100).unwrap();
        assert_eq!(slots.len(), 17);
        assert!(!slots.contains(&slot("10:00")));

        queries::update_appointment_status(
            &conn,
            created.id,
            crate::models::AppointmentStatus::Cancelled,
        )
        .unwrap();
        let slots = compute_available_slots(&conn, day("2025-03-10"), dt("2025-03-01 12:00"), 100).unwrap();
        assert_eq!(slots.len(), 18);
    }
}
