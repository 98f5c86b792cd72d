use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::model::*;

use super::EngineError;

// ── Availability Algorithm ────────────────────────────────────────

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(s: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| EngineError::InvalidInput(format!("bad date {s:?}: {e}")))
}

/// Parse an `HH:mm` time of day.
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime, EngineError> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|e| EngineError::InvalidInput(format!("bad time {s:?}: {e}")))
}

/// Parse a `YYYY-MM-DD HH:mm` session start (a `T` separator is accepted too).
pub fn parse_session_at(s: &str) -> Result<NaiveDateTime, EngineError> {
    let trimmed = s.trim();
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M"))
        .map_err(|e| EngineError::InvalidInput(format!("bad session time {s:?}: {e}")))
}

/// 0 = Sunday … 6 = Saturday.
pub fn day_of_week(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

fn minute_of_day(t: NaiveTime) -> u32 {
    t.num_seconds_from_midnight() / 60
}

fn time_from_minutes(minutes: u32) -> Option<NaiveTime> {
    NaiveTime::from_num_seconds_from_midnight_opt(minutes * 60, 0)
}

/// Candidate slot starts for a template row: `t = start; t < end; t += 30`.
/// Disabled rows produce nothing.
pub fn slot_times(entry: &WeeklyScheduleEntry) -> Vec<NaiveTime> {
    if !entry.enabled {
        return Vec::new();
    }
    let start = minute_of_day(entry.start_time);
    let end = minute_of_day(entry.end_time);
    (start..end)
        .step_by(SLOT_MINUTES as usize)
        .filter_map(time_from_minutes)
        .collect()
}

/// Bookable slots for `date` given the weekday template.
///
/// A slot survives when its absolute start is not before `now + min_lead` and
/// no approved enrollment already holds it. `booked` must be sorted.
/// Output is ascending and duplicate-free.
pub fn available_slots(
    entry: Option<&WeeklyScheduleEntry>,
    date: NaiveDate,
    now: NaiveDateTime,
    min_lead: Duration,
    booked: &[NaiveTime],
) -> Vec<NaiveTime> {
    let Some(entry) = entry.filter(|e| e.enabled) else {
        return Vec::new();
    };
    let cutoff = now + min_lead;
    slot_times(entry)
        .into_iter()
        .filter(|t| date.and_time(*t) >= cutoff)
        .filter(|t| booked.binary_search(t).is_err())
        .collect()
}

/// Validate a replace-all schedule save and expand it to exactly seven rows.
///
/// Weekdays absent from `entries` become disabled rows; a weekday given twice
/// is rejected so a save never leaves an ambiguous set.
pub fn normalize_week(
    coach_id: Id,
    entries: Vec<WeeklyScheduleEntry>,
) -> Result<Vec<WeeklyScheduleEntry>, EngineError> {
    let mut week: [Option<WeeklyScheduleEntry>; 7] = [None; 7];
    for mut entry in entries {
        if entry.day_of_week > 6 {
            return Err(EngineError::InvalidInput(format!(
                "day_of_week {} out of range 0..=6",
                entry.day_of_week
            )));
        }
        if entry.start_time >= entry.end_time {
            return Err(EngineError::InvalidInput(format!(
                "day {}: start_time {} must be before end_time {}",
                entry.day_of_week,
                entry.start_time.format("%H:%M"),
                entry.end_time.format("%H:%M")
            )));
        }
        let slot = &mut week[entry.day_of_week as usize];
        if slot.is_some() {
            return Err(EngineError::InvalidInput(format!(
                "day_of_week {} given more than once",
                entry.day_of_week
            )));
        }
        entry.coach_id = coach_id;
        *slot = Some(entry);
    }
    Ok(week
        .into_iter()
        .enumerate()
        .map(|(day, e)| e.unwrap_or_else(|| WeeklyScheduleEntry::disabled(coach_id, day as u8)))
        .collect())
}
