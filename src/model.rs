use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Row identifier for coaches, users, enrollments and reviews.
pub type Id = i64;

/// Slot granularity in minutes. Policy constant, not configurable per coach.
pub const SLOT_MINUTES: u32 = 30;

/// Role carried by an authenticated principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A student.
    User,
    Coach,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Coach => "coach",
            Role::Admin => "admin",
        }
    }
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub id: Id,
    pub role: Role,
}

impl Principal {
    pub fn new(id: Id, role: Role) -> Self {
        Self { id, role }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
    Cancelled,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Pending => "pending",
            EnrollmentStatus::Approved => "approved",
            EnrollmentStatus::Rejected => "rejected",
            EnrollmentStatus::Completed => "completed",
            EnrollmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(EnrollmentStatus::Pending),
            "approved" => Some(EnrollmentStatus::Approved),
            "rejected" => Some(EnrollmentStatus::Rejected),
            "completed" => Some(EnrollmentStatus::Completed),
            "cancelled" => Some(EnrollmentStatus::Cancelled),
            _ => None,
        }
    }

    /// `pending` and `approved` block a second request for the same pair.
    pub fn is_active(&self) -> bool {
        matches!(self, EnrollmentStatus::Pending | EnrollmentStatus::Approved)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EnrollmentStatus::Rejected | EnrollmentStatus::Completed | EnrollmentStatus::Cancelled
        )
    }

    /// Statuses that count towards a coach's `students_count`.
    pub fn counts_as_student(&self) -> bool {
        matches!(self, EnrollmentStatus::Approved | EnrollmentStatus::Completed)
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coach profile plus its denormalized aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coach {
    pub id: Id,
    /// Owning account. A profile may exist before an account is linked.
    pub user_id: Option<Id>,
    pub name: Option<String>,
    /// Smallest currency unit.
    pub price: Option<i64>,
    pub students_count: u32,
    pub rating: f64,
    pub review_count: u32,
}

impl Coach {
    pub fn new(id: Id, user_id: Option<Id>, name: Option<String>, price: Option<i64>) -> Self {
        Self {
            id,
            user_id,
            name,
            price,
            students_count: 0,
            rating: 0.0,
            review_count: 0,
        }
    }

    pub fn is_owned_by(&self, user_id: Id) -> bool {
        self.user_id == Some(user_id)
    }
}

/// Availability template for one weekday. `day_of_week` is 0 = Sunday … 6 = Saturday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyScheduleEntry {
    pub coach_id: Id,
    pub day_of_week: u8,
    pub enabled: bool,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl WeeklyScheduleEntry {
    /// Placeholder row for a weekday the coach never configured.
    pub fn disabled(coach_id: Id, day_of_week: u8) -> Self {
        Self {
            coach_id,
            day_of_week,
            enabled: false,
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            end_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: Id,
    pub user_id: Id,
    pub coach_id: Id,
    pub status: EnrollmentStatus,
    pub message: Option<String>,
    pub coach_message: Option<String>,
    /// Requested session start, local server time.
    pub session_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: Id,
    pub coach_id: Id,
    pub user_id: Id,
    /// 1..=5
    pub rating: u8,
    pub comment: Option<String>,
    pub verified: bool,
    pub created_at: NaiveDateTime,
}

/// Everything owned by one coach. Guarded by a single lock in the engine.
#[derive(Debug, Clone)]
pub struct CoachState {
    pub coach: Coach,
    /// Empty until configured, then exactly seven rows ordered by weekday.
    pub schedule: Vec<WeeklyScheduleEntry>,
    pub enrollments: BTreeMap<Id, Enrollment>,
    pub reviews: BTreeMap<Id, Review>,
}

impl CoachState {
    pub fn new(coach: Coach) -> Self {
        Self {
            coach,
            schedule: Vec::new(),
            enrollments: BTreeMap::new(),
            reviews: BTreeMap::new(),
        }
    }

    pub fn schedule_entry(&self, day_of_week: u8) -> Option<&WeeklyScheduleEntry> {
        self.schedule.iter().find(|e| e.day_of_week == day_of_week)
    }

    /// All seven weekdays, unconfigured days filled with a disabled row.
    pub fn week(&self) -> Vec<WeeklyScheduleEntry> {
        (0..7u8)
            .map(|day| {
                self.schedule_entry(day)
                    .copied()
                    .unwrap_or_else(|| WeeklyScheduleEntry::disabled(self.coach.id, day))
            })
            .collect()
    }

    /// The pending or approved enrollment of `user_id` with this coach, if any.
    pub fn active_enrollment_for(&self, user_id: Id) -> Option<&Enrollment> {
        self.enrollments
            .values()
            .find(|e| e.user_id == user_id && e.status.is_active())
    }

    /// Session start times on `date` already taken by approved enrollments.
    pub fn booked_times_on(&self, date: NaiveDate) -> Vec<NaiveTime> {
        let mut times: Vec<NaiveTime> = self
            .enrollments
            .values()
            .filter(|e| e.status == EnrollmentStatus::Approved)
            .filter_map(|e| e.session_at)
            .filter(|at| at.date() == date)
            .map(|at| at.time())
            .collect();
        times.sort();
        times.dedup();
        times
    }

    /// Source-of-truth student count: approved plus completed enrollments.
    pub fn counted_students(&self) -> u32 {
        self.enrollments
            .values()
            .filter(|e| e.status.counts_as_student())
            .count() as u32
    }
}

/// The event types: flat, no nesting beyond row payloads. This is the WAL record format.
///
/// Each record is one atomic unit of work: a status change and its aggregate
/// adjustment travel in the same record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    CoachCreated {
        id: Id,
        user_id: Option<Id>,
        name: Option<String>,
        price: Option<i64>,
    },
    CoachAccountLinked {
        id: Id,
        user_id: Id,
    },
    ScheduleReplaced {
        coach_id: Id,
        entries: Vec<WeeklyScheduleEntry>,
    },
    EnrollmentCreated {
        enrollment: Enrollment,
    },
    EnrollmentTransitioned {
        id: Id,
        coach_id: Id,
        status: EnrollmentStatus,
        coach_message: Option<String>,
        at: NaiveDateTime,
        students_delta: i32,
    },
    StudentCountReconciled {
        coach_id: Id,
        students_count: u32,
    },
    ReviewSubmitted {
        review: Review,
    },
    ReviewModerated {
        id: Id,
        coach_id: Id,
        verified: bool,
    },
    /// Compaction output: the full state of one coach.
    CoachSnapshot {
        coach: Coach,
        schedule: Vec<WeeklyScheduleEntry>,
        enrollments: Vec<Enrollment>,
        reviews: Vec<Review>,
    },
}

impl Event {
    pub fn coach_id(&self) -> Id {
        match self {
            Event::CoachCreated { id, .. } | Event::CoachAccountLinked { id, .. } => *id,
            Event::ScheduleReplaced { coach_id, .. }
            | Event::EnrollmentTransitioned { coach_id, .. }
            | Event::StudentCountReconciled { coach_id, .. }
            | Event::ReviewModerated { coach_id, .. } => *coach_id,
            Event::EnrollmentCreated { enrollment } => enrollment.coach_id,
            Event::ReviewSubmitted { review } => review.coach_id,
            Event::CoachSnapshot { coach, .. } => coach.id,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableSlots {
    pub date: NaiveDate,
    pub slots: Vec<NaiveTime>,
}

impl AvailableSlots {
    /// Slots rendered as `HH:mm`.
    pub fn slot_strings(&self) -> Vec<String> {
        self.slots.iter().map(|t| t.format("%H:%M").to_string()).collect()
    }
}

/// Live vs. recomputed student count for one coach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriftReport {
    pub coach_id: Id,
    pub live: u32,
    pub expected: u32,
}

impl DriftReport {
    pub fn drifted(&self) -> bool {
        self.live != self.expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M").unwrap()
    }

    fn enrollment(id: Id, user_id: Id, status: EnrollmentStatus, session_at: Option<NaiveDateTime>) -> Enrollment {
        let created = at("2026-01-01", "08:00");
        Enrollment {
            id,
            user_id,
            coach_id: 1,
            status,
            message: None,
            coach_message: None,
            session_at,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn status_classes() {
        assert!(EnrollmentStatus::Pending.is_active());
        assert!(EnrollmentStatus::Approved.is_active());
        assert!(!EnrollmentStatus::Approved.is_terminal());
        for s in [
            EnrollmentStatus::Rejected,
            EnrollmentStatus::Completed,
            EnrollmentStatus::Cancelled,
        ] {
            assert!(s.is_terminal());
            assert!(!s.is_active());
        }
        assert!(EnrollmentStatus::Completed.counts_as_student());
        assert!(!EnrollmentStatus::Pending.counts_as_student());
    }

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!(EnrollmentStatus::parse("Approved"), Some(EnrollmentStatus::Approved));
        assert_eq!(EnrollmentStatus::parse(" cancelled "), Some(EnrollmentStatus::Cancelled));
        assert_eq!(EnrollmentStatus::parse("canceled"), None);
    }

    #[test]
    fn week_fills_missing_days() {
        let mut cs = CoachState::new(Coach::new(7, None, None, None));
        cs.schedule.push(WeeklyScheduleEntry {
            coach_id: 7,
            day_of_week: 3,
            enabled: true,
            start_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        });
        let week = cs.week();
        assert_eq!(week.len(), 7);
        assert!(week[3].enabled);
        assert!(week.iter().enumerate().all(|(i, e)| e.day_of_week as usize == i));
        assert_eq!(week.iter().filter(|e| e.enabled).count(), 1);
        assert_eq!(week[0], WeeklyScheduleEntry::disabled(7, 0));
    }

    #[test]
    fn active_enrollment_ignores_terminal_rows() {
        let mut cs = CoachState::new(Coach::new(1, None, None, None));
        cs.enrollments.insert(1, enrollment(1, 10, EnrollmentStatus::Rejected, None));
        assert!(cs.active_enrollment_for(10).is_none());
        cs.enrollments.insert(2, enrollment(2, 10, EnrollmentStatus::Pending, None));
        assert_eq!(cs.active_enrollment_for(10).map(|e| e.id), Some(2));
        assert!(cs.active_enrollment_for(11).is_none());
    }

    #[test]
    fn booked_times_only_counts_approved_on_date() {
        let mut cs = CoachState::new(Coach::new(1, None, None, None));
        cs.enrollments.insert(
            1,
            enrollment(1, 10, EnrollmentStatus::Approved, Some(at("2026-03-02", "14:00"))),
        );
        cs.enrollments.insert(
            2,
            enrollment(2, 11, EnrollmentStatus::Pending, Some(at("2026-03-02", "14:30"))),
        );
        cs.enrollments.insert(
            3,
            enrollment(3, 12, EnrollmentStatus::Approved, Some(at("2026-03-03", "14:00"))),
        );
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert_eq!(cs.booked_times_on(date), vec![NaiveTime::from_hms_opt(14, 0, 0).unwrap()]);
    }

    #[test]
    fn counted_students_includes_completed() {
        let mut cs = CoachState::new(Coach::new(1, None, None, None));
        cs.enrollments.insert(1, enrollment(1, 10, EnrollmentStatus::Approved, None));
        cs.enrollments.insert(2, enrollment(2, 11, EnrollmentStatus::Completed, None));
        cs.enrollments.insert(3, enrollment(3, 12, EnrollmentStatus::Cancelled, None));
        cs.enrollments.insert(4, enrollment(4, 13, EnrollmentStatus::Pending, None));
        assert_eq!(cs.counted_students(), 2);
    }

    #[test]
    fn slot_strings_are_hh_mm() {
        let slots = AvailableSlots {
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            slots: vec![
                NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            ],
        };
        assert_eq!(slots.slot_strings(), vec!["09:00", "09:30"]);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::EnrollmentTransitioned {
            id: 4,
            coach_id: 2,
            status: EnrollmentStatus::Approved,
            coach_message: Some("see you".into()),
            at: at("2026-03-02", "10:00"),
            students_delta: 1,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
        assert_eq!(decoded.coach_id(), 2);
    }
}
