use crate::model::*;

use super::availability::{available_slots, day_of_week, parse_date};
use super::{Engine, EngineError, SharedCoachState};

/// Optional narrowing for enrollment listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrollmentFilter {
    pub id: Option<Id>,
    pub coach_id: Option<Id>,
    pub status: Option<EnrollmentStatus>,
}

impl EnrollmentFilter {
    fn matches(&self, e: &Enrollment) -> bool {
        self.id.is_none_or(|id| e.id == id)
            && self.coach_id.is_none_or(|c| e.coach_id == c)
            && self.status.is_none_or(|s| e.status == s)
    }
}

impl Engine {
    /// Bookable slots for `coach_id` on `date` (`YYYY-MM-DD`).
    ///
    /// Depends on the current time: results must not be cached across calls.
    pub async fn compute_available_slots(&self, coach_id: Id, date: &str) -> Result<AvailableSlots, EngineError> {
        let date = parse_date(date)?;
        let cs = self
            .get_coach(coach_id)
            .ok_or(EngineError::NotFound("coach", coach_id))?;
        let guard = cs.read().await;
        let slots = available_slots(
            guard.schedule_entry(day_of_week(date)),
            date,
            self.clock.now(),
            self.settings.min_lead,
            &guard.booked_times_on(date),
        );
        Ok(AvailableSlots { date, slots })
    }

    pub async fn get_coach_info(&self, coach_id: Id) -> Result<Coach, EngineError> {
        let cs = self
            .get_coach(coach_id)
            .ok_or(EngineError::NotFound("coach", coach_id))?;
        let guard = cs.read().await;
        Ok(guard.coach.clone())
    }

    pub async fn list_coaches(&self) -> Vec<Coach> {
        let all: Vec<SharedCoachState> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut coaches = Vec::with_capacity(all.len());
        for cs in all {
            coaches.push(cs.read().await.coach.clone());
        }
        coaches.sort_by_key(|c| c.id);
        coaches
    }

    /// Seven rows, missing weekdays filled with disabled defaults.
    pub async fn weekly_schedule(&self, coach_id: Id) -> Result<Vec<WeeklyScheduleEntry>, EngineError> {
        let cs = self
            .get_coach(coach_id)
            .ok_or(EngineError::NotFound("coach", coach_id))?;
        let guard = cs.read().await;
        Ok(guard.week())
    }

    /// Enrollments visible to `principal`: admins see everything, coaches the
    /// rows of profiles they own, students their own requests.
    pub async fn list_enrollments(
        &self,
        principal: Option<&Principal>,
        filter: EnrollmentFilter,
    ) -> Result<Vec<Enrollment>, EngineError> {
        let principal = principal.ok_or(EngineError::Unauthorized)?;

        let coach_ids: Vec<Id> = match (filter.coach_id, filter.id) {
            (Some(c), _) => vec![c],
            (None, Some(id)) => self.coach_for_enrollment(id).into_iter().collect(),
            (None, None) => self.state.iter().map(|e| *e.key()).collect(),
        };

        let mut out = Vec::new();
        for coach_id in coach_ids {
            let Some(cs) = self.get_coach(coach_id) else {
                continue;
            };
            let guard = cs.read().await;
            let owns_coach = principal.role == Role::Coach && guard.coach.is_owned_by(principal.id);
            out.extend(
                guard
                    .enrollments
                    .values()
                    .filter(|e| match principal.role {
                        Role::Admin => true,
                        Role::Coach => owns_coach,
                        Role::User => e.user_id == principal.id,
                    })
                    .filter(|e| filter.matches(e))
                    .cloned(),
            );
        }
        out.sort_by_key(|e| e.id);
        Ok(out)
    }

    /// Reviews of a coach. Unverified reviews are visible to admins only.
    pub async fn list_reviews(&self, principal: Option<&Principal>, coach_id: Id) -> Result<Vec<Review>, EngineError> {
        let is_admin = principal.is_some_and(|p| p.role == Role::Admin);
        let cs = self
            .get_coach(coach_id)
            .ok_or(EngineError::NotFound("coach", coach_id))?;
        let guard = cs.read().await;
        Ok(guard
            .reviews
            .values()
            .filter(|r| is_admin || r.verified)
            .cloned()
            .collect())
    }
}
