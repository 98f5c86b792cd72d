//! Coach aggregates: the only write path for `students_count`, `rating` and
//! `review_count`. All three are caches recomputable from enrollment and
//! review rows.

use tracing::{info, warn};

use crate::model::*;

use super::mutations::require_admin;
use super::{Engine, EngineError};

/// Apply a student-count delta, saturating at zero.
pub fn adjust_student_count(coach: &mut Coach, delta: i32) {
    coach.students_count = if delta >= 0 {
        coach.students_count.saturating_add(delta as u32)
    } else {
        coach.students_count.saturating_sub(delta.unsigned_abs())
    };
}

/// Mean of verified review ratings, 0 when there are none.
pub fn recompute_rating(state: &mut CoachState) {
    let (sum, count) = state
        .reviews
        .values()
        .filter(|r| r.verified)
        .fold((0u64, 0u32), |(sum, n), r| (sum + u64::from(r.rating), n + 1));
    state.coach.review_count = count;
    state.coach.rating = if count == 0 { 0.0 } else { sum as f64 / f64::from(count) };
}

pub fn drift_report(state: &CoachState) -> DriftReport {
    DriftReport {
        coach_id: state.coach.id,
        live: state.coach.students_count,
        expected: state.counted_students(),
    }
}

impl Engine {
    /// Recompute a coach's rating from its verified reviews.
    pub async fn recompute_rating(&self, coach_id: Id) -> Result<(f64, u32), EngineError> {
        let cs = self
            .get_coach(coach_id)
            .ok_or(EngineError::NotFound("coach", coach_id))?;
        let _gate = self.wal_gate.read().await;
        let mut guard = cs.write().await;
        recompute_rating(&mut guard);
        Ok((guard.coach.rating, guard.coach.review_count))
    }

    /// Read-only drift report for administrators.
    pub async fn student_count_report(&self, principal: Option<&Principal>) -> Result<Vec<DriftReport>, EngineError> {
        require_admin(principal)?;
        self.reconcile_student_counts(false).await
    }

    /// Compare every coach's live `students_count` with the count derived from
    /// its enrollments. With `repair`, drifted counters are overwritten through
    /// the WAL.
    pub async fn reconcile_student_counts(&self, repair: bool) -> Result<Vec<DriftReport>, EngineError> {
        let _gate = self.wal_gate.read().await;
        let mut ids: Vec<Id> = self.state.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();

        let mut reports = Vec::with_capacity(ids.len());
        for coach_id in ids {
            let Some(cs) = self.get_coach(coach_id) else {
                continue;
            };
            let mut guard = cs.write().await;
            let report = drift_report(&guard);
            if report.drifted() {
                warn!(
                    "student count drift on coach {coach_id}: live {} expected {}",
                    report.live, report.expected
                );
                metrics::counter!(crate::observability::STUDENT_COUNT_DRIFT_TOTAL).increment(1);
                if repair {
                    let event = Event::StudentCountReconciled {
                        coach_id,
                        students_count: report.expected,
                    };
                    self.persist_and_apply(&mut guard, &event).await?;
                    info!("repaired student count on coach {coach_id} to {}", report.expected);
                }
            }
            reports.push(report);
        }
        Ok(reports)
    }
}
