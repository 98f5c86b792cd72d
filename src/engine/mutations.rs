use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::NaiveDateTime;
use tokio::sync::{RwLock, oneshot};
use tracing::{debug, info};

use crate::limits::*;
use crate::model::*;

use super::availability::{available_slots, day_of_week, normalize_week};
use super::lifecycle::{authorize_create, authorize_transition};
use super::{Engine, EngineError, WalCommand};

pub(super) fn require_admin(principal: Option<&Principal>) -> Result<&Principal, EngineError> {
    let principal = principal.ok_or(EngineError::Unauthorized)?;
    if principal.role != Role::Admin {
        return Err(EngineError::Forbidden("admin only"));
    }
    Ok(principal)
}

fn check_len(value: &Option<String>, max: usize, what: &'static str) -> Result<(), EngineError> {
    match value {
        Some(v) if v.len() > max => Err(EngineError::LimitExceeded(what)),
        _ => Ok(()),
    }
}

impl Engine {
    // ── Coach administration ─────────────────────────────────

    pub async fn create_coach(
        &self,
        principal: Option<&Principal>,
        id: Id,
        user_id: Option<Id>,
        name: Option<String>,
        price: Option<i64>,
    ) -> Result<Coach, EngineError> {
        require_admin(principal)?;
        check_len(&name, MAX_NAME_LEN, "coach name too long")?;
        if price.is_some_and(|p| p < 0) {
            return Err(EngineError::InvalidInput("price must not be negative".into()));
        }
        // Exclusive gate: no other mutation runs, so the id check cannot race the insert.
        let _gate = self.wal_gate.write().await;
        if self.state.len() >= MAX_COACHES {
            return Err(EngineError::LimitExceeded("too many coaches"));
        }
        if self.state.contains_key(&id) {
            return Err(EngineError::AlreadyExists("coach", id));
        }

        let event = Event::CoachCreated {
            id,
            user_id,
            name: name.clone(),
            price,
        };
        self.wal_append(&event).await?;
        let coach = Coach::new(id, user_id, name, price);
        self.state
            .insert(id, Arc::new(RwLock::new(CoachState::new(coach.clone()))));
        metrics::gauge!(crate::observability::COACHES_ACTIVE).set(self.state.len() as f64);
        info!("created coach {id}");
        Ok(coach)
    }

    /// Attach an account to a coach profile that was created without one.
    pub async fn link_coach_account(
        &self,
        principal: Option<&Principal>,
        coach_id: Id,
        user_id: Id,
    ) -> Result<Coach, EngineError> {
        require_admin(principal)?;
        let _gate = self.wal_gate.read().await;
        let cs = self
            .get_coach(coach_id)
            .ok_or(EngineError::NotFound("coach", coach_id))?;
        let mut guard = cs.write().await;
        let event = Event::CoachAccountLinked { id: coach_id, user_id };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(guard.coach.clone())
    }

    /// Replace-all save of a coach's weekly template. Always leaves seven rows.
    pub async fn replace_schedule(
        &self,
        principal: Option<&Principal>,
        coach_id: Id,
        entries: Vec<WeeklyScheduleEntry>,
    ) -> Result<Vec<WeeklyScheduleEntry>, EngineError> {
        let principal = principal.ok_or(EngineError::Unauthorized)?;
        let week = normalize_week(coach_id, entries)?;

        let _gate = self.wal_gate.read().await;
        let cs = self
            .get_coach(coach_id)
            .ok_or(EngineError::NotFound("coach", coach_id))?;
        let mut guard = cs.write().await;
        let allowed = match principal.role {
            Role::Admin => true,
            Role::Coach => guard.coach.is_owned_by(principal.id),
            Role::User => false,
        };
        if !allowed {
            return Err(EngineError::Forbidden("only the owning coach or an admin may edit a schedule"));
        }

        let event = Event::ScheduleReplaced {
            coach_id,
            entries: week,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(guard.schedule.clone())
    }

    // ── Enrollment lifecycle ─────────────────────────────────

    /// Request an enrollment. The only write path that creates enrollment rows.
    ///
    /// With `session_at`, the requested time must be an open slot right now.
    pub async fn create_enrollment(
        &self,
        principal: Option<&Principal>,
        coach_id: Id,
        message: Option<String>,
        session_at: Option<NaiveDateTime>,
    ) -> Result<Enrollment, EngineError> {
        let principal = authorize_create(principal)?;
        check_len(&message, MAX_MESSAGE_LEN, "message too long")?;

        let _gate = self.wal_gate.read().await;
        let cs = self
            .get_coach(coach_id)
            .ok_or(EngineError::NotFound("coach", coach_id))?;
        let mut guard = cs.write().await;
        if guard.enrollments.len() >= MAX_ENROLLMENTS_PER_COACH {
            return Err(EngineError::LimitExceeded("too many enrollments on coach"));
        }
        if let Some(existing) = guard.active_enrollment_for(principal.id) {
            return Err(EngineError::Conflict(format!(
                "enrollment {} is already {} for this coach",
                existing.id, existing.status
            )));
        }

        let now = self.clock.now();
        if let Some(at) = session_at {
            if (at.date() - now.date()).num_days() > MAX_BOOKING_HORIZON_DAYS {
                return Err(EngineError::LimitExceeded("session too far in the future"));
            }
            let date = at.date();
            let open = available_slots(
                guard.schedule_entry(day_of_week(date)),
                date,
                now,
                self.settings.min_lead,
                &guard.booked_times_on(date),
            );
            if !open.contains(&at.time()) {
                return Err(EngineError::InvalidInput(format!(
                    "{} is not an available slot",
                    at.format("%Y-%m-%d %H:%M")
                )));
            }
        }

        let enrollment = Enrollment {
            id: self.next_enrollment_id.fetch_add(1, Ordering::SeqCst),
            user_id: principal.id,
            coach_id,
            status: EnrollmentStatus::Pending,
            message,
            coach_message: None,
            session_at,
            created_at: now,
            updated_at: now,
        };
        let event = Event::EnrollmentCreated {
            enrollment: enrollment.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        info!(
            "enrollment {} created: user {} -> coach {coach_id}",
            enrollment.id, enrollment.user_id
        );
        Ok(enrollment)
    }

    /// Move an enrollment to `to`. Guard, status write and aggregate
    /// adjustment happen under the coach's write lock as one WAL record.
    pub async fn update_status(
        &self,
        principal: Option<&Principal>,
        enrollment_id: Id,
        to: EnrollmentStatus,
        caller_message: Option<String>,
    ) -> Result<Enrollment, EngineError> {
        let principal = principal.ok_or(EngineError::Unauthorized)?;
        check_len(&caller_message, MAX_MESSAGE_LEN, "message too long")?;

        let _gate = self.wal_gate.read().await;
        let mut guard = self.resolve_enrollment_write(enrollment_id).await?;
        let current = guard
            .enrollments
            .get(&enrollment_id)
            .cloned()
            .ok_or(EngineError::NotFound("enrollment", enrollment_id))?;

        let transition = authorize_transition(principal, &guard.coach, &current, to)?;

        if to == EnrollmentStatus::Approved
            && let Some(at) = current.session_at
        {
            let taken = guard.enrollments.values().any(|e| {
                e.id != current.id && e.status == EnrollmentStatus::Approved && e.session_at == Some(at)
            });
            if taken {
                return Err(EngineError::Conflict(format!(
                    "{} is already booked",
                    at.format("%Y-%m-%d %H:%M")
                )));
            }
        }

        let event = Event::EnrollmentTransitioned {
            id: enrollment_id,
            coach_id: current.coach_id,
            status: to,
            coach_message: if transition.keeps_message { caller_message } else { None },
            at: self.clock.now(),
            students_delta: transition.students_delta,
        };
        self.persist_and_apply(&mut guard, &event).await?;

        metrics::counter!(
            crate::observability::ENROLLMENT_TRANSITIONS_TOTAL,
            "from" => current.status.as_str(),
            "to" => to.as_str()
        )
        .increment(1);
        info!(
            "enrollment {enrollment_id}: {} -> {to} by {} {}",
            current.status,
            principal.role.as_str(),
            principal.id
        );

        guard
            .enrollments
            .get(&enrollment_id)
            .cloned()
            .ok_or(EngineError::NotFound("enrollment", enrollment_id))
    }

    // ── Reviews ──────────────────────────────────────────────

    /// A student with a completed enrollment may leave one review per coach.
    /// Reviews start unverified and do not affect the rating until moderated.
    pub async fn submit_review(
        &self,
        principal: Option<&Principal>,
        coach_id: Id,
        rating: u8,
        comment: Option<String>,
    ) -> Result<Review, EngineError> {
        let principal = principal.ok_or(EngineError::Unauthorized)?;
        if principal.role != Role::User {
            return Err(EngineError::Forbidden("only students may review"));
        }
        if !(1..=5).contains(&rating) {
            return Err(EngineError::InvalidInput(format!("rating {rating} outside 1..=5")));
        }
        check_len(&comment, MAX_COMMENT_LEN, "comment too long")?;

        let _gate = self.wal_gate.read().await;
        let cs = self
            .get_coach(coach_id)
            .ok_or(EngineError::NotFound("coach", coach_id))?;
        let mut guard = cs.write().await;
        if guard.reviews.len() >= MAX_REVIEWS_PER_COACH {
            return Err(EngineError::LimitExceeded("too many reviews on coach"));
        }
        let completed = guard
            .enrollments
            .values()
            .any(|e| e.user_id == principal.id && e.status == EnrollmentStatus::Completed);
        if !completed {
            return Err(EngineError::Forbidden("no completed enrollment with this coach"));
        }
        if guard.reviews.values().any(|r| r.user_id == principal.id) {
            return Err(EngineError::Conflict("coach already reviewed".into()));
        }

        let review = Review {
            id: self.next_review_id.fetch_add(1, Ordering::SeqCst),
            coach_id,
            user_id: principal.id,
            rating,
            comment,
            verified: false,
            created_at: self.clock.now(),
        };
        let event = Event::ReviewSubmitted {
            review: review.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(review)
    }

    /// Admin moderation. The coach's rating is recomputed in the same record.
    pub async fn moderate_review(
        &self,
        principal: Option<&Principal>,
        review_id: Id,
        verified: bool,
    ) -> Result<Review, EngineError> {
        require_admin(principal)?;
        let _gate = self.wal_gate.read().await;
        let coach_id = self
            .coach_for_review(review_id)
            .ok_or(EngineError::NotFound("review", review_id))?;
        let cs = self
            .get_coach(coach_id)
            .ok_or(EngineError::NotFound("coach", coach_id))?;
        let mut guard = cs.write().await;

        let event = Event::ReviewModerated {
            id: review_id,
            coach_id,
            verified,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        debug!(
            "review {review_id} moderated, coach {coach_id} rating now {:.2}",
            guard.coach.rating
        );
        guard
            .reviews
            .get(&review_id)
            .cloned()
            .ok_or(EngineError::NotFound("review", review_id))
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Compact the WAL into one snapshot record per coach.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.wal_gate.write().await;

        let mut ids: Vec<Id> = self.state.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        let mut events = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(cs) = self.get_coach(id) else {
                continue;
            };
            let guard = cs.read().await;
            events.push(Event::CoachSnapshot {
                coach: guard.coach.clone(),
                schedule: guard.schedule.clone(),
                enrollments: guard.enrollments.values().cloned().collect(),
                reviews: guard.reviews.values().cloned().collect(),
            });
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::StoreUnavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::StoreUnavailable("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::StoreUnavailable(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
