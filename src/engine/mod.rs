mod aggregates;
mod availability;
mod error;
mod lifecycle;
mod mutations;
mod queries;

pub use aggregates::{adjust_student_count, drift_report, recompute_rating};
pub use availability::{
    available_slots, day_of_week, normalize_week, parse_date, parse_session_at, parse_time_of_day,
    slot_times,
};
pub use error::EngineError;
pub use lifecycle::{Actor, TRANSITIONS, Transition, authorize_transition, find_transition};
pub use queries::EnrollmentFilter;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::warn;

use crate::clock::Clock;
use crate::model::*;
use crate::wal::Wal;

pub type SharedCoachState = Arc<RwLock<CoachState>>;

/// Tunables that shape availability answers.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Slots starting before `now + min_lead` are not offered.
    pub min_lead: chrono::Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            min_lead: chrono::Duration::zero(),
        }
    }
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders with the shared result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break, // channel empty, flush batch
                    }
                }

                metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                    .record(batch.len() as f64);
                let flush_start = std::time::Instant::now();
                let result = flush_batch(&mut wal, &batch);
                metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                    .record(flush_start.elapsed().as_secs_f64());
                respond_batch(batch, &result);

                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even on append error so partially buffered bytes don't leak
    // into the next batch.
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

pub struct Engine {
    pub state: DashMap<Id, SharedCoachState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Mutations hold it shared; compaction holds it exclusively so no append
    /// can slip between the snapshot and the file swap. Always taken before
    /// any coach lock.
    pub(super) wal_gate: RwLock<()>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) settings: EngineSettings,
    /// Reverse lookup: enrollment id → coach id
    pub(super) enrollment_to_coach: DashMap<Id, Id>,
    /// Reverse lookup: review id → coach id
    pub(super) review_to_coach: DashMap<Id, Id>,
    pub(super) next_enrollment_id: AtomicI64,
    pub(super) next_review_id: AtomicI64,
}

/// Row indexes maintained alongside coach state.
struct Indexes<'a> {
    enrollments: &'a DashMap<Id, Id>,
    reviews: &'a DashMap<Id, Id>,
}

/// Apply an event directly to a CoachState (caller holds the lock).
fn apply_to_coach(cs: &mut CoachState, event: &Event, idx: &Indexes<'_>) {
    match event {
        Event::CoachAccountLinked { user_id, .. } => {
            cs.coach.user_id = Some(*user_id);
        }
        Event::ScheduleReplaced { entries, .. } => {
            cs.schedule = entries.clone();
        }
        Event::EnrollmentCreated { enrollment } => {
            idx.enrollments.insert(enrollment.id, enrollment.coach_id);
            cs.enrollments.insert(enrollment.id, enrollment.clone());
        }
        Event::EnrollmentTransitioned {
            id,
            status,
            coach_message,
            at,
            students_delta,
            ..
        } => {
            if let Some(e) = cs.enrollments.get_mut(id) {
                e.status = *status;
                e.updated_at = *at;
                if coach_message.is_some() {
                    e.coach_message = coach_message.clone();
                }
            }
            adjust_student_count(&mut cs.coach, *students_delta);
        }
        Event::StudentCountReconciled { students_count, .. } => {
            cs.coach.students_count = *students_count;
        }
        Event::ReviewSubmitted { review } => {
            idx.reviews.insert(review.id, review.coach_id);
            cs.reviews.insert(review.id, review.clone());
        }
        Event::ReviewModerated { id, verified, .. } => {
            if let Some(r) = cs.reviews.get_mut(id) {
                r.verified = *verified;
            }
            recompute_rating(cs);
        }
        // CoachCreated/CoachSnapshot are handled at the DashMap level, not here
        Event::CoachCreated { .. } | Event::CoachSnapshot { .. } => {}
    }
}

fn state_from_snapshot(
    coach: &Coach,
    schedule: &[WeeklyScheduleEntry],
    enrollments: &[Enrollment],
    reviews: &[Review],
) -> CoachState {
    let mut cs = CoachState::new(coach.clone());
    cs.schedule = schedule.to_vec();
    cs.enrollments = enrollments.iter().map(|e| (e.id, e.clone())).collect();
    cs.reviews = reviews.iter().map(|r| (r.id, r.clone())).collect();
    cs
}

impl Engine {
    pub fn new(wal_path: PathBuf, clock: Arc<dyn Clock>, settings: EngineSettings) -> io::Result<Self> {
        let replay = Wal::replay(&wal_path)?;
        if replay.discarded_tail {
            warn!(
                "WAL {} has a torn tail after {} records, truncating to {} bytes",
                wal_path.display(),
                replay.events.len(),
                replay.valid_len
            );
            Wal::truncate(&wal_path, replay.valid_len)?;
        }
        let events = replay.events;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            wal_gate: RwLock::new(()),
            clock,
            settings,
            enrollment_to_coach: DashMap::new(),
            review_to_coach: DashMap::new(),
            next_enrollment_id: AtomicI64::new(1),
            next_review_id: AtomicI64::new(1),
        };

        // Sole owner of these Arcs during replay, so try_write never contends.
        // blocking_write would panic inside the runtime.
        let idx = Indexes {
            enrollments: &engine.enrollment_to_coach,
            reviews: &engine.review_to_coach,
        };
        for event in &events {
            match event {
                Event::CoachCreated {
                    id,
                    user_id,
                    name,
                    price,
                } => {
                    let cs = CoachState::new(Coach::new(*id, *user_id, name.clone(), *price));
                    engine.state.insert(*id, Arc::new(RwLock::new(cs)));
                }
                Event::CoachSnapshot {
                    coach,
                    schedule,
                    enrollments,
                    reviews,
                } => {
                    for e in enrollments {
                        engine.enrollment_to_coach.insert(e.id, coach.id);
                    }
                    for r in reviews {
                        engine.review_to_coach.insert(r.id, coach.id);
                    }
                    let cs = state_from_snapshot(coach, schedule, enrollments, reviews);
                    engine.state.insert(coach.id, Arc::new(RwLock::new(cs)));
                }
                other => {
                    if let Some(entry) = engine.state.get(&other.coach_id()) {
                        let cs = entry.clone();
                        let Ok(mut guard) = cs.try_write() else {
                            return Err(io::Error::other("replay: coach state contended"));
                        };
                        apply_to_coach(&mut guard, other, &idx);
                    }
                }
            }
        }

        let max_enrollment = engine.enrollment_to_coach.iter().map(|e| *e.key()).max().unwrap_or(0);
        let max_review = engine.review_to_coach.iter().map(|e| *e.key()).max().unwrap_or(0);
        engine.next_enrollment_id.store(max_enrollment + 1, Ordering::SeqCst);
        engine.next_review_id.store(max_review + 1, Ordering::SeqCst);
        metrics::gauge!(crate::observability::COACHES_ACTIVE).set(engine.state.len() as f64);

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::StoreUnavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::StoreUnavailable("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::StoreUnavailable(e.to_string()))
    }

    pub fn get_coach(&self, id: Id) -> Option<SharedCoachState> {
        self.state.get(&id).map(|e| e.value().clone())
    }

    pub fn coach_for_enrollment(&self, enrollment_id: Id) -> Option<Id> {
        self.enrollment_to_coach.get(&enrollment_id).map(|e| *e.value())
    }

    pub fn coach_for_review(&self, review_id: Id) -> Option<Id> {
        self.review_to_coach.get(&review_id).map(|e| *e.value())
    }

    pub fn now(&self) -> chrono::NaiveDateTime {
        self.clock.now()
    }

    /// WAL-append then apply. The record is durable before memory changes, so a
    /// failed append leaves state untouched.
    pub(super) async fn persist_and_apply(&self, cs: &mut CoachState, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        let idx = Indexes {
            enrollments: &self.enrollment_to_coach,
            reviews: &self.review_to_coach,
        };
        apply_to_coach(cs, event, &idx);
        Ok(())
    }

    /// Lookup enrollment → coach, acquire that coach's write lock.
    pub(super) async fn resolve_enrollment_write(
        &self,
        enrollment_id: Id,
    ) -> Result<tokio::sync::OwnedRwLockWriteGuard<CoachState>, EngineError> {
        let coach_id = self
            .coach_for_enrollment(enrollment_id)
            .ok_or(EngineError::NotFound("enrollment", enrollment_id))?;
        let cs = self
            .get_coach(coach_id)
            .ok_or(EngineError::NotFound("coach", coach_id))?;
        Ok(cs.write_owned().await)
    }
}
