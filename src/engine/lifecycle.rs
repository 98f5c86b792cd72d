use crate::model::*;

use super::EngineError;

/// How a principal relates to one enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// The user who requested the enrollment.
    Student,
    /// The account linked to the enrollment's coach profile.
    CoachOwner,
    Admin,
}

/// One edge of the enrollment state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: EnrollmentStatus,
    pub to: EnrollmentStatus,
    pub allowed: &'static [Actor],
    /// Adjustment applied to `Coach::students_count` in the same record.
    pub students_delta: i32,
    /// Whether the caller's message is stored as `coach_message`.
    pub keeps_message: bool,
}

use Actor::*;
use EnrollmentStatus::*;

/// Every permitted status change. Anything not listed is an invalid transition.
pub const TRANSITIONS: &[Transition] = &[
    Transition {
        from: Pending,
        to: Approved,
        allowed: &[CoachOwner, Admin],
        students_delta: 1,
        keeps_message: true,
    },
    Transition {
        from: Pending,
        to: Rejected,
        allowed: &[CoachOwner, Admin],
        students_delta: 0,
        keeps_message: true,
    },
    Transition {
        from: Pending,
        to: Cancelled,
        allowed: &[Student, CoachOwner, Admin],
        students_delta: 0,
        keeps_message: true,
    },
    Transition {
        from: Approved,
        to: Cancelled,
        allowed: &[Student, CoachOwner, Admin],
        students_delta: -1,
        keeps_message: true,
    },
    Transition {
        from: Approved,
        to: Completed,
        allowed: &[Admin],
        students_delta: 0,
        keeps_message: false,
    },
];

pub fn find_transition(from: EnrollmentStatus, to: EnrollmentStatus) -> Option<&'static Transition> {
    TRANSITIONS.iter().find(|t| t.from == from && t.to == to)
}

/// Relations `principal` holds towards `enrollment` of `coach`.
pub fn actors_for(principal: &Principal, coach: &Coach, enrollment: &Enrollment) -> Vec<Actor> {
    let mut actors = Vec::with_capacity(1);
    match principal.role {
        Role::Admin => actors.push(Admin),
        Role::Coach if coach.is_owned_by(principal.id) => actors.push(CoachOwner),
        Role::User if enrollment.user_id == principal.id => actors.push(Student),
        _ => {}
    }
    actors
}

/// Decide whether `principal` may move `enrollment` to `to`.
///
/// Unrelated callers are refused before the current status is consulted.
pub fn authorize_transition(
    principal: &Principal,
    coach: &Coach,
    enrollment: &Enrollment,
    to: EnrollmentStatus,
) -> Result<&'static Transition, EngineError> {
    let actors = actors_for(principal, coach, enrollment);
    if actors.is_empty() {
        return Err(EngineError::Forbidden("not a party to this enrollment"));
    }
    let transition = find_transition(enrollment.status, to).ok_or(EngineError::InvalidTransition {
        from: enrollment.status,
        to,
    })?;
    if !transition.allowed.iter().any(|a| actors.contains(a)) {
        return Err(EngineError::Forbidden("role may not perform this transition"));
    }
    Ok(transition)
}

/// Only plain users may request an enrollment.
pub fn authorize_create(principal: Option<&Principal>) -> Result<&Principal, EngineError> {
    let principal = principal.ok_or(EngineError::Unauthorized)?;
    if principal.role != Role::User {
        return Err(EngineError::Forbidden("only students may request enrollments"));
    }
    Ok(principal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EnrollmentStatus::*;
    use chrono::NaiveDateTime;

    const ALL: [EnrollmentStatus; 5] = [Pending, Approved, Rejected, Completed, Cancelled];

    fn coach() -> Coach {
        Coach::new(1, Some(100), None, None)
    }

    fn enrollment(status: EnrollmentStatus) -> Enrollment {
        let at = NaiveDateTime::parse_from_str("2026-03-02 09:00", "%Y-%m-%d %H:%M").unwrap();
        Enrollment {
            id: 5,
            user_id: 200,
            coach_id: 1,
            status,
            message: None,
            coach_message: None,
            session_at: None,
            created_at: at,
            updated_at: at,
        }
    }

    fn student() -> Principal {
        Principal::new(200, Role::User)
    }
    fn owner() -> Principal {
        Principal::new(100, Role::Coach)
    }
    fn admin() -> Principal {
        Principal::new(1, Role::Admin)
    }

    #[test]
    fn table_has_no_duplicate_edges() {
        for (i, a) in TRANSITIONS.iter().enumerate() {
            for b in &TRANSITIONS[i + 1..] {
                assert!(!(a.from == b.from && a.to == b.to));
            }
        }
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for t in TRANSITIONS {
            assert!(!t.from.is_terminal(), "{} is terminal but has an outgoing edge", t.from);
        }
    }

    #[test]
    fn only_listed_edges_pass_for_admin() {
        for from in ALL {
            for to in ALL {
                let res = authorize_transition(&admin(), &coach(), &enrollment(from), to);
                match find_transition(from, to) {
                    Some(_) => assert!(res.is_ok(), "{from} -> {to}"),
                    None => assert!(
                        matches!(res, Err(EngineError::InvalidTransition { .. })),
                        "{from} -> {to}"
                    ),
                }
            }
        }
    }

    #[test]
    fn student_may_only_cancel() {
        let c = coach();
        assert!(authorize_transition(&student(), &c, &enrollment(Pending), Cancelled).is_ok());
        assert!(authorize_transition(&student(), &c, &enrollment(Approved), Cancelled).is_ok());
        assert!(matches!(
            authorize_transition(&student(), &c, &enrollment(Pending), Approved),
            Err(EngineError::Forbidden(_))
        ));
        assert!(matches!(
            authorize_transition(&student(), &c, &enrollment(Approved), Completed),
            Err(EngineError::Forbidden(_))
        ));
    }

    #[test]
    fn owner_cannot_complete() {
        let c = coach();
        assert!(authorize_transition(&owner(), &c, &enrollment(Pending), Approved).is_ok());
        assert!(authorize_transition(&owner(), &c, &enrollment(Pending), Rejected).is_ok());
        assert!(matches!(
            authorize_transition(&owner(), &c, &enrollment(Approved), Completed),
            Err(EngineError::Forbidden(_))
        ));
    }

    #[test]
    fn strangers_are_forbidden() {
        let c = coach();
        let other_coach = Principal::new(101, Role::Coach);
        let other_user = Principal::new(201, Role::User);
        // Role names alone grant nothing without ownership.
        let impostor = Principal::new(200, Role::Coach);
        for p in [other_coach, other_user, impostor] {
            assert!(matches!(
                authorize_transition(&p, &c, &enrollment(Pending), Cancelled),
                Err(EngineError::Forbidden(_))
            ));
        }
    }

    #[test]
    fn repeat_approve_is_invalid_transition() {
        let res = authorize_transition(&owner(), &coach(), &enrollment(Approved), Approved);
        assert!(matches!(
            res,
            Err(EngineError::InvalidTransition { from: Approved, to: Approved })
        ));
    }

    #[test]
    fn deltas_match_aggregate_rules() {
        assert_eq!(find_transition(Pending, Approved).unwrap().students_delta, 1);
        assert_eq!(find_transition(Approved, Cancelled).unwrap().students_delta, -1);
        assert_eq!(find_transition(Pending, Cancelled).unwrap().students_delta, 0);
        assert!(!find_transition(Approved, Completed).unwrap().keeps_message);
    }

    #[test]
    fn create_requires_user_role() {
        assert!(matches!(authorize_create(None), Err(EngineError::Unauthorized)));
        assert!(matches!(authorize_create(Some(&owner())), Err(EngineError::Forbidden(_))));
        assert!(matches!(authorize_create(Some(&admin())), Err(EngineError::Forbidden(_))));
        assert!(authorize_create(Some(&student())).is_ok());
    }
}
