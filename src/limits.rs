//! Hard caps that keep a single engine's memory and WAL records bounded.

pub const MAX_COACHES: usize = 100_000;
pub const MAX_ENROLLMENTS_PER_COACH: usize = 50_000;
pub const MAX_REVIEWS_PER_COACH: usize = 50_000;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_MESSAGE_LEN: usize = 4_096;
pub const MAX_COMMENT_LEN: usize = 4_096;

/// How far ahead a session may be requested.
pub const MAX_BOOKING_HORIZON_DAYS: i64 = 366;
