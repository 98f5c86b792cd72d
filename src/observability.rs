use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "coachbook_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "coachbook_query_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "coachbook_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "coachbook_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "coachbook_connections_rejected_total";

/// Counter: startup/auth failures.
pub const AUTH_FAILURES_TOTAL: &str = "coachbook_auth_failures_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "coachbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "coachbook_wal_flush_batch_size";

// ── Domain ──────────────────────────────────────────────────────

/// Gauge: coach profiles loaded.
pub const COACHES_ACTIVE: &str = "coachbook_coaches_active";

/// Counter: applied enrollment transitions. Labels: from, to.
pub const ENROLLMENT_TRANSITIONS_TOTAL: &str = "coachbook_enrollment_transitions_total";

/// Counter: coaches whose cached student count disagreed with their rows.
pub const STUDENT_COUNT_DRIFT_TOTAL: &str = "coachbook_student_count_drift_total";

/// Counter: WAL compactions. Labels: status.
pub const WAL_COMPACTIONS_TOTAL: &str = "coachbook_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::SelectAvailability { .. } => "select_availability",
        Command::InsertEnrollment { .. } => "insert_enrollment",
        Command::InsertTransition { .. } => "insert_transition",
        Command::SelectEnrollments { .. } => "select_enrollments",
        Command::InsertCoach { .. } => "insert_coach",
        Command::LinkCoachAccount { .. } => "link_coach_account",
        Command::SelectCoaches { .. } => "select_coaches",
        Command::ReplaceSchedule { .. } => "replace_schedule",
        Command::SelectSchedule { .. } => "select_schedule",
        Command::InsertReview { .. } => "insert_review",
        Command::SelectReviews { .. } => "select_reviews",
        Command::ModerateReview { .. } => "moderate_review",
        Command::SelectReconciliation => "select_reconciliation",
    }
}
