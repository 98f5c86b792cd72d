use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::Sink;
use futures::stream;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo, QueryResponse,
    Response,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;
use tracing::debug;

use crate::auth::{AccountDirectory, Authenticator, CoachbookAuthSource};
use crate::engine::{Engine, EngineError, EnrollmentFilter, parse_session_at, parse_time_of_day};
use crate::model::*;
use crate::observability;
use crate::sql::{self, Command, ScheduleRow};

pub struct CoachbookHandler {
    engine: Arc<Engine>,
    authenticator: Arc<dyn Authenticator>,
    query_parser: Arc<CoachbookQueryParser>,
}

impl CoachbookHandler {
    pub fn new(engine: Arc<Engine>, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            engine,
            authenticator,
            query_parser: Arc::new(CoachbookQueryParser),
        }
    }

    /// The principal behind the connection's login. The public login maps to `None`.
    fn resolve_principal<C: ClientInfo>(&self, client: &C) -> Option<Principal> {
        client
            .metadata()
            .get("user")
            .and_then(|login| self.authenticator.principal_for(login))
    }

    /// Parse, execute and record metrics for one statement.
    async fn run(&self, principal: Option<Principal>, query: &str) -> PgWireResult<Response> {
        let cmd = match sql::parse_sql(query) {
            Ok(cmd) => cmd,
            Err(e) => {
                metrics::counter!(observability::QUERIES_TOTAL, "command" => "unparsed", "status" => "error")
                    .increment(1);
                return Err(sql_err(e));
            }
        };
        let label = observability::command_label(&cmd);
        let start = Instant::now();
        let result = self.execute_command(principal.as_ref(), cmd).await;
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(start.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        if let Err(e) = &result {
            debug!("{label} failed: {e}");
        }
        result.map_err(engine_err)
    }

    async fn execute_command(&self, principal: Option<&Principal>, cmd: Command) -> Result<Response, EngineError> {
        let engine = &self.engine;
        match cmd {
            Command::SelectAvailability { coach_id, date } => {
                let slots = engine.compute_available_slots(coach_id, &date).await?;
                let date = slots.date.format("%Y-%m-%d").to_string();
                Ok(rows(availability_schema(), slots.slot_strings(), |enc, slot| {
                    enc.encode_field(&date)?;
                    enc.encode_field(slot)
                }))
            }
            Command::InsertEnrollment {
                coach_id,
                message,
                session_at,
            } => {
                let session_at = session_at.as_deref().map(parse_session_at).transpose()?;
                let enrollment = engine
                    .create_enrollment(principal, coach_id, message, session_at)
                    .await?;
                Ok(enrollment_rows(vec![enrollment]))
            }
            Command::InsertTransition {
                enrollment_id,
                status,
                coach_message,
            } => {
                let enrollment = engine
                    .update_status(principal, enrollment_id, status, coach_message)
                    .await?;
                Ok(enrollment_rows(vec![enrollment]))
            }
            Command::SelectEnrollments { id, coach_id, status } => {
                let filter = EnrollmentFilter { id, coach_id, status };
                Ok(enrollment_rows(engine.list_enrollments(principal, filter).await?))
            }
            Command::InsertCoach {
                id,
                user_id,
                name,
                price,
            } => {
                let coach = engine.create_coach(principal, id, user_id, name, price).await?;
                Ok(coach_rows(vec![coach]))
            }
            Command::LinkCoachAccount { coach_id, user_id } => {
                let coach = engine.link_coach_account(principal, coach_id, user_id).await?;
                Ok(coach_rows(vec![coach]))
            }
            Command::SelectCoaches { id: Some(id) } => Ok(coach_rows(vec![engine.get_coach_info(id).await?])),
            Command::SelectCoaches { id: None } => Ok(coach_rows(engine.list_coaches().await)),
            Command::ReplaceSchedule { coach_id, rows } => {
                let entries = schedule_entries(coach_id, rows)?;
                Ok(schedule_rows(engine.replace_schedule(principal, coach_id, entries).await?))
            }
            Command::SelectSchedule { coach_id } => Ok(schedule_rows(engine.weekly_schedule(coach_id).await?)),
            Command::InsertReview {
                coach_id,
                rating,
                comment,
            } => {
                let rating = u8::try_from(rating)
                    .map_err(|_| EngineError::InvalidInput(format!("rating {rating} outside 1..=5")))?;
                let review = engine.submit_review(principal, coach_id, rating, comment).await?;
                Ok(review_rows(vec![review]))
            }
            Command::SelectReviews { coach_id } => Ok(review_rows(engine.list_reviews(principal, coach_id).await?)),
            Command::ModerateReview { review_id, verified } => {
                let review = engine.moderate_review(principal, review_id, verified).await?;
                Ok(review_rows(vec![review]))
            }
            Command::SelectReconciliation => {
                let reports = engine.student_count_report(principal).await?;
                Ok(rows(reconciliation_schema(), reports, |enc, r| {
                    enc.encode_field(&r.coach_id)?;
                    enc.encode_field(&i64::from(r.live))?;
                    enc.encode_field(&i64::from(r.expected))?;
                    enc.encode_field(&r.drifted())
                }))
            }
        }
    }
}

fn schedule_entries(coach_id: Id, rows: Vec<ScheduleRow>) -> Result<Vec<WeeklyScheduleEntry>, EngineError> {
    rows.into_iter()
        .map(|row| {
            let day_of_week = u8::try_from(row.day_of_week)
                .map_err(|_| EngineError::InvalidInput(format!("day_of_week {} outside 0..=6", row.day_of_week)))?;
            Ok(WeeklyScheduleEntry {
                coach_id,
                day_of_week,
                enabled: row.enabled,
                start_time: parse_time_of_day(&row.start_time)?,
                end_time: parse_time_of_day(&row.end_time)?,
            })
        })
        .collect()
}

// ── Result sets ──────────────────────────────────────────────────

fn field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

fn availability_schema() -> Vec<FieldInfo> {
    vec![field("date", Type::VARCHAR), field("slot", Type::VARCHAR)]
}

fn enrollment_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::INT8),
        field("user_id", Type::INT8),
        field("coach_id", Type::INT8),
        field("status", Type::VARCHAR),
        field("message", Type::VARCHAR),
        field("coach_message", Type::VARCHAR),
        field("session_at", Type::VARCHAR),
        field("created_at", Type::VARCHAR),
        field("updated_at", Type::VARCHAR),
    ]
}

fn coach_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::INT8),
        field("user_id", Type::INT8),
        field("name", Type::VARCHAR),
        field("price", Type::INT8),
        field("students_count", Type::INT8),
        field("rating", Type::FLOAT8),
        field("review_count", Type::INT8),
    ]
}

fn schedule_schema() -> Vec<FieldInfo> {
    vec![
        field("coach_id", Type::INT8),
        field("day_of_week", Type::INT8),
        field("enabled", Type::BOOL),
        field("start_time", Type::VARCHAR),
        field("end_time", Type::VARCHAR),
    ]
}

fn review_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::INT8),
        field("coach_id", Type::INT8),
        field("user_id", Type::INT8),
        field("rating", Type::INT8),
        field("comment", Type::VARCHAR),
        field("verified", Type::BOOL),
        field("created_at", Type::VARCHAR),
    ]
}

fn reconciliation_schema() -> Vec<FieldInfo> {
    vec![
        field("coach_id", Type::INT8),
        field("live", Type::INT8),
        field("expected", Type::INT8),
        field("drifted", Type::BOOL),
    ]
}

/// Result schema for a statement, keyed on the table it names.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    let lower = sql.to_lowercase();
    let table = lower
        .split_whitespace()
        .skip_while(|w| *w != "from" && *w != "into")
        .nth(1)
        .and_then(|t| t.split(|c: char| !(c.is_alphanumeric() || c == '_')).next())
        .unwrap_or("");
    match table {
        "availability" => availability_schema(),
        "enrollments" | "enrollment_transitions" => enrollment_schema(),
        "coaches" | "coach_accounts" => coach_schema(),
        "schedules" => schedule_schema(),
        "reviews" | "review_moderations" => review_schema(),
        "reconciliation" => reconciliation_schema(),
        _ => Vec::new(),
    }
}

fn format_ts(ts: chrono::NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn rows<T>(
    schema: Vec<FieldInfo>,
    items: Vec<T>,
    encode: impl Fn(&mut DataRowEncoder, &T) -> PgWireResult<()>,
) -> Response {
    let schema = Arc::new(schema);
    let rows: Vec<PgWireResult<_>> = items
        .iter()
        .map(|item| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encode(&mut encoder, item)?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn enrollment_rows(enrollments: Vec<Enrollment>) -> Response {
    rows(enrollment_schema(), enrollments, |enc, e| {
        enc.encode_field(&e.id)?;
        enc.encode_field(&e.user_id)?;
        enc.encode_field(&e.coach_id)?;
        enc.encode_field(&e.status.as_str())?;
        enc.encode_field(&e.message)?;
        enc.encode_field(&e.coach_message)?;
        enc.encode_field(&e.session_at.map(|at| at.format("%Y-%m-%d %H:%M").to_string()))?;
        enc.encode_field(&format_ts(e.created_at))?;
        enc.encode_field(&format_ts(e.updated_at))
    })
}

fn coach_rows(coaches: Vec<Coach>) -> Response {
    rows(coach_schema(), coaches, |enc, c| {
        enc.encode_field(&c.id)?;
        enc.encode_field(&c.user_id)?;
        enc.encode_field(&c.name)?;
        enc.encode_field(&c.price)?;
        enc.encode_field(&i64::from(c.students_count))?;
        enc.encode_field(&c.rating)?;
        enc.encode_field(&i64::from(c.review_count))
    })
}

fn schedule_rows(entries: Vec<WeeklyScheduleEntry>) -> Response {
    rows(schedule_schema(), entries, |enc, s| {
        enc.encode_field(&s.coach_id)?;
        enc.encode_field(&i64::from(s.day_of_week))?;
        enc.encode_field(&s.enabled)?;
        enc.encode_field(&s.start_time.format("%H:%M").to_string())?;
        enc.encode_field(&s.end_time.format("%H:%M").to_string())
    })
}

fn review_rows(reviews: Vec<Review>) -> Response {
    rows(review_schema(), reviews, |enc, r| {
        enc.encode_field(&r.id)?;
        enc.encode_field(&r.coach_id)?;
        enc.encode_field(&r.user_id)?;
        enc.encode_field(&i64::from(r.rating))?;
        enc.encode_field(&r.comment)?;
        enc.encode_field(&r.verified)?;
        enc.encode_field(&format_ts(r.created_at))
    })
}

#[async_trait]
impl SimpleQueryHandler for CoachbookHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let principal = self.resolve_principal(client);
        Ok(vec![self.run(principal, query).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct CoachbookQueryParser;

#[async_trait]
impl QueryParser for CoachbookQueryParser {
    type Statement = String;

    async fn parse_sql<C>(&self, _client: &C, sql: &str, _types: &[Option<Type>]) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(&self, stmt: &String, _column_format: Option<&Format>) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for CoachbookHandler {
    type Statement = String;
    type QueryParser = CoachbookQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let principal = self.resolve_principal(client);
        let sql = substitute_params(portal);
        self.run(principal, &sql).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(&target.statement.statement)))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut max = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        i += 1;
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if let Ok(n) = sql[start..i].parse::<usize>() {
            max = max.max(n);
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    let params: Vec<Option<String>> = portal
        .parameters
        .iter()
        .map(|p| p.as_ref().map(|bytes| String::from_utf8_lossy(bytes).into_owned()))
        .collect();
    substitute_text_params(&portal.statement.statement, &params)
}

/// Single left-to-right pass; substituted text is never rescanned.
fn substitute_text_params(sql: &str, params: &[Option<String>]) -> String {
    let mut result = String::with_capacity(sql.len());
    let mut rest = sql;
    while let Some(pos) = rest.find('$') {
        result.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        let param = after[..digits]
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| params.get(i));
        match param {
            Some(Some(text)) => {
                result.push('\'');
                result.push_str(&text.replace('\'', "''"));
                result.push('\'');
            }
            Some(None) => result.push_str("NULL"),
            None => result.push_str(&rest[pos..pos + 1 + digits]),
        }
        rest = &after[digits..];
    }
    result.push_str(rest);
    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct CoachbookFactory {
    handler: Arc<CoachbookHandler>,
    auth_handler: Arc<CleartextPasswordAuthStartupHandler<CoachbookAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl CoachbookFactory {
    pub fn new(engine: Arc<Engine>, directory: Arc<AccountDirectory>) -> Self {
        let auth_source = CoachbookAuthSource::new(directory.clone());
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(CoachbookHandler::new(engine, directory)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(auth_source, param_provider)),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for CoachbookFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
    directory: Arc<AccountDirectory>,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    let factory = Arc::new(CoachbookFactory::new(engine, directory));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

/// SQLSTATE for each engine error kind.
pub fn sqlstate(e: &EngineError) -> &'static str {
    match e {
        EngineError::InvalidInput(_) => "22023",
        EngineError::NotFound(..) => "P0002",
        EngineError::AlreadyExists(..) | EngineError::Conflict(_) => "23505",
        EngineError::Unauthorized => "28000",
        EngineError::Forbidden(_) => "42501",
        EngineError::InvalidTransition { .. } => "55000",
        EngineError::LimitExceeded(_) => "54000",
        EngineError::StoreUnavailable(_) => "58030",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        sqlstate(&e).into(),
        e.to_string(),
    )))
}

fn sql_err(e: sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(schema: &[FieldInfo]) -> Vec<&str> {
        schema.iter().map(|f| f.name().as_ref()).collect()
    }

    #[test]
    fn result_schema_follows_table() {
        assert_eq!(
            names(&result_schema("SELECT * FROM availability WHERE coach_id = $1")),
            ["date", "slot"]
        );
        assert_eq!(
            result_schema("insert into enrollments(coach_id) values ($1)").len(),
            enrollment_schema().len()
        );
        assert_eq!(
            result_schema("INSERT INTO enrollment_transitions (enrollment_id, status) VALUES ($1, $2)").len(),
            enrollment_schema().len()
        );
        assert_eq!(names(&result_schema("SELECT * FROM reconciliation"))[3], "drifted");
        assert!(result_schema("SELECT 1").is_empty());
    }

    #[test]
    fn count_params_finds_highest_placeholder() {
        assert_eq!(count_params("SELECT * FROM coaches"), 0);
        assert_eq!(count_params("INSERT INTO reviews VALUES ($1, $3, $2)"), 3);
        assert_eq!(count_params("SELECT * FROM enrollments WHERE id = $12"), 12);
        assert_eq!(count_params("SELECT '$'"), 0);
    }

    #[test]
    fn substitution_quotes_and_nulls() {
        let sql = "INSERT INTO enrollments (coach_id, message, session_at) VALUES ($1, $2, $3)";
        let out = substitute_text_params(sql, &[Some("4".into()), Some("it's me".into()), None]);
        assert_eq!(
            out,
            "INSERT INTO enrollments (coach_id, message, session_at) VALUES ('4', 'it''s me', NULL)"
        );
        assert!(matches!(
            sql::parse_sql(&out).unwrap(),
            Command::InsertEnrollment { coach_id: 4, .. }
        ));
    }

    #[test]
    fn bound_text_containing_placeholders_is_left_alone() {
        let sql = "INSERT INTO enrollments (coach_id, message) VALUES ($1, $2)";
        let out = substitute_text_params(sql, &[Some("4".into()), Some("pay $1 now".into())]);
        assert_eq!(out, "INSERT INTO enrollments (coach_id, message) VALUES ('4', 'pay $1 now')");
        match sql::parse_sql(&out).unwrap() {
            Command::InsertEnrollment { coach_id, message, .. } => {
                assert_eq!(coach_id, 4);
                assert_eq!(message.as_deref(), Some("pay $1 now"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn unbound_placeholders_are_kept_verbatim() {
        assert_eq!(substitute_text_params("$1 $3 $", &[Some("a".into())]), "'a' $3 $");
    }

    #[test]
    fn substitution_handles_two_digit_placeholders() {
        let params: Vec<Option<String>> = (1..=10).map(|i| Some(i.to_string())).collect();
        assert_eq!(substitute_text_params("$1 $10", &params), "'1' '10'");
    }

    #[test]
    fn every_error_kind_has_a_distinct_sqlstate() {
        use EnrollmentStatus::*;
        let cases = [
            EngineError::InvalidInput("x".into()),
            EngineError::NotFound("coach", 1),
            EngineError::Unauthorized,
            EngineError::Forbidden("x"),
            EngineError::Conflict("x".into()),
            EngineError::InvalidTransition { from: Approved, to: Approved },
            EngineError::LimitExceeded("x"),
            EngineError::StoreUnavailable("x".into()),
        ];
        let mut codes: Vec<&str> = cases.iter().map(sqlstate).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), cases.len());
        assert_eq!(sqlstate(&EngineError::AlreadyExists("coach", 1)), "23505");
        assert_eq!(
            sqlstate(&EngineError::InvalidTransition { from: Pending, to: Completed }),
            "55000"
        );
    }

    #[test]
    fn schedule_rows_convert_to_entries() {
        let rows = vec![ScheduleRow {
            day_of_week: 1,
            enabled: true,
            start_time: "14:00".into(),
            end_time: "15:00".into(),
        }];
        let entries = schedule_entries(7, rows).unwrap();
        assert_eq!(entries[0].coach_id, 7);
        assert_eq!(entries[0].start_time.format("%H:%M").to_string(), "14:00");

        let bad_day = vec![ScheduleRow {
            day_of_week: -1,
            enabled: true,
            start_time: "14:00".into(),
            end_time: "15:00".into(),
        }];
        assert!(matches!(schedule_entries(7, bad_day), Err(EngineError::InvalidInput(_))));
    }
}
