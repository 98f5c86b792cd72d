use sqlparser::ast::{self, Expr, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use thiserror::Error;

use crate::model::*;

/// One row of a schedule replace-all insert, still in wire form.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleRow {
    pub day_of_week: i64,
    pub enabled: bool,
    pub start_time: String,
    pub end_time: String,
}

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    SelectAvailability {
        coach_id: Id,
        date: String,
    },
    InsertEnrollment {
        coach_id: Id,
        message: Option<String>,
        session_at: Option<String>,
    },
    InsertTransition {
        enrollment_id: Id,
        status: EnrollmentStatus,
        coach_message: Option<String>,
    },
    SelectEnrollments {
        id: Option<Id>,
        coach_id: Option<Id>,
        status: Option<EnrollmentStatus>,
    },
    InsertCoach {
        id: Id,
        user_id: Option<Id>,
        name: Option<String>,
        price: Option<i64>,
    },
    LinkCoachAccount {
        coach_id: Id,
        user_id: Id,
    },
    SelectCoaches {
        id: Option<Id>,
    },
    ReplaceSchedule {
        coach_id: Id,
        rows: Vec<ScheduleRow>,
    },
    SelectSchedule {
        coach_id: Id,
    },
    InsertReview {
        coach_id: Id,
        rating: i64,
        comment: Option<String>,
    },
    SelectReviews {
        coach_id: Id,
    },
    ModerateReview {
        review_id: Id,
        verified: bool,
    },
    SelectReconciliation,
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let Some(first) = stmts.first() else {
        return Err(SqlError::Empty);
    };

    match first {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

// ── INSERT ────────────────────────────────────────────────────

/// A VALUES row addressed by column name, or by position when the
/// statement has no column list.
struct InsertRow<'a> {
    table: &'static str,
    columns: &'a [String],
    values: &'a [Expr],
}

impl<'a> InsertRow<'a> {
    fn get(&self, column: &str, position: usize) -> Option<&'a Expr> {
        if self.columns.is_empty() {
            self.values.get(position)
        } else {
            self.columns
                .iter()
                .position(|c| c == column)
                .and_then(|i| self.values.get(i))
        }
    }

    fn required(&self, column: &'static str, position: usize) -> Result<&'a Expr, SqlError> {
        self.get(column, position)
            .ok_or(SqlError::MissingColumn(self.table, column))
    }

    fn id(&self, column: &'static str, position: usize) -> Result<Id, SqlError> {
        parse_i64(self.required(column, position)?)
    }

    fn opt_id(&self, column: &str, position: usize) -> Result<Option<Id>, SqlError> {
        self.get(column, position).map_or(Ok(None), parse_i64_or_null)
    }

    fn opt_text(&self, column: &str, position: usize) -> Result<Option<String>, SqlError> {
        self.get(column, position).map_or(Ok(None), parse_text_or_null)
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let columns: Vec<String> = insert.columns.iter().map(|c| c.value.to_lowercase()).collect();
    let rows = extract_insert_rows(insert)?;

    let table: &'static str = match table.as_str() {
        "enrollments" => "enrollments",
        "enrollment_transitions" => "enrollment_transitions",
        "coaches" => "coaches",
        "coach_accounts" => "coach_accounts",
        "schedules" => "schedules",
        "reviews" => "reviews",
        "review_moderations" => "review_moderations",
        _ => return Err(SqlError::UnknownTable(table)),
    };

    // Schedules are replace-all and take many rows; every other table takes one.
    if table == "schedules" {
        return parse_schedule_rows(&columns, rows);
    }
    if rows.len() != 1 {
        return Err(SqlError::Unsupported(format!("multi-row INSERT into {table}")));
    }
    let row = InsertRow {
        table,
        columns: &columns,
        values: &rows[0],
    };

    match table {
        "enrollments" => Ok(Command::InsertEnrollment {
            coach_id: row.id("coach_id", 0)?,
            message: row.opt_text("message", 1)?,
            session_at: row.opt_text("session_at", 2)?,
        }),
        "enrollment_transitions" => {
            let status = parse_text(row.required("status", 1)?)?;
            Ok(Command::InsertTransition {
                enrollment_id: row.id("enrollment_id", 0)?,
                status: EnrollmentStatus::parse(&status).ok_or(SqlError::BadStatus(status))?,
                coach_message: row.opt_text("coach_message", 2)?,
            })
        }
        "coaches" => Ok(Command::InsertCoach {
            id: row.id("id", 0)?,
            user_id: row.opt_id("user_id", 1)?,
            name: row.opt_text("name", 2)?,
            price: row.opt_id("price", 3)?,
        }),
        "coach_accounts" => Ok(Command::LinkCoachAccount {
            coach_id: row.id("coach_id", 0)?,
            user_id: row.id("user_id", 1)?,
        }),
        "reviews" => Ok(Command::InsertReview {
            coach_id: row.id("coach_id", 0)?,
            rating: parse_i64(row.required("rating", 1)?)?,
            comment: row.opt_text("comment", 2)?,
        }),
        "review_moderations" => Ok(Command::ModerateReview {
            review_id: row.id("review_id", 0)?,
            verified: parse_bool(row.required("verified", 1)?)?,
        }),
        _ => Err(SqlError::UnknownTable(table.to_string())),
    }
}

fn parse_schedule_rows(columns: &[String], rows: &[Vec<Expr>]) -> Result<Command, SqlError> {
    let mut coach_id = None;
    let mut out = Vec::with_capacity(rows.len());
    for (i, values) in rows.iter().enumerate() {
        let row = InsertRow {
            table: "schedules",
            columns,
            values,
        };
        let wrap = |e: SqlError| SqlError::Parse(format!("row {i}: {e}"));
        let row_coach = row.id("coach_id", 0).map_err(wrap)?;
        match coach_id {
            None => coach_id = Some(row_coach),
            Some(c) if c != row_coach => {
                return Err(SqlError::Parse(format!(
                    "row {i}: schedule rows must share one coach_id"
                )));
            }
            Some(_) => {}
        }
        out.push(ScheduleRow {
            day_of_week: parse_i64(row.required("day_of_week", 1).map_err(wrap)?).map_err(wrap)?,
            enabled: parse_bool(row.required("enabled", 2).map_err(wrap)?).map_err(wrap)?,
            start_time: parse_text(row.required("start_time", 3).map_err(wrap)?).map_err(wrap)?,
            end_time: parse_text(row.required("end_time", 4).map_err(wrap)?).map_err(wrap)?,
        });
    }
    Ok(Command::ReplaceSchedule {
        coach_id: coach_id.ok_or_else(|| SqlError::Parse("empty VALUES".into()))?,
        rows: out,
    })
}

// ── SELECT ────────────────────────────────────────────────────

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    let Some(from) = select.from.first() else {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    };
    let table = table_factor_name(&from.relation)?;

    let mut filters = Vec::new();
    if let Some(selection) = &select.selection {
        collect_eq_filters(selection, &mut filters)?;
    }
    let filter = |col: &str| filters.iter().find(|(c, _)| c == col).map(|(_, e)| e);
    let id_filter = |col: &'static str| filter(col).map(parse_i64).transpose();

    match table.as_str() {
        "availability" => Ok(Command::SelectAvailability {
            coach_id: id_filter("coach_id")?.ok_or(SqlError::MissingFilter("coach_id"))?,
            date: parse_text(filter("date").ok_or(SqlError::MissingFilter("date"))?)?,
        }),
        "enrollments" => {
            let status = match filter("status") {
                Some(e) => {
                    let s = parse_text(e)?;
                    Some(EnrollmentStatus::parse(&s).ok_or(SqlError::BadStatus(s))?)
                }
                None => None,
            };
            Ok(Command::SelectEnrollments {
                id: id_filter("id")?,
                coach_id: id_filter("coach_id")?,
                status,
            })
        }
        "coaches" => Ok(Command::SelectCoaches { id: id_filter("id")? }),
        "schedules" => Ok(Command::SelectSchedule {
            coach_id: id_filter("coach_id")?.ok_or(SqlError::MissingFilter("coach_id"))?,
        }),
        "reviews" => Ok(Command::SelectReviews {
            coach_id: id_filter("coach_id")?.ok_or(SqlError::MissingFilter("coach_id"))?,
        }),
        "reconciliation" => Ok(Command::SelectReconciliation),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Flatten `a = 1 AND b = 'x'` into column/value pairs.
fn collect_eq_filters(expr: &Expr, out: &mut Vec<(String, Expr)>) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => collect_eq_filters(inner, out),
        Expr::BinaryOp { left, op, right } => match op {
            ast::BinaryOperator::And => {
                collect_eq_filters(left, out)?;
                collect_eq_filters(right, out)
            }
            ast::BinaryOperator::Eq => {
                let col = expr_column_name(left)
                    .ok_or_else(|| SqlError::Unsupported(format!("filter on {left}")))?;
                out.push((col, right.as_ref().clone()));
                Ok(())
            }
            other => Err(SqlError::Unsupported(format!("operator {other}"))),
        },
        other => Err(SqlError::Unsupported(format!("filter {other}"))),
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_rows(insert: &ast::Insert) -> Result<&[Vec<Expr>], SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) if values.rows.is_empty() => Err(SqlError::Parse("empty VALUES".into())),
        SetExpr::Values(values) => Ok(&values.rows),
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => s
                .trim()
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad integer {s:?}: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
}

fn parse_i64_or_null(expr: &Expr) -> Result<Option<i64>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => parse_i64(expr).map(Some),
    }
}

fn parse_text(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(other) => Err(SqlError::Parse(format!("expected string, got {other}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_text_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => parse_text(expr).map(Some),
    }
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    match extract_value(expr) {
        Some(Value::Boolean(b)) => Ok(*b),
        Some(Value::SingleQuotedString(s)) => match s.to_lowercase().as_str() {
            "true" | "t" | "1" => Ok(true),
            "false" | "f" | "0" => Ok(false),
            _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
        },
        Some(Value::Number(n, _)) => Ok(n != "0"),
        Some(other) => Err(SqlError::Parse(format!("expected bool, got {other}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SqlError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("empty query")]
    Empty,
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("{0}: missing column {1}")]
    MissingColumn(&'static str, &'static str),
    #[error("missing filter: {0}")]
    MissingFilter(&'static str),
    #[error("unknown enrollment status: {0}")]
    BadStatus(String),
}
