use sqlparser::ast::{self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::model::{GuestInput, RoomChanges};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomFilter {
    All,
    Number(String),
    Floor(String),
}

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    SelectRooms { filter: RoomFilter },
    SelectArrivals,
    SelectRoomStats,
    SelectNextStatuses { number: String },
    SelectActivity { room: Option<String> },
    SelectStaffReport,
    SelectSyncHistory,
    SelectLastSync,
    ChangeStatus { number: String, status: String },
    UpdateRoom { number: String, changes: RoomChanges },
    ClearActivity,
    ClearRooms,
    Resync,
}

/// Columns accepted by `INSERT INTO room_updates`.
const CURRENT_GUEST_COLUMNS: [&str; 4] = ["guest_name", "check_in", "check_out", "pax"];
const NEXT_GUEST_COLUMNS: [&str; 4] = ["next_guest_name", "next_check_in", "next_check_out", "next_pax"];

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    if trimmed.eq_ignore_ascii_case("RESYNC") {
        return Ok(Command::Resync);
    }

    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;
    let columns: Vec<String> = insert.columns.iter().map(|c| c.value.to_lowercase()).collect();
    if columns.is_empty() {
        return Err(SqlError::Parse(format!("{table}: column list required")));
    }
    if columns.len() != values.len() {
        return Err(SqlError::WrongArity("column list", columns.len(), values.len()));
    }
    let fields: Vec<(String, String)> = columns
        .into_iter()
        .zip(values.iter())
        .map(|(col, expr)| Ok((col, parse_text_expr(expr)?)))
        .collect::<Result<_, SqlError>>()?;
    let field = |name: &str| {
        fields
            .iter()
            .find(|(col, _)| col == name)
            .map(|(_, v)| v.clone())
    };

    match table.as_str() {
        "status_changes" => {
            for (col, _) in &fields {
                if col != "number" && col != "status" {
                    return Err(SqlError::UnknownColumn(col.clone()));
                }
            }
            Ok(Command::ChangeStatus {
                number: field("number").ok_or(SqlError::MissingColumn("number"))?,
                status: field("status").ok_or(SqlError::MissingColumn("status"))?,
            })
        }
        "room_updates" => {
            for (col, _) in &fields {
                let known = matches!(col.as_str(), "number" | "status" | "room_type")
                    || CURRENT_GUEST_COLUMNS.contains(&col.as_str())
                    || NEXT_GUEST_COLUMNS.contains(&col.as_str());
                if !known {
                    return Err(SqlError::UnknownColumn(col.clone()));
                }
            }
            let guest = |names: [&str; 4]| -> Option<GuestInput> {
                if !names.iter().any(|n| field(n).is_some()) {
                    return None;
                }
                let get = |i: usize| field(names[i]).unwrap_or_default();
                Some(GuestInput {
                    name: get(0),
                    check_in: get(1),
                    check_out: get(2),
                    pax: get(3),
                })
            };
            Ok(Command::UpdateRoom {
                number: field("number").ok_or(SqlError::MissingColumn("number"))?,
                changes: RoomChanges {
                    status: field("status"),
                    current: guest(CURRENT_GUEST_COLUMNS),
                    next: guest(NEXT_GUEST_COLUMNS),
                    room_type: field("room_type"),
                },
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    if delete.selection.is_some() {
        return Err(SqlError::Unsupported(format!("filtered DELETE on {table}")));
    }

    match table.as_str() {
        "activity" => Ok(Command::ClearActivity),
        "rooms" => Ok(Command::ClearRooms),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    let mut filters = Vec::new();
    if let Some(selection) = &select.selection {
        extract_eq_filters(selection, &mut filters)?;
    }
    let allowed = filterable_columns(&table);
    for (i, (col, _)) in filters.iter().enumerate() {
        if !allowed.contains(&col.as_str()) {
            return Err(SqlError::UnknownColumn(col.clone()));
        }
        if filters[..i].iter().any(|(seen, _)| seen == col) {
            return Err(SqlError::Unsupported(format!("repeated filter on {col}")));
        }
    }
    let filter = |name: &str| {
        filters
            .iter()
            .find(|(col, _)| col == name)
            .map(|(_, v): &(String, String)| v.clone())
    };

    match table.as_str() {
        "rooms" => {
            let filter = match (filter("number"), filter("floor")) {
                (Some(_), Some(_)) => {
                    return Err(SqlError::Unsupported("filter on both number and floor".into()));
                }
                (Some(n), None) => RoomFilter::Number(n),
                (None, Some(f)) => RoomFilter::Floor(f),
                (None, None) => RoomFilter::All,
            };
            Ok(Command::SelectRooms { filter })
        }
        "arrivals" => Ok(Command::SelectArrivals),
        "room_stats" => Ok(Command::SelectRoomStats),
        "next_statuses" => Ok(Command::SelectNextStatuses {
            number: filter("number").ok_or(SqlError::MissingFilter("number"))?,
        }),
        "activity" => Ok(Command::SelectActivity { room: filter("room") }),
        "staff_report" => Ok(Command::SelectStaffReport),
        "sync_history" => Ok(Command::SelectSyncHistory),
        "last_sync" => Ok(Command::SelectLastSync),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Columns a virtual table can be filtered on.
fn filterable_columns(table: &str) -> &'static [&'static str] {
    match table {
        "rooms" => &["number", "floor"],
        "next_statuses" => &["number"],
        "activity" => &["room"],
        _ => &[],
    }
}

/// Collect `col = 'value'` terms joined by AND. Other operators are rejected.
fn extract_eq_filters(expr: &Expr, out: &mut Vec<(String, String)>) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp { left, op: ast::BinaryOperator::And, right } => {
            extract_eq_filters(left, out)?;
            extract_eq_filters(right, out)
        }
        Expr::BinaryOp { left, op: ast::BinaryOperator::Eq, right } => {
            let col = expr_column_name(left)
                .ok_or_else(|| SqlError::Parse(format!("expected column, got {left}")))?;
            out.push((col, parse_text_expr(right)?));
            Ok(())
        }
        Expr::Nested(inner) => extract_eq_filters(inner, out),
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

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
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

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row.clone()),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
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

/// A literal as text. Room numbers may arrive unquoted, NULL reads as empty.
fn parse_text_expr(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) | Some(Value::Number(s, _)) => Ok(s.clone()),
        Some(Value::Null) => Ok(String::new()),
        Some(other) => Err(SqlError::Parse(format!("expected text, got {other}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String),
    MissingColumn(&'static str),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(c) => write!(f, "unknown column: {c}"),
            SqlError::MissingColumn(c) => write!(f, "missing column: {c}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
