use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveTime};
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::auth::{StaffAuthSource, StaffDirectory};
use crate::dates::format_display;
use crate::desk::{Desk, DeskError};
use crate::model::*;
use crate::observability::{self, command_label};
use crate::reconcile::EngineError;
use crate::report;
use crate::sql::{self, Command, RoomFilter};
use crate::store::{RoomStore, Store, StoreError, SyncHistory};

/// Rows returned by `SELECT * FROM sync_history`.
const SYNC_HISTORY_ROWS: usize = 50;

pub struct RoomSyncHandler {
    desk: Arc<Desk<Store>>,
    staff: Arc<StaffDirectory>,
    report_start: NaiveTime,
    query_parser: Arc<RoomSyncQueryParser>,
}

impl RoomSyncHandler {
    pub fn new(desk: Arc<Desk<Store>>, staff: Arc<StaffDirectory>, report_start: NaiveTime) -> Self {
        Self {
            desk,
            staff,
            report_start,
            query_parser: Arc::new(RoomSyncQueryParser),
        }
    }

    /// The session's staff identity, from the startup user name.
    fn resolve_actor<C: ClientInfo>(&self, client: &C) -> PgWireResult<Actor> {
        let user = client.metadata().get("user").cloned().unwrap_or_default();
        self.staff.actor(&user).ok_or_else(|| {
            user_error("28000", format!("no staff member named \"{user}\""))
        })
    }

    async fn execute_command(
        &self,
        actor: &Actor,
        cmd: Command,
        format: &Format,
    ) -> PgWireResult<Vec<Response>> {
        let label = command_label(&cmd);
        let started = Instant::now();
        let result = self.run_command(actor, cmd, format).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn run_command(
        &self,
        actor: &Actor,
        cmd: Command,
        format: &Format,
    ) -> PgWireResult<Vec<Response>> {
        let store = self.desk.store();
        match cmd {
            Command::SelectRooms { filter } => {
                let rooms = match filter {
                    RoomFilter::All => store.get_all().await.map_err(store_err)?,
                    RoomFilter::Number(number) => store
                        .get_by_number(&number)
                        .await
                        .map_err(store_err)?
                        .into_iter()
                        .collect(),
                    RoomFilter::Floor(floor) => {
                        let all = store.get_all().await.map_err(store_err)?;
                        report::rooms_by_floor(&all).remove(&floor).unwrap_or_default()
                    }
                };
                Ok(vec![room_rows(&rooms, format)?])
            }
            Command::SelectArrivals => {
                let all = store.get_all().await.map_err(store_err)?;
                Ok(vec![room_rows(&report::arrivals(&all), format)?])
            }
            Command::SelectRoomStats => {
                let all = store.get_all().await.map_err(store_err)?;
                let schema = Arc::new(room_stats_schema(format));
                let rows: Vec<PgWireResult<_>> = report::status_counts(&all)
                    .into_iter()
                    .map(|(status, count)| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&status)?;
                        encoder.encode_field(&(count as i64))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }
            Command::SelectNextStatuses { number } => {
                let targets = self.desk.allowed_next(&number).await.map_err(desk_err)?;
                let schema = Arc::new(next_statuses_schema(format));
                let rows: Vec<PgWireResult<_>> = targets
                    .iter()
                    .map(|code| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&number)?;
                        encoder.encode_field(&code.as_str())?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }
            Command::SelectActivity { room } => {
                let mut entries =
                    report::activity_report(store.as_ref(), Local::now(), self.report_start)
                        .await
                        .map_err(store_err)?;
                if let Some(room) = room {
                    entries.retain(|e| e.room == room);
                }
                Ok(vec![activity_rows(&entries, format)?])
            }
            Command::SelectStaffReport => {
                let entries =
                    report::activity_report(store.as_ref(), Local::now(), self.report_start)
                        .await
                        .map_err(store_err)?;
                let schema = Arc::new(staff_report_schema(format));
                let rows: Vec<PgWireResult<_>> = report::staff_stats(&entries)
                    .into_iter()
                    .map(|s| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&s.name)?;
                        encoder.encode_field(&s.role.as_str())?;
                        encoder.encode_field(&(s.total as i64))?;
                        encoder.encode_field(&(s.vacant_cleaned as i64))?;
                        encoder.encode_field(&(s.occupied_serviced as i64))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(rows)))])
            }
            Command::SelectSyncHistory => {
                let history = store.recent(SYNC_HISTORY_ROWS).await.map_err(store_err)?;
                Ok(vec![sync_rows(&history, format)?])
            }
            Command::SelectLastSync => {
                let last = store.last_success().await.map_err(store_err)?;
                Ok(vec![sync_rows(last.as_slice(), format)?])
            }
            Command::ChangeStatus { number, status } => {
                self.desk
                    .change_status(actor, &number, &status)
                    .await
                    .map_err(desk_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::UpdateRoom { number, changes } => {
                self.desk
                    .update_room(actor, &number, &changes)
                    .await
                    .map_err(desk_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::ClearActivity => {
                self.desk.clear_activity(actor).await.map_err(desk_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE"))])
            }
            Command::ClearRooms => {
                self.desk.clear_rooms(actor).await.map_err(desk_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE"))])
            }
            Command::Resync => {
                let outcome = self.desk.resync(actor).await.map_err(desk_err)?;
                Ok(vec![sync_rows(std::slice::from_ref(&outcome), format)?])
            }
        }
    }
}

// ── Result encoding ──────────────────────────────────────────────

/// Build field descriptions, encoding each column the way the client asked.
fn fields(columns: Vec<(&str, Type)>, format: &Format) -> Vec<FieldInfo> {
    columns
        .into_iter()
        .enumerate()
        .map(|(i, (name, ty))| FieldInfo::new(name.into(), None, None, ty, format.format_for(i)))
        .collect()
}

fn rooms_schema(format: &Format) -> Vec<FieldInfo> {
    fields(
        vec![
            ("number", Type::VARCHAR),
            ("floor", Type::VARCHAR),
            ("room_type", Type::VARCHAR),
            ("status", Type::VARCHAR),
            ("arrival", Type::BOOL),
            ("guest_name", Type::VARCHAR),
            ("check_in", Type::VARCHAR),
            ("check_out", Type::VARCHAR),
            ("pax", Type::INT8),
            ("next_guest_name", Type::VARCHAR),
            ("next_check_in", Type::VARCHAR),
            ("next_check_out", Type::VARCHAR),
            ("next_pax", Type::INT8),
            ("updated_at", Type::INT8),
        ],
        format,
    )
}

fn room_stats_schema(format: &Format) -> Vec<FieldInfo> {
    fields(vec![("status", Type::VARCHAR), ("count", Type::INT8)], format)
}

fn next_statuses_schema(format: &Format) -> Vec<FieldInfo> {
    fields(vec![("number", Type::VARCHAR), ("status", Type::VARCHAR)], format)
}

fn activity_schema(format: &Format) -> Vec<FieldInfo> {
    fields(
        vec![
            ("id", Type::VARCHAR),
            ("at", Type::INT8),
            ("time", Type::VARCHAR),
            ("actor", Type::VARCHAR),
            ("role", Type::VARCHAR),
            ("room", Type::VARCHAR),
            ("action", Type::VARCHAR),
            ("old_status", Type::VARCHAR),
            ("new_status", Type::VARCHAR),
            ("detail", Type::VARCHAR),
        ],
        format,
    )
}

fn staff_report_schema(format: &Format) -> Vec<FieldInfo> {
    fields(
        vec![
            ("name", Type::VARCHAR),
            ("role", Type::VARCHAR),
            ("total", Type::INT8),
            ("vacant_cleaned", Type::INT8),
            ("occupied_serviced", Type::INT8),
        ],
        format,
    )
}

fn sync_history_schema(format: &Format) -> Vec<FieldInfo> {
    fields(
        vec![
            ("id", Type::VARCHAR),
            ("at", Type::INT8),
            ("actor", Type::VARCHAR),
            ("rows", Type::INT8),
            ("skipped", Type::INT8),
            ("success", Type::BOOL),
            ("error", Type::VARCHAR),
        ],
        format,
    )
}

fn schema_for(cmd: &Command, format: &Format) -> Vec<FieldInfo> {
    match cmd {
        Command::SelectRooms { .. } | Command::SelectArrivals => rooms_schema(format),
        Command::SelectRoomStats => room_stats_schema(format),
        Command::SelectNextStatuses { .. } => next_statuses_schema(format),
        Command::SelectActivity { .. } => activity_schema(format),
        Command::SelectStaffReport => staff_report_schema(format),
        Command::SelectSyncHistory | Command::SelectLastSync | Command::Resync => {
            sync_history_schema(format)
        }
        Command::ChangeStatus { .. }
        | Command::UpdateRoom { .. }
        | Command::ClearActivity
        | Command::ClearRooms => vec![],
    }
}

fn room_rows(rooms: &[RoomRecord], format: &Format) -> PgWireResult<Response> {
    let schema = Arc::new(rooms_schema(format));
    let rows: Vec<PgWireResult<_>> = rooms
        .iter()
        .map(|room| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&room.number)?;
            encoder.encode_field(&room.floor())?;
            encoder.encode_field(&room.room_type)?;
            encoder.encode_field(&room.status.base().as_str())?;
            encoder.encode_field(&room.status.arrival())?;
            encoder.encode_field(&room.current.name)?;
            encoder.encode_field(&format_display(room.current.check_in))?;
            encoder.encode_field(&format_display(room.current.check_out))?;
            encoder.encode_field(&i64::from(room.current.pax))?;
            encoder.encode_field(&room.next.name)?;
            encoder.encode_field(&format_display(room.next.check_in))?;
            encoder.encode_field(&format_display(room.next.check_out))?;
            encoder.encode_field(&i64::from(room.next.pax))?;
            encoder.encode_field(&room.updated_at)?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

fn activity_rows(entries: &[ActivityEntry], format: &Format) -> PgWireResult<Response> {
    let schema = Arc::new(activity_schema(format));
    let rows: Vec<PgWireResult<_>> = entries
        .iter()
        .map(|e| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&e.id.to_string())?;
            encoder.encode_field(&e.at)?;
            encoder.encode_field(&local_time(e.at))?;
            encoder.encode_field(&e.actor)?;
            encoder.encode_field(&e.role.as_str())?;
            encoder.encode_field(&e.room)?;
            encoder.encode_field(&e.kind.as_str())?;
            encoder.encode_field(&e.old_status)?;
            encoder.encode_field(&e.new_status)?;
            encoder.encode_field(&e.detail)?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

fn sync_rows(history: &[SyncOutcome], format: &Format) -> PgWireResult<Response> {
    let schema = Arc::new(sync_history_schema(format));
    let rows: Vec<PgWireResult<_>> = history
        .iter()
        .map(|s| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&s.id.to_string())?;
            encoder.encode_field(&s.at)?;
            encoder.encode_field(&s.actor)?;
            encoder.encode_field(&(s.rows as i64))?;
            encoder.encode_field(&(s.skipped as i64))?;
            encoder.encode_field(&s.success)?;
            encoder.encode_field(&s.error)?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

fn local_time(at: Ms) -> String {
    DateTime::from_timestamp_millis(at)
        .map(|t| t.with_timezone(&Local).format("%d-%m %H:%M").to_string())
        .unwrap_or_default()
}

#[async_trait]
impl SimpleQueryHandler for RoomSyncHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let actor = self.resolve_actor(client)?;
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        self.execute_command(&actor, cmd, &Format::UnifiedText).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct RoomSyncQueryParser;

#[async_trait]
impl QueryParser for RoomSyncQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        let text = Format::UnifiedText;
        Ok(describe_schema(stmt, column_format.unwrap_or(&text)))
    }
}

#[async_trait]
impl ExtendedQueryHandler for RoomSyncHandler {
    type Statement = String;
    type QueryParser = RoomSyncQueryParser;

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
        let actor = self.resolve_actor(client)?;
        let sql = bind_params(&portal.statement.statement, &portal.parameters);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        let mut responses = self
            .execute_command(&actor, cmd, &portal.result_column_format)
            .await?;
        Ok(responses.remove(0))
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
            describe_schema(&target.statement, &Format::UnifiedText),
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
        Ok(DescribePortalResponse::new(describe_schema(
            &target.statement.statement,
            &target.result_column_format,
        )))
    }
}

/// Result columns for an unbound statement. Placeholders read as NULL so the
/// statement parses; anything unparseable describes as no rows.
fn describe_schema(sql: &str, format: &Format) -> Vec<FieldInfo> {
    let nulls = vec![None::<&[u8]>; count_params(sql)];
    sql::parse_sql(&bind_params(sql, &nulls))
        .map(|cmd| schema_for(&cmd, format))
        .unwrap_or_default()
}

/// `$N` placeholders as `(start, end, N)` byte spans. Text inside
/// single-quoted strings is skipped.
fn placeholders(sql: &str) -> Vec<(usize, usize, usize)> {
    let bytes = sql.as_bytes();
    let mut found = Vec::new();
    let mut in_string = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => in_string = !in_string,
            b'$' if !in_string => {
                let mut end = i + 1;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                if let Ok(n) = sql[i + 1..end].parse::<usize>() {
                    found.push((i, end, n));
                    i = end;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }
    found
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    placeholders(sql).iter().map(|&(_, _, n)| n).max().unwrap_or(0)
}

/// Bind `$1, $2, ...` to quoted text values (NULL when absent) in a single
/// left-to-right pass. Bound text is never rescanned.
fn bind_params<B: AsRef<[u8]>>(sql: &str, params: &[Option<B>]) -> String {
    let mut bound = String::with_capacity(sql.len());
    let mut last = 0;
    for (start, end, n) in placeholders(sql) {
        bound.push_str(&sql[last..start]);
        match n.checked_sub(1).and_then(|i| params.get(i)) {
            Some(Some(value)) => {
                let text = String::from_utf8_lossy(value.as_ref());
                bound.push('\'');
                bound.push_str(&text.replace('\'', "''"));
                bound.push('\'');
            }
            Some(None) => bound.push_str("NULL"),
            None => bound.push_str(&sql[start..end]),
        }
        last = end;
    }
    bound.push_str(&sql[last..]);
    bound
}

// ── Factory ──────────────────────────────────────────────────────

#[derive(Clone)]
pub struct RoomSyncFactory {
    handler: Arc<RoomSyncHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<StaffAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl RoomSyncFactory {
    pub fn new(desk: Arc<Desk<Store>>, staff: Arc<StaffDirectory>, report_start: NaiveTime) -> Self {
        let auth_source = StaffAuthSource::new(staff.clone());
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(RoomSyncHandler::new(desk, staff, report_start)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for RoomSyncFactory {
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

/// Serve one client socket until it disconnects.
pub async fn process_connection(
    socket: TcpStream,
    factory: RoomSyncFactory,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Error mapping ────────────────────────────────────────────────

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new("ERROR".into(), code.into(), message)))
}

fn desk_err(e: DeskError) -> PgWireError {
    user_error(desk_sqlstate(&e), e.to_string())
}

fn desk_sqlstate(e: &DeskError) -> &'static str {
    match e {
        DeskError::Forbidden(_) => "42501",
        DeskError::Transition(_) => "23514",
        DeskError::Engine(EngineError::NotFound(_)) => "P0002",
        DeskError::Engine(
            EngineError::NoFields | EngineError::InvalidField(_) | EngineError::LimitExceeded(_),
        ) => "22023",
        DeskError::Engine(EngineError::Store(e)) => store_sqlstate(e),
    }
}

fn store_sqlstate(e: &StoreError) -> &'static str {
    match e {
        StoreError::NotFound(_) => "P0002",
        StoreError::LimitExceeded(_) => "22023",
        StoreError::StatusChanged { .. } => "40001",
        StoreError::WalError(_) => "58000",
    }
}

fn store_err(e: StoreError) -> PgWireError {
    user_error(store_sqlstate(&e), e.to_string())
}

fn sql_err(e: sql::SqlError) -> PgWireError {
    user_error("42601", e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgwire::api::results::FieldFormat;

    #[test]
    fn counts_highest_placeholder() {
        assert_eq!(count_params("SELECT * FROM rooms"), 0);
        assert_eq!(
            count_params("INSERT INTO status_changes (number, status) VALUES ($1, $2)"),
            2
        );
        assert_eq!(count_params("SELECT * FROM rooms WHERE number = $12"), 12);
    }

    #[test]
    fn describe_uses_table_schema() {
        let text = Format::UnifiedText;
        let cols = describe_schema("SELECT * FROM rooms WHERE number = $1", &text);
        assert_eq!(cols.len(), rooms_schema(&text).len());
        assert_eq!(describe_schema("SELECT * FROM room_stats", &text).len(), 2);
        assert!(describe_schema(
            "INSERT INTO status_changes (number, status) VALUES ($1, $2)",
            &text
        )
        .is_empty());
        assert!(describe_schema("garbage", &text).is_empty());
    }

    #[test]
    fn schema_follows_requested_format() {
        let cols = rooms_schema(&Format::UnifiedBinary);
        assert!(cols.iter().all(|f| f.format() == FieldFormat::Binary));
        let cols = room_stats_schema(&Format::UnifiedText);
        assert!(cols.iter().all(|f| f.format() == FieldFormat::Text));
    }

    #[test]
    fn bound_values_are_not_rescanned() {
        let sql = "INSERT INTO room_updates (number, guest_name) VALUES ($1, $2)";
        let bound = bind_params(sql, &[Some("301"), Some("Suite $1 guest")]);
        assert_eq!(
            bound,
            "INSERT INTO room_updates (number, guest_name) VALUES ('301', 'Suite $1 guest')"
        );
        let cmd = sql::parse_sql(&bound).unwrap();
        assert!(matches!(cmd, Command::UpdateRoom { ref number, .. } if number == "301"));
    }

    #[test]
    fn binding_quotes_and_nulls() {
        let sql = "SELECT * FROM rooms WHERE number = $1";
        assert_eq!(
            bind_params(sql, &[Some("1'1")]),
            "SELECT * FROM rooms WHERE number = '1''1'"
        );
        assert_eq!(
            bind_params(sql, &[None::<&str>]),
            "SELECT * FROM rooms WHERE number = NULL"
        );
        // Placeholders past the bound set and inside literals stay as written.
        assert_eq!(bind_params("VALUES ('$1', $3)", &[Some("x")]), "VALUES ('$1', $3)");
        assert_eq!(count_params("VALUES ('$9', $2)"), 2);
    }

    #[test]
    fn desk_errors_map_to_sqlstate() {
        let code = |e: DeskError| desk_sqlstate(&e);
        assert_eq!(code(DeskError::Forbidden("resync")), "42501");
        assert_eq!(code(EngineError::NotFound("9".into()).into()), "P0002");
        assert_eq!(code(EngineError::NoFields.into()), "22023");
        assert_eq!(
            code(EngineError::Store(StoreError::WalError("disk".into())).into()),
            "58000"
        );
        let moved = StoreError::StatusChanged {
            number: "101".into(),
            found: "vc".into(),
        };
        assert_eq!(code(EngineError::Store(moved).into()), "40001");
    }
}
