use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total statements executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "roomsync_queries_total";

/// Histogram: statement latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "roomsync_query_duration_seconds";

/// Counter: housekeeping moves refused by the transition table.
pub const TRANSITIONS_REJECTED_TOTAL: &str = "roomsync_transitions_rejected_total";

/// Counter: reconciliation passes. Labels: status.
pub const SYNCS_TOTAL: &str = "roomsync_syncs_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: rooms held by the store.
pub const ROOMS: &str = "roomsync_rooms";

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "roomsync_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "roomsync_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "roomsync_connections_rejected_total";

/// Counter: logins for unknown staff.
pub const AUTH_FAILURES_TOTAL: &str = "roomsync_auth_failures_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "roomsync_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "roomsync_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short label for a command, used on metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::SelectRooms { .. } => "select_rooms",
        Command::SelectArrivals => "select_arrivals",
        Command::SelectRoomStats => "select_room_stats",
        Command::SelectNextStatuses { .. } => "select_next_statuses",
        Command::SelectActivity { .. } => "select_activity",
        Command::SelectStaffReport => "select_staff_report",
        Command::SelectSyncHistory => "select_sync_history",
        Command::SelectLastSync => "select_last_sync",
        Command::ChangeStatus { .. } => "change_status",
        Command::UpdateRoom { .. } => "update_room",
        Command::ClearActivity => "clear_activity",
        Command::ClearRooms => "clear_rooms",
        Command::Resync => "resync",
    }
}
