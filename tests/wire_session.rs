use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_postgres::{Config, NoTls, SimpleQueryMessage, SimpleQueryRow};
use ulid::Ulid;

use roomsync::config::parse_staff;
use roomsync::desk::Desk;
use roomsync::feed::StaticFeed;
use roomsync::reconcile::Reconciler;
use roomsync::report::default_report_start;
use roomsync::store::Store;
use roomsync::wire::{self, RoomSyncFactory};

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("roomsync_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let store = Arc::new(Store::new(dir.join("roomsync.wal")).unwrap());

    let feed = StaticFeed::from_rows(&[
        &["Room", "Status", "Arr"],
        &["101", "VD"],
        &["102", "OD"],
        &["205", "VD", "ARR", "", "", "", "", "Tran", "28-12", "03-01", "2"],
        &["301", "VC"],
    ]);
    let desk = Arc::new(Desk::new(Reconciler::new(store), Arc::new(feed)));
    desk.initial_sync().await.unwrap().unwrap();

    let staff = Arc::new(parse_staff("Lan:frontpw:fo;Mai:hkpw:hk").unwrap());
    let factory = RoomSyncFactory::new(desk, staff, default_report_start());

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let factory = factory.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, factory, None).await;
            });
        }
    });

    addr
}

async fn try_connect(
    addr: SocketAddr,
    user: &str,
    password: &str,
) -> Result<tokio_postgres::Client, tokio_postgres::Error> {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname("hotel")
        .user(user)
        .password(password);

    let (client, connection) = config.connect(NoTls).await?;
    tokio::spawn(async move {
        let _ = connection.await;
    });
    Ok(client)
}

async fn connect(addr: SocketAddr, user: &str, password: &str) -> tokio_postgres::Client {
    try_connect(addr, user, password).await.unwrap()
}

async fn rows(client: &tokio_postgres::Client, sql: &str) -> Vec<SimpleQueryRow> {
    client
        .simple_query(sql)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

fn sqlstate(err: &tokio_postgres::Error) -> Option<&str> {
    err.code().map(|c| c.code())
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn rooms_visible_after_initial_sync() {
    let addr = start_test_server().await;
    let client = connect(addr, "Lan", "frontpw").await;

    let all = rows(&client, "SELECT * FROM rooms").await;
    let numbers: Vec<_> = all.iter().map(|r| r.get("number").unwrap()).collect();
    assert_eq!(numbers, vec!["101", "102", "205", "301"]);

    let room = rows(&client, "SELECT * FROM rooms WHERE number = '205'").await;
    assert_eq!(room.len(), 1);
    assert_eq!(room[0].get("status"), Some("vd"));
    assert_eq!(room[0].get("arrival"), Some("t"));

    let floor = rows(&client, "SELECT * FROM rooms WHERE floor = '1'").await;
    assert_eq!(floor.len(), 2);

    let arrivals = rows(&client, "SELECT * FROM arrivals").await;
    assert_eq!(arrivals.len(), 1);
    assert_eq!(arrivals[0].get("next_guest_name"), Some("Tran"));
    assert_eq!(arrivals[0].get("next_pax"), Some("2"));
}

#[tokio::test]
async fn housekeeping_cleaning_is_logged() {
    let addr = start_test_server().await;
    let client = connect(addr, "Mai", "hkpw").await;

    client
        .batch_execute("INSERT INTO status_changes (number, status) VALUES ('101', 'vc')")
        .await
        .unwrap();

    let room = rows(&client, "SELECT * FROM rooms WHERE number = '101'").await;
    assert_eq!(room[0].get("status"), Some("vc"));

    let activity = rows(&client, "SELECT * FROM activity").await;
    assert_eq!(activity.len(), 1);
    assert_eq!(activity[0].get("actor"), Some("Mai"));
    assert_eq!(activity[0].get("room"), Some("101"));

    let report = rows(&client, "SELECT * FROM staff_report").await;
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].get("vacant_cleaned"), Some("1"));
}

#[tokio::test]
async fn housekeeping_transition_rejected() {
    let addr = start_test_server().await;
    let client = connect(addr, "Mai", "hkpw").await;

    let err = client
        .batch_execute("INSERT INTO status_changes (number, status) VALUES ('102', 'vc')")
        .await
        .unwrap_err();
    assert_eq!(sqlstate(&err), Some("23514"));

    let room = rows(&client, "SELECT * FROM rooms WHERE number = '102'").await;
    assert_eq!(room[0].get("status"), Some("od"));

    let next = rows(&client, "SELECT * FROM next_statuses WHERE number = '102'").await;
    let targets: Vec<_> = next.iter().map(|r| r.get("status").unwrap()).collect();
    assert!(!targets.contains(&"vc"));
}

#[tokio::test]
async fn admin_commands_need_front_office() {
    let addr = start_test_server().await;
    let hk = connect(addr, "Mai", "hkpw").await;

    let err = hk.batch_execute("DELETE FROM rooms").await.unwrap_err();
    assert_eq!(sqlstate(&err), Some("42501"));
    let err = hk.batch_execute("RESYNC").await.unwrap_err();
    assert_eq!(sqlstate(&err), Some("42501"));

    let fo = connect(addr, "Lan", "frontpw").await;
    let outcome = rows(&fo, "RESYNC").await;
    assert_eq!(outcome.len(), 1);
    assert_eq!(outcome[0].get("success"), Some("t"));
    assert_eq!(outcome[0].get("rows"), Some("4"));

    let history = rows(&fo, "SELECT * FROM sync_history").await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].get("actor"), Some("Lan (FO)"));

    let last = rows(&fo, "SELECT * FROM last_sync").await;
    assert_eq!(last.len(), 1);
    assert_eq!(last[0].get("id"), history[0].get("id"));
}

#[tokio::test]
async fn front_office_full_edit() {
    let addr = start_test_server().await;
    let client = connect(addr, "Lan", "frontpw").await;

    client
        .batch_execute(
            "INSERT INTO room_updates (number, room_type, next_guest_name, next_check_in, next_check_out) \
             VALUES ('301', 'DLX', 'Pham', '28-12', '03-01')",
        )
        .await
        .unwrap();

    let room = rows(&client, "SELECT * FROM rooms WHERE number = '301'").await;
    assert_eq!(room[0].get("room_type"), Some("DLX"));
    assert_eq!(room[0].get("next_guest_name"), Some("Pham"));
    assert!(room[0].get("next_check_in").unwrap().starts_with("28-12-"));

    let err = client
        .batch_execute("INSERT INTO room_updates (number, status) VALUES ('999', 'vc')")
        .await
        .unwrap_err();
    assert_eq!(sqlstate(&err), Some("P0002"));

    let err = client
        .batch_execute("INSERT INTO room_updates (number) VALUES ('301')")
        .await
        .unwrap_err();
    assert_eq!(sqlstate(&err), Some("22023"));
}

#[tokio::test]
async fn bad_sql_and_bad_login() {
    let addr = start_test_server().await;
    let client = connect(addr, "Lan", "frontpw").await;

    let err = client.batch_execute("SELECT * FROM bookings").await.unwrap_err();
    assert_eq!(sqlstate(&err), Some("42601"));

    assert!(try_connect(addr, "Lan", "wrong").await.is_err());
    assert!(try_connect(addr, "Nobody", "x").await.is_err());
}

#[tokio::test]
async fn extended_query_reads_typed_rows() {
    let addr = start_test_server().await;
    let client = connect(addr, "Lan", "frontpw").await;

    let rooms = client
        .query("SELECT * FROM rooms WHERE number = $1", &[&"205"])
        .await
        .unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].get::<_, &str>("status"), "vd");
    assert!(rooms[0].get::<_, bool>("arrival"));
    assert_eq!(rooms[0].get::<_, &str>("next_guest_name"), "Tran");
    assert_eq!(rooms[0].get::<_, i64>("next_pax"), 2);

    let floor = client
        .query("SELECT * FROM rooms WHERE floor = $1", &[&"1"])
        .await
        .unwrap();
    assert_eq!(floor.len(), 2);

    let stmt = client.prepare("SELECT * FROM room_stats").await.unwrap();
    assert_eq!(stmt.columns().len(), 2);
    let stats = client.query(&stmt, &[]).await.unwrap();
    let total: i64 = stats.iter().map(|r| r.get::<_, i64>("count")).sum();
    assert_eq!(total, 4);
}

#[tokio::test]
async fn extended_query_binds_values_literally() {
    let addr = start_test_server().await;
    let client = connect(addr, "Lan", "frontpw").await;

    let updated = client
        .execute(
            "INSERT INTO room_updates (number, guest_name) VALUES ($1, $2)",
            &[&"301", &"Suite $1 guest"],
        )
        .await
        .unwrap();
    assert_eq!(updated, 1);

    client
        .execute(
            "INSERT INTO room_updates (number, next_guest_name) VALUES ($1, $2)",
            &[&"301", &"O'Brien"],
        )
        .await
        .unwrap();

    let room = rows(&client, "SELECT * FROM rooms WHERE number = '301'").await;
    assert_eq!(room[0].get("guest_name"), Some("Suite $1 guest"));
    assert_eq!(room[0].get("next_guest_name"), Some("O'Brien"));
}

#[tokio::test]
async fn extended_query_enforces_housekeeping_rules() {
    let addr = start_test_server().await;
    let client = connect(addr, "Mai", "hkpw").await;

    let changed = client
        .execute(
            "INSERT INTO status_changes (number, status) VALUES ($1, $2)",
            &[&"101", &"vc"],
        )
        .await
        .unwrap();
    assert_eq!(changed, 1);

    let err = client
        .execute(
            "INSERT INTO status_changes (number, status) VALUES ($1, $2)",
            &[&"102", &"vc"],
        )
        .await
        .unwrap_err();
    assert_eq!(sqlstate(&err), Some("23514"));

    let activity = client
        .query("SELECT * FROM activity WHERE room = $1", &[&"101"])
        .await
        .unwrap();
    assert_eq!(activity.len(), 1);
    assert_eq!(activity[0].get::<_, &str>("new_status"), "vc");
}
