// Integration tests exercising the temporary mysqld lifecycle end to end.
//
// These tests require system `mysql_config`, `mysql_install_db`, and `mysqld`
// binaries on PATH (as shipped by MariaDB).

use std::collections::HashMap;

use sqlx::mysql::MySqlConnection;
use tmpmysql::MySqlServer;

/// Start mysqld, initialize a database, run DDL/DML/queries through the
/// exposed connection, and verify the whole instance is reclaimed on stop.
#[tokio::test]
async fn create_initialize_query_stop_round_trip() {
    //* Given
    let mut server = MySqlServer::new(10000)
        .await
        .expect("MySqlServer::new should start mysqld");

    // The bootstrapped data directory must exist and be non-empty before use
    let data_dir = server.data_dir().to_path_buf();
    assert!(data_dir.exists(), "data directory should exist after create");
    assert!(
        fs_err::read_dir(&data_dir)
            .expect("data directory should be readable")
            .next()
            .is_some(),
        "data directory should contain bootstrap files after create"
    );

    server
        .initialize("test")
        .await
        .expect("initialize should create and select the database");

    //* When
    let conn = server.conn_mut().expect("connection is open after initialize");
    execute(
        conn,
        "CREATE TABLE things (
            id BIGINT PRIMARY KEY AUTO_INCREMENT,
            name VARCHAR(100) NOT NULL
        )",
    )
    .await;
    execute(conn, "INSERT INTO things (name) VALUES ('one'), ('two')").await;

    let actual = fetch_id_name_rows(conn, "SELECT id, name FROM things").await;

    //* Then
    let expected = HashMap::from([(1, "one".to_owned()), (2, "two".to_owned())]);
    assert_eq!(actual, expected, "auto-increment ids should start at 1");

    let pid = server.pid().expect("mysqld should still be running");
    server.stop().await.expect("stop should reclaim all resources");

    assert!(
        !data_dir.exists(),
        "data directory should be deleted after stop"
    );
    assert!(
        !process_is_alive(pid),
        "mysqld process should be gone after stop"
    );
}

/// Execute a SQL statement that returns no rows.
async fn execute(conn: &mut MySqlConnection, sql: &str) {
    sqlx::query(sql)
        .execute(&mut *conn)
        .await
        .expect("execute should succeed");
}

/// Run a query returning `(id, name)` pairs and collect them into a map.
async fn fetch_id_name_rows(conn: &mut MySqlConnection, sql: &str) -> HashMap<i64, String> {
    use sqlx::Row as _;

    let rows = sqlx::query(sql)
        .fetch_all(&mut *conn)
        .await
        .expect("query should succeed");

    rows.into_iter()
        .map(|row| {
            let id: i64 = row.try_get(0).expect("id column should decode");
            let name: String = row.try_get(1).expect("name column should decode");
            (id, name)
        })
        .collect()
}

/// Check whether a process with the given PID still exists (signal 0).
fn process_is_alive(pid: u32) -> bool {
    let pid = i32::try_from(pid).expect("PID should fit in i32");
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
}
