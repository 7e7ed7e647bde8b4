// Integration tests exercising teardown resource reclamation.
//
// These tests require system `mysql_config`, `mysql_install_db`, and `mysqld`
// binaries on PATH (as shipped by MariaDB).

use tmpmysql::{MySqlServer, MySqldError};

/// Teardown steps run unconditionally: even when the server has been killed
/// out from under the fixture (so closing the connection and signaling can
/// fail), the data directory is still removed and no process is leaked.
#[tokio::test]
async fn stop_reclaims_resources_after_server_died() {
    //* Given
    let mut server = MySqlServer::new(10004)
        .await
        .expect("MySqlServer::new should start mysqld");
    server
        .initialize("teardown_db")
        .await
        .expect("initialize should succeed");

    let data_dir = server.data_dir().to_path_buf();
    let pid = server.pid().expect("mysqld should be running");

    // Kill mysqld behind the fixture's back
    kill9(pid);

    //* When
    let result = server.stop().await;

    //* Then
    if let Err(err) = result {
        assert!(
            matches!(err, MySqldError::Teardown(_)),
            "stop failures should be aggregated teardown errors, got: {err:?}"
        );
    }
    assert!(
        !data_dir.exists(),
        "data directory should be deleted even when teardown steps fail"
    );
    assert!(
        !process_is_alive(pid),
        "mysqld process should be gone after stop"
    );
}

/// A clean stop on an uninitialized instance (no connection was ever opened)
/// also reclaims everything.
#[tokio::test]
async fn stop_without_initialize_reclaims_resources() {
    //* Given
    let server = MySqlServer::new(10005)
        .await
        .expect("MySqlServer::new should start mysqld");
    let data_dir = server.data_dir().to_path_buf();
    let pid = server.pid().expect("mysqld should be running");

    //* When
    server.stop().await.expect("stop should succeed");

    //* Then
    assert!(!data_dir.exists(), "data directory should be deleted");
    assert!(!process_is_alive(pid), "mysqld process should be gone");
}

/// Send SIGKILL to the given PID.
fn kill9(pid: u32) {
    let pid = i32::try_from(pid).expect("PID should fit in i32");
    nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(pid),
        nix::sys::signal::Signal::SIGKILL,
    )
    .expect("SIGKILL should be delivered");
}

/// Check whether a process with the given PID still exists (signal 0).
fn process_is_alive(pid: u32) -> bool {
    let pid = i32::try_from(pid).expect("PID should fit in i32");
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
}
