//! mysqld process management.
//!
//! Spins up a throwaway `mysqld` instance on a caller-chosen loopback port:
//! bootstraps a fresh data directory in scratch space, starts the server,
//! waits for it to accept connections, and tears everything down (process
//! and on-disk state) when the test is done.
//!
//! # MySQL Binaries
//!
//! This module invokes the following MySQL/MariaDB command-line tools. All
//! binaries must be available in `PATH` (discovered via the [`which`] crate)
//! or supplied via [`MySqldBuilder::bin_path`].
//!
//! | Binary             | Role                                  |
//! |--------------------|---------------------------------------|
//! | `mysql_config`     | Locate the server installation        |
//! | `mysql_install_db` | Bootstrap a fresh data directory      |
//! | `mysqld`           | Run the database server               |
//!
//! `mysql_install_db` and `mysql_config` are shipped by MariaDB and by MySQL
//! releases before 5.7.6; later Oracle MySQL replaced them. Tested against
//! MariaDB server packages.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use backon::{ConstantBuilder, Retryable};
use sqlx::{mysql::MySqlConnection, Connection as _};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::{Child, Command},
    task::JoinHandle,
};

/// Interval between readiness probe attempts.
const PROBE_INTERVAL: Duration = Duration::from_millis(50);

/// Default overall deadline for mysqld to become ready.
const DEFAULT_READINESS_TIMEOUT_SECS: u64 = 30;

/// How long to wait for mysqld to exit after SIGTERM before escalating.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Builder for configuring and starting a temporary mysqld instance.
///
/// The port is the only required parameter. It must be a valid, unused TCP
/// port — availability is not validated here; callers running tests in
/// parallel must hand out non-colliding ports themselves.
///
/// # Example
///
/// ```ignore
/// use tmpmysql::MySqldBuilder;
///
/// // Minimal usage with fixture defaults (root login, no password)
/// let mut server = MySqldBuilder::new(10000).start().await?;
///
/// // Fully configured
/// let mut server = MySqldBuilder::new(10000)
///     .user("admin")
///     .readiness_timeout(std::time::Duration::from_secs(60))
///     .bin_path("/usr/local/mariadb/bin")
///     .start()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct MySqldBuilder {
    port: u16,
    user: String,
    bin_path: Option<PathBuf>,
    readiness_timeout: Duration,
}

impl MySqldBuilder {
    /// Creates a new builder for a mysqld instance on the given loopback port.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            user: "root".to_owned(),
            bin_path: None,
            readiness_timeout: Duration::from_secs(DEFAULT_READINESS_TIMEOUT_SECS),
        }
    }

    /// Sets the administrative login used for the fixture connection.
    ///
    /// Defaults to `root` with no password, which is what a freshly
    /// bootstrapped data directory accepts for local connections.
    #[must_use]
    pub fn user(mut self, user: &str) -> Self {
        self.user = user.to_owned();
        self
    }

    /// Sets the directory containing the MySQL binaries (`mysql_config`,
    /// `mysql_install_db`, `mysqld`).
    ///
    /// When set, binaries are resolved by joining this path with the binary
    /// name instead of using PATH-based discovery. This enables explicit
    /// version selection when multiple server installations exist.
    #[must_use]
    pub fn bin_path(mut self, path: impl AsRef<Path>) -> Self {
        self.bin_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the overall deadline for the readiness probe in
    /// [`MySqlServer::initialize`].
    ///
    /// Defaults to 30 seconds. The probe retries at a fixed 50 ms interval
    /// until the server accepts a connection or the deadline elapses, at
    /// which point [`MySqldError::ReadinessTimeout`] is returned.
    #[must_use]
    pub fn readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    /// Resolves a MySQL binary path, using `bin_path` if set or falling back
    /// to PATH-based discovery via the `which` crate.
    fn resolve_binary(&self, name: &str) -> Result<PathBuf, MySqldError> {
        if let Some(ref bin_dir) = self.bin_path {
            let path = bin_dir.join(name);
            if path.exists() {
                return Ok(path);
            }
            return Err(MySqldError::BinaryNotFound {
                name: name.to_string(),
            });
        }
        find_binary(name)
    }

    /// Starts the mysqld server and returns a handle supervising it.
    ///
    /// This method:
    /// 1. Locates the server installation via `mysql_config`
    /// 2. Allocates a fresh, uniquely named scratch data directory
    /// 3. Bootstraps the data directory via `mysql_install_db`
    /// 4. Spawns `mysqld` bound to `127.0.0.1` on the configured port
    ///
    /// All steps must succeed or the whole operation fails with no partial
    /// instance returned (the scratch directory is removed on failure by its
    /// guard). No connection is opened yet — readiness detection and schema
    /// provisioning happen in [`MySqlServer::initialize`].
    pub async fn start(self) -> Result<MySqlServer, MySqldError> {
        tracing::info!(port = self.port, "starting temporary mysqld instance");

        let base_dir = self.query_base_dir().await?;

        let scratch = tempfile::Builder::new()
            .prefix("tmpmysql-")
            .tempdir()
            .map_err(|err| MySqldError::ScratchDir { source: err })?;
        let data_dir = scratch.path().to_path_buf();

        self.run_install_db(&base_dir, &data_dir).await?;
        ensure_bootstrapped(&data_dir).await?;

        let mut child = self.spawn_mysqld(&data_dir)?;

        // Forward subprocess output to tracing. Tasks terminate automatically
        // when the child exits (EOF on pipes).
        let stdout_log_task = child.stdout.take().map(|stdout| {
            tokio::spawn(async move {
                let reader = BufReader::new(stdout);
                let mut lines = reader.lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::info!(target: "mysqld", "{}", line);
                }
            })
        });

        let stderr_log_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let reader = BufReader::new(stderr);
                let mut lines = reader.lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::warn!(target: "mysqld", "{}", line);
                }
            })
        });

        tracing::info!(
            port = self.port,
            data_dir = %data_dir.display(),
            "mysqld process started"
        );

        Ok(MySqlServer {
            port: self.port,
            user: self.user,
            readiness_timeout: self.readiness_timeout,
            data_dir,
            scratch: Some(scratch),
            child: Some(child),
            conn: None,
            stdout_log_task,
            stderr_log_task,
        })
    }

    /// Locates the base installation directory of the server software.
    ///
    /// Runs `mysql_config --variable=pkglibdir` and resolves the printed
    /// path's parent, mirroring how the server's own tooling derives
    /// `--basedir`. A missing tool or non-zero exit means no usable server
    /// installation is present.
    async fn query_base_dir(&self) -> Result<PathBuf, MySqldError> {
        let mysql_config = self.resolve_binary("mysql_config")?;

        let output = Command::new(&mysql_config)
            .arg("--variable=pkglibdir")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|err| MySqldError::BaseDirQuery { source: err })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(MySqldError::BaseDirQueryExit {
                status: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        let pkglibdir = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let base_dir = std::path::absolute(Path::new(&pkglibdir).join(".."))
            .map_err(|err| MySqldError::BaseDirQuery { source: err })?;

        tracing::debug!(base_dir = %base_dir.display(), "located server installation");
        Ok(base_dir)
    }

    /// Bootstraps the data directory using `mysql_install_db`.
    ///
    /// Runs the following command:
    ///
    /// ```text
    /// mysql_install_db --no-defaults --basedir=<base_dir> --datadir=<data_dir> \
    ///     --auth-root-authentication-method=normal [--user=root]
    /// ```
    ///
    /// The `normal` root authentication method grants `root` passwordless
    /// access over TCP; MariaDB 10.4+ defaults to `socket`, which only
    /// authenticates the matching OS user over the Unix socket and would
    /// lock the fixture out of its own server. `--user=root` is appended
    /// when running as the superuser, which the bootstrap otherwise refuses.
    ///
    /// Both stdout and stderr are captured; stderr is included in the error
    /// on non-zero exit.
    async fn run_install_db(&self, base_dir: &Path, data_dir: &Path) -> Result<(), MySqldError> {
        let install_db = self.resolve_binary("mysql_install_db")?;

        tracing::info!(
            data_dir = %data_dir.display(),
            mysql_install_db = %install_db.display(),
            "bootstrapping data directory"
        );

        let mut cmd = Command::new(&install_db);
        cmd.arg("--no-defaults")
            .arg(format!("--basedir={}", base_dir.display()))
            .arg(format!("--datadir={}", data_dir.display()))
            .arg("--auth-root-authentication-method=normal");
        if running_as_superuser() {
            cmd.arg("--user=root");
        }

        let output = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|err| MySqldError::Bootstrap {
                data_dir: data_dir.to_path_buf(),
                source: err,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(MySqldError::BootstrapExit {
                status: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        Ok(())
    }

    /// Spawns the mysqld server process.
    ///
    /// Runs the following command:
    ///
    /// ```text
    /// mysqld --no-defaults --datadir=<data_dir> --bind-address=127.0.0.1 --port=<port> [--user=root]
    /// ```
    ///
    /// | Flag                       | Purpose                                   |
    /// |----------------------------|-------------------------------------------|
    /// | `--no-defaults`            | Ignore any installed option files         |
    /// | `--datadir=<data_dir>`     | The freshly bootstrapped data directory   |
    /// | `--bind-address=127.0.0.1` | Listen on loopback only                   |
    /// | `--port=<port>`            | Caller-chosen TCP port                    |
    /// | `--user=root`              | Only when running as the superuser, which mysqld otherwise refuses |
    ///
    /// Both stdout and stderr are piped for log forwarding via tracing.
    fn spawn_mysqld(&self, data_dir: &Path) -> Result<Child, MySqldError> {
        let mysqld_path = self.resolve_binary("mysqld")?;

        let mut cmd = Command::new(&mysqld_path);
        cmd.arg("--no-defaults")
            .arg(format!("--datadir={}", data_dir.display()))
            .arg("--bind-address=127.0.0.1")
            .arg(format!("--port={}", self.port));
        if running_as_superuser() {
            cmd.arg("--user=root");
        }

        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| MySqldError::StartFailed { source: err })
    }
}

/// A temporary mysqld instance.
///
/// Owns one server process, its private data directory, its listening port,
/// and (after [`initialize`](Self::initialize)) a live client connection.
/// Constructed via [`MySqldBuilder`] or [`MySqlServer::new`].
///
/// A single instance must not be used from multiple tasks concurrently; the
/// caller serializes access or confines the instance to one task. Distinct
/// instances are fully independent and safe to run in parallel as long as
/// their ports do not collide.
///
/// Teardown runs through [`stop`](Self::stop), which consumes the instance —
/// stopping twice is rejected at compile time. If a test panics before
/// calling `stop`, the [`Drop`] safety net terminates the process (SIGTERM,
/// escalating to SIGKILL) and the scratch directory guard removes the
/// on-disk state best-effort.
pub struct MySqlServer {
    port: u16,
    user: String,
    readiness_timeout: Duration,
    data_dir: PathBuf,
    /// Scratch directory guard; `Some` until `stop()` removes it explicitly.
    scratch: Option<tempfile::TempDir>,
    /// The mysqld child process; `Some` until `stop()` consumes the server.
    child: Option<Child>,
    /// Client connection; `Some` only after successful initialization.
    conn: Option<MySqlConnection>,
    stdout_log_task: Option<JoinHandle<()>>,
    stderr_log_task: Option<JoinHandle<()>>,
}

impl MySqlServer {
    /// Starts a temporary mysqld instance on the given port with fixture
    /// defaults (root login, no password, 30 s readiness deadline).
    ///
    /// Equivalent to `MySqldBuilder::new(port).start()`.
    pub async fn new(port: u16) -> Result<Self, MySqldError> {
        MySqldBuilder::new(port).start().await
    }

    /// The TCP port mysqld was told to bind to on the loopback interface.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The private data directory holding all server-managed files.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// The process ID of the mysqld child, if it has not been reaped yet.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|child| child.id())
    }

    /// The connection URL for this instance.
    pub fn url(&self) -> String {
        build_connection_url(&self.user, self.port)
    }

    /// The live client connection, or `None` if [`initialize`](Self::initialize)
    /// has not run successfully yet.
    ///
    /// Statements executed through this connection are scoped to the database
    /// created during initialization for the remainder of the instance's life.
    pub fn conn_mut(&mut self) -> Option<&mut MySqlConnection> {
        self.conn.as_mut()
    }

    /// Waits for mysqld to accept connections, then creates the given
    /// database and sets it as the connection's current database.
    ///
    /// Readiness is probed by attempting the client handshake against
    /// `127.0.0.1:port` at a fixed 50 ms interval. The probe is bounded by
    /// the configured readiness timeout (default 30 s) and races against
    /// child exit, so a server that dies during boot — for example because
    /// the port is already in use — surfaces promptly as
    /// [`MySqldError::UnexpectedExit`] instead of hanging.
    ///
    /// The `CREATE DATABASE` and `USE` statements run unprepared; their
    /// failures (duplicate name, bad identifier, permissions) propagate
    /// verbatim as [`MySqldError::Sql`].
    ///
    /// Calling this a second time on an already-initialized instance returns
    /// [`MySqldError::AlreadyInitialized`].
    pub async fn initialize(&mut self, database: &str) -> Result<(), MySqldError> {
        if self.conn.is_some() {
            return Err(MySqldError::AlreadyInitialized);
        }

        let url = self.url();
        let timeout_secs = self.readiness_timeout.as_secs();
        let max_attempts =
            (self.readiness_timeout.as_millis() / PROBE_INTERVAL.as_millis()).max(1) as usize;

        tracing::debug!(
            url = %url,
            timeout_secs,
            "waiting for mysqld to accept connections"
        );

        let child = self
            .child
            .as_mut()
            .expect("mysqld child is present until stop() consumes the server");

        // The retry closure must be a pure function (no &mut self capture),
        // so it owns a clone of the URL; child exit is monitored as a
        // separate select! branch.
        let probe = (|| {
            let url = url.clone();
            async move { MySqlConnection::connect(&url).await }
        })
        .retry(
            ConstantBuilder::default()
                .with_delay(PROBE_INTERVAL)
                .with_max_times(max_attempts),
        )
        .notify(|_err, dur| {
            tracing::trace!(
                retry_after_ms = dur.as_millis() as u64,
                "mysqld not ready, retrying"
            );
        });

        let mut conn = tokio::select! {
            probe_result = tokio::time::timeout(self.readiness_timeout, probe) => {
                match probe_result {
                    Ok(Ok(conn)) => conn,
                    // Retry budget exhausted — keep the last probe error as
                    // the source so persistent failures (e.g. access denied)
                    // stay diagnosable
                    Ok(Err(err)) => {
                        return Err(MySqldError::ReadinessTimeout {
                            timeout_secs,
                            source: Some(err),
                        });
                    }
                    // Overall deadline elapsed mid-attempt; no final error
                    Err(_) => {
                        return Err(MySqldError::ReadinessTimeout {
                            timeout_secs,
                            source: None,
                        });
                    }
                }
            }
            status = child.wait() => {
                let status = status.map_err(|err| MySqldError::StartFailed { source: err })?;
                tracing::error!(status = ?status, "mysqld exited during readiness wait");
                return Err(MySqldError::UnexpectedExit {
                    status: status.code(),
                });
            }
        };

        exec_raw(&mut conn, &format!("CREATE DATABASE {database}")).await?;
        exec_raw(&mut conn, &format!("USE {database}")).await?;

        tracing::info!(port = self.port, database, "mysqld instance ready");

        self.conn = Some(conn);
        Ok(())
    }

    /// Tears the instance down: closes the connection, terminates the mysqld
    /// process gracefully (SIGTERM, escalating to SIGKILL after 10 s), and
    /// removes the data directory.
    ///
    /// All steps run unconditionally; any step failures are collected and
    /// returned together as [`MySqldError::Teardown`], so the process is
    /// signaled and the directory removed even when closing the connection
    /// fails. Consuming `self` makes a second `stop` unrepresentable.
    pub async fn stop(mut self) -> Result<(), MySqldError> {
        tracing::info!(
            port = self.port,
            data_dir = %self.data_dir.display(),
            "stopping mysqld instance"
        );

        let mut steps = Vec::new();

        if let Some(conn) = self.conn.take() {
            if let Err(err) = conn.close().await {
                steps.push(TeardownStepError::CloseConnection(err));
            }
        }

        if let Some(mut child) = self.child.take() {
            #[cfg(unix)]
            if let Err(err) = signal_child(&child, nix::sys::signal::Signal::SIGTERM) {
                steps.push(TeardownStepError::Signal(err));
            }

            match tokio::time::timeout(SHUTDOWN_TIMEOUT, child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::info!(status = ?status, "mysqld exited");
                }
                Ok(Err(err)) => steps.push(TeardownStepError::Wait(err)),
                Err(_) => {
                    // Timeout — force kill via native tokio API (sends SIGKILL)
                    tracing::warn!("mysqld shutdown timed out, forcing kill");
                    match child.kill().await {
                        // Reap the killed child to prevent a zombie process
                        Ok(()) => {
                            let _ = child.wait().await;
                        }
                        Err(err) => steps.push(TeardownStepError::Kill(err)),
                    }
                }
            }
        }

        self.abort_log_tasks();

        if let Some(scratch) = self.scratch.take() {
            if let Err(err) = scratch.close() {
                steps.push(TeardownStepError::RemoveDataDir(err));
            }
        }

        if steps.is_empty() {
            Ok(())
        } else {
            Err(MySqldError::Teardown(TeardownError { steps }))
        }
    }

    /// Aborts the stdout/stderr log forwarding tasks if they are still running.
    fn abort_log_tasks(&mut self) {
        if let Some(handle) = self.stdout_log_task.take() {
            handle.abort();
        }
        if let Some(handle) = self.stderr_log_task.take() {
            handle.abort();
        }
    }

    /// Blocking shutdown for the Drop safety net.
    ///
    /// Sends SIGTERM then polls waitpid with WNOHANG so mysqld can flush and
    /// exit cleanly. On timeout, escalates to SIGKILL.
    ///
    /// Happy path: when `stop()` already ran, the child was taken out of the
    /// instance and this returns immediately.
    #[cfg(unix)]
    fn shutdown_blocking(&mut self) {
        use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};

        let Some(child) = self.child.as_ref() else {
            return;
        };
        let Some(pid) = child.id() else {
            // Already reaped — nothing to do.
            return;
        };

        // SAFETY: PID limits are well under `i32::MAX` (~2.1 billion) on all
        // supported platforms — Linux caps at 4_194_304, macOS at 99_999.
        let nix_pid = i32::try_from(pid)
            .map(nix::unistd::Pid::from_raw)
            .expect("PID exceeds i32::MAX");

        if nix::sys::signal::kill(nix_pid, nix::sys::signal::Signal::SIGTERM).is_err() {
            return; // process already gone
        }

        // Poll waitpid(WNOHANG): 100 iterations × 100 ms = 10 s timeout.
        for _ in 0..100 {
            match waitpid(nix_pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => {
                    std::thread::sleep(Duration::from_millis(100));
                }
                // Process exited, signaled, or any other terminal state.
                Ok(_) => return,
                // ECHILD: not our child or already reaped — either way, done.
                Err(_) => return,
            }
        }

        // Timeout — escalate to SIGKILL.
        tracing::warn!(
            pid,
            "mysqld did not exit within 10 s after SIGTERM in Drop, sending SIGKILL"
        );
        let _ = nix::sys::signal::kill(nix_pid, nix::sys::signal::Signal::SIGKILL);

        // Brief reap attempt: 5 iterations × 100 ms = 500 ms.
        for _ in 0..5 {
            match waitpid(nix_pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => {
                    std::thread::sleep(Duration::from_millis(100));
                }
                _ => return,
            }
        }
        // Give up — tokio's orphan queue handles the rest.
    }
}

impl Drop for MySqlServer {
    fn drop(&mut self) {
        self.abort_log_tasks();
        #[cfg(unix)]
        self.shutdown_blocking();
        // The scratch TempDir guard removes the data directory best-effort.
    }
}

impl std::fmt::Debug for MySqlServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlServer")
            .field("port", &self.port)
            .field("data_dir", &self.data_dir)
            .field("initialized", &self.conn.is_some())
            .finish_non_exhaustive()
    }
}

/// Executes a single statement over the text protocol (unprepared).
///
/// `USE` cannot go through the prepared-statement path, so both setup
/// statements run as raw SQL.
async fn exec_raw(conn: &mut MySqlConnection, sql: &str) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(sql).execute(conn).await.map(|_| ())
}

/// Whether this process runs with superuser privileges.
///
/// mysqld and mysql_install_db refuse to run as root unless `--user=root`
/// is passed explicitly.
#[cfg(unix)]
fn running_as_superuser() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
fn running_as_superuser() -> bool {
    false
}

/// Finds a MySQL binary in PATH using the `which` crate.
fn find_binary(name: &str) -> Result<PathBuf, MySqldError> {
    which::which(name).map_err(|_| MySqldError::BinaryNotFound {
        name: name.to_string(),
    })
}

/// Verifies the bootstrap left the data directory non-empty.
///
/// mysqld refuses to start on an empty datadir; checking here turns a silent
/// bootstrap no-op into a typed error before the process is spawned.
async fn ensure_bootstrapped(data_dir: &Path) -> Result<(), MySqldError> {
    let bootstrap_err = |err| MySqldError::Bootstrap {
        data_dir: data_dir.to_path_buf(),
        source: err,
    };

    let mut entries = fs_err::tokio::read_dir(data_dir).await.map_err(bootstrap_err)?;
    if entries.next_entry().await.map_err(bootstrap_err)?.is_none() {
        return Err(MySqldError::BootstrapIncomplete {
            data_dir: data_dir.to_path_buf(),
        });
    }
    Ok(())
}

/// Sends a signal to the child process via the nix crate (safe Rust, no shell).
#[cfg(unix)]
fn signal_child(child: &Child, signal: nix::sys::signal::Signal) -> std::io::Result<()> {
    let Some(pid) = child.id() else {
        // Already reaped — nothing to signal.
        return Ok(());
    };

    // SAFETY: PID limits are well under `i32::MAX` (~2.1 billion) on all
    // supported platforms — Linux caps at 4_194_304, macOS at 99_999.
    let nix_pid = i32::try_from(pid)
        .map(nix::unistd::Pid::from_raw)
        .expect("PID exceeds i32::MAX");

    nix::sys::signal::kill(nix_pid, signal)
        .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))
}

/// Builds a MySQL connection URL for the loopback TCP endpoint.
///
/// No database path segment: the connection starts out unscoped and is bound
/// to a database by the `USE` statement during initialization.
fn build_connection_url(user: &str, port: u16) -> String {
    format!("mysql://{user}@127.0.0.1:{port}/")
}

/// Errors that can occur while managing a temporary mysqld instance.
#[derive(Debug, thiserror::Error)]
pub enum MySqldError {
    /// A required MySQL binary (`mysql_config`, `mysql_install_db`,
    /// `mysqld`) was not found in PATH or under the configured `bin_path`.
    #[error("MySQL binary '{name}' not found")]
    BinaryNotFound {
        /// Name of the binary that was not found
        name: String,
    },

    /// Failed to run `mysql_config` to locate the server installation.
    #[error("failed to query the MySQL installation via mysql_config")]
    BaseDirQuery {
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// `mysql_config` ran but exited with an error code — no usable server
    /// installation was found.
    #[error("mysql_config exited with status {status}: {stderr}")]
    BaseDirQueryExit {
        /// Exit status code
        status: i32,
        /// Standard error output from mysql_config
        stderr: String,
    },

    /// Cannot allocate the scratch data directory.
    #[error("failed to allocate a scratch data directory")]
    ScratchDir {
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Failed to run `mysql_install_db` against the data directory.
    #[error("failed to bootstrap the data directory at '{data_dir}'")]
    Bootstrap {
        /// Path to the data directory that failed to bootstrap
        data_dir: PathBuf,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// `mysql_install_db` ran but exited with an error code.
    #[error("mysql_install_db exited with status {status}: {stderr}")]
    BootstrapExit {
        /// Exit status code
        status: i32,
        /// Standard error output from mysql_install_db
        stderr: String,
    },

    /// `mysql_install_db` reported success but wrote nothing to the data
    /// directory.
    #[error("bootstrap left the data directory at '{data_dir}' empty")]
    BootstrapIncomplete {
        /// Path to the data directory that stayed empty
        data_dir: PathBuf,
    },

    /// The mysqld process could not be spawned or waited on.
    #[error("failed to start the mysqld server process")]
    StartFailed {
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// mysqld started but did not accept a connection within the readiness
    /// deadline.
    #[error("mysqld failed to become ready within {timeout_secs} seconds")]
    ReadinessTimeout {
        /// Number of seconds waited before timing out
        timeout_secs: u64,
        /// The last probe error, when the retry budget ran out before the
        /// overall deadline did
        #[source]
        source: Option<sqlx::Error>,
    },

    /// mysqld exited while it was still expected to be running, e.g. because
    /// its port was already bound by another process.
    #[error("mysqld exited unexpectedly with status {status:?}")]
    UnexpectedExit {
        /// Exit status code, if available
        status: Option<i32>,
    },

    /// [`MySqlServer::initialize`] was called on an instance whose connection
    /// is already open. This is a caller bug, not a server failure.
    #[error("instance is already initialized")]
    AlreadyInitialized,

    /// A schema setup statement or caller statement failed; surfaced verbatim
    /// from the driver.
    #[error(transparent)]
    Sql(#[from] sqlx::Error),

    /// One or more teardown steps failed. All steps still ran; see
    /// [`TeardownError::steps`] for what went wrong.
    #[error(transparent)]
    Teardown(#[from] TeardownError),
}

/// Aggregate of everything that failed during [`MySqlServer::stop`].
///
/// Teardown never aborts early: a connection-close failure does not leave
/// the process running or the data directory on disk. Whatever failed along
/// the way is collected here.
#[derive(Debug)]
pub struct TeardownError {
    steps: Vec<TeardownStepError>,
}

impl TeardownError {
    /// The individual step failures, in teardown order.
    pub fn steps(&self) -> &[TeardownStepError] {
        &self.steps
    }
}

impl std::fmt::Display for TeardownError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "teardown finished with {} error(s)", self.steps.len())?;
        for step in &self.steps {
            write!(f, "; {step}")?;
        }
        Ok(())
    }
}

impl std::error::Error for TeardownError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.steps
            .first()
            .map(|step| step as &(dyn std::error::Error + 'static))
    }
}

/// A single failed step within [`MySqlServer::stop`].
#[derive(Debug, thiserror::Error)]
pub enum TeardownStepError {
    /// Closing the client connection failed.
    #[error("failed to close the client connection: {0}")]
    CloseConnection(#[source] sqlx::Error),

    /// Delivering SIGTERM to mysqld failed.
    #[error("failed to signal mysqld: {0}")]
    Signal(#[source] std::io::Error),

    /// Waiting for mysqld to exit failed.
    #[error("error waiting for mysqld to exit: {0}")]
    Wait(#[source] std::io::Error),

    /// Force-killing mysqld after the grace period failed.
    #[error("failed to force kill mysqld: {0}")]
    Kill(#[source] std::io::Error),

    /// Removing the data directory failed.
    #[error("failed to remove the data directory: {0}")]
    RemoveDataDir(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_connection_url() {
        let url = build_connection_url("root", 10000);
        assert_eq!(url, "mysql://root@127.0.0.1:10000/");
    }

    #[test]
    fn test_build_connection_url_custom_user() {
        let url = build_connection_url("admin", 3307);
        assert_eq!(url, "mysql://admin@127.0.0.1:3307/");
    }

    #[test]
    fn builder_applies_fixture_defaults() {
        let builder = MySqldBuilder::new(10000);

        assert_eq!(builder.port, 10000);
        assert_eq!(builder.user, "root");
        assert_eq!(builder.bin_path, None);
        assert_eq!(
            builder.readiness_timeout,
            Duration::from_secs(DEFAULT_READINESS_TIMEOUT_SECS)
        );
    }

    #[test]
    fn builder_methods_are_chainable() {
        let builder = MySqldBuilder::new(10000)
            .user("admin")
            .readiness_timeout(Duration::from_secs(5))
            .bin_path("/usr/local/mariadb/bin");

        assert_eq!(builder.user, "admin");
        assert_eq!(builder.readiness_timeout, Duration::from_secs(5));
        assert_eq!(
            builder.bin_path,
            Some(PathBuf::from("/usr/local/mariadb/bin"))
        );
    }

    #[test]
    fn readiness_timeout_carries_last_probe_error() {
        let exhausted = MySqldError::ReadinessTimeout {
            timeout_secs: 1,
            source: Some(sqlx::Error::PoolClosed),
        };
        assert!(
            std::error::Error::source(&exhausted).is_some(),
            "the last probe error should be reachable as the source"
        );

        let deadline_elapsed = MySqldError::ReadinessTimeout {
            timeout_secs: 1,
            source: None,
        };
        assert!(
            std::error::Error::source(&deadline_elapsed).is_none(),
            "a bare deadline expiry has no underlying probe error"
        );
    }

    #[test]
    fn teardown_kill_step_names_the_failed_action() {
        let step = TeardownStepError::Kill(std::io::Error::other("not permitted"));
        assert!(
            step.to_string().contains("force kill"),
            "the kill step should be distinguishable from the exit wait"
        );
    }

    #[test]
    fn teardown_error_display_lists_steps() {
        let err = TeardownError {
            steps: vec![TeardownStepError::RemoveDataDir(std::io::Error::other(
                "disk on fire",
            ))],
        };

        let rendered = err.to_string();
        assert!(rendered.starts_with("teardown finished with 1 error(s)"));
        assert!(rendered.contains("failed to remove the data directory"));
    }

    #[test]
    fn teardown_error_source_is_first_step() {
        let err = TeardownError {
            steps: vec![
                TeardownStepError::CloseConnection(sqlx::Error::PoolClosed),
                TeardownStepError::RemoveDataDir(std::io::Error::other("disk on fire")),
            ],
        };

        let source = std::error::Error::source(&err).expect("source should be the first step");
        assert!(source.to_string().contains("close the client connection"));
    }
}
