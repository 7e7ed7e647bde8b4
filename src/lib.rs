//! Temporary mysqld instances for integration tests
//!
//! This crate provisions throwaway MySQL/MariaDB server instances: each
//! [`MySqlServer`] owns a private data directory in scratch space, a `mysqld`
//! process bound to a caller-chosen loopback port, and (after initialization)
//! a live client connection scoped to a freshly created database. Stopping
//! the instance terminates the process and deletes all on-disk state.
//!
//! # Prerequisites
//!
//! A MySQL-compatible server must be installed on the system. The following
//! binaries must be available in PATH (or under a configured `bin_path`):
//!
//! - `mysql_config` - For locating the server installation
//! - `mysql_install_db` - For bootstrapping new data directories
//! - `mysqld` - The database server
//!
//! These are the tool names shipped by MariaDB (and MySQL before 5.7.6).
//!
//! # Examples
//!
//! ## Quick start with `MySqlServer::new()` (fixture defaults)
//!
//! ```ignore
//! use tmpmysql::MySqlServer;
//!
//! let mut server = MySqlServer::new(10000).await?;
//! server.initialize("testdb").await?;
//!
//! // Statements through the exposed connection are scoped to `testdb`
//! let conn = server.conn_mut().expect("initialized above");
//! sqlx::query("CREATE TABLE things (id BIGINT PRIMARY KEY AUTO_INCREMENT, name VARCHAR(100))")
//!     .execute(&mut *conn)
//!     .await?;
//!
//! // Consumes the server; stopping twice does not compile
//! server.stop().await?;
//! ```
//!
//! ## Full control with `MySqldBuilder`
//!
//! ```ignore
//! use std::time::Duration;
//! use tmpmysql::MySqldBuilder;
//!
//! let mut server = MySqldBuilder::new(10000)
//!     .user("root")
//!     .readiness_timeout(Duration::from_secs(60))
//!     .bin_path("/usr/local/mariadb/bin")
//!     .start()
//!     .await?;
//! ```
//!
//! # Isolation
//!
//! Instances are fully independent: distinct data directories, processes,
//! and ports. Parallel test execution across different instances is safe as
//! long as the caller hands out non-colliding ports. A single instance must
//! not be shared across tasks without external serialization.
//!
//! # Cleanup guarantees
//!
//! [`MySqlServer::stop`] runs every teardown step unconditionally and
//! aggregates failures, so a connection-close error cannot leak the process
//! or the data directory. If `stop` is never reached (a panicking test), the
//! `Drop` safety net terminates the process and removes the scratch
//! directory best-effort.

mod mysqld;

pub use mysqld::{MySqlServer, MySqldBuilder, MySqldError, TeardownError, TeardownStepError};
