//! Session lifecycle and the execution engine.
//!
//! A [`Session`] owns one [`Connection`](crate::transport::Connection) to the
//! in-browser REPL and runs compiled [`CodeUnit`]s through it. Execution is
//! strictly serialized: one unit in flight at a time, correlated to its
//! delimited response block by ordering alone.
//!
//! Execution never raises for remote failures. Whatever happens on the wire,
//! [`Session::execute_sync`] and [`Session::execute_async`] return an
//! [`Outcome`]: remote exceptions arrive as ERROR outcomes, deadline expiry
//! becomes the dedicated timeout outcome, and transport errors are folded
//! into ERROR outcomes carrying the failure message. Errors propagate only
//! from lifecycle operations (connect, rotate, close).

// ============================================================================
// Submodules
// ============================================================================

pub mod registry;

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::{CodeUnit, Outcome};
use crate::transport::Connection;

// ============================================================================
// Constants
// ============================================================================

/// Default deadline for executing one compiled unit.
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(30);

/// Default REPL port.
pub const DEFAULT_PORT: u16 = 4242;

/// Default REPL host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default lock file basename, created under the system temp directory.
const LOCK_BASENAME: &str = "firefox_repl.lock";

// ============================================================================
// SessionConfig
// ============================================================================

/// Connection parameters for a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// REPL host.
    pub host: String,
    /// REPL port.
    pub port: u16,
    /// Read timeout applied to transport-level waits.
    pub timeout: Duration,
    /// Path of the process-exclusion lock file.
    pub lock_path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_EXEC_TIMEOUT,
            lock_path: std::env::temp_dir().join(LOCK_BASENAME),
        }
    }
}

impl SessionConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the REPL host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the REPL port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the transport read timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the lock file path.
    #[must_use]
    pub fn with_lock_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_path = path.into();
        self
    }

    fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::config("host must not be empty"));
        }
        if self.port == 0 {
            return Err(Error::config("port must not be zero"));
        }
        Ok(())
    }
}

// ============================================================================
// Session
// ============================================================================

/// A connected REPL session.
///
/// Owns the connection and the session identifier. All executing methods
/// take `&mut self`; that exclusivity is the request/response serialization
/// the line protocol requires.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    connection: Option<Connection>,
}

impl Session {
    /// Connects and runs the bootstrap handshake.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] for malformed configuration
    /// - [`Error::FirefoxUnreachable`] when nothing listens at the address
    /// - [`Error::HandshakeFailed`] when the REPL fails to initialize
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let connection = Connection::open(&config.host, config.port, config.timeout).await?;
        Ok(Self {
            config,
            connection: Some(connection),
        })
    }

    /// Returns the configuration this session was built with.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the session identifier, if connected.
    #[must_use]
    pub fn repl_id(&self) -> Option<&str> {
        self.connection.as_ref().map(Connection::repl_id)
    }

    /// Returns `true` while a connection is held.
    #[inline]
    #[must_use]
    pub fn connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Drops the current connection and opens a fresh one.
    ///
    /// The remote side assigns a new session identifier, so every
    /// [`ScriptBuilder`](crate::protocol::ScriptBuilder) bound to this
    /// session must be rebound afterwards. Used after a timed-out unit may
    /// have left the stream desynchronized.
    ///
    /// # Errors
    ///
    /// Same as [`Session::connect`].
    pub async fn rotate(&mut self) -> Result<&str> {
        debug!("Rotating REPL connection");
        if let Some(mut old) = self.connection.take() {
            // Best effort; the old stream may already be dead.
            if let Err(e) = old.close().await {
                warn!(error = %e, "Error closing old connection");
            }
        }

        let connection =
            Connection::open(&self.config.host, self.config.port, self.config.timeout).await?;
        self.connection = Some(connection);
        Ok(self.connection.as_ref().map(Connection::repl_id).unwrap_or_default())
    }

    /// Closes the session.
    ///
    /// Idempotent; closing an already-closed session is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut connection) = self.connection.take() {
            connection.close().await?;
        }
        Ok(())
    }

    /// Builds a disconnected session for exercising execution paths in
    /// tests.
    #[cfg(test)]
    pub(crate) fn offline_for_tests(config: SessionConfig) -> Self {
        Self {
            config,
            connection: None,
        }
    }

    // ========================================================================
    // Execution Engine
    // ========================================================================

    /// Executes an immediate-result unit.
    ///
    /// The unit's wrapper reports its result as soon as evaluation finishes;
    /// this call sends the unit and blocks until the delimited response block
    /// arrives or `exec_timeout` expires.
    ///
    /// Never returns an error for remote or transport failures: all paths
    /// produce an [`Outcome`]. A zero `exec_timeout` short-circuits to the
    /// timeout outcome without sending anything.
    pub async fn execute_sync(&mut self, unit: &CodeUnit, exec_timeout: Duration) -> Outcome {
        self.execute(unit, exec_timeout).await
    }

    /// Executes a callback-style unit.
    ///
    /// The remote task completes on another execution thread and reports
    /// through its callback; from this side the call is still synchronous,
    /// blocking until the single delimited response block arrives or
    /// `exec_timeout` expires. Failure semantics match
    /// [`Session::execute_sync`].
    pub async fn execute_async(&mut self, unit: &CodeUnit, exec_timeout: Duration) -> Outcome {
        self.execute(unit, exec_timeout).await
    }

    async fn execute(&mut self, unit: &CodeUnit, exec_timeout: Duration) -> Outcome {
        if exec_timeout.is_zero() {
            return Outcome::timed_out();
        }

        let Some(connection) = self.connection.as_mut() else {
            return Outcome::error("session is not connected");
        };

        debug!(len = unit.source().len(), "Executing unit");

        match timeout(exec_timeout, connection.json_cmd(unit.source())).await {
            Ok(Ok(raw)) => Outcome::parse(&raw),
            Ok(Err(e)) => {
                warn!(error = %e, "Transport failure during execution");
                Outcome::error(e.to_string())
            }
            Err(_) => {
                // The response may still arrive later; the caller should
                // rotate before reusing this session.
                warn!(timeout_ms = exec_timeout.as_millis() as u64, "Execution deadline expired");
                Outcome::timed_out()
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
