//! Error types for the REPL client.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use firefox_repl::{Result, Session, SessionConfig};
//!
//! async fn example() -> Result<()> {
//!     let mut session = Session::connect(SessionConfig::default()).await?;
//!     session.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Fatal (session unusable) | [`Error::FirefoxUnreachable`], [`Error::HandshakeFailed`], [`Error::Config`], [`Error::InvalidArgument`], [`Error::NoFrameUrl`] |
//! | Lock | [`Error::LockRequired`], [`Error::LockFile`] |
//! | Retryable | [`Error::ElementMissing`] |
//! | Timeout | [`Error::Timeout`] |
//! | Connection | [`Error::ConnectionClosed`] |
//! | External | [`Error::Io`], [`Error::Json`] |
//!
//! Verbs that wrap an [`Outcome`](crate::protocol::Outcome) report failure by
//! returning `None`/`false` rather than raising; the variants above cover the
//! paths where an error must propagate (session construction, malformed
//! input, opt-in raise behavior).

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Fatal Errors
    // ========================================================================
    /// The remote REPL host refused the connection.
    ///
    /// Firefox (with the REPL extension) is not listening at the address.
    #[error("Firefox REPL unreachable at {host}:{port}")]
    FirefoxUnreachable {
        /// Host that refused the connection.
        host: String,
        /// Port that refused the connection.
        port: u16,
    },

    /// The REPL failed to initialize after the retry.
    ///
    /// The bootstrap handshake reported `NOT INITIALIZED` twice.
    #[error("REPL failed to initialize after {attempts} attempts")]
    HandshakeFailed {
        /// Number of initialize attempts made.
        attempts: u32,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid argument supplied to a verb or builder.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// A frame-scoped verb was called without a frame URL.
    #[error("No frame URL set; call switch_to_frame first")]
    NoFrameUrl,

    // ========================================================================
    // Lock Errors
    // ========================================================================
    /// A verb was invoked without holding the REPL lock.
    ///
    /// The REPL must be locked before performing any actions with it.
    #[error("The REPL must be locked before any REPL actions")]
    LockRequired,

    /// The advisory lock file could not be acquired or released.
    #[error("Lock file error: {message}")]
    LockFile {
        /// Description of the lock failure.
        message: String,
    },

    // ========================================================================
    // Retryable Errors
    // ========================================================================
    /// An element never appeared within the wait budget.
    ///
    /// Only raised when the caller opted into raise-on-failure behavior.
    #[error("{message}")]
    ElementMissing {
        /// Caller-provided or default description.
        message: String,
    },

    // ========================================================================
    // Timeout Errors
    // ========================================================================
    /// Operation timeout.
    ///
    /// Bounded-wait primitives return falsy outcomes instead; this variant
    /// covers connect and handshake level deadlines.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a Firefox unreachable error.
    #[inline]
    pub fn firefox_unreachable(host: impl Into<String>, port: u16) -> Self {
        Self::FirefoxUnreachable {
            host: host.into(),
            port,
        }
    }

    /// Creates a handshake failed error.
    #[inline]
    pub fn handshake_failed(attempts: u32) -> Self {
        Self::HandshakeFailed { attempts }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a lock file error.
    #[inline]
    pub fn lock_file(message: impl Into<String>) -> Self {
        Self::LockFile {
            message: message.into(),
        }
    }

    /// Creates an element missing error.
    #[inline]
    pub fn element_missing(message: impl Into<String>) -> Self {
        Self::ElementMissing {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this error leaves the session unusable.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::FirefoxUnreachable { .. }
                | Self::HandshakeFailed { .. }
                | Self::Config { .. }
                | Self::InvalidArgument { .. }
                | Self::NoFrameUrl
        )
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if this error may succeed on retry.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ElementMissing { .. } | Self::LockRequired | Self::Timeout { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
