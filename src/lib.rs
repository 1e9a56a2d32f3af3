//! Firefox REPL client - remote browser automation over a line protocol.
//!
//! This library drives a Firefox instance through an in-browser JavaScript
//! REPL listening on a TCP port. Host-side calls are compiled into blocks
//! of JavaScript, evaluated remotely, and reported back as delimited JSON
//! result blocks.
//!
//! # Architecture
//!
//! The client follows a strict request/response model:
//!
//! - **Host end (Rust)**: generates code, sends one unit at a time, parses
//!   the delimited result block
//! - **Remote end (REPL)**: evaluates the unit against the live document and
//!   reports through its `rc_ok`/`rc_fail` primitives
//!
//! Key design principles:
//!
//! - One unit in flight at a time; correlation is by ordering, not IDs
//! - Remote failures become falsy results, never panics or errors
//! - A process-wide lock serializes automation against the shared browser
//! - Bounded waits everywhere: every remote wait carries a deadline
//!
//! # Quick Start
//!
//! ```no_run
//! use firefox_repl::{Actor, Result, Session, SessionConfig, session::registry};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = SessionConfig::default();
//!     registry::lock(&config.lock_path)?;
//!
//!     let mut session = Session::connect(config).await?;
//!     let mut actor = Actor::new(&mut session)?;
//!
//!     actor.goto_url("https://example.com", None).await?;
//!     if let Some(titles) = actor.get_text("//h1").await? {
//!         println!("heading: {titles:?}");
//!     }
//!
//!     session.close().await?;
//!     registry::unlock();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`actor`] | High-level browser verbs: navigate, wait, click, inflate |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`inflate`] | Declarative XPath-to-object inflation |
//! | [`protocol`] | Code generation and result envelope parsing |
//! | [`retry`] | Bounded retry loops and wait conditions |
//! | [`session`] | Session lifecycle, execution engine, REPL lock |
//! | [`transport`] | Line-protocol TCP transport (internal) |
//! | [`xpath`] | XPath expression helpers |

// ============================================================================
// Modules
// ============================================================================

/// High-level browser verbs.
///
/// [`Actor`] borrows a connected [`Session`] and exposes navigation,
/// element waits, content reads, clicks, forms, tabs, frames, and object
/// inflation.
pub mod actor;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Declarative inflation of XPath query results into structured values.
pub mod inflate;

/// Line protocol payloads: code generation and the result envelope.
pub mod protocol;

/// Bounded retry loops and reusable wait conditions.
pub mod retry;

/// Session lifecycle, execution engine, and the process-wide REPL lock.
pub mod session;

/// Line-protocol transport layer.
///
/// Internal module handling the TCP text stream to the REPL.
pub mod transport;

/// XPath expression helpers.
pub mod xpath;

// ============================================================================
// Re-exports
// ============================================================================

// Actor types
pub use actor::{Actor, ClickOutcome, FormField, TabSelector, UrlMatch};

// Error types
pub use error::{Error, Result};

// Inflation types
pub use inflate::{InflaterBuilder, InflaterSpec};

// Protocol types
pub use protocol::{Arg, CodeUnit, JsExpr, Outcome, ScriptBuilder, Status};

// Retry types
pub use retry::{Condition, FnCondition, Pause, PatternCondition, RetryPolicy, TextCondition};

// Session types
pub use session::{Session, SessionConfig};
