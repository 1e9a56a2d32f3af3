//! Line-protocol transport layer.
//!
//! Internal module handling the TCP text stream to the REPL: prompt-driven
//! reads, single-line command writes, and the session bootstrap handshake.

// ============================================================================
// Submodules
// ============================================================================

mod connection;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::Connection;
