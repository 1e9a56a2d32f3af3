//! Line protocol payloads: result envelope and code generation.
//!
//! The REPL speaks a plain text protocol; the structured part lives in the
//! payloads. This module covers both directions:
//!
//! | Module | Description |
//! |--------|-------------|
//! | `codegen` | Host calls compiled to remote JavaScript |
//! | `outcome` | Delimited JSON result block parsed to [`Outcome`] |
//!
//! One compiled [`CodeUnit`] produces exactly one delimited response block;
//! correlation is by strict request/response serialization, not request IDs.

// ============================================================================
// Submodules
// ============================================================================

/// Remote code generation.
pub mod codegen;

/// Result envelope parsing.
pub mod outcome;

// ============================================================================
// Re-exports
// ============================================================================

pub use codegen::{
    Arg, CodeUnit, JsExpr, ScriptBuilder, anon_fn, js, json_object, on_success, rc_fail, rc_ok,
    repl_call,
};
pub use outcome::{Outcome, Status};
