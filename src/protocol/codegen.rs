//! Remote code generation.
//!
//! Host-side calls are compiled into strings of JavaScript that the REPL
//! evaluates. Two kinds of material flow into a generated call:
//!
//! - **data**: host values marshalled to JS literal form ([`Arg::Data`]),
//! - **code**: JS fragments passed through unescaped ([`Arg::Raw`], built
//!   from a [`JsExpr`]).
//!
//! The distinction matters because generated calls routinely mix literal
//! arguments with inline anonymous functions.
//!
//! [`ScriptBuilder`] accumulates statements for one transaction and compiles
//! them into a [`CodeUnit`] wrapped in the try/catch boilerplate that routes
//! every result through the REPL's `rc_ok`/`rc_fail` reporters. Compiling
//! always drains the accumulator, so statements never leak across unrelated
//! calls.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde_json::Value;

// ============================================================================
// JsExpr
// ============================================================================

/// A fragment of JavaScript that must not be marshalled.
///
/// Wrapping a string in `JsExpr` flags it as code: it is emitted verbatim
/// wherever a host value would otherwise be JSON-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsExpr(String);

impl JsExpr {
    /// Wraps a string of JavaScript.
    #[inline]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Returns the wrapped code.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JsExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shorthand for [`JsExpr::new`].
#[inline]
pub fn js(code: impl Into<String>) -> JsExpr {
    JsExpr::new(code)
}

// ============================================================================
// Arg
// ============================================================================

/// One argument of a generated call: host data or inline code.
#[derive(Debug, Clone)]
pub enum Arg {
    /// Host data, marshalled to a JS literal (strings quoted and escaped,
    /// structures nested).
    Data(Value),
    /// Raw JS, passed through unescaped.
    Raw(JsExpr),
}

impl Arg {
    /// Marshals the argument to its remote textual form.
    #[must_use]
    pub fn marshal(&self) -> String {
        match self {
            // serde_json never fails on a Value tree
            Self::Data(value) => serde_json::to_string(value).unwrap_or_else(|_| "null".into()),
            Self::Raw(expr) => expr.as_str().to_string(),
        }
    }
}

impl From<JsExpr> for Arg {
    fn from(expr: JsExpr) -> Self {
        Self::Raw(expr)
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Self::Data(value)
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Self::Data(Value::String(s.to_string()))
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Self::Data(Value::String(s))
    }
}

impl From<bool> for Arg {
    fn from(b: bool) -> Self {
        Self::Data(Value::Bool(b))
    }
}

impl From<i64> for Arg {
    fn from(n: i64) -> Self {
        Self::Data(Value::from(n))
    }
}

impl From<u32> for Arg {
    fn from(n: u32) -> Self {
        Self::Data(Value::from(n))
    }
}

impl From<f64> for Arg {
    fn from(n: f64) -> Self {
        Self::Data(Value::from(n))
    }
}

impl<T: Into<Arg>> From<Option<T>> for Arg {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Self::Data(Value::Null),
        }
    }
}

// ============================================================================
// Expression Builders
// ============================================================================

/// Joins marshalled arguments with commas.
fn join_args(args: impl IntoIterator<Item = Arg>) -> String {
    args.into_iter()
        .map(|a| a.marshal())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Builds a call on the REPL object: `repl.<method>( <args> )`.
pub fn repl_call(method: &str, args: impl IntoIterator<Item = Arg>) -> JsExpr {
    JsExpr::new(format!("repl.{method}( {} )", join_args(args)))
}

/// Builds an object literal with keys in insertion order:
/// `{ "k1": v1, "k2": v2 }`.
///
/// Used to pass keyword-style parameter bags to REPL functions.
pub fn json_object<'a>(pairs: impl IntoIterator<Item = (&'a str, Arg)>) -> JsExpr {
    let body = pairs
        .into_iter()
        .map(|(key, value)| format!("\"{key}\": {}", value.marshal()))
        .collect::<Vec<_>>()
        .join(", ");
    JsExpr::new(format!("{{ {body} }}"))
}

/// Wraps statements in a single-argument anonymous function:
/// `function(rc) { <stmt>; <stmt>; }`.
pub fn anon_fn<'a>(stmts: impl IntoIterator<Item = &'a JsExpr>) -> JsExpr {
    let body = stmts
        .into_iter()
        .map(JsExpr::as_str)
        .collect::<Vec<_>>()
        .join("; ");
    JsExpr::new(format!("function(rc) {{ {body}; }}"))
}

/// Builds a success-reporting callback: the anonymous function forwards the
/// given expression to the REPL's success reporter.
pub fn on_success(expr: impl Into<Arg>) -> JsExpr {
    JsExpr::new(format!(
        "function(rc) {{ repl.rc_ok( {} ); }}",
        expr.into().marshal()
    ))
}

/// Builds a direct call of the success reporter: `repl.rc_ok( <expr> )`.
pub fn rc_ok(expr: impl Into<Arg>) -> JsExpr {
    JsExpr::new(format!("repl.rc_ok( {} )", expr.into().marshal()))
}

/// Builds a direct call of the failure reporter: `repl.rc_fail( null, <expr> )`.
pub fn rc_fail(expr: impl Into<Arg>) -> JsExpr {
    JsExpr::new(format!("repl.rc_fail( null, {} )", expr.into().marshal()))
}

// ============================================================================
// CodeUnit
// ============================================================================

/// One compiled, ready-to-send block of generated remote code.
///
/// Produced by [`ScriptBuilder::compile`] or
/// [`ScriptBuilder::compile_callback`] and consumed by the execution engine.
#[derive(Debug, Clone)]
pub struct CodeUnit {
    source: String,
}

impl CodeUnit {
    /// Returns the compiled source.
    #[inline]
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}

// ============================================================================
// ScriptBuilder
// ============================================================================

/// Accumulates remote statements for one transaction.
///
/// Statements are appended with [`push`](Self::push) or
/// [`set`](Self::set) and drained by compiling. The builder is bound to the
/// session identifier so the compiled boilerplate can pass the correct REPL
/// object into the generated IIFE.
#[derive(Debug)]
pub struct ScriptBuilder {
    repl_id: String,
    code: Vec<String>,
}

impl ScriptBuilder {
    /// Creates a builder for the given session identifier.
    #[must_use]
    pub fn new(repl_id: impl Into<String>) -> Self {
        Self {
            repl_id: repl_id.into(),
            code: Vec::new(),
        }
    }

    /// Rebinds the builder after a connection rotation.
    pub fn set_repl_id(&mut self, repl_id: impl Into<String>) {
        self.repl_id = repl_id.into();
    }

    /// Returns the session identifier this builder targets.
    #[inline]
    #[must_use]
    pub fn repl_id(&self) -> &str {
        &self.repl_id
    }

    /// Appends a statement to the accumulator.
    pub fn push(&mut self, stmt: impl Into<JsExpr>) -> &mut Self {
        self.code.push(format!("{};\n", stmt.into()));
        self
    }

    /// Appends a single-variable assignment: `<var> = <expr>`.
    ///
    /// Exactly one variable per call; `var` must be a plain identifier.
    pub fn set(&mut self, var: &str, expr: impl Into<Arg>) -> &mut Self {
        debug_assert!(
            var.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$'),
            "assignment target must be a single identifier"
        );
        self.push(JsExpr::new(format!("{var} = {}", expr.into().marshal())))
    }

    /// Appends an assignment to the result variable `rc`.
    pub fn set_rc(&mut self, expr: impl Into<Arg>) -> &mut Self {
        self.set("rc", expr)
    }

    /// Returns a view of the accumulated statements.
    #[inline]
    #[must_use]
    pub fn stmts(&self) -> &[String] {
        &self.code
    }

    /// Drains the accumulator.
    fn flush(&mut self) -> Vec<String> {
        std::mem::take(&mut self.code)
    }

    /// Compiles the accumulated statements as an immediate-result transaction.
    ///
    /// At least one accumulated statement must set `rc`; the wrapper reports
    /// it through the success reporter, or reports any thrown exception
    /// through the failure reporter. The accumulator is empty afterwards.
    pub fn compile(&mut self) -> CodeUnit {
        let body = self.flush().join(" ");
        let source = format!(
            "(function(repl) {{\n  try {{\n    var rc;\n    {body}\n    repl.rc_ok(rc);\n  }} catch(e) {{\n    repl.rc_fail(e.name, e.message ? e.message : e);\n  }};\n}})({});",
            self.repl_id
        );
        CodeUnit { source }
    }

    /// Compiles a callback-style transaction.
    ///
    /// Appends `repl.<method>( { <params> } )` and wraps the accumulated
    /// statements in the failure-only try/catch: the remote task arranges
    /// for its own completion callback to report success later, out of band.
    /// The accumulator is empty afterwards.
    pub fn compile_callback<'a>(
        &mut self,
        method: &str,
        params: impl IntoIterator<Item = (&'a str, Arg)>,
    ) -> CodeUnit {
        self.push(repl_call(method, [Arg::from(json_object(params))]));

        let body = self.flush().join(" ");
        let source = format!(
            "(function(repl) {{\n  try {{\n    {body}\n  }} catch(e) {{\n    repl.rc_fail(e.name, e.message ? e.message : e);\n  }};\n}})({});",
            self.repl_id
        );
        CodeUnit { source }
    }
}

// ============================================================================
// Tests
// ============================================================================
