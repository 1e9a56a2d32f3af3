//! Result envelope parsing.
//!
//! Every remote transaction ends with the REPL printing a delimited JSON
//! block produced by one of its two reporting primitives:
//!
//! ```text
//! ==BEGIN-JSON==
//! {"status": "OK", "result": <value>}
//! ==END-JSON==
//! ```
//!
//! or, on failure,
//!
//! ```text
//! ==BEGIN-JSON==
//! {"status": "ERROR", "exception": "TypeError", "result": "message"}
//! ==END-JSON==
//! ```
//!
//! [`Outcome::parse`] extracts and decodes that block. Parsing never fails
//! past this boundary: malformed input becomes an ERROR outcome carrying a
//! decoding-failure message.

// ============================================================================
// Imports
// ============================================================================

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

// ============================================================================
// Constants
// ============================================================================

/// Matches the delimited JSON block in raw REPL output.
static JSON_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"==BEGIN-JSON==\s*(?s)(.+?)\n+==END-JSON==").expect("valid JSON block pattern")
});

/// Message carried by the dedicated timeout outcome.
const TIMEOUT_EXPIRED: &str = "timeout expired";

// ============================================================================
// Status
// ============================================================================

/// Transaction status reported by the remote side.
///
/// The wire value is case-normalized; anything other than `OK` is
/// treated as [`Status::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The remote success reporter was called; the payload is trustworthy.
    Ok,
    /// The remote failure reporter was called, or decoding failed.
    Error,
}

// ============================================================================
// Outcome
// ============================================================================

/// The normalized result of one remote transaction.
///
/// Immutable after construction. `status == Error` implies the payload is
/// not a retypeable success value; `status == Ok` implies the payload holds
/// the only trustworthy result.
#[derive(Debug, Clone)]
pub struct Outcome {
    status: Status,
    message: Option<String>,
    payload: Option<Value>,
}

/// Wire shape of the JSON block.
#[derive(Deserialize)]
struct RawOutcome {
    status: String,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    exception: Option<String>,
}

impl Outcome {
    /// Creates an ERROR outcome with the given message.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: Some(message.into()),
            payload: None,
        }
    }

    /// Creates the dedicated deadline-expiry outcome.
    #[must_use]
    pub fn timed_out() -> Self {
        Self::error(TIMEOUT_EXPIRED)
    }

    /// Parses raw REPL output into an outcome.
    ///
    /// Extracts the `==BEGIN-JSON== ... ==END-JSON==` block and decodes it.
    /// A missing block or a decode failure yields an ERROR outcome with a
    /// decoding-failure message; this function never panics or errors.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let Some(captures) = JSON_BLOCK.captures(raw) else {
            return Self::error("no JSON block found in REPL output");
        };

        let json = &captures[1];
        match serde_json::from_str::<RawOutcome>(json) {
            Ok(decoded) => Self::from_raw(decoded),
            Err(e) => Self::error(format!("failed to decode JSON block: {e}")),
        }
    }

    fn from_raw(raw: RawOutcome) -> Self {
        let status = if raw.status.eq_ignore_ascii_case("OK") {
            Status::Ok
        } else {
            Status::Error
        };

        Self {
            status,
            message: raw.exception,
            payload: raw.result,
        }
    }

    /// Returns the transaction status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    /// Returns `true` if the remote side reported success.
    #[inline]
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Returns `true` if this is the deadline-expiry outcome.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.status == Status::Error && self.message.as_deref() == Some(TIMEOUT_EXPIRED)
    }

    /// Returns the exception name or failure message, if any.
    #[inline]
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the payload regardless of status.
    ///
    /// For ERROR outcomes the payload holds the remote failure detail, not
    /// a success value.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Consumes the outcome, returning the payload only on success.
    #[must_use]
    pub fn into_success(self) -> Option<Value> {
        match self.status {
            Status::Ok => Some(self.payload.unwrap_or(Value::Null)),
            Status::Error => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_parse_ok() {
        let raw = "junk before\n==BEGIN-JSON==\n{\"status\": \"OK\", \"result\": [1, 2]}\n==END-JSON==\nrepl> ";
        let outcome = Outcome::parse(raw);

        assert!(outcome.is_ok());
        assert_eq!(outcome.into_success(), Some(json!([1, 2])));
    }

    #[test]
    fn test_parse_error_with_exception() {
        let raw = "==BEGIN-JSON==\n{\"status\": \"ERROR\", \"exception\": \"TypeError\", \"result\": \"x is null\"}\n==END-JSON==\n";
        let outcome = Outcome::parse(raw);

        assert!(!outcome.is_ok());
        assert_eq!(outcome.message(), Some("TypeError"));
        assert_eq!(outcome.payload(), Some(&json!("x is null")));
        assert_eq!(outcome.into_success(), None);
    }

    #[test]
    fn test_status_case_normalized() {
        let raw = "==BEGIN-JSON==\n{\"status\": \"ok\", \"result\": true}\n==END-JSON==\n";
        assert!(Outcome::parse(raw).is_ok());

        // Anything other than OK is not-OK.
        let raw = "==BEGIN-JSON==\n{\"status\": \"PENDING\", \"result\": true}\n==END-JSON==\n";
        assert!(!Outcome::parse(raw).is_ok());
    }

    #[test]
    fn test_missing_markers_is_error_not_panic() {
        let outcome = Outcome::parse("repl> undefined\nrepl> ");
        assert!(!outcome.is_ok());
        assert!(outcome.message().expect("message").contains("no JSON block"));
    }

    #[test]
    fn test_malformed_json_is_error() {
        let raw = "==BEGIN-JSON==\n{not json at all\n==END-JSON==\n";
        let outcome = Outcome::parse(raw);
        assert!(!outcome.is_ok());
        assert!(outcome.message().expect("message").contains("decode"));
    }

    #[test]
    fn test_ok_without_result_is_null_payload() {
        let raw = "==BEGIN-JSON==\n{\"status\": \"OK\"}\n==END-JSON==\n";
        let outcome = Outcome::parse(raw);
        assert!(outcome.is_ok());
        assert_eq!(outcome.into_success(), Some(Value::Null));
    }

    #[test]
    fn test_timed_out_outcome() {
        let outcome = Outcome::timed_out();
        assert!(!outcome.is_ok());
        assert!(outcome.is_timeout());
        assert!(!Outcome::error("other failure").is_timeout());
    }
}
