//! Form field verbs.
//!
//! Reads and writes form fields in bulk: a list of field descriptions goes
//! out, a parallel list of results comes back. The remote side applies a
//! per-item function over the list, so one round trip covers the whole
//! form.

use serde_json::{Value, json};
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{Arg, JsExpr, js, repl_call};
use crate::session::registry;

use super::Actor;

// ============================================================================
// FormField
// ============================================================================

/// One form field to write: where it is and what to put there.
#[derive(Debug, Clone)]
pub struct FormField {
    /// XPath locating the field.
    pub xpath: String,
    /// Value to set.
    pub value: String,
}

impl FormField {
    /// Creates a field description.
    #[must_use]
    pub fn new(xpath: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            xpath: xpath.into(),
            value: value.into(),
        }
    }
}

// ============================================================================
// Form Verbs
// ============================================================================

impl Actor<'_> {
    /// Sets form fields on the current page.
    ///
    /// Returns a parallel list with the value actually set for each field,
    /// or `null` entries for fields that were not found or could not be
    /// set. A `None` result means the whole transaction failed.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] when `fields` is empty or a field has an
    ///   empty XPath or value
    /// - [`Error::LockRequired`] without the REPL lock
    pub async fn set_form_fields(&mut self, fields: &[FormField]) -> Result<Option<Value>> {
        if fields.is_empty() {
            return Err(Error::invalid_argument(
                "expected fields to be a non-empty list",
            ));
        }
        for (index, field) in fields.iter().enumerate() {
            if field.xpath.is_empty() {
                return Err(Error::invalid_argument(format!(
                    "field at index {index}: expected xpath to be a non-empty string"
                )));
            }
            if field.value.is_empty() {
                return Err(Error::invalid_argument(format!(
                    "field at index {index}: expected value to be a non-empty string"
                )));
            }
        }

        registry::check_locked()?;
        debug!(count = fields.len(), "Setting form fields");

        let items = Value::Array(
            fields
                .iter()
                .map(|f| json!([f.xpath, f.value]))
                .collect(),
        );
        let unit = self.compile_apply(
            items,
            js("function(item) { return repl.set_form_value(item[0], item[1]); }"),
        );
        Ok(self.exec_sync(&unit).await)
    }

    /// Reads form field values from the current page.
    ///
    /// Returns a list parallel to `xpaths`, with `null` entries for fields
    /// that were not found.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] when `xpaths` is empty or contains an
    ///   empty expression
    /// - [`Error::LockRequired`] without the REPL lock
    pub async fn get_form_fields<S: AsRef<str>>(&mut self, xpaths: &[S]) -> Result<Option<Value>> {
        if xpaths.is_empty() {
            return Err(Error::invalid_argument(
                "expected fields to be a non-empty list",
            ));
        }
        for (index, xpath) in xpaths.iter().enumerate() {
            if xpath.as_ref().is_empty() {
                return Err(Error::invalid_argument(format!(
                    "field at index {index}: expected xpath to be a non-empty string"
                )));
            }
        }

        registry::check_locked()?;
        debug!(count = xpaths.len(), "Reading form fields");

        let items = Value::Array(
            xpaths
                .iter()
                .map(|x| Value::String(x.as_ref().to_string()))
                .collect(),
        );
        let unit = self.compile_apply(
            items,
            js("function(xpath) { return repl.get_form_value(xpath); }"),
        );
        Ok(self.exec_sync(&unit).await)
    }

    /// Compiles a remote map: `repl.apply( <items>, <func> )`.
    fn compile_apply(&mut self, items: Value, func: JsExpr) -> crate::protocol::CodeUnit {
        self.builder
            .set_rc(repl_call("apply", [Arg::from(items), Arg::from(func)]));
        self.builder.compile()
    }
}

// ============================================================================
// Tests
// ============================================================================
