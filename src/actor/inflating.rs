//! Object inflation verbs.
//!
//! These verbs ship an [`InflaterSpec`] descriptor table to the remote
//! walker, which evaluates the XPath expressions against the live document
//! and returns a spec-shaped JSON tree. The spec then post-processes that
//! tree host-side (nested specs, transform chains).

use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::inflate::InflaterSpec;
use crate::protocol::{Arg, js};
use crate::session::registry;

use super::Actor;

impl Actor<'_> {
    /// Inflates a single object rooted at the first element matching the
    /// XPath.
    ///
    /// Waits for the root element to appear, then walks the spec's fields
    /// against it. Returns `None` when the root never appeared or the
    /// transaction failed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockRequired`](crate::Error::LockRequired) without
    /// the REPL lock.
    pub async fn inflate_obj(&mut self, xpath: &str, spec: &InflaterSpec) -> Result<Option<Value>> {
        registry::check_locked()?;
        debug!(xpath, "Inflating object");

        let fields = Arg::from(spec.fields_json()).marshal();
        let unit = self.builder.compile_callback(
            "wait_for_elements",
            [
                ("xpath", Arg::from(xpath)),
                (
                    "on_succ",
                    Arg::from(js(format!(
                        "function(rc) {{ repl.rc_ok( repl.inflate_obj(rc, {fields}) ); }}"
                    ))),
                ),
            ],
        );

        let raw = self.exec_callback(&unit).await;
        Ok(raw
            .filter(Value::is_object)
            .map(|value| spec.inflate(&value)))
    }

    /// Inflates one object per element matching the XPath.
    ///
    /// Returns `None` when no element appeared or the transaction failed;
    /// an empty match set inflates to an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockRequired`](crate::Error::LockRequired) without
    /// the REPL lock.
    pub async fn inflate_all(&mut self, xpath: &str, spec: &InflaterSpec) -> Result<Option<Value>> {
        registry::check_locked()?;
        debug!(xpath, "Inflating object list");

        // The remote list walker takes the field table wrapped in a list.
        let fields = Arg::from(Value::Array(vec![spec.fields_json()])).marshal();
        let unit = self.builder.compile_callback(
            "wait_for_elements",
            [
                ("xpath", Arg::from(xpath)),
                (
                    "on_succ",
                    Arg::from(js(format!(
                        "function(rc) {{ repl.rc_ok( repl.inflate_all(rc, {fields}) ); }}"
                    ))),
                ),
            ],
        );

        let raw = self.exec_callback(&unit).await;
        Ok(raw
            .filter(Value::is_array)
            .map(|value| spec.inflate(&value)))
    }
}

// ============================================================================
// Tests
// ============================================================================
