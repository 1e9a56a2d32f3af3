//! Tab manipulation verbs.
//!
//! The REPL is anchored to the browser window and tab it was opened
//! against, so any verb that changes which tab is selected also rotates the
//! connection afterwards; the stale session would otherwise keep driving
//! the old tab.

use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::protocol::{Arg, js, repl_call};
use crate::session::registry;

use super::Actor;

/// URL of the fresh tab left behind by a tab reset.
const ABOUT_BLANK: &str = "about:blank";

// ============================================================================
// TabSelector
// ============================================================================

/// Names a tab for the tab verbs.
#[derive(Debug, Clone)]
pub enum TabSelector {
    /// The tab at this browser index.
    Index(i64),
    /// The first tab whose location contains this pattern.
    UrlPattern(String),
}

impl TabSelector {
    /// Marshals to the `(index, pattern)` argument pair of the remote tab
    /// finder.
    fn find_args(&self) -> [Arg; 2] {
        match self {
            Self::Index(index) => [Arg::from(*index), Arg::from(Value::Null)],
            Self::UrlPattern(pattern) => [Arg::from(Value::Null), Arg::from(pattern.clone())],
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Index(index) => format!("index '{index}'"),
            Self::UrlPattern(pattern) => format!("URL '{pattern}'"),
        }
    }
}

impl From<i64> for TabSelector {
    fn from(index: i64) -> Self {
        Self::Index(index)
    }
}

impl From<&str> for TabSelector {
    fn from(pattern: &str) -> Self {
        Self::UrlPattern(pattern.to_string())
    }
}

// ============================================================================
// Tab Verbs
// ============================================================================

impl Actor<'_> {
    /// Returns information about every open tab.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockRequired`](crate::Error::LockRequired) without the REPL lock.
    pub async fn all_tabs_info(&mut self) -> Result<Option<Value>> {
        registry::check_locked()?;
        self.builder.set_rc(repl_call("get_all_tabs_info", []));
        let unit = self.builder.compile();
        Ok(self.exec_sync(&unit).await)
    }

    /// Returns information about the currently selected tab.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockRequired`](crate::Error::LockRequired) without the REPL lock.
    pub async fn selected_tab(&mut self) -> Result<Option<Value>> {
        registry::check_locked()?;

        self.builder.set_rc(repl_call("selected_tab", []));
        self.push_throw_no_tab("the selected tab");
        self.builder
            .set_rc(repl_call("tab_info", [Arg::from(js("rc"))]));
        let unit = self.builder.compile();

        Ok(self.exec_sync(&unit).await)
    }

    /// Returns information about the first tab matching the selector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockRequired`](crate::Error::LockRequired) without the REPL lock.
    pub async fn tab_info(&mut self, selector: &TabSelector) -> Result<Option<Value>> {
        registry::check_locked()?;

        self.builder
            .set_rc(repl_call("find_first_tab", selector.find_args()));
        self.push_throw_no_tab(&selector.describe());
        self.builder
            .set_rc(repl_call("tab_info", [Arg::from(js("rc"))]));
        let unit = self.builder.compile();

        Ok(self.exec_sync(&unit).await)
    }

    /// Activates the first tab matching the selector.
    ///
    /// Rotates the connection on success so subsequent verbs drive the
    /// newly selected tab. Returns `false` when no tab matched or
    /// activation failed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockRequired`](crate::Error::LockRequired) without the REPL lock, or a
    /// connection error from the rotation.
    pub async fn activate_tab(&mut self, selector: &TabSelector) -> Result<bool> {
        registry::check_locked()?;

        self.builder
            .set_rc(repl_call("find_first_tab", selector.find_args()));
        self.push_throw_no_tab(&selector.describe());
        self.builder
            .set_rc(repl_call("tab_activate", [Arg::from(js("rc"))]));
        let unit = self.builder.compile();

        let activated = self.exec_sync(&unit).await == Some(Value::Bool(true));
        if activated {
            debug!("Tab activated; rotating connection");
            self.rotate().await?;
        }
        Ok(activated)
    }

    /// Closes the first tab matching the selector, or the selected tab when
    /// no selector is given.
    ///
    /// Rotates the connection on success. Returns `false` when no tab
    /// matched or the close failed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockRequired`](crate::Error::LockRequired) without the REPL lock, or a
    /// connection error from the rotation.
    pub async fn close_tab(&mut self, selector: Option<&TabSelector>) -> Result<bool> {
        registry::check_locked()?;

        let described = match selector {
            None => {
                self.builder.set_rc(repl_call("selected_tab", []));
                "the selected tab".to_string()
            }
            Some(selector) => {
                self.builder
                    .set_rc(repl_call("find_first_tab", selector.find_args()));
                selector.describe()
            }
        };
        self.push_throw_no_tab(&described);
        self.builder
            .set_rc(repl_call("tab_close", [Arg::from(js("rc"))]));
        let unit = self.builder.compile();

        let closed = self.exec_sync(&unit).await == Some(Value::Bool(true));
        if closed {
            debug!("Tab closed; rotating connection");
            self.rotate().await?;
        }
        Ok(closed)
    }

    /// Opens a new tab and rotates the connection into it.
    ///
    /// Returns the tab information reported by the remote side, if any.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockRequired`](crate::Error::LockRequired) without the REPL lock, or a
    /// connection error from the rotation.
    pub async fn add_tab(&mut self) -> Result<Option<Value>> {
        registry::check_locked()?;

        let unit = self.builder.compile_callback("tab_new", []);
        let tabs = self.exec_callback(&unit).await;
        self.rotate().await?;
        Ok(tabs)
    }

    /// Closes every tab and opens one fresh blank tab.
    ///
    /// Returns `true` when the reset succeeded, in which case the
    /// connection has been rotated into the fresh tab.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockRequired`](crate::Error::LockRequired) without the REPL lock, or a
    /// connection error from the rotation.
    pub async fn tabs_reset(&mut self) -> Result<bool> {
        registry::check_locked()?;

        let unit = self.builder.compile_callback("tabs_reset", []);
        let rc = self.exec_callback(&unit).await;
        let reset = rc.as_ref().and_then(Value::as_str) == Some(ABOUT_BLANK);
        if reset {
            debug!("Tabs reset; rotating connection");
            self.rotate().await?;
        }
        Ok(reset)
    }

    /// Emits the guard that turns a null tab lookup into a remote
    /// exception, so the failure carries which selector missed.
    fn push_throw_no_tab(&mut self, described: &str) {
        let message = Arg::from(format!("find_first_tab() with {described} failed")).marshal();
        self.builder
            .push(js(format!("if (!rc) {{ throw new Error({message}); }}")));
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::protocol::ScriptBuilder;
    use crate::session::{Session, SessionConfig};

    fn offline_actor(session: &mut Session) -> Actor<'_> {
        Actor {
            session,
            builder: ScriptBuilder::new("repl"),
            frame_url: None,
            exec_timeout: std::time::Duration::from_secs(1),
        }
    }

    #[test]
    fn test_selector_find_args() {
        let [a, b] = TabSelector::from(3).find_args();
        assert_eq!(a.marshal(), "3");
        assert_eq!(b.marshal(), "null");

        let [a, b] = TabSelector::from("example.com").find_args();
        assert_eq!(a.marshal(), "null");
        assert_eq!(b.marshal(), "\"example.com\"");
    }

    #[test]
    fn test_throw_no_tab_guard_escapes_message() {
        let mut session = Session::offline_for_tests(SessionConfig::default());
        let mut actor = offline_actor(&mut session);

        actor.push_throw_no_tab(&TabSelector::from("a\"b").describe());
        let stmt = &actor.builder.stmts()[0];
        assert!(stmt.starts_with("if (!rc) { throw new Error("));
        assert!(stmt.contains("URL 'a\\\"b'"));
    }
}
