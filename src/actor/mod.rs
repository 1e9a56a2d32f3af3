//! High-level browser verbs.
//!
//! An [`Actor`] borrows a connected [`Session`] and exposes the operations
//! automation scripts actually use: navigation, bounded element waits,
//! content reads, clicking, form and tab manipulation, and declarative
//! object inflation. Each verb follows the same shape:
//!
//! 1. assert the process-wide REPL lock is held,
//! 2. generate and compile the remote code for the verb,
//! 3. execute the unit and map its [`Outcome`](crate::protocol::Outcome)
//!    into the verb's result type.
//!
//! Remote failures surface as `None`/`false` results; errors propagate only
//! for malformed input, missing lock, missing frame context, or opt-in
//! raise behavior.
//!
//! Verbs are frame-aware: after [`Actor::switch_to_frame`] the content
//! verbs operate on the named frame's document instead of the top document.

// ============================================================================
// Submodules
// ============================================================================

mod forms;
mod frames;
mod inflating;
mod tabs;

pub use forms::FormField;
pub use tabs::TabSelector;

// ============================================================================
// Imports
// ============================================================================

use std::cell::RefCell;
use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{Arg, CodeUnit, ScriptBuilder, js, json_object, on_success, repl_call};
use crate::retry::{FnCondition, RetryPolicy, retry_condition};
use crate::session::{DEFAULT_EXEC_TIMEOUT, Session, registry};

// ============================================================================
// Constants
// ============================================================================

/// Marker returned by the element-wait success callback.
const FOUND: &str = "FOUND";

/// Marker returned by the click success callback.
const CLICKED: &str = "CLICKED";

/// Value of `document.readyState` once a page has finished loading.
const READY_STATE_COMPLETE: &str = "complete";

/// Settling pause after a successful click before checking the page load.
const POST_CLICK_PAUSE: Duration = Duration::from_millis(500);

// ============================================================================
// UrlMatch
// ============================================================================

/// Landing-page condition for URL waits.
///
/// Navigation can redirect several times before settling; a `UrlMatch`
/// names the URLs that count as arrival.
#[derive(Debug, Clone)]
pub enum UrlMatch {
    /// The URL contains this literal text.
    Literal(String),
    /// The URL matches this pattern.
    Pattern(Regex),
}

impl UrlMatch {
    fn matches(&self, url: &str) -> bool {
        match self {
            Self::Literal(text) => url.contains(text.as_str()),
            Self::Pattern(pattern) => pattern.is_match(url),
        }
    }
}

impl From<&str> for UrlMatch {
    fn from(text: &str) -> Self {
        Self::Literal(text.to_string())
    }
}

impl From<Regex> for UrlMatch {
    fn from(pattern: Regex) -> Self {
        Self::Pattern(pattern)
    }
}

// ============================================================================
// ClickOutcome
// ============================================================================

/// Result of [`Actor::click`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// The element was never found or the click itself failed.
    Failed,
    /// The click landed but the page never finished loading.
    Clicked,
    /// The click landed and the page finished loading.
    Loaded,
}

impl ClickOutcome {
    /// Returns `true` for the fully successful outcome.
    #[inline]
    #[must_use]
    pub fn is_loaded(self) -> bool {
        self == Self::Loaded
    }
}

// ============================================================================
// Actor
// ============================================================================

/// Browser verbs over a borrowed session.
#[derive(Debug)]
pub struct Actor<'s> {
    session: &'s mut Session,
    builder: ScriptBuilder,
    frame_url: Option<String>,
    exec_timeout: Duration,
}

impl<'s> Actor<'s> {
    /// Creates an actor over a connected session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] when the session is not connected.
    pub fn new(session: &'s mut Session) -> Result<Self> {
        let repl_id = session.repl_id().ok_or(Error::ConnectionClosed)?.to_string();
        Ok(Self {
            session,
            builder: ScriptBuilder::new(repl_id),
            frame_url: None,
            exec_timeout: DEFAULT_EXEC_TIMEOUT,
        })
    }

    /// Sets the per-unit execution deadline.
    #[must_use]
    pub fn with_exec_timeout(mut self, exec_timeout: Duration) -> Self {
        self.exec_timeout = exec_timeout;
        self
    }

    /// Returns the frame URL content verbs currently operate on, if any.
    #[inline]
    #[must_use]
    pub fn frame_url(&self) -> Option<&str> {
        self.frame_url.as_deref()
    }

    /// Rotates the underlying connection and rebinds the code generator to
    /// the new session identifier.
    ///
    /// # Errors
    ///
    /// Same as [`Session::rotate`].
    pub async fn rotate(&mut self) -> Result<()> {
        let repl_id = self.session.rotate().await?.to_string();
        self.builder.set_repl_id(repl_id);
        Ok(())
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Waits for the document's `readyState` to reach `complete`.
    ///
    /// Returns `false` when the page never finished loading within the
    /// execution deadline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockRequired`] without the REPL lock.
    pub async fn wait_page_load(&mut self) -> Result<bool> {
        registry::check_locked()?;
        let unit = self.compile_wait_page_load()?;
        let rc = self.exec_callback(&unit).await;
        Ok(value_contains(rc.as_ref(), READY_STATE_COMPLETE))
    }

    /// Navigates to `url` and waits for the page to finish loading.
    ///
    /// An optional `pause` adds a fixed settling delay after the load
    /// completes. Returns `false` when navigation or the load wait failed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockRequired`] without the REPL lock.
    pub async fn goto_url(&mut self, url: &str, pause: Option<Duration>) -> Result<bool> {
        registry::check_locked()?;
        debug!(url, "Navigating");

        let unit = self
            .builder
            .compile_callback("goto_url", [("url", Arg::from(url))]);

        let rc = self.exec_callback(&unit).await;
        if !matches!(rc, Some(Value::String(_))) {
            return Ok(false);
        }

        if !self.wait_page_load().await? {
            return Ok(false);
        }
        if let Some(pause) = pause {
            sleep(pause).await;
        }
        Ok(true)
    }

    /// Returns the URL of the current page.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockRequired`] without the REPL lock.
    pub async fn get_url(&mut self) -> Result<Option<String>> {
        registry::check_locked()?;
        let unit = self.compile_get_url()?;
        Ok(self.exec_sync(&unit).await.and_then(value_string))
    }

    /// Repeatedly reads the page URL until it satisfies `arrival`.
    ///
    /// Used after navigation that may redirect: the reads run under
    /// `policy` through the retry engine, with the whole wait (in-flight
    /// reads included) bounded by the policy deadline. Settles on the first
    /// matching URL, returning it; a failed or unmatched read counts as a
    /// missed attempt. Returns `None` when the wait gave up.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockRequired`] without the REPL lock.
    pub async fn get_url_until(
        &mut self,
        arrival: &UrlMatch,
        policy: &RetryPolicy,
    ) -> Result<Option<String>> {
        registry::check_locked()?;

        let hit = RefCell::new(None);
        let mut arrived = FnCondition::new(|url: &str| {
            if arrival.matches(url) {
                *hit.borrow_mut() = Some(url.to_string());
                true
            } else {
                false
            }
        });

        let this = RefCell::new(self);
        retry_condition(policy, &mut arrived, || {
            let this = &this;
            async move {
                match this.borrow_mut().get_url().await {
                    Ok(url) => url,
                    Err(e) => {
                        warn!(error = %e, "URL read failed during wait");
                        None
                    }
                }
            }
        })
        .await;

        Ok(hit.into_inner())
    }

    /// Navigates to `url` unless the browser is already there.
    ///
    /// Compares normalized URLs against the current page; when they differ,
    /// navigates and waits for the URL to contain `url`. Returns the settled
    /// page URL, or `None` when navigation failed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockRequired`] without the REPL lock.
    pub async fn nav_page(&mut self, url: &str, policy: &RetryPolicy) -> Result<Option<String>> {
        registry::check_locked()?;

        if let Some(current) = self.get_url().await?
            && same_page(&current, url)
        {
            debug!(url, "Already on the requested page");
            return Ok(Some(current));
        }

        self.goto_url(url, None).await?;
        self.get_url_until(&UrlMatch::from(url), policy).await
    }

    // ========================================================================
    // Element Waits
    // ========================================================================

    /// Waits for at least one element matching any of the XPath expressions.
    ///
    /// Returns `false` when no element appeared within the execution
    /// deadline.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] when `xpaths` is empty
    /// - [`Error::LockRequired`] without the REPL lock
    pub async fn wait_for<S: AsRef<str>>(&mut self, xpaths: &[S]) -> Result<bool> {
        if xpaths.is_empty() {
            return Err(Error::invalid_argument("at least 1 xpath must be provided"));
        }
        registry::check_locked()?;

        let xpath_list = Value::Array(
            xpaths
                .iter()
                .map(|x| Value::String(x.as_ref().to_string()))
                .collect(),
        );

        let unit = self.builder.compile_callback(
            "wait_for_elements",
            [
                ("xpath", Arg::from(xpath_list)),
                (
                    "on_succ",
                    Arg::from(js(format!(
                        "function(rc) {{ repl.rc_ok( \"{FOUND}\" ); }}"
                    ))),
                ),
            ],
        );

        let rc = self.exec_callback(&unit).await;
        Ok(value_contains(rc.as_ref(), FOUND))
    }

    /// Like [`Actor::wait_for`], but raises when the elements never appear.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ElementMissing`] with `message` (or a default naming
    /// the first XPath) when the wait fails; otherwise as
    /// [`Actor::wait_for`].
    pub async fn require<S: AsRef<str>>(
        &mut self,
        xpaths: &[S],
        message: Option<&str>,
    ) -> Result<()> {
        if self.wait_for(xpaths).await? {
            return Ok(());
        }
        let message = message.map_or_else(
            || format!("Never found '{}'", xpaths[0].as_ref()),
            str::to_string,
        );
        Err(Error::element_missing(message))
    }

    // ========================================================================
    // Content Reads
    // ========================================================================

    /// Returns the HTML of the elements matching the XPath.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockRequired`] without the REPL lock.
    pub async fn get_html(&mut self, xpath: &str) -> Result<Option<Vec<String>>> {
        registry::check_locked()?;
        let unit = self.compile_element_read(xpath, "repl.get_html(rc)")?;
        Ok(self.exec_callback(&unit).await.and_then(value_string_list))
    }

    /// Returns the text content of the elements matching the XPath.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockRequired`] without the REPL lock.
    pub async fn get_text(&mut self, xpath: &str) -> Result<Option<Vec<String>>> {
        registry::check_locked()?;
        let unit = self.compile_element_read(xpath, "repl.get_text(rc)")?;
        Ok(self.exec_callback(&unit).await.and_then(value_string_list))
    }

    /// Returns the attributes of the element matching the XPath.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockRequired`] without the REPL lock.
    pub async fn get_attrs(&mut self, xpath: &str) -> Result<Option<Value>> {
        registry::check_locked()?;
        let unit = self.compile_element_read(xpath, "repl.get_attrs(rc)")?;
        Ok(self.exec_callback(&unit).await)
    }

    /// Returns the document referrer, trimmed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockRequired`] without the REPL lock.
    pub async fn get_referrer(&mut self) -> Result<Option<String>> {
        registry::check_locked()?;
        let unit = self.compile_doc_read("get_referrer")?;
        Ok(self
            .exec_sync(&unit)
            .await
            .and_then(value_string)
            .map(|s| s.trim().to_string()))
    }

    /// Returns the current document's cookies.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockRequired`] without the REPL lock.
    pub async fn get_doc_cookies(&mut self) -> Result<Option<Value>> {
        registry::check_locked()?;
        let unit = self.compile_doc_read("get_doc_cookies")?;
        Ok(self.exec_sync(&unit).await)
    }

    /// Returns every browser cookie whose host matches `host`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] when `host` is empty
    /// - [`Error::LockRequired`] without the REPL lock
    pub async fn get_all_cookies(&mut self, host: &str) -> Result<Option<Value>> {
        if host.is_empty() {
            return Err(Error::invalid_argument("host is a required parameter"));
        }
        registry::check_locked()?;

        self.builder.set_rc(repl_call(
            "get_all_cookies",
            [Arg::from(json_object([("host", Arg::from(host))]))],
        ));
        let unit = self.builder.compile();
        Ok(self.exec_sync(&unit).await)
    }

    // ========================================================================
    // Clicking
    // ========================================================================

    /// Clicks the first element matching the XPath and waits for the
    /// resulting page load.
    ///
    /// A failed click skips the load wait entirely. After a successful click
    /// the browser gets a short settling pause before the load check.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockRequired`] without the REPL lock, or
    /// [`Error::NoFrameUrl`] when a frame verb is compiled without a frame.
    pub async fn click(&mut self, xpath: &str) -> Result<ClickOutcome> {
        registry::check_locked()?;

        let unit = self.compile_click(xpath)?;
        let rc = self.exec_callback(&unit).await;
        if !value_contains(rc.as_ref(), CLICKED) {
            warn!(xpath, "Click failed");
            return Ok(ClickOutcome::Failed);
        }

        // Give the browser a moment to start the navigation.
        sleep(POST_CLICK_PAUSE).await;

        if self.wait_page_load().await? {
            Ok(ClickOutcome::Loaded)
        } else {
            Ok(ClickOutcome::Clicked)
        }
    }

    /// Clicks like [`Actor::click`], then waits for the URL to settle.
    ///
    /// After a fully loaded click the page URL is read under `policy` until
    /// it satisfies `arrival`. The click outcome is reported unchanged; the
    /// second element carries the settled URL when the wait matched, so the
    /// caller decides what an unmatched arrival means.
    ///
    /// # Errors
    ///
    /// Same as [`Actor::click`].
    pub async fn click_nav(
        &mut self,
        xpath: &str,
        arrival: &UrlMatch,
        policy: &RetryPolicy,
    ) -> Result<(ClickOutcome, Option<String>)> {
        let outcome = self.click(xpath).await?;
        if !outcome.is_loaded() {
            return Ok((outcome, None));
        }
        let url = self.get_url_until(arrival, policy).await?;
        Ok((outcome, url))
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Drains and returns the REPL's accumulated remote log.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockRequired`] without the REPL lock.
    pub async fn repl_log(&mut self) -> Result<Option<Value>> {
        registry::check_locked()?;
        let unit = self.builder.compile_callback("GetLog", []);
        Ok(self.exec_callback(&unit).await)
    }

    // ========================================================================
    // Internal
    // ========================================================================

    async fn exec_sync(&mut self, unit: &CodeUnit) -> Option<Value> {
        let outcome = self.session.execute_sync(unit, self.exec_timeout).await;
        if !outcome.is_ok() {
            warn!(message = outcome.message().unwrap_or(""), "Unit failed");
        }
        outcome.into_success()
    }

    async fn exec_callback(&mut self, unit: &CodeUnit) -> Option<Value> {
        let outcome = self.session.execute_async(unit, self.exec_timeout).await;
        if !outcome.is_ok() {
            warn!(message = outcome.message().unwrap_or(""), "Unit failed");
        }
        outcome.into_success()
    }

    /// Compiles an element read: wait for the XPath, then report the reader
    /// expression over the matched elements.
    fn compile_element_read(&mut self, xpath: &str, reader: &str) -> Result<CodeUnit> {
        match self.frame_url.clone() {
            None => Ok(self.builder.compile_callback(
                "wait_for_elements",
                [
                    ("xpath", Arg::from(xpath)),
                    ("on_succ", Arg::from(on_success(js(reader)))),
                ],
            )),
            Some(frame_url) => Ok(self.builder.compile_callback(
                "frame_wait_for_elements",
                [
                    ("frame_url", Arg::from(frame_url)),
                    ("xpath", Arg::from(xpath)),
                    ("on_succ", Arg::from(on_success(js(reader)))),
                ],
            )),
        }
    }

    fn compile_click(&mut self, xpath: &str) -> Result<CodeUnit> {
        match self.frame_url.clone() {
            None => Ok(self.builder.compile_callback(
                "wait_for_first_element",
                [
                    ("xpath", Arg::from(xpath)),
                    ("on_succ", Arg::from(on_success(js("repl.do_click(rc)")))),
                ],
            )),
            Some(frame_url) => Ok(self.builder.compile_callback(
                "frame_wait_for_first_element",
                [
                    ("frame_url", Arg::from(frame_url)),
                    ("xpath", Arg::from(xpath)),
                    ("on_succ", Arg::from(on_success(js("repl.do_click(rc)")))),
                ],
            )),
        }
    }

    fn compile_get_url(&mut self) -> Result<CodeUnit> {
        match self.frame_url.clone() {
            None => {
                // null document means the current top document
                self.builder
                    .set_rc(repl_call("get_url", [Arg::from(Value::Null)]));
                Ok(self.builder.compile())
            }
            Some(_) => {
                self.code_frame_doc()?;
                self.builder
                    .set_rc(repl_call("get_url", [Arg::from(js("frame_doc"))]));
                Ok(self.builder.compile())
            }
        }
    }

    /// Compiles a single-call document read (`get_referrer`,
    /// `get_doc_cookies`), against the top or current frame document.
    fn compile_doc_read(&mut self, method: &str) -> Result<CodeUnit> {
        match self.frame_url.clone() {
            None => {
                self.builder
                    .set_rc(repl_call(method, [Arg::from(Value::Null)]));
                Ok(self.builder.compile())
            }
            Some(_) => {
                self.code_frame_doc()?;
                self.builder
                    .set_rc(repl_call(method, [Arg::from(js("frame_doc"))]));
                Ok(self.builder.compile())
            }
        }
    }

    fn compile_wait_page_load(&mut self) -> Result<CodeUnit> {
        match self.frame_url.clone() {
            None => Ok(self.builder.compile_callback(
                "retry_until",
                [(
                    "cond",
                    Arg::from(js(
                        "function() { var rc = repl.get_document().readyState; \
                         return (rc === 'complete') ? rc : null; }",
                    )),
                )],
            )),
            Some(_) => {
                self.code_frame_doc()?;
                Ok(self.builder.compile_callback(
                    "retry_until",
                    [(
                        "cond",
                        Arg::from(js(
                            "function() { var rc = frame_doc.readyState; \
                             return (rc === 'complete') ? rc : null; }",
                        )),
                    )],
                ))
            }
        }
    }
}

// ============================================================================
// Payload Helpers
// ============================================================================

/// Extracts a string payload.
fn value_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        _ => None,
    }
}

/// Extracts a list-of-strings payload.
fn value_string_list(value: Value) -> Option<Vec<String>> {
    serde_json::from_value(value).ok()
}

/// Tests whether a string payload contains a marker.
fn value_contains(value: Option<&Value>, marker: &str) -> bool {
    value
        .and_then(Value::as_str)
        .is_some_and(|s| s.contains(marker))
}

/// Tests whether two URLs name the same page.
///
/// Parsed comparison absorbs scheme/host casing and trailing-slash
/// differences; unparseable input falls back to a case-insensitive string
/// comparison.
fn same_page(current: &str, target: &str) -> bool {
    match (Url::parse(current), Url::parse(target)) {
        (Ok(a), Ok(b)) => a == b,
        _ => current.eq_ignore_ascii_case(target),
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
    fn test_url_match_literal() {
        let m = UrlMatch::from("example.com/login");
        assert!(m.matches("https://example.com/login?next=/home"));
        assert!(!m.matches("https://example.com/home"));
    }

    #[test]
    fn test_url_match_pattern() {
        let m = UrlMatch::from(Regex::new(r"/account/\d+$").expect("pattern"));
        assert!(m.matches("https://example.com/account/42"));
        assert!(!m.matches("https://example.com/account/new"));
    }

    #[test]
    fn test_click_outcome_predicates() {
        assert!(ClickOutcome::Loaded.is_loaded());
        assert!(!ClickOutcome::Clicked.is_loaded());
        assert!(!ClickOutcome::Failed.is_loaded());
    }

    #[test]
    fn test_value_contains_marker() {
        assert!(value_contains(Some(&json!("FOUND")), FOUND));
        assert!(value_contains(Some(&json!("xx FOUND xx")), FOUND));
        assert!(!value_contains(Some(&json!("missing")), FOUND));
        assert!(!value_contains(Some(&json!(42)), FOUND));
        assert!(!value_contains(None, FOUND));
    }

    #[test]
    fn test_same_page_normalizes() {
        assert!(same_page("https://Example.COM/login", "https://example.com/login"));
        assert!(same_page("https://example.com", "https://example.com/"));
        assert!(!same_page("https://example.com/a", "https://example.com/b"));
        // Not parseable as absolute URLs: plain string comparison.
        assert!(same_page("/Login", "/login"));
        assert!(!same_page("/login", "/logout"));
    }

    #[test]
    fn test_value_string_list() {
        assert_eq!(
            value_string_list(json!(["a", "b"])),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(value_string_list(json!([1, 2])), None);
        assert_eq!(value_string_list(json!("solo")), None);
    }
}
