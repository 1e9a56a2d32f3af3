//! Frame context and frame-only verbs.
//!
//! A page may split its content across frames; the REPL locates a frame by
//! the URL its document was loaded from. Switching the actor to a frame
//! makes the content verbs in the parent module operate on that frame's
//! document. This module holds the switching surface plus the verbs that
//! only exist for frames.

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{Arg, json_object, repl_call};
use crate::session::registry;

use super::Actor;

impl Actor<'_> {
    /// Returns information about every frame in the current page.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockRequired`] without the REPL lock.
    pub async fn frames_info(&mut self) -> Result<Option<Value>> {
        registry::check_locked()?;
        self.builder.set_rc(repl_call("get_frames_info", []));
        let unit = self.builder.compile();
        Ok(self.exec_sync(&unit).await)
    }

    /// Scopes subsequent content verbs to the frame loaded from `frame_url`.
    pub fn switch_to_frame(&mut self, frame_url: impl Into<String>) {
        let frame_url = frame_url.into();
        debug!(frame_url = %frame_url, "Switching to frame");
        self.frame_url = Some(frame_url);
    }

    /// Returns subsequent content verbs to the top document.
    pub fn switch_to_main(&mut self) {
        debug!("Switching to main document");
        self.frame_url = None;
    }

    /// Evaluates an XPath against the current frame's document and returns
    /// the result immediately, without waiting for elements to appear.
    ///
    /// # Errors
    ///
    /// - [`Error::NoFrameUrl`] when no frame is selected
    /// - [`Error::LockRequired`] without the REPL lock
    pub async fn check_for_html(&mut self, xpath: &str) -> Result<Option<Value>> {
        registry::check_locked()?;
        let frame_url = self.frame_url.clone().ok_or(Error::NoFrameUrl)?;

        self.builder.set_rc(repl_call(
            "frame_check_for_html",
            [Arg::from(json_object([
                ("frame_url", Arg::from(frame_url)),
                ("xpath", Arg::from(xpath)),
            ]))],
        ));
        let unit = self.builder.compile();
        Ok(self.exec_sync(&unit).await)
    }

    /// Emits the statement binding `frame_doc` to the current frame's
    /// document, for units that read through it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoFrameUrl`] when no frame is selected.
    pub(super) fn code_frame_doc(&mut self) -> Result<()> {
        let frame_url = self.frame_url.clone().ok_or(Error::NoFrameUrl)?;
        self.builder.set(
            "frame_doc",
            repl_call(
                "frame_document",
                [Arg::from(json_object([("frame_url", Arg::from(frame_url))]))],
            ),
        );
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::session::{Session, SessionConfig};

    fn offline_actor(session: &mut Session) -> Actor<'_> {
        Actor {
            session,
            builder: crate::protocol::ScriptBuilder::new("repl"),
            frame_url: None,
            exec_timeout: std::time::Duration::from_secs(1),
        }
    }

    fn offline_session() -> Session {
        Session::offline_for_tests(SessionConfig::default())
    }

    #[test]
    fn test_switch_tracks_frame_url() {
        let mut session = offline_session();
        let mut actor = offline_actor(&mut session);

        assert_eq!(actor.frame_url(), None);
        actor.switch_to_frame("https://example.com/inner");
        assert_eq!(actor.frame_url(), Some("https://example.com/inner"));
        actor.switch_to_main();
        assert_eq!(actor.frame_url(), None);
    }

    #[test]
    fn test_code_frame_doc_requires_frame() {
        let mut session = offline_session();
        let mut actor = offline_actor(&mut session);

        assert!(matches!(actor.code_frame_doc(), Err(Error::NoFrameUrl)));

        actor.switch_to_frame("https://example.com/inner");
        actor.code_frame_doc().expect("frame selected");
        let stmt = &actor.builder.stmts()[0];
        assert!(stmt.contains("frame_doc = repl.frame_document("));
        assert!(stmt.contains("\"frame_url\": \"https://example.com/inner\""));
    }

    #[test]
    fn test_frame_scoped_read_compiles_frame_variant() {
        let mut session = offline_session();
        let mut actor = offline_actor(&mut session);
        actor.switch_to_frame("https://example.com/inner");

        let unit = actor
            .compile_element_read("//div", "repl.get_html(rc)")
            .expect("compile");
        assert!(unit.source().contains("repl.frame_wait_for_elements( {"));
        assert!(unit.source().contains("\"frame_url\": \"https://example.com/inner\""));
    }

    #[test]
    fn test_main_read_compiles_plain_variant() {
        let mut session = offline_session();
        let mut actor = offline_actor(&mut session);

        let unit = actor
            .compile_element_read("//div", "repl.get_html(rc)")
            .expect("compile");
        assert!(unit.source().contains("repl.wait_for_elements( {"));
        assert!(!unit.source().contains("frame_url"));
    }
}
