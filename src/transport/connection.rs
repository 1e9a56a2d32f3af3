//! Line-protocol connection to the in-browser REPL.
//!
//! The REPL listens on a TCP port and speaks plain UTF-8 text: the client
//! writes a command line, then reads until a prompt (or another expected
//! marker) appears in the stream. [`Connection`] owns the socket, the
//! residual read buffer, the session identifier assigned by the remote side,
//! and the prompt pattern derived from that identifier.
//!
//! # Bootstrap handshake
//!
//! On connect the REPL prints its first prompt, which carries the session
//! identifier (`repl`, `repl2`, ...). The client captures it, derives the
//! session prompt pattern, and sends `<replid>.repl_initialize(content)`.
//! The remote side answers with an initialized / not-initialized marker; on
//! not-initialized the client waits and retries exactly once before
//! declaring fatal failure.

// ============================================================================
// Imports
// ============================================================================

use std::io::ErrorKind;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Matches any REPL prompt, capturing the session identifier.
static ANY_PROMPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(repl\d*)> ").expect("valid prompt pattern"));

/// Matches the initialize handshake reply.
static REPL_INIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"==REPL IS( NOT)? INITIALIZED==").expect("valid init pattern")
});

/// Matches the end marker of a JSON-bearing response.
static END_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"==END-JSON==\n").expect("valid end marker pattern"));

/// Pause before the second initialize attempt; the REPL may be opening a
/// fresh window.
const INIT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Initialize attempts before declaring the handshake failed.
const INIT_ATTEMPTS: u32 = 2;

/// Read chunk size.
const READ_CHUNK: usize = 16 * 1024;

// ============================================================================
// Connection
// ============================================================================

/// A live connection to the REPL.
///
/// One logical command is in flight at a time; every method takes
/// `&mut self`, which is what serializes transactions on the wire.
pub struct Connection {
    stream: TcpStream,
    buffer: String,
    host: String,
    port: u16,
    timeout: Duration,
    repl_id: String,
    prompt: Regex,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("repl_id", &self.repl_id)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Connects to the REPL and runs the bootstrap handshake.
    ///
    /// # Errors
    ///
    /// - [`Error::FirefoxUnreachable`] if the host refuses the connection
    /// - [`Error::HandshakeFailed`] if the REPL reports not-initialized twice
    /// - [`Error::Timeout`] if the remote side stops talking mid-handshake
    pub async fn open(host: &str, port: u16, read_timeout: Duration) -> Result<Self> {
        debug!(host, port, "Connecting to REPL");

        let stream = match timeout(read_timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
                return Err(Error::firefox_unreachable(host, port));
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(Error::timeout("connect", read_timeout.as_millis() as u64));
            }
        };

        let mut connection = Self {
            stream,
            buffer: String::new(),
            host: host.to_string(),
            port,
            timeout: read_timeout,
            repl_id: String::new(),
            prompt: ANY_PROMPT.clone(),
        };

        connection.handshake().await?;
        Ok(connection)
    }

    /// Returns the session identifier assigned by the remote side.
    #[inline]
    #[must_use]
    pub fn repl_id(&self) -> &str {
        &self.repl_id
    }

    /// Sends one line of text.
    pub async fn send(&mut self, text: &str) -> Result<()> {
        trace!(len = text.len(), "Sending command");
        self.stream.write_all(text.as_bytes()).await?;
        self.stream.write_all(b"\n").await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Reads until `pattern` matches the stream.
    ///
    /// Returns everything consumed, including the match itself; anything
    /// past the match stays buffered for the next read.
    pub async fn read_until(&mut self, pattern: &Regex) -> Result<String> {
        loop {
            if let Some(found) = pattern.find(&self.buffer) {
                let end = found.end();
                let consumed: String = self.buffer.drain(..end).collect();
                trace!(len = consumed.len(), "Pattern matched");
                return Ok(consumed);
            }
            self.fill_buffer().await?;
        }
    }

    /// Sends a command and reads until the session prompt, stripping every
    /// prompt occurrence from the returned text.
    pub async fn cmd(&mut self, command: &str) -> Result<String> {
        let prompt = self.prompt.clone();
        self.cmd_match(command, &prompt).await
    }

    /// Sends a command and reads until an arbitrary pattern matches.
    ///
    /// Prompt occurrences are stripped from the returned text; the matched
    /// pattern itself is kept so callers can inspect marker replies.
    pub async fn cmd_match(&mut self, command: &str, pattern: &Regex) -> Result<String> {
        self.send(command).await?;
        let output = self.read_until(pattern).await?;
        Ok(self.prompt.replace_all(&output, "").into_owned())
    }

    /// Sends a JSON-returning command and reads through the end marker.
    ///
    /// The protocol requires JSON-returning calls to be a single line, so
    /// all newlines in `code` are flattened to spaces before sending. The
    /// raw delimited text is returned; envelope parsing belongs to the
    /// execution engine.
    pub async fn json_cmd(&mut self, code: &str) -> Result<String> {
        let line = flatten(code);
        self.cmd_match(&line, &END_JSON).await
    }

    /// Closes the connection.
    pub async fn close(&mut self) -> Result<()> {
        debug!(repl_id = %self.repl_id, "Closing connection");
        self.stream.shutdown().await?;
        Ok(())
    }

    // ========================================================================
    // Internal
    // ========================================================================

    /// Reads the banner prompt, captures the session identifier, and runs
    /// the initialize exchange.
    async fn handshake(&mut self) -> Result<()> {
        let banner = self.read_until(&ANY_PROMPT.clone()).await?;
        let repl_id = ANY_PROMPT
            .captures(&banner)
            .and_then(|c| c.get(1))
            .map_or("repl", |m| m.as_str())
            .to_string();

        debug!(repl_id = %repl_id, "Captured session identifier");

        self.prompt = Regex::new(&format!("{}> ", regex::escape(&repl_id)))
            .map_err(|e| Error::config(format!("bad prompt pattern: {e}")))?;
        self.repl_id = repl_id;

        let init_cmd = format!("{}.repl_initialize(content)", self.repl_id);

        for attempt in 1..=INIT_ATTEMPTS {
            let reply = self.cmd_match(&init_cmd, &REPL_INIT).await?;
            if !reply.contains("NOT") {
                debug!(attempt, "REPL initialized");
                return Ok(());
            }

            warn!(attempt, "REPL not initialized");
            if attempt < INIT_ATTEMPTS {
                // The REPL should be opening a new window; give it a moment.
                sleep(INIT_RETRY_DELAY).await;
            }
        }

        Err(Error::handshake_failed(INIT_ATTEMPTS))
    }

    /// Reads more bytes into the buffer, bounded by the read timeout.
    async fn fill_buffer(&mut self) -> Result<()> {
        let mut chunk = vec![0u8; READ_CHUNK];

        let n = match timeout(self.timeout, self.stream.read(&mut chunk)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(Error::timeout("read", self.timeout.as_millis() as u64));
            }
        };

        if n == 0 {
            return Err(Error::ConnectionClosed);
        }

        self.buffer.push_str(&String::from_utf8_lossy(&chunk[..n]));
        Ok(())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Flattens a multi-line command to a single line.
pub(crate) fn flatten(code: &str) -> String {
    code.replace(['\r', '\n'], " ")
}

// ============================================================================
// Tests
// ============================================================================
