//! End-to-end tests against a scripted mock REPL.
//!
//! Each test binds a local TCP listener and serves the line protocol by
//! hand: banner prompt, initialize exchange, then scripted responses to the
//! units the client sends.

use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_test::assert_ok;

use firefox_repl::session::registry;
use firefox_repl::{
    Actor, Error, Outcome, Pause, RetryPolicy, ScriptBuilder, Session, SessionConfig, UrlMatch,
    protocol::js,
};

// ============================================================================
// Mock Server Plumbing
// ============================================================================

/// Reads one line (the client sends single-line commands).
async fn read_line(stream: &mut TcpStream) -> String {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await.expect("server read");
        if n == 0 || byte[0] == b'\n' {
            break;
        }
        line.push(byte[0]);
    }
    String::from_utf8(line).expect("utf8 command")
}

async fn write_all(stream: &mut TcpStream, text: &str) {
    stream.write_all(text.as_bytes()).await.expect("server write");
    stream.flush().await.expect("server flush");
}

/// Serves the banner and a successful initialize exchange.
async fn serve_handshake(stream: &mut TcpStream, repl_id: &str) {
    write_all(stream, &format!("{repl_id}> ")).await;

    let init = read_line(stream).await;
    assert_eq!(init, format!("{repl_id}.repl_initialize(content)"));
    write_all(stream, &format!("==REPL IS INITIALIZED==\n{repl_id}> ")).await;
}

/// Formats a delimited JSON response block followed by a prompt.
fn json_block(repl_id: &str, body: &serde_json::Value) -> String {
    format!("==BEGIN-JSON==\n{body}\n==END-JSON==\n{repl_id}> ")
}

fn config_for(listener: &TcpListener) -> SessionConfig {
    let addr = listener.local_addr().expect("local addr");
    SessionConfig::new()
        .with_host("127.0.0.1")
        .with_port(addr.port())
        .with_timeout(Duration::from_secs(5))
}

/// Spawns a server task handling one connection with the given script.
fn spawn_one<F, Fut>(listener: TcpListener, script: F) -> JoinHandle<()>
where
    F: FnOnce(TcpStream) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        script(stream).await;
    })
}

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn test_handshake_captures_repl_id() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let config = config_for(&listener);

    let server = spawn_one(listener, |mut stream| async move {
        serve_handshake(&mut stream, "repl7").await;
    });

    let session = assert_ok!(Session::connect(config).await);
    assert!(session.connected());
    assert_eq!(session.repl_id(), Some("repl7"));

    server.await.expect("server task");
}

#[tokio::test]
async fn test_handshake_retries_after_not_initialized() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let config = config_for(&listener);

    let server = spawn_one(listener, |mut stream| async move {
        write_all(&mut stream, "repl> ").await;

        let _init = read_line(&mut stream).await;
        write_all(&mut stream, "==REPL IS NOT INITIALIZED==\nrepl> ").await;

        // The client pauses before its second and final attempt.
        let _init = read_line(&mut stream).await;
        write_all(&mut stream, "==REPL IS INITIALIZED==\nrepl> ").await;
    });

    let session = Session::connect(config).await.expect("connect");
    assert_eq!(session.repl_id(), Some("repl"));

    server.await.expect("server task");
}

#[tokio::test]
async fn test_handshake_fails_after_two_not_initialized() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let config = config_for(&listener);

    let server = spawn_one(listener, |mut stream| async move {
        write_all(&mut stream, "repl> ").await;
        for _ in 0..2 {
            let _init = read_line(&mut stream).await;
            write_all(&mut stream, "==REPL IS NOT INITIALIZED==\nrepl> ").await;
        }
    });

    let err = Session::connect(config).await.unwrap_err();
    assert!(matches!(err, Error::HandshakeFailed { attempts: 2 }));

    server.await.expect("server task");
}

#[tokio::test]
async fn test_connection_refused_maps_to_unreachable() {
    // Bind to learn a free port, then drop the listener before connecting.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let config = config_for(&listener);
    drop(listener);

    let err = Session::connect(config).await.unwrap_err();
    assert!(matches!(err, Error::FirefoxUnreachable { .. }));
}

// ============================================================================
// Execution
// ============================================================================

#[tokio::test]
async fn test_execute_sync_parses_ok_envelope() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let config = config_for(&listener);

    let server = spawn_one(listener, |mut stream| async move {
        serve_handshake(&mut stream, "repl2").await;

        let unit = read_line(&mut stream).await;
        // Compiled units are flattened to one line before sending.
        assert!(unit.contains("(function(repl) {"));
        assert!(unit.contains("rc = 21 * 2;"));
        assert!(unit.ends_with("})(repl2);"));
        assert!(!unit.contains('\n'));

        let body = json!({"status": "OK", "result": 42});
        write_all(&mut stream, &json_block("repl2", &body)).await;
    });

    let mut session = Session::connect(config).await.expect("connect");

    let mut builder = ScriptBuilder::new(session.repl_id().expect("id"));
    builder.set_rc(js("21 * 2"));
    let unit = builder.compile();

    let outcome = session.execute_sync(&unit, Duration::from_secs(5)).await;
    assert!(outcome.is_ok());
    assert_eq!(outcome.into_success(), Some(json!(42)));

    server.await.expect("server task");
}

#[tokio::test]
async fn test_execute_surfaces_remote_exception() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let config = config_for(&listener);

    let server = spawn_one(listener, |mut stream| async move {
        serve_handshake(&mut stream, "repl").await;

        let _unit = read_line(&mut stream).await;
        let body = json!({"status": "ERROR", "exception": "TypeError", "result": "x is null"});
        write_all(&mut stream, &json_block("repl", &body)).await;
    });

    let mut session = Session::connect(config).await.expect("connect");

    let mut builder = ScriptBuilder::new("repl");
    builder.set_rc(js("x.y"));
    let unit = builder.compile();

    let outcome = session.execute_sync(&unit, Duration::from_secs(5)).await;
    assert!(!outcome.is_ok());
    assert_eq!(outcome.message(), Some("TypeError"));
    assert_eq!(outcome.into_success(), None);

    server.await.expect("server task");
}

#[tokio::test]
async fn test_execute_deadline_becomes_timeout_outcome() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let config = config_for(&listener);

    let server = spawn_one(listener, |mut stream| async move {
        serve_handshake(&mut stream, "repl").await;

        // Swallow the unit and never answer.
        let _unit = read_line(&mut stream).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let mut session = Session::connect(config).await.expect("connect");

    let mut builder = ScriptBuilder::new("repl");
    builder.set_rc(js("slow()"));
    let unit = builder.compile();

    let outcome = session.execute_sync(&unit, Duration::from_millis(200)).await;
    assert!(outcome.is_timeout());

    server.abort();
}

#[tokio::test]
async fn test_zero_deadline_sends_nothing() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let config = config_for(&listener);

    let server = spawn_one(listener, |mut stream| async move {
        serve_handshake(&mut stream, "repl").await;

        // Any traffic after the handshake fails the test.
        let mut byte = [0u8; 1];
        let n = stream.read(&mut byte).await.unwrap_or(0);
        assert_eq!(n, 0, "client must not send with a zero deadline");
    });

    let mut session = Session::connect(config).await.expect("connect");

    let unit = ScriptBuilder::new("repl").compile();
    let outcome = session.execute_sync(&unit, Duration::ZERO).await;
    assert!(outcome.is_timeout());

    session.close().await.expect("close");
    server.await.expect("server task");
}

// ============================================================================
// Rotation
// ============================================================================

#[tokio::test]
async fn test_rotation_picks_up_new_repl_id() -> anyhow::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let config = config_for(&listener);

    let server = tokio::spawn(async move {
        let (mut first, _) = listener.accept().await.expect("accept");
        serve_handshake(&mut first, "repl3").await;

        let (mut second, _) = listener.accept().await.expect("accept");
        serve_handshake(&mut second, "repl4").await;
    });

    let mut session = Session::connect(config).await?;
    assert_eq!(session.repl_id(), Some("repl3"));

    let repl_id = session.rotate().await?.to_string();
    assert_eq!(repl_id, "repl4");
    assert_eq!(session.repl_id(), Some("repl4"));

    server.await?;
    Ok(())
}

// ============================================================================
// Actor
// ============================================================================

#[tokio::test]
async fn test_actor_get_url_and_text_end_to_end() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let config = config_for(&listener);

    let server = spawn_one(listener, |mut stream| async move {
        serve_handshake(&mut stream, "repl5").await;

        let unit = read_line(&mut stream).await;
        assert!(unit.contains("rc = repl.get_url( null );"));
        let body = json!({"status": "OK", "result": "https://example.com/"});
        write_all(&mut stream, &json_block("repl5", &body)).await;

        let unit = read_line(&mut stream).await;
        assert!(unit.contains("repl.wait_for_elements( {"));
        assert!(unit.contains("\"xpath\": \"//h1\""));
        let body = json!({"status": "OK", "result": ["Example Domain"]});
        write_all(&mut stream, &json_block("repl5", &body)).await;

        // A URL wait that needs a second read before arriving.
        let unit = read_line(&mut stream).await;
        assert!(unit.contains("rc = repl.get_url( null );"));
        let body = json!({"status": "OK", "result": "https://example.com/interstitial"});
        write_all(&mut stream, &json_block("repl5", &body)).await;

        let unit = read_line(&mut stream).await;
        assert!(unit.contains("rc = repl.get_url( null );"));
        let body = json!({"status": "OK", "result": "https://example.com/account"});
        write_all(&mut stream, &json_block("repl5", &body)).await;
    });

    let mut session = Session::connect(config).await.expect("connect");
    let mut actor = Actor::new(&mut session).expect("actor");

    // Verbs refuse to run until the process holds the REPL lock.
    assert!(matches!(actor.get_url().await, Err(Error::LockRequired)));

    let dir = tempfile::tempdir().expect("tempdir");
    registry::lock(&dir.path().join("repl.lock")).expect("lock");

    let url = actor.get_url().await.expect("get_url");
    assert_eq!(url.as_deref(), Some("https://example.com/"));

    let text = actor.get_text("//h1").await.expect("get_text");
    assert_eq!(text, Some(vec!["Example Domain".to_string()]));

    let policy = RetryPolicy::new()
        .with_timeout(Duration::from_secs(5))
        .with_attempts(5)
        .with_pause(Pause::Fixed(Duration::from_millis(10)));
    let settled = actor
        .get_url_until(&UrlMatch::from("/account"), &policy)
        .await
        .expect("get_url_until");
    assert_eq!(settled.as_deref(), Some("https://example.com/account"));

    registry::unlock();
    server.await.expect("server task");
}

#[tokio::test]
async fn test_outcome_parse_is_reachable_from_raw_text() {
    // The envelope parser is usable standalone on captured output.
    let raw = "noise\n==BEGIN-JSON==\n{\"status\": \"OK\", \"result\": null}\n==END-JSON==\nrepl> ";
    assert!(Outcome::parse(raw).is_ok());
}
