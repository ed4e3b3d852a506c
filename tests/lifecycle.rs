//! Integration tests for the connection lifecycle.
//!
//! Each test drives a real [`Client`] over an in-memory pipe against a
//! scripted server.

mod common;

use common::{test_config, wait_for_state, MockConnector};
use pircel::db::Database;
use pircel::session::LineKind;
use pircel::{Client, ClientError, ConnectionState, HandlerError};
use pircel_proto::ProtocolError;
use std::time::Duration;

fn spawn(client: Client) -> tokio::task::JoinHandle<(Client, Result<(), ClientError>)> {
    tokio::spawn(async move {
        let mut client = client;
        let result = client.run().await;
        (client, result)
    })
}

#[tokio::test]
async fn registration_then_stop() {
    let (connector, mut server) = MockConnector::pair();
    let client = Client::with_connector(test_config("test", &[], ""), connector.clone());
    let mut state = client.state();
    let stop = client.stop_handle();
    let task = spawn(client);

    assert_eq!(server.recv().await.unwrap(), "NICK test");
    assert_eq!(server.recv().await.unwrap(), "USER test 0 * :test");
    wait_for_state(&mut state, ConnectionState::AwaitingWelcome).await;

    stop.stop();
    let (client, result) = task.await.unwrap();
    assert!(result.is_ok());
    assert_eq!(client.current_state(), ConnectionState::Closed);
    assert!(server.closed_within(Duration::from_secs(1)).await);
    assert_eq!(connector.calls(), vec![("irc.test".to_string(), 6667, false)]);

    // stopping again is harmless
    stop.stop();
}

#[tokio::test]
async fn welcome_triggers_autojoin() {
    let (connector, mut server) = MockConnector::pair();
    let client = Client::with_connector(test_config("bot", &["#one", "#two"], ""), connector);
    let mut state = client.state();
    let stop = client.stop_handle();
    let task = spawn(client);

    server.accept_registration("bot").await.unwrap();
    let mut joins = vec![server.recv().await.unwrap(), server.recv().await.unwrap()];
    joins.sort();
    assert_eq!(joins, ["JOIN #one", "JOIN #two"]);
    wait_for_state(&mut state, ConnectionState::Registered).await;

    // autojoin is one-shot
    server.send_raw(":irc.test 001 bot :Welcome again").await.unwrap();
    server.send_raw("PING :after").await.unwrap();
    assert_eq!(server.recv().await.unwrap(), "PONG :after");

    stop.stop();
    let (client, result) = task.await.unwrap();
    result.unwrap();
    assert!(client.protocol().session().is_registered());
}

#[tokio::test]
async fn server_ping_gets_pong() {
    let (connector, mut server) = MockConnector::pair();
    let client = Client::with_connector(test_config("test", &[], ""), connector);
    let stop = client.stop_handle();
    let task = spawn(client);

    server.recv().await.unwrap();
    server.recv().await.unwrap();
    server.send_raw("PING :stuff").await.unwrap();
    assert_eq!(server.recv().await.unwrap(), "PONG :stuff");

    stop.stop();
    task.await.unwrap().1.unwrap();
}

#[tokio::test(start_paused = true)]
async fn keepalive_pings_after_registration() {
    let (connector, mut server) = MockConnector::pair();
    let client = Client::with_connector(
        test_config("test", &[], "[behavior]\nkeepalive_secs = 60\n"),
        connector,
    );
    let mut state = client.state();
    let stop = client.stop_handle();
    let task = spawn(client);

    server.accept_registration("test").await.unwrap();
    wait_for_state(&mut state, ConnectionState::Registered).await;

    let started = tokio::time::Instant::now();
    let ping = server.recv_timeout(Duration::from_secs(300)).await.unwrap();
    let token = ping.strip_prefix("PING ").expect("keepalive PING");
    assert!(token.parse::<i64>().is_ok(), "token {:?} is a timestamp", token);
    assert!(started.elapsed() >= Duration::from_secs(59));

    let second = server.recv_timeout(Duration::from_secs(300)).await.unwrap();
    assert!(second.starts_with("PING "));

    server
        .send_raw(&format!(":irc.test PONG irc.test :{}", token))
        .await
        .unwrap();
    server.sync().await.unwrap();

    stop.stop();
    let (client, result) = task.await.unwrap();
    result.unwrap();
    assert!(client.protocol().session().last_pong().is_some());
}

#[tokio::test]
async fn peer_close_ends_run() {
    let (connector, mut server) = MockConnector::pair();
    let client = Client::with_connector(test_config("test", &[], ""), connector);
    let task = spawn(client);

    server.recv().await.unwrap();
    server.recv().await.unwrap();
    drop(server);

    let (client, result) = task.await.unwrap();
    assert!(matches!(result, Err(ClientError::ClosedByPeer)));
    assert_eq!(client.current_state(), ConnectionState::Closed);
}

#[tokio::test]
async fn log_policy_keeps_reading() {
    let (connector, mut server) = MockConnector::pair();
    let client = Client::with_connector(test_config("test", &[], ""), connector);
    let stop = client.stop_handle();
    let task = spawn(client);

    server.accept_registration("test").await.unwrap();
    server.send_raw(":nick!u@h JOIN").await.unwrap();
    server.send_raw(":irc.test 999 test :unknown numeric").await.unwrap();
    server.sync().await.unwrap();

    stop.stop();
    task.await.unwrap().1.unwrap();
}

#[tokio::test]
async fn over_long_line_is_dropped_under_log_policy() {
    let (connector, mut server) = MockConnector::pair();
    let client = Client::with_connector(test_config("test", &[], ""), connector);
    let mut state = client.state();
    let stop = client.stop_handle();
    let task = spawn(client);

    server.accept_registration("test").await.unwrap();
    wait_for_state(&mut state, ConnectionState::Registered).await;

    let flood = format!(":spam!s@host PRIVMSG #chan :{}", "x".repeat(9000));
    server.send_raw(&flood).await.unwrap();
    server.send_raw("PING :after-flood").await.unwrap();
    assert_eq!(server.recv().await.unwrap(), "PONG :after-flood");

    stop.stop();
    let (client, result) = task.await.unwrap();
    result.unwrap();
    assert!(client.protocol().session().find_user_by_nick("spam").is_none());
}

#[tokio::test]
async fn over_long_line_closes_under_terminate_policy() {
    let (connector, mut server) = MockConnector::pair();
    let client = Client::with_connector(
        test_config("test", &[], "[behavior]\nerror_policy = \"terminate\"\n"),
        connector,
    );
    let task = spawn(client);

    server.accept_registration("test").await.unwrap();
    server.send_raw(&"x".repeat(9000)).await.unwrap();

    let (_, result) = task.await.unwrap();
    assert!(matches!(
        result,
        Err(ClientError::Protocol(ProtocolError::MessageTooLong { actual: 9002, .. }))
    ));
}

#[tokio::test]
async fn write_failure_closes_connection() {
    let (connector, mut server) = MockConnector::pair();
    let client = Client::with_connector(test_config("test", &[], ""), connector.clone());
    let mut state = client.state();
    let task = spawn(client);

    assert_eq!(server.recv().await.unwrap(), "NICK test");
    assert_eq!(server.recv().await.unwrap(), "USER test 0 * :test");
    wait_for_state(&mut state, ConnectionState::AwaitingWelcome).await;

    connector.break_writes();
    server.send_raw("PING :x").await.unwrap();

    let (client, result) = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("run ends after a failed write")
        .unwrap();
    match result {
        Err(ClientError::Transport(e)) => assert_eq!(e.kind(), std::io::ErrorKind::BrokenPipe),
        other => panic!("expected a transport error, got {:?}", other),
    }
    assert_eq!(client.current_state(), ConnectionState::Closed);
}

#[tokio::test]
async fn terminate_policy_closes_on_bad_line() {
    let (connector, mut server) = MockConnector::pair();
    let client = Client::with_connector(
        test_config("test", &[], "[behavior]\nerror_policy = \"terminate\"\n"),
        connector,
    );
    let task = spawn(client);

    server.accept_registration("test").await.unwrap();
    server.send_raw(":nick!u@h JOIN").await.unwrap();

    let (client, result) = task.await.unwrap();
    assert!(matches!(
        result,
        Err(ClientError::Handler(HandlerError::NeedMoreParams { command: "JOIN", .. }))
    ));
    assert_eq!(client.current_state(), ConnectionState::Closed);
}

#[tokio::test]
async fn callback_can_quit_and_stop() {
    let (connector, mut server) = MockConnector::pair();
    let mut client = Client::with_connector(test_config("bot", &[], ""), connector);
    client.protocol_mut().subscribe("privmsg", |protocol, _, args| {
        if args.get(1).map(String::as_str) == Some("!quit") {
            protocol.quit("asked to leave");
            protocol.request_stop();
        }
    });
    let task = spawn(client);

    server.accept_registration("bot").await.unwrap();
    server
        .send_raw(":owner!o@host PRIVMSG #ops :!quit")
        .await
        .unwrap();

    assert_eq!(server.recv().await.unwrap(), "QUIT :asked to leave");
    assert!(server.closed_within(Duration::from_secs(1)).await);
    task.await.unwrap().1.unwrap();
}

#[tokio::test]
async fn session_follows_channel_traffic() {
    let (connector, mut server) = MockConnector::pair();
    let client = Client::with_connector(test_config("me", &["#rust"], ""), connector);
    let stop = client.stop_handle();
    let task = spawn(client);

    server.accept_registration("me").await.unwrap();
    assert_eq!(server.recv().await.unwrap(), "JOIN #rust");
    for line in [
        ":me!~me@host JOIN #rust",
        ":irc.test 332 me #rust :All about Rust",
        ":irc.test 353 me = #rust :me @ferris +alice",
        ":irc.test 366 me #rust :End of /NAMES list.",
        ":alice!a@host PRIVMSG #rust :hi ferris",
        ":alice!a@host NICK :alice_away",
        ":ferris!f@host PART #rust :brb",
        ":bob!b@host PRIVMSG me :psst",
    ] {
        server.send_raw(line).await.unwrap();
    }
    server.sync().await.unwrap();

    stop.stop();
    let (client, result) = task.await.unwrap();
    result.unwrap();

    let session = client.protocol().session();
    let rust = session.find_buffer_by_name("#RUST").unwrap();
    assert_eq!(rust.topic.as_deref(), Some("All about Rust"));

    let me = session.me().unwrap().id;
    let alice = session.find_user_by_nick("alice_away").unwrap().id;
    let ferris = session.find_user_by_nick("ferris").unwrap().id;
    assert!(session.find_user_by_nick("alice").is_none());
    assert!(session.is_member(me, rust.id));
    assert!(session.is_member(alice, rust.id));
    assert!(!session.is_member(ferris, rust.id));

    let kinds: Vec<_> = session.lines_for(rust.id).map(|l| l.kind).collect();
    assert_eq!(
        kinds,
        [LineKind::Join, LineKind::Message, LineKind::Nick, LineKind::Part]
    );

    let query = session.find_buffer_by_name("bob").unwrap();
    assert_eq!(session.lines_for(query.id).next().unwrap().body, "psst");
}

#[tokio::test]
async fn nick_collision_retries_with_underscore() {
    let (connector, mut server) = MockConnector::pair();
    let client = Client::with_connector(test_config("taken", &[], ""), connector);
    let stop = client.stop_handle();
    let task = spawn(client);

    assert_eq!(server.recv().await.unwrap(), "NICK taken");
    server.recv().await.unwrap();
    server
        .send_raw(":irc.test 433 * taken :Nickname is already in use")
        .await
        .unwrap();
    assert_eq!(server.recv().await.unwrap(), "NICK taken_");
    server
        .send_raw(":irc.test 001 taken_ :Welcome")
        .await
        .unwrap();
    server.sync().await.unwrap();

    stop.stop();
    let (client, _) = task.await.unwrap();
    assert_eq!(client.protocol().session().identity().nick, "taken_");
}

#[tokio::test]
async fn session_is_written_behind_to_database() {
    let db = Database::new(":memory:").await.unwrap();
    let (connector, mut server) = MockConnector::pair();
    let client = Client::with_connector(test_config("me", &[], ""), connector)
        .with_database(db.clone());
    let stop = client.stop_handle();
    let task = spawn(client);

    server.accept_registration("me").await.unwrap();
    server.send_raw(":dave!d@host JOIN #log").await.unwrap();
    server
        .send_raw(":dave!d@host PRIVMSG #log :remember this")
        .await
        .unwrap();
    server.sync().await.unwrap();

    stop.stop();
    task.await.unwrap().1.unwrap();

    let server_id: i64 = sqlx::query_scalar("SELECT id FROM servers ORDER BY id DESC LIMIT 1")
        .fetch_one(db.pool())
        .await
        .unwrap();
    let repo = db.sessions();
    let dave = repo.find_user_by_nick(server_id, "dave").await.unwrap().unwrap();
    let buffer = repo.find_buffer_by_name(server_id, "#log").await.unwrap().unwrap();
    assert_eq!(repo.members(server_id, buffer.buffer_id).await.unwrap(), vec![dave.user_id]);
    let lines = repo.lines_for_buffer(server_id, buffer.buffer_id, 10).await.unwrap();
    assert_eq!(lines.last().unwrap().body, "remember this");
}
