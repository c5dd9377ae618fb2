// tests/integration/session_test.rs

//! End-to-end tests for the broker: control protocol, descriptor handoff,
//! request relaying, and session teardown.

use super::session_helpers::*;
use std::os::unix::io::{AsFd, AsRawFd};
use std::time::{Duration, Instant};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_new_session_hands_off_working_descriptors() {
    let broker = TestBroker::start().await;
    let (id, receive, send) = open_session(&broker);

    assert!(id >= 1);
    assert!(receive.as_raw_fd() >= 0);
    assert!(send.as_raw_fd() >= 0);
    assert_ne!(receive.as_raw_fd(), send.as_raw_fd());

    // A request travels client -> broker -> module -> broker -> client.
    let reply = session_round_trip(&receive, &send, b"test");
    assert_eq!(reply, b"test");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sessions_get_distinct_ids() {
    let broker = TestBroker::start().await;
    let (first_id, first_receive, first_send) = open_session(&broker);
    let (second_id, second_receive, second_send) = open_session(&broker);

    assert_ne!(first_id, second_id);

    // Both sessions stay independently usable.
    assert_eq!(session_round_trip(&first_receive, &first_send, b"one"), b"one");
    assert_eq!(
        session_round_trip(&second_receive, &second_send, b"two"),
        b"two"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_list_shows_live_sessions() {
    let broker = TestBroker::start().await;
    let (first_id, _r1, _s1) = open_session(&broker);
    let (second_id, _r2, _s2) = open_session(&broker);

    let listing = list_sessions(&broker);
    assert_eq!(listing.lines().count(), 2);
    assert!(listing.contains(&format!("id={first_id} ")));
    assert!(listing.contains(&format!("id={second_id} ")));
    assert!(listing.contains("fd="));
    assert!(listing.contains("handles="));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_kill_terminates_session() {
    let broker = TestBroker::start().await;
    let (id, receive, _send) = open_session(&broker);

    let (status, payload) = kill_session(&broker, id);
    assert_eq!(status, 0);
    assert!(payload.is_empty());

    // The broker side is torn down, so the client observes EOF.
    let mut buf = [0u8; 4];
    let read = nix::unistd::read(receive.as_raw_fd(), &mut buf).unwrap();
    assert_eq!(read, 0);

    assert!(!list_sessions(&broker).contains(&format!("id={id} ")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_kill_unknown_id_is_an_error() {
    let broker = TestBroker::start().await;

    let (status, payload) = kill_session(&broker, 999);
    assert_eq!(status, 1);
    assert!(String::from_utf8_lossy(&payload).contains("no connection with id 999"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_client_disconnect_reaps_session() {
    let broker = TestBroker::start().await;
    let (id, receive, send) = open_session(&broker);
    assert!(list_sessions(&broker).contains(&format!("id={id} ")));

    // Closing both client descriptors signals EOF to the broker.
    drop(receive);
    drop(send);

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if !list_sessions(&broker).contains(&format!("id={id} ")) {
            break;
        }
        assert!(
            Instant::now() < deadline,
            "session {id} was not reaped after client disconnect"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_session_limit_reported_to_client() {
    let broker = TestBroker::start_with(|config| config.max_connections = 1).await;
    let (_id, _receive, _send) = open_session(&broker);

    let mut stream = broker.connect();
    send_frame(&mut stream, &[0x01]);
    let (status, payload) = read_reply(&mut stream);
    assert_eq!(status, 1);
    assert!(String::from_utf8_lossy(&payload).contains("full"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stats_reflect_session_activity() {
    let broker = TestBroker::start().await;
    let (_id1, receive, send) = open_session(&broker);
    let (_id2, _r2, _s2) = open_session(&broker);

    session_round_trip(&receive, &send, b"ping");

    let (live, total_sessions, total_requests) = broker_stats(&broker);
    assert_eq!(live, 2);
    assert_eq!(total_sessions, 2);
    assert!(total_requests >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_request_filling_the_buffer_terminates_session() {
    let broker = TestBroker::start_with(|config| config.request_buffer_bytes = 64).await;
    let (_id, receive, send) = open_session(&broker);

    // A request the size of the whole buffer cannot be framed reliably, so
    // the broker drops the session instead of relaying a truncated request.
    let oversized = vec![0xa5u8; 64];
    let written = nix::unistd::write(send.as_fd(), &oversized).unwrap();
    assert_eq!(written, 64);

    let mut buf = [0u8; 8];
    let read = nix::unistd::read(receive.as_raw_fd(), &mut buf).unwrap();
    assert_eq!(read, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_request_just_under_the_buffer_is_relayed() {
    let broker = TestBroker::start_with(|config| config.request_buffer_bytes = 64).await;
    let (_id, receive, send) = open_session(&broker);

    let request = vec![0x5au8; 63];
    let reply = session_round_trip(&receive, &send, &request);
    assert_eq!(reply, request);
}
