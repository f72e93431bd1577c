// tests/integration_test.rs

//! End-to-end tests: a real server on a loopback port, driven with raw
//! RESP traffic over an actual `TcpStream`, exercising the scenarios this
//! server is specified to support.

mod common;

use bytes::Bytes;
use common::{TestClient, next_port, spawn_follower, spawn_leader};
use spineldb::core::protocol::RespFrame;
use std::time::Duration;

#[tokio::test]
async fn basic_set_get() {
    let port = next_port();
    spawn_leader(port).await;
    let mut client = TestClient::connect(port).await;

    client.send(&["SET", "foo", "bar"]).await;
    assert_eq!(
        client.read_reply().await,
        RespFrame::SimpleString("OK".into())
    );

    client.send(&["GET", "foo"]).await;
    assert_eq!(
        client.read_reply().await,
        RespFrame::BulkString(Bytes::from_static(b"bar"))
    );
}

#[tokio::test]
async fn expiry_via_px() {
    let port = next_port();
    spawn_leader(port).await;
    let mut client = TestClient::connect(port).await;

    client.send(&["SET", "k", "v", "PX", "100"]).await;
    assert_eq!(
        client.read_reply().await,
        RespFrame::SimpleString("OK".into())
    );

    tokio::time::sleep(Duration::from_millis(200)).await;

    client.send(&["GET", "k"]).await;
    assert_eq!(client.read_reply().await, RespFrame::Null);
}

#[tokio::test]
async fn incr_on_non_integer_value_errors() {
    let port = next_port();
    spawn_leader(port).await;
    let mut client = TestClient::connect(port).await;

    client.send(&["SET", "k", "abc"]).await;
    assert_eq!(
        client.read_reply().await,
        RespFrame::SimpleString("OK".into())
    );

    client.send(&["INCR", "k"]).await;
    match client.read_reply().await {
        RespFrame::Error(msg) => assert!(msg.contains("not an integer")),
        other => panic!("expected an error reply, got {other:?}"),
    }
}

#[tokio::test]
async fn stream_ordering_and_range() {
    let port = next_port();
    spawn_leader(port).await;
    let mut client = TestClient::connect(port).await;

    client.send(&["XADD", "s", "1-1", "a", "b"]).await;
    assert_eq!(
        client.read_reply().await,
        RespFrame::BulkString(Bytes::from_static(b"1-1"))
    );

    client.send(&["XADD", "s", "1-1", "c", "d"]).await;
    match client.read_reply().await {
        RespFrame::Error(msg) => assert!(msg.contains("equal or smaller")),
        other => panic!("expected an error reply, got {other:?}"),
    }

    client.send(&["XADD", "s", "1-2", "c", "d"]).await;
    assert_eq!(
        client.read_reply().await,
        RespFrame::BulkString(Bytes::from_static(b"1-2"))
    );

    client.send(&["XRANGE", "s", "-", "+"]).await;
    match client.read_reply().await {
        RespFrame::Array(entries) => assert_eq!(entries.len(), 2),
        other => panic!("expected an array reply, got {other:?}"),
    }
}

#[tokio::test]
async fn blocking_xread_wakes_on_append() {
    let port = next_port();
    spawn_leader(port).await;
    let mut reader = TestClient::connect(port).await;
    let mut writer = TestClient::connect(port).await;

    reader.send(&["XREAD", "BLOCK", "1000", "STREAMS", "s", "$"]).await;

    // The blocking reader must not have a reply yet.
    assert!(
        reader.try_read_reply(Duration::from_millis(100)).await.is_none(),
        "XREAD BLOCK replied before any new entry was appended"
    );

    writer.send(&["XADD", "s", "*", "k", "v"]).await;
    let id_reply = writer.read_reply().await;
    let RespFrame::BulkString(_) = id_reply else {
        panic!("expected XADD to return the generated id, got {id_reply:?}");
    };

    match reader.read_reply().await {
        RespFrame::Array(streams) => assert_eq!(streams.len(), 1),
        RespFrame::Null | RespFrame::NullArray => {
            panic!("XREAD BLOCK never observed the new entry")
        }
        other => panic!("unexpected reply shape: {other:?}"),
    }
}

#[tokio::test]
async fn multi_exec_runs_queued_commands_in_order() {
    let port = next_port();
    spawn_leader(port).await;
    let mut client = TestClient::connect(port).await;

    client.send(&["MULTI"]).await;
    assert_eq!(
        client.read_reply().await,
        RespFrame::SimpleString("OK".into())
    );

    client.send(&["SET", "x", "1"]).await;
    assert_eq!(
        client.read_reply().await,
        RespFrame::SimpleString("QUEUED".into())
    );

    client.send(&["INCR", "x"]).await;
    assert_eq!(
        client.read_reply().await,
        RespFrame::SimpleString("QUEUED".into())
    );

    client.send(&["EXEC"]).await;
    match client.read_reply().await {
        RespFrame::Array(replies) => {
            assert_eq!(replies.len(), 2);
            assert_eq!(replies[0], RespFrame::SimpleString("OK".into()));
            assert_eq!(replies[1], RespFrame::Integer(2));
        }
        other => panic!("expected an array reply from EXEC, got {other:?}"),
    }
}

#[tokio::test]
async fn discard_drops_queued_commands() {
    let port = next_port();
    spawn_leader(port).await;
    let mut client = TestClient::connect(port).await;

    client.send(&["MULTI"]).await;
    client.read_reply().await;

    client.send(&["SET", "x", "1"]).await;
    client.read_reply().await;

    client.send(&["DISCARD"]).await;
    assert_eq!(
        client.read_reply().await,
        RespFrame::SimpleString("OK".into())
    );

    client.send(&["GET", "x"]).await;
    assert_eq!(client.read_reply().await, RespFrame::Null);
}

#[tokio::test]
async fn a_key_cannot_straddle_both_stores() {
    let port = next_port();
    spawn_leader(port).await;
    let mut client = TestClient::connect(port).await;

    client.send(&["XADD", "k", "1-1", "f", "v"]).await;
    assert_eq!(
        client.read_reply().await,
        RespFrame::BulkString(Bytes::from_static(b"1-1"))
    );

    client.send(&["SET", "k", "oops"]).await;
    match client.read_reply().await {
        RespFrame::Error(msg) => assert!(msg.contains("WRONGTYPE")),
        other => panic!("expected WRONGTYPE, got {other:?}"),
    }

    client.send(&["SET", "s", "a string"]).await;
    client.read_reply().await;

    client.send(&["XADD", "s", "*", "f", "v"]).await;
    match client.read_reply().await {
        RespFrame::Error(msg) => assert!(msg.contains("WRONGTYPE")),
        other => panic!("expected WRONGTYPE, got {other:?}"),
    }
}

#[tokio::test]
async fn wait_with_no_replicas_times_out_at_zero() {
    let port = next_port();
    spawn_leader(port).await;
    let mut client = TestClient::connect(port).await;

    client.send(&["SET", "k", "v"]).await;
    client.read_reply().await;

    let start = tokio::time::Instant::now();
    client.send(&["WAIT", "1", "150"]).await;
    assert_eq!(client.read_reply().await, RespFrame::Integer(0));
    assert!(
        start.elapsed() >= Duration::from_millis(140),
        "WAIT returned before its timeout elapsed"
    );
}

#[tokio::test]
async fn wait_is_satisfied_by_a_caught_up_replica() {
    let leader_port = next_port();
    let replica_port = next_port();
    spawn_leader(leader_port).await;
    spawn_follower(replica_port, leader_port).await;

    let mut client = TestClient::connect(leader_port).await;
    client.send(&["SET", "k", "v"]).await;
    assert_eq!(
        client.read_reply().await,
        RespFrame::SimpleString("OK".into())
    );

    // Give the follower a moment to complete its handshake and apply the
    // propagated SET before WAIT asks it to acknowledge.
    tokio::time::sleep(Duration::from_millis(200)).await;

    client.send(&["WAIT", "1", "2000"]).await;
    assert_eq!(client.read_reply().await, RespFrame::Integer(1));

    let mut replica_client = TestClient::connect(replica_port).await;
    replica_client.send(&["GET", "k"]).await;
    assert_eq!(
        replica_client.read_reply().await,
        RespFrame::BulkString(Bytes::from_static(b"v"))
    );
}
