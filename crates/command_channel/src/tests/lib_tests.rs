use super::*;

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex as StdMutex,
    },
};

use serde_json::{json, Value};
use shared::protocol::Command;
use tokio::net::TcpListener;

enum Behavior {
    Reply(Value),
    Silent,
    Raw(&'static str),
    Hangup,
    /// Replies after a pause, echoing the command name as `data`.
    Late(Duration),
}

struct MockBrewd {
    addr: String,
    accepts: Arc<AtomicUsize>,
    seen: Arc<StdMutex<Vec<CommandEnvelope>>>,
}

async fn spawn_brewd(script: Vec<Behavior>) -> MockBrewd {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();
    let accepts = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(StdMutex::new(Vec::new()));
    let script = Arc::new(StdMutex::new(VecDeque::from(script)));

    let accepts_task = accepts.clone();
    let seen_task = seen.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            accepts_task.fetch_add(1, Ordering::SeqCst);
            let seen = seen_task.clone();
            let script = script.clone();
            tokio::spawn(async move {
                let (reader, mut writer) = stream.into_split();
                let mut lines = BufReader::new(reader).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let envelope: CommandEnvelope = serde_json::from_str(&line).expect("envelope");
                    let command = envelope.command;
                    seen.lock().expect("seen").push(envelope);
                    let behavior = script
                        .lock()
                        .expect("script")
                        .pop_front()
                        .unwrap_or(Behavior::Reply(json!({ "status": "success", "data": null })));
                    match behavior {
                        Behavior::Reply(reply) => {
                            let mut bytes = serde_json::to_vec(&reply).expect("reply");
                            bytes.push(b'\n');
                            if writer.write_all(&bytes).await.is_err() {
                                return;
                            }
                        }
                        Behavior::Silent => {}
                        Behavior::Raw(text) => {
                            let bytes = format!("{text}\n");
                            if writer.write_all(bytes.as_bytes()).await.is_err() {
                                return;
                            }
                        }
                        Behavior::Hangup => return,
                        Behavior::Late(pause) => {
                            tokio::time::sleep(pause).await;
                            let reply = json!({ "status": "success", "data": command.as_str() });
                            let mut bytes = serde_json::to_vec(&reply).expect("reply");
                            bytes.push(b'\n');
                            if writer.write_all(&bytes).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            });
        }
    });

    MockBrewd {
        addr,
        accepts,
        seen,
    }
}

fn channel_for(brewd: &MockBrewd) -> CommandChannel {
    CommandChannel::tcp(&ChannelConfig {
        addr: brewd.addr.clone(),
        timeout: Duration::from_millis(150),
        linger: false,
    })
}

#[tokio::test]
async fn exchange_returns_backend_reply() {
    let brewd = spawn_brewd(vec![Behavior::Reply(
        json!({ "status": "success", "data": { "volume": 25 } }),
    )])
    .await;
    let mut channel = channel_for(&brewd);

    let reply = channel
        .send(&CommandEnvelope::bare(Command::GetVolume))
        .await
        .expect("reply");
    assert_eq!(reply.status.as_deref(), Some("success"));
    assert_eq!(reply.data, Some(json!({ "volume": 25 })));

    let seen = brewd.seen.lock().expect("seen").clone();
    assert_eq!(seen, vec![CommandEnvelope::bare(Command::GetVolume)]);
    assert_eq!(channel.reconnects(), 0);
}

#[tokio::test]
async fn reply_timeout_reconnects_once_and_next_call_succeeds() {
    let brewd = spawn_brewd(vec![
        Behavior::Silent,
        Behavior::Reply(json!({ "status": "success", "data": "ok" })),
    ])
    .await;
    let mut channel = channel_for(&brewd);

    let err = channel
        .send(&CommandEnvelope::bare(Command::HasMalt))
        .await
        .expect_err("should time out");
    assert!(matches!(err, ChannelError::Timeout(_)));
    assert_eq!(channel.reconnects(), 1);
    assert!(channel.is_connected());

    let reply = channel
        .send(&CommandEnvelope::bare(Command::HasMalt))
        .await
        .expect("second exchange");
    assert_eq!(reply.data, Some(json!("ok")));
    assert_eq!(channel.reconnects(), 1);
    assert_eq!(brewd.accepts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn peer_hangup_rebuilds_connection() {
    let brewd = spawn_brewd(vec![Behavior::Hangup]).await;
    let mut channel = channel_for(&brewd);

    let err = channel
        .send(&CommandEnvelope::bare(Command::GetState))
        .await
        .expect_err("peer closed");
    assert!(matches!(err, ChannelError::Recv(_)));
    assert_eq!(channel.reconnects(), 1);

    channel
        .send(&CommandEnvelope::bare(Command::GetState))
        .await
        .expect("fresh connection answers");
}

#[tokio::test]
async fn unparsable_reply_keeps_connection() {
    let brewd = spawn_brewd(vec![Behavior::Raw("not json at all")]).await;
    let mut channel = channel_for(&brewd);

    let err = channel
        .send(&CommandEnvelope::bare(Command::GetConfig))
        .await
        .expect_err("malformed");
    assert!(err.is_malformed_reply());
    assert_eq!(channel.reconnects(), 0);

    channel
        .send(&CommandEnvelope::bare(Command::GetConfig))
        .await
        .expect("same connection still usable");
    assert_eq!(brewd.accepts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unreachable_backend_is_a_connect_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();
    drop(listener);

    let mut channel = CommandChannel::tcp(&ChannelConfig {
        timeout: Duration::from_millis(150),
        ..ChannelConfig::new(addr)
    });
    let err = channel
        .send(&CommandEnvelope::bare(Command::GetState))
        .await
        .expect_err("nothing listening");
    assert!(matches!(err, ChannelError::Connect(_)));
    assert!(!channel.is_connected());
}

#[tokio::test]
async fn shared_channel_serializes_concurrent_callers() {
    let brewd = spawn_brewd(Vec::new()).await;
    let shared = SharedChannel::new(channel_for(&brewd));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let shared = shared.clone();
        tasks.push(tokio::spawn(async move {
            shared
                .exchange(&CommandEnvelope::bare(Command::GetVolume))
                .await
        }));
    }
    for task in tasks {
        let reply = task.await.expect("join").expect("reply");
        assert_eq!(reply.status.as_deref(), Some("success"));
    }

    assert_eq!(brewd.accepts.load(Ordering::SeqCst), 1);
    assert_eq!(brewd.seen.lock().expect("seen").len(), 8);
    assert_eq!(shared.reconnects().await, 0);
}

#[tokio::test]
async fn abandoned_exchange_does_not_leak_its_reply() {
    let brewd = spawn_brewd(vec![
        Behavior::Late(Duration::from_millis(100)),
        Behavior::Late(Duration::from_millis(10)),
    ])
    .await;
    let shared = SharedChannel::new(channel_for(&brewd));

    let abandoned = tokio::time::timeout(
        Duration::from_millis(30),
        shared.exchange(&CommandEnvelope::bare(Command::HasMalt)),
    )
    .await;
    assert!(abandoned.is_err(), "caller gave up before brewd answered");

    // Let the late hasMalt reply land on the old connection.
    tokio::time::sleep(Duration::from_millis(120)).await;

    let reply = shared
        .exchange(&CommandEnvelope::bare(Command::GetVolume))
        .await
        .expect("reply");
    assert_eq!(reply.data, Some(json!("getVolume")));
    assert_eq!(brewd.accepts.load(Ordering::SeqCst), 2);
}
