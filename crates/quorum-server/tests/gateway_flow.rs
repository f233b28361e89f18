//! End-to-end gateway flow across two server processes sharing one
//! database and one Redis. Requires a reachable Redis; set
//! `QUORUM_TEST_REDIS_URL` to run, otherwise these tests return early.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use quorum_core::events::{remote_event_registry, RoomEventBus};
use quorum_core::registry::RoomRegistry;
use quorum_core::vote::VoteToggler;
use quorum_core::{AppConfig, AppState};
use quorum_db::DbPool;
use quorum_fanout::FanoutClient;

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn test_redis_url() -> Option<String> {
    std::env::var("QUORUM_TEST_REDIS_URL")
        .ok()
        .filter(|v| !v.trim().is_empty())
}

async fn seeded_db() -> DbPool {
    let db = quorum_db::create_pool("sqlite::memory:", 1).await.expect("pool");
    quorum_db::run_migrations(&db).await.expect("migrations");
    quorum_db::users::create_user(&db, 1, "Rosa", "Diaz", "rosa@example.com", None)
        .await
        .expect("admin");
    quorum_db::users::create_user(&db, 2, "Sam", "Chen", "sam@example.com", None)
        .await
        .expect("user");
    quorum_db::users::create_user(&db, 3, "Noor", "Khan", "noor@example.com", None)
        .await
        .expect("user");
    db
}

/// Stand up one "process": its own fan-out client, registry, and bus over
/// the shared database and Redis, serving the gateway on an ephemeral port.
async fn spawn_gateway(db: DbPool, redis_url: &str, origin: &str) -> SocketAddr {
    let fanout = Arc::new(
        FanoutClient::connect_with_origin(redis_url, origin.to_string())
            .await
            .expect("redis connect"),
    );
    let state = AppState {
        db,
        event_bus: RoomEventBus::default(),
        fanout: fanout.clone(),
        registry: Arc::new(RoomRegistry::new()),
        votes: Arc::new(VoteToggler::new()),
        config: AppConfig::default(),
        shutdown: Arc::new(tokio::sync::Notify::new()),
    };
    fanout.spawn_subscriber(remote_event_registry(&state));

    let app = quorum_ws::gateway_router().with_state(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .await
            .expect("serve");
    });
    addr
}

async fn connect(addr: SocketAddr) -> WsClient {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/gateway"))
        .await
        .expect("ws connect");
    ws
}

async fn send_action(ws: &mut WsClient, action: &str, data: Value) {
    let frame = json!({ "action": action, "data": data }).to_string();
    ws.send(Message::Text(frame.into())).await.expect("send");
}

/// Read frames until one carries the named event, skipping everything else
/// (pings, unrelated events). Panics after five seconds.
async fn wait_for_event(ws: &mut WsClient, event: &str) -> Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let remaining = deadline
            .checked_duration_since(tokio::time::Instant::now())
            .unwrap_or_else(|| panic!("timed out waiting for {event}"));
        let msg = tokio::time::timeout(remaining, ws.next())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {event}"))
            .expect("stream open")
            .expect("frame");
        if let Message::Text(text) = msg {
            let frame: Value = serde_json::from_str(&text).expect("json frame");
            if frame["event"] == event {
                return frame["data"].clone();
            }
        }
    }
}

#[tokio::test]
async fn full_room_lifecycle_across_two_processes() {
    let Some(redis_url) = test_redis_url() else {
        return;
    };

    let db = seeded_db().await;
    let room = quorum_core::room::create_room(&db, 1, "All hands", None, 1)
        .await
        .expect("room");
    let room_code = room.code.clone();

    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let addr_a = spawn_gateway(db.clone(), &redis_url, &format!("proc-a-{suffix}")).await;
    let addr_b = spawn_gateway(db.clone(), &redis_url, &format!("proc-b-{suffix}")).await;
    // Let both pattern subscriptions attach before publishing anything.
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Sam joins on process A.
    let mut sam = connect(addr_a).await;
    send_action(&mut sam, "joinRoom", json!({"roomCode": room_code, "userId": 2})).await;
    let ack = wait_for_event(&mut sam, "joinRoomSuccess").await;
    assert_eq!(ack["roomId"], room_code.as_str());
    assert_eq!(ack["participantCount"], 1);
    let self_join = wait_for_event(&mut sam, "userJoined").await;
    assert_eq!(self_join["user"]["id"], 2);
    assert_eq!(self_join["participantCount"], 1);
    assert_eq!(self_join["participants"].as_array().expect("list").len(), 1);

    // Noor joins on process B; Sam sees it arrive through the fan-out.
    let mut noor = connect(addr_b).await;
    send_action(&mut noor, "joinRoom", json!({"roomCode": room_code, "userId": 3})).await;
    let ack = wait_for_event(&mut noor, "joinRoomSuccess").await;
    assert_eq!(ack["participantCount"], 2);
    let remote_join = wait_for_event(&mut sam, "userJoined").await;
    assert_eq!(remote_join["user"]["firstName"], "Noor");
    assert_eq!(remote_join["participantCount"], 2);

    // Sam posts a question; both processes deliver it fully hydrated.
    send_action(
        &mut sam,
        "message",
        json!({"content": "Hello?", "roomCode": room_code, "userId": 2}),
    )
    .await;
    let q_noor = wait_for_event(&mut noor, "newMessage").await;
    assert_eq!(q_noor["content"], "Hello?");
    assert_eq!(q_noor["voteCount"], 0);
    assert_eq!(q_noor["user"]["firstName"], "Sam");
    assert_eq!(q_noor["room"]["code"], room_code.as_str());
    let question_id = q_noor["id"].as_i64().expect("question id");
    let q_sam = wait_for_event(&mut sam, "newMessage").await;
    assert_eq!(q_sam["id"].as_i64(), Some(question_id));

    // Noor votes; the update reaches Sam across processes.
    send_action(
        &mut noor,
        "vote",
        json!({"questionId": question_id, "roomCode": room_code, "userId": 3}),
    )
    .await;
    let vote = wait_for_event(&mut sam, "voteUpdated").await;
    assert_eq!(vote["action"], "added");
    assert_eq!(vote["voteCount"], 1);
    assert_eq!(vote["hasVoted"], true);
    assert_eq!(vote["userId"], 3);

    // A non-admin cannot mark the question answered; only the offending
    // connection hears about it.
    send_action(
        &mut noor,
        "markAsAnswered",
        json!({"questionId": question_id, "roomCode": room_code, "userId": 3}),
    )
    .await;
    let err = wait_for_event(&mut noor, "markAsAnsweredError").await;
    assert!(err["error"]
        .as_str()
        .expect("error text")
        .starts_with("Unauthorized"));

    // The admin joins on process A and marks it answered.
    let mut rosa = connect(addr_a).await;
    send_action(&mut rosa, "joinRoom", json!({"roomCode": room_code, "userId": 1})).await;
    wait_for_event(&mut rosa, "joinRoomSuccess").await;
    send_action(
        &mut rosa,
        "markAsAnswered",
        json!({"questionId": question_id, "roomCode": room_code, "userId": 1}),
    )
    .await;
    let answered = wait_for_event(&mut noor, "questionAnswered").await;
    assert_eq!(answered["isAnswered"], true);
    assert_eq!(answered["question"]["id"].as_i64(), Some(question_id));
    assert_eq!(answered["question"]["isAnswered"], true);

    // A non-admin cannot end the session.
    send_action(&mut noor, "endSession", json!({"roomCode": room_code, "userId": 3})).await;
    let err = wait_for_event(&mut noor, "sessionEndError").await;
    assert!(err["error"]
        .as_str()
        .expect("error text")
        .starts_with("Unauthorized"));

    // The admin ends the session; every participant on every process is
    // told, and the room stops existing.
    send_action(&mut rosa, "endSession", json!({"roomCode": room_code, "userId": 1})).await;
    let ended = wait_for_event(&mut sam, "sessionEnded").await;
    assert_eq!(ended["roomCode"], room_code.as_str());
    assert_eq!(ended["endedBy"]["id"], 1);
    assert_eq!(ended["message"], "Session ended by Rosa Diaz");
    wait_for_event(&mut noor, "sessionEnded").await;

    let mut late = connect(addr_b).await;
    send_action(&mut late, "joinRoom", json!({"roomCode": room_code, "userId": 2})).await;
    let err = wait_for_event(&mut late, "joinRoomError").await;
    assert_eq!(err["message"], "Room not found");
}

#[tokio::test]
async fn disconnect_is_an_implicit_leave_visible_to_peers() {
    let Some(redis_url) = test_redis_url() else {
        return;
    };

    let db = seeded_db().await;
    let room = quorum_core::room::create_room(&db, 1, "Retro", None, 1)
        .await
        .expect("room");
    let room_code = room.code.clone();

    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let addr_a = spawn_gateway(db.clone(), &redis_url, &format!("proc-a-{suffix}")).await;
    let addr_b = spawn_gateway(db.clone(), &redis_url, &format!("proc-b-{suffix}")).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let mut sam = connect(addr_a).await;
    send_action(&mut sam, "joinRoom", json!({"roomCode": room_code, "userId": 2})).await;
    wait_for_event(&mut sam, "joinRoomSuccess").await;

    let mut noor = connect(addr_b).await;
    send_action(&mut noor, "joinRoom", json!({"roomCode": room_code, "userId": 3})).await;
    let ack = wait_for_event(&mut noor, "joinRoomSuccess").await;
    assert_eq!(ack["participantCount"], 2);

    // Sam's transport drops without an explicit leaveRoom.
    sam.close(None).await.expect("close");
    drop(sam);

    let left = wait_for_event(&mut noor, "userLeft").await;
    assert_eq!(left["user"]["id"], 2);
    assert_eq!(left["participantCount"], 1);
    let participants = left["participants"].as_array().expect("list");
    assert_eq!(participants.len(), 1);
    assert_eq!(participants[0]["id"], 3);
}

#[tokio::test]
async fn explicit_leave_acknowledges_and_updates_presence() {
    let Some(redis_url) = test_redis_url() else {
        return;
    };

    let db = seeded_db().await;
    let room = quorum_core::room::create_room(&db, 1, "Office hours", None, 1)
        .await
        .expect("room");
    let room_code = room.code.clone();

    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let addr_a = spawn_gateway(db.clone(), &redis_url, &format!("proc-a-{suffix}")).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let mut sam = connect(addr_a).await;
    send_action(&mut sam, "joinRoom", json!({"roomCode": room_code, "userId": 2})).await;
    wait_for_event(&mut sam, "joinRoomSuccess").await;

    let mut noor = connect(addr_a).await;
    send_action(&mut noor, "joinRoom", json!({"roomCode": room_code, "userId": 3})).await;
    wait_for_event(&mut noor, "joinRoomSuccess").await;

    send_action(&mut noor, "leaveRoom", json!({"roomCode": room_code, "userId": 3})).await;
    let ack = wait_for_event(&mut noor, "leaveRoomSuccess").await;
    assert_eq!(ack["roomId"], room_code.as_str());

    let left = wait_for_event(&mut sam, "userLeft").await;
    assert_eq!(left["user"]["id"], 3);
    assert_eq!(left["participantCount"], 1);
}
