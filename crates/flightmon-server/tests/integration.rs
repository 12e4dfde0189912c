//! End-to-end integration tests using a real WebSocket client.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};

use flightmon_core::{SimValue, VariableCatalog};
use flightmon_server::metrics::detached_handle;
use flightmon_server::shutdown::ShutdownCoordinator;
use flightmon_server::{
    ConnectionStatus, FlightMonitorServer, Monitor, MonitorConfig, ServerConfig,
};
use flightmon_sim::SimulatedSource;

const TIMEOUT: Duration = Duration::from_secs(5);

const CATALOG: &str = "\
INDICATED ALTITUDE,feet
ATC ID,String8
ATC HEAVY,Bool
TITLE,String64
";

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct Harness {
    url: String,
    server: Arc<FlightMonitorServer>,
    source: Arc<SimulatedSource>,
    serve: Option<JoinHandle<()>>,
}

/// Boot a server over a connected simulator with a fast poll interval.
async fn boot_server(max_connections: usize) -> Harness {
    let shutdown = Arc::new(ShutdownCoordinator::new());
    let catalog = Arc::new(VariableCatalog::parse(CATALOG).unwrap());
    let source = Arc::new(SimulatedSource::new());
    source.set_value("INDICATED ALTITUDE", SimValue::Float64(3500.0));

    let monitor = Arc::new(Monitor::new(
        catalog,
        source.clone(),
        MonitorConfig {
            poll_interval: Duration::from_millis(20),
            ..MonitorConfig::default()
        },
        shutdown.token(),
    ));

    let config = ServerConfig {
        max_connections,
        ..ServerConfig::default()
    };
    let server = Arc::new(FlightMonitorServer::new(
        config,
        monitor.clone(),
        shutdown,
        detached_handle(),
    ));
    let (addr, serve) = server.listen().await.unwrap();

    monitor.connect().unwrap();
    let mut status = monitor.subscribe_connection_status();
    let _ = timeout(TIMEOUT, status.wait_for(|s| *s == ConnectionStatus::Connected))
        .await
        .expect("telemetry never connected")
        .unwrap();

    Harness {
        url: format!("ws://{addr}/ws"),
        server,
        source,
        serve: Some(serve),
    }
}

async fn connect(url: &str) -> WsStream {
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

/// Read the next text message as JSON.
async fn read_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Read until a message satisfies `pred`, skipping interleaved snapshots.
async fn read_until(ws: &mut WsStream, pred: impl Fn(&Value) -> bool) -> Value {
    loop {
        let msg = read_json(ws).await;
        if pred(&msg) {
            return msg;
        }
    }
}

async fn read_type(ws: &mut WsStream, kind: &str) -> Value {
    read_until(ws, |m| m["type"] == kind).await
}

async fn add_variable(ws: &mut WsStream, name: &str) {
    let req = json!({"type": "ADD_VARIABLE", "variable": name});
    ws.send(Message::text(req.to_string())).await.unwrap();
}

async fn wait_for_sessions(server: &FlightMonitorServer, want: usize) {
    timeout(TIMEOUT, async {
        while server.sessions().count() != want {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session count never settled");
}

#[tokio::test]
async fn subscribe_then_receive_snapshots() {
    let h = boot_server(8).await;
    let mut ws = connect(&h.url).await;

    add_variable(&mut ws, "INDICATED ALTITUDE").await;
    let declared = read_type(&mut ws, "DECLARE_VARIABLE").await;
    assert_eq!(
        declared,
        json!({"type":"DECLARE_VARIABLE","name":"INDICATED ALTITUDE","id":0,"unit":"feet"})
    );

    // Snapshots before the first sample report 0.0
    let snapshot = read_until(&mut ws, |m| {
        m["type"] == "STATE_SNAPSHOT" && m["state"]["0"] == 3500.0
    })
    .await;
    assert_eq!(snapshot["state"].as_object().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_variable_returns_error() {
    let h = boot_server(8).await;
    let mut ws = connect(&h.url).await;

    add_variable(&mut ws, "BOGUS").await;
    let err = read_type(&mut ws, "ERROR").await;
    assert_eq!(err["message"], "Cannot monitor unknown variable BOGUS.");
    assert_eq!(h.server.monitor().active_count(), 0);
}

#[tokio::test]
async fn unknown_message_type_returns_error() {
    let h = boot_server(8).await;
    let mut ws = connect(&h.url).await;

    ws.send(Message::text(r#"{"type":"FOO"}"#)).await.unwrap();
    let err = read_type(&mut ws, "ERROR").await;
    assert_eq!(err["message"], "Cannot execute message of unknown type FOO.");
}

#[tokio::test]
async fn malformed_json_keeps_session_open() {
    let h = boot_server(8).await;
    let mut ws = connect(&h.url).await;

    ws.send(Message::text("{not json")).await.unwrap();
    let err = read_type(&mut ws, "ERROR").await;
    assert!(
        err["message"]
            .as_str()
            .unwrap()
            .starts_with("Malformed JSON message: ")
    );

    ws.send(Message::text(r#"{"variable":"ATC ID"}"#))
        .await
        .unwrap();
    let err = read_type(&mut ws, "ERROR").await;
    assert_eq!(
        err["message"],
        "Malformed message: must contain a key \"type\"."
    );

    add_variable(&mut ws, "ATC ID").await;
    let declared = read_type(&mut ws, "DECLARE_VARIABLE").await;
    assert_eq!(declared["id"], 1);
    assert_eq!(h.server.sessions().count(), 1);
}

#[tokio::test]
async fn binary_utf8_frame_is_handled_as_text() {
    let h = boot_server(8).await;
    let mut ws = connect(&h.url).await;

    let req = json!({"type": "ADD_VARIABLE", "variable": "ATC HEAVY"}).to_string();
    ws.send(Message::binary(req.into_bytes())).await.unwrap();
    let declared = read_type(&mut ws, "DECLARE_VARIABLE").await;
    assert_eq!(declared["name"], "ATC HEAVY");
    assert_eq!(declared["unit"], "Bool");
}

#[tokio::test]
async fn two_clients_share_one_subscription() {
    let h = boot_server(8).await;
    let mut a = connect(&h.url).await;
    let mut b = connect(&h.url).await;

    add_variable(&mut a, "INDICATED ALTITUDE").await;
    let from_a = read_type(&mut a, "DECLARE_VARIABLE").await;
    add_variable(&mut b, "INDICATED ALTITUDE").await;
    let from_b = read_type(&mut b, "DECLARE_VARIABLE").await;
    assert_eq!(from_a, from_b);
    assert_eq!(h.server.monitor().active_count(), 1);

    // Both see the shared variable without subscribing to anything else
    for ws in [&mut a, &mut b] {
        let snap = read_until(ws, |m| {
            m["type"] == "STATE_SNAPSHOT" && m["state"]["0"] == 3500.0
        })
        .await;
        assert_eq!(snap["state"].as_object().unwrap().len(), 1);
    }

    // One request per variable per tick, however many sessions subscribed
    let id = h.server.monitor().active_variables()[0].id;
    let ticks_before = h.source.request_count(id);
    tokio::time::sleep(Duration::from_millis(200)).await;
    let issued = h.source.request_count(id) - ticks_before;
    assert!(issued <= 15, "expected about 10 requests, got {issued}");
}

#[tokio::test]
async fn snapshots_cover_whole_active_set() {
    let h = boot_server(8).await;
    let mut a = connect(&h.url).await;
    let mut b = connect(&h.url).await;

    add_variable(&mut a, "INDICATED ALTITUDE").await;
    let _ = read_type(&mut a, "DECLARE_VARIABLE").await;
    add_variable(&mut b, "ATC ID").await;
    let _ = read_type(&mut b, "DECLARE_VARIABLE").await;

    let snap = read_until(&mut a, |m| {
        m["type"] == "STATE_SNAPSHOT" && m["state"].as_object().is_some_and(|s| s.len() == 2)
    })
    .await;
    assert!(snap["state"]["1"].is_string());
}

#[tokio::test]
async fn peer_close_removes_session() {
    let h = boot_server(8).await;
    let mut ws = connect(&h.url).await;
    wait_for_sessions(&h.server, 1).await;

    ws.close(None).await.unwrap();
    wait_for_sessions(&h.server, 0).await;
}

#[tokio::test]
async fn peer_close_is_acknowledged() {
    let h = boot_server(8).await;
    let mut ws = connect(&h.url).await;
    add_variable(&mut ws, "INDICATED ALTITUDE").await;
    let _ = read_type(&mut ws, "DECLARE_VARIABLE").await;

    ws.close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "bye".into(),
    }))
    .await
    .unwrap();

    // Snapshots already in flight may arrive before the reply
    let reply = timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(frame))) => break frame,
                Some(Ok(_)) => {}
                other => panic!("expected a close reply, got {other:?}"),
            }
        }
    })
    .await
    .expect("no close reply");
    let frame = reply.expect("close reply without a status code");
    assert_eq!(frame.code, CloseCode::Normal);
    assert_eq!(frame.reason.as_str(), "bye");
    wait_for_sessions(&h.server, 0).await;
}

#[tokio::test]
async fn dropped_client_removes_session() {
    let h = boot_server(8).await;
    let ws = connect(&h.url).await;
    wait_for_sessions(&h.server, 1).await;

    drop(ws);
    wait_for_sessions(&h.server, 0).await;
}

#[tokio::test]
async fn upgrade_refused_at_capacity() {
    let h = boot_server(1).await;
    let _first = connect(&h.url).await;
    wait_for_sessions(&h.server, 1).await;

    let err = connect_async(h.url.as_str())
        .await
        .err()
        .expect("upgrade should be refused");
    match err {
        tungstenite::Error::Http(resp) => assert_eq!(resp.status(), 503),
        other => panic!("expected 503, got {other}"),
    }
    assert_eq!(h.server.sessions().count(), 1);
}

#[tokio::test]
async fn root_path_also_upgrades() {
    let h = boot_server(8).await;
    let root = h.url.trim_end_matches("/ws").to_string();
    let mut ws = connect(&format!("{root}/")).await;

    add_variable(&mut ws, "TITLE").await;
    let declared = read_type(&mut ws, "DECLARE_VARIABLE").await;
    assert_eq!(declared["id"], 3);
}

#[tokio::test]
async fn shutdown_ends_sessions() {
    let mut h = boot_server(8).await;
    let mut ws = connect(&h.url).await;
    wait_for_sessions(&h.server, 1).await;

    let serve = h.serve.take().unwrap();
    h.server.shutdown_gracefully(vec![serve]).await;
    assert_eq!(h.server.sessions().count(), 0);

    // The client sees the transport end rather than more snapshots
    let ended = timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(_) | Message::Ping(_) | Message::Pong(_))) => {}
                _ => break,
            }
        }
    })
    .await;
    assert!(ended.is_ok());
    assert_eq!(
        h.server.monitor().connection_status(),
        ConnectionStatus::Disconnected
    );
}

#[tokio::test]
async fn many_clients_connect_and_leave() {
    let h = boot_server(64).await;
    let mut tasks = Vec::new();
    for i in 0..16 {
        let url = h.url.clone();
        tasks.push(tokio::spawn(async move {
            let mut ws = connect(&url).await;
            add_variable(&mut ws, "INDICATED ALTITUDE").await;
            let _ = read_type(&mut ws, "DECLARE_VARIABLE").await;
            if i % 2 == 0 {
                ws.close(None).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    wait_for_sessions(&h.server, 0).await;
    assert_eq!(h.server.monitor().active_count(), 1);
}
