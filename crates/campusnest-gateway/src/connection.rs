use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, trace, warn};
use uuid::Uuid;

use campusnest_types::events::{ChannelCommand, LiveEvent};

use crate::registry::ConnectionRegistry;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Upper bound on a single socket write. A peer that cannot absorb a frame
/// within this window is treated as gone.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Close reason sent when the registry releases a connection, either
/// because a newer connection for the same user replaced it or because a
/// dispatch found it stalled.
const SERVER_CLOSE_REASON: &str = "connection closed by server";

/// Receives the commands a client sends over its live connection.
pub trait CommandHandler: Send + Sync + 'static {
    fn handle_command(
        &self,
        user_id: Uuid,
        cmd: ChannelCommand,
    ) -> impl Future<Output = ()> + Send;
}

/// Serve one authenticated WebSocket until either side goes away.
///
/// The connection is registered before anything is written and the
/// registration guard lives on this stack frame, so every exit path
/// (clean close, protocol error, heartbeat timeout, supersession) runs the
/// unregister exactly once.
pub async fn handle_connection<H: CommandHandler>(
    socket: WebSocket,
    registry: ConnectionRegistry,
    handler: Arc<H>,
    user_id: Uuid,
    name: String,
) {
    let (mut sender, receiver) = socket.split();
    let (registration, events) = registry.connect(user_id);

    info!(
        "{} ({}) connected, connection {}",
        name,
        user_id,
        registration.conn_id()
    );

    if !write_event(&mut sender, &LiveEvent::Ready { user_id }).await {
        warn!("{} ({}) dropped before ready", name, user_id);
        return;
    }

    run_connection_loop(sender, receiver, events, handler, user_id, &name).await;

    drop(registration);
    info!("{} ({}) disconnected", name, user_id);
}

async fn run_connection_loop<H: CommandHandler>(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut events: mpsc::Receiver<LiveEvent>,
    handler: Arc<H>,
    user_id: Uuid,
    name: &str,
) {
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward queued live events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        // The registry let go of this handle: superseded or stalled
                        let close = Message::Close(Some(CloseFrame {
                            code: close_code::AWAY,
                            reason: SERVER_CLOSE_REASON.into(),
                        }));
                        write_frame(&mut sender, close).await;
                        break;
                    };

                    if !write_event(&mut sender, &event).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if !write_frame(&mut sender, Message::Ping(vec![].into())).await {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let name_recv = name.to_string();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ChannelCommand>(&text) {
                    Ok(cmd) => {
                        trace!("{} ({}) command {:?}", name_recv, user_id, cmd);
                        handler.handle_command(user_id, cmd).await;
                    }
                    Err(e) => {
                        let raw: String = text.chars().take(200).collect();
                        warn!("{} ({}) bad frame: {} -- raw: {}", name_recv, user_id, e, raw);
                    }
                },
                Message::Binary(data) => {
                    warn!(
                        "{} ({}) sent unsupported binary frame ({} bytes)",
                        name_recv,
                        user_id,
                        data.len()
                    );
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

/// Serialize and write one event. Returns false if the socket is unusable.
async fn write_event(sender: &mut SplitSink<WebSocket, Message>, event: &LiveEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(text) => write_frame(sender, Message::Text(text.into())).await,
        Err(e) => {
            warn!("Failed to encode {} event: {}", event.kind(), e);
            true
        }
    }
}

async fn write_frame(sender: &mut SplitSink<WebSocket, Message>, msg: Message) -> bool {
    matches!(
        tokio::time::timeout(WRITE_TIMEOUT, sender.send(msg)).await,
        Ok(Ok(()))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Delivery;
    use axum::{
        Router,
        extract::{Path, State, WebSocketUpgrade},
        response::Response,
        routing::get,
    };
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    struct Recorder(mpsc::UnboundedSender<(Uuid, ChannelCommand)>);

    impl CommandHandler for Recorder {
        async fn handle_command(&self, user_id: Uuid, cmd: ChannelCommand) {
            let _ = self.0.send((user_id, cmd));
        }
    }

    #[derive(Clone)]
    struct Server {
        registry: ConnectionRegistry,
        handler: Arc<Recorder>,
    }

    async fn upgrade(
        State(server): State<Server>,
        Path(user_id): Path<Uuid>,
        ws: WebSocketUpgrade,
    ) -> Response {
        ws.on_upgrade(move |socket| {
            handle_connection(socket, server.registry, server.handler, user_id, "tester".into())
        })
    }

    async fn serve(
        registry: ConnectionRegistry,
    ) -> (String, mpsc::UnboundedReceiver<(Uuid, ChannelCommand)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = Router::new().route("/ws/{user_id}", get(upgrade)).with_state(Server {
            registry,
            handler: Arc::new(Recorder(tx)),
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("ws://{}/ws", addr), rx)
    }

    async fn open(base: &str, user_id: Uuid) -> Client {
        let (ws, _) = connect_async(format!("{}/{}", base, user_id)).await.unwrap();
        ws
    }

    async fn next_frame(ws: &mut Client) -> WsMessage {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("stream ended")
                .expect("socket error");
            if !matches!(frame, WsMessage::Ping(_) | WsMessage::Pong(_)) {
                return frame;
            }
        }
    }

    async fn next_event(ws: &mut Client) -> LiveEvent {
        match next_frame(ws).await {
            WsMessage::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected an event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn connect_sends_ready_and_forwards_both_ways() {
        let registry = ConnectionRegistry::new();
        let (base, mut commands) = serve(registry.clone()).await;
        let user = Uuid::new_v4();
        let peer = Uuid::new_v4();

        let mut ws = open(&base, user).await;
        assert_eq!(next_event(&mut ws).await, LiveEvent::Ready { user_id: user });
        assert!(registry.is_connected(user));

        let typing = LiveEvent::Typing {
            user_id: peer,
            is_typing: true,
        };
        assert_eq!(registry.dispatch(user, typing.clone()).await, Delivery::Delivered);
        assert_eq!(next_event(&mut ws).await, typing);

        // A malformed frame is skipped and the connection stays usable
        ws.send(WsMessage::Text("{not json".into())).await.unwrap();
        let cmd = serde_json::json!({ "type": "typing", "recipient_id": peer, "is_typing": false });
        ws.send(WsMessage::Text(cmd.to_string().into())).await.unwrap();

        let (from, received) = tokio::time::timeout(Duration::from_secs(5), commands.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(from, user);
        assert_eq!(
            received,
            ChannelCommand::Typing {
                recipient_id: peer,
                is_typing: false,
            }
        );
    }

    #[tokio::test]
    async fn superseded_connection_is_closed_and_new_one_kept() {
        let registry = ConnectionRegistry::new();
        let (base, _commands) = serve(registry.clone()).await;
        let user = Uuid::new_v4();

        let mut first = open(&base, user).await;
        next_event(&mut first).await;
        let first_conn = registry.connection_id(user);

        let mut second = open(&base, user).await;
        assert_eq!(next_event(&mut second).await, LiveEvent::Ready { user_id: user });

        match next_frame(&mut first).await {
            WsMessage::Close(Some(frame)) => assert_eq!(frame.reason.as_str(), SERVER_CLOSE_REASON),
            other => panic!("expected close, got {:?}", other),
        }

        // The old loop's guard must not evict the replacement
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(registry.is_connected(user));
        assert_ne!(registry.connection_id(user), first_conn);

        let event = LiveEvent::Typing {
            user_id: Uuid::new_v4(),
            is_typing: true,
        };
        assert_eq!(registry.dispatch(user, event.clone()).await, Delivery::Delivered);
        assert_eq!(next_event(&mut second).await, event);
    }

    #[tokio::test]
    async fn peer_close_unregisters() {
        let registry = ConnectionRegistry::new();
        let (base, _commands) = serve(registry.clone()).await;
        let user = Uuid::new_v4();

        let mut ws = open(&base, user).await;
        next_event(&mut ws).await;
        assert_eq!(registry.len(), 1);

        ws.close(None).await.unwrap();

        let gone = tokio::time::timeout(Duration::from_secs(5), async {
            while registry.is_connected(user) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(gone.is_ok(), "registry entry survived the peer close");
        assert!(registry.is_empty());
        assert_eq!(
            registry.dispatch(user, LiveEvent::Ready { user_id: user }).await,
            Delivery::Offline
        );
    }
}
