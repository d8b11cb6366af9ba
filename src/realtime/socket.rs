//! Socket channel
//!
//! Holds a websocket-only Socket.IO connection keyed by the local user
//! identifier and forwards lock events to the mailbox. Connect and
//! disconnect are only logged; the lock state changes solely on events.
//!
//! A connection that stays silent for longer than the server's
//! `pingInterval + pingTimeout` is treated as dead and reconnected. Until the
//! open packet arrives, the API request timeout bounds the wait.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::PauseConfig;
use crate::error::PauseError;
use crate::realtime::command::{LockCommand, LockPublisher, LockSource};
use crate::realtime::engine_io::{self, OpenInfo, Packet};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How a session ended
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Cancelled,
    Dropped,
}

/// Socket.IO lock-command channel for one user
#[derive(Debug, Clone)]
pub struct SocketChannel {
    url: Url,
    lock_event: String,
    reconnect_delay: Duration,
    connect_timeout: Duration,
}

impl SocketChannel {
    pub fn new(config: &PauseConfig, user_id: &str) -> Result<Self, PauseError> {
        let url = engine_io::socket_url(
            config.socket_base_url(),
            &config.api.user_query_key,
            user_id,
        )?;
        Ok(Self {
            url,
            lock_event: config.realtime.lock_event.clone(),
            reconnect_delay: config.realtime.reconnect_delay(),
            connect_timeout: config.api.request_timeout(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Connect, listen and reconnect until `cancel` fires
    pub async fn run(self, publisher: LockPublisher, cancel: CancellationToken) {
        loop {
            let connected = tokio::select! {
                _ = cancel.cancelled() => return,
                result = tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str())) => result,
            };

            match connected {
                Ok(Ok((ws, _))) => {
                    info!(url = %redacted(&self.url), "socket connected");
                    let end = self.session(ws, &publisher, &cancel).await;
                    info!(?end, "socket disconnected");
                    if end == SessionEnd::Cancelled {
                        return;
                    }
                }
                Ok(Err(err)) => {
                    warn!(error = %err, "socket connect failed");
                }
                Err(_) => {
                    warn!(timeout_ms = self.connect_timeout.as_millis() as u64, "socket handshake timed out");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }
    }

    async fn session(
        &self,
        mut ws: WsStream,
        publisher: &LockPublisher,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        let mut idle_limit = self.connect_timeout;
        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = ws.close(None).await;
                    return SessionEnd::Cancelled;
                }
                frame = tokio::time::timeout(idle_limit, ws.next()) => match frame {
                    Ok(frame) => frame,
                    Err(_) => {
                        warn!(idle_ms = idle_limit.as_millis() as u64, "socket silent, assuming dead connection");
                        return SessionEnd::Dropped;
                    }
                },
            };

            let text = match frame {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(_))) | None => return SessionEnd::Dropped,
                Some(Ok(_)) => continue,
                Some(Err(err)) => {
                    warn!(error = %err, "socket read failed");
                    return SessionEnd::Dropped;
                }
            };

            let reply = match engine_io::decode(&text) {
                Ok(packet) => {
                    if let Packet::Open(info) = &packet {
                        if let Some(limit) = liveness_limit(info) {
                            idle_limit = limit;
                        }
                    }
                    self.handle_packet(packet, publisher)
                }
                Err(err) => {
                    debug!(error = %err, "ignoring undecodable frame");
                    Reply::None
                }
            };

            match reply {
                Reply::None => {}
                Reply::Send(frame) => {
                    if let Err(err) = ws.send(Message::Text(frame)).await {
                        warn!(error = %err, "socket write failed");
                        return SessionEnd::Dropped;
                    }
                }
                Reply::Close => {
                    let _ = ws.close(None).await;
                    return SessionEnd::Dropped;
                }
            }
        }
    }

    fn handle_packet(&self, packet: Packet, publisher: &LockPublisher) -> Reply {
        match packet {
            Packet::Open(info) => {
                debug!(sid = %info.sid, ping_interval = info.ping_interval, "engine.io open");
                Reply::Send(engine_io::connect_frame("/"))
            }
            Packet::Ping => Reply::Send(engine_io::PONG.to_string()),
            Packet::Close => Reply::Close,
            Packet::Connect { namespace } => {
                debug!(%namespace, "namespace joined");
                Reply::None
            }
            Packet::ConnectError { namespace, message } => {
                warn!(%namespace, message = message.as_deref().unwrap_or(""), "namespace refused");
                Reply::Close
            }
            Packet::Disconnect { namespace } => {
                debug!(%namespace, "server disconnected namespace");
                Reply::Close
            }
            Packet::Event {
                namespace,
                name,
                args,
            } if name == self.lock_event && namespace == "/" => {
                match args.first().and_then(|payload| LockCommand::from_payload(payload, LockSource::Socket)) {
                    Some(command) => {
                        publisher.publish(command);
                    }
                    None => debug!(event = %name, "ignoring malformed lock payload"),
                }
                Reply::None
            }
            Packet::Event { namespace, name, .. } => {
                debug!(%namespace, event = %name, "ignoring unrelated event");
                Reply::None
            }
            Packet::Pong | Packet::Upgrade | Packet::Noop | Packet::Unhandled(_) => Reply::None,
        }
    }
}

/// Longest silence tolerated once the server announced its ping schedule
fn liveness_limit(info: &OpenInfo) -> Option<Duration> {
    let total = info.ping_interval.saturating_add(info.ping_timeout);
    (total > 0).then(|| Duration::from_millis(total))
}

enum Reply {
    None,
    Send(String),
    Close,
}

/// URL for logs without the user identifier
fn redacted(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::command::{LockMailbox, LockState};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn config_for(addr: std::net::SocketAddr) -> PauseConfig {
        let mut config = PauseConfig::default();
        config.api.base_url = format!("http://{addr}");
        config.realtime.reconnect_delay_secs = 0;
        config
    }

    #[test]
    fn test_channel_url_carries_user() {
        let channel = SocketChannel::new(&PauseConfig::default(), "user_42").unwrap();
        assert_eq!(
            channel.url().as_str(),
            "ws://localhost:3000/socket.io/?EIO=4&transport=websocket&clerkId=user_42"
        );
        assert_eq!(redacted(channel.url()), "ws://localhost:3000/socket.io/");
    }

    #[test]
    fn test_handle_packet_replies() {
        let channel = SocketChannel::new(&PauseConfig::default(), "u").unwrap();
        let mailbox = LockMailbox::default();
        let publisher = mailbox.publisher();

        assert!(matches!(channel.handle_packet(Packet::Ping, &publisher), Reply::Send(f) if f == "3"));
        assert!(matches!(channel.handle_packet(Packet::Close, &publisher), Reply::Close));

        let malformed = Packet::Event {
            namespace: "/".to_string(),
            name: "lock_device".to_string(),
            args: vec![serde_json::json!({"locked": "perhaps"})],
        };
        assert!(matches!(channel.handle_packet(malformed, &publisher), Reply::None));
        assert_eq!(mailbox.state(), LockState::Unlocked);

        // Only the default namespace carries lock commands
        let other_namespace = Packet::Event {
            namespace: "/admin".to_string(),
            name: "lock_device".to_string(),
            args: vec![serde_json::json!({"locked": true})],
        };
        assert!(matches!(channel.handle_packet(other_namespace, &publisher), Reply::None));
        assert_eq!(mailbox.state(), LockState::Unlocked);
    }

    #[test]
    fn test_liveness_limit_from_open() {
        let info = OpenInfo {
            sid: "s".to_string(),
            ping_interval: 25000,
            ping_timeout: 20000,
        };
        assert_eq!(liveness_limit(&info), Some(Duration::from_millis(45000)));

        let unset = OpenInfo {
            sid: "s".to_string(),
            ping_interval: 0,
            ping_timeout: 0,
        };
        assert_eq!(liveness_limit(&unset), None);
    }

    #[tokio::test]
    async fn test_lock_event_reaches_mailbox() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text(
                r#"0{"sid":"s1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#.to_string(),
            ))
            .await
            .unwrap();

            // Client joins the default namespace
            let join = ws.next().await.unwrap().unwrap();
            assert_eq!(join, Message::Text("40".to_string()));
            ws.send(Message::Text(r#"40{"sid":"n1"}"#.to_string())).await.unwrap();

            ws.send(Message::Text("2".to_string())).await.unwrap();
            let pong = ws.next().await.unwrap().unwrap();
            assert_eq!(pong, Message::Text("3".to_string()));

            ws.send(Message::Text(r#"42["other_event",{"locked":true}]"#.to_string()))
                .await
                .unwrap();
            ws.send(Message::Text(r#"42["lock_device",{"locked":true}]"#.to_string()))
                .await
                .unwrap();

            // Keep the connection open until the client goes away
            while let Some(Ok(_)) = ws.next().await {}
        });

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mailbox = LockMailbox::with_callback(LockState::Unlocked, move |locked| {
            sink.lock().unwrap().push(locked);
        });
        let mut rx = mailbox.subscribe();

        let cancel = CancellationToken::new();
        let channel = SocketChannel::new(&config_for(addr), "user_42").unwrap();
        let task = tokio::spawn(channel.run(mailbox.publisher(), cancel.clone()));

        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("lock event not delivered")
            .unwrap();
        assert_eq!(mailbox.state(), LockState::Locked);
        assert_eq!(*seen.lock().unwrap(), vec![true]);

        cancel.cancel();
        task.await.unwrap();
        server.await.unwrap();
    }

    /// Accept websocket clients forever, reporting each new connection
    async fn accept_loop<F, Fut>(listener: TcpListener, connections: tokio::sync::mpsc::UnboundedSender<usize>, serve: F)
    where
        F: Fn(usize, WebSocketStream<TcpStream>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut count = 0;
        while let Ok((stream, _)) = listener.accept().await {
            count += 1;
            let _ = connections.send(count);
            let Ok(ws) = accept_async(stream).await else {
                continue;
            };
            tokio::spawn(serve(count, ws));
        }
    }

    async fn open_and_join(ws: &mut WebSocketStream<TcpStream>, open: &str) {
        ws.send(Message::Text(open.to_string())).await.unwrap();
        let join = ws.next().await.unwrap().unwrap();
        assert_eq!(join, Message::Text("40".to_string()));
    }

    #[tokio::test]
    async fn test_reconnects_after_server_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (conn_tx, mut conn_rx) = tokio::sync::mpsc::unbounded_channel();

        let server = tokio::spawn(accept_loop(listener, conn_tx, |n, mut ws| async move {
            open_and_join(&mut ws, r#"0{"sid":"s","pingInterval":25000,"pingTimeout":20000}"#).await;
            if n == 1 {
                let _ = ws.close(None).await;
                return;
            }
            ws.send(Message::Text(r#"42["lock_device",{"locked":true}]"#.to_string()))
                .await
                .unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        }));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mailbox = LockMailbox::with_callback(LockState::Unlocked, move |locked| {
            sink.lock().unwrap().push(locked);
        });
        let mut rx = mailbox.subscribe();

        let cancel = CancellationToken::new();
        let channel = SocketChannel::new(&config_for(addr), "user_42").unwrap();
        let task = tokio::spawn(channel.run(mailbox.publisher(), cancel.clone()));

        tokio::time::timeout(Duration::from_secs(3), rx.changed())
            .await
            .expect("lock event not delivered after reconnect")
            .unwrap();
        assert_eq!(mailbox.state(), LockState::Locked);
        assert_eq!(*seen.lock().unwrap(), vec![true]);

        let mut connections = 0;
        while let Ok(n) = conn_rx.try_recv() {
            connections = n;
        }
        assert_eq!(connections, 2);

        cancel.cancel();
        task.await.unwrap();
        server.abort();
    }

    #[tokio::test]
    async fn test_silent_server_is_reconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (conn_tx, mut conn_rx) = tokio::sync::mpsc::unbounded_channel();

        // Advertise a 200 ms liveness window, then never send anything again
        let server = tokio::spawn(accept_loop(listener, conn_tx, |_, mut ws| async move {
            open_and_join(&mut ws, r#"0{"sid":"s","pingInterval":100,"pingTimeout":100}"#).await;
            while let Some(Ok(_)) = ws.next().await {}
        }));

        let cancel = CancellationToken::new();
        let channel = SocketChannel::new(&config_for(addr), "user_42").unwrap();
        let task = tokio::spawn(channel.run(LockMailbox::default().publisher(), cancel.clone()));

        let second = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match conn_rx.recv().await {
                    Some(n) if n >= 2 => return n,
                    Some(_) => continue,
                    None => return 0,
                }
            }
        })
        .await
        .expect("silent connection was never replaced");
        assert!(second >= 2);

        cancel.cancel();
        task.await.unwrap();
        server.abort();
    }

    #[tokio::test]
    async fn test_stalled_handshake_is_retried() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Accept TCP but never answer the websocket upgrade
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            let mut count = 0;
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
                count += 1;
                if count == 2 {
                    return count;
                }
            }
            count
        });

        let mut config = config_for(addr);
        config.api.request_timeout_secs = 1;
        let cancel = CancellationToken::new();
        let channel = SocketChannel::new(&config, "user_42").unwrap();
        let task = tokio::spawn(channel.run(LockMailbox::default().publisher(), cancel.clone()));

        let accepted = tokio::time::timeout(Duration::from_secs(4), server)
            .await
            .expect("stalled handshake was never retried")
            .unwrap();
        assert_eq!(accepted, 2);

        cancel.cancel();
        task.await.unwrap();
    }
}
