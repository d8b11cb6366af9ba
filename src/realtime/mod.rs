//! Realtime lock-command pipeline
//!
//! Two independent channels deliver the same logical event ("set device lock
//! to X"): a Socket.IO websocket and push-notification data. Both publish into
//! one single-slot [`LockMailbox`]. Duplicate delivery across channels is not
//! deduplicated; the latest command wins.
//!
//! Pipeline: socket frame / push payload → [`LockCommand`] → mailbox → UI

pub mod command;
pub mod engine_io;
pub mod listener;
pub mod push;
pub mod socket;

pub use command::{
    coerce_locked, LockCallback, LockCommand, LockMailbox, LockPublisher, LockSource, LockState,
};
pub use listener::RealtimeListener;
pub use push::{PushEvent, PushInbox, LOCK_COMMAND_MARKER};
pub use socket::SocketChannel;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PauseConfig;
    use futures_util::{SinkExt, StreamExt};
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::Message;

    /// Socket sends `{locked:true}`, then a push `{cmd:"lock_device", locked:"false"}`
    /// arrives: the callback sees true then false.
    #[tokio::test]
    async fn test_socket_then_push_sequence() {
        let server_socket = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = server_socket.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = server_socket.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text(r#"0{"sid":"s1","pingInterval":25000,"pingTimeout":20000}"#.to_string()))
                .await
                .unwrap();
            let _join = ws.next().await;
            ws.send(Message::Text(r#"42["lock_device",{"locked":true}]"#.to_string()))
                .await
                .unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mailbox = LockMailbox::with_callback(LockState::Unlocked, move |locked| {
            sink.lock().unwrap().push(locked);
        });
        let mut rx = mailbox.subscribe();

        let mut config = PauseConfig::default();
        config.api.base_url = format!("http://{addr}");
        let mut listener = RealtimeListener::new(config, mailbox.publisher());
        listener.bind("user_42").unwrap();

        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("socket command not delivered")
            .unwrap();
        assert_eq!(mailbox.state(), LockState::Locked);

        listener
            .push_inbox()
            .deliver(PushEvent::Received(json!({"cmd": "lock_device", "locked": "false"})));
        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("push command not delivered")
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
        assert_eq!(mailbox.state(), LockState::Unlocked);

        listener.shutdown().await;
        server.await.unwrap();
    }
}
