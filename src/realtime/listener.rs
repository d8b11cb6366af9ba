//! Realtime command listener
//!
//! Binds both lock-command channels to one user identifier. Rebinding to a
//! different identifier tears the old channels down first, so no connection
//! outlives the identifier it was opened for.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::PauseConfig;
use crate::error::PauseError;
use crate::realtime::command::LockPublisher;
use crate::realtime::push::{run_push_channel, PushInbox};
use crate::realtime::socket::SocketChannel;

struct Binding {
    user_id: String,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Owner of the socket and push channels for the current user
pub struct RealtimeListener {
    config: PauseConfig,
    publisher: LockPublisher,
    inbox: PushInbox,
    binding: Option<Binding>,
}

impl RealtimeListener {
    pub fn new(config: PauseConfig, publisher: LockPublisher) -> Self {
        Self {
            config,
            publisher,
            inbox: PushInbox::new(),
            binding: None,
        }
    }

    /// Inbox the host feeds with push payloads
    pub fn push_inbox(&self) -> PushInbox {
        self.inbox.clone()
    }

    pub fn bound_user(&self) -> Option<&str> {
        self.binding.as_ref().map(|b| b.user_id.as_str())
    }

    /// Establish both channels for `user_id`. Must run inside a tokio
    /// runtime. Binding the already-bound user is a no-op.
    pub fn bind(&mut self, user_id: &str) -> Result<(), PauseError> {
        if user_id.is_empty() {
            return Err(PauseError::InvalidPayload("empty user id".to_string()));
        }
        if self.bound_user() == Some(user_id) {
            return Ok(());
        }

        let socket = SocketChannel::new(&self.config, user_id)?;
        self.unbind();

        let cancel = CancellationToken::new();
        let push_rx = self.inbox.attach();
        let tasks = vec![
            tokio::spawn(socket.run(self.publisher.clone(), cancel.clone())),
            tokio::spawn(run_push_channel(
                push_rx,
                self.publisher.clone(),
                cancel.clone(),
            )),
        ];

        info!(user_id, "realtime listener bound");
        self.binding = Some(Binding {
            user_id: user_id.to_string(),
            cancel,
            tasks,
        });
        Ok(())
    }

    /// Disconnect the socket and remove the push listeners
    pub fn unbind(&mut self) {
        if let Some(binding) = self.binding.take() {
            binding.cancel.cancel();
            self.inbox.detach();
            info!(user_id = %binding.user_id, "realtime listener unbound");
        }
    }

    /// Unbind and wait for both channel tasks to exit
    pub async fn shutdown(mut self) {
        if let Some(binding) = self.binding.take() {
            binding.cancel.cancel();
            self.inbox.detach();
            for task in binding.tasks {
                let _ = task.await;
            }
        }
    }
}

impl Drop for RealtimeListener {
    fn drop(&mut self) {
        self.unbind();
    }
}
