//! Disconnect signal shared between a connection and the registry.

use std::sync::Arc;

use tokio::sync::watch;

/// Handle to one client transport connection.
///
/// Cloning yields another handle to the same connection. Closing is one-way.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    state: Arc<watch::Sender<bool>>,
}

impl ConnectionHandle {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    /// Ask the connection to terminate.
    pub fn close(&self) {
        self.state.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once [`close`](Self::close) has been called on any clone.
    pub async fn closed(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|closed| *closed).await.map(|_| ());
    }
}

impl Default for ConnectionHandle {
    fn default() -> Self {
        Self::new()
    }
}
