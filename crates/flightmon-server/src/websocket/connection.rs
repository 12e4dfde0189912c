//! WebSocket client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use flightmon_core::SessionId;
use tokio::sync::mpsc;

/// Session lifecycle. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Upgrade accepted, not yet in the live set.
    Connecting = 0,
    /// In the live set, receiving frames and snapshots.
    Open = 1,
    /// Peer sent a close frame; acknowledging.
    Closing = 2,
    /// Terminal.
    Closed = 3,
}

impl SessionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Represents a connected WebSocket client.
pub struct ClientConnection {
    /// Unique session ID.
    pub id: SessionId,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    state: AtomicU8,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Count of messages dropped due to full channel.
    pub dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection in [`SessionState::Connecting`].
    pub fn new(id: SessionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            tx,
            state: AtomicU8::new(SessionState::Connecting as u8),
            connected_at: Instant::now(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether snapshots should be delivered.
    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// `Connecting → Open`. Returns `false` from any other state.
    pub fn mark_open(&self) -> bool {
        self.transition(SessionState::Connecting, SessionState::Open)
    }

    /// `Open → Closing`. Returns `false` from any other state.
    pub fn mark_closing(&self) -> bool {
        self.transition(SessionState::Open, SessionState::Closing)
    }

    /// Move to `Closed`. Returns `true` only for the caller that performed
    /// the transition.
    pub fn mark_closed(&self) -> bool {
        self.state.swap(SessionState::Closed as u8, Ordering::AcqRel) != SessionState::Closed as u8
    }

    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Send a text message to the client.
    ///
    /// Returns `false` if the channel is full or closed, and increments
    /// the dropped message counter.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection() -> (ClientConnection, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(32);
        (ClientConnection::new(SessionId::new(), tx), rx)
    }

    #[test]
    fn starts_connecting() {
        let (conn, _rx) = make_connection();
        assert_eq!(conn.state(), SessionState::Connecting);
        assert!(!conn.is_open());
    }

    #[test]
    fn lifecycle_moves_forward_only() {
        let (conn, _rx) = make_connection();
        assert!(!conn.mark_closing());
        assert!(conn.mark_open());
        assert!(!conn.mark_open());
        assert!(conn.mark_closing());
        assert_eq!(conn.state(), SessionState::Closing);
        assert!(conn.mark_closed());
        assert!(!conn.mark_open());
        assert_eq!(conn.state(), SessionState::Closed);
    }

    #[test]
    fn mark_closed_wins_once() {
        let (conn, _rx) = make_connection();
        assert!(conn.mark_open());
        assert!(conn.mark_closed());
        assert!(!conn.mark_closed());
    }

    #[tokio::test]
    async fn send_message_success() {
        let (conn, mut rx) = make_connection();
        assert!(conn.send(Arc::new("hello".into())));
        assert_eq!(&*rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn send_to_closed_channel_returns_false() {
        let (conn, rx) = make_connection();
        drop(rx);
        assert!(!conn.send(Arc::new("hello".into())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[tokio::test]
    async fn send_to_full_channel_returns_false() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = ClientConnection::new(SessionId::new(), tx);
        assert!(conn.send(Arc::new("msg1".into())));
        assert!(!conn.send(Arc::new("msg2".into())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn connection_age_increases() {
        let (conn, _rx) = make_connection();
        let age1 = conn.age();
        std::thread::sleep(Duration::from_millis(10));
        assert!(conn.age() > age1);
    }
}
