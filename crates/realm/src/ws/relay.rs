//! Tag interpreter for inbound frames.

use realm_protocol::{Frame, ProtocolError, Tag};
use tracing::{debug, info};

use super::registry::ConnectionRegistry;

/// What the relay did with a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Zero-length frame, ignored.
    Empty,
    /// `!` heartbeat, logged only.
    Heartbeat,
    /// `~` frame forwarded as `.` to this many other connections.
    Relayed { delivered: usize },
    /// `.` plain message, logged only.
    Plain,
    /// Unrecognized tag, dropped.
    Unknown(ProtocolError),
}

/// Interpret one inbound frame from `sender`.
///
/// Never fails: unknown tags are logged at debug and dropped, and the
/// connection stays open. The peer client's `ping` keepalive lands here once
/// a second per peer.
pub async fn handle_frame(registry: &ConnectionRegistry, sender: &str, frame: Frame) -> RelayOutcome {
    match frame.tag() {
        Ok(None) => RelayOutcome::Empty,
        Ok(Some(Tag::Heartbeat)) => {
            debug!("Heartbeat received");
            RelayOutcome::Heartbeat
        }
        Ok(Some(Tag::Rebroadcast)) => {
            let frame = frame.retag(Tag::Plain);
            let delivered = registry.relay_except(sender, &frame).await;
            debug!(delivered, "Rebroadcast relayed");
            RelayOutcome::Relayed { delivered }
        }
        Ok(Some(Tag::Plain)) => {
            info!(message = %frame.display(), "Message received");
            RelayOutcome::Plain
        }
        Err(e) => {
            debug!(error = %e, message = %frame.display(), "Unknown message received");
            RelayOutcome::Unknown(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::connection::{ConnectionHandle, DEFAULT_SEND_TIMEOUT, Outbound};
    use crate::ws::types::ConnectedUser;
    use tokio::sync::mpsc;

    fn connect(registry: &ConnectionRegistry, id: &str) -> mpsc::Receiver<Outbound> {
        let (handle, rx) = ConnectionHandle::new(16, DEFAULT_SEND_TIMEOUT);
        registry.register(ConnectedUser::new(id, "anonymous", handle));
        rx
    }

    fn received(rx: &mut mpsc::Receiver<Outbound>) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(item) = rx.try_recv() {
            if let Outbound::Frame(frame) = item {
                frames.push(frame);
            }
        }
        frames
    }

    #[tokio::test]
    async fn test_rebroadcast_scenario() {
        let registry = ConnectionRegistry::new();
        let mut a = connect(&registry, "A");
        let mut b = connect(&registry, "B");
        let mut c = connect(&registry, "C");

        let outcome = handle_frame(&registry, "A", Frame::from("~hello")).await;
        assert_eq!(outcome, RelayOutcome::Relayed { delivered: 2 });

        assert!(received(&mut a).is_empty());
        assert_eq!(received(&mut b), vec![Frame::from(".hello")]);
        assert_eq!(received(&mut c), vec![Frame::from(".hello")]);
    }

    #[tokio::test]
    async fn test_rebroadcast_binary_frame() {
        let registry = ConnectionRegistry::new();
        let _a = connect(&registry, "A");
        let mut b = connect(&registry, "B");

        handle_frame(&registry, "A", Frame::from(vec![b'~', 1, 2, 3])).await;
        assert_eq!(received(&mut b), vec![Frame::from(vec![b'.', 1, 2, 3])]);
    }

    #[tokio::test]
    async fn test_non_relaying_tags_write_nothing() {
        let registry = ConnectionRegistry::new();
        let mut a = connect(&registry, "A");
        let mut b = connect(&registry, "B");

        for (frame, expected) in [
            ("!", RelayOutcome::Heartbeat),
            ("!still alive", RelayOutcome::Heartbeat),
            (".just me", RelayOutcome::Plain),
            ("", RelayOutcome::Empty),
            ("ping", RelayOutcome::Unknown(ProtocolError::UnknownTag(b'p'))),
        ] {
            assert_eq!(handle_frame(&registry, "A", Frame::from(frame)).await, expected);
        }

        assert!(received(&mut a).is_empty());
        assert!(received(&mut b).is_empty());
        assert_eq!(registry.len(), 2);
    }

    /// In-memory log sink for asserting on emitted events.
    #[derive(Clone, Default)]
    struct CapturedLogs(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_client_keepalive_does_not_warn() {
        use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt};

        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(move || writer.clone()),
            )
            .with(LevelFilter::WARN);
        let _guard = tracing::subscriber::set_default(subscriber);

        let registry = ConnectionRegistry::new();
        let _a = connect(&registry, "A");
        for _ in 0..3 {
            let outcome =
                handle_frame(&registry, "A", Frame::from(crate::client::HEARTBEAT_PAYLOAD)).await;
            assert!(matches!(outcome, RelayOutcome::Unknown(_)));
        }

        assert!(logs.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rebroadcast_alone() {
        let registry = ConnectionRegistry::new();
        let mut a = connect(&registry, "A");

        let outcome = handle_frame(&registry, "A", Frame::from("~")).await;
        assert_eq!(outcome, RelayOutcome::Relayed { delivered: 0 });
        assert!(received(&mut a).is_empty());
    }
}
