use super::EditTransport;
use crate::types::ServerId;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

/// A packet bound for one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPacket {
    pub server: ServerId,
    pub packet: Bytes,
}

/// [`EditTransport`] that forwards packets over an unbounded channel to
/// whatever task owns the socket.
#[derive(Debug)]
pub struct ChannelTransport {
    sender: mpsc::UnboundedSender<OutboundPacket>,
    clock_skews: DashMap<ServerId, i64>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundPacket>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender,
                clock_skews: DashMap::new(),
            },
            receiver,
        )
    }

    /// Updates the clock offset estimate for `server`.
    pub fn set_clock_skew(&self, server: ServerId, skew_usec: i64) {
        self.clock_skews.insert(server, skew_usec);
    }
}

impl EditTransport for ChannelTransport {
    fn enqueue(&self, server: ServerId, packet: Bytes) {
        if self.sender.send(OutboundPacket { server, packet }).is_err() {
            debug!(%server, "Outbound channel closed, dropping packet");
        }
    }

    fn clock_skew_usec(&self, server: ServerId) -> i64 {
        self.clock_skews.get(&server).map(|skew| *skew).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_forwards_packets_and_skews() {
        let (transport, mut receiver) = ChannelTransport::new();
        let server = ServerId::new();
        transport.set_clock_skew(server, -250);

        transport.enqueue(server, Bytes::from_static(b"edit"));
        let outbound = receiver.recv().await.unwrap();
        assert_eq!(outbound.server, server);
        assert_eq!(outbound.packet, Bytes::from_static(b"edit"));

        assert_eq!(transport.clock_skew_usec(server), -250);
        assert_eq!(transport.clock_skew_usec(ServerId::new()), 0);
    }
}
