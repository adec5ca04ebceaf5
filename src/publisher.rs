//! UDP multicast publisher used by the test feed producer.

use std::net::{Ipv4Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, info};

use crate::error::FeedError;

/// Sends datagrams to one multicast group.
#[derive(Debug)]
pub struct MulticastPublisher {
    socket: UdpSocket,
    target: SocketAddr,
}

impl MulticastPublisher {
    /// Open a sender for `target` going out through `interface`.
    ///
    /// Loopback is enabled so receivers on the same host see the feed.
    /// Must be called from within a Tokio runtime.
    pub fn open(target: SocketAddr, interface: Ipv4Addr, ttl: u32) -> Result<Self, FeedError> {
        let local = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
        let bind_err = |source| FeedError::Bind { addr: local, source };

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(bind_err)?;
        socket.set_reuse_address(true).map_err(bind_err)?;
        if let SocketAddr::V4(v4) = target {
            if v4.ip().is_multicast() {
                socket.set_multicast_loop_v4(true).map_err(bind_err)?;
                socket.set_multicast_ttl_v4(ttl).map_err(bind_err)?;
                socket.set_multicast_if_v4(&interface).map_err(bind_err)?;
            }
        }
        socket.bind(&local.into()).map_err(bind_err)?;
        socket.set_nonblocking(true).map_err(bind_err)?;

        let socket = UdpSocket::from_std(socket.into()).map_err(bind_err)?;
        info!(dest = %target, interface = %interface, ttl, "Publisher ready");
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub async fn send(&self, payload: &[u8]) -> Result<usize, FeedError> {
        let sent = self
            .socket
            .send_to(payload, self.target)
            .await
            .map_err(FeedError::Send)?;
        if sent != payload.len() {
            debug!(sent, expected = payload.len(), "Partial datagram sent");
        }
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::MessageBuilder;

    #[tokio::test]
    async fn test_unicast_send() {
        let receiver = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let target = receiver.local_addr().unwrap();

        let publisher = MulticastPublisher::open(target, Ipv4Addr::LOCALHOST, 1).unwrap();
        assert_eq!(publisher.target(), target);

        let msg = MessageBuilder::default().quote("ESZ5", 1.0, 1, 2.0, 1);
        let sent = publisher.send(&msg).await.unwrap();
        assert_eq!(sent, msg.len());

        let mut buf = [0u8; 512];
        let len = receiver.recv(&mut buf).unwrap();
        assert_eq!(&buf[..len], msg.as_slice());
    }
}
