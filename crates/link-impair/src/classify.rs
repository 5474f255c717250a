//! Ingress classification and client-address learning.
//!
//! The relay sits between exactly two parties: a fixed loopback destination
//! and one client whose address is learned from the first datagram it sends.
//! Every received datagram is classified relative to those two peers; anyone
//! else is an alien and their traffic is never relayed.

use std::net::SocketAddr;

use crate::packet::Direction;

/// Classification of one received datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingress {
    /// Accepted traffic, with its direction relative to the learned client.
    Link(Direction),
    /// Not relayed: an alien sender, or reverse traffic with no client to
    /// deliver it to. Already logged.
    Discard,
}

/// The two peer addresses of the relayed session.
#[derive(Debug)]
pub struct Endpoints {
    destination: SocketAddr,
    client: Option<SocketAddr>,
}

/// Peers are identified by address and port; flow label and scope id do not
/// participate.
fn same_peer(a: SocketAddr, b: SocketAddr) -> bool {
    a.ip() == b.ip() && a.port() == b.port()
}

impl Endpoints {
    pub fn new(destination: SocketAddr) -> Self {
        Self {
            destination,
            client: None,
        }
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    pub fn client(&self) -> Option<SocketAddr> {
        self.client
    }

    /// Classify a datagram received from `from`, learning the client from
    /// the first sender that is not the destination.
    ///
    /// The destination check comes first, so a client that somehow shares
    /// the destination's address resolves as Reverse, and the destination
    /// itself can never be learned as the client.
    pub fn classify(&mut self, from: SocketAddr) -> Ingress {
        if self.client.is_none() && !same_peer(from, self.destination) {
            // The reverse traffic from the destination has to go somewhere;
            // whoever speaks first is our client for the rest of the run.
            tracing::info!("Remote host is {} [{}]", from.ip(), from.port());
            self.client = Some(from);
        }

        if same_peer(from, self.destination) {
            if self.client.is_none() {
                tracing::warn!(
                    "Received data from the destination before any client appeared, dropping it."
                );
                return Ingress::Discard;
            }
            return Ingress::Link(Direction::Reverse);
        }
        // client is always Some here: it was just learned if it was unset.
        if self.client.is_some_and(|client| same_peer(from, client)) {
            return Ingress::Link(Direction::Forward);
        }
        tracing::warn!(
            "Received data from {} [{}], which is an alien to the connection. Dropping it!",
            from.ip(),
            from.port()
        );
        Ingress::Discard
    }
}
