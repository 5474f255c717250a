//! The relay proper: one socket, one queue, one loop.
//!
//! `Relay` owns everything the event loop touches: socket, endpoints,
//! deferred-packet queue, RNG, cached clock and counters. Each iteration
//! waits for the socket or the earliest deadline, refreshes the cached time
//! once, drains every expired deferral, then accepts at most one incoming
//! datagram. Due deferrals are never starved by ingress.

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io;
use std::net::UdpSocket;

use crate::classify::{Endpoints, Ingress};
use crate::clock;
use crate::heap::MinHeap;
use crate::net::{self, Readiness};
use crate::packet::{seq, DeferredPacket, Direction, MAX_PKT_LEN, MIN_PKT_LEN};
use crate::pipeline::{apply_link, LinkProfile, Verdict};
use crate::stats::RelayStats;

/// Everything the relay needs to come up, immutable after startup.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub listen_port: u16,
    pub forward_port: u16,
    pub profile: LinkProfile,
    pub seed: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_port: 1341,
            forward_port: 12345,
            profile: LinkProfile::default(),
            seed: 0,
        }
    }
}

/// Outcome of one egress attempt.
enum SendStatus {
    Sent,
    /// Send buffer full or interrupted; worth retrying on a later wake.
    Retry,
    /// Reverse traffic with no learned client; nothing to retry.
    Unroutable,
}

/// Strict deadline ordering for the deferred-packet queue. Ties resolve
/// arbitrarily.
fn earlier_deadline(a: &DeferredPacket, b: &DeferredPacket) -> bool {
    a.deadline_us < b.deadline_us
}

type PacketQueue = MinHeap<DeferredPacket, fn(&DeferredPacket, &DeferredPacket) -> bool>;

pub struct Relay {
    socket: UdpSocket,
    endpoints: Endpoints,
    profile: LinkProfile,
    queue: PacketQueue,
    rng: StdRng,
    /// Clock cache, refreshed once per iteration; deadline arithmetic and
    /// expiry checks within an iteration share this time base.
    now_us: u64,
    stats: RelayStats,
}

impl Relay {
    /// Bind the relay socket and assemble the run state.
    pub fn bind(config: &RelayConfig) -> Result<Self> {
        let socket = net::bind_relay_socket(config.listen_port)?;
        Ok(Self {
            socket,
            endpoints: Endpoints::new(net::destination_addr(config.forward_port)),
            profile: config.profile.clone(),
            queue: MinHeap::new(earlier_deadline as fn(&DeferredPacket, &DeferredPacket) -> bool),
            rng: StdRng::seed_from_u64(u64::from(config.seed)),
            now_us: clock::now_us(),
            stats: RelayStats::default(),
        })
    }

    /// The bound listen port; useful when the config asked for port 0.
    pub fn local_port(&self) -> Result<u16> {
        Ok(self
            .socket
            .local_addr()
            .context("cannot read the relay socket address")?
            .port())
    }

    /// Deferred packets still waiting for their deadline.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    /// Run the relay until a fatal error. There is no clean return: the loop
    /// is infinite by design, and whatever is still queued when it breaks is
    /// discarded by the caller.
    pub fn run(&mut self) -> Result<()> {
        loop {
            match net::wait_readable(&self.socket, self.queue_timeout_ms())? {
                // A signal cut the wait short; redo it with a fresh timeout.
                Readiness::Interrupted => continue,
                readiness => {
                    self.now_us = clock::now_us();
                    self.flush_due()?;
                    if readiness == Readiness::Readable {
                        self.process_ingress()?;
                    }
                }
            }
        }
    }

    /// How long the wait may block: indefinitely with nothing queued,
    /// otherwise until the earliest deadline, but at least 1 ms, so a full
    /// send buffer cannot turn an overdue head into a busy loop.
    fn queue_timeout_ms(&self) -> Option<u64> {
        let head = self.queue.peek()?;
        Some(clock::millis_until(head.deadline_us, self.now_us).max(1))
    }

    /// Send every queued packet whose deadline has expired.
    fn flush_due(&mut self) -> Result<()> {
        loop {
            let status = match self.queue.peek() {
                Some(pkt) if pkt.deadline_us <= self.now_us => {
                    send_toward(&self.socket, &self.endpoints, pkt.direction, &pkt.payload)?
                }
                _ => break,
            };
            match status {
                // Head stays put; the 1 ms wait floor guarantees another try.
                SendStatus::Retry => break,
                SendStatus::Sent => {
                    self.stats.relayed += 1;
                    self.queue.pop();
                }
                SendStatus::Unroutable => {
                    self.queue.pop();
                }
            }
        }
        Ok(())
    }

    /// Receive and process at most one datagram.
    fn process_ingress(&mut self) -> Result<()> {
        let mut buf = [0u8; MAX_PKT_LEN];
        let (len, from) = match self.socket.recv_from(&mut buf) {
            Ok(received) => received,
            // Spurious readiness or a signal; nothing to do this tick.
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                return Ok(())
            }
            Err(err) => return Err(err).context("recv on the relay socket failed"),
        };
        self.stats.received += 1;

        let direction = match self.endpoints.classify(from) {
            Ingress::Link(direction) => direction,
            Ingress::Discard => {
                self.stats.rejected += 1;
                return Ok(());
            }
        };

        if len < MIN_PKT_LEN {
            tracing::warn!("Received malformed data, dropping. (len {len} < {MIN_PKT_LEN})");
            self.stats.malformed += 1;
            return Ok(());
        }

        // Traffic on an unimpaired direction is relayed untouched.
        if !self.profile.mask.covers(direction) {
            match send_toward(&self.socket, &self.endpoints, direction, &buf[..len])? {
                SendStatus::Sent => self.stats.passed_through += 1,
                SendStatus::Retry => {
                    tracing::warn!("Send buffer full, dropping an immediate packet.");
                    self.stats.send_buffer_drops += 1;
                }
                SendStatus::Unroutable => {}
            }
            return Ok(());
        }

        match apply_link(
            buf[..len].to_vec(),
            direction,
            self.now_us,
            &self.profile,
            &mut self.rng,
            &mut self.stats,
        ) {
            Verdict::Discard => {}
            Verdict::Relay(payload) => {
                // A transient failure here has no queue slot to retry from;
                // the packet is dropped and counted.
                match send_toward(&self.socket, &self.endpoints, direction, &payload)? {
                    SendStatus::Sent => self.stats.relayed += 1,
                    SendStatus::Retry => {
                        tracing::warn!("Send buffer full, dropping an immediate packet.");
                        self.stats.send_buffer_drops += 1;
                    }
                    SendStatus::Unroutable => {}
                }
            }
            Verdict::Defer(pkt) => self.queue.push(pkt),
        }
        Ok(())
    }
}

/// The egress writer: map a direction to its peer and issue one
/// non-blocking send.
fn send_toward(
    socket: &UdpSocket,
    endpoints: &Endpoints,
    direction: Direction,
    payload: &[u8],
) -> Result<SendStatus> {
    let peer = match direction {
        Direction::Forward => endpoints.destination(),
        Direction::Reverse => match endpoints.client() {
            Some(client) => client,
            None => {
                tracing::warn!("No client learned yet, dropping a reverse packet.");
                return Ok(SendStatus::Unroutable);
            }
        },
    };
    match socket.send_to(payload, peer) {
        Ok(sent) if sent == payload.len() => {
            tracing::info!("[SEQ {:3}] Sent packet ({direction}).", seq(payload));
            Ok(SendStatus::Sent)
        }
        Ok(sent) => bail!(
            "short write toward {peer}: sent {sent} of {} bytes",
            payload.len()
        ),
        Err(err)
            if matches!(
                err.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ) =>
        {
            Ok(SendStatus::Retry)
        }
        Err(err) => Err(err).with_context(|| format!("failed to send toward {peer}")),
    }
}
