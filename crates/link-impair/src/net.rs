//! Relay socket setup and the readiness wait.
//!
//! One IPv6 UDP socket carries both directions. It is bound to all
//! interfaces, forced to IPv6 only, and set non-blocking: readiness only
//! says a read is worth attempting, not that it cannot block. The wait is a
//! plain `poll(2)` on the socket with the scheduler's computed timeout.

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv6Addr, SocketAddr, UdpSocket};
use std::os::fd::AsRawFd;

/// Bind the relay socket on `[::]:listen_port`. Port 0 binds an ephemeral
/// port, readable back via `local_addr`.
pub fn bind_relay_socket(listen_port: u16) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))
        .context("cannot create relay socket")?;
    // Address sharing lets a restarted relay rebind the port immediately.
    socket
        .set_reuse_address(true)
        .context("cannot enable address re-use")?;
    socket
        .set_only_v6(true)
        .context("cannot force the socket to IPv6")?;
    let bind_addr = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), listen_port);
    socket
        .bind(&bind_addr.into())
        .with_context(|| format!("cannot bind relay socket on {bind_addr}"))?;
    socket
        .set_nonblocking(true)
        .context("cannot set the relay socket to non-blocking mode")?;
    Ok(socket.into())
}

/// The fixed peer all forward traffic is relayed toward.
pub fn destination_addr(forward_port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), forward_port)
}

/// Outcome of one readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Readable,
    TimedOut,
    /// A signal interrupted the wait; the caller restarts the iteration.
    Interrupted,
}

/// Wait until the socket is readable or `timeout_ms` elapses. `None` blocks
/// indefinitely.
pub fn wait_readable(socket: &UdpSocket, timeout_ms: Option<u64>) -> Result<Readiness> {
    let mut pollfd = libc::pollfd {
        fd: socket.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    let timeout = match timeout_ms {
        None => -1,
        Some(ms) => ms.min(i32::MAX as u64) as libc::c_int,
    };
    let rc = unsafe { libc::poll(&mut pollfd, 1, timeout) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(Readiness::Interrupted);
        }
        return Err(err).context("poll on the relay socket failed");
    }
    if rc == 0 {
        return Ok(Readiness::TimedOut);
    }
    // POLLERR / POLLHUP also count: the following recv surfaces the error.
    Ok(Readiness::Readable)
}
