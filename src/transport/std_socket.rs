//! Default transport on socket2 + std::net
//!
//! Sockets are created unbound so SO_REUSEADDR can be applied first,
//! then converted to a `std::net::UdpSocket` at bind time. Option
//! setters go through `SockRef` so the same surface works in both
//! phases.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;

use parking_lot::RwLock;
use socket2::{Domain, Protocol, SockAddr, SockRef, Socket, Type};

use super::{Transport, TransportSocket, RECV_POLL_INTERVAL};
use crate::sockets::SocketFamily;

/// Factory producing `StdUdpSocket` handles.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdTransport;

impl Transport for StdTransport {
    fn open(
        &self,
        family: SocketFamily,
        reuse_address: bool,
    ) -> io::Result<Arc<dyn TransportSocket>> {
        let domain = if family.is_v4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(reuse_address)?;
        Ok(Arc::new(StdUdpSocket {
            phase: RwLock::new(Phase::Pending(socket)),
            family,
        }))
    }
}

enum Phase {
    /// Created, options mutable, not yet bound.
    Pending(Socket),
    /// Bound and receiving; carries the poll read timeout.
    Bound(UdpSocket),
    Closed,
}

pub struct StdUdpSocket {
    phase: RwLock<Phase>,
    family: SocketFamily,
}

fn closed_err() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "socket is closed")
}

impl StdUdpSocket {
    fn with_sockref<R>(&self, f: impl FnOnce(SockRef<'_>) -> io::Result<R>) -> io::Result<R> {
        let phase = self.phase.read();
        match &*phase {
            Phase::Pending(s) => f(SockRef::from(s)),
            Phase::Bound(s) => f(SockRef::from(s)),
            Phase::Closed => Err(closed_err()),
        }
    }
}

impl TransportSocket for StdUdpSocket {
    fn bind(&self, addr: SocketAddr) -> io::Result<SocketAddr> {
        let mut phase = self.phase.write();
        match std::mem::replace(&mut *phase, Phase::Closed) {
            Phase::Pending(socket) => match socket.bind(&SockAddr::from(addr)) {
                Ok(()) => {
                    let bound: UdpSocket = socket.into();
                    bound.set_read_timeout(Some(RECV_POLL_INTERVAL))?;
                    let local = bound.local_addr()?;
                    *phase = Phase::Bound(bound);
                    Ok(local)
                }
                Err(e) => {
                    // Bind failures leave the socket reusable.
                    *phase = Phase::Pending(socket);
                    Err(e)
                }
            },
            bound @ Phase::Bound(_) => {
                *phase = bound;
                Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "socket is already bound",
                ))
            }
            Phase::Closed => Err(closed_err()),
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        let phase = self.phase.read();
        match &*phase {
            Phase::Pending(s) => s.local_addr()?.as_socket().ok_or_else(|| {
                io::Error::new(io::ErrorKind::AddrNotAvailable, "non-inet local address")
            }),
            Phase::Bound(s) => s.local_addr(),
            Phase::Closed => Err(closed_err()),
        }
    }

    fn send_to(&self, data: &[u8], target: SocketAddr) -> io::Result<usize> {
        let phase = self.phase.read();
        match &*phase {
            // Sending on an unbound socket lets the OS pick an
            // ephemeral local port.
            Phase::Pending(s) => s.send_to(data, &SockAddr::from(target)),
            Phase::Bound(s) => s.send_to(data, target),
            Phase::Closed => Err(closed_err()),
        }
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let phase = self.phase.read();
        match &*phase {
            Phase::Bound(s) => s.recv_from(buf),
            Phase::Pending(_) => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "socket is not bound",
            )),
            Phase::Closed => Err(closed_err()),
        }
    }

    fn set_broadcast(&self, on: bool) -> io::Result<()> {
        self.with_sockref(|s| s.set_broadcast(on))
    }

    fn set_ttl(&self, ttl: u32) -> io::Result<()> {
        self.with_sockref(|s| s.set_ttl(ttl))
    }

    fn set_multicast_ttl(&self, ttl: u32) -> io::Result<()> {
        if self.family.is_v4() {
            self.with_sockref(|s| s.set_multicast_ttl_v4(ttl))
        } else {
            self.with_sockref(|s| s.set_multicast_hops_v6(ttl))
        }
    }

    fn set_multicast_loopback(&self, on: bool) -> io::Result<()> {
        if self.family.is_v4() {
            self.with_sockref(|s| s.set_multicast_loop_v4(on))
        } else {
            self.with_sockref(|s| s.set_multicast_loop_v6(on))
        }
    }

    fn join_multicast(&self, group: IpAddr) -> io::Result<()> {
        match group {
            IpAddr::V4(g) => {
                self.with_sockref(|s| s.join_multicast_v4(&g, &Ipv4Addr::UNSPECIFIED))
            }
            IpAddr::V6(g) => self.with_sockref(|s| s.join_multicast_v6(&g, 0)),
        }
    }

    fn leave_multicast(&self, group: IpAddr) -> io::Result<()> {
        match group {
            IpAddr::V4(g) => {
                self.with_sockref(|s| s.leave_multicast_v4(&g, &Ipv4Addr::UNSPECIFIED))
            }
            IpAddr::V6(g) => self.with_sockref(|s| s.leave_multicast_v6(&g, 0)),
        }
    }

    fn close(&self) {
        *self.phase.write() = Phase::Closed;
    }
}
