//! Socket table
//!
//! Owns per-socket state keyed by `SocketId`: the transport handle, the
//! bind/receive flags, and the closed tombstone. All mutation happens on
//! the engine thread through the command surface; the I/O domain never
//! touches the table directly.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ErrorKind, UdpError, UdpResult};
use crate::transport::TransportSocket;

/// Unique socket identifier, monotonic per table, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId(pub u64);

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address family, fixed at socket creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SocketFamily {
    #[serde(rename = "udp4")]
    V4,
    #[serde(rename = "udp6")]
    V6,
}

impl SocketFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            SocketFamily::V4 => "IPv4",
            SocketFamily::V6 => "IPv6",
        }
    }

    pub fn is_v4(self) -> bool {
        matches!(self, SocketFamily::V4)
    }
}

impl Default for SocketFamily {
    fn default() -> Self {
        SocketFamily::V4
    }
}

/// Options applied at `create_socket`; immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateOptions {
    #[serde(rename = "type")]
    pub family: SocketFamily,
    pub reuse_address: bool,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            family: SocketFamily::V4,
            reuse_address: true,
        }
    }
}

/// Local address of a bound socket, shaped for the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressInfo {
    pub address: String,
    pub port: u16,
    pub family: String,
}

struct SocketEntry {
    /// Transport handle; dropped when the socket closes.
    socket: Option<Arc<dyn TransportSocket>>,
    family: SocketFamily,
    bound: bool,
    local_addr: Option<SocketAddr>,
    recv_active: bool,
    closed: bool,
}

/// Handle plus bookkeeping returned by a successful close.
pub struct ClosedSocket {
    pub handle: Arc<dyn TransportSocket>,
    pub was_receiving: bool,
}

/// Table of all sockets created by one module instance.
///
/// Closed sockets remain as tombstones so later operations report
/// `SocketClosed` rather than `SocketNotFound`; the table is emptied by
/// `drain` during close-all/teardown.
pub struct SocketTable {
    entries: Mutex<HashMap<SocketId, SocketEntry>>,
    next_id: AtomicU64,
}

impl SocketTable {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn create(&self, socket: Arc<dyn TransportSocket>, family: SocketFamily) -> SocketId {
        let id = SocketId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = SocketEntry {
            socket: Some(socket),
            family,
            bound: false,
            local_addr: None,
            recv_active: false,
            closed: false,
        };
        self.entries.lock().insert(id, entry);
        debug!(socket = %id, family = family.as_str(), "created socket");
        id
    }

    /// Transport handle of an open socket.
    pub fn handle(&self, id: SocketId) -> UdpResult<Arc<dyn TransportSocket>> {
        let entries = self.entries.lock();
        let entry = entries.get(&id).ok_or_else(|| not_found(id))?;
        if entry.closed {
            return Err(closed(id));
        }
        Ok(Arc::clone(entry.socket.as_ref().expect("open entry has a handle")))
    }

    /// Handle of an open socket that has not been bound yet; used by the
    /// bind path to enforce idempotent rejection.
    pub fn unbound_handle(&self, id: SocketId) -> UdpResult<Arc<dyn TransportSocket>> {
        let entries = self.entries.lock();
        let entry = entries.get(&id).ok_or_else(|| not_found(id))?;
        if entry.closed {
            return Err(closed(id));
        }
        if entry.bound {
            return Err(UdpError::new(
                ErrorKind::AlreadyBound,
                format!("socket {} is already bound", id),
            ));
        }
        Ok(Arc::clone(entry.socket.as_ref().expect("open entry has a handle")))
    }

    /// Handle of an open, bound socket; membership changes require one.
    pub fn bound_handle(&self, id: SocketId) -> UdpResult<Arc<dyn TransportSocket>> {
        let entries = self.entries.lock();
        let entry = entries.get(&id).ok_or_else(|| not_found(id))?;
        if entry.closed {
            return Err(closed(id));
        }
        if !entry.bound {
            return Err(UdpError::new(
                ErrorKind::InvalidArguments,
                format!("socket {} is not bound", id),
            ));
        }
        Ok(Arc::clone(entry.socket.as_ref().expect("open entry has a handle")))
    }

    /// Record a successful bind and the arming of continuous receive.
    pub fn record_bound(&self, id: SocketId, local: SocketAddr) {
        if let Some(entry) = self.entries.lock().get_mut(&id) {
            entry.bound = true;
            entry.local_addr = Some(local);
            entry.recv_active = true;
        }
    }

    /// True while the socket may still deliver receive events.
    pub fn is_receivable(&self, id: SocketId) -> bool {
        self.entries
            .lock()
            .get(&id)
            .map(|e| !e.closed && e.recv_active)
            .unwrap_or(false)
    }

    /// True while the entry exists at all (tombstones included); used to
    /// decide whether late send completions still produce events.
    pub fn is_tracked(&self, id: SocketId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    pub fn family(&self, id: SocketId) -> UdpResult<SocketFamily> {
        let entries = self.entries.lock();
        let entry = entries.get(&id).ok_or_else(|| not_found(id))?;
        Ok(entry.family)
    }

    /// Local address of a bound socket.
    pub fn address_info(&self, id: SocketId) -> UdpResult<AddressInfo> {
        let entries = self.entries.lock();
        let entry = entries.get(&id).ok_or_else(|| not_found(id))?;
        if entry.closed {
            return Err(closed(id));
        }
        let local = entry.local_addr.ok_or_else(|| {
            UdpError::new(
                ErrorKind::OperationFailed,
                format!("socket {} is not bound", id),
            )
        })?;
        Ok(AddressInfo {
            address: local.ip().to_string(),
            port: local.port(),
            family: entry.family.as_str().to_string(),
        })
    }

    /// Mark a socket closed, dropping its transport handle from the
    /// entry. Returns `None` for unknown or already-closed sockets, so
    /// close stays an idempotent no-op success.
    pub fn close(&self, id: SocketId) -> Option<ClosedSocket> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(&id)?;
        if entry.closed {
            return None;
        }
        entry.closed = true;
        let was_receiving = entry.recv_active;
        entry.recv_active = false;
        let handle = entry.socket.take()?;
        debug!(socket = %id, "closed socket");
        Some(ClosedSocket {
            handle,
            was_receiving,
        })
    }

    /// Remove every entry, returning the open handles for shutdown.
    pub fn drain(&self) -> Vec<(SocketId, ClosedSocket)> {
        let mut entries = self.entries.lock();
        let mut closed_now = Vec::new();
        for (id, mut entry) in entries.drain() {
            if entry.closed {
                continue;
            }
            let was_receiving = entry.recv_active;
            if let Some(handle) = entry.socket.take() {
                closed_now.push((
                    id,
                    ClosedSocket {
                        handle,
                        was_receiving,
                    },
                ));
            }
        }
        closed_now
    }

    /// Open sockets bound to the given local port.
    pub fn ids_on_port(&self, port: u16) -> Vec<SocketId> {
        self.entries
            .lock()
            .iter()
            .filter(|(_, e)| !e.closed && e.local_addr.map(|a| a.port()) == Some(port))
            .map(|(&id, _)| id)
            .collect()
    }

    pub fn open_count(&self) -> usize {
        self.entries.lock().values().filter(|e| !e.closed).count()
    }

    pub fn tracked_count(&self) -> usize {
        self.entries.lock().len()
    }
}

impl Default for SocketTable {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(id: SocketId) -> UdpError {
    UdpError::new(
        ErrorKind::SocketNotFound,
        format!("no socket with id {}", id),
    )
}

fn closed(id: SocketId) -> UdpError {
    UdpError::new(ErrorKind::SocketClosed, format!("socket {} is closed", id))
}
