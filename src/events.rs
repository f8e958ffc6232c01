//! Events delivered to the consumer
//!
//! Event names are part of the wire contract, like the error codes.
//! The listener registry counts subscriptions per event name so the
//! module skips payload construction (including the zero-copy handoff)
//! when nobody is listening.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::buffers::DatagramBuffer;
use crate::error::UdpError;
use crate::sockets::SocketId;

/// Stable event names.
pub mod names {
    pub const DATA_RECEIVED: &str = "udpDataReceived";
    pub const SOCKET_CLOSED: &str = "udpSocketClosed";
    pub const SEND_SUCCESS: &str = "udpSendSuccess";
    pub const SEND_FAILURE: &str = "udpSendFailure";
}

/// Datagram payload: small packets arrive inline, large ones as a
/// zero-copy buffer reference.
#[derive(Debug)]
pub enum Payload {
    Bytes(Vec<u8>),
    Buffer(DatagramBuffer),
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Payload::Bytes(b) => b.len(),
            Payload::Buffer(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the payload out, whichever form it took.
    pub fn to_vec(&self) -> crate::error::UdpResult<Vec<u8>> {
        match self {
            Payload::Bytes(b) => Ok(b.clone()),
            Payload::Buffer(b) => b.to_vec(),
        }
    }
}

#[derive(Debug)]
pub enum UdpEvent {
    DataReceived {
        socket: SocketId,
        payload: Payload,
        host: String,
        port: u16,
    },
    SocketClosed {
        socket: SocketId,
        error: Option<UdpError>,
    },
    SendSuccess {
        socket: SocketId,
        tag: i64,
    },
    SendFailure {
        socket: SocketId,
        tag: i64,
        error: UdpError,
    },
}

impl UdpEvent {
    pub fn name(&self) -> &'static str {
        match self {
            UdpEvent::DataReceived { .. } => names::DATA_RECEIVED,
            UdpEvent::SocketClosed { .. } => names::SOCKET_CLOSED,
            UdpEvent::SendSuccess { .. } => names::SEND_SUCCESS,
            UdpEvent::SendFailure { .. } => names::SEND_FAILURE,
        }
    }
}

/// Per-event-name listener counts.
pub struct ListenerRegistry {
    counts: Mutex<HashMap<String, usize>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn add(&self, name: &str) {
        *self.counts.lock().entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn remove(&self, name: &str) {
        let mut counts = self.counts.lock();
        if let Some(count) = counts.get_mut(name) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.remove(name);
            }
        }
    }

    pub fn count(&self, name: &str) -> usize {
        self.counts.lock().get(name).copied().unwrap_or(0)
    }

    pub fn has(&self, name: &str) -> bool {
        self.count(name) > 0
    }

    pub fn clear(&self) {
        self.counts.lock().clear();
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
