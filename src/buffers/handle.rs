//! Engine-facing buffer proxy
//!
//! A `DatagramBuffer` is the lightweight object handed to the scripting
//! engine in place of the received bytes. It references the registry
//! entry by identifier and forwards read/write access without copying;
//! dropping it performs the consumer-release transition.

use std::fmt;
use std::sync::Weak;

use super::{BufferId, BufferRegistry};
use crate::error::UdpResult;

/// Consumer-held proxy for one registry entry.
///
/// Constructed by the module during handoff (exactly once per buffer
/// id). The proxy holds a weak reference to the registry so a queued or
/// leaked proxy outliving the module degrades to a no-op instead of
/// keeping native state alive.
pub struct DatagramBuffer {
    id: BufferId,
    len: usize,
    registry: Weak<BufferRegistry>,
}

impl DatagramBuffer {
    pub(crate) fn new(id: BufferId, len: usize, registry: Weak<BufferRegistry>) -> Self {
        Self { id, len, registry }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Logical length of the datagram in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Borrow the bytes without copying.
    pub fn read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> UdpResult<R> {
        self.upgrade()?.read(self.id, f)
    }

    /// Overwrite a range of the buffer in place.
    pub fn write(&self, offset: usize, data: &[u8]) -> UdpResult<()> {
        self.upgrade()?.write(self.id, offset, data)
    }

    /// Explicit copy-out, for consumers that want owned bytes.
    pub fn to_vec(&self) -> UdpResult<Vec<u8>> {
        self.read(|bytes| bytes.to_vec())
    }

    /// Source address of the datagram, when the buffer was created by a
    /// receive.
    pub fn peer(&self) -> Option<(String, u16)> {
        let registry = self.registry.upgrade()?;
        registry
            .peer(self.id)
            .map(|addr| (addr.ip().to_string(), addr.port()))
    }

    fn upgrade(&self) -> UdpResult<std::sync::Arc<BufferRegistry>> {
        self.registry.upgrade().ok_or_else(|| {
            crate::error::UdpError::new(
                crate::error::ErrorKind::BufferNotFound,
                format!("registry for buffer {} is gone", self.id),
            )
        })
    }
}

impl Drop for DatagramBuffer {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.consumer_release(self.id);
        }
    }
}

impl fmt::Debug for DatagramBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatagramBuffer")
            .field("id", &self.id)
            .field("len", &self.len)
            .finish()
    }
}
