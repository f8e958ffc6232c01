//! Buffer registry and storage pool
//!
//! Received datagrams land in natively-owned buffers that are exposed to
//! the scripting engine by identifier instead of being copied into
//! engine-managed memory. The registry is the single source of truth for
//! buffer lifecycle shared by two independently-scheduled domains: the
//! I/O callbacks that fill and send buffers, and the engine-side proxy
//! objects whose destruction releases them.
//!
//! Lifecycle per entry:
//!
//! ```text
//! Allocated -> ReadyForConsumer -> InUseByConsumer -> Released -> (reclaimed)
//!                    |                                    ^
//!                    +----- release_unclaimed ------------+
//! ```
//!
//! An entry additionally carries a `native_refs` count for in-flight
//! zero-copy sends. Storage is recycled exactly once, by whichever
//! releaser (consumer release or final send completion) observes the
//! entry both `Released` and at zero native references.

mod handle;

pub use handle::DatagramBuffer;

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::queue::ArrayQueue;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::error::{ErrorKind, UdpError, UdpResult};
use crate::sockets::SocketId;

/// Default capacity of a pooled receive buffer (one max-size datagram).
pub const DEFAULT_DATAGRAM_CAPACITY: usize = 64 * 1024;

/// Unique buffer identifier, monotonic per registry, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared backing storage for one buffer. The registry, the send worker
/// and the engine proxy all reference the same bytes; nobody copies.
pub type SharedStorage = Arc<RwLock<Vec<u8>>>;

/// Lifecycle state of a registry entry. `Free` has no representation:
/// reclaimed entries leave the map and their storage returns to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Native-owned, no consumer reference yet.
    Allocated,
    /// Native write complete, eligible for handoff.
    ReadyForConsumer,
    /// A proxy has been constructed and is reachable from the engine.
    InUseByConsumer,
    /// Consumer signalled done; storage free may still be deferred on
    /// outstanding native references.
    Released,
}

struct BufferEntry {
    storage: SharedStorage,
    len: usize,
    state: BufferState,
    native_refs: u32,
    origin: Option<SocketId>,
    peer: Option<SocketAddr>,
}

/// Free list of storage vectors, recycled across datagrams to keep the
/// receive path allocation-free in steady state.
pub struct BufferPool {
    free: ArrayQueue<Vec<u8>>,
    buffer_size: usize,
}

impl BufferPool {
    /// Pool with `slots` recyclable vectors of the default datagram size.
    pub fn new(slots: usize) -> Self {
        Self::with_buffer_size(slots, DEFAULT_DATAGRAM_CAPACITY)
    }

    pub fn with_buffer_size(slots: usize, buffer_size: usize) -> Self {
        Self {
            free: ArrayQueue::new(slots.max(1)),
            buffer_size,
        }
    }

    /// Take a zero-filled vector of `buffer_size` length, reusing a
    /// recycled one when available.
    pub fn acquire(&self) -> Vec<u8> {
        let mut buf = self.free.pop().unwrap_or_default();
        buf.resize(self.buffer_size, 0);
        buf
    }

    /// Return a vector to the free list. Undersized or excess vectors
    /// are simply dropped.
    pub fn recycle(&self, mut buf: Vec<u8>) {
        if buf.capacity() >= self.buffer_size {
            buf.clear();
            let _ = self.free.push(buf);
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Number of vectors currently waiting on the free list.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn slots(&self) -> usize {
        self.free.capacity()
    }
}

/// Owns all buffer entries and drives the ownership state machine.
pub struct BufferRegistry {
    entries: Mutex<HashMap<BufferId, BufferEntry>>,
    pool: Arc<BufferPool>,
    next_id: AtomicU64,
}

impl BufferRegistry {
    pub fn new(pool: Arc<BufferPool>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            pool,
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> BufferId {
        BufferId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Explicit allocation of a zeroed buffer in `Allocated` state.
    pub fn allocate(&self, size: usize) -> UdpResult<BufferId> {
        if size == 0 {
            return Err(UdpError::new(
                ErrorKind::InvalidArguments,
                "buffer size must be non-zero",
            ));
        }
        let storage = if size <= self.pool.buffer_size() {
            let mut buf = self.pool.acquire();
            buf.truncate(size);
            buf
        } else {
            vec![0u8; size]
        };
        let id = self.next_id();
        let entry = BufferEntry {
            storage: Arc::new(RwLock::new(storage)),
            len: size,
            state: BufferState::Allocated,
            native_refs: 0,
            origin: None,
            peer: None,
        };
        self.entries.lock().insert(id, entry);
        trace!(buffer = %id, size, "allocated buffer");
        Ok(id)
    }

    /// `Allocated -> ReadyForConsumer`: the native write is complete.
    pub fn mark_ready(&self, id: BufferId) -> UdpResult<()> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(&id)
            .ok_or_else(|| buffer_not_found(id))?;
        if entry.state != BufferState::Allocated {
            return Err(UdpError::new(
                ErrorKind::BufferAccessFailed,
                format!("buffer {} is not in allocated state", id),
            ));
        }
        entry.state = BufferState::ReadyForConsumer;
        Ok(())
    }

    /// Register a received datagram. The entry is created directly in
    /// `ReadyForConsumer` with its peer metadata attached, collapsing the
    /// allocation and receipt transitions the receive path performs
    /// back-to-back.
    pub fn insert_received(&self, origin: SocketId, data: Vec<u8>, peer: SocketAddr) -> BufferId {
        let id = self.next_id();
        let entry = BufferEntry {
            len: data.len(),
            storage: Arc::new(RwLock::new(data)),
            state: BufferState::ReadyForConsumer,
            native_refs: 0,
            origin: Some(origin),
            peer: Some(peer),
        };
        self.entries.lock().insert(id, entry);
        trace!(buffer = %id, socket = %origin, "registered received datagram");
        id
    }

    /// `ReadyForConsumer -> InUseByConsumer`. Exactly-once per id; a
    /// second handoff attempt fails with `BufferAccessFailed`.
    pub fn acquire_for_consumer(&self, id: BufferId) -> UdpResult<usize> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(&id)
            .ok_or_else(|| buffer_not_found(id))?;
        match entry.state {
            BufferState::ReadyForConsumer => {
                entry.state = BufferState::InUseByConsumer;
                Ok(entry.len)
            }
            _ => Err(UdpError::new(
                ErrorKind::BufferAccessFailed,
                format!("buffer {} has already been handed off", id),
            )),
        }
    }

    /// Consumer release, normally triggered by proxy destruction.
    /// `InUseByConsumer -> Released`; reclaims when no native operation
    /// still references the storage. Safe to call for ids the registry
    /// no longer tracks.
    pub fn consumer_release(&self, id: BufferId) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&id) {
            if entry.state == BufferState::InUseByConsumer {
                entry.state = BufferState::Released;
            }
            self.try_reclaim(&mut entries, id);
        }
    }

    /// Release an entry that was never handed off (nobody listening, or
    /// the socket closed before delivery).
    pub fn release_unclaimed(&self, id: BufferId) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&id) {
            if matches!(
                entry.state,
                BufferState::Allocated | BufferState::ReadyForConsumer
            ) {
                entry.state = BufferState::Released;
            }
            self.try_reclaim(&mut entries, id);
        }
    }

    /// Pin a byte range for a zero-copy send. Increments the native
    /// reference count and hands the shared storage to the send worker.
    pub fn retain_for_send(
        &self,
        id: BufferId,
        offset: usize,
        len: usize,
    ) -> UdpResult<SharedStorage> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(&id)
            .ok_or_else(|| buffer_not_found(id))?;
        let end = offset.checked_add(len);
        match end {
            Some(end) if end <= entry.len => {}
            _ => {
                return Err(UdpError::new(
                    ErrorKind::InvalidArguments,
                    format!(
                        "range {}+{} exceeds buffer {} length {}",
                        offset, len, id, entry.len
                    ),
                ))
            }
        }
        entry.native_refs += 1;
        Ok(Arc::clone(&entry.storage))
    }

    /// Teardown sweep: release every entry the consumer does not hold.
    /// Entries pinned by in-flight sends survive until their
    /// completion; handed-off buffers stay valid until their proxy
    /// drops.
    pub fn release_idle(&self) {
        let mut entries = self.entries.lock();
        let idle: Vec<BufferId> = entries
            .iter()
            .filter(|(_, e)| e.state != BufferState::InUseByConsumer)
            .map(|(&id, _)| id)
            .collect();
        for id in idle {
            if let Some(entry) = entries.get_mut(&id) {
                entry.state = BufferState::Released;
            }
            self.try_reclaim(&mut entries, id);
        }
    }

    /// Completion of a native operation that was reading this buffer.
    pub fn complete_send(&self, id: BufferId) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&id) {
            entry.native_refs = entry.native_refs.saturating_sub(1);
            self.try_reclaim(&mut entries, id);
        }
    }

    /// Read access for the proxy. Valid only while the consumer holds
    /// the buffer.
    pub fn read<R>(&self, id: BufferId, f: impl FnOnce(&[u8]) -> R) -> UdpResult<R> {
        let (storage, len) = self.consumer_storage(id)?;
        let guard = storage.read();
        Ok(f(&guard[..len.min(guard.len())]))
    }

    /// Write access for the proxy, bounds-checked against the logical
    /// length.
    pub fn write(&self, id: BufferId, offset: usize, data: &[u8]) -> UdpResult<()> {
        let (storage, len) = self.consumer_storage(id)?;
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= len)
            .ok_or_else(|| {
                UdpError::new(
                    ErrorKind::BufferAccessFailed,
                    format!("write of {} bytes at {} exceeds buffer {}", data.len(), offset, id),
                )
            })?;
        let mut guard = storage.write();
        guard[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Peer address recorded at receipt, if any.
    pub fn peer(&self, id: BufferId) -> Option<SocketAddr> {
        self.entries.lock().get(&id).and_then(|e| e.peer)
    }

    /// Socket the datagram arrived on, if any.
    pub fn origin(&self, id: BufferId) -> Option<SocketId> {
        self.entries.lock().get(&id).and_then(|e| e.origin)
    }

    pub fn state(&self, id: BufferId) -> Option<BufferState> {
        self.entries.lock().get(&id).map(|e| e.state)
    }

    /// Number of entries not yet reclaimed.
    pub fn live_count(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    fn consumer_storage(&self, id: BufferId) -> UdpResult<(SharedStorage, usize)> {
        let entries = self.entries.lock();
        let entry = entries.get(&id).ok_or_else(|| buffer_not_found(id))?;
        if entry.state != BufferState::InUseByConsumer {
            return Err(UdpError::new(
                ErrorKind::BufferAccessFailed,
                format!("buffer {} is not held by the consumer", id),
            ));
        }
        Ok((Arc::clone(&entry.storage), entry.len))
    }

    /// Last releaser frees: only an entry that is `Released` with zero
    /// native references leaves the map, and its storage is recycled at
    /// most once.
    fn try_reclaim(&self, entries: &mut HashMap<BufferId, BufferEntry>, id: BufferId) {
        let reclaim = entries
            .get(&id)
            .map(|e| e.state == BufferState::Released && e.native_refs == 0)
            .unwrap_or(false);
        if !reclaim {
            return;
        }
        if let Some(entry) = entries.remove(&id) {
            debug!(buffer = %id, "reclaimed buffer");
            if let Ok(lock) = Arc::try_unwrap(entry.storage) {
                self.pool.recycle(lock.into_inner());
            }
        }
    }
}

fn buffer_not_found(id: BufferId) -> UdpError {
    UdpError::new(ErrorKind::BufferNotFound, format!("no buffer with id {}", id))
}
