//! Command surface
//!
//! `UdpDirectModule` is the object the host registers with its scripting
//! engine. Commands are called on the engine's logical thread; every
//! argument is validated before any state mutation, and the boundary
//! converts panics into `InternalException` errors instead of letting a
//! fault escape into the engine's call stack.
//!
//! Completion flow: commands drive the socket table and buffer registry
//! and queue work on the driver; driver callbacks arrive on I/O threads
//! and are re-delivered here through the dispatcher, where events are
//! emitted into the host's `EventSink`.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::buffers::{BufferId, BufferPool, BufferRegistry, DatagramBuffer};
use crate::dispatch::EngineDispatcher;
use crate::engine::{EngineInvoker, EventSink};
use crate::error::{error_constants, ErrorKind, UdpError, UdpResult};
use crate::events::{names, ListenerRegistry, Payload, UdpEvent};
use crate::netif;
use crate::sockets::{AddressInfo, CreateOptions, SocketFamily, SocketId, SocketTable};
use crate::transport::{IoCallbacks, PendingSend, SendData, StdTransport, Transport, UdpDriver};

/// Datagrams up to this size are delivered inline; larger ones go
/// through the zero-copy handoff.
pub const INLINE_PAYLOAD_MAX: usize = 512;

/// Upper bound for explicit shared-buffer allocation.
const MAX_SHARED_BUFFER: usize = 16 * 1024 * 1024;

/// Recyclable receive-storage slots per module instance.
const POOL_SLOTS: usize = 64;

/// Outgoing payload accepted by `send`.
#[derive(Debug)]
pub enum SendPayload {
    /// Raw bytes, already decoded by the host.
    Bytes(Vec<u8>),
    /// Base64 text from the script side; decoded at the boundary.
    Base64(String),
    /// Zero-copy range into a registry buffer.
    Buffer {
        id: BufferId,
        offset: usize,
        len: usize,
    },
}

/// Snapshot of module internals, for the host's debug surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub open_sockets: usize,
    pub tracked_sockets: usize,
    pub live_buffers: usize,
    pub pool_available: usize,
    pub pool_slots: usize,
    pub queued_sends: usize,
}

struct ModuleCore {
    table: SocketTable,
    registry: Arc<BufferRegistry>,
    dispatcher: EngineDispatcher,
    listeners: ListenerRegistry,
    driver: UdpDriver,
    transport: Arc<dyn Transport>,
    sink: Box<dyn EventSink>,
    torn_down: AtomicBool,
}

/// UDP socket module for an embedded scripting engine.
pub struct UdpDirectModule {
    core: Arc<ModuleCore>,
}

impl UdpDirectModule {
    /// Module on the default socket2/std transport.
    pub fn new(invoker: Arc<dyn EngineInvoker>, sink: Box<dyn EventSink>) -> Self {
        Self::with_transport(invoker, sink, Arc::new(StdTransport))
    }

    pub fn with_transport(
        invoker: Arc<dyn EngineInvoker>,
        sink: Box<dyn EventSink>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let pool = Arc::new(BufferPool::new(POOL_SLOTS));
        let registry = Arc::new(BufferRegistry::new(Arc::clone(&pool)));
        let core = Arc::new_cyclic(|weak: &Weak<ModuleCore>| {
            let callbacks = Arc::new(CoreCallbacks { core: weak.clone() });
            ModuleCore {
                table: SocketTable::new(),
                registry,
                dispatcher: EngineDispatcher::new(invoker),
                listeners: ListenerRegistry::new(),
                driver: UdpDriver::new(callbacks, pool),
                transport,
                sink,
                torn_down: AtomicBool::new(false),
            }
        });
        Self { core }
    }

    // --- Socket lifecycle -------------------------------------------------

    pub fn create_socket(&self, options: CreateOptions) -> UdpResult<SocketId> {
        guarded(|| {
            self.ensure_active()?;
            let socket = self
                .core
                .transport
                .open(options.family, options.reuse_address)
                .map_err(|e| {
                    UdpError::system(ErrorKind::OperationFailed, "failed to create socket", e)
                })?;
            Ok(self.core.table.create(socket, options.family))
        })
    }

    /// Bind and arm continuous receive. Port 0 asks the OS for an
    /// ephemeral port; an empty address means the unspecified address of
    /// the socket's family.
    pub fn bind(&self, id: SocketId, port: u16, address: &str) -> UdpResult<()> {
        guarded(|| {
            self.ensure_active()?;
            let family = self.core.table.family(id)?;
            let ip = parse_bind_address(address, family)?;
            let handle = self.core.table.unbound_handle(id)?;
            let local = handle
                .bind(SocketAddr::new(ip, port))
                .map_err(|e| UdpError::system(ErrorKind::BindFailed, "bind failed", e))?;
            self.core.table.record_bound(id, local);
            self.core.driver.start_receive(id, handle)?;
            debug!(socket = %id, %local, "socket bound and receiving");
            Ok(())
        })
    }

    /// Queue a datagram. Returns once the request is queued; the
    /// outcome arrives as a `udpSendSuccess`/`udpSendFailure` event
    /// carrying `tag`.
    pub fn send(
        &self,
        id: SocketId,
        payload: SendPayload,
        port: u16,
        address: &str,
        tag: i64,
    ) -> UdpResult<()> {
        guarded(|| {
            self.ensure_active()?;
            let handle = self.core.table.handle(id)?;
            let ip: IpAddr = address.parse().map_err(|_| {
                UdpError::new(
                    ErrorKind::InvalidAddress,
                    format!("invalid target address {:?}", address),
                )
            })?;
            let target = SocketAddr::new(ip, port);
            let data = match payload {
                SendPayload::Bytes(bytes) => SendData::Owned(bytes),
                SendPayload::Base64(text) => SendData::Owned(
                    BASE64.decode(text.as_bytes()).map_err(|e| {
                        UdpError::system(ErrorKind::InvalidBase64, "invalid base64 payload", e)
                    })?,
                ),
                SendPayload::Buffer { id: buffer, offset, len } => {
                    let storage = self.core.registry.retain_for_send(buffer, offset, len)?;
                    SendData::Shared {
                        buffer,
                        storage,
                        offset,
                        len,
                    }
                }
            };
            let pinned = data.buffer_id();
            let queued = self.core.driver.queue_send(PendingSend {
                socket: id,
                handle,
                target,
                tag,
                data,
            });
            if queued.is_err() {
                // The job never reached the worker; release the pin here.
                if let Some(buffer) = pinned {
                    self.core.registry.complete_send(buffer);
                }
            }
            queued
        })
    }

    /// Idempotent close: unknown and already-closed sockets are a no-op
    /// success. Buffers already issued to the consumer stay valid.
    pub fn close(&self, id: SocketId) -> UdpResult<()> {
        guarded(|| {
            self.core.close_one(id);
            Ok(())
        })
    }

    pub fn close_all_sockets(&self) -> UdpResult<()> {
        guarded(|| {
            for (id, closed) in self.core.table.drain() {
                self.core.driver.stop_receive(id);
                closed.handle.close();
            }
            Ok(())
        })
    }

    /// Blocking teardown for host reload: retires the dispatcher (queued
    /// callbacks become no-ops), closes every socket, and waits for the
    /// I/O domain to acknowledge quiescence.
    pub fn shutdown(&self) {
        self.core.torn_down.store(true, Ordering::Release);
        self.core.dispatcher.retire();
        let _ = self.close_all_sockets();
        self.core.driver.shutdown();
        self.core.registry.release_idle();
        debug!("module shut down");
    }

    /// Close whatever socket is currently holding a local port.
    pub fn forcibly_release_port(&self, port: u16) -> UdpResult<()> {
        guarded(|| {
            for id in self.core.table.ids_on_port(port) {
                warn!(socket = %id, port, "forcibly releasing port");
                self.core.close_one(id);
            }
            Ok(())
        })
    }

    // --- Introspection ----------------------------------------------------

    pub fn address(&self, id: SocketId) -> UdpResult<AddressInfo> {
        guarded(|| self.core.table.address_info(id))
    }

    pub fn get_local_ip_addresses(&self) -> Vec<String> {
        netif::local_ip_addresses()
    }

    /// Error-code constants for the script side.
    pub fn get_constants(&self) -> Value {
        error_constants().clone()
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let pool = self.core.registry.pool();
        Diagnostics {
            open_sockets: self.core.table.open_count(),
            tracked_sockets: self.core.table.tracked_count(),
            live_buffers: self.core.registry.live_count(),
            pool_available: pool.available(),
            pool_slots: pool.slots(),
            queued_sends: self.core.driver.queued_sends(),
        }
    }

    // --- Socket options ---------------------------------------------------

    pub fn set_broadcast(&self, id: SocketId, on: bool) -> UdpResult<()> {
        guarded(|| {
            let handle = self.core.table.handle(id)?;
            handle.set_broadcast(on).map_err(option_failed)
        })
    }

    pub fn set_ttl(&self, id: SocketId, ttl: u32) -> UdpResult<()> {
        guarded(|| {
            if !(1..=255).contains(&ttl) {
                return Err(UdpError::new(
                    ErrorKind::InvalidArguments,
                    format!("ttl {} out of range 1-255", ttl),
                ));
            }
            let handle = self.core.table.handle(id)?;
            handle.set_ttl(ttl).map_err(option_failed)
        })
    }

    pub fn set_multicast_ttl(&self, id: SocketId, ttl: u32) -> UdpResult<()> {
        guarded(|| {
            if ttl > 255 {
                return Err(UdpError::new(
                    ErrorKind::InvalidArguments,
                    format!("multicast ttl {} out of range 0-255", ttl),
                ));
            }
            let handle = self.core.table.handle(id)?;
            handle.set_multicast_ttl(ttl).map_err(option_failed)
        })
    }

    pub fn set_multicast_loopback(&self, id: SocketId, on: bool) -> UdpResult<()> {
        guarded(|| {
            let handle = self.core.table.handle(id)?;
            handle.set_multicast_loopback(on).map_err(option_failed)
        })
    }

    pub fn join_multicast_group(&self, id: SocketId, address: &str) -> UdpResult<()> {
        guarded(|| {
            let group = parse_multicast(address)?;
            let handle = self.core.table.bound_handle(id)?;
            handle.join_multicast(group).map_err(option_failed)
        })
    }

    pub fn leave_multicast_group(&self, id: SocketId, address: &str) -> UdpResult<()> {
        guarded(|| {
            let group = parse_multicast(address)?;
            let handle = self.core.table.bound_handle(id)?;
            handle.leave_multicast(group).map_err(option_failed)
        })
    }

    // --- Buffers ----------------------------------------------------------

    /// Allocate a zeroed shared buffer and hand it to the consumer; the
    /// returned proxy can be written in place and sent zero-copy.
    pub fn allocate_shared_buffer(&self, size: usize) -> UdpResult<DatagramBuffer> {
        guarded(|| {
            self.ensure_active()?;
            if size > MAX_SHARED_BUFFER {
                return Err(UdpError::new(
                    ErrorKind::BufferCreationFailed,
                    format!("requested size {} exceeds limit {}", size, MAX_SHARED_BUFFER),
                ));
            }
            let id = self.core.registry.allocate(size)?;
            self.core.registry.mark_ready(id)?;
            let len = self.core.registry.acquire_for_consumer(id)?;
            Ok(DatagramBuffer::new(
                id,
                len,
                Arc::downgrade(&self.core.registry),
            ))
        })
    }

    // --- Event subscriptions ----------------------------------------------

    pub fn add_listener(&self, event: &str) {
        self.core.listeners.add(event);
    }

    pub fn remove_listener(&self, event: &str) {
        self.core.listeners.remove(event);
    }

    fn ensure_active(&self) -> UdpResult<()> {
        if self.core.torn_down.load(Ordering::Acquire) {
            return Err(UdpError::new(
                ErrorKind::OperationFailed,
                "module is shut down",
            ));
        }
        Ok(())
    }
}

impl ModuleCore {
    fn close_one(&self, id: SocketId) {
        if let Some(closed) = self.table.close(id) {
            self.driver.stop_receive(id);
            closed.handle.close();
            if self.listeners.has(names::SOCKET_CLOSED) {
                self.sink.emit(UdpEvent::SocketClosed {
                    socket: id,
                    error: None,
                });
            }
        }
    }

    /// Engine-thread delivery of a received datagram.
    fn deliver_datagram(&self, socket: SocketId, buffer: BufferId, len: usize, peer: SocketAddr) {
        if self.torn_down.load(Ordering::Acquire) || !self.table.is_receivable(socket) {
            // Socket closed (or module torn down) between receipt and
            // delivery: the event is silently dropped.
            self.registry.release_unclaimed(buffer);
            return;
        }
        if !self.listeners.has(names::DATA_RECEIVED) {
            self.registry.release_unclaimed(buffer);
            return;
        }
        let payload = if len <= INLINE_PAYLOAD_MAX {
            let copied = self
                .registry
                .acquire_for_consumer(buffer)
                .and_then(|_| self.registry.read(buffer, |bytes| bytes.to_vec()));
            self.registry.consumer_release(buffer);
            match copied {
                Ok(bytes) => Payload::Bytes(bytes),
                Err(_) => return,
            }
        } else {
            match self.registry.acquire_for_consumer(buffer) {
                Ok(len) => Payload::Buffer(DatagramBuffer::new(
                    buffer,
                    len,
                    Arc::downgrade(&self.registry),
                )),
                Err(_) => return,
            }
        };
        self.sink.emit(UdpEvent::DataReceived {
            socket,
            payload,
            host: peer.ip().to_string(),
            port: peer.port(),
        });
    }

    /// Engine-thread delivery of a send completion.
    fn deliver_send_result(&self, socket: SocketId, tag: i64, result: Result<(), io::Error>) {
        if self.torn_down.load(Ordering::Acquire) || !self.table.is_tracked(socket) {
            // Late completion against a torn-down entry: no-op.
            return;
        }
        match result {
            Ok(()) => {
                if self.listeners.has(names::SEND_SUCCESS) {
                    self.sink.emit(UdpEvent::SendSuccess { socket, tag });
                }
            }
            Err(e) => {
                if self.listeners.has(names::SEND_FAILURE) {
                    self.sink.emit(UdpEvent::SendFailure {
                        socket,
                        tag,
                        error: UdpError::system(ErrorKind::SendFailed, "send failed", e),
                    });
                }
            }
        }
    }

    /// Engine-thread handling of a dead receive loop.
    fn deliver_receive_failure(&self, socket: SocketId, error: io::Error) {
        if self.torn_down.load(Ordering::Acquire) {
            return;
        }
        let Some(closed) = self.table.close(socket) else {
            return;
        };
        self.driver.stop_receive(socket);
        closed.handle.close();
        if self.listeners.has(names::SOCKET_CLOSED) {
            self.sink.emit(UdpEvent::SocketClosed {
                socket,
                error: Some(UdpError::system(
                    ErrorKind::ReceiveFailed,
                    "receive failed",
                    error,
                )),
            });
        }
    }
}

/// Bridges driver callbacks (I/O threads) onto the engine thread.
/// Holds only a weak back-reference; callbacks outliving the module
/// degrade to no-ops.
struct CoreCallbacks {
    core: Weak<ModuleCore>,
}

impl CoreCallbacks {
    fn dispatch_to_engine(&self, f: impl FnOnce(&ModuleCore) + Send + 'static) {
        let Some(core) = self.core.upgrade() else {
            return;
        };
        let weak = self.core.clone();
        core.dispatcher.dispatch(move || {
            if let Some(core) = weak.upgrade() {
                f(&core);
            }
        });
    }
}

impl IoCallbacks for CoreCallbacks {
    fn datagram_received(&self, socket: SocketId, data: Vec<u8>, peer: SocketAddr) {
        let Some(core) = self.core.upgrade() else {
            return;
        };
        // Cheap early-outs on the I/O thread; the engine-thread checks
        // in deliver_datagram stay authoritative.
        if !core.listeners.has(names::DATA_RECEIVED) || !core.table.is_receivable(socket) {
            core.registry.pool().recycle(data);
            return;
        }
        let len = data.len();
        let buffer = core.registry.insert_received(socket, data, peer);
        drop(core);
        self.dispatch_to_engine(move |core| core.deliver_datagram(socket, buffer, len, peer));
    }

    fn send_completed(
        &self,
        socket: SocketId,
        tag: i64,
        buffer: Option<BufferId>,
        result: io::Result<()>,
    ) {
        if let Some(core) = self.core.upgrade() {
            // Release the zero-copy pin in the I/O domain regardless of
            // whether an event will be delivered.
            if let Some(buffer) = buffer {
                core.registry.complete_send(buffer);
            }
        }
        self.dispatch_to_engine(move |core| core.deliver_send_result(socket, tag, result));
    }

    fn receive_failed(&self, socket: SocketId, error: io::Error) {
        self.dispatch_to_engine(move |core| core.deliver_receive_failure(socket, error));
    }
}

fn guarded<T>(f: impl FnOnce() -> UdpResult<T>) -> UdpResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unexpected panic in command".to_string());
            Err(UdpError::new(ErrorKind::InternalException, message))
        }
    }
}

fn option_failed(e: io::Error) -> UdpError {
    UdpError::system(ErrorKind::OperationFailed, "socket option failed", e)
}

fn parse_bind_address(address: &str, family: SocketFamily) -> UdpResult<IpAddr> {
    if address.is_empty() {
        return Ok(match family {
            SocketFamily::V4 => IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
            SocketFamily::V6 => IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED),
        });
    }
    address.parse().map_err(|_| {
        UdpError::new(
            ErrorKind::InvalidAddress,
            format!("invalid bind address {:?}", address),
        )
    })
}

fn parse_multicast(address: &str) -> UdpResult<IpAddr> {
    let group: IpAddr = address.parse().map_err(|_| {
        UdpError::new(
            ErrorKind::InvalidAddress,
            format!("invalid multicast address {:?}", address),
        )
    })?;
    if !group.is_multicast() {
        return Err(UdpError::new(
            ErrorKind::InvalidArguments,
            format!("{} is not a multicast address", group),
        ));
    }
    Ok(group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ChannelInvoker;
    use parking_lot::Mutex;

    struct CollectingSink {
        events: Arc<Mutex<Vec<UdpEvent>>>,
    }

    impl EventSink for CollectingSink {
        fn emit(&self, event: UdpEvent) {
            self.events.lock().push(event);
        }
    }

    fn module() -> (UdpDirectModule, Arc<ChannelInvoker>, Arc<Mutex<Vec<UdpEvent>>>) {
        let invoker = Arc::new(ChannelInvoker::new());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Box::new(CollectingSink {
            events: Arc::clone(&events),
        });
        let module = UdpDirectModule::new(invoker.clone(), sink);
        (module, invoker, events)
    }

    #[test]
    fn test_send_to_unknown_socket_fails_synchronously() {
        let (module, _invoker, _events) = module();
        let err = module
            .send(SocketId(99), SendPayload::Bytes(vec![1]), 9, "127.0.0.1", 0)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::SocketNotFound);
    }

    #[test]
    fn test_double_bind_reports_already_bound() {
        let (module, _invoker, _events) = module();
        let id = module.create_socket(CreateOptions::default()).unwrap();
        module.bind(id, 0, "127.0.0.1").unwrap();
        let err = module.bind(id, 0, "127.0.0.1").unwrap_err();
        assert_eq!(err.kind, ErrorKind::AlreadyBound);
        module.shutdown();
    }

    #[test]
    fn test_close_is_idempotent_and_poisons_sends() {
        let (module, _invoker, _events) = module();
        let id = module.create_socket(CreateOptions::default()).unwrap();
        module.close(id).unwrap();
        module.close(id).unwrap();
        let err = module
            .send(id, SendPayload::Bytes(vec![0]), 9, "127.0.0.1", 1)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::SocketClosed);
        module.shutdown();
    }

    #[test]
    fn test_invalid_inputs_fail_before_mutation() {
        let (module, _invoker, _events) = module();
        let id = module.create_socket(CreateOptions::default()).unwrap();

        let err = module
            .send(id, SendPayload::Bytes(vec![]), 9, "not-an-ip", 0)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidAddress);

        let err = module
            .send(id, SendPayload::Base64("!!!".into()), 9, "127.0.0.1", 0)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidBase64);

        let err = module.set_ttl(id, 0).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArguments);

        let err = module.join_multicast_group(id, "10.0.0.1").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArguments);

        assert_eq!(module.diagnostics().queued_sends, 0);
        module.shutdown();
    }

    #[test]
    fn test_multicast_requires_bound_socket() {
        let (module, _invoker, _events) = module();
        let id = module.create_socket(CreateOptions::default()).unwrap();
        let err = module.join_multicast_group(id, "224.0.0.251").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArguments);
        module.bind(id, 0, "0.0.0.0").unwrap();
        module.join_multicast_group(id, "224.0.0.251").unwrap();
        module.leave_multicast_group(id, "224.0.0.251").unwrap();
        module.shutdown();
    }

    #[test]
    fn test_constants_are_exported() {
        let (module, _invoker, _events) = module();
        let constants = module.get_constants();
        assert_eq!(constants["ERR_ALREADY_BOUND"], "ERR_ALREADY_BOUND");
        module.shutdown();
    }

    #[test]
    fn test_shared_buffer_allocation_and_send() {
        let (module, _invoker, _events) = module();
        let id = module.create_socket(CreateOptions::default()).unwrap();
        module.bind(id, 0, "127.0.0.1").unwrap();

        let buffer = module.allocate_shared_buffer(1024).unwrap();
        buffer.write(0, b"zero-copy").unwrap();
        module
            .send(
                id,
                SendPayload::Buffer {
                    id: buffer.id(),
                    offset: 0,
                    len: 9,
                },
                module.address(id).unwrap().port,
                "127.0.0.1",
                5,
            )
            .unwrap();
        module.shutdown();
        drop(buffer);
        assert_eq!(module.diagnostics().live_buffers, 0);
    }

    #[test]
    fn test_shared_buffer_size_limits() {
        let (module, _invoker, _events) = module();
        assert_eq!(
            module.allocate_shared_buffer(0).unwrap_err().kind,
            ErrorKind::InvalidArguments
        );
        assert_eq!(
            module
                .allocate_shared_buffer(MAX_SHARED_BUFFER + 1)
                .unwrap_err()
                .kind,
            ErrorKind::BufferCreationFailed
        );
        module.shutdown();
    }

    #[test]
    fn test_commands_rejected_after_shutdown() {
        let (module, _invoker, _events) = module();
        module.shutdown();
        let err = module.create_socket(CreateOptions::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::OperationFailed);
    }

    #[test]
    fn test_forcibly_release_port() {
        let (module, _invoker, _events) = module();
        let id = module.create_socket(CreateOptions::default()).unwrap();
        module.bind(id, 0, "127.0.0.1").unwrap();
        let port = module.address(id).unwrap().port;

        module.forcibly_release_port(port).unwrap();
        let err = module
            .send(id, SendPayload::Bytes(vec![0]), port, "127.0.0.1", 0)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::SocketClosed);

        // The port is free again for a fresh socket.
        let id2 = module.create_socket(CreateOptions::default()).unwrap();
        module.bind(id2, port, "127.0.0.1").unwrap();
        module.shutdown();
    }
}
