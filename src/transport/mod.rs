//! I/O backend adapter
//!
//! Wraps the underlying UDP primitive behind the `Transport` /
//! `TransportSocket` traits so the rest of the module never handles an
//! untyped OS handle, and runs the I/O side of the module: one receive
//! loop per bound socket and a single worker that executes queued sends
//! in order. Completion callbacks (`IoCallbacks`) are invoked on these
//! I/O threads; re-delivery on the engine thread is the dispatcher's
//! job, not ours.

mod std_socket;

pub use std_socket::StdTransport;

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::buffers::{BufferId, BufferPool, SharedStorage};
use crate::error::{ErrorKind, UdpError, UdpResult};
use crate::sockets::{SocketFamily, SocketId};

/// Read timeout on bound sockets; the longest a receive loop waits
/// before rechecking its stop flag.
pub const RECV_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One UDP socket as seen by the module: a typed handle covering bind,
/// datagram I/O and the option surface. All methods are callable from
/// any thread.
pub trait TransportSocket: Send + Sync {
    /// Bind to a local address and return the OS-assigned one.
    fn bind(&self, addr: SocketAddr) -> io::Result<SocketAddr>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
    fn send_to(&self, data: &[u8], target: SocketAddr) -> io::Result<usize>;
    /// Blocking receive, bounded by `RECV_POLL_INTERVAL`.
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
    fn set_broadcast(&self, on: bool) -> io::Result<()>;
    fn set_ttl(&self, ttl: u32) -> io::Result<()>;
    fn set_multicast_ttl(&self, ttl: u32) -> io::Result<()>;
    fn set_multicast_loopback(&self, on: bool) -> io::Result<()>;
    fn join_multicast(&self, group: IpAddr) -> io::Result<()>;
    fn leave_multicast(&self, group: IpAddr) -> io::Result<()>;
    /// Release the OS handle. Idempotent.
    fn close(&self);
}

impl std::fmt::Debug for dyn TransportSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TransportSocket")
    }
}

/// Factory for transport sockets.
pub trait Transport: Send + Sync {
    fn open(&self, family: SocketFamily, reuse_address: bool)
        -> io::Result<Arc<dyn TransportSocket>>;
}

/// Completion callbacks, invoked on I/O-thread context.
pub trait IoCallbacks: Send + Sync {
    /// A datagram arrived; `data` is pooled storage truncated to the
    /// datagram length and ownership transfers to the callee.
    fn datagram_received(&self, socket: SocketId, data: Vec<u8>, peer: SocketAddr);
    /// A queued send finished. `buffer` is set for zero-copy sends so
    /// the registry reference can be dropped.
    fn send_completed(
        &self,
        socket: SocketId,
        tag: i64,
        buffer: Option<BufferId>,
        result: io::Result<()>,
    );
    /// The receive loop died on a hard transport error.
    fn receive_failed(&self, socket: SocketId, error: io::Error);
}

/// Payload of an in-flight send.
pub enum SendData {
    /// Bytes owned by the request (raw or decoded base64).
    Owned(Vec<u8>),
    /// Zero-copy range into a registry buffer; the storage reference
    /// keeps the bytes alive until the send completes.
    Shared {
        buffer: BufferId,
        storage: SharedStorage,
        offset: usize,
        len: usize,
    },
}

impl SendData {
    /// Registry buffer pinned by this payload, if any.
    pub fn buffer_id(&self) -> Option<BufferId> {
        match self {
            SendData::Owned(_) => None,
            SendData::Shared { buffer, .. } => Some(*buffer),
        }
    }
}

/// Transient record correlating a queued send with its completion.
pub struct PendingSend {
    pub socket: SocketId,
    pub handle: Arc<dyn TransportSocket>,
    pub target: SocketAddr,
    pub tag: i64,
    pub data: SendData,
}

enum SendJob {
    Send(PendingSend),
    /// Rendezvous barrier: acknowledged once every earlier job finished.
    Drain(Sender<()>),
    Shutdown,
}

struct RecvLoop {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

/// The I/O backend: owns the send worker and the per-socket receive
/// loops, and reports completions through `IoCallbacks`.
pub struct UdpDriver {
    callbacks: Arc<dyn IoCallbacks>,
    pool: Arc<BufferPool>,
    send_tx: Sender<SendJob>,
    worker: Mutex<Option<JoinHandle<()>>>,
    receivers: Mutex<HashMap<SocketId, RecvLoop>>,
}

impl UdpDriver {
    pub fn new(callbacks: Arc<dyn IoCallbacks>, pool: Arc<BufferPool>) -> Self {
        let (send_tx, send_rx) = unbounded();
        let worker_callbacks = Arc::clone(&callbacks);
        let worker = thread::Builder::new()
            .name("udp-direct-send".into())
            .spawn(move || send_worker(send_rx, worker_callbacks))
            .expect("failed to spawn udp send worker");
        Self {
            callbacks,
            pool,
            send_tx,
            worker: Mutex::new(Some(worker)),
            receivers: Mutex::new(HashMap::new()),
        }
    }

    /// Arm continuous receive for a bound socket.
    pub fn start_receive(&self, id: SocketId, sock: Arc<dyn TransportSocket>) -> UdpResult<()> {
        let stop = Arc::new(AtomicBool::new(false));
        let loop_stop = Arc::clone(&stop);
        let pool = Arc::clone(&self.pool);
        let callbacks = Arc::clone(&self.callbacks);
        let join = thread::Builder::new()
            .name(format!("udp-direct-recv-{}", id))
            .spawn(move || receive_loop(id, sock, pool, callbacks, loop_stop))
            .map_err(|e| {
                UdpError::system(ErrorKind::BeginReceiveFailed, "failed to start receive loop", e)
            })?;
        self.receivers.lock().insert(
            id,
            RecvLoop {
                stop,
                join: Some(join),
            },
        );
        Ok(())
    }

    /// Cancel further receive arming for a socket. Non-blocking; the
    /// loop observes the flag within the poll interval. The thread
    /// handle is kept for the final join in `shutdown`.
    pub fn stop_receive(&self, id: SocketId) {
        if let Some(recv) = self.receivers.lock().get(&id) {
            recv.stop.store(true, Ordering::Release);
        }
    }

    /// Queue a send; completion arrives through `IoCallbacks`.
    pub fn queue_send(&self, send: PendingSend) -> UdpResult<()> {
        self.send_tx
            .send(SendJob::Send(send))
            .map_err(|_| UdpError::new(ErrorKind::SendFailed, "send worker is not running"))
    }

    /// Sends queued but not yet executed.
    pub fn queued_sends(&self) -> usize {
        self.send_tx.len()
    }

    /// Blocking teardown: stop and join every receive loop, then wait
    /// for the send worker to drain all previously queued jobs. Safe to
    /// call while operations are still in flight.
    pub fn shutdown(&self) {
        let mut receivers = std::mem::take(&mut *self.receivers.lock());
        for recv in receivers.values() {
            recv.stop.store(true, Ordering::Release);
        }
        for (_, mut recv) in receivers.drain() {
            if let Some(join) = recv.join.take() {
                let _ = join.join();
            }
        }
        let (ack_tx, ack_rx) = bounded(1);
        if self.send_tx.send(SendJob::Drain(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

impl Drop for UdpDriver {
    fn drop(&mut self) {
        let mut receivers = std::mem::take(&mut *self.receivers.lock());
        for recv in receivers.values() {
            recv.stop.store(true, Ordering::Release);
        }
        for (_, mut recv) in receivers.drain() {
            if let Some(join) = recv.join.take() {
                let _ = join.join();
            }
        }
        let _ = self.send_tx.send(SendJob::Shutdown);
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }
}

fn send_worker(rx: Receiver<SendJob>, callbacks: Arc<dyn IoCallbacks>) {
    while let Ok(job) = rx.recv() {
        match job {
            SendJob::Send(send) => {
                let PendingSend {
                    socket,
                    handle,
                    target,
                    tag,
                    data,
                } = send;
                let result = match &data {
                    SendData::Owned(bytes) => handle.send_to(bytes, target).map(drop),
                    SendData::Shared {
                        storage, offset, len, ..
                    } => {
                        let guard = storage.read();
                        let end = (offset + len).min(guard.len());
                        let start = (*offset).min(end);
                        handle.send_to(&guard[start..end], target).map(drop)
                    }
                };
                let buffer = data.buffer_id();
                // Drop the storage reference before signalling completion
                // so the last releaser can recycle the vector.
                drop(data);
                callbacks.send_completed(socket, tag, buffer, result);
            }
            SendJob::Drain(ack) => {
                let _ = ack.send(());
            }
            SendJob::Shutdown => break,
        }
    }
}

fn receive_loop(
    id: SocketId,
    sock: Arc<dyn TransportSocket>,
    pool: Arc<BufferPool>,
    callbacks: Arc<dyn IoCallbacks>,
    stop: Arc<AtomicBool>,
) {
    trace!(socket = %id, "receive loop started");
    loop {
        if stop.load(Ordering::Acquire) {
            break;
        }
        let mut buf = pool.acquire();
        match sock.recv_from(&mut buf) {
            Ok((n, peer)) => {
                buf.truncate(n);
                callbacks.datagram_received(id, buf, peer);
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                pool.recycle(buf);
            }
            Err(e) => {
                pool.recycle(buf);
                if !stop.load(Ordering::Acquire) {
                    warn!(socket = %id, error = %e, "receive loop terminated");
                    callbacks.receive_failed(id, e);
                }
                break;
            }
        }
    }
    trace!(socket = %id, "receive loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use std::time::Instant;

    #[derive(Default)]
    struct Recorded {
        datagrams: Vec<(SocketId, Vec<u8>, SocketAddr)>,
        completions: Vec<(SocketId, i64, Option<BufferId>, bool)>,
        failures: Vec<SocketId>,
    }

    #[derive(Default)]
    struct RecordingCallbacks {
        recorded: PlMutex<Recorded>,
    }

    impl IoCallbacks for RecordingCallbacks {
        fn datagram_received(&self, socket: SocketId, data: Vec<u8>, peer: SocketAddr) {
            self.recorded.lock().datagrams.push((socket, data, peer));
        }
        fn send_completed(
            &self,
            socket: SocketId,
            tag: i64,
            buffer: Option<BufferId>,
            result: io::Result<()>,
        ) {
            self.recorded
                .lock()
                .completions
                .push((socket, tag, buffer, result.is_ok()));
        }
        fn receive_failed(&self, socket: SocketId, _error: io::Error) {
            self.recorded.lock().failures.push(socket);
        }
    }

    fn wait_until(deadline_ms: u64, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_millis(deadline_ms);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn test_send_and_receive_roundtrip() {
        let transport = StdTransport::default();
        let callbacks = Arc::new(RecordingCallbacks::default());
        let driver = UdpDriver::new(
            callbacks.clone() as Arc<dyn IoCallbacks>,
            Arc::new(BufferPool::new(8)),
        );

        let receiver = transport.open(SocketFamily::V4, true).unwrap();
        let local = receiver.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        driver.start_receive(SocketId(1), Arc::clone(&receiver)).unwrap();

        let sender = transport.open(SocketFamily::V4, true).unwrap();
        driver
            .queue_send(PendingSend {
                socket: SocketId(2),
                handle: sender,
                target: local,
                tag: 77,
                data: SendData::Owned(b"ping".to_vec()),
            })
            .unwrap();

        assert!(wait_until(2000, || {
            let rec = callbacks.recorded.lock();
            !rec.datagrams.is_empty() && !rec.completions.is_empty()
        }));

        let rec = callbacks.recorded.lock();
        assert_eq!(rec.completions[0], (SocketId(2), 77, None, true));
        let (socket, data, _peer) = &rec.datagrams[0];
        assert_eq!(*socket, SocketId(1));
        assert_eq!(data, b"ping");
        drop(rec);

        driver.shutdown();
    }

    #[test]
    fn test_stopped_receive_loop_reports_nothing() {
        let transport = StdTransport::default();
        let callbacks = Arc::new(RecordingCallbacks::default());
        let driver = UdpDriver::new(
            callbacks.clone() as Arc<dyn IoCallbacks>,
            Arc::new(BufferPool::new(8)),
        );

        let receiver = transport.open(SocketFamily::V4, true).unwrap();
        receiver.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        driver.start_receive(SocketId(5), Arc::clone(&receiver)).unwrap();

        driver.stop_receive(SocketId(5));
        receiver.close();
        driver.shutdown();

        assert!(callbacks.recorded.lock().failures.is_empty());
    }

    #[test]
    fn test_drain_waits_for_queued_sends() {
        let transport = StdTransport::default();
        let callbacks = Arc::new(RecordingCallbacks::default());
        let driver = UdpDriver::new(
            callbacks.clone() as Arc<dyn IoCallbacks>,
            Arc::new(BufferPool::new(8)),
        );

        let sender = transport.open(SocketFamily::V4, true).unwrap();
        let target: SocketAddr = "127.0.0.1:9".parse().unwrap();
        for tag in 0..16 {
            driver
                .queue_send(PendingSend {
                    socket: SocketId(3),
                    handle: Arc::clone(&sender),
                    target,
                    tag,
                    data: SendData::Owned(vec![0u8; 4]),
                })
                .unwrap();
        }
        driver.shutdown();
        // After the drain barrier every completion must have fired.
        assert_eq!(callbacks.recorded.lock().completions.len(), 16);
    }
}
