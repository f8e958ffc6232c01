//! UDP Direct - zero-copy UDP sockets for embedded scripting engines
//!
//! This crate gives a host application UDP socket I/O that it can expose
//! to an embedded scripting engine without copying received datagrams
//! into engine-managed memory: receive buffers stay natively owned and
//! are handed to the engine as lightweight proxies that release them on
//! destruction.
//!
//! # Architecture
//!
//! ```text
//! engine thread                          I/O threads
//! ─────────────                          ───────────
//! UdpDirectModule  ──────────────►  UdpDriver (send worker,
//!   │ commands                        per-socket receive loops)
//!   │                                      │ completions
//!   ▼                                      ▼
//! SocketTable / BufferRegistry  ◄──  IoCallbacks (insert buffers,
//!   ▲                                  release send pins)
//!   │ events via EventSink                 │
//!   └──── EngineDispatcher  ◄──────────────┘
//!         (closures re-delivered on the engine thread,
//!          liveness-guarded against module teardown)
//! ```
//!
//! Two execution domains exist: the engine's single logical thread, on
//! which every command and every event runs, and the I/O threads owned
//! by the driver. The only bridge between them is the dispatcher; the
//! buffer registry is the one structure both domains lock directly,
//! which is what makes the dual-release buffer lifecycle safe.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use udp_direct::{
//!     ChannelInvoker, CreateOptions, EventSink, SendPayload, UdpDirectModule, UdpEvent,
//! };
//!
//! struct PrintSink;
//! impl EventSink for PrintSink {
//!     fn emit(&self, event: UdpEvent) {
//!         println!("{} fired", event.name());
//!     }
//! }
//!
//! let invoker = Arc::new(ChannelInvoker::new());
//! let module = UdpDirectModule::new(invoker.clone(), Box::new(PrintSink));
//!
//! let socket = module.create_socket(CreateOptions::default()).unwrap();
//! module.bind(socket, 0, "0.0.0.0").unwrap();
//! module
//!     .send(socket, SendPayload::Bytes(b"hello".to_vec()), 8125, "127.0.0.1", 1)
//!     .unwrap();
//!
//! // The host pumps the invoker from its engine thread.
//! invoker.pump();
//! module.shutdown();
//! ```

#![warn(clippy::all)]

pub mod buffers;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod module;
pub mod netif;
pub mod sockets;
pub mod transport;

pub use buffers::{BufferId, BufferPool, BufferRegistry, BufferState, DatagramBuffer};
pub use dispatch::EngineDispatcher;
pub use engine::{ChannelInvoker, EngineInvoker, EngineTask, EventSink};
pub use error::{error_constants, ErrorKind, UdpError, UdpResult};
pub use events::{names as event_names, ListenerRegistry, Payload, UdpEvent};
pub use module::{Diagnostics, SendPayload, UdpDirectModule, INLINE_PAYLOAD_MAX};
pub use sockets::{AddressInfo, CreateOptions, SocketFamily, SocketId, SocketTable};
pub use transport::{
    IoCallbacks, PendingSend, SendData, StdTransport, Transport, TransportSocket, UdpDriver,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
