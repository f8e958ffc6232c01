//! Engine seam
//!
//! The host supplies the two collaborators the module needs from its
//! scripting environment: an invoker that runs closures on the engine's
//! single logical thread, and a sink that forwards events into the
//! engine's event system. `ChannelInvoker` is a pumpable FIFO
//! implementation for hosts without a native invoker and for tests.

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::events::UdpEvent;

/// A unit of work queued for the engine thread.
pub type EngineTask = Box<dyn FnOnce() + Send + 'static>;

/// The engine's invocation mechanism: queue a closure for execution on
/// the engine's logical thread. Posting must be callable from any
/// thread; execution order must match posting order.
pub trait EngineInvoker: Send + Sync {
    fn post(&self, task: EngineTask);
}

/// Receives module events on the engine thread.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: UdpEvent);
}

/// FIFO invoker backed by a channel. The host owns the pump: calling
/// [`ChannelInvoker::pump`] from the engine thread runs everything
/// queued so far.
pub struct ChannelInvoker {
    tx: Sender<EngineTask>,
    rx: Receiver<EngineTask>,
}

impl ChannelInvoker {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Run all currently queued tasks; returns how many ran.
    pub fn pump(&self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// Tasks waiting to be pumped.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Default for ChannelInvoker {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineInvoker for ChannelInvoker {
    fn post(&self, task: EngineTask) {
        let _ = self.tx.send(task);
    }
}
