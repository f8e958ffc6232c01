//! Cross-thread dispatcher
//!
//! Every transport completion arrives on an I/O thread and must be
//! re-delivered on the engine's logical thread before touching anything
//! the engine can see. The dispatcher queues closures through the
//! host's `EngineInvoker` and guards delivery with an atomic liveness
//! flag: once the module begins teardown, queued closures become
//! no-ops instead of dereferencing state that may be gone.
//!
//! Queued closures must capture only owned data (ids, lengths,
//! addresses) and weak back-references; the dispatcher grants no
//! ownership of module state to the queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::trace;

use crate::engine::EngineInvoker;

pub struct EngineDispatcher {
    invoker: Arc<dyn EngineInvoker>,
    live: Arc<AtomicBool>,
}

impl EngineDispatcher {
    pub fn new(invoker: Arc<dyn EngineInvoker>) -> Self {
        Self {
            invoker,
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Queue `task` for the engine thread. The liveness flag is checked
    /// both here and again at delivery time, so tasks already queued
    /// when teardown starts are dropped rather than run.
    pub fn dispatch(&self, task: impl FnOnce() + Send + 'static) {
        if !self.live.load(Ordering::Acquire) {
            trace!("dropping dispatch after teardown");
            return;
        }
        let live = Arc::clone(&self.live);
        self.invoker.post(Box::new(move || {
            if live.load(Ordering::Acquire) {
                task();
            } else {
                trace!("dropping queued callback after teardown");
            }
        }));
    }

    /// Begin teardown: refuse new dispatches and neuter queued ones.
    pub fn retire(&self) {
        self.live.store(false, Ordering::Release);
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}
