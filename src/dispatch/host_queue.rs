// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Command stream drained by the host's own render thread.

use crate::dispatch::{CommandStream, Rejected, RenderCommand, execute};
use crate::engine::{CopyEngine, RenderContext};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Buffers render commands until the host executes them.
///
/// The host calls [`HostCommandQueue::execute_pending`] from the thread that
/// owns the graphics context, typically once per frame from its render-event
/// callback.
pub struct HostCommandQueue {
    engine: Arc<dyn CopyEngine>,
    pending: Mutex<VecDeque<RenderCommand>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for HostCommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostCommandQueue")
            .field("pending", &self.pending_len())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl HostCommandQueue {
    pub fn new(engine: Arc<dyn CopyEngine>) -> Self {
        HostCommandQueue {
            engine,
            pending: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<RenderCommand>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Executes every command submitted so far, in order, and returns how many ran.
    ///
    /// Must be called from the render thread. Commands submitted while this runs
    /// wait for the next call.
    pub fn execute_pending(&self) -> usize {
        let batch = std::mem::take(&mut *self.lock());
        let count = batch.len();
        let ctx = RenderContext::new();
        for command in batch {
            execute(&*self.engine, &ctx, command);
        }
        count
    }

    pub fn pending_len(&self) -> usize {
        self.lock().len()
    }

    /// Stops accepting commands. Commands already queued still run on the next drain.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl Drop for HostCommandQueue {
    /// Completes every fence left in the queue. Other commands are discarded
    /// unexecuted, since no render thread is left to run them.
    fn drop(&mut self) {
        let pending = std::mem::take(self.pending.get_mut().unwrap_or_else(PoisonError::into_inner));
        if pending.is_empty() {
            return;
        }
        logwise::warn_sync!(
            "host command queue dropped with {count} commands never executed",
            count = pending.len()
        );
        for command in pending {
            if let RenderCommand::Fence(sender) = command {
                sender.send(());
            }
        }
    }
}

impl CommandStream for HostCommandQueue {
    fn submit(&self, command: RenderCommand) -> Result<(), Rejected> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Rejected(command));
        }
        self.lock().push_back(command);
        Ok(())
    }
}
