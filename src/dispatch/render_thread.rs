// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::Error;
use crate::dispatch::{CommandStream, Rejected, RenderCommand, execute};
use crate::engine::{CopyEngine, RenderContext};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

/// A dedicated render command thread.
///
/// Commands travel over a channel and execute in the order they were sent.
/// Dropping the stream (or calling [`RenderThread::shutdown`]) closes the
/// channel; the thread finishes every command already queued and is joined.
#[derive(Debug)]
pub struct RenderThread {
    sender: Mutex<Option<Sender<RenderCommand>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RenderThread {
    pub fn spawn(engine: Arc<dyn CopyEngine>) -> Result<Self, Error> {
        let (sender, receiver): (Sender<RenderCommand>, Receiver<RenderCommand>) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("gpu_readback_render".to_string())
            .spawn(move || {
                logwise::info_sync!("render thread started");
                let ctx = RenderContext::new();
                // recv fails only once every sender is gone and the queue is empty
                while let Ok(command) = receiver.recv() {
                    execute(&*engine, &ctx, command);
                }
                logwise::info_sync!("render thread stopped");
            })
            .map_err(|e| Error::RenderThreadSpawn(e.to_string()))?;
        Ok(RenderThread {
            sender: Mutex::new(Some(sender)),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Rejects further commands, then waits for queued ones to finish.
    pub fn shutdown(&self) {
        drop(lock(&self.sender).take());
        let handle = lock(&self.thread).take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                logwise::warn_sync!("render thread shut down from itself; not joining");
                return;
            }
            if handle.join().is_err() {
                logwise::error_sync!("render thread panicked");
            }
        }
    }
}

impl CommandStream for RenderThread {
    fn submit(&self, command: RenderCommand) -> Result<(), Rejected> {
        match &*lock(&self.sender) {
            Some(sender) => sender.send(command).map_err(|e| Rejected(e.0)),
            None => Err(Rejected(command)),
        }
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SoftwareCopyEngine;
    use crate::texture::TextureHandle;

    #[test]
    fn shutdown_drains_then_rejects() {
        let engine = Arc::new(SoftwareCopyEngine::new());
        let thread = RenderThread::spawn(engine.clone()).unwrap();
        let ids: Vec<_> = (0..16).map(|i| engine.submit_copy(TextureHandle::new(i), 0)).collect();
        for id in &ids {
            thread.submit(RenderCommand::Dispose(*id)).unwrap();
        }
        thread.shutdown();
        assert_eq!(engine.live_requests(), 0);
        assert_eq!(engine.disposed_requests(), 16);
        assert!(thread.submit(RenderCommand::Update(ids[0])).is_err());
    }
}
