// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Cross-thread command bridge between the issuing thread and the render command stream.

Graphics APIs that lack asynchronous readback usually also insist that their
copy and fence primitives run in one specific context. The [`Dispatcher`] never
calls those primitives itself. Each operation is split in two:

1. An issuing-thread half that registers intent with the engine and yields a
   [`RequestId`].
2. A [`RenderCommand`] carrying that id, submitted to a [`CommandStream`] and
   executed later, at a point the stream controls, on the render timeline.

Streams execute commands in submission order, so a request submitted before
another is never copied, updated or released after it.

Two streams are provided:

* [`RenderThread`] owns a dedicated thread fed by a channel (native targets).
* [`HostCommandQueue`] buffers commands until the host's own render thread calls
  [`HostCommandQueue::execute_pending`], for hosts that hand out a callback
  slot on their render loop rather than letting us run a thread.

```
use async_gpu_readback::dispatch::Dispatcher;
use async_gpu_readback::engine::SoftwareCopyEngine;
use async_gpu_readback::texture::{TexelFormat, TextureDescriptor};
use std::sync::Arc;

let engine = Arc::new(SoftwareCopyEngine::new());
let texture = engine.add_texture(TextureDescriptor::new_2d(1, 1, TexelFormat::Rgba8Unorm), vec![1, 2, 3, 4]);
let (dispatcher, host_queue) = Dispatcher::host_driven(engine);

let id = dispatcher.make_request(texture, 0).unwrap();
dispatcher.advance(id).unwrap();
// Later, on the host's render thread:
host_queue.execute_pending();
assert!(dispatcher.poll_done(id));
assert_eq!(dispatcher.fetch_data(id), Some(vec![1, 2, 3, 4]));
dispatcher.dispose(id).unwrap();
host_queue.execute_pending();
```
*/

mod host_queue;
#[cfg(not(target_arch = "wasm32"))]
mod render_thread;

pub use host_queue::HostCommandQueue;
#[cfg(not(target_arch = "wasm32"))]
pub use render_thread::RenderThread;

use crate::Error;
use crate::engine::{CopyEngine, DeviceEvent, RenderContext, RequestId};
use crate::texture::TextureHandle;
use std::fmt::Debug;
use std::sync::Arc;

/// A unit of work for the render command stream.
pub enum RenderCommand {
    /// Record and submit the copy registered as this id.
    MakeRequest(RequestId),
    /// Check the copy's fence.
    Update(RequestId),
    /// Release the engine's resources for this id.
    Dispose(RequestId),
    /// Signals once every earlier command has executed.
    Fence(r#continue::Sender<()>),
}

impl Debug for RenderCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderCommand::MakeRequest(id) => f.debug_tuple("MakeRequest").field(id).finish(),
            RenderCommand::Update(id) => f.debug_tuple("Update").field(id).finish(),
            RenderCommand::Dispose(id) => f.debug_tuple("Dispose").field(id).finish(),
            RenderCommand::Fence(_) => f.write_str("Fence"),
        }
    }
}

/// A command the stream refused, handed back to the submitter.
#[derive(Debug)]
pub struct Rejected(pub RenderCommand);

/// An ordered stream of commands executed on the render timeline.
pub trait CommandStream: Send + Sync {
    /// Queues `command` behind every previously submitted command.
    fn submit(&self, command: RenderCommand) -> Result<(), Rejected>;
}

/// Runs one command against `engine`. Only command streams call this.
pub(crate) fn execute(engine: &dyn CopyEngine, ctx: &RenderContext, command: RenderCommand) {
    logwise::trace_sync!("execute {command}", command = logwise::privacy::LogIt(&command));
    match command {
        RenderCommand::MakeRequest(id) => {
            let _interval = logwise::perfwarn_begin!("execute_copy");
            engine.execute_copy(ctx, id);
        }
        RenderCommand::Update(id) => engine.update(ctx, id),
        RenderCommand::Dispose(id) => engine.dispose(ctx, id),
        RenderCommand::Fence(sender) => sender.send(()),
    }
}

/// Issuing-thread front end of a [`CopyEngine`].
#[derive(Clone)]
pub struct Dispatcher {
    engine: Arc<dyn CopyEngine>,
    stream: Arc<dyn CommandStream>,
}

impl Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(engine: Arc<dyn CopyEngine>, stream: Arc<dyn CommandStream>) -> Self {
        Dispatcher { engine, stream }
    }

    /// A dispatcher whose commands run when the host drains the returned queue.
    pub fn host_driven(engine: Arc<dyn CopyEngine>) -> (Self, Arc<HostCommandQueue>) {
        let queue = Arc::new(HostCommandQueue::new(engine.clone()));
        (Dispatcher::new(engine, queue.clone()), queue)
    }

    /// A dispatcher backed by a dedicated render thread.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn threaded(engine: Arc<dyn CopyEngine>) -> Result<Self, Error> {
        let thread = Arc::new(RenderThread::spawn(engine.clone())?);
        Ok(Dispatcher::new(engine, thread))
    }

    pub fn is_compatible(&self) -> bool {
        self.engine.probe_compatibility()
    }

    fn submit(&self, command: RenderCommand) -> Result<(), Error> {
        self.stream.submit(command).map_err(|Rejected(command)| {
            logwise::error_sync!(
                "render command stream rejected {command}",
                command = logwise::privacy::LogIt(&command)
            );
            if let RenderCommand::Fence(sender) = command {
                sender.send(());
            }
            Error::CommandStreamClosed
        })
    }

    /// Registers a copy and schedules it on the render timeline.
    ///
    /// Nothing is submitted when the engine probes incompatible. When the
    /// stream refuses the copy, the engine forgets the registration.
    pub fn make_request(&self, texture: TextureHandle, mip_level: u32) -> Result<RequestId, Error> {
        if !self.engine.probe_compatibility() {
            return Err(Error::UnsupportedPlatform);
        }
        let id = self.engine.submit_copy(texture, mip_level);
        if let Err(e) = self.submit(RenderCommand::MakeRequest(id)) {
            self.engine.cancel_copy(id);
            return Err(e);
        }
        Ok(id)
    }

    /// Schedules a fence check for `id`.
    pub fn advance(&self, id: RequestId) -> Result<(), Error> {
        self.submit(RenderCommand::Update(id))
    }

    /// Schedules release of `id`.
    pub fn dispose(&self, id: RequestId) -> Result<(), Error> {
        self.submit(RenderCommand::Dispose(id))
    }

    pub fn poll_done(&self, id: RequestId) -> bool {
        self.engine.poll_done(id)
    }

    pub fn poll_error(&self, id: RequestId) -> bool {
        self.engine.poll_error(id)
    }

    /// Copies the staged bytes for `id`, if the copy has completed.
    pub fn fetch_data(&self, id: RequestId) -> Option<Vec<u8>> {
        crate::engine::fetch_data(&*self.engine, id)
    }

    pub fn device_event(&self, event: DeviceEvent) {
        self.engine.device_event(event);
    }

    /// Resolves once every command submitted before this call has executed.
    ///
    /// With a [`HostCommandQueue`] this only resolves after the host drains it.
    pub async fn flush(&self) -> Result<(), Error> {
        let (sender, fence) = r#continue::continuation();
        let submitted = self.submit(RenderCommand::Fence(sender));
        fence.await;
        submitted
    }
}
