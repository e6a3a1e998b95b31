// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! async_gpu_readback reads GPU textures back to the CPU without stalling the render pipeline.

Reading a texture synchronously forces the CPU to wait for the GPU to finish
everything queued before the copy. For capture, streaming, or compute results
that are needed a few frames later, that stall is pure loss. This crate issues
the copy, lets the frame continue, and hands the bytes over once the GPU is done.

# Backends

|                | Who copies                        | Who polls                 | When to use                                   |
|----------------|-----------------------------------|---------------------------|-----------------------------------------------|
| HostNative     | The host's own async readback     | The host                  | The host has one ([`host::HostReadback`])     |
| NativeFallback | A [`engine::CopyEngine`]          | [`dispatch::Dispatcher`]  | Everything else                               |

The backend is picked once per request by [`Platform`]. Either way, the
request presents the same polling surface: [`ReadbackRequest::poll`],
[`ReadbackRequest::advance`], [`ReadbackRequest::read_raw`] and
[`ReadbackRequest::dispose`].

# Threads

Two contexts are involved:

* The issuing thread owns the requests and the [`ReadbackQueue`]. It creates,
  advances, polls, reads and disposes. Nothing it calls blocks on the GPU.
* The render command thread is the only context that executes copy engine
  primitives. Work reaches it as [`dispatch::RenderCommand`]s through a
  [`dispatch::CommandStream`], in submission order.

# Throttling

[`ReadbackQueue`] bounds outstanding requests (8 by default), rejects new ones
when full rather than blocking, and drains only from the head so results are
delivered in order.

```
use async_gpu_readback::{Platform, ReadbackConfig, ReadbackQueue};
use async_gpu_readback::dispatch::Dispatcher;
use async_gpu_readback::engine::SoftwareCopyEngine;
use async_gpu_readback::texture::{TexelFormat, TextureDescriptor};
use std::sync::Arc;

let engine = Arc::new(SoftwareCopyEngine::new());
let frame = engine.add_texture(TextureDescriptor::new_2d(2, 2, TexelFormat::R8Unorm), vec![0, 1, 2, 3]);
let (dispatcher, render_queue) = Dispatcher::host_driven(engine);
let platform = Platform::new()
    .with_fallback(dispatcher)
    .with_config(ReadbackConfig::from_env_or_default());
let mut queue = ReadbackQueue::with_config(platform.config());

let mut captured = 0;
for _frame in 0..4 {
    if !queue.is_full() {
        queue.try_enqueue(platform.request(frame).unwrap()).unwrap();
    }
    queue.tick(|readback| {
        assert_eq!(readback.bytes, vec![0, 1, 2, 3]);
        captured += 1;
    });
    // The host's render thread drains the command queue.
    render_queue.execute_pending();
}
assert_eq!(captured, 3);
```

# wgpu

With the default `backend_wgpu` feature, native targets get [`WgpuCopyEngine`],
a fallback engine that copies into `MAP_READ` staging buffers.
*/

mod bittricks;
pub mod config;
pub mod dispatch;
pub mod engine;
mod error;
pub mod host;
mod imp;
mod platform;
mod queue;
mod request;
mod sys;
pub mod texture;

pub use config::ReadbackConfig;
pub use error::Error;
pub use platform::Platform;
pub use queue::{QueueFull, Readback, ReadbackQueue, TickReport};
pub use request::{BackendKind, ReadbackRequest, Ready, RequestState};

#[cfg(all(feature = "backend_wgpu", not(target_arch = "wasm32")))]
pub use imp::WgpuCopyEngine;
