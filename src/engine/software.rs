// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
A copy engine backed by CPU memory.

[`SoftwareCopyEngine`] behaves like a GPU engine from the outside: copies are
registered on the issuing thread, snapshotted when the render thread executes
them, and only complete after their simulated fence signals on a later update.
It serves headless hosts and lets the readback protocol be exercised without a
graphics device.

```
use async_gpu_readback::engine::{CopyEngine, SoftwareCopyEngine};
use async_gpu_readback::texture::{TexelFormat, TextureDescriptor};

let engine = SoftwareCopyEngine::new();
let texture = engine.add_texture(
    TextureDescriptor::new_2d(2, 2, TexelFormat::R8Unorm),
    vec![1, 2, 3, 4],
);
let id = engine.submit_copy(texture, 0);
assert!(!engine.poll_done(id));
```
*/

use crate::engine::{CopyEngine, DeviceEvent, FetchConvention, RenderContext, RequestId, TaskTable};
use crate::texture::{TextureDescriptor, TextureHandle};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Simulated failures attached to a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFault {
    /// Fences for copies of this texture never signal.
    Stall,
    /// Fence status can no longer be read; the next update fails the copy.
    LostFence,
}

#[derive(Debug)]
struct SoftwareTexture {
    descriptor: TextureDescriptor,
    levels: HashMap<u32, Box<[u8]>>,
    fault: Option<TextureFault>,
}

#[derive(Debug)]
enum Phase {
    Registered,
    InFlight { remaining: u32, staged: Box<[u8]> },
    Done(Box<[u8]>),
    Failed,
}

#[derive(Debug)]
struct Task {
    texture: TextureHandle,
    mip_level: u32,
    phase: Phase,
}

#[derive(Debug, Default)]
struct Inner {
    textures: HashMap<TextureHandle, SoftwareTexture>,
    next_texture: u64,
    tasks: TaskTable<Task>,
}

/// In-memory [`CopyEngine`].
#[derive(Debug)]
pub struct SoftwareCopyEngine {
    inner: Mutex<Inner>,
    compatible: AtomicBool,
    fence_latency: u32,
    convention: FetchConvention,
    disposed: AtomicUsize,
}

impl Default for SoftwareCopyEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareCopyEngine {
    /// An engine whose fences signal on the first update after the copy executes.
    pub fn new() -> Self {
        SoftwareCopyEngine {
            inner: Mutex::new(Inner::default()),
            compatible: AtomicBool::new(true),
            fence_latency: 0,
            convention: FetchConvention::Borrowed,
            disposed: AtomicUsize::new(0),
        }
    }

    /// Number of updates that observe an unsignaled fence before the copy completes.
    pub fn with_fence_latency(mut self, updates: u32) -> Self {
        self.fence_latency = updates;
        self
    }

    pub fn with_fetch_convention(mut self, convention: FetchConvention) -> Self {
        self.convention = convention;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a texture whose base level holds `base_level`.
    pub fn add_texture(&self, descriptor: TextureDescriptor, base_level: impl Into<Vec<u8>>) -> TextureHandle {
        let mut inner = self.lock();
        let handle = TextureHandle::new(inner.next_texture);
        inner.next_texture += 1;
        let mut levels = HashMap::new();
        levels.insert(0, base_level.into().into_boxed_slice());
        inner.textures.insert(
            handle,
            SoftwareTexture {
                descriptor,
                levels,
                fault: None,
            },
        );
        handle
    }

    /// Replaces the contents of one mip level. Returns false for unknown textures.
    pub fn write_level(&self, texture: TextureHandle, mip_level: u32, bytes: impl Into<Vec<u8>>) -> bool {
        match self.lock().textures.get_mut(&texture) {
            Some(t) => {
                t.levels.insert(mip_level, bytes.into().into_boxed_slice());
                true
            }
            None => false,
        }
    }

    /// Forgets a texture. Copies that already executed keep their snapshot.
    pub fn remove_texture(&self, texture: TextureHandle) -> bool {
        self.lock().textures.remove(&texture).is_some()
    }

    pub fn set_fault(&self, texture: TextureHandle, fault: Option<TextureFault>) {
        if let Some(t) = self.lock().textures.get_mut(&texture) {
            t.fault = fault;
        }
    }

    pub fn set_compatible(&self, compatible: bool) {
        self.compatible.store(compatible, Ordering::Release);
    }

    /// Requests registered and not yet disposed.
    pub fn live_requests(&self) -> usize {
        self.lock().tasks.len()
    }

    /// Requests released by [`CopyEngine::dispose`] over the engine's lifetime.
    pub fn disposed_requests(&self) -> usize {
        self.disposed.load(Ordering::Acquire)
    }
}

fn snapshot(texture: &SoftwareTexture, mip_level: u32) -> Option<Box<[u8]>> {
    let len = texture.descriptor.staging_len(mip_level)?;
    if len == 0 {
        return None;
    }
    let level = texture.levels.get(&mip_level)?;
    (level.len() == len).then(|| level.clone())
}

impl CopyEngine for SoftwareCopyEngine {
    fn probe_compatibility(&self) -> bool {
        self.compatible.load(Ordering::Acquire)
    }

    fn submit_copy(&self, texture: TextureHandle, mip_level: u32) -> RequestId {
        self.lock().tasks.insert(Task {
            texture,
            mip_level,
            phase: Phase::Registered,
        })
    }

    fn cancel_copy(&self, id: RequestId) {
        let mut inner = self.lock();
        if matches!(inner.tasks.get(id).map(|t| &t.phase), Some(Phase::Registered)) {
            inner.tasks.remove(id);
        }
    }

    fn execute_copy(&self, _ctx: &RenderContext, id: RequestId) {
        let mut inner = self.lock();
        let Inner { textures, tasks, .. } = &mut *inner;
        let Some(task) = tasks.get_mut(id) else {
            return;
        };
        if !matches!(task.phase, Phase::Registered) {
            return;
        }
        match textures.get(&task.texture).and_then(|t| snapshot(t, task.mip_level)) {
            Some(staged) => {
                logwise::trace_sync!(
                    "software copy {id} staged {len} bytes",
                    id = logwise::privacy::LogIt(&id),
                    len = staged.len()
                );
                task.phase = Phase::InFlight {
                    remaining: self.fence_latency,
                    staged,
                };
            }
            None => {
                logwise::warn_sync!(
                    "software copy {id} of {texture} has no readable level {mip}",
                    id = logwise::privacy::LogIt(&id),
                    texture = logwise::privacy::LogIt(&task.texture),
                    mip = task.mip_level
                );
                task.phase = Phase::Failed;
            }
        }
    }

    fn update(&self, _ctx: &RenderContext, id: RequestId) {
        let mut inner = self.lock();
        let Inner { textures, tasks, .. } = &mut *inner;
        let Some(task) = tasks.get_mut(id) else {
            return;
        };
        let fault = textures.get(&task.texture).and_then(|t| t.fault);
        let next = match std::mem::replace(&mut task.phase, Phase::Failed) {
            Phase::InFlight { .. } if fault == Some(TextureFault::LostFence) => Phase::Failed,
            in_flight @ Phase::InFlight { .. } if fault == Some(TextureFault::Stall) => in_flight,
            Phase::InFlight { remaining: 0, staged } => Phase::Done(staged),
            Phase::InFlight { remaining, staged } => Phase::InFlight {
                remaining: remaining - 1,
                staged,
            },
            other => other,
        };
        task.phase = next;
    }

    fn dispose(&self, _ctx: &RenderContext, id: RequestId) {
        if self.lock().tasks.remove(id).is_some() {
            self.disposed.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn poll_done(&self, id: RequestId) -> bool {
        matches!(
            self.lock().tasks.get(id).map(|t| &t.phase),
            Some(Phase::Done(_) | Phase::Failed)
        )
    }

    fn poll_error(&self, id: RequestId) -> bool {
        matches!(self.lock().tasks.get(id).map(|t| &t.phase), None | Some(Phase::Failed))
    }

    fn fetch_convention(&self) -> FetchConvention {
        self.convention
    }

    fn staged_len(&self, id: RequestId) -> Option<usize> {
        match &self.lock().tasks.get(id)?.phase {
            Phase::Done(staged) => Some(staged.len()),
            _ => None,
        }
    }

    fn fetch_borrowed(&self, id: RequestId, visit: &mut dyn FnMut(&[u8])) -> bool {
        let inner = self.lock();
        match inner.tasks.get(id).map(|t| &t.phase) {
            Some(Phase::Done(staged)) => {
                visit(&staged[..]);
                true
            }
            _ => false,
        }
    }

    fn fetch_into(&self, id: RequestId, buffer: &mut [u8]) -> Option<usize> {
        let inner = self.lock();
        match &inner.tasks.get(id)?.phase {
            Phase::Done(staged) => {
                let n = staged.len().min(buffer.len());
                buffer[..n].copy_from_slice(&staged[..n]);
                Some(n)
            }
            _ => None,
        }
    }

    fn device_event(&self, event: DeviceEvent) {
        logwise::info_sync!("software engine device event {event}", event = logwise::privacy::LogIt(&event));
        self.set_compatible(matches!(event, DeviceEvent::Initialize));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fetch_data;
    use crate::texture::TexelFormat;

    fn engine_with_texture(latency: u32) -> (SoftwareCopyEngine, TextureHandle) {
        let engine = SoftwareCopyEngine::new().with_fence_latency(latency);
        let texture = engine.add_texture(TextureDescriptor::new_2d(4, 1, TexelFormat::R8Unorm), vec![9, 8, 7, 6]);
        (engine, texture)
    }

    #[test]
    fn fence_latency_delays_completion() {
        let (engine, texture) = engine_with_texture(2);
        let ctx = RenderContext::new();
        let id = engine.submit_copy(texture, 0);
        engine.update(&ctx, id);
        assert!(!engine.poll_done(id), "update before execute does nothing");
        engine.execute_copy(&ctx, id);
        engine.update(&ctx, id);
        engine.update(&ctx, id);
        assert!(!engine.poll_done(id));
        engine.update(&ctx, id);
        assert!(engine.poll_done(id));
        assert!(!engine.poll_error(id));
        assert_eq!(fetch_data(&engine, id), Some(vec![9, 8, 7, 6]));
    }

    #[test]
    fn snapshot_is_taken_when_the_copy_executes() {
        let (engine, texture) = engine_with_texture(0);
        let ctx = RenderContext::new();
        let id = engine.submit_copy(texture, 0);
        engine.execute_copy(&ctx, id);
        engine.write_level(texture, 0, vec![0, 0, 0, 0]);
        engine.update(&ctx, id);
        assert_eq!(fetch_data(&engine, id), Some(vec![9, 8, 7, 6]));
    }

    #[test]
    fn removed_textures_keep_executed_snapshots() {
        let (engine, texture) = engine_with_texture(0);
        let ctx = RenderContext::new();
        let executed = engine.submit_copy(texture, 0);
        engine.execute_copy(&ctx, executed);
        let orphaned = engine.submit_copy(texture, 0);
        assert!(engine.remove_texture(texture));
        assert!(!engine.remove_texture(texture));

        engine.execute_copy(&ctx, orphaned);
        engine.update(&ctx, executed);
        assert_eq!(fetch_data(&engine, executed), Some(vec![9, 8, 7, 6]));
        assert!(engine.poll_error(orphaned));
    }

    #[test]
    fn cancel_only_forgets_unexecuted_copies() {
        let (engine, texture) = engine_with_texture(0);
        let ctx = RenderContext::new();
        let executed = engine.submit_copy(texture, 0);
        engine.execute_copy(&ctx, executed);
        let refused = engine.submit_copy(texture, 0);
        engine.cancel_copy(refused);
        engine.cancel_copy(executed);
        assert_eq!(engine.live_requests(), 1);
        assert!(engine.poll_error(refused));
        engine.dispose(&ctx, executed);
        assert_eq!(engine.live_requests(), 0);
    }

    #[test]
    fn caller_buffer_convention() {
        let engine = SoftwareCopyEngine::new().with_fetch_convention(FetchConvention::CallerBuffer);
        let texture = engine.add_texture(TextureDescriptor::new_2d(2, 1, TexelFormat::R16Float), vec![1, 2, 3, 4]);
        let ctx = RenderContext::new();
        let id = engine.submit_copy(texture, 0);
        engine.execute_copy(&ctx, id);
        engine.update(&ctx, id);
        assert_eq!(engine.staged_len(id), Some(4));
        let mut short = [0u8; 3];
        assert_eq!(engine.fetch_into(id, &mut short), Some(3));
        assert_eq!(short, [1, 2, 3]);
        assert_eq!(fetch_data(&engine, id), Some(vec![1, 2, 3, 4]));
    }

    #[test]
    fn unreadable_copies_fail() {
        let engine = SoftwareCopyEngine::new();
        let ctx = RenderContext::new();
        let empty = engine.add_texture(TextureDescriptor::new_2d(0, 0, TexelFormat::R8Unorm), Vec::new());
        let compressed = engine.add_texture(TextureDescriptor::new_2d(4, 4, TexelFormat::Bc1RgbaUnorm), vec![0; 8]);
        let ids = [
            engine.submit_copy(empty, 0),
            engine.submit_copy(compressed, 0),
            engine.submit_copy(TextureHandle::new(999), 0),
            engine.submit_copy(empty, 3),
        ];
        for id in ids {
            engine.execute_copy(&ctx, id);
            assert!(engine.poll_error(id));
            assert!(engine.poll_done(id));
            assert_eq!(fetch_data(&engine, id), None);
        }
    }

    #[test]
    fn faults() {
        let (engine, texture) = engine_with_texture(0);
        let ctx = RenderContext::new();
        engine.set_fault(texture, Some(TextureFault::Stall));
        let stalled = engine.submit_copy(texture, 0);
        engine.execute_copy(&ctx, stalled);
        for _ in 0..10 {
            engine.update(&ctx, stalled);
        }
        assert!(!engine.poll_done(stalled));

        engine.set_fault(texture, Some(TextureFault::LostFence));
        engine.update(&ctx, stalled);
        assert!(engine.poll_done(stalled));
        assert!(engine.poll_error(stalled));
    }

    #[test]
    fn dispose_releases_and_forgets() {
        let (engine, texture) = engine_with_texture(0);
        let ctx = RenderContext::new();
        let id = engine.submit_copy(texture, 0);
        assert_eq!(engine.live_requests(), 1);
        engine.dispose(&ctx, id);
        engine.dispose(&ctx, id);
        engine.update(&ctx, id);
        assert_eq!(engine.live_requests(), 0);
        assert_eq!(engine.disposed_requests(), 1);
        assert!(engine.poll_error(id));
    }

    #[test]
    fn device_events_toggle_compatibility() {
        let engine = SoftwareCopyEngine::new();
        assert!(engine.probe_compatibility());
        engine.device_event(DeviceEvent::Shutdown);
        assert!(!engine.probe_compatibility());
        engine.device_event(DeviceEvent::Initialize);
        assert!(engine.probe_compatibility());
    }
}
