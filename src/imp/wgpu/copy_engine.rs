// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Copy engine backed by wgpu.

Each request copies one mip level into its own `MAP_READ` staging buffer. The
copy is recorded and submitted on the render thread, the buffer is mapped
asynchronously right away, and later updates poll the device without waiting.
Once the map callback fires, the rows are copied out without their
`COPY_BYTES_PER_ROW_ALIGNMENT` padding and the staging buffer is destroyed.
*/

use crate::engine::{CopyEngine, DeviceEvent, FetchConvention, RenderContext, RequestId, TaskTable};
use crate::texture::{TexelFormat, TextureHandle};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const MAP_PENDING: u8 = 0;
const MAP_READY: u8 = 1;
const MAP_FAILED: u8 = 2;

#[derive(Debug, Clone, Copy)]
struct CopyPlan {
    width: u32,
    rows: u32,
    layers: u32,
    unpadded_bytes_per_row: u32,
    padded_bytes_per_row: u32,
}

impl CopyPlan {
    fn new(texture: &wgpu::Texture, mip_level: u32) -> Result<Self, &'static str> {
        if !texture.usage().contains(wgpu::TextureUsages::COPY_SRC) {
            return Err("texture was not created with COPY_SRC usage");
        }
        if mip_level >= texture.mip_level_count() {
            return Err("texture has no such mip level");
        }
        let format = TexelFormat::from_wgpu(texture.format()).ok_or("texel format cannot be read back")?;
        let bytes_per_texel = format.bytes_per_texel().ok_or("compressed textures cannot be read back")?;
        let width = (texture.width() >> mip_level).max(1);
        let (rows, layers) = match texture.dimension() {
            wgpu::TextureDimension::D1 => (1, 1),
            wgpu::TextureDimension::D2 => ((texture.height() >> mip_level).max(1), texture.depth_or_array_layers()),
            wgpu::TextureDimension::D3 => (
                (texture.height() >> mip_level).max(1),
                (texture.depth_or_array_layers() >> mip_level).max(1),
            ),
        };
        let unpadded_bytes_per_row = width
            .checked_mul(bytes_per_texel)
            .ok_or("row size overflows")?;
        let padded_bytes_per_row = unpadded_bytes_per_row
            .checked_add(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT - 1)
            .ok_or("row size overflows")?
            / wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        rows.checked_mul(layers).ok_or("texture has too many rows")?;
        Ok(CopyPlan {
            width,
            rows,
            layers,
            unpadded_bytes_per_row,
            padded_bytes_per_row,
        })
    }

    fn staging_size(&self) -> u64 {
        self.padded_bytes_per_row as u64 * self.total_rows() as u64
    }

    /// Rows across every slice or array layer of the level.
    fn total_rows(&self) -> u32 {
        self.rows * self.layers
    }
}

#[derive(Debug)]
struct InFlight {
    buffer: wgpu::Buffer,
    plan: CopyPlan,
    map_state: Arc<AtomicU8>,
}

impl InFlight {
    /// Copies the mapped rows out without padding and releases the buffer.
    fn into_unpadded(self) -> Box<[u8]> {
        let row_len = self.plan.unpadded_bytes_per_row as usize;
        let mut data = Vec::with_capacity(row_len * self.plan.total_rows() as usize);
        {
            let view = self.buffer.slice(..).get_mapped_range();
            for row in view
                .chunks(self.plan.padded_bytes_per_row as usize)
                .take(self.plan.total_rows() as usize)
            {
                data.extend_from_slice(&row[..row_len]);
            }
        }
        self.buffer.unmap();
        self.buffer.destroy();
        data.into_boxed_slice()
    }
}

#[derive(Debug)]
enum Phase {
    Registered,
    InFlight(InFlight),
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
struct State {
    textures: HashMap<TextureHandle, wgpu::Texture>,
    next_texture: u64,
    tasks: TaskTable<Task>,
}

/// [`CopyEngine`] that reads textures back through wgpu staging buffers.
///
/// Textures must be registered with [`WgpuCopyEngine::register_texture`] and
/// created with `TextureUsages::COPY_SRC`.
#[derive(Debug)]
pub struct WgpuCopyEngine {
    device: wgpu::Device,
    queue: wgpu::Queue,
    state: Mutex<State>,
    compatible: AtomicBool,
}

impl WgpuCopyEngine {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        WgpuCopyEngine {
            device,
            queue,
            state: Mutex::new(State::default()),
            compatible: AtomicBool::new(true),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes `texture` addressable by readback requests.
    pub fn register_texture(&self, texture: wgpu::Texture) -> TextureHandle {
        let mut state = self.lock();
        let handle = TextureHandle::new(state.next_texture);
        state.next_texture += 1;
        state.textures.insert(handle, texture);
        handle
    }

    /// Stops tracking a texture. Copies already submitted are unaffected.
    pub fn forget_texture(&self, handle: TextureHandle) -> Option<wgpu::Texture> {
        self.lock().textures.remove(&handle)
    }

    fn record_copy(&self, texture: &wgpu::Texture, mip_level: u32, plan: CopyPlan) -> InFlight {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback staging"),
            size: plan.staging_size(),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback copy"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(plan.padded_bytes_per_row),
                    rows_per_image: Some(plan.rows),
                },
            },
            wgpu::Extent3d {
                width: plan.width,
                height: plan.rows,
                depth_or_array_layers: plan.layers,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let map_state = Arc::new(AtomicU8::new(MAP_PENDING));
        let callback_state = map_state.clone();
        buffer.slice(..).map_async(wgpu::MapMode::Read, move |result| {
            let state = if result.is_ok() { MAP_READY } else { MAP_FAILED };
            callback_state.store(state, Ordering::Release);
        });
        InFlight {
            buffer,
            plan,
            map_state,
        }
    }
}

impl CopyEngine for WgpuCopyEngine {
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
        let mut state = self.lock();
        if matches!(state.tasks.get(id).map(|t| &t.phase), Some(Phase::Registered)) {
            state.tasks.remove(id);
        }
    }

    fn execute_copy(&self, _ctx: &RenderContext, id: RequestId) {
        let mut state = self.lock();
        let State { textures, tasks, .. } = &mut *state;
        let Some(task) = tasks.get_mut(id) else {
            return;
        };
        if !matches!(task.phase, Phase::Registered) {
            return;
        }
        let planned = match textures.get(&task.texture) {
            Some(texture) => CopyPlan::new(texture, task.mip_level).map(|plan| (texture, plan)),
            None => Err("texture is not registered"),
        };
        match planned {
            Ok((texture, plan)) => {
                logwise::trace_sync!(
                    "wgpu readback {id}: {w}x{h}x{d} rows of {row} bytes",
                    id = logwise::privacy::LogIt(&id),
                    w = plan.width,
                    h = plan.rows,
                    d = plan.layers,
                    row = plan.unpadded_bytes_per_row
                );
                task.phase = Phase::InFlight(self.record_copy(texture, task.mip_level, plan));
            }
            Err(reason) => {
                logwise::warn_sync!(
                    "wgpu readback {id} of {texture} failed: {reason}",
                    id = logwise::privacy::LogIt(&id),
                    texture = logwise::privacy::LogIt(&task.texture),
                    reason = logwise::privacy::LogIt(&reason)
                );
                task.phase = Phase::Failed;
            }
        }
    }

    fn update(&self, _ctx: &RenderContext, id: RequestId) {
        {
            let _interval = logwise::perfwarn_begin!("wgpu readback poll");
            if let Err(e) = self.device.poll(wgpu::PollType::Poll) {
                logwise::warn_sync!(
                    "wgpu readback {id}: device poll failed: {err}",
                    id = logwise::privacy::LogIt(&id),
                    err = logwise::privacy::LogIt(&e)
                );
            }
        }
        let mut state = self.lock();
        let Some(task) = state.tasks.get_mut(id) else {
            return;
        };
        let map_state = match &task.phase {
            Phase::InFlight(in_flight) => in_flight.map_state.load(Ordering::Acquire),
            _ => return,
        };
        if map_state == MAP_PENDING {
            return;
        }
        let Phase::InFlight(in_flight) = std::mem::replace(&mut task.phase, Phase::Failed) else {
            return;
        };
        if map_state == MAP_READY {
            task.phase = Phase::Done(in_flight.into_unpadded());
        } else {
            logwise::warn_sync!(
                "wgpu readback {id}: staging buffer could not be mapped",
                id = logwise::privacy::LogIt(&id)
            );
            in_flight.buffer.destroy();
        }
    }

    fn dispose(&self, _ctx: &RenderContext, id: RequestId) {
        let removed = self.lock().tasks.remove(id);
        if let Some(Task {
            phase: Phase::InFlight(in_flight),
            ..
        }) = removed
        {
            in_flight.buffer.destroy();
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
        FetchConvention::Borrowed
    }

    fn staged_len(&self, id: RequestId) -> Option<usize> {
        match &self.lock().tasks.get(id)?.phase {
            Phase::Done(data) => Some(data.len()),
            _ => None,
        }
    }

    fn fetch_borrowed(&self, id: RequestId, visit: &mut dyn FnMut(&[u8])) -> bool {
        let state = self.lock();
        match state.tasks.get(id).map(|t| &t.phase) {
            Some(Phase::Done(data)) => {
                visit(&data[..]);
                true
            }
            _ => false,
        }
    }

    fn device_event(&self, event: DeviceEvent) {
        logwise::info_sync!("wgpu readback device event {event}", event = logwise::privacy::LogIt(&event));
        self.compatible
            .store(matches!(event, DeviceEvent::Initialize), Ordering::Release);
    }
}
