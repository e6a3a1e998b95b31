// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The native copy engine seam.

A copy engine issues GPU-to-CPU copies into staging memory it owns and answers
completion queries about them. Its work is split between two contexts:

* Issuing thread: [`CopyEngine::submit_copy`] registers intent and hands back a
  [`RequestId`]. No GPU work happens here. The query primitives
  ([`CopyEngine::poll_done`], [`CopyEngine::poll_error`], the fetch calls) are
  also issuing-thread safe.
* Render command thread: [`CopyEngine::execute_copy`], [`CopyEngine::update`] and
  [`CopyEngine::dispose`] touch the graphics API. They take a [`RenderContext`],
  which only the command streams in [`crate::dispatch`] can construct, so an
  engine primitive cannot be invoked off the render timeline by accident.

Engines hand staged bytes back in one of two conventions (see [`FetchConvention`]);
[`fetch_data`] accepts either.
*/

mod software;
mod task_table;

pub use software::{SoftwareCopyEngine, TextureFault};
pub use task_table::TaskTable;

use crate::bittricks::{u32s_to_u64, u64_to_u32s};
use crate::texture::TextureHandle;

/// Opaque token naming one request in an engine's task table.
///
/// The generation distinguishes a live request from an earlier one that used
/// the same slot, so a stale id never aliases a newer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId {
    index: u32,
    generation: u32,
}

impl RequestId {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        RequestId { index, generation }
    }
    pub const fn index(self) -> u32 {
        self.index
    }
    pub const fn generation(self) -> u32 {
        self.generation
    }
    /// Packs the id into one integer, for hosts whose event mechanism carries a single value.
    pub fn to_bits(self) -> u64 {
        u32s_to_u64(self.generation, self.index)
    }
    pub fn from_bits(bits: u64) -> Self {
        let (generation, index) = u64_to_u32s(bits);
        RequestId { index, generation }
    }
}

/// Proof that the caller is executing on the render command stream.
#[derive(Debug)]
pub struct RenderContext {
    _private: (),
}

impl RenderContext {
    pub(crate) fn new() -> Self {
        RenderContext { _private: () }
    }
}

/// How an engine returns staged bytes to the issuing thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchConvention {
    /// The engine lends a view of its own staging memory.
    Borrowed,
    /// The caller allocates; the engine writes into it and reports how many bytes it wrote.
    CallerBuffer,
}

/// Graphics device lifecycle notifications from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    Initialize,
    Shutdown,
}

/// A native GPU-to-CPU copy engine.
pub trait CopyEngine: Send + Sync + 'static {
    /// Whether the engine can service readbacks on the current device.
    fn probe_compatibility(&self) -> bool;

    /// Registers a copy of `mip_level` of `texture`. Issuing thread; no GPU work.
    fn submit_copy(&self, texture: TextureHandle, mip_level: u32) -> RequestId;

    /// Forgets a registration whose copy never reached the render stream.
    ///
    /// Issuing thread. Ids whose copy already executed are left alone; those
    /// are released by [`CopyEngine::dispose`].
    fn cancel_copy(&self, id: RequestId);

    /// Records and submits the copy for `id`.
    ///
    /// Failures (unknown texture, unsupported format, zero size) are latched on
    /// the request and reported by [`CopyEngine::poll_error`].
    fn execute_copy(&self, ctx: &RenderContext, id: RequestId);

    /// Checks the copy's fence and finishes the request once the GPU is done.
    ///
    /// Unknown or disposed ids are ignored.
    fn update(&self, ctx: &RenderContext, id: RequestId);

    /// Releases everything the engine holds for `id`.
    fn dispose(&self, ctx: &RenderContext, id: RequestId);

    /// Whether the copy has finished, successfully or not.
    fn poll_done(&self, id: RequestId) -> bool;

    /// Whether the copy failed. Unknown ids report an error.
    fn poll_error(&self, id: RequestId) -> bool;

    fn fetch_convention(&self) -> FetchConvention;

    /// Byte length of the staged data, once the copy has completed successfully.
    fn staged_len(&self, id: RequestId) -> Option<usize>;

    /// Lends the staged bytes to `visit`. Returns false if nothing is staged.
    fn fetch_borrowed(&self, id: RequestId, visit: &mut dyn FnMut(&[u8])) -> bool {
        let _ = (id, visit);
        false
    }

    /// Copies the staged bytes into `buffer`, returning how many were written.
    fn fetch_into(&self, id: RequestId, buffer: &mut [u8]) -> Option<usize> {
        let _ = (id, buffer);
        None
    }

    fn device_event(&self, event: DeviceEvent) {
        let _ = event;
    }
}

/// Copies the staged bytes for `id` out of `engine`, whichever convention it uses.
pub fn fetch_data(engine: &dyn CopyEngine, id: RequestId) -> Option<Vec<u8>> {
    match engine.fetch_convention() {
        FetchConvention::Borrowed => {
            let mut out = None;
            engine.fetch_borrowed(id, &mut |bytes| out = Some(bytes.to_vec()));
            out
        }
        FetchConvention::CallerBuffer => {
            let len = engine.staged_len(id)?;
            let mut buffer = vec![0; len];
            let written = engine.fetch_into(id, &mut buffer)?;
            buffer.truncate(written);
            Some(buffer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_bits_roundtrip() {
        let id = RequestId::new(12, 3);
        let bits = id.to_bits();
        assert_eq!(bits, (3u64 << 32) | 12);
        assert_eq!(RequestId::from_bits(bits), id);
    }
}
