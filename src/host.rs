// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The host's own asynchronous readback.

Some hosts already expose a native non-blocking readback. When they do, it is
preferred over the fallback copy engine, and this crate only adapts it to the
same polling surface. The host implementation is a black box; nothing here
schedules render commands for it.
*/

use crate::texture::TextureHandle;

/// Entry point to a host's native readback.
pub trait HostReadback: Send + Sync {
    /// Whether the host can read back textures asynchronously on this device.
    fn supports_async_readback(&self) -> bool;

    /// Starts a readback of `mip_level` of `texture`.
    fn request(&self, texture: TextureHandle, mip_level: u32) -> Box<dyn HostRequest>;
}

/// One in-flight host readback.
pub trait HostRequest: Send {
    fn done(&self) -> bool;

    fn has_error(&self) -> bool;

    /// The read-back bytes. Only meaningful once `done()` is true and `has_error()` is false.
    fn data(&self) -> Vec<u8>;

    /// Forces the host to check for completion now instead of at its own next check.
    fn update(&mut self);
}
